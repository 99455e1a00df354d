//! Shape checks run before any filesystem mutation.

use std::collections::HashSet;

use serde::Serialize;
use serde_json::Value;

use crate::error::BacklogError;
use crate::models::{Backlog, Feature};

use super::paths;

/// Outcome of [`validate`]. Never an `Err`: problems are listed in `errors`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
}

impl ValidationReport {
    fn from_errors(errors: Vec<String>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }
}

/// Unwrap a `{success, result}` envelope; anything else is returned as-is.
pub fn extract_backlog_data(input: &Value) -> &Value {
    match input.as_object() {
        Some(obj) if obj.contains_key("success") && obj.contains_key("result") => &obj["result"],
        _ => input,
    }
}

/// Check a backlog (bare or enveloped) without raising.
pub fn validate(input: &Value) -> ValidationReport {
    let mut errors = envelope_errors(input);
    check_backlog(extract_backlog_data(input), &mut errors);
    ValidationReport::from_errors(errors)
}

/// Validate and deserialize a backlog in one step.
pub fn parse_backlog(input: &Value) -> Result<Backlog, BacklogError> {
    let report = validate(input);
    if !report.valid {
        return Err(BacklogError::Validation(report.errors));
    }
    serde_json::from_value(extract_backlog_data(input).clone()).map_err(|e| {
        BacklogError::Validation(vec![format!(
            "Backlog does not match the expected shape: {}",
            e
        )])
    })
}

/// Check a single feature (bare or enveloped), as produced for `generateFeature`.
pub fn validate_feature(input: &Value) -> ValidationReport {
    let mut errors = envelope_errors(input);
    let mut story_ids = HashSet::new();
    check_feature(
        extract_backlog_data(input),
        "feature",
        &mut story_ids,
        &mut errors,
    );
    ValidationReport::from_errors(errors)
}

pub fn parse_feature(input: &Value) -> Result<Feature, BacklogError> {
    let report = validate_feature(input);
    if !report.valid {
        return Err(BacklogError::Validation(report.errors));
    }
    serde_json::from_value(extract_backlog_data(input).clone()).map_err(|e| {
        BacklogError::Validation(vec![format!(
            "Feature does not match the expected shape: {}",
            e
        )])
    })
}

/// Check that `id` is usable verbatim as one directory or file name.
pub fn check_path_id(id: &str) -> Result<(), String> {
    if id.trim().is_empty() {
        return Err("must not be empty".to_string());
    }
    if id == "." || id == ".." {
        return Err(format!("'{}' is not a valid name", id));
    }
    if id.contains(['/', '\\', '\0']) {
        return Err(format!("'{}' must not contain path separators", id));
    }
    Ok(())
}

fn envelope_errors(input: &Value) -> Vec<String> {
    let mut errors = Vec::new();
    if let Some(obj) = input.as_object() {
        if obj.contains_key("result") && obj.get("success") == Some(&Value::Bool(false)) {
            errors.push("Envelope reports an unsuccessful generation (success: false)".to_string());
        }
    }
    errors
}

fn check_backlog(backlog: &Value, errors: &mut Vec<String>) {
    let Some(obj) = backlog.as_object() else {
        errors.push(format!(
            "Backlog must be a JSON object, found {}",
            type_name(backlog)
        ));
        return;
    };

    match obj.get("epics") {
        None => errors.push("Missing required field 'epics' (a list of epics)".to_string()),
        Some(Value::Array(epics)) => check_epics(epics, errors),
        Some(other) => errors.push(format!(
            "Field 'epics' must be a list, found {}",
            type_name(other)
        )),
    }

    if let Some(project) = obj.get("project") {
        if !project.is_object() && !project.is_null() {
            errors.push(format!(
                "Field 'project' must be an object, found {}",
                type_name(project)
            ));
        }
    }

    match obj.get("mvp") {
        None | Some(Value::Null) => {}
        Some(Value::Array(refs)) => check_story_refs(refs, "mvp", errors),
        Some(Value::Object(mvp)) => match mvp
            .get("stories")
            .filter(|stories| !stories.is_null())
            .or_else(|| mvp.get("userStories"))
        {
            None | Some(Value::Null) => {}
            Some(Value::Array(refs)) => check_story_refs(refs, "mvp.stories", errors),
            Some(other) => errors.push(format!(
                "Field 'mvp.stories' must be a list, found {}",
                type_name(other)
            )),
        },
        Some(other) => errors.push(format!(
            "Field 'mvp' must be a list of story references, found {}",
            type_name(other)
        )),
    }

    match obj.get("iterations") {
        None | Some(Value::Null) => {}
        Some(Value::Array(iterations)) => check_iterations(iterations, errors),
        Some(other) => errors.push(format!(
            "Field 'iterations' must be a list, found {}",
            type_name(other)
        )),
    }
}

fn check_epics(epics: &[Value], errors: &mut Vec<String>) {
    let mut epic_ids = HashSet::new();
    let mut story_ids = HashSet::new();

    for (i, epic) in epics.iter().enumerate() {
        let at = format!("epics[{}]", i);
        let Some(obj) = epic.as_object() else {
            errors.push(format!("{} must be an object, found {}", at, type_name(epic)));
            continue;
        };
        if let Some(id) = check_entity_id(obj.get("id"), &at, errors) {
            if !epic_ids.insert(id.to_string()) {
                errors.push(format!("Duplicate epic id '{}' ({})", id, at));
            }
        }
        check_optional_string(obj.get("title"), &at, "title", errors);

        let mut feature_ids = HashSet::new();
        for (j, feature) in list_field(obj.get("features"), &at, "features", errors)
            .iter()
            .enumerate()
        {
            let feature_at = format!("{}.features[{}]", at, j);
            if let Some(id) = check_feature(feature, &feature_at, &mut story_ids, errors) {
                if !feature_ids.insert(id.to_string()) {
                    errors.push(format!("Duplicate feature id '{}' ({})", id, feature_at));
                }
            }
        }
    }
}

/// Returns the feature id when it is well-formed.
fn check_feature<'a>(
    feature: &'a Value,
    at: &str,
    story_ids: &mut HashSet<String>,
    errors: &mut Vec<String>,
) -> Option<&'a str> {
    let Some(obj) = feature.as_object() else {
        errors.push(format!(
            "{} must be an object, found {}",
            at,
            type_name(feature)
        ));
        return None;
    };
    let id = check_entity_id(obj.get("id"), at, errors);
    check_optional_string(obj.get("title"), at, "title", errors);

    for (k, story) in list_field(obj.get("stories"), at, "stories", errors)
        .iter()
        .enumerate()
    {
        let story_at = format!("{}.stories[{}]", at, k);
        let Some(story_obj) = story.as_object() else {
            errors.push(format!(
                "{} must be an object, found {}",
                story_at,
                type_name(story)
            ));
            continue;
        };
        if let Some(story_id) = check_entity_id(story_obj.get("id"), &story_at, errors) {
            if !story_ids.insert(story_id.to_string()) {
                errors.push(format!("Duplicate story id '{}' ({})", story_id, story_at));
            }
        }
        check_optional_string(story_obj.get("title"), &story_at, "title", errors);
        for field in ["acceptanceCriteria", "tasks", "dependencies"] {
            check_string_list(story_obj.get(field), &story_at, field, errors);
        }
    }
    id
}

fn check_iterations(iterations: &[Value], errors: &mut Vec<String>) {
    let mut slugs = HashSet::new();
    for (i, iteration) in iterations.iter().enumerate() {
        let at = format!("iterations[{}]", i);
        let Some(obj) = iteration.as_object() else {
            errors.push(format!(
                "{} must be an object, found {}",
                at,
                type_name(iteration)
            ));
            continue;
        };
        match obj.get("name") {
            Some(Value::String(name)) if !name.trim().is_empty() => {
                let slug = paths::iteration_slug(name, i);
                if !slugs.insert(slug.clone()) {
                    errors.push(format!(
                        "{} name '{}' collides with another iteration directory '{}'",
                        at, name, slug
                    ));
                }
            }
            _ => errors.push(format!("{} requires a non-empty string 'name'", at)),
        }
        check_optional_string(obj.get("goal"), &at, "goal", errors);
        match obj.get("stories") {
            None | Some(Value::Null) => {}
            Some(Value::Array(refs)) => check_story_refs(refs, &format!("{}.stories", at), errors),
            Some(other) => errors.push(format!(
                "{}.stories must be a list, found {}",
                at,
                type_name(other)
            )),
        }
    }
}

fn check_story_refs(refs: &[Value], at: &str, errors: &mut Vec<String>) {
    for (i, story_ref) in refs.iter().enumerate() {
        let ok = match story_ref {
            Value::String(id) => !id.trim().is_empty(),
            Value::Object(obj) => {
                let ref_at = format!("{}[{}]", at, i);
                check_optional_string(obj.get("title"), &ref_at, "title", errors);
                check_optional_string(obj.get("description"), &ref_at, "description", errors);
                matches!(obj.get("id"), Some(Value::String(id)) if !id.trim().is_empty())
            }
            _ => false,
        };
        if !ok {
            errors.push(format!(
                "{}[{}] must be a story id or an object with a non-empty string 'id'",
                at, i
            ));
        }
    }
}

fn check_entity_id<'a>(id: Option<&'a Value>, at: &str, errors: &mut Vec<String>) -> Option<&'a str> {
    match id {
        Some(Value::String(id)) => match check_path_id(id) {
            Ok(()) => Some(id.as_str()),
            Err(reason) => {
                errors.push(format!("{}.id {}", at, reason));
                None
            }
        },
        Some(other) => {
            errors.push(format!(
                "{}.id must be a string, found {}",
                at,
                type_name(other)
            ));
            None
        }
        None => {
            errors.push(format!("{} is missing required field 'id'", at));
            None
        }
    }
}

fn list_field<'a>(
    value: Option<&'a Value>,
    at: &str,
    field: &str,
    errors: &mut Vec<String>,
) -> &'a [Value] {
    match value {
        None | Some(Value::Null) => &[],
        Some(Value::Array(items)) => items,
        Some(other) => {
            errors.push(format!(
                "{}.{} must be a list, found {}",
                at,
                field,
                type_name(other)
            ));
            &[]
        }
    }
}

fn check_string_list(value: Option<&Value>, at: &str, field: &str, errors: &mut Vec<String>) {
    let items = list_field(value, at, field, errors);
    if items.iter().any(|item| !item.is_string()) {
        errors.push(format!("{}.{} must contain only strings", at, field));
    }
}

fn check_optional_string(value: Option<&Value>, at: &str, field: &str, errors: &mut Vec<String>) {
    match value {
        None | Some(Value::Null) | Some(Value::String(_)) => {}
        Some(other) => errors.push(format!(
            "{}.{} must be a string, found {}",
            at,
            field,
            type_name(other)
        )),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn minimal() -> Value {
        json!({
            "epics": [{
                "id": "ep1",
                "title": "Epic",
                "features": [{
                    "id": "f1",
                    "title": "F",
                    "stories": [{"id": "s1", "title": "S", "acceptanceCriteria": ["c1"], "tasks": ["t1"]}]
                }]
            }],
            "mvp": [{"id": "s1"}],
            "iterations": []
        })
    }

    #[test]
    fn accepts_minimal_backlog() {
        let report = validate(&minimal());
        assert!(report.valid, "{:?}", report.errors);
    }

    #[test]
    fn unwraps_envelope() {
        let wrapped = json!({"success": true, "result": minimal()});
        assert_eq!(validate(&wrapped), validate(&minimal()));
        assert_eq!(extract_backlog_data(&wrapped), &minimal());
    }

    #[test]
    fn rejects_failed_envelope() {
        let wrapped = json!({"success": false, "result": minimal()});
        assert!(!validate(&wrapped).valid);
    }

    #[test]
    fn rejects_missing_epics() {
        let report = validate(&json!({"mvp": []}));
        assert!(!report.valid);
        assert!(report.errors[0].contains("'epics'"));
    }

    #[test]
    fn rejects_legacy_singular_epic() {
        let report = validate(&json!({"epic": {"id": "ep1", "features": []}}));
        assert!(!report.valid);
    }

    #[test]
    fn rejects_non_list_epics() {
        let report = validate(&json!({"epics": {"id": "ep1"}}));
        assert_eq!(
            report.errors,
            vec!["Field 'epics' must be a list, found an object".to_string()]
        );
    }

    #[test]
    fn rejects_unsafe_and_duplicate_ids() {
        let report = validate(&json!({
            "epics": [
                {"id": "../up", "features": []},
                {"id": "ep2", "features": [
                    {"id": "f1", "stories": [{"id": "s1"}, {"id": "s1"}]}
                ]}
            ]
        }));
        assert!(!report.valid);
        assert_eq!(report.errors.len(), 2, "{:?}", report.errors);
        assert!(report.errors.iter().any(|e| e.contains("Duplicate story id 's1'")));
    }

    #[test]
    fn rejects_colliding_iteration_slugs() {
        let report = validate(&json!({
            "epics": [],
            "iterations": [{"name": "Sprint 1"}, {"name": "sprint-1"}]
        }));
        assert!(!report.valid);
    }

    #[test]
    fn rejects_bad_story_refs() {
        let report = validate(&json!({"epics": [], "mvp": [42, {"title": "no id"}]}));
        assert_eq!(report.errors.len(), 2);
    }

    #[test]
    fn rejects_non_string_ref_titles() {
        let report = validate(&json!({
            "epics": [],
            "mvp": [{"id": "s1", "title": 5}],
            "iterations": [{"name": "Sprint 1", "stories": [{"id": "s2", "description": ["d"]}]}]
        }));
        assert_eq!(report.errors.len(), 2, "{:?}", report.errors);
        assert!(report.errors[0].contains("mvp[0].title"));
        assert!(report.errors[1].contains("iterations[0].stories[0].description"));
    }

    #[test]
    fn null_lists_validate_and_parse_alike() {
        let cases = [
            json!({"epics": [], "mvp": null}),
            json!({"epics": [], "iterations": null}),
            json!({"epics": [{"id": "ep1", "features": null}]}),
            json!({"epics": [{"id": "ep1", "features": [{"id": "f1", "stories": null}]}]}),
            json!({"epics": [{"id": "ep1", "features": [{"id": "f1", "stories": [
                {"id": "s1", "acceptanceCriteria": null, "tasks": null, "dependencies": null}
            ]}]}]}),
            json!({"epics": [], "iterations": [{"name": "Sprint 1", "stories": null}]}),
            json!({"epics": [], "mvp": {"stories": null}}),
        ];
        for case in cases {
            assert!(validate(&case).valid, "{}", case);
            assert!(parse_backlog(&case).is_ok(), "{}", case);
        }
    }

    #[test]
    fn mvp_object_with_null_stories_reads_user_stories() {
        let input = json!({"epics": [], "mvp": {"stories": null, "userStories": [7]}});
        assert!(!validate(&input).valid);

        let input = json!({"epics": [], "mvp": {"stories": null, "userStories": ["s1"]}});
        assert_eq!(parse_backlog(&input).unwrap().mvp.stories[0].id, "s1");
    }

    #[test]
    fn parse_returns_typed_backlog() {
        let backlog = parse_backlog(&minimal()).unwrap();
        assert_eq!(backlog.epics[0].features[0].stories[0].tasks, vec!["t1"]);
        assert_eq!(backlog.mvp.stories[0].id, "s1");
    }

    #[test]
    fn feature_validation_checks_stories() {
        assert!(validate_feature(&json!({"id": "f1", "stories": [{"id": "s1"}]})).valid);
        assert!(!validate_feature(&json!({"id": "f1", "stories": [{"title": "x"}]})).valid);
    }
}
