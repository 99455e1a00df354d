//! Markdown rendering for backlog entities.
//!
//! Pure functions: each takes an entity (plus its parents or the story map)
//! and returns a document body. Every checklist item starts unchecked.

use std::borrow::Cow;
use std::collections::HashMap;

use crate::models::{
    display_title, Epic, Feature, Iteration, MvpSelection, PlannedStoryEntry, Project, StoryRef,
    UserStory,
};

use super::paths::{self, LinkSource};

/// Literal marker identifying stories no feature owns.
pub const ORPHAN_MARKER: &str = "Orphan story: not defined in any epic/feature";

const NO_DESCRIPTION: &str = "_No description provided._";
const NONE_DEFINED: &str = "_None defined._";

/// Fixed block appended to epic, feature and story documents.
pub const AGENT_INSTRUCTIONS: &str = "## Instructions for automated agents

This document is generated from the project backlog and tracked by its checklists.

- When an item is done, change its `- [ ]` to `- [x]` on the same line.
- Do not rename headings, reorder items, or edit the links; other documents point here.
- Add follow-up notes below this section instead of rewriting the items above.
";

/// A story already written to disk, keyed by id in [`StoryMap`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnownStory {
    pub title: String,
    /// Root-relative document path.
    pub path: String,
}

/// Story id to written document, filled during the tree walk.
pub type StoryMap = HashMap<String, KnownStory>;

/// A rendered planning document and the index entries for its stories.
#[derive(Debug, Clone)]
pub struct PlanningDocument {
    pub body: String,
    pub stories: Vec<PlannedStoryEntry>,
}

pub fn epic_document(epic: &Epic) -> String {
    let epic_doc = paths::epic_file(&epic.id);
    let mut out = format!("# Epic: {}\n\n", epic.display_title());
    out.push_str(&format!("**ID:** {}\n\n", epic.id));
    push_description(&mut out, &epic.description);

    out.push_str("## Features\n\n");
    if epic.features.is_empty() {
        out.push_str(NONE_DEFINED);
        out.push('\n');
    }
    for feature in &epic.features {
        let link = paths::relative_path(&epic_doc, &paths::feature_file(&epic.id, &feature.id));
        out.push_str(&format!(
            "- [{}]({})\n",
            feature.display_title(),
            destination(&link)
        ));
    }

    out.push_str("\n## Status\n\n");
    for feature in &epic.features {
        out.push_str(&format!("- [ ] {} complete\n", feature.display_title()));
    }
    out.push_str("- [ ] Epic accepted\n\n");
    out.push_str(AGENT_INSTRUCTIONS);
    out
}

pub fn feature_document(epic: &Epic, feature: &Feature) -> String {
    let feature_doc = paths::feature_file(&epic.id, &feature.id);
    let epic_link = paths::relative_path(&feature_doc, &paths::epic_file(&epic.id));

    let mut out = format!("# Feature: {}\n\n", feature.display_title());
    out.push_str(&format!("**ID:** {}\n", feature.id));
    out.push_str(&format!(
        "**Epic:** [{}]({})\n\n",
        epic.display_title(),
        destination(&epic_link)
    ));
    push_description(&mut out, &feature.description);

    if let Some(value) = non_blank(feature.business_value.as_deref()) {
        out.push_str(&format!("## Business Value\n\n{}\n\n", value));
    }

    out.push_str("## User Stories\n\n");
    if feature.stories.is_empty() {
        out.push_str(NONE_DEFINED);
        out.push('\n');
    }
    for story in &feature.stories {
        let link = paths::relative_path(
            &feature_doc,
            &paths::story_file(&epic.id, &feature.id, &story.id),
        );
        out.push_str(&format!(
            "- [{}: {}]({})\n",
            story.id,
            story.display_title(),
            destination(&link)
        ));
    }

    out.push_str("\n## Status\n\n");
    for story in &feature.stories {
        out.push_str(&format!("- [ ] {} done\n", story.id));
    }
    out.push_str("- [ ] Feature accepted\n\n");
    out.push_str(AGENT_INSTRUCTIONS);
    out
}

pub fn user_story_document(epic: &Epic, feature: &Feature, story: &UserStory) -> String {
    let story_doc = paths::story_file(&epic.id, &feature.id, &story.id);
    let feature_link =
        paths::relative_path(&story_doc, &paths::feature_file(&epic.id, &feature.id));
    let epic_link = paths::relative_path(&story_doc, &paths::epic_file(&epic.id));

    let mut out = format!("# User Story {}: {}\n\n", story.id, story.display_title());
    out.push_str(&format!(
        "**Feature:** [{}]({})\n",
        feature.display_title(),
        destination(&feature_link)
    ));
    out.push_str(&format!(
        "**Epic:** [{}]({})\n\n",
        epic.display_title(),
        destination(&epic_link)
    ));

    out.push_str("## Description\n\n");
    match non_blank(Some(story.description.as_str())) {
        Some(description) => out.push_str(&format!("- [ ] {}\n\n", one_line(description))),
        None => out.push_str(&format!("{NO_DESCRIPTION}\n\n")),
    }

    out.push_str("## Acceptance Criteria\n\n");
    push_checklist(&mut out, &story.acceptance_criteria);

    out.push_str("## Technical Tasks\n\n");
    push_checklist(&mut out, &story.tasks);

    let priority = non_blank(story.priority.as_deref());
    if let Some(priority) = priority {
        out.push_str(&format!("**Priority:** {}\n", priority));
    }
    if !story.dependencies.is_empty() {
        out.push_str(&format!(
            "**Dependencies:** {}\n",
            story.dependencies.join(", ")
        ));
    }
    if priority.is_some() || !story.dependencies.is_empty() {
        out.push('\n');
    }

    out.push_str(AGENT_INSTRUCTIONS);
    out
}

pub fn mvp_document(
    project: Option<&Project>,
    mvp: &MvpSelection,
    stories: &StoryMap,
) -> PlanningDocument {
    let mut body = String::from("# Minimum Viable Product\n\n");
    if let Some(project) = project.filter(|p| !p.name.is_empty()) {
        body.push_str(&format!("**Project:** {}\n\n", project.name));
        if let Some(description) = non_blank(Some(project.description.as_str())) {
            body.push_str(&format!("{}\n\n", description));
        }
    }
    body.push_str("## Stories\n\n");

    let entries = push_story_refs(&mut body, LinkSource::Mvp, &mvp.stories, stories);
    PlanningDocument {
        body,
        stories: entries,
    }
}

pub fn iteration_document(iteration: &Iteration, stories: &StoryMap) -> PlanningDocument {
    let mut body = format!(
        "# Iteration: {}\n\n",
        display_title(Some(iteration.name.as_str()))
    );
    if let Some(goal) = non_blank(iteration.goal.as_deref()) {
        body.push_str(&format!("**Goal:** {}\n\n", goal));
    }
    body.push_str("## Stories\n\n");

    let entries = push_story_refs(&mut body, LinkSource::Iteration, &iteration.stories, stories);
    PlanningDocument {
        body,
        stories: entries,
    }
}

/// Linked stories first as one checklist, then one inline block per distinct orphan id.
fn push_story_refs(
    out: &mut String,
    source: LinkSource,
    refs: &[StoryRef],
    stories: &StoryMap,
) -> Vec<PlannedStoryEntry> {
    let mut entries = Vec::with_capacity(refs.len());
    let mut orphans = Vec::new();

    if refs.is_empty() {
        out.push_str(NONE_DEFINED);
        out.push('\n');
    }

    for story_ref in refs {
        match stories.get(&story_ref.id) {
            Some(known) => {
                let link = paths::planning_link(source, &known.path);
                out.push_str(&format!(
                    "- [ ] [{}: {}]({})\n",
                    story_ref.id,
                    known.title,
                    destination(&link)
                ));
                entries.push(PlannedStoryEntry {
                    id: story_ref.id.clone(),
                    path: Some(known.path.clone()),
                    orphan: false,
                });
            }
            None => {
                out.push_str(&format!(
                    "- [ ] {}: {} (orphan, see below)\n",
                    story_ref.id,
                    story_ref.display_title()
                ));
                if !orphans.iter().any(|o: &&StoryRef| o.id == story_ref.id) {
                    orphans.push(story_ref);
                }
                entries.push(PlannedStoryEntry {
                    id: story_ref.id.clone(),
                    path: None,
                    orphan: true,
                });
            }
        }
    }

    for orphan in orphans {
        out.push('\n');
        out.push_str(&orphan_block(orphan));
    }
    entries
}

fn orphan_block(story: &StoryRef) -> String {
    let mut out = format!("### {}: {}\n\n", story.id, story.display_title());
    out.push_str(&format!("> **{ORPHAN_MARKER}**\n\n"));
    match non_blank(story.description.as_deref()) {
        Some(description) => out.push_str(&format!("- [ ] {}\n", one_line(description))),
        None => out.push_str(&format!("{NO_DESCRIPTION}\n")),
    }
    if let Some(priority) = non_blank(story.priority.as_deref()) {
        out.push_str(&format!("\n**Priority:** {}\n", priority));
    }
    out
}

/// CommonMark link destination. Paths with spaces, parentheses or angle
/// brackets are wrapped in `<...>`.
fn destination(link: &str) -> Cow<'_, str> {
    if !link.contains(|c: char| c.is_whitespace() || matches!(c, '(' | ')' | '<' | '>')) {
        return Cow::Borrowed(link);
    }
    let escaped = link.replace('<', "\\<").replace('>', "\\>");
    Cow::Owned(format!("<{}>", escaped))
}

fn push_description(out: &mut String, description: &str) {
    out.push_str("## Description\n\n");
    out.push_str(non_blank(Some(description)).unwrap_or(NO_DESCRIPTION));
    out.push_str("\n\n");
}

fn push_checklist(out: &mut String, items: &[String]) {
    let items: Vec<&str> = items.iter().filter_map(|i| non_blank(Some(i))).collect();
    if items.is_empty() {
        out.push_str(NONE_DEFINED);
        out.push('\n');
    }
    for item in items {
        out.push_str(&format!("- [ ] {}\n", one_line(item)));
    }
    out.push('\n');
}

fn non_blank(text: Option<&str>) -> Option<&str> {
    text.map(str::trim).filter(|t| !t.is_empty())
}

/// Checkbox items must stay on one line to keep their state editable.
fn one_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn story(id: &str) -> UserStory {
        UserStory {
            id: id.to_string(),
            title: Some("Login".to_string()),
            description: "As a user\nI can log in".to_string(),
            acceptance_criteria: vec!["c1".to_string(), "c2".to_string()],
            tasks: vec!["t1".to_string()],
            priority: Some("High".to_string()),
            dependencies: vec!["s0".to_string()],
        }
    }

    fn fixture() -> Epic {
        Epic {
            id: "ep1".to_string(),
            title: Some("Accounts".to_string()),
            description: "Account management".to_string(),
            features: vec![Feature {
                id: "f1".to_string(),
                title: Some("Auth".to_string()),
                description: String::new(),
                business_value: Some("Retention".to_string()),
                stories: vec![story("s1")],
            }],
        }
    }

    #[test]
    fn story_document_renders_unchecked_items() {
        let epic = fixture();
        let doc = user_story_document(&epic, &epic.features[0], &epic.features[0].stories[0]);

        assert!(doc.starts_with("# User Story s1: Login\n"));
        assert!(doc.contains("- [ ] As a user I can log in\n"));
        assert!(doc.contains("- [ ] c1\n- [ ] c2\n"));
        assert!(doc.contains("- [ ] t1\n"));
        assert!(doc.contains("**Priority:** High\n"));
        assert!(doc.contains("**Dependencies:** s0\n"));
        assert!(doc.contains("**Feature:** [Auth](../feature.md)"));
        assert!(doc.contains("**Epic:** [Accounts](../../../epic.md)"));
        assert!(doc.contains(AGENT_INSTRUCTIONS));
        assert!(!doc.contains("[x]"));
    }

    #[test]
    fn story_document_tolerates_missing_fields() {
        let epic = fixture();
        let bare = UserStory {
            id: "s9".to_string(),
            title: None,
            description: String::new(),
            acceptance_criteria: vec![],
            tasks: vec![],
            priority: None,
            dependencies: vec![],
        };
        let doc = user_story_document(&epic, &epic.features[0], &bare);

        assert!(doc.starts_with("# User Story s9: untitled\n"));
        assert!(doc.contains(NO_DESCRIPTION));
        assert!(doc.contains("## Acceptance Criteria\n\n_None defined._\n"));
        assert!(!doc.contains("**Priority:**"));
    }

    #[test]
    fn epic_document_links_features() {
        let doc = epic_document(&fixture());

        assert!(doc.contains("- [Auth](./features/f1/feature.md)\n"));
        assert!(doc.contains("- [ ] Auth complete\n"));
        assert!(doc.contains(AGENT_INSTRUCTIONS));
    }

    #[test]
    fn feature_document_links_up_and_down() {
        let epic = fixture();
        let doc = feature_document(&epic, &epic.features[0]);

        assert!(doc.contains("**Epic:** [Accounts](../../epic.md)"));
        assert!(doc.contains("- [s1: Login](./user-stories/s1.md)\n"));
        assert!(doc.contains("## Business Value\n\nRetention\n"));
        assert!(doc.contains(NO_DESCRIPTION));
    }

    #[test]
    fn planning_documents_link_known_and_inline_orphans() {
        let mut stories = StoryMap::new();
        stories.insert(
            "s1".to_string(),
            KnownStory {
                title: "Login".to_string(),
                path: paths::story_file("ep1", "f1", "s1"),
            },
        );
        let iteration = Iteration {
            name: "Sprint 1".to_string(),
            goal: Some("Ship login".to_string()),
            stories: vec![
                StoryRef::bare("s1"),
                StoryRef {
                    id: "s2".to_string(),
                    title: Some("Reset".to_string()),
                    description: Some("Reset a password".to_string()),
                    priority: Some("Low".to_string()),
                },
            ],
        };

        let doc = iteration_document(&iteration, &stories);

        assert!(doc
            .body
            .contains("- [ ] [s1: Login](../../../epics/ep1/features/f1/user-stories/s1.md)\n"));
        assert!(doc.body.contains("### s2: Reset\n"));
        assert!(doc.body.contains(ORPHAN_MARKER));
        assert!(doc.body.contains("**Priority:** Low"));
        assert_eq!(doc.stories.len(), 2);
        assert!(!doc.stories[0].orphan);
        assert!(doc.stories[1].orphan);
        assert_eq!(doc.stories[1].path, None);
    }

    #[test]
    fn repeated_orphan_gets_one_inline_block() {
        let mvp = MvpSelection {
            stories: vec![StoryRef::bare("x1"), StoryRef::bare("x1")],
        };

        let doc = mvp_document(None, &mvp, &StoryMap::new());

        assert_eq!(doc.body.matches("### x1: untitled\n").count(), 1);
        assert_eq!(doc.body.matches(ORPHAN_MARKER).count(), 1);
        assert_eq!(doc.stories.len(), 2);
    }

    #[test]
    fn link_destinations_with_spaces_are_bracketed() {
        let mut epic = fixture();
        epic.id = "ep 1".to_string();
        epic.features[0].id = "f(1)".to_string();

        let doc = epic_document(&epic);
        let feature_doc = feature_document(&epic, &epic.features[0]);

        assert!(doc.contains("- [Auth](<./features/f(1)/feature.md>)\n"));
        assert!(feature_doc.contains("**Epic:** [Accounts](../../epic.md)"));
        assert!(feature_doc.contains("- [s1: Login](./user-stories/s1.md)\n"));
        assert_eq!(destination("a<b>.md"), "<a\\<b\\>.md>");
        assert_eq!(destination("plain.md"), "plain.md");
    }

    #[test]
    fn empty_mvp_has_placeholder() {
        let doc = mvp_document(None, &MvpSelection::default(), &StoryMap::new());

        assert!(doc.body.contains("## Stories\n\n_None defined._\n"));
        assert!(doc.stories.is_empty());
    }
}
