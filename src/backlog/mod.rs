//! Backlog materialization.
//!
//! Turns a validated backlog into this tree under the output root:
//!
//! ```text
//! .agile-planner-backlog/
//! ├── backlog.json
//! ├── index.json
//! ├── epics/<epicId>/epic.md
//! ├── epics/<epicId>/features/<featureId>/feature.md
//! ├── epics/<epicId>/features/<featureId>/user-stories/<storyId>.md
//! ├── planning/mvp/mvp.md
//! └── planning/iterations/<slug>/iteration.md
//! ```
//!
//! Writes happen in place with no rollback. `index.json` is written last, so
//! its presence marks a completed run.

pub mod files;
pub mod format;
pub mod paths;
pub mod validator;

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;
use tracing::Span;

use crate::error::BacklogError;
use crate::models::*;

use files::FileManager;
use format::{KnownStory, StoryMap};
use paths::BacklogPaths;

/// Per-run context: where to write and where to log.
#[derive(Debug, Clone)]
pub struct RunContext {
    output_root: PathBuf,
    span: Span,
}

impl RunContext {
    pub fn new(output_root: impl Into<PathBuf>) -> Self {
        let output_root = output_root.into();
        let span = tracing::info_span!("materialize", root = %output_root.display());
        Self { output_root, span }
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }
}

/// A completed backlog run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Materialized {
    /// Absolute backlog root (`<output root>/.agile-planner-backlog`).
    pub output_path: PathBuf,
    pub files_written: usize,
    pub index: BacklogIndex,
}

/// A completed single-feature run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureMaterialized {
    pub output_path: PathBuf,
    pub epic_id: String,
    pub feature: FeatureEntry,
    /// Whether this run created the epic document.
    pub epic_created: bool,
    pub files_written: usize,
}

/// Wire shape of a materialization result: `{success, outputPath}` or
/// `{success: false, error}`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MaterializeReport {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl From<&Result<Materialized, BacklogError>> for MaterializeReport {
    fn from(result: &Result<Materialized, BacklogError>) -> Self {
        match result {
            Ok(done) => Self {
                success: true,
                output_path: Some(done.output_path.clone()),
                error: None,
                errors: vec![],
            },
            Err(e) => Self {
                success: false,
                output_path: None,
                error: Some(e.to_string()),
                errors: e.validation_errors().to_vec(),
            },
        }
    }
}

/// Validate `input` (bare backlog or `{success, result}` envelope) and write
/// the full document tree plus its index.
///
/// Nothing is written when validation fails. An I/O failure mid-walk aborts
/// the walk and leaves already written files in place.
pub fn materialize(input: &Value, ctx: &RunContext) -> Result<Materialized, BacklogError> {
    let _span = ctx.span.enter();

    let backlog = validator::parse_backlog(input).inspect_err(|e| {
        tracing::warn!("Backlog rejected: {}", e);
    })?;
    let snapshot = validator::extract_backlog_data(input);

    let layout = BacklogPaths::new(ctx.output_root());
    let mut files = FileManager::new();

    let index = write_tree(&backlog, snapshot, &layout, &mut files).map_err(|e| {
        tracing::error!("Materialization aborted: {}", e);
        BacklogError::Partial {
            written: files.written(),
            source: Box::new(e),
        }
    })?;

    tracing::info!(
        "Materialized {} epics and {} orphan stories into {}",
        index.epics.len(),
        index.orphans.len(),
        layout.root().display()
    );

    Ok(Materialized {
        output_path: layout.root().to_path_buf(),
        files_written: files.written(),
        index,
    })
}

fn write_tree(
    backlog: &Backlog,
    snapshot: &Value,
    layout: &BacklogPaths,
    files: &mut FileManager,
) -> Result<BacklogIndex, BacklogError> {
    for dir in [paths::EPICS_DIR, paths::MVP_DIR, paths::ITERATIONS_DIR] {
        files.ensure_dir(&layout.absolute(dir))?;
    }
    files.write_file(
        &layout.absolute(paths::SNAPSHOT_FILE),
        &to_pretty_json(snapshot, "backlog snapshot")?,
    )?;

    let mut stories = StoryMap::new();
    let mut index = BacklogIndex {
        project: backlog.project.clone(),
        ..Default::default()
    };

    for epic in &backlog.epics {
        index
            .epics
            .push(write_epic(epic, layout, files, &mut stories)?);
    }

    let mvp = format::mvp_document(backlog.project.as_ref(), &backlog.mvp, &stories);
    files.write_file(&layout.absolute(paths::MVP_FILE), &mvp.body)?;
    index.mvp = PlanningEntry {
        path: paths::MVP_FILE.to_string(),
        stories: mvp.stories,
    };

    for (position, iteration) in backlog.iterations.iter().enumerate() {
        let slug = paths::iteration_slug(&iteration.name, position);
        let doc = format::iteration_document(iteration, &stories);
        files.ensure_dir(&layout.absolute(&paths::iteration_dir(&slug)))?;
        files.write_file(&layout.absolute(&paths::iteration_file(&slug)), &doc.body)?;
        index.iterations.push(IterationEntry {
            name: iteration.name.clone(),
            document: PlanningEntry {
                path: paths::iteration_file(&slug),
                stories: doc.stories,
            },
            slug,
        });
    }

    index.orphans = collect_orphans(&index);

    files.write_file(
        &layout.absolute(paths::INDEX_FILE),
        &to_pretty_json(&index, "backlog index")?,
    )?;
    Ok(index)
}

/// Depth-first: stories, then their feature, then the epic, so every
/// document only links to files that already exist.
fn write_epic(
    epic: &Epic,
    layout: &BacklogPaths,
    files: &mut FileManager,
    stories: &mut StoryMap,
) -> Result<EpicEntry, BacklogError> {
    files.ensure_dir(&layout.absolute(&paths::epic_dir(&epic.id)))?;

    let mut features = Vec::with_capacity(epic.features.len());
    for feature in &epic.features {
        let entry = write_feature(epic, feature, layout, files)?;
        for story in &entry.stories {
            stories.insert(
                story.id.clone(),
                KnownStory {
                    title: story.title.clone(),
                    path: story.path.clone(),
                },
            );
        }
        features.push(entry);
    }

    let path = paths::epic_file(&epic.id);
    files.write_file(&layout.absolute(&path), &format::epic_document(epic))?;
    tracing::debug!("Epic {} written with {} features", epic.id, features.len());

    Ok(EpicEntry {
        id: epic.id.clone(),
        title: epic.display_title().to_string(),
        path,
        features,
    })
}

fn write_feature(
    epic: &Epic,
    feature: &Feature,
    layout: &BacklogPaths,
    files: &mut FileManager,
) -> Result<FeatureEntry, BacklogError> {
    files.ensure_dir(&layout.absolute(&paths::stories_dir(&epic.id, &feature.id)))?;

    let mut stories = Vec::with_capacity(feature.stories.len());
    for story in &feature.stories {
        let path = paths::story_file(&epic.id, &feature.id, &story.id);
        files.write_file(
            &layout.absolute(&path),
            &format::user_story_document(epic, feature, story),
        )?;
        stories.push(StoryEntry {
            id: story.id.clone(),
            title: story.display_title().to_string(),
            path,
        });
    }

    let path = paths::feature_file(&epic.id, &feature.id);
    files.write_file(
        &layout.absolute(&path),
        &format::feature_document(epic, feature),
    )?;

    Ok(FeatureEntry {
        id: feature.id.clone(),
        title: feature.display_title().to_string(),
        path,
        stories,
    })
}

/// Orphan ids in first-seen order across the MVP and iterations.
fn collect_orphans(index: &BacklogIndex) -> Vec<String> {
    let mut orphans: Vec<String> = Vec::new();
    let planned = index
        .mvp
        .stories
        .iter()
        .chain(index.iterations.iter().flat_map(|i| i.document.stories.iter()));
    for story in planned.filter(|s| s.orphan) {
        if !orphans.contains(&story.id) {
            orphans.push(story.id.clone());
        }
    }
    orphans
}

/// Where a single generated feature should land.
#[derive(Debug, Clone)]
pub struct EpicTarget {
    pub id: String,
    pub title: Option<String>,
}

/// Validate one feature (bare or enveloped) and write it, with its stories,
/// under an epic of the backlog tree.
///
/// The epic document is only written when it does not exist yet, so features
/// added to an existing tree never clobber a fuller epic document.
pub fn materialize_feature(
    input: &Value,
    target: &EpicTarget,
    ctx: &RunContext,
) -> Result<FeatureMaterialized, BacklogError> {
    let _span = ctx.span.enter();

    validator::check_path_id(&target.id)
        .map_err(|reason| BacklogError::Validation(vec![format!("epicId {}", reason)]))?;
    let feature = validator::parse_feature(input).inspect_err(|e| {
        tracing::warn!("Feature rejected: {}", e);
    })?;

    let epic = Epic {
        id: target.id.clone(),
        title: target.title.clone(),
        description: String::new(),
        features: vec![feature],
    };
    let layout = BacklogPaths::new(ctx.output_root());
    let mut files = FileManager::new();

    let result = write_single_feature(&epic, &layout, &mut files);

    let (feature, epic_created) = result.map_err(|e| {
        tracing::error!("Feature materialization aborted: {}", e);
        BacklogError::Partial {
            written: files.written(),
            source: Box::new(e),
        }
    })?;

    tracing::info!(
        "Materialized feature {} with {} stories under epic {}",
        feature.id,
        feature.stories.len(),
        epic.id
    );

    Ok(FeatureMaterialized {
        output_path: layout.root().to_path_buf(),
        epic_id: epic.id,
        feature,
        epic_created,
        files_written: files.written(),
    })
}

fn write_single_feature(
    epic: &Epic,
    layout: &BacklogPaths,
    files: &mut FileManager,
) -> Result<(FeatureEntry, bool), BacklogError> {
    files.ensure_dir(&layout.absolute(&paths::epic_dir(&epic.id)))?;
    let entry = write_feature(epic, &epic.features[0], layout, files)?;

    let epic_file = layout.absolute(&paths::epic_file(&epic.id));
    let epic_created = !files.exists(&epic_file);
    if epic_created {
        files.write_file(&epic_file, &format::epic_document(epic))?;
    }
    Ok((entry, epic_created))
}

fn to_pretty_json<T: Serialize + ?Sized>(
    value: &T,
    what: &'static str,
) -> Result<String, BacklogError> {
    let mut json = serde_json::to_string_pretty(value)
        .map_err(|source| BacklogError::Serialize { what, source })?;
    json.push('\n');
    Ok(json)
}
