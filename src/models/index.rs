use serde::{Deserialize, Serialize};

use super::Project;

/// Manifest of one materialization run.
///
/// Every path is relative to the backlog root and `/`-separated. The index
/// carries no timestamps, so identical input produces an identical file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BacklogIndex {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<Project>,
    pub epics: Vec<EpicEntry>,
    pub mvp: PlanningEntry,
    pub iterations: Vec<IterationEntry>,
    /// Ids of every story rendered inline because no feature owns it.
    pub orphans: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpicEntry {
    pub id: String,
    pub title: String,
    pub path: String,
    pub features: Vec<FeatureEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureEntry {
    pub id: String,
    pub title: String,
    pub path: String,
    pub stories: Vec<StoryEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryEntry {
    pub id: String,
    pub title: String,
    pub path: String,
}

/// A planning document (MVP or iteration) and the stories it references.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanningEntry {
    pub path: String,
    pub stories: Vec<PlannedStoryEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IterationEntry {
    pub name: String,
    pub slug: String,
    #[serde(flatten)]
    pub document: PlanningEntry,
}

/// A story as referenced from a planning document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedStoryEntry {
    pub id: String,
    /// Story document path; `None` for orphans, which live inline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub orphan: bool,
}
