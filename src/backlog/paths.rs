//! Path arithmetic for the backlog tree.
//!
//! Every document location is defined here, once, as a `/`-separated path
//! relative to the backlog root. Documents are portable text, so links never
//! use host separators. Nothing in this module touches the filesystem.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::PathError;

/// Directory created under the output root.
pub const BACKLOG_DIR: &str = ".agile-planner-backlog";

pub const EPICS_DIR: &str = "epics";
pub const MVP_DIR: &str = "planning/mvp";
pub const ITERATIONS_DIR: &str = "planning/iterations";

pub const SNAPSHOT_FILE: &str = "backlog.json";
pub const INDEX_FILE: &str = "index.json";
pub const MVP_FILE: &str = "planning/mvp/mvp.md";

const EPIC_DOC: &str = "epic.md";
const FEATURE_DOC: &str = "feature.md";
const ITERATION_DOC: &str = "iteration.md";

/// Pick the output root: explicit argument, then environment override, then
/// the working directory. Relative choices are anchored at the working directory.
pub fn resolve_output_root(
    explicit: Option<&Path>,
    env_override: Option<&Path>,
    working_dir: &Path,
) -> PathBuf {
    let chosen = explicit
        .filter(|p| !p.as_os_str().is_empty())
        .or_else(|| env_override.filter(|p| !p.as_os_str().is_empty()));

    match chosen {
        Some(path) if path.is_absolute() => path.to_path_buf(),
        Some(path) => working_dir.join(path),
        None => working_dir.to_path_buf(),
    }
}

pub fn epic_dir(epic_id: &str) -> String {
    format!("{EPICS_DIR}/{epic_id}")
}

pub fn epic_file(epic_id: &str) -> String {
    format!("{}/{EPIC_DOC}", epic_dir(epic_id))
}

pub fn feature_dir(epic_id: &str, feature_id: &str) -> String {
    format!("{}/features/{feature_id}", epic_dir(epic_id))
}

pub fn feature_file(epic_id: &str, feature_id: &str) -> String {
    format!("{}/{FEATURE_DOC}", feature_dir(epic_id, feature_id))
}

pub fn stories_dir(epic_id: &str, feature_id: &str) -> String {
    format!("{}/user-stories", feature_dir(epic_id, feature_id))
}

pub fn story_file(epic_id: &str, feature_id: &str, story_id: &str) -> String {
    format!("{}/{story_id}.md", stories_dir(epic_id, feature_id))
}

pub fn iteration_dir(slug: &str) -> String {
    format!("{ITERATIONS_DIR}/{slug}")
}

pub fn iteration_file(slug: &str) -> String {
    format!("{}/{ITERATION_DOC}", iteration_dir(slug))
}

/// Lowercase, collapse runs of non-alphanumerics to `-`, trim dashes.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;
    for c in name.chars() {
        if c.is_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.extend(c.to_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}

/// Directory name for an iteration; `position` is zero-based and only used
/// when the name has no sluggable characters.
pub fn iteration_slug(name: &str, position: usize) -> String {
    let slug = slugify(name);
    if slug.is_empty() {
        format!("iteration-{}", position + 1)
    } else {
        slug
    }
}

/// Planning documents that link back to user stories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkSource {
    /// `planning/mvp/mvp.md`
    Mvp,
    /// `planning/iterations/<slug>/iteration.md`
    Iteration,
}

impl LinkSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mvp => "mvp",
            Self::Iteration => "iteration",
        }
    }

    /// Number of directories between the backlog root and the document.
    fn depth(&self) -> usize {
        match self {
            Self::Mvp => segments(MVP_DIR).count(),
            Self::Iteration => segments(ITERATIONS_DIR).count() + 1,
        }
    }
}

impl FromStr for LinkSource {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mvp" => Ok(Self::Mvp),
            "iteration" => Ok(Self::Iteration),
            other => Err(PathError::UnsupportedLinkSource(other.to_string())),
        }
    }
}

/// Link from a planning document to a root-relative target.
pub fn planning_link(source: LinkSource, target: &str) -> String {
    let mut link = "../".repeat(source.depth());
    link.push_str(target.trim_start_matches('/'));
    link
}

/// Link between two root-relative documents, from the directory holding `from_doc`.
pub fn relative_path(from_doc: &str, to: &str) -> String {
    let from_dir: Vec<&str> = {
        let mut parts: Vec<&str> = segments(from_doc).collect();
        parts.pop();
        parts
    };
    let target: Vec<&str> = segments(to).collect();

    let common = from_dir
        .iter()
        .zip(&target)
        .take_while(|(a, b)| a == b)
        .count();
    let ups = from_dir.len() - common;

    let mut link = if ups == 0 {
        String::from("./")
    } else {
        "../".repeat(ups)
    };
    link.push_str(&target[common..].join("/"));
    link
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty() && *s != ".")
}

/// Absolute locations inside one backlog root.
#[derive(Debug, Clone)]
pub struct BacklogPaths {
    root: PathBuf,
}

impl BacklogPaths {
    pub fn new(output_root: &Path) -> Self {
        Self {
            root: output_root.join(BACKLOG_DIR),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Join a root-relative `/`-separated path onto the backlog root.
    pub fn absolute(&self, relative: &str) -> PathBuf {
        segments(relative).fold(self.root.clone(), |acc, part| acc.join(part))
    }
}
