use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Placeholder rendered for entities without a title.
pub const UNTITLED: &str = "untitled";

/// Top-level identity of the planned project.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    #[serde(default, deserialize_with = "text")]
    pub name: String,
    #[serde(default, deserialize_with = "text")]
    pub description: String,
}

/// A complete backlog, already unwrapped from any `{success, result}` envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Backlog {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<Project>,
    pub epics: Vec<Epic>,
    #[serde(default)]
    pub mvp: MvpSelection,
    #[serde(default, deserialize_with = "list_or_null")]
    pub iterations: Vec<Iteration>,
}

/// A large body of work grouping related features.
///
/// The `id` is used verbatim as a directory name so re-runs land on the same paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Epic {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "text")]
    pub description: String,
    #[serde(default, deserialize_with = "list_or_null")]
    pub features: Vec<Feature>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feature {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "text")]
    pub description: String,
    #[serde(default, deserialize_with = "opt_text")]
    pub business_value: Option<String>,
    #[serde(default, deserialize_with = "list_or_null")]
    pub stories: Vec<UserStory>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStory {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "text")]
    pub description: String,
    #[serde(default, deserialize_with = "list_or_null")]
    pub acceptance_criteria: Vec<String>,
    #[serde(default, deserialize_with = "list_or_null")]
    pub tasks: Vec<String>,
    /// Free-form priority; models emit both labels ("High") and numbers.
    #[serde(default, deserialize_with = "opt_text")]
    pub priority: Option<String>,
    #[serde(default, deserialize_with = "list_or_null")]
    pub dependencies: Vec<String>,
}

/// The ordered minimum viable scope.
///
/// Accepts either a bare list of references or an object carrying the list
/// under `stories` (or `userStories`). `null` reads as an empty selection.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MvpSelection {
    pub stories: Vec<StoryRef>,
}

impl<'de> Deserialize<'de> for MvpSelection {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let list = match Option::<Value>::deserialize(deserializer)? {
            None | Some(Value::Null) => return Ok(Self::default()),
            Some(Value::Object(mut object)) => {
                match object.remove("stories").filter(|v| !v.is_null()) {
                    Some(stories) => stories,
                    None => object.remove("userStories").unwrap_or(Value::Null),
                }
            }
            Some(other) => other,
        };
        let stories = Option::<Vec<StoryRef>>::deserialize(list)
            .map_err(de::Error::custom)?
            .unwrap_or_default();
        Ok(Self { stories })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Iteration {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal: Option<String>,
    #[serde(default, deserialize_with = "list_or_null")]
    pub stories: Vec<StoryRef>,
}

/// A planning document's pointer to a story.
///
/// Deserializes from a bare id string or an object. The optional fields are
/// only rendered when the id resolves to no feature-owned story.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "StoryRefShape")]
pub struct StoryRef {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StoryRefShape {
    Id(String),
    Inline {
        id: String,
        #[serde(default)]
        title: Option<String>,
        #[serde(default)]
        description: Option<String>,
        #[serde(default, deserialize_with = "opt_text")]
        priority: Option<String>,
    },
}

impl From<StoryRefShape> for StoryRef {
    fn from(shape: StoryRefShape) -> Self {
        match shape {
            StoryRefShape::Id(id) => Self::bare(id),
            StoryRefShape::Inline {
                id,
                title,
                description,
                priority,
            } => Self {
                id,
                title,
                description,
                priority,
            },
        }
    }
}

impl StoryRef {
    pub fn bare(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: None,
            description: None,
            priority: None,
        }
    }

    pub fn display_title(&self) -> &str {
        display_title(self.title.as_deref())
    }
}

/// Title or the [`UNTITLED`] placeholder when missing or blank.
pub fn display_title(title: Option<&str>) -> &str {
    match title {
        Some(t) if !t.trim().is_empty() => t,
        _ => UNTITLED,
    }
}

impl Epic {
    pub fn display_title(&self) -> &str {
        display_title(self.title.as_deref())
    }
}

impl Feature {
    pub fn display_title(&self) -> &str {
        display_title(self.title.as_deref())
    }
}

impl UserStory {
    pub fn display_title(&self) -> &str {
        display_title(self.title.as_deref())
    }
}

/// A list where `null` reads as empty.
fn list_or_null<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Like [`opt_text`], with `null` read as empty.
fn text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(opt_text(deserializer)?.unwrap_or_default())
}

/// Accepts a string, a number or a bool and keeps its textual form.
fn opt_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}
