//! Stage definitions.
//!
//! A stage is immutable once the registry is built.

use serde::{Deserialize, Serialize};

/// One named unit of sequential work plus its optional HTTP route
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    /// Stable, unique identifier (also the executor's target name)
    pub id: String,

    /// Path segment the status server serves this stage's report under
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<String>,
}

impl Stage {
    /// Create a stage with a route
    pub fn new(id: impl Into<String>, route: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            route: Some(route.into()),
        }
    }

    /// Create a stage that is executed but not served over HTTP
    pub fn unrouted(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            route: None,
        }
    }

    /// Human-readable title derived from the id
    pub fn title(&self) -> String {
        title_from_id(&self.id)
    }

    /// Parse the compact `id:route` form used by `STAGEPIPE_STAGES`
    pub fn parse_compact(entry: &str) -> Option<Self> {
        let entry = entry.trim();
        if entry.is_empty() {
            return None;
        }

        match entry.split_once(':') {
            Some((id, route)) if route.trim().is_empty() => Some(Self::unrouted(id.trim())),
            Some((id, route)) => Some(Self::new(id.trim(), route.trim())),
            None => Some(Self::unrouted(entry)),
        }
    }
}

/// Title-case an id ("sample_stage_1" -> "Sample Stage 1")
pub fn title_from_id(id: &str) -> String {
    id.split(['_', '-'])
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}
