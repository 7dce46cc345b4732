//! Stage registry.
//!
//! The ordered list of stages is fixed for the lifetime of the process.
//! Route lookups go through a map built once at construction.

use std::collections::HashMap;
use std::path::PathBuf;

use thiserror::Error;

use crate::domain::Stage;

/// Path segments the status server keeps for itself
pub const RESERVED_ROUTES: &[&str] = &["api"];

/// Errors that make the pipeline configuration unusable
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Stage registry is empty")]
    EmptyRegistry,

    #[error("Stage {index} has an empty id")]
    EmptyId { index: usize },

    #[error("Duplicate stage id: {0}")]
    DuplicateId(String),

    #[error("Route '{route}' is used by both '{first}' and '{second}'")]
    DuplicateRoute {
        route: String,
        first: String,
        second: String,
    },

    #[error("Stage '{stage}' has an invalid route '{route}': {reason}")]
    InvalidRoute {
        stage: String,
        route: String,
        reason: &'static str,
    },

    #[error("Execution target for stage '{stage}' not found: {}", path.display())]
    MissingTarget { stage: String, path: PathBuf },

    #[error("Schedule interval must be between 1 and {max} minutes (got {got})")]
    InvalidInterval { got: u64, max: u64 },
}

/// Immutable ordered collection of stages
#[derive(Debug, Clone)]
pub struct StageRegistry {
    stages: Vec<Stage>,
    routes: HashMap<String, usize>,
}

impl StageRegistry {
    /// Build a registry, enforcing unique ids and routes
    pub fn new(stages: Vec<Stage>) -> Result<Self, ConfigError> {
        if stages.is_empty() {
            return Err(ConfigError::EmptyRegistry);
        }

        let mut ids: HashMap<&str, usize> = HashMap::new();
        let mut routes: HashMap<String, usize> = HashMap::new();

        for (index, stage) in stages.iter().enumerate() {
            if stage.id.trim().is_empty() {
                return Err(ConfigError::EmptyId { index });
            }

            if ids.insert(stage.id.as_str(), index).is_some() {
                return Err(ConfigError::DuplicateId(stage.id.clone()));
            }

            if let Some(ref route) = stage.route {
                validate_route(&stage.id, route)?;

                if let Some(&first) = routes.get(route) {
                    return Err(ConfigError::DuplicateRoute {
                        route: route.clone(),
                        first: stages[first].id.clone(),
                        second: stage.id.clone(),
                    });
                }
                routes.insert(route.clone(), index);
            }
        }

        Ok(Self { stages, routes })
    }

    /// Stages in execution order
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Number of stages
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Always false for a constructed registry
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Get a stage by id
    pub fn get(&self, id: &str) -> Option<&Stage> {
        self.stages.iter().find(|s| s.id == id)
    }

    /// Resolve the stage served under `route`
    pub fn stage_for_route(&self, route: &str) -> Option<&Stage> {
        self.routes.get(route).map(|&idx| &self.stages[idx])
    }

    /// Stage ids in execution order
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.stages.iter().map(|s| s.id.as_str())
    }
}

fn validate_route(stage: &str, route: &str) -> Result<(), ConfigError> {
    let invalid = |reason| ConfigError::InvalidRoute {
        stage: stage.to_string(),
        route: route.to_string(),
        reason,
    };

    if route.is_empty() {
        return Err(invalid("route is empty"));
    }
    if route.contains('/') {
        return Err(invalid("route must be a single path segment"));
    }
    if route.chars().any(char::is_whitespace) {
        return Err(invalid("route contains whitespace"));
    }
    if RESERVED_ROUTES.contains(&route) {
        return Err(invalid("route is reserved"));
    }

    Ok(())
}
