//! Raw artifacts and executor outcomes.
//!
//! An artifact is whatever a stage's executor produced, including partial
//! output from a failed run. The renderer turns it into a viewable report.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Reference to the raw output of one stage execution
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    /// Stage that produced the artifact
    pub stage_id: String,

    /// File the executor wrote its output to (may not exist after a failure)
    pub path: Option<PathBuf>,

    /// Captured stdout/stderr of the execution
    pub log: String,
}

impl ArtifactRef {
    /// Artifact with no file and no log
    pub fn empty(stage_id: impl Into<String>) -> Self {
        Self {
            stage_id: stage_id.into(),
            path: None,
            log: String::new(),
        }
    }

    /// Artifact backed by a file
    pub fn at_path(stage_id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            stage_id: stage_id.into(),
            path: Some(path.into()),
            log: String::new(),
        }
    }

    /// Attach captured output
    pub fn with_log(mut self, log: impl Into<String>) -> Self {
        self.log = log.into();
        self
    }

    /// True if the referenced file exists on disk
    pub fn file_exists(&self) -> bool {
        self.path.as_ref().map(|p| p.is_file()).unwrap_or(false)
    }
}

/// Result reported by the executor for one stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    /// Whether the stage succeeded
    pub success: bool,

    /// Raw artifact, present even on failure
    pub artifact: ArtifactRef,

    /// Failure detail (only meaningful when `success` is false)
    pub error_detail: Option<String>,
}

impl Outcome {
    /// Successful execution
    pub fn success(artifact: ArtifactRef) -> Self {
        Self {
            success: true,
            artifact,
            error_detail: None,
        }
    }

    /// Failed execution
    pub fn failure(artifact: ArtifactRef, detail: impl Into<String>) -> Self {
        Self {
            success: false,
            artifact,
            error_detail: Some(detail.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_constructors() {
        let ok = Outcome::success(ArtifactRef::at_path("a", "/tmp/a.ipynb"));
        assert!(ok.success);
        assert!(ok.error_detail.is_none());

        let failed = Outcome::failure(ArtifactRef::empty("b"), "boom");
        assert!(!failed.success);
        assert_eq!(failed.error_detail.as_deref(), Some("boom"));
    }

    #[test]
    fn test_missing_file_does_not_exist() {
        let artifact = ArtifactRef::at_path("a", "/definitely/not/here.ipynb");
        assert!(!artifact.file_exists());
        assert!(!ArtifactRef::empty("a").file_exists());
    }
}
