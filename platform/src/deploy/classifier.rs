//! Build log classification
//!
//! Maps one raw log line to an optional status signal. Matching is heuristic
//! on free-text build output; a false terminal match is contained by the
//! registry's terminal-state guard.

use serde::{Deserialize, Serialize};

use crate::deploy::fsm::DeploymentStatus;

/// Log line classifier
pub trait Classifier: Send + Sync {
    /// Status implied by `line`, if any. Must be pure.
    fn classify(&self, line: &str) -> Option<DeploymentStatus>;
}

/// Classifier settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifierOptions {
    /// Substring announcing the build started
    #[serde(default = "default_build_start_marker")]
    pub build_start_marker: String,

    /// Exact line confirming the artifact upload
    #[serde(default = "default_success_sentinel")]
    pub success_sentinel: String,
}

fn default_build_start_marker() -> String {
    "Starting build".to_string()
}

fn default_success_sentinel() -> String {
    "Upload complete".to_string()
}

impl Default for ClassifierOptions {
    fn default() -> Self {
        Self {
            build_start_marker: default_build_start_marker(),
            success_sentinel: default_success_sentinel(),
        }
    }
}

/// Substring and sentinel matching, first match wins:
/// start marker, success sentinel, then `error`/`failed` in any case.
#[derive(Debug, Clone, Default)]
pub struct SubstringClassifier {
    options: ClassifierOptions,
}

impl SubstringClassifier {
    pub fn new(options: ClassifierOptions) -> Self {
        Self { options }
    }
}

impl Classifier for SubstringClassifier {
    fn classify(&self, line: &str) -> Option<DeploymentStatus> {
        if !self.options.build_start_marker.is_empty()
            && line.contains(&self.options.build_start_marker)
        {
            return Some(DeploymentStatus::InProgress);
        }

        if line.trim_end_matches(['\r', '\n']) == self.options.success_sentinel {
            return Some(DeploymentStatus::Completed);
        }

        let lowered = line.to_lowercase();
        if lowered.contains("error") || lowered.contains("failed") {
            return Some(DeploymentStatus::Failed);
        }

        None
    }
}

/// Classify with the default markers
pub fn classify(line: &str) -> Option<DeploymentStatus> {
    SubstringClassifier::default().classify(line)
}
