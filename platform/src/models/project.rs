//! Project models

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use openapi_server::models::ProjectView;
use serde::{Deserialize, Serialize};

/// Framework tag carried on a project; informational only
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Framework {
    Next,
    Vite,
    Svelte,
    React,
    Vue,
    Angular,
    Static,
    #[default]
    Other,
}

impl Framework {
    pub fn as_str(&self) -> &'static str {
        match self {
            Framework::Next => "NEXT",
            Framework::Vite => "VITE",
            Framework::Svelte => "SVELTE",
            Framework::React => "REACT",
            Framework::Vue => "VUE",
            Framework::Angular => "ANGULAR",
            Framework::Static => "STATIC",
            Framework::Other => "OTHER",
        }
    }
}

impl fmt::Display for Framework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Framework {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "NEXT" | "NEXTJS" => Ok(Framework::Next),
            "VITE" => Ok(Framework::Vite),
            "SVELTE" => Ok(Framework::Svelte),
            "REACT" => Ok(Framework::React),
            "VUE" => Ok(Framework::Vue),
            "ANGULAR" => Ok(Framework::Angular),
            "STATIC" => Ok(Framework::Static),
            "OTHER" => Ok(Framework::Other),
            _ => Err(format!("Unknown framework: {}", s)),
        }
    }
}

/// A registered source repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    /// Unique project ID
    pub id: String,

    /// Human name
    pub name: String,

    /// Source repository URL
    pub repo_url: String,

    /// Globally unique routing slug, never changes after creation
    pub slug: String,

    /// Optional custom domain
    pub custom_domain: Option<String>,

    /// Framework tag passed to the build job
    pub framework: Framework,

    /// Most recently created deployment (weak reference)
    pub latest_deployment_id: Option<String>,

    /// Created timestamp
    pub created_at: DateTime<Utc>,
}

impl Project {
    pub fn to_view(&self) -> ProjectView {
        ProjectView {
            id: self.id.clone(),
            name: self.name.clone(),
            git_repo_url: self.repo_url.clone(),
            slug: self.slug.clone(),
            framework: self.framework.to_string(),
            custom_domain: self.custom_domain.clone(),
            latest_deployment_id: self.latest_deployment_id.clone(),
            created_at: self.created_at,
        }
    }
}

/// Input for project registration
#[derive(Debug, Clone)]
pub struct NewProject {
    pub name: String,
    pub repo_url: String,
    pub framework: Framework,
    pub custom_domain: Option<String>,
}
