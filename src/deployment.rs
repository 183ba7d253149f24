//! Deployment metadata
//!
//! The deployment endpoints wrap their payload in a keyed object:
//!
//! ```json
//! { "deployment": { "id": "dpl_1", "name": "site", "url": "site.app",
//!                   "state": "READY", "created_at": 1700000000000 } }
//! { "deployments": [ ... ] }
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a deployment
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeploymentState {
    /// Built and serving; its file tree is complete
    Ready,
    /// Build failed
    Error,
    /// Build in progress
    Building,
    /// Waiting for a builder
    Queued,
    /// Cancelled before it finished
    Canceled,
    /// Any state this crate does not know yet
    #[serde(other)]
    Unknown,
}

/// One deployment as reported by the API
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
    /// Deployment id, as passed to [`crate::TreeDownloader::mirror_deployment`]
    pub id: String,
    /// Project name
    pub name: String,
    /// Hostname the deployment is served at
    pub url: String,
    /// Lifecycle state
    pub state: DeploymentState,
    /// Creation time in milliseconds since the Unix epoch
    pub created_at: i64,
    /// Free-form metadata (commit refs and the like)
    #[serde(default)]
    pub meta: HashMap<String, String>,
}

impl Deployment {
    /// Whether the deployment finished building
    pub fn is_ready(&self) -> bool {
        self.state == DeploymentState::Ready
    }
}

/// Newest ready deployment among `deployments`
pub(crate) fn latest_ready(deployments: Vec<Deployment>) -> Option<Deployment> {
    deployments
        .into_iter()
        .filter(Deployment::is_ready)
        .max_by_key(|d| d.created_at)
}
