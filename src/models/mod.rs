//! Data models for the DHQ crime reporting backend.
//!
//! Field names serialize in camelCase to match the dashboard client.

mod assignment;
mod audit;
mod commander;
mod notification;
mod report;
mod user;

pub use assignment::*;
pub use audit::*;
pub use commander::*;
pub use notification::*;
pub use report::*;
pub use user::*;

use serde::{Deserialize, Serialize};

/// Revision information for change detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevisionInfo {
    pub revision_id: i64,
    pub generated_at: String,
}
