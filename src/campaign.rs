use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SinkError;

/// Activation window shared by every record of a campaign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Campaign {
    pub id: String,
    pub active_start_hour: u8,
    pub active_start_minute: u8,
    pub active_end_hour: u8,
    pub active_end_minute: u8,
    pub active_on_weekends: bool,
    pub timezone: String,
}

/// Resolves campaign ids to their scheduling window.
///
/// Called once per file; implementations must be shareable across the files
/// of a parallel cycle.
#[async_trait]
pub trait CampaignLookup: Send + Sync {
    /// `Ok(None)` when no such campaign exists.
    async fn campaign(&self, id: &str) -> Result<Option<Campaign>, SinkError>;
}
