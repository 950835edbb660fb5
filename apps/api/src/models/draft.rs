use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::generation::insights::TranscriptInsights;
use crate::models::proposal::{Proposal, ProposalRequest};

/// One persisted version of a draft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftSnapshot {
    pub draft_id: Uuid,
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub privacy_mode: bool,
    pub request: ProposalRequest,
    #[serde(default)]
    pub insights: Option<TranscriptInsights>,
    pub proposal: Proposal,
}

impl DraftSnapshot {
    /// Builds the snapshot to persist. With privacy mode on, the transcript and everything
    /// derived from it are left out; only the generated proposal content remains.
    pub fn capture(
        request: &ProposalRequest,
        insights: Option<&TranscriptInsights>,
        proposal: &Proposal,
        privacy_mode: bool,
    ) -> Self {
        let mut request = request.clone();
        request.privacy_mode = Some(privacy_mode);
        let insights = if privacy_mode {
            request.transcript = None;
            None
        } else {
            insights.cloned()
        };
        Self {
            // Assigned by the store.
            draft_id: Uuid::nil(),
            version: 0,
            saved_at: Utc::now(),
            privacy_mode,
            request,
            insights,
            proposal: proposal.clone(),
        }
    }
}

/// Listing entry for one stored version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftVersion {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftSummary {
    pub draft_id: Uuid,
    pub latest_version: u32,
    pub project_title: String,
    pub saved_at: DateTime<Utc>,
}
