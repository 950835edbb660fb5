//! Editing sessions: the explicit context object a proposal lives in.
//!
//! A session is created by a generation request and lives until it is deleted. The
//! registry lock is never held across a generation call: sections are marked in flight
//! with a token, the call runs unlocked, and the result only lands if the token is still
//! current when it comes back.

pub mod handlers;
pub mod pipeline;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::generation::generator::{GenerationError, GenerationErrorKind};
use crate::generation::insights::TranscriptInsights;
use crate::models::proposal::{
    Proposal, ProposalMeta, ProposalRequest, Section, SectionKind, SectionStatus,
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("Session {0} not found")]
    NotFound(Uuid),

    #[error("'{}' is already being generated", .0.title())]
    InFlight(SectionKind),
}

// ────────────────────────────────────────────────────────────────────────────
// Session
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Session {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    /// Immutable once the session exists.
    pub request: ProposalRequest,
    pub privacy_mode: bool,
    pub insights: Option<TranscriptInsights>,
    /// Non-fatal problems worth showing to the user.
    pub notices: Vec<String>,
    pub proposal: Proposal,
    /// Draft this session saves into; set by the first save or by opening a draft.
    pub draft_id: Option<Uuid>,
    in_flight: HashMap<SectionKind, InFlightSection>,
    next_token: u64,
}

#[derive(Debug, Clone, Copy)]
struct InFlightSection {
    token: u64,
    previous: SectionStatus,
}

impl Session {
    pub fn new(request: ProposalRequest, privacy_mode: bool) -> Self {
        let proposal = Proposal::new(ProposalMeta::from(&request));
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            request,
            privacy_mode,
            insights: None,
            notices: Vec::new(),
            proposal,
            draft_id: None,
            in_flight: HashMap::new(),
            next_token: 1,
        }
    }

    /// A session resumed from a stored draft. Sections saved mid-regeneration come back
    /// as generated.
    pub fn resume(
        request: ProposalRequest,
        privacy_mode: bool,
        insights: Option<TranscriptInsights>,
        mut proposal: Proposal,
        draft_id: Uuid,
    ) -> Self {
        for kind in SectionKind::ALL {
            proposal.restore_status(kind, SectionStatus::Generated);
        }
        Self {
            insights,
            proposal,
            draft_id: Some(draft_id),
            ..Self::new(request, privacy_mode)
        }
    }

    pub fn is_in_flight(&self, kind: SectionKind) -> bool {
        self.in_flight.contains_key(&kind)
    }

    /// Sections with a generation call outstanding, in schema order.
    pub fn in_flight_sections(&self) -> Vec<SectionKind> {
        let mut kinds: Vec<SectionKind> = self.in_flight.keys().copied().collect();
        kinds.sort();
        kinds
    }
}

/// Everything a generation run needs, copied out of the session.
#[derive(Debug, Clone)]
pub struct GenerationInputs {
    pub request: ProposalRequest,
    pub privacy_mode: bool,
    pub insights: Option<TranscriptInsights>,
}

/// Claim on one in-flight section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    pub session_id: Uuid,
    pub kind: SectionKind,
    token: u64,
}

/// What happened to a generation result handed back to the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    Applied,
    Failed(GenerationError),
    /// The section was edited (or claimed again) while the call ran.
    Superseded,
    SessionClosed,
}

/// A section that could not be generated, as reported to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SectionFailure {
    pub section: SectionKind,
    pub title: &'static str,
    pub kind: GenerationErrorKind,
    pub message: String,
}

impl SectionFailure {
    pub fn new(section: SectionKind, error: &GenerationError) -> Self {
        Self {
            section,
            title: section.title(),
            kind: error.kind,
            message: error.message.clone(),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Registry
// ────────────────────────────────────────────────────────────────────────────

/// In-memory sessions for the single local user.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<Mutex<HashMap<Uuid, Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, session: Session) -> Uuid {
        let id = session.id;
        self.sessions.lock().await.insert(id, session);
        info!("Session {id} opened");
        id
    }

    pub async fn remove(&self, id: Uuid) -> Result<(), SessionError> {
        match self.sessions.lock().await.remove(&id) {
            Some(_) => {
                info!("Session {id} closed");
                Ok(())
            }
            None => Err(SessionError::NotFound(id)),
        }
    }

    /// Runs `f` against a session under the lock. Keep `f` short and synchronous.
    pub async fn read<T>(&self, id: Uuid, f: impl FnOnce(&Session) -> T) -> Result<T, SessionError> {
        let sessions = self.sessions.lock().await;
        sessions.get(&id).map(f).ok_or(SessionError::NotFound(id))
    }

    pub async fn update<T>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut Session) -> T,
    ) -> Result<T, SessionError> {
        let mut sessions = self.sessions.lock().await;
        sessions.get_mut(&id).map(f).ok_or(SessionError::NotFound(id))
    }

    /// Marks sections as in flight. Fails without claiming anything if one of them
    /// already is.
    pub async fn begin(
        &self,
        id: Uuid,
        kinds: &[SectionKind],
    ) -> Result<(Vec<Ticket>, GenerationInputs), SessionError> {
        let mut sessions = self.sessions.lock().await;
        let session = sessions.get_mut(&id).ok_or(SessionError::NotFound(id))?;

        if let Some(kind) = kinds.iter().copied().find(|k| session.is_in_flight(*k)) {
            return Err(SessionError::InFlight(kind));
        }

        let mut tickets = Vec::with_capacity(kinds.len());
        for &kind in kinds {
            let token = session.next_token;
            session.next_token += 1;
            let previous = session.proposal.mark_regenerating(kind);
            session
                .in_flight
                .insert(kind, InFlightSection { token, previous });
            tickets.push(Ticket {
                session_id: id,
                kind,
                token,
            });
        }
        debug!("Session {id}: {} sections in flight", tickets.len());

        let inputs = GenerationInputs {
            request: session.request.clone(),
            privacy_mode: session.privacy_mode,
            insights: session.insights.clone(),
        };
        Ok((tickets, inputs))
    }

    /// Hands a result back. It is applied only if the ticket still holds the section.
    pub async fn complete(
        &self,
        ticket: Ticket,
        result: Result<String, GenerationError>,
    ) -> Completion {
        let mut sessions = self.sessions.lock().await;
        let Some(session) = sessions.get_mut(&ticket.session_id) else {
            debug!("Dropping result for '{}': session closed", ticket.kind.title());
            return Completion::SessionClosed;
        };
        let current = session.in_flight.get(&ticket.kind).copied();
        let Some(claim) = current.filter(|c| c.token == ticket.token) else {
            debug!("Dropping stale result for '{}'", ticket.kind.title());
            return Completion::Superseded;
        };
        session.in_flight.remove(&ticket.kind);

        match result {
            Ok(body) => {
                // History records the body as it stood before the claim.
                session.proposal.restore_status(ticket.kind, claim.previous);
                session.proposal.apply_generated(ticket.kind, body);
                Completion::Applied
            }
            Err(e) => {
                session.proposal.restore_status(ticket.kind, claim.previous);
                Completion::Failed(e)
            }
        }
    }

    /// Applies a user edit. Any generation in flight for the section is abandoned.
    pub async fn edit(&self, id: Uuid, kind: SectionKind, body: String) -> Result<Section, SessionError> {
        self.update(id, |session| {
            if let Some(claim) = session.in_flight.remove(&kind) {
                info!("Edit to '{}' supersedes the pending regeneration", kind.title());
                session.proposal.restore_status(kind, claim.previous);
            }
            session.proposal.apply_edit(kind, body);
            session.proposal.section(kind).clone()
        })
        .await
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
