use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Number of sections every proposal carries.
pub const SECTION_COUNT: usize = 12;

/// Brand voice requested for the proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Tone {
    Formal,
    Friendly,
    FounderStyle,
    Professional,
    Warm,
    Bold,
    Concise,
}

impl Tone {
    pub fn label(&self) -> &'static str {
        match self {
            Tone::Formal => "Formal",
            Tone::Friendly => "Friendly",
            Tone::FounderStyle => "Founder-style",
            Tone::Professional => "Professional",
            Tone::Warm => "Warm",
            Tone::Bold => "Bold",
            Tone::Concise => "Concise",
        }
    }
}

/// Logo uploaded alongside the request, carried inline as base64.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogoAsset {
    pub media_type: String,
    pub data_base64: String,
}

/// Structured inputs for one generation session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposalRequest {
    pub company_name: String,
    pub client_name: String,
    pub project_title: String,
    pub goals: String,
    pub budget: String,
    pub timeline: String,
    pub tone: Tone,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub additional_notes: Option<String>,
    #[serde(default)]
    pub transcript: Option<String>,
    #[serde(default)]
    pub logo: Option<LogoAsset>,
    /// `None` defers to the configured default.
    #[serde(default)]
    pub privacy_mode: Option<bool>,
}

impl ProposalRequest {
    pub fn language(&self) -> &str {
        self.language
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .unwrap_or("English")
    }

    /// Returns the transcript only when it carries text.
    pub fn transcript_text(&self) -> Option<&str> {
        self.transcript.as_deref().filter(|t| !t.trim().is_empty())
    }
}

/// The fixed, ordered section schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    CoverPage,
    ExecutiveSummary,
    ProblemOpportunity,
    ProposedSolution,
    ScopeOfWork,
    TimelineMilestones,
    PricingPayment,
    RoiImpact,
    RisksMitigations,
    TermsConditions,
    NextSteps,
    Appendix,
}

impl SectionKind {
    pub const ALL: [SectionKind; SECTION_COUNT] = [
        SectionKind::CoverPage,
        SectionKind::ExecutiveSummary,
        SectionKind::ProblemOpportunity,
        SectionKind::ProposedSolution,
        SectionKind::ScopeOfWork,
        SectionKind::TimelineMilestones,
        SectionKind::PricingPayment,
        SectionKind::RoiImpact,
        SectionKind::RisksMitigations,
        SectionKind::TermsConditions,
        SectionKind::NextSteps,
        SectionKind::Appendix,
    ];

    pub fn title(&self) -> &'static str {
        match self {
            SectionKind::CoverPage => "Cover Page",
            SectionKind::ExecutiveSummary => "Executive Summary",
            SectionKind::ProblemOpportunity => "Problem & Opportunity",
            SectionKind::ProposedSolution => "Proposed Solution",
            SectionKind::ScopeOfWork => "Scope of Work & Deliverables",
            SectionKind::TimelineMilestones => "Timeline & Milestones",
            SectionKind::PricingPayment => "Pricing & Payment Terms",
            SectionKind::RoiImpact => "ROI / Impact / Metrics",
            SectionKind::RisksMitigations => "Risks & Mitigations",
            SectionKind::TermsConditions => "Terms & Conditions",
            SectionKind::NextSteps => "Next Steps & CTA",
            SectionKind::Appendix => "Appendix",
        }
    }

    /// Position of the section within the proposal.
    pub fn index(&self) -> usize {
        *self as usize
    }

    /// Looks a kind up by its title, ignoring case and surrounding whitespace.
    pub fn from_title(title: &str) -> Option<SectionKind> {
        let wanted = title.trim();
        SectionKind::ALL
            .into_iter()
            .find(|k| k.title().eq_ignore_ascii_case(wanted))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionStatus {
    Pending,
    Generated,
    Edited,
    Regenerating,
}

/// A body that was replaced by an edit or a regeneration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionRevision {
    pub body: String,
    pub status: SectionStatus,
    pub replaced_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub kind: SectionKind,
    pub title: String,
    pub body: String,
    pub status: SectionStatus,
    #[serde(default)]
    pub history: Vec<SectionRevision>,
}

impl Section {
    pub fn pending(kind: SectionKind) -> Self {
        Self {
            kind,
            title: kind.title().to_string(),
            body: String::new(),
            status: SectionStatus::Pending,
            history: Vec::new(),
        }
    }

    /// Replaces the body, keeping the previous one in the section's history.
    /// An empty body always lands in `Pending`. Callers restore a regeneration
    /// claim's prior status first, so history never records `Regenerating`.
    fn replace_body(&mut self, body: String, status: SectionStatus) {
        if !self.body.is_empty() {
            self.history.push(SectionRevision {
                body: std::mem::take(&mut self.body),
                status: self.status,
                replaced_at: Utc::now(),
            });
        }
        if body.trim().is_empty() {
            self.body = String::new();
            self.status = SectionStatus::Pending;
        } else {
            self.body = body;
            self.status = status;
        }
    }
}

/// Non-sensitive request facts the proposal keeps for scoring and export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposalMeta {
    pub company_name: String,
    pub client_name: String,
    pub project_title: String,
    pub goals: String,
    pub budget: String,
    pub timeline: String,
    pub tone: Tone,
    pub language: String,
}

impl From<&ProposalRequest> for ProposalMeta {
    fn from(request: &ProposalRequest) -> Self {
        Self {
            company_name: request.company_name.trim().to_string(),
            client_name: request.client_name.trim().to_string(),
            project_title: request.project_title.trim().to_string(),
            goals: request.goals.trim().to_string(),
            budget: request.budget.trim().to_string(),
            timeline: request.timeline.trim().to_string(),
            tone: request.tone,
            language: request.language().to_string(),
        }
    }
}

/// An editable proposal: always exactly [`SECTION_COUNT`] sections in schema order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub meta: ProposalMeta,
    pub sections: [Section; SECTION_COUNT],
    /// Bumped on every content change; identifies the snapshot an export came from.
    pub revision: u64,
}

impl Proposal {
    pub fn new(meta: ProposalMeta) -> Self {
        Self {
            meta,
            sections: SectionKind::ALL.map(Section::pending),
            revision: 0,
        }
    }

    pub fn section(&self, kind: SectionKind) -> &Section {
        &self.sections[kind.index()]
    }

    /// Stores freshly generated text for one section.
    pub fn apply_generated(&mut self, kind: SectionKind, body: String) {
        self.sections[kind.index()].replace_body(body, SectionStatus::Generated);
        self.revision += 1;
    }

    /// Stores a user edit for one section.
    pub fn apply_edit(&mut self, kind: SectionKind, body: String) {
        self.sections[kind.index()].replace_body(body, SectionStatus::Edited);
        self.revision += 1;
    }

    /// Flags a section as being regenerated. A section without a body stays `Pending`.
    /// Returns the status to restore if the regeneration does not land.
    pub fn mark_regenerating(&mut self, kind: SectionKind) -> SectionStatus {
        let section = &mut self.sections[kind.index()];
        let previous = section.status;
        if !section.body.is_empty() {
            section.status = SectionStatus::Regenerating;
        }
        previous
    }

    pub fn restore_status(&mut self, kind: SectionKind, status: SectionStatus) {
        let section = &mut self.sections[kind.index()];
        if section.status == SectionStatus::Regenerating {
            section.status = status;
        }
    }

    pub fn is_complete(&self) -> bool {
        self.sections.iter().all(|s| !s.body.trim().is_empty())
    }

    /// Checks the schema invariants: kinds and titles in order, empty bodies only when pending.
    pub fn check_invariants(&self) -> Result<(), String> {
        for (position, (section, kind)) in self.sections.iter().zip(SectionKind::ALL).enumerate() {
            if section.kind != kind {
                return Err(format!(
                    "section {position} is {:?}, expected {:?}",
                    section.kind, kind
                ));
            }
            if section.title != kind.title() {
                return Err(format!(
                    "section {position} has title '{}', expected '{}'",
                    section.title,
                    kind.title()
                ));
            }
            if section.body.is_empty() && section.status != SectionStatus::Pending {
                return Err(format!(
                    "section '{}' is {:?} with an empty body",
                    section.title, section.status
                ));
            }
        }
        Ok(())
    }

    /// Renders the whole proposal as Markdown, one `#` heading per section.
    pub fn to_markdown(&self) -> String {
        self.sections
            .iter()
            .map(|s| format!("# {}\n\n{}", s.title, s.body.trim()))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_new_proposal_has_twelve_pending_sections_in_order() {
        let proposal = Proposal::new(ProposalMeta::from(&acme_request()));
        assert_eq!(proposal.sections.len(), SECTION_COUNT);
        for (section, kind) in proposal.sections.iter().zip(SectionKind::ALL) {
            assert_eq!(section.kind, kind);
            assert_eq!(section.status, SectionStatus::Pending);
            assert!(section.body.is_empty());
        }
        assert!(proposal.check_invariants().is_ok());
    }

    #[test]
    fn test_kind_index_matches_schema_position() {
        for (position, kind) in SectionKind::ALL.iter().enumerate() {
            assert_eq!(kind.index(), position);
        }
    }

    #[test]
    fn test_from_title_is_case_insensitive() {
        assert_eq!(
            SectionKind::from_title("  pricing & payment terms "),
            Some(SectionKind::PricingPayment)
        );
        assert_eq!(SectionKind::from_title("Budget"), None);
    }

    #[test]
    fn test_edit_to_empty_body_returns_section_to_pending() {
        let mut proposal = filled_proposal();
        proposal.apply_edit(SectionKind::Appendix, "   ".to_string());
        let section = proposal.section(SectionKind::Appendix);
        assert_eq!(section.status, SectionStatus::Pending);
        assert!(section.body.is_empty());
        assert_eq!(section.history.len(), 1);
        assert!(proposal.check_invariants().is_ok());
    }

    #[test]
    fn test_regenerating_a_pending_section_keeps_it_pending() {
        let mut proposal = Proposal::new(ProposalMeta::from(&acme_request()));
        let previous = proposal.mark_regenerating(SectionKind::Appendix);
        assert_eq!(previous, SectionStatus::Pending);
        assert_eq!(
            proposal.section(SectionKind::Appendix).status,
            SectionStatus::Pending
        );
    }

    #[test]
    fn test_replaced_body_is_kept_in_history() {
        let mut proposal = filled_proposal();
        let before = proposal.section(SectionKind::ScopeOfWork).body.clone();
        proposal.mark_regenerating(SectionKind::ScopeOfWork);
        proposal.apply_generated(SectionKind::ScopeOfWork, "New scope text".to_string());
        let section = proposal.section(SectionKind::ScopeOfWork);
        assert_eq!(section.status, SectionStatus::Generated);
        assert_eq!(section.history.last().map(|r| r.body.as_str()), Some(before.as_str()));
    }

    #[test]
    fn test_tone_serializes_kebab_case() {
        let json = serde_json::to_string(&Tone::FounderStyle).unwrap();
        assert_eq!(json, "\"founder-style\"");
    }

    #[test]
    fn test_invariant_check_rejects_reordered_sections() {
        let mut proposal = filled_proposal();
        proposal.sections.swap(0, 1);
        assert!(proposal.check_invariants().is_err());
    }
}
