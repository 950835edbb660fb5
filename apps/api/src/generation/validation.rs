use serde::{Deserialize, Serialize};

use crate::export::logo::decode_logo;
use crate::models::proposal::ProposalRequest;

/// Minimum number of characters a timeline must carry.
pub const MIN_TIMELINE_CHARS: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<FieldError>,
}

/// Validates a request before any generation is allowed.
///
/// Rules:
/// - company name, client name, project title, goals and budget are non-empty after trimming
/// - timeline has at least [`MIN_TIMELINE_CHARS`] characters after trimming
/// - a logo, when present, is a decodable PNG or JPEG
///
/// Pure: no side effects, every failing field is reported.
pub fn validate_request(request: &ProposalRequest) -> ValidationReport {
    let mut errors = Vec::new();

    let required = [
        ("company_name", &request.company_name, "Company name is required"),
        ("client_name", &request.client_name, "Client name is required"),
        ("project_title", &request.project_title, "Project title is required"),
        ("goals", &request.goals, "Goals are required"),
        ("budget", &request.budget, "Budget is required"),
    ];
    for (field, value, message) in required {
        if value.trim().is_empty() {
            errors.push(FieldError::new(field, message));
        }
    }

    // Length counts the value as entered; blank input is reported as missing.
    let timeline_len = request.timeline.chars().count();
    if request.timeline.trim().is_empty() {
        errors.push(FieldError::new("timeline", "Timeline is required"));
    } else if timeline_len < MIN_TIMELINE_CHARS {
        errors.push(FieldError::new(
            "timeline",
            format!("Timeline appears too short (minimum {MIN_TIMELINE_CHARS} characters)"),
        ));
    }

    if let Some(logo) = &request.logo {
        if let Err(e) = decode_logo(logo) {
            errors.push(FieldError::new("logo", e.to_string()));
        }
    }

    ValidationReport {
        valid: errors.is_empty(),
        errors,
    }
}
