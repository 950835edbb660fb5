//! Exporter: renders a proposal snapshot to PDF, DOCX or HTML bytes.
//!
//! Renderers sit behind the [`DocumentRenderer`] trait. Every artifact is checked before
//! it is handed out: an empty or mislabelled payload is an error, never a file.

pub mod archive;
pub mod docx;
pub mod handlers;
pub mod html;
pub mod logo;
pub mod pdf;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::{ExportConfig, ExportStyle, PdfEngine};
use crate::export::docx::DocxRenderer;
use crate::export::html::HtmlRenderer;
use crate::export::logo::{decode_logo, DecodedLogo};
use crate::export::pdf::{BuiltinPdfRenderer, WkhtmltopdfRenderer};
use crate::models::proposal::{LogoAsset, Proposal};

// ────────────────────────────────────────────────────────────────────────────
// Types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Pdf,
    Docx,
    Html,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Pdf => "pdf",
            ExportFormat::Docx => "docx",
            ExportFormat::Html => "html",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ExportFormat::Pdf => "application/pdf",
            ExportFormat::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            ExportFormat::Html => "text/html; charset=utf-8",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pdf" => Ok(ExportFormat::Pdf),
            "docx" => Ok(ExportFormat::Docx),
            "html" => Ok(ExportFormat::Html),
            other => Err(format!(
                "unknown export format '{other}' (expected pdf, docx or html)"
            )),
        }
    }
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("{engine} is not available")]
    RendererUnavailable { engine: String, hint: String },

    #[error("{format} output failed verification: {reason}")]
    Malformed { format: ExportFormat, reason: String },

    #[error("rendering {format} failed: {message}")]
    Render { format: ExportFormat, message: String },
}

impl ExportError {
    pub fn render(format: ExportFormat, message: impl fmt::Display) -> Self {
        ExportError::Render {
            format,
            message: message.to_string(),
        }
    }
}

/// A rendered file. Transient: built on demand, never stored.
#[derive(Debug, Clone)]
pub struct ExportArtifact {
    pub format: ExportFormat,
    pub bytes: Bytes,
    pub file_name: String,
    pub mime_type: &'static str,
    /// Revision of the proposal snapshot this artifact was rendered from.
    pub source_revision: u64,
}

/// Payload for pasting into an online document editor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClipboardPayload {
    pub html: String,
}

/// Everything a renderer sees.
pub struct RenderInput<'a> {
    pub proposal: &'a Proposal,
    pub logo: Option<&'a DecodedLogo>,
    pub style: &'a ExportStyle,
}

/// "Render structured document to bytes."
#[async_trait]
pub trait DocumentRenderer: Send + Sync {
    fn format(&self) -> ExportFormat;

    async fn render(&self, input: &RenderInput<'_>) -> Result<Vec<u8>, ExportError>;
}

// ────────────────────────────────────────────────────────────────────────────
// Exporter
// ────────────────────────────────────────────────────────────────────────────

pub struct Exporter {
    html: HtmlRenderer,
    docx: DocxRenderer,
    pdf: Box<dyn DocumentRenderer>,
    /// Used when the configured PDF engine is unavailable.
    pdf_fallback: Option<BuiltinPdfRenderer>,
    style: ExportStyle,
}

impl Exporter {
    pub fn from_config(config: &ExportConfig) -> Self {
        let pdf: Box<dyn DocumentRenderer> = match &config.pdf_engine {
            PdfEngine::Builtin => Box::new(BuiltinPdfRenderer),
            PdfEngine::Wkhtmltopdf { binary } => Box::new(WkhtmltopdfRenderer::new(binary.clone())),
        };
        let pdf_fallback = match config.pdf_engine {
            PdfEngine::Wkhtmltopdf { .. } if config.pdf_fallback => Some(BuiltinPdfRenderer),
            _ => None,
        };
        Self {
            html: HtmlRenderer,
            docx: DocxRenderer,
            pdf,
            pdf_fallback,
            style: config.style.clone(),
        }
    }

    /// Renders one snapshot of a proposal.
    pub async fn export(
        &self,
        proposal: &Proposal,
        logo: Option<&LogoAsset>,
        format: ExportFormat,
    ) -> Result<ExportArtifact, ExportError> {
        let logo = logo.and_then(|asset| match decode_logo(asset) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                warn!("Exporting without logo: {e}");
                None
            }
        });
        let input = RenderInput {
            proposal,
            logo: logo.as_ref(),
            style: &self.style,
        };

        let renderer: &dyn DocumentRenderer = match format {
            ExportFormat::Html => &self.html,
            ExportFormat::Docx => &self.docx,
            ExportFormat::Pdf => self.pdf.as_ref(),
        };
        let bytes = match (renderer.render(&input).await, &self.pdf_fallback) {
            (Err(ExportError::RendererUnavailable { engine, .. }), Some(fallback))
                if format == ExportFormat::Pdf =>
            {
                warn!("{engine} unavailable; using the built-in PDF renderer");
                fallback.render(&input).await?
            }
            (result, _) => result?,
        };
        verify(renderer.format(), &bytes)?;

        info!(
            "Exported {} ({} bytes, revision {})",
            format,
            bytes.len(),
            proposal.revision
        );
        Ok(ExportArtifact {
            format,
            file_name: format!("{}.{}", slugify(&proposal.meta.project_title), format.extension()),
            mime_type: format.mime_type(),
            bytes: Bytes::from(bytes),
            source_revision: proposal.revision,
        })
    }

    /// The HTML rendition wrapped for clipboard paste.
    pub async fn clipboard(
        &self,
        proposal: &Proposal,
        logo: Option<&LogoAsset>,
    ) -> Result<ClipboardPayload, ExportError> {
        let artifact = self.export(proposal, logo, ExportFormat::Html).await?;
        let html = String::from_utf8(artifact.bytes.to_vec())
            .map_err(|e| ExportError::render(ExportFormat::Html, e))?;
        Ok(ClipboardPayload { html })
    }
}

/// Rejects payloads that are empty or do not carry the format's signature.
fn verify(format: ExportFormat, bytes: &[u8]) -> Result<(), ExportError> {
    let malformed = |reason: &str| ExportError::Malformed {
        format,
        reason: reason.to_string(),
    };
    if bytes.is_empty() {
        return Err(malformed("renderer produced no bytes"));
    }
    match format {
        ExportFormat::Pdf if !bytes.starts_with(b"%PDF-") => Err(malformed("missing %PDF header")),
        ExportFormat::Docx if !bytes.starts_with(b"PK\x03\x04") => {
            Err(malformed("not a zip container"))
        }
        ExportFormat::Html if !bytes.starts_with(b"<!DOCTYPE html>") => {
            Err(malformed("missing doctype"))
        }
        _ => Ok(()),
    }
}

/// File-name stem from a title: lowercase ASCII words joined by dashes.
pub fn slugify(title: &str) -> String {
    let mut slug = String::new();
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
        if slug.len() >= 60 {
            break;
        }
    }
    let slug = slug.trim_end_matches('-');
    if slug.is_empty() {
        "proposal".to_string()
    } else {
        slug.to_string()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Plain-text blocks shared by the PDF and DOCX renderers
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Block {
    Heading(String),
    Paragraph(String),
    Bullet(String),
    /// A table row, cells joined with " | ".
    Row(String),
}

/// Flattens a Markdown section body into simple blocks. Paragraph lines are joined,
/// emphasis markers dropped and table separator rows skipped.
pub(crate) fn text_blocks(markdown: &str) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut paragraph: Vec<String> = Vec::new();

    fn flush(paragraph: &mut Vec<String>, blocks: &mut Vec<Block>) {
        if !paragraph.is_empty() {
            blocks.push(Block::Paragraph(paragraph.join(" ")));
            paragraph.clear();
        }
    }

    for line in markdown.lines() {
        let line = line.trim();
        if line.is_empty() {
            flush(&mut paragraph, &mut blocks);
        } else if line.starts_with('#') {
            flush(&mut paragraph, &mut blocks);
            let text = strip_inline(line.trim_start_matches('#').trim());
            if !text.is_empty() {
                blocks.push(Block::Heading(text));
            }
        } else if let Some(item) = bullet_text(line) {
            flush(&mut paragraph, &mut blocks);
            blocks.push(Block::Bullet(strip_inline(item)));
        } else if line.starts_with('|') {
            flush(&mut paragraph, &mut blocks);
            let cells: Vec<String> = line
                .trim_matches('|')
                .split('|')
                .map(|c| strip_inline(c.trim()))
                .collect();
            let separator = cells
                .iter()
                .all(|c| !c.is_empty() && c.chars().all(|ch| matches!(ch, '-' | ':' | ' ')));
            if !separator {
                blocks.push(Block::Row(cells.join(" | ")));
            }
        } else {
            paragraph.push(strip_inline(line));
        }
    }
    flush(&mut paragraph, &mut blocks);
    blocks
}

fn bullet_text(line: &str) -> Option<&str> {
    for marker in ["- ", "* ", "+ "] {
        if let Some(rest) = line.strip_prefix(marker) {
            return Some(rest.trim());
        }
    }
    // "1. item" / "12) item"
    let digits = line.chars().take_while(char::is_ascii_digit).count();
    if digits > 0 {
        let rest = &line[digits..];
        if let Some(item) = rest.strip_prefix(". ").or_else(|| rest.strip_prefix(") ")) {
            return Some(item.trim());
        }
    }
    None
}

fn strip_inline(text: &str) -> String {
    text.replace("**", "").replace("__", "").replace('`', "")
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
