//! Word rendition built with docx-rs: a title page, then one page per section.

use std::io::Cursor;

use async_trait::async_trait;
use docx_rs::{BreakType, Docx, Paragraph, Pic, Run, Style, StyleType};

use crate::config::ExportStyle;
use crate::export::logo::DecodedLogo;
use crate::export::{text_blocks, Block, DocumentRenderer, ExportError, ExportFormat, RenderInput};
use crate::models::proposal::Proposal;

const EMU_PER_PX: u32 = 9525;
const LOGO_HEIGHT_PX: u64 = 60;
// Text width of a Letter page with one-inch margins, at 96 px per inch.
const MAX_LOGO_WIDTH_PX: u64 = 624;

pub struct DocxRenderer;

#[async_trait]
impl DocumentRenderer for DocxRenderer {
    fn format(&self) -> ExportFormat {
        ExportFormat::Docx
    }

    async fn render(&self, input: &RenderInput<'_>) -> Result<Vec<u8>, ExportError> {
        let docx = build_docx(input.proposal, input.logo, input.style);
        let mut buffer = Cursor::new(Vec::new());
        docx.build()
            .pack(&mut buffer)
            .map_err(|e| ExportError::render(ExportFormat::Docx, e))?;
        Ok(buffer.into_inner())
    }
}

fn build_docx(proposal: &Proposal, logo: Option<&DecodedLogo>, style: &ExportStyle) -> Docx {
    let meta = &proposal.meta;
    let accent = style.accent_color.trim_start_matches('#').to_string();
    // docx sizes are in half-points.
    let body_size = (style.body_font_size_pt * 2.0).round() as usize;

    let mut docx = Docx::new()
        .add_style(
            Style::new("Title", StyleType::Paragraph)
                .name("Title")
                .bold()
                .size(56)
                .color(accent.clone()),
        )
        .add_style(
            Style::new("Heading1", StyleType::Paragraph)
                .name("Heading 1")
                .bold()
                .size(32)
                .color(accent.clone()),
        )
        .add_style(
            Style::new("Heading2", StyleType::Paragraph)
                .name("Heading 2")
                .bold()
                .size(body_size + 4)
                .color(accent),
        );

    if let Some(logo) = logo {
        let (width, height) = logo_extent(logo.width, logo.height);
        let pic = Pic::new_with_dimensions(logo.bytes.clone(), width, height)
            .size(width * EMU_PER_PX, height * EMU_PER_PX);
        docx = docx.add_paragraph(Paragraph::new().add_run(Run::new().add_image(pic)));
    }

    docx = docx.add_paragraph(
        Paragraph::new()
            .style("Title")
            .add_run(Run::new().add_text(&meta.project_title)),
    );
    for line in [
        format!("Company: {}", meta.company_name),
        format!("Client: {}", meta.client_name),
        format!("Tone: {}", meta.tone.label()),
    ] {
        docx = docx.add_paragraph(body_paragraph(&line, body_size));
    }
    docx = docx.add_paragraph(page_break());

    for section in &proposal.sections {
        docx = docx.add_paragraph(
            Paragraph::new()
                .style("Heading1")
                .add_run(Run::new().add_text(&section.title)),
        );
        for block in text_blocks(&section.body) {
            let paragraph = match block {
                Block::Heading(text) => Paragraph::new()
                    .style("Heading2")
                    .add_run(Run::new().add_text(text)),
                Block::Paragraph(text) | Block::Row(text) => body_paragraph(&text, body_size),
                Block::Bullet(text) => body_paragraph(&format!("\u{2022} {text}"), body_size),
            };
            docx = docx.add_paragraph(paragraph);
        }
        docx = docx.add_paragraph(page_break());
    }
    docx
}

/// Logo size in pixels: 60 tall, narrowed to the text width when wider.
/// Both sides stay within `MAX_LOGO_WIDTH_PX`, so the EMU conversion cannot overflow.
fn logo_extent(width: u32, height: u32) -> (u32, u32) {
    let (width, height) = (u64::from(width.max(1)), u64::from(height.max(1)));
    let mut extent = (LOGO_HEIGHT_PX * width / height, LOGO_HEIGHT_PX);
    if extent.0 > MAX_LOGO_WIDTH_PX {
        extent = (MAX_LOGO_WIDTH_PX, MAX_LOGO_WIDTH_PX * height / width);
    }
    // Each side is at most MAX_LOGO_WIDTH_PX here.
    (extent.0.max(1) as u32, extent.1.max(1) as u32)
}

fn body_paragraph(text: &str, size: usize) -> Paragraph {
    Paragraph::new().add_run(Run::new().add_text(text).size(size))
}

fn page_break() -> Paragraph {
    Paragraph::new().add_run(Run::new().add_break(BreakType::Page))
}
