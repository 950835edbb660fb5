//! Standalone HTML rendition. Also the source document for wkhtmltopdf and the clipboard.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use pulldown_cmark::{html, Event, HeadingLevel, Options, Parser, Tag, TagEnd};

use crate::config::ExportStyle;
use crate::export::logo::DecodedLogo;
use crate::export::{DocumentRenderer, ExportError, ExportFormat, RenderInput};
use crate::models::proposal::Proposal;

pub struct HtmlRenderer;

#[async_trait]
impl DocumentRenderer for HtmlRenderer {
    fn format(&self) -> ExportFormat {
        ExportFormat::Html
    }

    async fn render(&self, input: &RenderInput<'_>) -> Result<Vec<u8>, ExportError> {
        Ok(render_document(input.proposal, input.logo, input.style).into_bytes())
    }
}

pub fn render_document(proposal: &Proposal, logo: Option<&DecodedLogo>, style: &ExportStyle) -> String {
    let meta = &proposal.meta;
    let mut out = String::with_capacity(16 * 1024);

    out.push_str("<!DOCTYPE html>\n");
    out.push_str(&format!(
        "<html lang=\"{}\">\n<head>\n<meta charset=\"utf-8\">\n<title>{}</title>\n<style>\n{}</style>\n</head>\n<body>\n",
        html_escape(&meta.language),
        html_escape(&meta.project_title),
        stylesheet(style)
    ));
    out.push_str("<div class=\"doc-wrap\">\n<div class=\"doc-page\">\n");

    out.push_str("<header class=\"doc-cover\">\n");
    if let Some(logo) = logo {
        out.push_str(&format!(
            "<img class=\"doc-logo\" alt=\"{} logo\" src=\"data:{};base64,{}\">\n",
            html_escape(&meta.company_name),
            logo.format.media_type(),
            STANDARD.encode(&logo.bytes)
        ));
    }
    out.push_str(&format!(
        "<h1 class=\"doc-title\">{}</h1>\n<p class=\"doc-meta\">Prepared by {} for {} &middot; Tone: {}</p>\n</header>\n",
        html_escape(&meta.project_title),
        html_escape(&meta.company_name),
        html_escape(&meta.client_name),
        meta.tone.label()
    ));

    for (position, section) in proposal.sections.iter().enumerate() {
        out.push_str(&format!(
            "<section id=\"section-{}\">\n<h2 class=\"section-title\">{}</h2>\n",
            position + 1,
            html_escape(&section.title)
        ));
        out.push_str(&markdown_to_html(&section.body));
        out.push_str("</section>\n");
    }

    out.push_str("</div>\n</div>\n</body>\n</html>\n");
    out
}

fn stylesheet(style: &ExportStyle) -> String {
    format!(
        r#"body {{ margin: 0; background: #f1f5f9; }}
.doc-wrap {{ padding: 24px 0; }}
.doc-page {{ max-width: 820px; margin: 0 auto; background: #ffffff; padding: 48px 56px; }}
h1, h2, h3, h4, h5, h6 {{ color: {accent}; font-family: {font}; }}
.doc-title {{ font-size: 28px; margin: 12px 0 4px; }}
.doc-meta {{ color: #475569; font-size: 13px; margin: 0 0 24px; }}
.doc-logo {{ height: 60px; }}
.section-title {{ border-bottom: 2px solid {accent}; padding-bottom: 4px; margin-top: 36px; }}
p, li, td, th {{ font-family: {font}; font-size: {size}pt; line-height: 1.7; color: #0f172a; }}
table {{ border-collapse: collapse; width: 100%; margin: 12px 0; }}
td, th {{ border: 1px solid #cbd5e1; padding: 6px 10px; text-align: left; }}
section {{ page-break-before: always; }}
section:first-of-type {{ page-break-before: auto; }}
"#,
        accent = style.accent_color,
        font = style.font_family,
        size = style.body_font_size_pt
    )
}

/// Section body Markdown to HTML. Raw HTML in the body is shown as text and headings
/// are pushed below the section title.
fn markdown_to_html(markdown: &str) -> String {
    let options = Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH;
    let events = Parser::new_ext(markdown, options).map(|event| match event {
        Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
        Event::Start(Tag::Heading {
            level,
            id,
            classes,
            attrs,
        }) => Event::Start(Tag::Heading {
            level: demote(level),
            id,
            classes,
            attrs,
        }),
        Event::End(TagEnd::Heading(level)) => Event::End(TagEnd::Heading(demote(level))),
        other => other,
    });
    let mut out = String::with_capacity(markdown.len() * 2);
    html::push_html(&mut out, events);
    out
}

fn demote(level: HeadingLevel) -> HeadingLevel {
    match level {
        HeadingLevel::H1 => HeadingLevel::H3,
        HeadingLevel::H2 => HeadingLevel::H4,
        HeadingLevel::H3 => HeadingLevel::H5,
        _ => HeadingLevel::H6,
    }
}

fn html_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
