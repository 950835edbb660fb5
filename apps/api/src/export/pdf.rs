//! PDF renditions.
//!
//! [`BuiltinPdfRenderer`] lays the proposal out with lopdf: a cover page, then one page
//! (or more) per section, each starting on a fresh page, with a page-number footer.
//! [`WkhtmltopdfRenderer`] pipes the HTML rendition through the external binary.

use std::io::{ErrorKind, Write};
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use flate2::{write::ZlibEncoder, Compression};
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, StringFormat};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::export::html::render_document;
use crate::export::logo::{DecodedLogo, ImageFormat};
use crate::export::{text_blocks, Block, DocumentRenderer, ExportError, ExportFormat, RenderInput};

// US Letter, in points.
const PAGE_WIDTH: f32 = 612.0;
const PAGE_HEIGHT: f32 = 792.0;
const MARGIN: f32 = 72.0;
const FOOTER_Y: f32 = 36.0;
const FOOTER_SIZE: f32 = 9.0;
const TITLE_SIZE: f32 = 22.0;
const SECTION_TITLE_SIZE: f32 = 16.0;
const LOGO_HEIGHT: f32 = 50.0;
const TEXT_WIDTH: f32 = PAGE_WIDTH - 2.0 * MARGIN;
const BULLET_INDENT: f32 = 14.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Font {
    Regular,
    Bold,
}

impl Font {
    fn resource_name(self) -> &'static [u8] {
        match self {
            Font::Regular => b"F1",
            Font::Bold => b"F2",
        }
    }
}

type Rgb = (f32, f32, f32);

const BLACK: Rgb = (0.0, 0.0, 0.0);
const MUTED: Rgb = (0.28, 0.33, 0.41);

// ────────────────────────────────────────────────────────────────────────────
// Built-in renderer
// ────────────────────────────────────────────────────────────────────────────

pub struct BuiltinPdfRenderer;

#[async_trait]
impl DocumentRenderer for BuiltinPdfRenderer {
    fn format(&self) -> ExportFormat {
        ExportFormat::Pdf
    }

    async fn render(&self, input: &RenderInput<'_>) -> Result<Vec<u8>, ExportError> {
        build_pdf(input)
    }
}

fn build_pdf(input: &RenderInput<'_>) -> Result<Vec<u8>, ExportError> {
    let meta = &input.proposal.meta;
    let accent = input.style.accent_rgb();
    let body_size = input.style.body_font_size_pt;

    let logo = input.logo.and_then(|logo| match PdfImage::from_logo(logo) {
        Ok(image) => Some(image),
        Err(e) => {
            warn!("Logo omitted from the built-in PDF: {e}");
            None
        }
    });

    let mut layout = Layout::new();

    // Cover
    if let Some(logo) = &logo {
        let (width, height) = logo_box(logo.width, logo.height);
        let top = PAGE_HEIGHT - MARGIN;
        layout.draw_image(MARGIN, top - height, width, height);
        layout.y = top - height - 24.0;
    }
    layout.paragraph(&meta.project_title, Font::Bold, TITLE_SIZE, accent, 0.0, None);
    layout.gap(8.0);
    layout.paragraph(
        &format!("Prepared by {} for {}", meta.company_name, meta.client_name),
        Font::Regular,
        12.0,
        MUTED,
        0.0,
        None,
    );
    layout.paragraph(
        &format!("Tone: {}", meta.tone.label()),
        Font::Regular,
        12.0,
        MUTED,
        0.0,
        None,
    );

    for section in &input.proposal.sections {
        layout.new_page();
        layout.paragraph(&section.title, Font::Bold, SECTION_TITLE_SIZE, accent, 0.0, None);
        layout.gap(6.0);
        for block in text_blocks(&section.body) {
            match block {
                Block::Heading(text) => {
                    layout.gap(4.0);
                    layout.paragraph(&text, Font::Bold, body_size + 2.0, accent, 0.0, None);
                }
                Block::Paragraph(text) | Block::Row(text) => {
                    layout.paragraph(&text, Font::Regular, body_size, BLACK, 0.0, None);
                    layout.gap(body_size * 0.5);
                }
                Block::Bullet(text) => {
                    layout.paragraph(
                        &text,
                        Font::Regular,
                        body_size,
                        BLACK,
                        BULLET_INDENT,
                        Some("\u{2022}"),
                    );
                }
            }
        }
    }

    assemble(layout.finish(), &meta.project_title, logo)
}

/// Draw size in points: `LOGO_HEIGHT` tall, scaled down to the text width when wider.
fn logo_box(width: u32, height: u32) -> (f32, f32) {
    let aspect = width.max(1) as f32 / height.max(1) as f32;
    let width = LOGO_HEIGHT * aspect;
    if width > TEXT_WIDTH {
        (TEXT_WIDTH, TEXT_WIDTH / aspect)
    } else {
        (width, LOGO_HEIGHT)
    }
}

/// Writes the laid-out pages into a PDF document.
fn assemble(
    pages: Vec<Vec<Operation>>,
    title: &str,
    logo: Option<PdfImage>,
) -> Result<Vec<u8>, ExportError> {
    let render_err = |e: lopdf::Error| ExportError::render(ExportFormat::Pdf, e);

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let regular_id = doc.add_object(type1_font("Helvetica"));
    let bold_id = doc.add_object(type1_font("Helvetica-Bold"));
    let mut resources = Dictionary::from_iter(vec![(
        "Font",
        Object::Dictionary(Dictionary::from_iter(vec![
            ("F1", Object::Reference(regular_id)),
            ("F2", Object::Reference(bold_id)),
        ])),
    )]);
    if let Some(PdfImage { mut image, mask, .. }) = logo {
        if let Some(mask) = mask {
            let mask_id = doc.add_object(mask);
            image.dict.set("SMask", Object::Reference(mask_id));
        }
        let image_id = doc.add_object(image);
        resources.set(
            "XObject",
            Object::Dictionary(Dictionary::from_iter(vec![(
                "Im1",
                Object::Reference(image_id),
            )])),
        );
    }

    let mut page_ids: Vec<ObjectId> = Vec::with_capacity(pages.len());
    for operations in pages {
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(
            Dictionary::new(),
            content.encode().map_err(render_err)?,
        ));
        let page = Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Page".to_vec())),
            ("Parent", Object::Reference(pages_id)),
            ("Contents", Object::Reference(content_id)),
        ]);
        page_ids.push(doc.add_object(page));
    }

    let pages = Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Pages".to_vec())),
        ("Count", Object::Integer(page_ids.len() as i64)),
        (
            "Kids",
            Object::Array(page_ids.iter().map(|id| Object::Reference(*id)).collect()),
        ),
        (
            "MediaBox",
            Object::Array(vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(PAGE_WIDTH as i64),
                Object::Integer(PAGE_HEIGHT as i64),
            ]),
        ),
        ("Resources", Object::Dictionary(resources)),
    ]);
    doc.objects.insert(pages_id, Object::Dictionary(pages));

    let catalog_id = doc.add_object(Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Catalog".to_vec())),
        ("Pages", Object::Reference(pages_id)),
    ]));
    let info_id = doc.add_object(Dictionary::from_iter(vec![
        ("Title", Object::String(win_ansi(title), StringFormat::Literal)),
        (
            "Producer",
            Object::String(b"proposal-api".to_vec(), StringFormat::Literal),
        ),
    ]));
    doc.trailer.set("Root", Object::Reference(catalog_id));
    doc.trailer.set("Info", Object::Reference(info_id));

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).map_err(|e| ExportError::render(ExportFormat::Pdf, e))?;
    Ok(buffer)
}

fn type1_font(base: &str) -> Dictionary {
    Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Font".to_vec())),
        ("Subtype", Object::Name(b"Type1".to_vec())),
        ("BaseFont", Object::Name(base.as_bytes().to_vec())),
        ("Encoding", Object::Name(b"WinAnsiEncoding".to_vec())),
    ])
}

// ────────────────────────────────────────────────────────────────────────────
// Logo images
// ────────────────────────────────────────────────────────────────────────────

/// A logo ready to embed: the image XObject and, for PNGs with alpha, its soft mask.
struct PdfImage {
    width: u32,
    height: u32,
    image: Stream,
    mask: Option<Stream>,
}

impl PdfImage {
    fn from_logo(logo: &DecodedLogo) -> Result<Self, String> {
        match logo.format {
            ImageFormat::Jpeg => Ok(Self {
                width: logo.width,
                height: logo.height,
                image: jpeg_xobject(logo),
                mask: None,
            }),
            ImageFormat::Png => png_xobjects(&logo.bytes),
        }
    }
}

fn image_dict(width: u32, height: u32, color_space: &[u8], filter: &[u8]) -> Dictionary {
    Dictionary::from_iter(vec![
        ("Type", Object::Name(b"XObject".to_vec())),
        ("Subtype", Object::Name(b"Image".to_vec())),
        ("Width", Object::Integer(width as i64)),
        ("Height", Object::Integer(height as i64)),
        ("ColorSpace", Object::Name(color_space.to_vec())),
        ("BitsPerComponent", Object::Integer(8)),
        ("Filter", Object::Name(filter.to_vec())),
    ])
}

/// JPEG bytes pass through unchanged under DCTDecode.
fn jpeg_xobject(logo: &DecodedLogo) -> Stream {
    let color_space: &[u8] = match logo.channels {
        1 => b"DeviceGray",
        4 => b"DeviceCMYK",
        _ => b"DeviceRGB",
    };
    let dict = image_dict(logo.width, logo.height, color_space, b"DCTDecode");
    let mut stream = Stream::new(dict, logo.bytes.clone());
    stream.allows_compression = false;
    stream
}

/// PNG samples are decoded to 8 bits per channel and re-compressed under FlateDecode.
/// An alpha channel is split off into a DeviceGray soft mask.
fn png_xobjects(bytes: &[u8]) -> Result<PdfImage, String> {
    let mut decoder = png::Decoder::new(bytes);
    decoder.set_transformations(png::Transformations::EXPAND | png::Transformations::STRIP_16);
    let mut reader = decoder.read_info().map_err(|e| format!("unreadable PNG: {e}"))?;
    let mut buffer = vec![0; reader.output_buffer_size()];
    let frame = reader
        .next_frame(&mut buffer)
        .map_err(|e| format!("unreadable PNG: {e}"))?;
    let pixels = &buffer[..frame.buffer_size()];

    let (components, has_alpha) = match frame.color_type {
        png::ColorType::Grayscale => (1, false),
        png::ColorType::GrayscaleAlpha => (1, true),
        png::ColorType::Rgb => (3, false),
        png::ColorType::Rgba => (3, true),
        png::ColorType::Indexed => return Err("indexed PNG was not expanded".to_string()),
    };
    let color_space: &[u8] = if components == 1 {
        b"DeviceGray"
    } else {
        b"DeviceRGB"
    };

    let (color, alpha) = if has_alpha {
        let stride = components + 1;
        let mut color = Vec::with_capacity(pixels.len() / stride * components);
        let mut alpha = Vec::with_capacity(pixels.len() / stride);
        for pixel in pixels.chunks_exact(stride) {
            color.extend_from_slice(&pixel[..components]);
            alpha.push(pixel[components]);
        }
        (color, Some(alpha))
    } else {
        (pixels.to_vec(), None)
    };

    let flate_stream = |color_space: &[u8], samples: &[u8]| -> Result<Stream, String> {
        let dict = image_dict(frame.width, frame.height, color_space, b"FlateDecode");
        let mut stream = Stream::new(dict, deflate(samples)?);
        stream.allows_compression = false;
        Ok(stream)
    };
    let image = flate_stream(color_space, &color)?;
    let mask = match alpha {
        Some(alpha) => Some(flate_stream(b"DeviceGray", &alpha)?),
        None => None,
    };
    Ok(PdfImage {
        width: frame.width,
        height: frame.height,
        image,
        mask,
    })
}

fn deflate(data: &[u8]) -> Result<Vec<u8>, String> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| format!("compressing logo: {e}"))?;
    encoder.finish().map_err(|e| format!("compressing logo: {e}"))
}

// ────────────────────────────────────────────────────────────────────────────
// Layout
// ────────────────────────────────────────────────────────────────────────────

/// Top-down line layout over fixed-size pages.
struct Layout {
    pages: Vec<Vec<Operation>>,
    y: f32,
}

impl Layout {
    fn new() -> Self {
        Self {
            pages: vec![Vec::new()],
            y: PAGE_HEIGHT - MARGIN,
        }
    }

    fn new_page(&mut self) {
        self.pages.push(Vec::new());
        self.y = PAGE_HEIGHT - MARGIN;
    }

    fn gap(&mut self, amount: f32) {
        self.y -= amount;
    }

    fn push(&mut self, ops: Vec<Operation>) {
        if let Some(page) = self.pages.last_mut() {
            page.extend(ops);
        }
    }

    /// Wraps `text` to the text column and draws it line by line, breaking pages as needed.
    /// A `marker` is drawn before the first line; every line is indented by `indent`.
    fn paragraph(
        &mut self,
        text: &str,
        font: Font,
        size: f32,
        color: Rgb,
        indent: f32,
        marker: Option<&str>,
    ) {
        let width = PAGE_WIDTH - 2.0 * MARGIN - indent;
        let leading = size * 1.4;
        for (i, line) in wrap(text, max_chars(width, size)).into_iter().enumerate() {
            if self.y - leading < MARGIN {
                self.new_page();
            }
            self.y -= leading;
            if i == 0 {
                if let Some(marker) = marker {
                    self.text(marker, font, size, color, MARGIN + indent - 10.0, self.y);
                }
            }
            self.text(&line, font, size, color, MARGIN + indent, self.y);
        }
    }

    fn text(&mut self, text: &str, font: Font, size: f32, color: Rgb, x: f32, y: f32) {
        self.push(text_ops(text, font, size, color, x, y));
    }

    fn draw_image(&mut self, x: f32, y: f32, width: f32, height: f32) {
        let ops = vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    Object::Real(width),
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Real(height),
                    Object::Real(x),
                    Object::Real(y),
                ],
            ),
            Operation::new("Do", vec![Object::Name(b"Im1".to_vec())]),
            Operation::new("Q", vec![]),
        ];
        self.push(ops);
    }

    /// Stamps "Page N" on every page and hands the pages over.
    fn finish(mut self) -> Vec<Vec<Operation>> {
        for (index, page) in self.pages.iter_mut().enumerate() {
            let label = format!("Page {}", index + 1);
            let x = PAGE_WIDTH - MARGIN - text_width(&label, FOOTER_SIZE);
            page.extend(text_ops(&label, Font::Regular, FOOTER_SIZE, MUTED, x, FOOTER_Y));
        }
        self.pages
    }
}

fn text_ops(text: &str, font: Font, size: f32, color: Rgb, x: f32, y: f32) -> Vec<Operation> {
    vec![
        Operation::new("BT", vec![]),
        Operation::new(
            "rg",
            vec![Object::Real(color.0), Object::Real(color.1), Object::Real(color.2)],
        ),
        Operation::new(
            "Tf",
            vec![Object::Name(font.resource_name().to_vec()), Object::Real(size)],
        ),
        Operation::new("Td", vec![Object::Real(x), Object::Real(y)]),
        Operation::new(
            "Tj",
            vec![Object::String(win_ansi(text), StringFormat::Literal)],
        ),
        Operation::new("ET", vec![]),
    ]
}

/// Approximate Helvetica advance: half the font size per character.
fn text_width(text: &str, size: f32) -> f32 {
    text.chars().count() as f32 * size * 0.5
}

fn max_chars(width: f32, size: f32) -> usize {
    ((width / (size * 0.5)).floor() as usize).max(10)
}

/// Greedy word wrap. Words longer than a line are split.
fn wrap(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut line = String::new();
    let mut line_len = 0;

    for word in text.split_whitespace() {
        let chars: Vec<char> = word.chars().collect();
        for chunk in chars.chunks(max_chars) {
            let len = chunk.len();
            if line_len > 0 && line_len + 1 + len > max_chars {
                lines.push(std::mem::take(&mut line));
                line_len = 0;
            }
            if line_len > 0 {
                line.push(' ');
                line_len += 1;
            }
            line.extend(chunk);
            line_len += len;
        }
    }
    if !line.is_empty() {
        lines.push(line);
    }
    lines
}

/// Encodes text for the standard fonts' WinAnsi encoding; anything else becomes '?'.
fn win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c {
            '\u{20AC}' => 0x80,
            '\u{2026}' => 0x85,
            '\u{2018}' => 0x91,
            '\u{2019}' => 0x92,
            '\u{201C}' => 0x93,
            '\u{201D}' => 0x94,
            '\u{2022}' => 0x95,
            '\u{2013}' => 0x96,
            '\u{2014}' => 0x97,
            '\t' => b' ',
            c if (' '..='~').contains(&c) => c as u8,
            c if ('\u{A0}'..='\u{FF}').contains(&c) => c as u32 as u8,
            _ => b'?',
        })
        .collect()
}

// ────────────────────────────────────────────────────────────────────────────
// wkhtmltopdf
// ────────────────────────────────────────────────────────────────────────────

pub struct WkhtmltopdfRenderer {
    binary: PathBuf,
}

impl WkhtmltopdfRenderer {
    pub fn new(binary: PathBuf) -> Self {
        Self { binary }
    }
}

#[async_trait]
impl DocumentRenderer for WkhtmltopdfRenderer {
    fn format(&self) -> ExportFormat {
        ExportFormat::Pdf
    }

    async fn render(&self, input: &RenderInput<'_>) -> Result<Vec<u8>, ExportError> {
        let html = render_document(input.proposal, input.logo, input.style).into_bytes();

        let mut child = Command::new(&self.binary)
            .args(["--quiet", "--encoding", "UTF-8", "--page-size", "Letter", "-", "-"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound | ErrorKind::PermissionDenied => {
                    ExportError::RendererUnavailable {
                        engine: "wkhtmltopdf".to_string(),
                        hint: format!(
                            "could not run '{}'; install wkhtmltopdf, point WKHTMLTOPDF_PATH at it, or set PDF_ENGINE=builtin",
                            self.binary.display()
                        ),
                    }
                }
                _ => ExportError::render(ExportFormat::Pdf, e),
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(&html).await {
                    debug!("wkhtmltopdf closed stdin early: {e}");
                }
            });
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| ExportError::render(ExportFormat::Pdf, e))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExportError::render(
                ExportFormat::Pdf,
                format!("wkhtmltopdf exited with {}: {}", output.status, stderr.trim()),
            ));
        }
        Ok(output.stdout)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use base64::{engine::general_purpose::STANDARD, Engine as _};

    use super::*;
    use crate::config::ExportStyle;
    use crate::export::logo::{
        decode_logo,
        samples::{jpeg_header, png_header, png_image},
    };
    use crate::models::proposal::fixtures::filled_proposal;
    use crate::models::proposal::{LogoAsset, Proposal, SectionKind};

    fn render(proposal: &Proposal, logo: Option<&DecodedLogo>) -> Vec<u8> {
        let style = ExportStyle::default();
        build_pdf(&RenderInput {
            proposal,
            logo,
            style: &style,
        })
        .unwrap()
    }

    fn number(object: &Object) -> f32 {
        match object {
            Object::Real(v) => *v,
            Object::Integer(v) => *v as f32,
            other => panic!("not a number: {other:?}"),
        }
    }

    /// Text shown with the given font and size, page by page.
    fn shown_text(pdf: &[u8], font: &[u8], size: f32) -> Vec<Vec<String>> {
        let doc = Document::load_mem(pdf).unwrap();
        let mut pages = Vec::new();
        for (_, page_id) in doc.get_pages() {
            let content = Content::decode(&doc.get_page_content(page_id).unwrap()).unwrap();
            let mut current: (Vec<u8>, f32) = (Vec::new(), 0.0);
            let mut texts = Vec::new();
            for op in content.operations {
                match op.operator.as_str() {
                    "Tf" => {
                        if let Object::Name(name) = &op.operands[0] {
                            current = (name.clone(), number(&op.operands[1]));
                        }
                    }
                    "Tj" if current.0 == font && (current.1 - size).abs() < 0.01 => {
                        if let Object::String(bytes, _) = &op.operands[0] {
                            texts.push(String::from_utf8_lossy(bytes).into_owned());
                        }
                    }
                    _ => {}
                }
            }
            pages.push(texts);
        }
        pages
    }

    #[test]
    fn test_sections_start_on_their_own_pages_in_order() {
        let pdf = render(&filled_proposal(), None);
        assert!(pdf.starts_with(b"%PDF-"));

        let pages = shown_text(&pdf, b"F2", SECTION_TITLE_SIZE);
        let titles: Vec<String> = pages.into_iter().flatten().collect();
        let expected: Vec<String> = SectionKind::ALL.iter().map(|k| k.title().to_string()).collect();
        assert_eq!(titles, expected);
    }

    #[test]
    fn test_every_page_has_a_footer() {
        let pdf = render(&filled_proposal(), None);
        let footers = shown_text(&pdf, b"F1", FOOTER_SIZE);
        assert_eq!(footers.len(), 1 + SectionKind::ALL.len());
        for (index, texts) in footers.iter().enumerate() {
            assert_eq!(texts, &vec![format!("Page {}", index + 1)]);
        }
    }

    #[test]
    fn test_long_section_flows_onto_more_pages() {
        let mut proposal = filled_proposal();
        let long = "Acme delivers measurable outcomes for Globex every week. ".repeat(20);
        let body = vec![long; 12].join("\n\n");
        proposal.apply_edit(SectionKind::ScopeOfWork, body);
        let pdf = render(&proposal, None);
        let doc = Document::load_mem(&pdf).unwrap();
        assert!(doc.get_pages().len() > 1 + SectionKind::ALL.len());
    }

    #[test]
    fn test_cover_page_carries_title_and_jpeg_logo() {
        let pdf = render(&filled_proposal(), Some(&logo("image/jpeg", jpeg_header(120, 60))));

        let cover = &shown_text(&pdf, b"F2", TITLE_SIZE)[0];
        assert_eq!(cover, &vec!["Website Revamp".to_string()]);

        let doc = Document::load_mem(&pdf).unwrap();
        let (_, first_page) = doc.get_pages().into_iter().next().unwrap();
        let content = Content::decode(&doc.get_page_content(first_page).unwrap()).unwrap();
        assert!(content.operations.iter().any(|op| op.operator == "Do"));
    }

    fn logo(media_type: &str, bytes: Vec<u8>) -> DecodedLogo {
        decode_logo(&LogoAsset {
            media_type: media_type.to_string(),
            data_base64: STANDARD.encode(bytes),
        })
        .unwrap()
    }

    fn name(stream: &Stream, key: &[u8]) -> String {
        stream
            .dict
            .get(key)
            .and_then(Object::as_name_str)
            .map(str::to_string)
            .unwrap_or_default()
    }

    /// The image XObjects referenced from the shared page resources.
    fn embedded_images(pdf: &[u8]) -> (Document, Vec<Stream>) {
        let doc = Document::load_mem(pdf).unwrap();
        let images = doc
            .objects
            .values()
            .filter_map(|object| match object {
                Object::Stream(stream) if name(stream, b"Subtype") == "Image" => Some(stream.clone()),
                _ => None,
            })
            .collect();
        (doc, images)
    }

    #[test]
    fn test_png_logo_is_embedded_with_soft_mask() {
        let pdf = render(&filled_proposal(), Some(&logo("image/png", png_image(4, 2))));
        let (doc, images) = embedded_images(&pdf);

        let color = images
            .iter()
            .find(|s| s.dict.get(b"SMask").is_ok())
            .expect("colour image with a soft mask");
        assert_eq!(name(color, b"Filter"), "FlateDecode");
        assert_eq!(name(color, b"ColorSpace"), "DeviceRGB");
        assert_eq!(color.dict.get(b"Width").unwrap().as_i64().unwrap(), 4);
        assert_eq!(color.decompressed_content().unwrap(), [220, 20, 60].repeat(8));

        let mask_id = color.dict.get(b"SMask").unwrap().as_reference().unwrap();
        let mask = doc.get_object(mask_id).unwrap().as_stream().unwrap();
        assert_eq!(name(mask, b"ColorSpace"), "DeviceGray");
        assert_eq!(mask.decompressed_content().unwrap(), vec![128; 8]);

        let (_, first_page) = doc.get_pages().into_iter().next().unwrap();
        let content = Content::decode(&doc.get_page_content(first_page).unwrap()).unwrap();
        assert!(content.operations.iter().any(|op| op.operator == "Do"));
    }

    #[test]
    fn test_unreadable_png_logo_is_left_out() {
        let pdf = render(&filled_proposal(), Some(&logo("image/png", png_header(40, 20))));
        let (_, images) = embedded_images(&pdf);
        assert!(images.is_empty());
        assert!(pdf.starts_with(b"%PDF-"));
    }

    #[test]
    fn test_wide_logo_is_fitted_to_text_width() {
        let (width, height) = logo_box(10_000, 1);
        assert_eq!(width, TEXT_WIDTH);
        assert!(height > 0.0 && height < 1.0);
        assert_eq!(logo_box(120, 60), (100.0, LOGO_HEIGHT));
        assert_eq!(logo_box(1, 0), (LOGO_HEIGHT, LOGO_HEIGHT));
    }

    #[test]
    fn test_wrap_respects_width_and_splits_long_words() {
        let lines = wrap("alpha beta gamma delta", 11);
        assert_eq!(lines, vec!["alpha beta", "gamma delta"]);
        let lines = wrap("abcdefghijklmnop", 10);
        assert_eq!(lines, vec!["abcdefghij", "klmnop"]);
        assert!(wrap("   ", 10).is_empty());
    }

    #[test]
    fn test_win_ansi_maps_typographic_characters() {
        assert_eq!(win_ansi("a \u{2014} b"), vec![b'a', b' ', 0x97, b' ', b'b']);
        assert_eq!(win_ansi("caf\u{e9}"), vec![b'c', b'a', b'f', 0xE9]);
        assert_eq!(win_ansi("\u{4e2d}"), vec![b'?']);
    }

    #[tokio::test]
    async fn test_missing_binary_reports_unavailable() {
        let renderer = WkhtmltopdfRenderer::new(PathBuf::from("/nonexistent/wkhtmltopdf"));
        let proposal = filled_proposal();
        let style = ExportStyle::default();
        let err = renderer
            .render(&RenderInput {
                proposal: &proposal,
                logo: None,
                style: &style,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ExportError::RendererUnavailable { .. }));
    }
}
