//! PDF backend – renders the paginated area tree with `printpdf` (v0.8
//! ops-based API), then stamps the document information dictionary with
//! `lopdf`.

use std::collections::HashMap;

use printpdf::font::ParsedFont;
use printpdf::*;

use crate::area_tree::{AreaBox, AreaTree, SpanArea};
use crate::engine::{Engine, Session};
use crate::error::TransformError;
use crate::fo::FoDocument;
use crate::fonts::{FontKey, FontManager};
use crate::pagination::lay_out_document;
use crate::resources::ImageStore;

const PT_TO_MM: f32 = 0.352_778;

/// Lay out `doc` and produce a complete PDF file.
pub fn write_pdf(
    doc: &FoDocument,
    engine: &Engine,
    session: &Session,
    images: &mut ImageStore,
) -> Result<Vec<u8>, TransformError> {
    let tree = lay_out_document(doc, engine.settings(), engine.fonts(), images, session.title())?;
    let bytes = render_pdf(&tree, engine.fonts(), images, session.target_resolution())?;
    stamp_info(&bytes, session)
}

/// An embedded image together with the pixel size it was embedded at.
struct ImageResource {
    xobj_id: XObjectId,
    px_width: u32,
    px_height: u32,
}

/// Font handles registered with one document.
struct FontTable {
    embedded: HashMap<FontKey, FontId>,
}

enum PdfFont {
    Builtin(BuiltinFont),
    Embedded(FontId),
}

impl FontTable {
    fn register(doc: &mut PdfDocument, fonts: &FontManager) -> Result<Self, TransformError> {
        let mut embedded = HashMap::new();
        let mut warnings = Vec::new();
        for key in fonts.keys() {
            let Some(bytes) = fonts.font_bytes(&key) else {
                continue;
            };
            let parsed = ParsedFont::from_bytes(bytes, 0, &mut warnings).ok_or_else(|| {
                TransformError::Output {
                    format: "PDF",
                    reason: format!("cannot embed font |{}|", key.family),
                }
            })?;
            embedded.insert(key, doc.add_font(&parsed));
        }
        Ok(Self { embedded })
    }

    fn font_for(&self, span: &SpanArea) -> PdfFont {
        let key = FontKey::new(&span.font_family, span.bold, span.italic);
        if let Some(id) = self.embedded.get(&key) {
            return PdfFont::Embedded(id.clone());
        }
        PdfFont::Builtin(match (span.bold, span.italic) {
            (true, true) => BuiltinFont::HelveticaBoldOblique,
            (true, false) => BuiltinFont::HelveticaBold,
            (false, true) => BuiltinFont::HelveticaOblique,
            (false, false) => BuiltinFont::Helvetica,
        })
    }
}

/// Render an area tree into PDF bytes.
///
/// Graphics that failed to load during layout are skipped (already logged).
pub fn render_pdf(
    tree: &AreaTree,
    fonts: &FontManager,
    images: &mut ImageStore,
    target_dpi: u32,
) -> Result<Vec<u8>, TransformError> {
    let mut doc = PdfDocument::new(&tree.title);
    let font_table = FontTable::register(&mut doc, fonts)?;

    // ── Pre-register all images ────────────────────────────────────────────
    let mut image_resources: HashMap<String, ImageResource> = HashMap::new();
    let mut img_warnings: Vec<PdfWarnMsg> = Vec::new();
    for (src, width, height) in largest_placements(tree) {
        let Some(loaded) = images.get(src) else {
            continue;
        };
        let prepared = super::image::prepare(&loaded, width, height, target_dpi);
        let raw = match RawImage::decode_from_bytes(&prepared.bytes, &mut img_warnings) {
            Ok(r) => r,
            Err(e) => {
                log::warn!("Skipping image, PDF encode error: {e}");
                continue;
            }
        };
        image_resources.insert(
            src.to_string(),
            ImageResource {
                xobj_id: doc.add_image(&raw),
                px_width: prepared.width_px,
                px_height: prepared.height_px,
            },
        );
    }

    // ── Render pages ──────────────────────────────────────────────────────
    let mut pages = Vec::new();
    for page in &tree.pages {
        let mut ops = Vec::new();
        for area in &page.boxes {
            render_box(&mut ops, area, page.height, &font_table, &image_resources);
        }
        pages.push(PdfPage::new(
            Mm(page.width * PT_TO_MM),
            Mm(page.height * PT_TO_MM),
            ops,
        ));
    }

    doc.with_pages(pages);
    let bytes = doc.save(&PdfSaveOptions::default(), &mut Vec::new());
    Ok(bytes)
}

/// Approximate a string in WinAnsi for the standard fonts. Characters
/// outside Latin-1 need an embedded font.
fn to_builtin_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\u{2018}' | '\u{2019}' | '\u{201A}' => out.push('\''),
            '\u{201C}' | '\u{201D}' | '\u{201E}' => out.push('"'),
            '\u{2013}' | '\u{2014}' => out.push('-'),
            '\u{2022}' => out.push('*'),
            '\u{2026}' => out.push_str("..."),
            '\u{00A0}' => out.push(' '),
            c if (c as u32) < 256 => out.push(c),
            _ => out.push('?'),
        }
    }
    out
}

/// Every distinct image source with the largest size it is placed at, in
/// document order. Each image is embedded once at the resolution that
/// placement needs.
fn largest_placements(tree: &AreaTree) -> Vec<(&str, f32, f32)> {
    let mut placements: Vec<(&str, f32, f32)> = Vec::new();
    for page in &tree.pages {
        for area in &page.boxes {
            collect_images(area, &mut placements);
        }
    }
    let mut largest: Vec<(&str, f32, f32)> = Vec::new();
    for (src, width, height) in placements {
        match largest.iter_mut().find(|(s, _, _)| *s == src) {
            Some(entry) => {
                entry.1 = entry.1.max(width);
                entry.2 = entry.2.max(height);
            }
            None => largest.push((src, width, height)),
        }
    }
    largest
}

fn collect_images<'a>(area: &'a AreaBox, out: &mut Vec<(&'a str, f32, f32)>) {
    if let Some(image) = &area.image {
        out.push((image.src.as_str(), image.width, image.height));
    }
    for child in &area.children {
        collect_images(child, out);
    }
}

fn rgb(c: [f32; 4]) -> Color {
    Color::Rgb(Rgb {
        r: c[0],
        g: c[1],
        b: c[2],
        icc_profile: None,
    })
}

fn point(x: f32, y: f32) -> LinePoint {
    LinePoint {
        p: Point { x: Pt(x), y: Pt(y) },
        bezier: false,
    }
}

/// Corners of a rectangle in PDF space, counter-clockwise from bottom-left.
fn corners(x1: f32, y1: f32, x2: f32, y2: f32) -> Vec<LinePoint> {
    vec![point(x1, y1), point(x2, y1), point(x2, y2), point(x1, y2)]
}

/// Recursively render an area and its children into PDF ops.
fn render_box(
    ops: &mut Vec<Op>,
    area: &AreaBox,
    page_height: f32,
    fonts: &FontTable,
    images: &HashMap<String, ImageResource>,
) {
    // PDF origin is bottom-left; areas use top-left.
    let top = page_height - area.y;
    let bottom = top - area.height;
    let (left, right) = (area.x, area.x + area.width);

    if let Some(bg) = area.background_color {
        ops.push(Op::SetFillColor { col: rgb(bg) });
        ops.push(Op::DrawPolygon {
            polygon: Polygon {
                rings: vec![PolygonRing {
                    points: corners(left, bottom, right, top),
                }],
                mode: PaintMode::Fill,
                winding_order: WindingOrder::NonZero,
            },
        });
    }

    if let Some(border) = &area.border {
        ops.push(Op::SetOutlineColor {
            col: rgb(border.color),
        });
        ops.push(Op::SetOutlineThickness {
            pt: Pt(border.width),
        });
        ops.push(Op::DrawLine {
            line: Line {
                points: corners(left, bottom, right, top),
                is_closed: true,
            },
        });
    }

    if let Some(text) = &area.text {
        for line in &text.lines {
            let baseline_y = top - line.y_offset - line.baseline;
            for span in &line.spans {
                if span.text.trim().is_empty() {
                    continue;
                }
                let x = area.x + line.x_offset + span.x_offset;
                render_span(ops, span, x, baseline_y, fonts);
            }
        }
    }

    if let Some(image) = &area.image {
        if let Some(res) = images.get(&image.src) {
            // At dpi=72 printpdf renders 1 px = 1 pt.
            let scale = |placed: f32, px: u32| if px > 0 { placed / px as f32 } else { 1.0 };
            ops.push(Op::UseXobject {
                id: res.xobj_id.clone(),
                transform: XObjectTransform {
                    translate_x: Some(Pt(left)),
                    translate_y: Some(Pt(top - image.height)),
                    dpi: Some(72.0),
                    scale_x: Some(scale(image.width, res.px_width)),
                    scale_y: Some(scale(image.height, res.px_height)),
                    rotate: None,
                },
            });
        }
    }

    for child in &area.children {
        render_box(ops, child, page_height, fonts, images);
    }
}

fn render_span(ops: &mut Vec<Op>, span: &SpanArea, x: f32, baseline_y: f32, fonts: &FontTable) {
    ops.push(Op::StartTextSection);
    ops.push(Op::SetTextCursor {
        pos: Point {
            x: Pt(x),
            y: Pt(baseline_y),
        },
    });
    ops.push(Op::SetFillColor {
        col: rgb(span.color),
    });
    match fonts.font_for(span) {
        PdfFont::Builtin(font) => {
            ops.push(Op::SetFontSizeBuiltinFont {
                size: Pt(span.font_size),
                font,
            });
            ops.push(Op::WriteTextBuiltinFont {
                items: vec![TextItem::Text(to_builtin_text(&span.text))],
                font,
            });
        }
        PdfFont::Embedded(font) => {
            ops.push(Op::SetFontSize {
                size: Pt(span.font_size),
                font: font.clone(),
            });
            ops.push(Op::WriteText {
                items: vec![TextItem::Text(span.text.clone())],
                font,
            });
        }
    }
    ops.push(Op::EndTextSection);

    if span.underline {
        let y = baseline_y - span.font_size * 0.1;
        ops.push(Op::SetOutlineThickness { pt: Pt(0.5) });
        ops.push(Op::SetOutlineColor {
            col: rgb(span.color),
        });
        ops.push(Op::DrawLine {
            line: Line {
                points: vec![point(x, y), point(x + span.width, y)],
                is_closed: false,
            },
        });
    }
}

// ---------------------------------------------------------------------------
// Document information
// ---------------------------------------------------------------------------

fn output_error(e: impl std::fmt::Display) -> TransformError {
    TransformError::Output {
        format: "PDF",
        reason: e.to_string(),
    }
}

/// A PDF text string: literal for ASCII, UTF-16BE with BOM otherwise.
fn text_string(value: &str) -> lopdf::Object {
    if value.is_ascii() {
        return lopdf::Object::String(value.as_bytes().to_vec(), lopdf::StringFormat::Literal);
    }
    let mut bytes = vec![0xFE, 0xFF];
    for unit in value.encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    lopdf::Object::String(bytes, lopdf::StringFormat::Hexadecimal)
}

/// Rewrite the information dictionary of `pdf` from the session.
pub fn stamp_info(pdf: &[u8], session: &Session) -> Result<Vec<u8>, TransformError> {
    let mut doc = lopdf::Document::load_mem(pdf).map_err(output_error)?;

    let mut info = match doc.trailer.get(b"Info").and_then(lopdf::Object::as_reference) {
        Ok(id) => doc
            .get_object(id)
            .and_then(lopdf::Object::as_dict)
            .cloned()
            .unwrap_or_else(|_| lopdf::Dictionary::new()),
        Err(_) => lopdf::Dictionary::new(),
    };

    info.set("Producer", text_string(session.producer()));
    info.set(
        "CreationDate",
        lopdf::Object::string_literal(
            session.creation_date().format("D:%Y%m%d%H%M%SZ").to_string(),
        ),
    );
    for (key, value) in [
        ("Title", Some(session.title()).filter(|t| !t.is_empty())),
        ("Author", session.author()),
        ("Creator", session.creator()),
    ] {
        match value {
            Some(value) => info.set(key, text_string(value)),
            None => {
                info.remove(key.as_bytes());
            }
        }
    }

    let info_id = doc.add_object(info);
    doc.trailer.set("Info", info_id);

    let mut out = Vec::new();
    doc.save_to(&mut out).map_err(output_error)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::area_tree::{ImageArea, LineArea, PageArea, TextArea};
    use crate::config::{ConfigSource, EngineConfig};
    use crate::resources::ResourceResolver;
    use chrono::{TimeZone, Utc};

    fn text_tree(text: &str) -> AreaTree {
        let mut area = AreaBox::new(50.0, 50.0, 200.0, 14.0);
        area.text = Some(TextArea {
            lines: vec![LineArea {
                x_offset: 0.0,
                y_offset: 0.0,
                width: 60.0,
                height: 14.0,
                baseline: 11.0,
                spans: vec![SpanArea {
                    text: text.to_string(),
                    x_offset: 0.0,
                    width: 60.0,
                    font_family: "Helvetica".into(),
                    bold: false,
                    italic: false,
                    font_size: 12.0,
                    color: [0.0, 0.0, 0.0, 1.0],
                    underline: true,
                }],
            }],
        });
        AreaTree {
            title: "Letter".into(),
            pages: vec![PageArea {
                number: 1,
                width: 595.0,
                height: 842.0,
                boxes: vec![area],
            }],
        }
    }

    fn info_value(pdf: &[u8], key: &[u8]) -> Option<Vec<u8>> {
        let doc = lopdf::Document::load_mem(pdf).unwrap();
        let id = doc.trailer.get(b"Info").unwrap().as_reference().unwrap();
        let info = doc.get_object(id).unwrap().as_dict().unwrap();
        info.get(key).ok().map(|v| v.as_str().unwrap().to_vec())
    }

    #[test]
    fn renders_pdf_header() {
        let mut images = ImageStore::new(ResourceResolver::new("."));
        let bytes = render_pdf(&text_tree("Hello John"), &FontManager::default(), &mut images, 72).unwrap();
        assert!(bytes.len() > 100, "PDF should have content");
        assert_eq!(&bytes[0..5], b"%PDF-");
    }

    #[test]
    fn info_dictionary_carries_session_metadata() {
        let engine = Engine::build(&EngineConfig::new(ConfigSource::Embedded, ".")).unwrap();
        let mut session = engine.new_session();
        session.set_title("Letter");
        session.set_author("Jane Roe");
        session.set_producer("Acme Reports");
        session.set_creation_date(Utc.with_ymd_and_hms(2021, 6, 1, 12, 30, 0).unwrap());

        let mut images = ImageStore::new(ResourceResolver::new("."));
        let rendered = render_pdf(&text_tree("Hi"), engine.fonts(), &mut images, 72).unwrap();
        let stamped = stamp_info(&rendered, &session).unwrap();

        assert_eq!(&stamped[0..5], b"%PDF-");
        assert_eq!(info_value(&stamped, b"Title").unwrap(), b"Letter");
        assert_eq!(info_value(&stamped, b"Author").unwrap(), b"Jane Roe");
        assert_eq!(info_value(&stamped, b"Producer").unwrap(), b"Acme Reports");
        assert_eq!(info_value(&stamped, b"CreationDate").unwrap(), b"D:20210601123000Z");
        assert!(info_value(&stamped, b"Creator").is_none());
    }

    #[test]
    fn non_ascii_metadata_is_utf16() {
        match text_string("Zoë") {
            lopdf::Object::String(bytes, lopdf::StringFormat::Hexadecimal) => {
                assert_eq!(&bytes[..2], &[0xFE, 0xFF]);
                assert_eq!(bytes.len(), 2 + 3 * 2);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn builtin_text_replaces_unmappable_characters() {
        assert_eq!(to_builtin_text("\u{201C}caf\u{e9}\u{201D} \u{2014} \u{4e2d}"), "\"caf\u{e9}\" - ?");
    }

    #[test]
    fn repeated_image_uses_its_largest_placement() {
        let graphic = |src: &str, size: f32| {
            let mut area = AreaBox::new(0.0, 0.0, size, size);
            area.image = Some(ImageArea {
                src: src.to_string(),
                width: size,
                height: size,
            });
            area
        };
        let page = |number: usize, boxes: Vec<AreaBox>| PageArea {
            number,
            width: 595.0,
            height: 842.0,
            boxes,
        };
        let tree = AreaTree {
            title: String::new(),
            pages: vec![
                page(1, vec![graphic("logo.png", 20.0), graphic("seal.png", 50.0)]),
                page(2, vec![graphic("logo.png", 200.0)]),
            ],
        };
        let placements = largest_placements(&tree);
        assert_eq!(placements, vec![("logo.png", 200.0, 200.0), ("seal.png", 50.0, 50.0)]);
    }
}
