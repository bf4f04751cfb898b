//! RTF backend – writes the formatting-object tree as flowing RTF.
//!
//! RTF readers paginate on their own, so the flow is emitted as paragraphs,
//! table rows and pictures. Page size and margins come from the page
//! masters; static content becomes section headers and footers.

use std::collections::HashMap;
use std::fmt::Write as _;

use chrono::{Datelike, Timelike};
use image::ImageFormat;

use crate::engine::{Engine, Session};
use crate::error::TransformError;
use crate::fo::{FoDocument, FoKind, PageGeometry};
use crate::layout::{cell_span, column_widths, is_inline, rows_of};
use crate::resources::ImageStore;
use crate::style::{
    build_styled_tree, parse_dimension, Color, ComputedStyle, Dimension, FontStyle, FontWeight,
    StyledNode, TextAlign, TextDecoration,
};

/// Points to twips.
fn tw(pt: f32) -> i32 {
    (pt * 20.0).round() as i32
}

/// Format `doc` as an RTF document.
pub fn write_rtf(
    doc: &FoDocument,
    engine: &Engine,
    session: &Session,
    images: &mut ImageStore,
) -> Result<Vec<u8>, TransformError> {
    let settings = engine.settings();
    let dpi = settings.source_resolution;
    let geometry_of = |master: Option<&crate::fo::FoElement>| match master {
        Some(m) => PageGeometry::from_master(m, settings),
        None => PageGeometry::from_settings(settings),
    };
    let document_geometry = geometry_of(doc.masters.first());

    let mut rtf = RtfBuilder::new(images, dpi, session.target_resolution());
    rtf.font_index(&settings.font_family);

    let mut body = String::new();
    for (index, sequence) in doc.sequences.iter().enumerate() {
        let geometry = geometry_of(doc.master_for(sequence));
        if index > 0 {
            body.push_str("\\sect\n");
        }
        body.push_str("\\sectd\\sbkpage");
        body.push_str(&page_setup(&geometry, "sxn"));
        body.push('\n');

        let base = ComputedStyle::for_sequence(settings, &sequence.inherited);
        for (content, group, region) in [
            (&sequence.before, "header", geometry.before),
            (&sequence.after, "footer", geometry.after),
        ] {
            if content.is_empty() {
                continue;
            }
            let width = region.map(|r| r.width).unwrap_or(geometry.body.width);
            let nodes = build_styled_tree(content, &base, dpi);
            let items = rtf.context(&nodes, &base, width);
            let _ = writeln!(body, "{{\\{group} {}}}", render_items(&items));
        }

        let nodes = build_styled_tree(&sequence.flow, &base, dpi);
        let mut items = rtf.context(&nodes, &base, geometry.body.width);
        if items.is_empty() {
            items.push(Item::Para("\\pard\\plain".to_string()));
        }
        body.push_str(&render_items(&items));
    }

    let mut out = String::from("{\\rtf1\\ansi\\ansicpg1252\\deff0\\uc1\n");
    out.push_str("{\\fonttbl");
    for (i, family) in rtf.fonts.iter().enumerate() {
        let _ = write!(out, "{{\\f{i}\\fnil {};}}", escape(family));
    }
    out.push_str("}\n{\\colortbl;");
    for (r, g, b) in &rtf.colors {
        let _ = write!(out, "\\red{r}\\green{g}\\blue{b};");
    }
    out.push_str("}\n");
    let _ = writeln!(out, "{{\\*\\generator {};}}", escape(session.producer()));
    out.push_str(&info_group(session));
    out.push_str(&page_setup(&document_geometry, ""));
    out.push('\n');
    out.push_str(&body);
    out.push('}');

    log::debug!(
        "RTF document with {} font(s), {} colour(s), {} section(s).",
        rtf.fonts.len(),
        rtf.colors.len(),
        doc.sequences.len()
    );
    Ok(out.into_bytes())
}

/// Paper size and margins; `suffix` is `"sxn"` for section-level words.
fn page_setup(g: &PageGeometry, suffix: &str) -> String {
    let margin_right = g.width - g.body.x - g.body.width;
    let margin_bottom = g.height - g.body.y - g.body.height;
    let header_y = g.before.map(|r| r.y).unwrap_or(g.margins[0]);
    let footer_y = g
        .after
        .map(|r| g.height - r.y - r.height)
        .unwrap_or(g.margins[2]);
    let (paper_w, paper_h) = if suffix.is_empty() {
        ("paperw", "paperh")
    } else {
        ("pgwsxn", "pghsxn")
    };
    format!(
        "\\{paper_w}{}\\{paper_h}{}\\margl{suffix}{}\\margr{suffix}{}\\margt{suffix}{}\\margb{suffix}{}\\headery{}\\footery{}",
        tw(g.width),
        tw(g.height),
        tw(g.body.x),
        tw(margin_right),
        tw(g.body.y),
        tw(margin_bottom),
        tw(header_y),
        tw(footer_y),
    )
}

fn info_group(session: &Session) -> String {
    let mut info = String::from("{\\info");
    if !session.title().is_empty() {
        let _ = write!(info, "{{\\title {}}}", escape(session.title()));
    }
    if let Some(author) = session.author() {
        let _ = write!(info, "{{\\author {}}}", escape(author));
    }
    if let Some(creator) = session.creator() {
        let _ = write!(info, "{{\\operator {}}}", escape(creator));
    }
    let date = session.creation_date();
    let _ = write!(
        info,
        "{{\\creatim\\yr{}\\mo{}\\dy{}\\hr{}\\min{}\\sec{}}}",
        date.year(),
        date.month(),
        date.day(),
        date.hour(),
        date.minute(),
        date.second()
    );
    info.push_str("}\n");
    info
}

/// Escape text for an RTF destination; non-ASCII becomes `\uN?`.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '{' => out.push_str("\\{"),
            '}' => out.push_str("\\}"),
            '\t' => out.push_str("\\tab "),
            c if c.is_ascii() => out.push(c),
            c => {
                let mut buf = [0u16; 2];
                for unit in c.encode_utf16(&mut buf) {
                    let _ = write!(out, "\\u{}?", *unit as i16);
                }
            }
        }
    }
    out
}

/// One emitted flow item.
enum Item {
    /// Paragraph control words and content, without the closing `\par`.
    Para(String),
    /// A complete table row ending in `\row`.
    Row(String),
}

fn render_items(items: &[Item]) -> String {
    let mut out = String::new();
    for item in items {
        match item {
            Item::Para(p) => {
                out.push_str(p);
                out.push_str("\\par\n");
            }
            Item::Row(r) => {
                out.push_str(r);
                out.push('\n');
            }
        }
    }
    out
}

/// Horizontal placement of the content being written, in points.
#[derive(Debug, Clone, Copy)]
struct Frame {
    left: f32,
    right: f32,
    width: f32,
    in_table: bool,
}

struct RtfBuilder<'a> {
    fonts: Vec<String>,
    colors: Vec<(u8, u8, u8)>,
    images: &'a mut ImageStore,
    source_resolution: f32,
    target_resolution: u32,
    /// Vertical space owed to the next paragraph.
    pending_space: f32,
    pending_break: bool,
    /// List label owed to the next paragraph, with the label width.
    pending_label: Option<(String, f32)>,
    started: bool,
}

impl<'a> RtfBuilder<'a> {
    fn new(images: &'a mut ImageStore, source_resolution: f32, target_resolution: u32) -> Self {
        Self {
            fonts: Vec::new(),
            colors: Vec::new(),
            images,
            source_resolution,
            target_resolution,
            pending_space: 0.0,
            pending_break: false,
            pending_label: None,
            started: false,
        }
    }

    fn font_index(&mut self, family: &str) -> usize {
        let family = family.trim().trim_matches(|c| c == '\'' || c == '"');
        match self.fonts.iter().position(|f| f == family) {
            Some(i) => i,
            None => {
                self.fonts.push(family.to_string());
                self.fonts.len() - 1
            }
        }
    }

    /// Colour table index; 0 is the reader's automatic colour.
    fn color_index(&mut self, color: Color) -> usize {
        let rgb = color.to_rgb8();
        match self.colors.iter().position(|c| *c == rgb) {
            Some(i) => i + 1,
            None => {
                self.colors.push(rgb);
                self.colors.len()
            }
        }
    }

    /// Write a self-contained flow (body, header or footer).
    fn context(&mut self, nodes: &[StyledNode], style: &ComputedStyle, width: f32) -> Vec<Item> {
        self.pending_space = 0.0;
        self.pending_break = false;
        self.pending_label = None;
        self.started = false;
        let frame = Frame {
            left: 0.0,
            right: 0.0,
            width,
            in_table: false,
        };
        let mut items = Vec::new();
        self.blocks(nodes, style, &frame, &mut items);
        items
    }

    fn blocks(&mut self, nodes: &[StyledNode], style: &ComputedStyle, frame: &Frame, out: &mut Vec<Item>) {
        let mut pending: Vec<&StyledNode> = Vec::new();
        for node in nodes {
            if is_inline(node) {
                pending.push(node);
                continue;
            }
            self.paragraph(&pending, style, frame, out);
            pending.clear();
            self.block_node(node, frame, out);
        }
        self.paragraph(&pending, style, frame, out);
    }

    fn block_node(&mut self, node: &StyledNode, frame: &Frame, out: &mut Vec<Item>) {
        let StyledNode::Element {
            kind,
            style,
            children,
            attrs,
        } = node
        else {
            return;
        };
        match kind {
            FoKind::TableColumn => {}
            FoKind::ExternalGraphic => self.graphic(style, attrs, frame, out),
            FoKind::Table => self.table(style, children, frame, out),
            FoKind::ListItem => self.list_item(style, children, frame, out),
            _ => {
                if style.break_before && self.started {
                    self.pending_break = true;
                }
                self.pending_space += style.margin_top + style.padding_top;
                let left = style.margin_left + style.padding_left + style.border_width;
                let right = style.margin_right + style.padding_right + style.border_width;
                let inner = Frame {
                    left: frame.left + left,
                    right: frame.right + right,
                    width: (frame.width - left - right).max(1.0),
                    in_table: frame.in_table,
                };
                self.blocks(children, style, &inner, out);
                self.pending_space += style.margin_bottom + style.padding_bottom;
                if style.break_after {
                    self.pending_break = true;
                }
            }
        }
    }

    /// Paragraph-level control words; consumes pending space and breaks.
    fn paragraph_start(&mut self, style: &ComputedStyle, frame: &Frame) -> String {
        let mut p = String::from("\\pard\\plain");
        if frame.in_table {
            p.push_str("\\intbl");
        }
        if std::mem::take(&mut self.pending_break) && !frame.in_table {
            p.push_str("\\pagebb");
        }
        p.push_str(match style.text_align {
            TextAlign::Left => "\\ql",
            TextAlign::Center => "\\qc",
            TextAlign::Right => "\\qr",
            TextAlign::Justify => "\\qj",
        });
        let space = std::mem::take(&mut self.pending_space);
        let _ = write!(
            p,
            "\\li{}\\ri{}\\sb{}\\sl{}\\slmult0",
            tw(frame.left),
            tw(frame.right),
            tw(space),
            tw(style.font_size * style.line_height)
        );
        if style.keep_together {
            p.push_str("\\keep");
        }
        self.started = true;
        p
    }

    fn paragraph(&mut self, nodes: &[&StyledNode], style: &ComputedStyle, frame: &Frame, out: &mut Vec<Item>) {
        let mut runs = String::new();
        let mut at_space = true;
        let mut visible = false;
        for node in nodes {
            visible |= self.runs(node, &mut runs, &mut at_space);
        }
        if !visible {
            return;
        }
        let mut p = self.paragraph_start(style, frame);
        if let Some((label, width)) = self.pending_label.take() {
            let _ = write!(p, "\\fi-{}\\tx{} {label}\\tab", tw(width), tw(frame.left));
        }
        p.push(' ');
        p.push_str(&runs);
        out.push(Item::Para(p));
    }

    /// Character formatting for a run.
    fn char_format(&mut self, style: &ComputedStyle) -> String {
        let font = self.font_index(&style.font_family);
        let color = self.color_index(style.color);
        let mut f = format!("\\f{font}\\fs{}\\cf{color}", (style.font_size * 2.0).round() as i32);
        if style.font_weight == FontWeight::Bold {
            f.push_str("\\b");
        }
        if style.font_style == FontStyle::Italic {
            f.push_str("\\i");
        }
        if style.text_decoration == TextDecoration::Underline {
            f.push_str("\\ul");
        }
        f
    }

    /// Append the runs of an inline subtree; returns whether anything
    /// visible was written.
    fn runs(&mut self, node: &StyledNode, out: &mut String, at_space: &mut bool) -> bool {
        match node {
            StyledNode::Text { text, style } => {
                let mut collapsed = String::new();
                for c in text.chars() {
                    if c.is_whitespace() {
                        if !*at_space {
                            collapsed.push(' ');
                            *at_space = true;
                        }
                    } else {
                        collapsed.push(c);
                        *at_space = false;
                    }
                }
                if collapsed.is_empty() {
                    return false;
                }
                let format = self.char_format(style);
                let _ = write!(out, "{{{format} {}}}", escape(&collapsed));
                !collapsed.trim().is_empty()
            }
            StyledNode::Element {
                kind: FoKind::PageNumber,
                style,
                ..
            } => {
                let format = self.char_format(style);
                let _ = write!(out, "{{{format} {{\\field{{\\*\\fldinst PAGE}}{{\\fldrslt 1}}}}}}");
                *at_space = false;
                true
            }
            StyledNode::Element {
                kind: FoKind::ExternalGraphic,
                ..
            } => {
                log::warn!("Ignoring external-graphic nested in inline content.");
                false
            }
            StyledNode::Element { children, .. } => {
                let mut visible = false;
                for child in children {
                    visible |= self.runs(child, out, at_space);
                }
                visible
            }
        }
    }

    // -- Graphics -----------------------------------------------------------

    fn graphic(&mut self, style: &ComputedStyle, attrs: &HashMap<String, String>, frame: &Frame, out: &mut Vec<Item>) {
        let Some(src) = attrs.get("src").filter(|s| !s.trim().is_empty()) else {
            log::warn!("external-graphic without src.");
            return;
        };
        let Some(loaded) = self.images.get(src) else {
            return;
        };
        let blip = match loaded.format {
            ImageFormat::Png => "\\pngblip",
            ImageFormat::Jpeg => "\\jpegblip",
            other => {
                log::warn!("Skipping {other:?} graphic in RTF output.");
                return;
            }
        };

        let px_to_pt = 72.0 / self.source_resolution;
        let (iw, ih) = (
            (loaded.width_px as f32 * px_to_pt).max(1.0),
            (loaded.height_px as f32 * px_to_pt).max(1.0),
        );
        let length = |name: &str, dim: Dimension, intrinsic: f32, parent: f32| -> Option<f32> {
            let from_attr = attrs
                .get(name)
                .map(|v| parse_dimension(v, style.font_size, self.source_resolution));
            match from_attr.unwrap_or(dim) {
                Dimension::Pt(v) => Some(v),
                Dimension::Percent(p) if from_attr.is_some() => Some(intrinsic * p / 100.0),
                Dimension::Percent(p) => Some(parent * p / 100.0),
                _ => None,
            }
        };
        let (mut w, mut h) = match (
            length("content-width", style.width, iw, frame.width),
            length("content-height", style.height, ih, frame.width),
        ) {
            (Some(w), Some(h)) => (w, h),
            (Some(w), None) => (w, w * ih / iw),
            (None, Some(h)) => (h * iw / ih, h),
            (None, None) => (iw, ih),
        };
        if w > frame.width {
            h *= frame.width / w;
            w = frame.width;
        }

        let prepared = super::image::prepare(&loaded, w, h, self.target_resolution);
        let mut pict = format!(
            "{{\\pict{blip}\\picw{}\\pich{}\\picwgoal{}\\pichgoal{}\n",
            prepared.width_px,
            prepared.height_px,
            tw(w),
            tw(h)
        );
        for chunk in prepared.bytes.chunks(64) {
            for byte in chunk {
                let _ = write!(pict, "{byte:02x}");
            }
            pict.push('\n');
        }
        pict.push('}');

        self.pending_space += style.margin_top;
        let mut p = self.paragraph_start(style, frame);
        p.push(' ');
        p.push_str(&pict);
        out.push(Item::Para(p));
        self.pending_space += style.margin_bottom;
    }

    // -- Tables -------------------------------------------------------------

    fn table(&mut self, style: &ComputedStyle, children: &[StyledNode], frame: &Frame, out: &mut Vec<Item>) {
        let mut columns: Vec<Dimension> = Vec::new();
        let mut header: Vec<&StyledNode> = Vec::new();
        let mut body: Vec<&StyledNode> = Vec::new();
        for child in children {
            let StyledNode::Element {
                kind,
                style: child_style,
                children: grandchildren,
                attrs,
            } = child
            else {
                continue;
            };
            match kind {
                FoKind::TableColumn => {
                    let width = attrs
                        .get("column-width")
                        .map(|v| parse_dimension(v, child_style.font_size, self.source_resolution))
                        .unwrap_or(Dimension::Auto);
                    let repeat = attrs
                        .get("number-columns-repeated")
                        .and_then(|v| v.trim().parse::<usize>().ok())
                        .unwrap_or(1)
                        .max(1);
                    columns.extend(std::iter::repeat(width).take(repeat));
                }
                FoKind::TableHeader => header.extend(rows_of(grandchildren)),
                FoKind::TableBody | FoKind::TableFooter => body.extend(rows_of(grandchildren)),
                FoKind::TableRow => body.push(child),
                _ => {}
            }
        }

        if frame.in_table {
            log::debug!("Nested table flattened into its cell.");
            for row in header.iter().chain(body.iter()) {
                if let StyledNode::Element { children: cells, .. } = row {
                    for cell in cells {
                        if let StyledNode::Element {
                            style: cell_style,
                            children,
                            ..
                        } = cell
                        {
                            self.blocks(children, cell_style, frame, out);
                        }
                    }
                }
            }
            return;
        }

        let spans = header
            .iter()
            .chain(body.iter())
            .map(|row| match row {
                StyledNode::Element { children, .. } => children
                    .iter()
                    .map(|c| match c {
                        StyledNode::Element { attrs, .. } => cell_span(attrs),
                        StyledNode::Text { .. } => 0,
                    })
                    .sum(),
                StyledNode::Text { .. } => 0,
            })
            .max()
            .unwrap_or(0);
        if columns.len() < spans {
            columns.resize(spans, Dimension::Auto);
        }
        let left = frame.left + style.margin_left;
        let total = (frame.width - style.margin_left - style.margin_right).max(1.0);
        let widths = column_widths(&columns, total);

        let header_rows = header.len();
        for (index, row) in header.into_iter().chain(body).enumerate() {
            let StyledNode::Element { children: cells, .. } = row else {
                continue;
            };
            let row_space = if index == 0 {
                style.margin_top + std::mem::take(&mut self.pending_space)
            } else {
                0.0
            };
            if index == 0 && std::mem::take(&mut self.pending_break) {
                out.push(Item::Para("\\pard\\plain\\page".to_string()));
            }
            let mut r = format!("\\trowd\\trgaph{}\\trleft{}\\trkeep", tw(2.0), tw(left));
            if index < header_rows {
                r.push_str("\\trhdr");
            }

            let mut contents = String::new();
            let mut edge = left;
            let mut column = 0usize;
            for cell in cells {
                let StyledNode::Element {
                    kind: FoKind::TableCell,
                    style: cell_style,
                    children,
                    attrs,
                } = cell
                else {
                    continue;
                };
                let span = cell_span(attrs);
                let width: f32 = widths.iter().skip(column).take(span).sum();
                column += span;
                edge += width;

                if cell_style.border_width > 0.0 {
                    let color = self.color_index(cell_style.border_color);
                    for side in ["t", "l", "b", "r"] {
                        let _ = write!(
                            r,
                            "\\clbrdr{side}\\brdrs\\brdrw{}\\brdrcf{color}",
                            tw(cell_style.border_width)
                        );
                    }
                }
                if !cell_style.background_color.is_transparent() {
                    let _ = write!(r, "\\clcbpat{}", self.color_index(cell_style.background_color));
                }
                let _ = write!(r, "\\cellx{}", tw(edge));

                let inner = Frame {
                    left: cell_style.padding_left,
                    right: cell_style.padding_right,
                    width: (width - cell_style.padding_left - cell_style.padding_right).max(1.0),
                    in_table: true,
                };
                self.pending_space = row_space + cell_style.padding_top;
                let mut items = Vec::new();
                self.blocks(children, cell_style, &inner, &mut items);
                if items.is_empty() {
                    contents.push_str("\\pard\\plain\\intbl");
                } else {
                    let paragraphs: Vec<&str> = items
                        .iter()
                        .map(|i| match i {
                            Item::Para(p) | Item::Row(p) => p.as_str(),
                        })
                        .collect();
                    contents.push_str(&paragraphs.join("\\par\n"));
                }
                contents.push_str("\\cell\n");
            }
            self.pending_space = 0.0;
            r.push('\n');
            r.push_str(&contents);
            r.push_str("\\row");
            out.push(Item::Row(r));
            self.started = true;
        }
        self.pending_space += style.margin_bottom;
        if style.break_after {
            self.pending_break = true;
        }
    }

    // -- Lists --------------------------------------------------------------

    fn list_item(&mut self, style: &ComputedStyle, children: &[StyledNode], frame: &Frame, out: &mut Vec<Item>) {
        self.pending_space += style.margin_top;
        let left = frame.left + style.margin_left;
        let label_width = style.label_width.clamp(0.0, frame.width);

        let mut label = String::new();
        let mut body: Option<(&ComputedStyle, &[StyledNode])> = None;
        for child in children {
            let StyledNode::Element {
                kind,
                style: part_style,
                children: part_children,
                ..
            } = child
            else {
                continue;
            };
            match kind {
                FoKind::ListItemLabel => {
                    let mut at_space = true;
                    for node in part_children {
                        self.runs(node, &mut label, &mut at_space);
                    }
                }
                FoKind::ListItemBody => body = Some((part_style, part_children.as_slice())),
                other => log::warn!("Ignoring {other:?} inside list-item."),
            }
        }

        if !label.is_empty() {
            self.pending_label = Some((label, label_width));
        }
        let body_frame = Frame {
            left: left + label_width,
            right: frame.right + style.margin_right,
            width: (frame.width - style.margin_left - style.margin_right - label_width).max(1.0),
            in_table: frame.in_table,
        };
        if let Some((body_style, body_children)) = body {
            self.blocks(body_children, body_style, &body_frame, out);
        }
        if let Some((label, width)) = self.pending_label.take() {
            let mut p = self.paragraph_start(style, &body_frame);
            let _ = write!(p, "\\fi-{}\\tx{} {label}", tw(width), tw(body_frame.left));
            out.push(Item::Para(p));
        }
        self.pending_space += style.margin_bottom;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigSource, EngineConfig};
    use crate::fo::FoTreeBuilder;
    use crate::resources::tests::PIXEL_PNG;
    use crate::transform::transform;
    use chrono::{TimeZone, Utc};

    fn render(flow: &str, statics: &str) -> String {
        let markup = format!(
            r#"<fo:root xmlns:fo="http://www.w3.org/1999/XSL/Format">
  <fo:layout-master-set>
    <fo:simple-page-master master-name="letter" page-width="8.5in" page-height="11in" margin="1in">
      <fo:region-body/>
      <fo:region-after extent="0.5in"/>
    </fo:simple-page-master>
  </fo:layout-master-set>
  <fo:page-sequence master-reference="letter">{statics}<fo:flow flow-name="xsl-region-body">{flow}</fo:flow></fo:page-sequence>
</fo:root>"#
        );
        let mut builder = FoTreeBuilder::new();
        transform(&markup, &mut builder).unwrap();
        let doc = builder.finish().unwrap();

        let engine = Engine::build(&EngineConfig::new(ConfigSource::Embedded, ".")).unwrap();
        let mut session = engine.new_session();
        session.set_title("Quarterly {report}");
        session.set_author("Jane Roe");
        session.set_creator("billing");
        session.set_creation_date(Utc.with_ymd_and_hms(2022, 3, 4, 5, 6, 7).unwrap());
        let mut images = engine.image_store();
        let bytes = write_rtf(&doc, &engine, &session, &mut images).unwrap();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn document_header_and_info() {
        let rtf = render("<fo:block>Hello</fo:block>", "");
        assert!(rtf.starts_with("{\\rtf1"));
        assert!(rtf.ends_with('}'));
        assert!(rtf.contains("{\\title Quarterly \\{report\\}}"));
        assert!(rtf.contains("{\\author Jane Roe}"));
        assert!(rtf.contains("{\\operator billing}"));
        assert!(rtf.contains("{\\creatim\\yr2022\\mo3\\dy4\\hr5\\min6\\sec7}"));
        assert!(rtf.contains("{\\*\\generator fo-view;}"));
        assert!(rtf.contains("\\paperw12240\\paperh15840\\margl1440"));
        assert!(rtf.contains("{\\f0\\fnil Helvetica;}"));
    }

    #[test]
    fn character_formatting() {
        let rtf = render(
            r#"<fo:block text-align="center">Dear <fo:inline font-weight="bold" color="red">John</fo:inline></fo:block>"#,
            "",
        );
        assert!(rtf.contains("\\qc"));
        assert!(rtf.contains("\\fs24\\cf1 Dear }"));
        assert!(rtf.contains("\\cf2\\b John}"));
        assert!(rtf.contains("\\red255\\green0\\blue0;"));
    }

    #[test]
    fn breaks_become_pagebb() {
        let rtf = render(
            r#"<fo:block break-before="page">First</fo:block><fo:block break-before="page">Second</fo:block>"#,
            "",
        );
        assert_eq!(rtf.matches("\\pagebb").count(), 1);
    }

    #[test]
    fn tables_emit_rows_and_cells() {
        let rtf = render(
            r#"<fo:table><fo:table-column column-width="2in"/><fo:table-column column-width="1in"/>
<fo:table-header><fo:table-row><fo:table-cell><fo:block>Item</fo:block></fo:table-cell><fo:table-cell><fo:block>Qty</fo:block></fo:table-cell></fo:table-row></fo:table-header>
<fo:table-body><fo:table-row><fo:table-cell border="1pt solid black"><fo:block>Apple</fo:block></fo:table-cell><fo:table-cell/></fo:table-row></fo:table-body></fo:table>"#,
            "",
        );
        assert_eq!(rtf.matches("\\trowd").count(), 2);
        assert_eq!(rtf.matches("\\row").count(), 2);
        assert_eq!(rtf.matches("\\trhdr").count(), 1);
        assert!(rtf.contains("\\cellx2880\\cellx4320"));
        assert!(rtf.contains("\\clbrdrt\\brdrs\\brdrw20"));
        assert_eq!(rtf.matches("\\cell\n").count(), 4);
    }

    #[test]
    fn footer_carries_page_field() {
        let rtf = render(
            "<fo:block>Body</fo:block>",
            r#"<fo:static-content flow-name="xsl-region-after"><fo:block>Page <fo:page-number/></fo:block></fo:static-content>"#,
        );
        assert!(rtf.contains("{\\footer "));
        assert!(rtf.contains("{\\field{\\*\\fldinst PAGE}{\\fldrslt 1}}"));
    }

    #[test]
    fn list_labels_use_hanging_indent() {
        let rtf = render(
            r#"<fo:list-block><fo:list-item><fo:list-item-label><fo:block>1.</fo:block></fo:list-item-label><fo:list-item-body><fo:block>First</fo:block></fo:list-item-body></fo:list-item></fo:list-block>"#,
            "",
        );
        assert!(rtf.contains("\\fi-480\\tx480"));
        assert!(rtf.contains("1.}\\tab"));
    }

    #[test]
    fn graphics_are_embedded_as_hex() {
        let rtf = render(
            &format!(r#"<fo:block><fo:external-graphic src="url('data:image/png;base64,{PIXEL_PNG}')"/></fo:block>"#),
            "",
        );
        assert!(rtf.contains("{\\pict\\pngblip\\picw1\\pich1\\picwgoal20\\pichgoal20"));
        assert!(rtf.contains("89504e47"));
    }

    #[test]
    fn escaping() {
        assert_eq!(escape("a{b}\\c"), "a\\{b\\}\\\\c");
        assert_eq!(escape("caf\u{e9}"), "caf\\u233?");
        assert_eq!(escape("\u{1F600}"), "\\u-10179?\\u-8704?");
    }
}
