//! Layout engine – uses Taffy to compute block, table and list layout from a
//! styled FO tree, then converts the result into positioned boxes.
//!
//! Inline content (text, `inline`, `basic-link`, `page-number`) is merged
//! into paragraphs and word-wrapped at build time; Taffy only stacks the
//! resulting fixed-height leaves.

use std::collections::HashMap;
use taffy::prelude::*;

use crate::area_tree::{LineArea, SpanArea};
use crate::error::TransformError;
use crate::fo::FoKind;
use crate::fonts::{wrap_text, FontManager, TextRun, PAGE_NUMBER_MARK};
use crate::resources::ImageStore;
use crate::style::{
    parse_dimension, Color, ComputedStyle, Dimension as FoDimension, FontStyle as FoFontStyle,
    FontWeight, StyledNode, TextAlign, TextDecoration,
};

// ---------------------------------------------------------------------------
// Intermediate layout tree (pre-pagination)
// ---------------------------------------------------------------------------

/// A positioned box in flow coordinates (before page splitting).
#[derive(Debug, Clone)]
pub struct PositionedBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub style: ComputedStyle,
    pub content: BoxContent,
    pub children: Vec<PositionedBox>,
    /// Children stack vertically and may be placed on different pages.
    pub splittable: bool,
}

#[derive(Debug, Clone)]
pub enum BoxContent {
    None,
    /// Wrapped lines; offsets are relative to the box.
    Text { lines: Vec<LineArea> },
    Image { src: String },
}

#[derive(Debug, Clone)]
struct NodeInfo {
    style: ComputedStyle,
    content: BoxContent,
    splittable: bool,
}

fn layout_error(e: taffy::TaffyError) -> TransformError {
    TransformError::Layout(e.to_string())
}

// ---------------------------------------------------------------------------
// Build Taffy tree from styled nodes
// ---------------------------------------------------------------------------

struct LayoutBuilder<'a> {
    taffy: TaffyTree<()>,
    fonts: &'a FontManager,
    images: &'a mut ImageStore,
    source_resolution: f32,
    info: HashMap<NodeId, NodeInfo>,
}

impl<'a> LayoutBuilder<'a> {
    fn new(fonts: &'a FontManager, images: &'a mut ImageStore, source_resolution: f32) -> Self {
        Self {
            taffy: TaffyTree::new(),
            fonts,
            images,
            source_resolution,
            info: HashMap::new(),
        }
    }

    fn insert(&mut self, node: NodeId, style: &ComputedStyle, content: BoxContent, splittable: bool) {
        self.info.insert(
            node,
            NodeInfo {
                style: style.clone(),
                content,
                splittable,
            },
        );
    }

    /// Build the children of a block-level object. Consecutive inline
    /// children become one paragraph leaf.
    fn build_children(
        &mut self,
        children: &[StyledNode],
        block_style: &ComputedStyle,
        width: f32,
    ) -> Result<Vec<NodeId>, TransformError> {
        let mut ids = Vec::new();
        let mut pending: Vec<&StyledNode> = Vec::new();
        for child in children {
            if is_inline(child) {
                pending.push(child);
                continue;
            }
            if let Some(id) = self.build_paragraph(&pending, block_style, width)? {
                ids.push(id);
            }
            pending.clear();
            if let Some(id) = self.build_node(child, width)? {
                ids.push(id);
            }
        }
        if let Some(id) = self.build_paragraph(&pending, block_style, width)? {
            ids.push(id);
        }
        Ok(ids)
    }

    fn build_node(&mut self, node: &StyledNode, parent_width: f32) -> Result<Option<NodeId>, TransformError> {
        let StyledNode::Element {
            kind,
            style,
            children,
            attrs,
        } = node
        else {
            return Ok(None);
        };
        match kind {
            FoKind::TableColumn => Ok(None),
            FoKind::ExternalGraphic => self.build_graphic(style, attrs, parent_width).map(Some),
            FoKind::Table => self.build_table(style, children, parent_width).map(Some),
            FoKind::ListItem => self.build_list_item(style, children, parent_width).map(Some),
            _ => self.build_block(style, children, parent_width).map(Some),
        }
    }

    fn build_block(
        &mut self,
        style: &ComputedStyle,
        children: &[StyledNode],
        parent_width: f32,
    ) -> Result<NodeId, TransformError> {
        let inner = content_width(style, outer_width(style, parent_width));
        let ids = self.build_children(children, style, inner)?;
        let node = self
            .taffy
            .new_with_children(box_style(style), &ids)
            .map_err(layout_error)?;
        self.insert(node, style, BoxContent::None, !style.keep_together);
        Ok(node)
    }

    // -- Text ---------------------------------------------------------------

    fn text_run(&self, text: String, style: &ComputedStyle) -> TextRun {
        TextRun {
            text,
            font: self.fonts.resolve(
                &style.font_family,
                style.font_weight == FontWeight::Bold,
                style.font_style == FoFontStyle::Italic,
            ),
            font_size: style.font_size,
            color: style.color,
            underline: style.text_decoration == TextDecoration::Underline,
        }
    }

    fn collect_runs(&self, node: &StyledNode, runs: &mut Vec<TextRun>) {
        match node {
            StyledNode::Text { text, style } => runs.push(self.text_run(text.clone(), style)),
            StyledNode::Element {
                kind: FoKind::PageNumber,
                style,
                ..
            } => runs.push(self.text_run(PAGE_NUMBER_MARK.to_string(), style)),
            StyledNode::Element {
                kind: FoKind::ExternalGraphic,
                ..
            } => log::warn!("Ignoring external-graphic nested in inline content."),
            StyledNode::Element { children, .. } => {
                for child in children {
                    self.collect_runs(child, runs);
                }
            }
        }
    }

    /// Merge inline nodes into a single wrapped text leaf.
    fn build_paragraph(
        &mut self,
        nodes: &[&StyledNode],
        block_style: &ComputedStyle,
        width: f32,
    ) -> Result<Option<NodeId>, TransformError> {
        let mut runs = Vec::new();
        for node in nodes {
            self.collect_runs(node, &mut runs);
        }
        if runs.iter().all(|r| r.text.trim().is_empty()) {
            return Ok(None);
        }

        let mut lines = Vec::new();
        let mut y = 0.0f32;
        for line in wrap_text(&runs, width, self.fonts) {
            let mut max_size = 0.0f32;
            let mut ascent = 0.0f32;
            for seg in &line.segments {
                let run = &runs[seg.run];
                max_size = max_size.max(run.font_size);
                ascent = ascent.max(self.fonts.ascender(run.font_size, &run.font));
            }
            let height = max_size * block_style.line_height;

            let mut spans = Vec::with_capacity(line.segments.len());
            let mut x = 0.0f32;
            for seg in line.segments {
                let run = &runs[seg.run];
                spans.push(SpanArea {
                    text: seg.text,
                    x_offset: x,
                    width: seg.width,
                    font_family: run.font.family.clone(),
                    bold: run.font.bold,
                    italic: run.font.italic,
                    font_size: run.font_size,
                    color: color_array(run.color),
                    underline: run.underline,
                });
                x += seg.width;
            }

            lines.push(LineArea {
                x_offset: 0.0,
                y_offset: y,
                width: line.width,
                height,
                // Half-leading above the tallest glyphs.
                baseline: ascent + (height - max_size) / 2.0,
                spans,
            });
            y += height;
        }

        let leaf = Style {
            size: Size {
                width: taffy::Dimension::Auto,
                height: taffy::Dimension::Length(y),
            },
            flex_shrink: 0.0,
            ..Default::default()
        };
        let node = self.taffy.new_leaf(leaf).map_err(layout_error)?;
        self.insert(
            node,
            &text_style(block_style),
            BoxContent::Text { lines },
            !block_style.keep_together,
        );
        Ok(Some(node))
    }

    // -- Graphics -----------------------------------------------------------

    fn build_graphic(
        &mut self,
        style: &ComputedStyle,
        attrs: &HashMap<String, String>,
        parent_width: f32,
    ) -> Result<NodeId, TransformError> {
        let src = attrs.get("src").cloned().unwrap_or_default();
        let loaded = if src.is_empty() {
            log::warn!("external-graphic without src.");
            None
        } else {
            self.images.get(&src)
        };
        let px_to_pt = 72.0 / self.source_resolution;
        let intrinsic = loaded
            .as_ref()
            .filter(|img| img.width_px > 0 && img.height_px > 0)
            .map(|img| (img.width_px as f32 * px_to_pt, img.height_px as f32 * px_to_pt));

        let (fs, dpi) = (style.font_size, self.source_resolution);
        let content_len = |name: &str, intrinsic_len: Option<f32>, fit: Option<f32>| -> Option<f32> {
            let value = attrs.get(name)?.trim();
            if value == "scale-to-fit" {
                return fit;
            }
            match parse_dimension(value, fs, dpi) {
                FoDimension::Pt(v) => Some(v),
                FoDimension::Percent(p) => intrinsic_len.map(|i| i * p / 100.0),
                _ => None,
            }
        };
        let known_w = content_len("content-width", intrinsic.map(|i| i.0), Some(parent_width)).or(
            match style.width {
                FoDimension::Pt(w) => Some(w),
                FoDimension::Percent(p) => Some(parent_width * p / 100.0),
                _ => None,
            },
        );
        let known_h = content_len("content-height", intrinsic.map(|i| i.1), None).or(
            match style.height {
                FoDimension::Pt(h) => Some(h),
                _ => None,
            },
        );

        let (mut w, mut h) = match (known_w, known_h, intrinsic) {
            (Some(w), Some(h), _) => (w, h),
            // Keep the aspect ratio when only one side is given.
            (Some(w), None, Some((iw, ih))) => (w, w * ih / iw),
            (None, Some(h), Some((iw, ih))) => (h * iw / ih, h),
            (None, None, Some((iw, ih))) => (iw, ih),
            (w, h, None) => (w.unwrap_or(0.0), h.unwrap_or(0.0)),
        };
        if w > parent_width && w > 0.0 {
            let scale = parent_width / w;
            w *= scale;
            h *= scale;
        }

        let mut leaf = box_style(style);
        leaf.size = Size {
            width: taffy::Dimension::Length(w),
            height: taffy::Dimension::Length(h),
        };
        let node = self.taffy.new_leaf(leaf).map_err(layout_error)?;
        let content = match loaded {
            Some(_) => BoxContent::Image { src },
            None => BoxContent::None,
        };
        self.insert(node, style, content, false);
        Ok(node)
    }

    // -- Tables -------------------------------------------------------------

    fn build_table(
        &mut self,
        style: &ComputedStyle,
        children: &[StyledNode],
        parent_width: f32,
    ) -> Result<NodeId, TransformError> {
        let inner = content_width(style, outer_width(style, parent_width));

        let mut columns: Vec<FoDimension> = Vec::new();
        let mut header: Vec<&StyledNode> = Vec::new();
        let mut body: Vec<&StyledNode> = Vec::new();
        let mut footer: Vec<&StyledNode> = Vec::new();
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
                        .unwrap_or(FoDimension::Auto);
                    let repeat = attrs
                        .get("number-columns-repeated")
                        .and_then(|v| v.trim().parse::<usize>().ok())
                        .unwrap_or(1)
                        .max(1);
                    columns.extend(std::iter::repeat(width).take(repeat));
                }
                FoKind::TableHeader => header.extend(rows_of(grandchildren)),
                FoKind::TableBody => body.extend(rows_of(grandchildren)),
                FoKind::TableFooter => footer.extend(rows_of(grandchildren)),
                FoKind::TableRow => body.push(child),
                other => log::warn!("Ignoring {other:?} inside table."),
            }
        }

        let rows: Vec<&StyledNode> = header.into_iter().chain(body).chain(footer).collect();
        let spans = rows.iter().map(|r| row_span(r)).max().unwrap_or(0);
        if columns.len() < spans {
            columns.resize(spans, FoDimension::Auto);
        }
        let widths = column_widths(&columns, inner);

        let mut row_ids = Vec::with_capacity(rows.len());
        for row in rows {
            if let StyledNode::Element {
                style: row_style,
                children: cells,
                ..
            } = row
            {
                row_ids.push(self.build_row(row_style, cells, &widths)?);
            }
        }

        let node = self
            .taffy
            .new_with_children(box_style(style), &row_ids)
            .map_err(layout_error)?;
        self.insert(node, style, BoxContent::None, !style.keep_together);
        Ok(node)
    }

    fn build_row(
        &mut self,
        style: &ComputedStyle,
        cells: &[StyledNode],
        widths: &[f32],
    ) -> Result<NodeId, TransformError> {
        let mut column = 0usize;
        let mut cell_ids = Vec::new();
        for cell in cells {
            let StyledNode::Element {
                kind: FoKind::TableCell,
                style: cell_style,
                children,
                attrs,
            } = cell
            else {
                if let StyledNode::Element { kind, .. } = cell {
                    log::warn!("Ignoring {kind:?} inside table-row.");
                }
                continue;
            };
            let span = cell_span(attrs);
            let width: f32 = widths.iter().skip(column).take(span).sum();
            column += span;

            let inner = content_width(cell_style, width);
            let ids = self.build_children(children, cell_style, inner)?;
            let mut ts = box_style(cell_style);
            ts.size.width = taffy::Dimension::Length(width);
            ts.margin = no_margin();
            let node = self.taffy.new_with_children(ts, &ids).map_err(layout_error)?;
            self.insert(node, cell_style, BoxContent::None, false);
            cell_ids.push(node);
        }

        let mut ts = box_style(style);
        ts.flex_direction = taffy::FlexDirection::Row;
        ts.align_items = Some(taffy::AlignItems::Stretch);
        let node = self.taffy.new_with_children(ts, &cell_ids).map_err(layout_error)?;
        // Rows move between pages as a whole.
        self.insert(node, style, BoxContent::None, false);
        Ok(node)
    }

    // -- Lists --------------------------------------------------------------

    fn build_list_item(
        &mut self,
        style: &ComputedStyle,
        children: &[StyledNode],
        parent_width: f32,
    ) -> Result<NodeId, TransformError> {
        let inner = content_width(style, outer_width(style, parent_width));
        let label_width = style.label_width.clamp(0.0, inner);
        let body_width = (inner - label_width).max(1.0);

        let mut ids = Vec::new();
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
            let width = match kind {
                FoKind::ListItemLabel => label_width,
                FoKind::ListItemBody => body_width,
                other => {
                    log::warn!("Ignoring {other:?} inside list-item.");
                    continue;
                }
            };
            let part_inner = content_width(part_style, width);
            let part_ids = self.build_children(part_children, part_style, part_inner)?;
            let mut ts = box_style(part_style);
            ts.size.width = taffy::Dimension::Length(width);
            ts.margin = no_margin();
            let node = self.taffy.new_with_children(ts, &part_ids).map_err(layout_error)?;
            self.insert(node, part_style, BoxContent::None, false);
            ids.push(node);
        }

        let mut ts = box_style(style);
        ts.flex_direction = taffy::FlexDirection::Row;
        ts.align_items = Some(taffy::AlignItems::Start);
        let node = self.taffy.new_with_children(ts, &ids).map_err(layout_error)?;
        self.insert(node, style, BoxContent::None, false);
        Ok(node)
    }

    /// Extract positioned boxes after layout computation.
    fn extract(&self, node: NodeId, offset_x: f32, offset_y: f32) -> Result<PositionedBox, TransformError> {
        let (x, y, width, height) = {
            let layout = self.taffy.layout(node).map_err(layout_error)?;
            (
                offset_x + layout.location.x,
                offset_y + layout.location.y,
                layout.size.width,
                layout.size.height,
            )
        };
        let (style, mut content, splittable) = match self.info.get(&node) {
            Some(info) => (info.style.clone(), info.content.clone(), info.splittable),
            None => (ComputedStyle::default(), BoxContent::None, true),
        };

        if let BoxContent::Text { lines } = &mut content {
            for line in lines.iter_mut() {
                let free = (width - line.width).max(0.0);
                line.x_offset = match style.text_align {
                    TextAlign::Center => free / 2.0,
                    TextAlign::Right => free,
                    TextAlign::Left | TextAlign::Justify => 0.0,
                };
            }
        }

        let children = self
            .taffy
            .children(node)
            .map_err(layout_error)?
            .into_iter()
            .map(|child| self.extract(child, x, y))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(PositionedBox {
            x,
            y,
            width,
            height,
            style,
            content,
            children,
            splittable,
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub(crate) fn is_inline(node: &StyledNode) -> bool {
    match node {
        StyledNode::Text { .. } => true,
        StyledNode::Element { kind, .. } => kind.is_inline(),
    }
}

pub(crate) fn rows_of(children: &[StyledNode]) -> impl Iterator<Item = &StyledNode> {
    children.iter().filter(|c| {
        matches!(
            c,
            StyledNode::Element {
                kind: FoKind::TableRow,
                ..
            }
        )
    })
}

pub(crate) fn cell_span(attrs: &HashMap<String, String>) -> usize {
    attrs
        .get("number-columns-spanned")
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(1)
        .max(1)
}

/// Number of columns a row occupies.
fn row_span(row: &StyledNode) -> usize {
    match row {
        StyledNode::Element { children, .. } => children
            .iter()
            .map(|cell| match cell {
                StyledNode::Element {
                    kind: FoKind::TableCell,
                    attrs,
                    ..
                } => cell_span(attrs),
                _ => 0,
            })
            .sum(),
        StyledNode::Text { .. } => 0,
    }
}

/// Resolve column widths: fixed and percentage columns first, then the
/// remainder shared by proportional and automatic columns.
pub fn column_widths(columns: &[FoDimension], total: f32) -> Vec<f32> {
    let mut fixed = 0.0f32;
    let mut shares = 0.0f32;
    for column in columns {
        match column {
            FoDimension::Pt(w) => fixed += w,
            FoDimension::Percent(p) => fixed += total * p / 100.0,
            FoDimension::Proportional(n) => shares += n.max(0.0),
            FoDimension::Auto => shares += 1.0,
        }
    }
    let unit = if shares > 0.0 {
        (total - fixed).max(0.0) / shares
    } else {
        0.0
    };
    columns
        .iter()
        .map(|column| match column {
            FoDimension::Pt(w) => *w,
            FoDimension::Percent(p) => total * p / 100.0,
            FoDimension::Proportional(n) => n.max(0.0) * unit,
            FoDimension::Auto => unit,
        })
        .collect()
}

/// Border-box width of an object inside `parent_width`.
fn outer_width(s: &ComputedStyle, parent_width: f32) -> f32 {
    match s.width {
        FoDimension::Pt(w) => w,
        FoDimension::Percent(p) => parent_width * p / 100.0,
        FoDimension::Auto | FoDimension::Proportional(_) => {
            parent_width - s.margin_left - s.margin_right
        }
    }
}

/// Width available to the content of a border box.
fn content_width(s: &ComputedStyle, border_box: f32) -> f32 {
    (border_box - s.padding_left - s.padding_right - 2.0 * s.border_width).max(1.0)
}

/// Style of a paragraph leaf: the block's text properties, no box.
fn text_style(block: &ComputedStyle) -> ComputedStyle {
    ComputedStyle {
        font_size: block.font_size,
        font_weight: block.font_weight,
        font_family: block.font_family.clone(),
        color: block.color,
        text_align: block.text_align,
        line_height: block.line_height,
        text_decoration: block.text_decoration,
        font_style: block.font_style,
        keep_together: block.keep_together,
        ..ComputedStyle::default()
    }
}

pub(crate) fn color_array(c: Color) -> [f32; 4] {
    [c.r, c.g, c.b, c.a]
}

fn no_margin() -> Rect<LengthPercentageAuto> {
    Rect {
        top: LengthPercentageAuto::Length(0.0),
        right: LengthPercentageAuto::Length(0.0),
        bottom: LengthPercentageAuto::Length(0.0),
        left: LengthPercentageAuto::Length(0.0),
    }
}

fn dim_to_taffy(d: FoDimension) -> taffy::Dimension {
    match d {
        FoDimension::Pt(v) => taffy::Dimension::Length(v),
        FoDimension::Percent(v) => taffy::Dimension::Percent(v / 100.0),
        FoDimension::Auto | FoDimension::Proportional(_) => taffy::Dimension::Auto,
    }
}

/// Block-level objects stack their children vertically.
fn box_style(s: &ComputedStyle) -> Style {
    Style {
        display: taffy::Display::Flex,
        flex_direction: taffy::FlexDirection::Column,
        flex_shrink: 0.0,
        size: Size {
            width: dim_to_taffy(s.width),
            height: dim_to_taffy(s.height),
        },
        min_size: Size {
            width: taffy::Dimension::Length(0.0),
            height: taffy::Dimension::Auto,
        },
        margin: Rect {
            top: LengthPercentageAuto::Length(s.margin_top),
            right: LengthPercentageAuto::Length(s.margin_right),
            bottom: LengthPercentageAuto::Length(s.margin_bottom),
            left: LengthPercentageAuto::Length(s.margin_left),
        },
        padding: Rect {
            top: LengthPercentage::Length(s.padding_top),
            right: LengthPercentage::Length(s.padding_right),
            bottom: LengthPercentage::Length(s.padding_bottom),
            left: LengthPercentage::Length(s.padding_left),
        },
        border: Rect {
            top: LengthPercentage::Length(s.border_width),
            right: LengthPercentage::Length(s.border_width),
            bottom: LengthPercentage::Length(s.border_width),
            left: LengthPercentage::Length(s.border_width),
        },
        ..Default::default()
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Compute layout for a styled region of the given width, returning the
/// top-level positioned boxes. Coordinates start at the region's origin.
pub fn compute_layout(
    styled_nodes: &[StyledNode],
    base_style: &ComputedStyle,
    width: f32,
    fonts: &FontManager,
    images: &mut ImageStore,
    source_resolution: f32,
) -> Result<Vec<PositionedBox>, TransformError> {
    let mut builder = LayoutBuilder::new(fonts, images, source_resolution);
    let child_ids = builder.build_children(styled_nodes, base_style, width)?;

    let root_style = Style {
        display: taffy::Display::Flex,
        flex_direction: taffy::FlexDirection::Column,
        size: Size {
            width: taffy::Dimension::Length(width),
            height: taffy::Dimension::Auto,
        },
        ..Default::default()
    };
    let root = builder
        .taffy
        .new_with_children(root_style, &child_ids)
        .map_err(layout_error)?;

    builder
        .taffy
        .compute_layout(
            root,
            Size {
                width: AvailableSpace::Definite(width),
                height: AvailableSpace::MaxContent,
            },
        )
        .map_err(layout_error)?;

    Ok(builder.extract(root, 0.0, 0.0)?.children)
}
