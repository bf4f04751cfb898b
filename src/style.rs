//! Style resolver – maps formatting-object properties to a flat
//! [`ComputedStyle`] struct consumed by the layout engine.
//!
//! Lengths are resolved to points. Text properties inherit down the tree;
//! box properties (margins, padding, borders, backgrounds) do not.

use std::collections::HashMap;

use crate::config::ResolvedSettings;
use crate::fo::{FoKind, FoNode};

/// Fully resolved style for a single formatting object.
#[derive(Debug, Clone)]
pub struct ComputedStyle {
    // Sizing
    pub width: Dimension,
    pub height: Dimension,

    // Spacing (pt)
    pub margin_top: f32,
    pub margin_right: f32,
    pub margin_bottom: f32,
    pub margin_left: f32,
    pub padding_top: f32,
    pub padding_right: f32,
    pub padding_bottom: f32,
    pub padding_left: f32,

    // Border
    pub border_width: f32,
    pub border_color: Color,

    // Typography (inherited)
    pub font_size: f32,
    pub font_weight: FontWeight,
    pub font_family: String,
    pub color: Color,
    pub text_align: TextAlign,
    pub line_height: f32,
    pub text_decoration: TextDecoration,
    pub font_style: FontStyle,

    // Lists (inherited): distance from the label start to the body start.
    pub label_width: f32,

    // Background
    pub background_color: Color,

    // Page break
    pub break_before: bool,
    pub break_after: bool,
    pub keep_together: bool,
}

impl Default for ComputedStyle {
    fn default() -> Self {
        Self {
            width: Dimension::Auto,
            height: Dimension::Auto,
            margin_top: 0.0,
            margin_right: 0.0,
            margin_bottom: 0.0,
            margin_left: 0.0,
            padding_top: 0.0,
            padding_right: 0.0,
            padding_bottom: 0.0,
            padding_left: 0.0,
            border_width: 0.0,
            border_color: Color::BLACK,
            font_size: 12.0,
            font_weight: FontWeight::Normal,
            font_family: "Helvetica".to_string(),
            color: Color::BLACK,
            text_align: TextAlign::Left,
            line_height: 1.2,
            text_decoration: TextDecoration::None,
            font_style: FontStyle::Normal,
            label_width: DEFAULT_LABEL_WIDTH,
            background_color: Color::TRANSPARENT,
            break_before: false,
            break_after: false,
            keep_together: false,
        }
    }
}

/// `provisional-distance-between-starts` when a list does not set one.
pub const DEFAULT_LABEL_WIDTH: f32 = 24.0;

impl ComputedStyle {
    /// The starting style of a page sequence: engine defaults plus the
    /// properties declared on `root` and `page-sequence`.
    pub fn for_sequence(
        settings: &ResolvedSettings,
        inherited: &HashMap<String, String>,
    ) -> Self {
        let mut style = ComputedStyle {
            font_family: settings.font_family.clone(),
            font_size: settings.font_size,
            ..ComputedStyle::default()
        };
        let parent = style.clone();
        apply_properties(&mut style, &parent, inherited, settings.source_resolution);
        // Box properties on the sequence itself are not laid out.
        inherit_text(&style)
    }
}

// ---------------------------------------------------------------------------
// Supporting enums
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontWeight {
    Normal,
    Bold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextAlign {
    Left,
    Center,
    Right,
    Justify,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextDecoration {
    None,
    Underline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontStyle {
    Normal,
    Italic,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Dimension {
    Auto,
    Pt(f32),
    Percent(f32),
    /// `proportional-column-width(n)` – a share of the remaining width.
    Proportional(f32),
}

/// RGBA colour (0.0 – 1.0).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const BLACK: Self = Self::rgb(0.0, 0.0, 0.0);
    pub const WHITE: Self = Self::rgb(1.0, 1.0, 1.0);
    pub const TRANSPARENT: Self = Self {
        r: 0.0,
        g: 0.0,
        b: 0.0,
        a: 0.0,
    };

    const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    pub fn is_transparent(&self) -> bool {
        self.a < 0.001
    }

    /// Channels as 0–255 integers (RTF colour tables).
    pub fn to_rgb8(&self) -> (u8, u8, u8) {
        let c = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        (c(self.r), c(self.g), c(self.b))
    }

    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.trim_start_matches('#');
        if !hex.is_ascii() {
            return None;
        }
        let channel = |s: &str| u8::from_str_radix(s, 16).ok().map(|v| v as f32 / 255.0);
        match hex.len() {
            6 => Some(Self::rgb(
                channel(&hex[0..2])?,
                channel(&hex[2..4])?,
                channel(&hex[4..6])?,
            )),
            3 => Some(Self::rgb(
                channel(&hex[0..1].repeat(2))?,
                channel(&hex[1..2].repeat(2))?,
                channel(&hex[2..3].repeat(2))?,
            )),
            _ => None,
        }
    }

    /// Parse `#rgb`, `#rrggbb`, `rgb(r, g, b)` or a named colour.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.starts_with('#') {
            return Self::from_hex(value);
        }
        if let Some(args) = value
            .strip_prefix("rgb(")
            .and_then(|rest| rest.strip_suffix(')'))
        {
            let parts: Vec<f32> = args
                .split(',')
                .filter_map(|p| p.trim().parse::<f32>().ok())
                .collect();
            if let [r, g, b] = parts[..] {
                return Some(Self::rgb(r / 255.0, g / 255.0, b / 255.0));
            }
            return None;
        }
        let named = match value.to_ascii_lowercase().as_str() {
            "black" => Self::BLACK,
            "white" => Self::WHITE,
            "transparent" => Self::TRANSPARENT,
            "red" => Self::rgb(1.0, 0.0, 0.0),
            "green" => Self::rgb(0.0, 0.502, 0.0),
            "lime" => Self::rgb(0.0, 1.0, 0.0),
            "blue" => Self::rgb(0.0, 0.0, 1.0),
            "navy" => Self::rgb(0.0, 0.0, 0.502),
            "gray" | "grey" => Self::rgb(0.502, 0.502, 0.502),
            "silver" => Self::rgb(0.753, 0.753, 0.753),
            "maroon" => Self::rgb(0.502, 0.0, 0.0),
            "olive" => Self::rgb(0.502, 0.502, 0.0),
            "purple" => Self::rgb(0.502, 0.0, 0.502),
            "teal" => Self::rgb(0.0, 0.502, 0.502),
            "yellow" => Self::rgb(1.0, 1.0, 0.0),
            "orange" => Self::rgb(1.0, 0.647, 0.0),
            "aqua" => Self::rgb(0.0, 1.0, 1.0),
            "fuchsia" => Self::rgb(1.0, 0.0, 1.0),
            _ => return None,
        };
        Some(named)
    }
}

// ---------------------------------------------------------------------------
// Lengths
// ---------------------------------------------------------------------------

/// Resolve a length to points.
///
/// `em` is relative to `font_size`, `px` to `source_resolution` (dots per
/// inch). A bare number is taken as points. Percentages are not lengths.
pub fn parse_length(value: &str, font_size: f32, source_resolution: f32) -> Option<f32> {
    let value = value.trim();
    let split = value
        .find(|c: char| c.is_ascii_alphabetic())
        .unwrap_or(value.len());
    let (number, unit) = value.split_at(split);
    let number: f32 = number.trim().parse().ok()?;
    if !number.is_finite() {
        return None;
    }
    let factor = match unit {
        "" | "pt" => 1.0,
        "px" => 72.0 / source_resolution,
        "mm" => 72.0 / 25.4,
        "cm" => 72.0 / 2.54,
        "in" => 72.0,
        "pc" => 12.0,
        "em" => font_size,
        _ => return None,
    };
    Some(number * factor)
}

/// Parse a sizing value: `auto`, a percentage, a proportional column
/// width, or a length.
pub fn parse_dimension(value: &str, font_size: f32, source_resolution: f32) -> Dimension {
    let value = value.trim();
    if value.is_empty() || value == "auto" {
        return Dimension::Auto;
    }
    if let Some(pct) = value.strip_suffix('%') {
        return pct
            .trim()
            .parse::<f32>()
            .map(Dimension::Percent)
            .unwrap_or(Dimension::Auto);
    }
    if let Some(share) = value
        .strip_prefix("proportional-column-width(")
        .and_then(|rest| rest.strip_suffix(')'))
    {
        return share
            .trim()
            .parse::<f32>()
            .map(Dimension::Proportional)
            .unwrap_or(Dimension::Auto);
    }
    parse_length(value, font_size, source_resolution)
        .map(Dimension::Pt)
        .unwrap_or(Dimension::Auto)
}

// ---------------------------------------------------------------------------
// Style resolution
// ---------------------------------------------------------------------------

/// Resolve the style for an object, inheriting text properties from its parent.
pub fn resolve_style(
    kind: &FoKind,
    attributes: &HashMap<String, String>,
    parent: &ComputedStyle,
    source_resolution: f32,
) -> ComputedStyle {
    let mut style = inherit_text(parent);
    if *kind == FoKind::ListBlock {
        style.label_width = DEFAULT_LABEL_WIDTH;
    }
    apply_properties(&mut style, parent, attributes, source_resolution);
    style
}

/// A fresh style carrying only the inherited text properties of `parent`.
fn inherit_text(parent: &ComputedStyle) -> ComputedStyle {
    ComputedStyle {
        font_size: parent.font_size,
        font_weight: parent.font_weight,
        font_family: parent.font_family.clone(),
        color: parent.color,
        text_align: parent.text_align,
        line_height: parent.line_height,
        text_decoration: parent.text_decoration,
        font_style: parent.font_style,
        label_width: parent.label_width,
        ..ComputedStyle::default()
    }
}

/// Application order: font size first (em lengths depend on it), then
/// shorthands, then longhands, then border style.
fn property_rank(name: &str) -> u8 {
    match name {
        "font-size" => 0,
        "margin" | "padding" | "border" => 1,
        "border-style" => 3,
        _ => 2,
    }
}

fn apply_properties(
    s: &mut ComputedStyle,
    parent: &ComputedStyle,
    attributes: &HashMap<String, String>,
    dpi: f32,
) {
    let mut ordered: Vec<(&String, &String)> = attributes.iter().collect();
    ordered.sort_by(|a, b| {
        property_rank(a.0)
            .cmp(&property_rank(b.0))
            .then_with(|| a.0.cmp(b.0))
    });
    for (prop, val) in ordered {
        apply_fo_property(s, parent, prop, val.trim(), dpi);
    }
}

fn apply_fo_property(s: &mut ComputedStyle, parent: &ComputedStyle, prop: &str, val: &str, dpi: f32) {
    let len = |v: &str, fs: f32| parse_length(v, fs, dpi);
    let fs = s.font_size;
    match prop {
        "font-size" => {
            if let Some(size) = parse_font_size(val, parent.font_size, dpi) {
                s.font_size = size;
            }
        }
        "font-family" => {
            // First family of a fallback list.
            if let Some(first) = val.split(',').next() {
                let family = first.trim().trim_matches(|c| c == '"' || c == '\'');
                if !family.is_empty() {
                    s.font_family = family.to_string();
                }
            }
        }
        "font-weight" => {
            s.font_weight = match val {
                "bold" | "bolder" | "600" | "700" | "800" | "900" => FontWeight::Bold,
                _ => FontWeight::Normal,
            }
        }
        "font-style" => {
            s.font_style = match val {
                "italic" | "oblique" => FontStyle::Italic,
                _ => FontStyle::Normal,
            }
        }
        "color" => {
            if let Some(c) = Color::parse(val) {
                s.color = c;
            }
        }
        "background-color" => {
            if let Some(c) = Color::parse(val) {
                s.background_color = c;
            }
        }
        "text-align" => {
            s.text_align = match val {
                "center" => TextAlign::Center,
                "right" | "end" => TextAlign::Right,
                "justify" => TextAlign::Justify,
                _ => TextAlign::Left,
            }
        }
        "text-decoration" => {
            s.text_decoration = if val.contains("underline") {
                TextDecoration::Underline
            } else {
                TextDecoration::None
            }
        }
        "line-height" => {
            if val == "normal" {
                s.line_height = 1.2;
            } else if let Ok(v) = val.parse::<f32>() {
                s.line_height = v;
            } else if let Some(pct) = val.strip_suffix('%').and_then(|p| p.parse::<f32>().ok()) {
                s.line_height = pct / 100.0;
            } else if let Some(pt) = len(val, fs) {
                s.line_height = pt / fs;
            }
        }
        "width" => s.width = parse_dimension(val, fs, dpi),
        "height" => s.height = parse_dimension(val, fs, dpi),
        "margin" => apply_shorthand_spacing(
            val,
            fs,
            dpi,
            [
                &mut s.margin_top,
                &mut s.margin_right,
                &mut s.margin_bottom,
                &mut s.margin_left,
            ],
        ),
        "margin-top" | "space-before" | "space-before.optimum" => set(&mut s.margin_top, len(val, fs)),
        "margin-bottom" | "space-after" | "space-after.optimum" => set(&mut s.margin_bottom, len(val, fs)),
        "margin-left" | "start-indent" => set(&mut s.margin_left, len(val, fs)),
        "margin-right" | "end-indent" => set(&mut s.margin_right, len(val, fs)),
        "padding" => apply_shorthand_spacing(
            val,
            fs,
            dpi,
            [
                &mut s.padding_top,
                &mut s.padding_right,
                &mut s.padding_bottom,
                &mut s.padding_left,
            ],
        ),
        "padding-top" | "padding-before" => set(&mut s.padding_top, len(val, fs)),
        "padding-bottom" | "padding-after" => set(&mut s.padding_bottom, len(val, fs)),
        "padding-left" | "padding-start" => set(&mut s.padding_left, len(val, fs)),
        "padding-right" | "padding-end" => set(&mut s.padding_right, len(val, fs)),
        "border" => {
            for token in val.split_whitespace() {
                if token == "none" || token == "hidden" {
                    s.border_width = 0.0;
                } else if let Some(w) = len(token, fs) {
                    s.border_width = w;
                } else if let Some(c) = Color::parse(token) {
                    s.border_color = c;
                } else if s.border_width == 0.0 {
                    // A style keyword alone gives a medium border.
                    s.border_width = 1.0;
                }
            }
        }
        "border-width" => set(&mut s.border_width, border_width(val, fs, dpi)),
        "border-color" => {
            if let Some(c) = Color::parse(val) {
                s.border_color = c;
            }
        }
        "border-style" => {
            if val == "none" || val == "hidden" {
                s.border_width = 0.0;
            } else if s.border_width == 0.0 {
                s.border_width = 1.0;
            }
        }
        "provisional-distance-between-starts" => set(&mut s.label_width, len(val, fs)),
        "break-before" | "page-break-before" => s.break_before = is_page_break(val),
        "break-after" | "page-break-after" => s.break_after = is_page_break(val),
        "keep-together" | "keep-together.within-page" | "page-break-inside" => {
            s.keep_together = val == "always" || val == "avoid" || val.parse::<u32>().is_ok()
        }
        _ => {}
    }
}

fn set(target: &mut f32, value: Option<f32>) {
    if let Some(v) = value {
        *target = v;
    }
}

fn is_page_break(val: &str) -> bool {
    matches!(val, "page" | "always" | "even-page" | "odd-page")
}

fn border_width(val: &str, fs: f32, dpi: f32) -> Option<f32> {
    match val {
        "thin" => Some(0.5),
        "medium" => Some(1.0),
        "thick" => Some(2.0),
        other => parse_length(other, fs, dpi),
    }
}

/// Absolute, relative and percentage font sizes.
fn parse_font_size(val: &str, parent_size: f32, dpi: f32) -> Option<f32> {
    let keyword = match val {
        "xx-small" => Some(7.0),
        "x-small" => Some(8.0),
        "small" => Some(10.0),
        "medium" => Some(12.0),
        "large" => Some(14.0),
        "x-large" => Some(18.0),
        "xx-large" => Some(24.0),
        "smaller" => Some(parent_size / 1.2),
        "larger" => Some(parent_size * 1.2),
        _ => None,
    };
    if keyword.is_some() {
        return keyword;
    }
    if let Some(pct) = val.strip_suffix('%') {
        return pct.trim().parse::<f32>().ok().map(|p| parent_size * p / 100.0);
    }
    parse_length(val, parent_size, dpi).filter(|size| *size > 0.0)
}

/// One to four lengths in top/right/bottom/left order.
fn apply_shorthand_spacing(val: &str, fs: f32, dpi: f32, sides: [&mut f32; 4]) {
    let parts: Vec<f32> = val
        .split_whitespace()
        .filter_map(|p| parse_length(p, fs, dpi))
        .collect();
    let [top, right, bottom, left] = sides;
    let (t, r, b, l) = match parts[..] {
        [all] => (all, all, all, all),
        [vertical, horizontal] => (vertical, horizontal, vertical, horizontal),
        [t, horizontal, b] => (t, horizontal, b, horizontal),
        [t, r, b, l] => (t, r, b, l),
        _ => return,
    };
    *top = t;
    *right = r;
    *bottom = b;
    *left = l;
}

// ---------------------------------------------------------------------------
// Styled FO tree
// ---------------------------------------------------------------------------

/// A formatting object annotated with its computed style.
#[derive(Debug, Clone)]
pub enum StyledNode {
    Element {
        kind: FoKind,
        style: ComputedStyle,
        children: Vec<StyledNode>,
        /// Original properties (graphic sources, column widths, etc.)
        attrs: HashMap<String, String>,
    },
    Text {
        text: String,
        style: ComputedStyle,
    },
}

/// Build a styled tree from FO nodes, resolving styles top-down.
pub fn build_styled_tree(
    nodes: &[FoNode],
    parent_style: &ComputedStyle,
    source_resolution: f32,
) -> Vec<StyledNode> {
    let mut result = Vec::new();
    for node in nodes {
        match node {
            FoNode::Element(e) => {
                let style = resolve_style(&e.kind, &e.attributes, parent_style, source_resolution);
                let children = build_styled_tree(&e.children, &style, source_resolution);
                result.push(StyledNode::Element {
                    kind: e.kind.clone(),
                    style,
                    children,
                    attrs: e.attributes.clone(),
                });
            }
            FoNode::Text(text) => {
                // Indentation between objects carries a line break; drop it.
                if text.trim().is_empty() && text.contains('\n') {
                    continue;
                }
                if text.is_empty() {
                    continue;
                }
                // Text renders inline: only the inherited properties apply.
                result.push(StyledNode::Text {
                    text: text.clone(),
                    style: inherit_text(parent_style),
                });
            }
        }
    }
    result
}
