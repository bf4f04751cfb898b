//! Area tree – the frozen representation between pagination and output.
//! Encodes exactly what goes on each page, in points, origin at the page's
//! top-left corner.

use serde::{Deserialize, Serialize};

/// A complete paginated document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AreaTree {
    /// Document title embedded in output metadata.
    #[serde(default)]
    pub title: String,
    pub pages: Vec<PageArea>,
}

/// One page of content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageArea {
    /// 1-based page number across the whole document.
    pub number: usize,
    pub width: f32,
    pub height: f32,
    pub boxes: Vec<AreaBox>,
}

/// A positioned rectangle with optional content.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AreaBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,

    pub background_color: Option<[f32; 4]>,
    pub border: Option<BorderArea>,

    pub text: Option<TextArea>,
    pub image: Option<ImageArea>,

    pub children: Vec<AreaBox>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BorderArea {
    pub width: f32,
    pub color: [f32; 4],
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TextArea {
    pub lines: Vec<LineArea>,
}

/// One laid-out line; offsets are relative to the owning box.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineArea {
    pub x_offset: f32,
    pub y_offset: f32,
    pub width: f32,
    pub height: f32,
    /// Distance from the top of the line to the baseline.
    pub baseline: f32,
    pub spans: Vec<SpanArea>,
}

/// A run of text in a single font; `x_offset` is relative to the line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpanArea {
    pub text: String,
    pub x_offset: f32,
    pub width: f32,
    pub font_family: String,
    pub bold: bool,
    pub italic: bool,
    pub font_size: f32,
    pub color: [f32; 4],
    pub underline: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageArea {
    /// The graphic's `src` as written in the markup.
    pub src: String,
    pub width: f32,
    pub height: f32,
}

impl AreaTree {
    /// Serialise to pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// All text on page `index`, lines joined by newlines.
    pub fn page_text(&self, index: usize) -> String {
        let mut out = Vec::new();
        if let Some(page) = self.pages.get(index) {
            for b in &page.boxes {
                b.collect_text(&mut out);
            }
        }
        out.join("\n")
    }
}

impl AreaBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            ..Self::default()
        }
    }

    /// Shift this box and all descendants.
    pub fn translate(&mut self, dx: f32, dy: f32) {
        self.x += dx;
        self.y += dy;
        for child in &mut self.children {
            child.translate(dx, dy);
        }
    }

    /// Apply `f` to every span in this subtree.
    pub fn for_each_span_mut(&mut self, f: &mut dyn FnMut(&mut SpanArea)) {
        if let Some(text) = &mut self.text {
            for line in &mut text.lines {
                for span in &mut line.spans {
                    f(span);
                }
            }
        }
        for child in &mut self.children {
            child.for_each_span_mut(f);
        }
    }

    fn collect_text(&self, out: &mut Vec<String>) {
        if let Some(text) = &self.text {
            for line in &text.lines {
                out.push(line.spans.iter().map(|s| s.text.as_str()).collect());
            }
        }
        for child in &self.children {
            child.collect_text(out);
        }
    }
}
