//! Font loading and text measurement using `ttf-parser`.
//!
//! Fonts listed in the engine configuration are loaded once, when the engine
//! is built, and embedded by the PDF backend. Any other family falls back to
//! the standard Helvetica family with heuristic metrics.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::config::FontSettings;
use crate::error::ConfigError;
use crate::style::Color;

/// Placeholder for the current page number inside laid-out text; replaced
/// once pages are known.
pub const PAGE_NUMBER_MARK: char = '\u{E000}';

/// Family name of the standard font used when nothing else matches.
pub const BUILTIN_FAMILY: &str = "Helvetica";

/// Helvetica advance widths (1/1000 em) for U+0020..=U+007E.
#[rustfmt::skip]
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556,
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556,
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556,
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584,
];

/// Helvetica-Bold advance widths (1/1000 em) for U+0020..=U+007E.
#[rustfmt::skip]
const HELVETICA_BOLD_WIDTHS: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 333, 333, 584, 584, 584, 611,
    975, 722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 333, 278, 333, 584, 556,
    333, 556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889, 611, 611,
    611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500, 389, 280, 389, 584,
];

/// Advance of `ch` in the builtin family, in 1/1000 em. Oblique faces share
/// the upright widths.
fn builtin_advance(ch: char, bold: bool) -> u16 {
    let table = if bold { &HELVETICA_BOLD_WIDTHS } else { &HELVETICA_WIDTHS };
    match ch {
        ' '..='~' => table[ch as usize - 0x20],
        '\u{A0}' => table[0],
        _ => 556,
    }
}

/// A loaded font face with metrics.
#[derive(Clone)]
pub struct FontData {
    /// Raw font bytes; empty for the builtin family.
    pub bytes: Vec<u8>,
    pub units_per_em: f32,
    pub ascender: f32,
    pub descender: f32,
    pub line_gap: f32,
}

impl FontData {
    fn builtin() -> Self {
        Self {
            bytes: Vec::new(),
            units_per_em: 1000.0,
            ascender: 750.0,
            descender: -250.0,
            line_gap: 0.0,
        }
    }
}

impl std::fmt::Debug for FontData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontData")
            .field("bytes", &self.bytes.len())
            .field("units_per_em", &self.units_per_em)
            .finish()
    }
}

#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct FontKey {
    pub family: String,
    pub bold: bool,
    pub italic: bool,
}

impl FontKey {
    pub fn new(family: &str, bold: bool, italic: bool) -> Self {
        Self {
            family: family.to_string(),
            bold,
            italic,
        }
    }

    pub fn is_builtin(&self) -> bool {
        self.family == BUILTIN_FAMILY
    }
}

/// Registry of loaded fonts.
#[derive(Debug)]
pub struct FontManager {
    fonts: HashMap<FontKey, FontData>,
    builtin: FontData,
}

impl FontManager {
    /// A registry with only the builtin family.
    pub fn new() -> Self {
        Self {
            fonts: HashMap::new(),
            builtin: FontData::builtin(),
        }
    }

    /// Load every configured font; paths resolve against `base`.
    pub fn from_settings(settings: &[FontSettings], base: &Path) -> Result<Self, ConfigError> {
        let mut manager = Self::new();
        for font in settings {
            let path = base.join(&font.path);
            let bytes = fs::read(&path).map_err(|e| ConfigError::Font {
                path: path.clone(),
                reason: e.to_string(),
            })?;
            manager
                .load_font(&font.family, font.is_bold()?, font.is_italic()?, bytes)
                .map_err(|e| ConfigError::Font {
                    path: path.clone(),
                    reason: e.to_string(),
                })?;
            log::debug!("Loaded font |{}| from {}.", font.family, path.display());
        }
        Ok(manager)
    }

    /// Load a TTF/OTF font from bytes.
    pub fn load_font(
        &mut self,
        family: &str,
        bold: bool,
        italic: bool,
        bytes: Vec<u8>,
    ) -> Result<(), ttf_parser::FaceParsingError> {
        let face = ttf_parser::Face::parse(&bytes, 0)?;
        let data = FontData {
            units_per_em: face.units_per_em() as f32,
            ascender: face.ascender() as f32,
            descender: face.descender() as f32,
            line_gap: face.line_gap() as f32,
            bytes,
        };
        self.fonts.insert(FontKey::new(family, bold, italic), data);
        Ok(())
    }

    /// The face actually used for a request: the exact face, else the
    /// family's regular face, else the builtin family.
    pub fn resolve(&self, family: &str, bold: bool, italic: bool) -> FontKey {
        let exact = FontKey::new(family, bold, italic);
        if self.fonts.contains_key(&exact) {
            return exact;
        }
        let regular = FontKey::new(family, false, false);
        if self.fonts.contains_key(&regular) {
            return regular;
        }
        FontKey::new(BUILTIN_FAMILY, bold, italic)
    }

    fn data(&self, key: &FontKey) -> &FontData {
        self.fonts.get(key).unwrap_or(&self.builtin)
    }

    /// Measure the width of a string at a given font size (in pt).
    /// With real font bytes we sum glyph advances; the builtin family uses
    /// the standard Helvetica metrics.
    pub fn measure_text_width(&self, text: &str, font_size: f32, key: &FontKey) -> f32 {
        // The page number placeholder is measured as two digits.
        let chars = || {
            text.chars().flat_map(|c| {
                let n = if c == PAGE_NUMBER_MARK { 2 } else { 1 };
                std::iter::repeat(if c == PAGE_NUMBER_MARK { '0' } else { c }).take(n)
            })
        };
        let data = self.data(key);

        if data.bytes.is_empty() {
            let units: u32 = chars().map(|ch| builtin_advance(ch, key.bold) as u32).sum();
            return units as f32 * font_size / 1000.0;
        }

        match ttf_parser::Face::parse(&data.bytes, 0) {
            Ok(face) => {
                let scale = font_size / data.units_per_em;
                chars()
                    .map(|ch| {
                        face.glyph_index(ch)
                            .and_then(|gid| face.glyph_hor_advance(gid))
                            .map(|advance| advance as f32 * scale)
                            .unwrap_or(font_size * 0.5)
                    })
                    .sum()
            }
            Err(_) => chars().count() as f32 * font_size * 0.5,
        }
    }

    /// The ascender in pt for the given face.
    pub fn ascender(&self, font_size: f32, key: &FontKey) -> f32 {
        let data = self.data(key);
        data.ascender * font_size / data.units_per_em
    }

    /// Loaded (embeddable) faces, in a stable order.
    pub fn keys(&self) -> Vec<FontKey> {
        let mut keys: Vec<FontKey> = self.fonts.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Font bytes for embedding.
    pub fn font_bytes(&self, key: &FontKey) -> Option<&[u8]> {
        self.fonts
            .get(key)
            .map(|d| d.bytes.as_slice())
            .filter(|b| !b.is_empty())
    }
}

impl Default for FontManager {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Line breaking
// ---------------------------------------------------------------------------

/// A styled stretch of inline text.
#[derive(Debug, Clone)]
pub struct TextRun {
    pub text: String,
    pub font: FontKey,
    pub font_size: f32,
    pub color: Color,
    pub underline: bool,
}

/// Part of a wrapped line taken from a single run.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub run: usize,
    pub text: String,
    pub width: f32,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct WrappedLine {
    pub segments: Vec<Segment>,
    pub width: f32,
}

struct Word {
    run: usize,
    text: String,
    space_before: bool,
}

/// Word-wrap styled runs to fit within `max_width` points.
///
/// White space collapses to single spaces. A word wider than the line is
/// placed on a line of its own; runs joined without a space never split.
pub fn wrap_text(runs: &[TextRun], max_width: f32, fonts: &FontManager) -> Vec<WrappedLine> {
    let mut words: Vec<Word> = Vec::new();
    let mut pending_space = false;
    for (index, run) in runs.iter().enumerate() {
        // A run boundary ends the current word without adding a space.
        let mut in_word = false;
        for ch in run.text.chars() {
            if ch.is_whitespace() {
                in_word = false;
                pending_space = true;
            } else if in_word {
                if let Some(last) = words.last_mut() {
                    last.text.push(ch);
                }
            } else {
                words.push(Word {
                    run: index,
                    text: ch.to_string(),
                    space_before: pending_space,
                });
                pending_space = false;
                in_word = true;
            }
        }
    }

    let mut lines: Vec<WrappedLine> = Vec::new();
    let mut line = WrappedLine::default();
    for word in words {
        let run = &runs[word.run];
        let word_width = fonts.measure_text_width(&word.text, run.font_size, &run.font);
        let space_width = if word.space_before && !line.segments.is_empty() {
            fonts.measure_text_width(" ", run.font_size, &run.font)
        } else {
            0.0
        };
        let breakable = word.space_before || line.segments.is_empty();
        if breakable
            && !line.segments.is_empty()
            && max_width > 0.0
            && line.width + space_width + word_width > max_width
        {
            lines.push(std::mem::take(&mut line));
        }

        let leading = if word.space_before && !line.segments.is_empty() {
            " "
        } else {
            ""
        };
        let width = fonts.measure_text_width(leading, run.font_size, &run.font) + word_width;
        match line.segments.last_mut() {
            Some(last) if last.run == word.run => {
                last.text.push_str(leading);
                last.text.push_str(&word.text);
                last.width += width;
            }
            _ => line.segments.push(Segment {
                run: word.run,
                text: format!("{leading}{}", word.text),
                width,
            }),
        }
        line.width += width;
    }
    if !line.segments.is_empty() {
        lines.push(line);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(text: &str, bold: bool) -> TextRun {
        TextRun {
            text: text.to_string(),
            font: FontKey::new(BUILTIN_FAMILY, bold, false),
            font_size: 16.0,
            color: Color::BLACK,
            underline: false,
        }
    }

    fn line_text(line: &WrappedLine) -> String {
        line.segments.iter().map(|s| s.text.as_str()).collect()
    }

    #[test]
    fn builtin_text_width() {
        let mgr = FontManager::default();
        let key = mgr.resolve("Helvetica", false, false);
        let w = mgr.measure_text_width("Hello", 16.0, &key);
        // (722 + 556 + 222 + 222 + 556) / 1000 × 16
        assert!((w - 36.448).abs() < 0.01, "width was {w}");
    }

    #[test]
    fn builtin_wide_glyphs_measure_wide() {
        let mgr = FontManager::default();
        let regular = mgr.resolve("Helvetica", false, false);
        let bold = mgr.resolve("Helvetica", true, false);
        let r = mgr.measure_text_width("R", 10.0, &regular);
        assert!((r - 7.22).abs() < 0.01, "R was {r}");
        let ws = mgr.measure_text_width(&"W".repeat(70), 10.0, &regular);
        assert!((ws - 660.8).abs() < 0.1, "W run was {ws}");
        let i = mgr.measure_text_width("i", 10.0, &regular);
        assert!(i < r / 3.0);
        assert!(mgr.measure_text_width("bold", 10.0, &bold) > mgr.measure_text_width("bold", 10.0, &regular));
    }

    #[test]
    fn wide_run_wraps_inside_the_line() {
        let mgr = FontManager::default();
        let text = vec!["WWWWW"; 20].join(" ");
        let lines = wrap_text(&[run(&text, false)], 300.0, &mgr);
        for line in &lines {
            assert!(line.width <= 300.0 + 0.01, "line overflowed: {}", line.width);
        }
        assert!(lines.len() >= 5);
    }

    #[test]
    fn unknown_family_falls_back_to_builtin() {
        let mgr = FontManager::default();
        let key = mgr.resolve("Garamond", true, false);
        assert!(key.is_builtin());
        assert!(key.bold);
        assert!(mgr.font_bytes(&key).is_none());
    }

    #[test]
    fn page_number_mark_measures_as_two_digits() {
        let mgr = FontManager::default();
        let key = mgr.resolve("Helvetica", false, false);
        let mark = mgr.measure_text_width(&PAGE_NUMBER_MARK.to_string(), 10.0, &key);
        assert!((mark - 11.12).abs() < 0.01);
    }

    #[test]
    fn word_wrap_basic() {
        let mgr = FontManager::default();
        let lines = wrap_text(&[run("Hello world foo bar", false)], 60.0, &mgr);
        assert!(lines.len() >= 2, "Expected wrapping, got {:?}", lines);
        assert_eq!(line_text(&lines[0]), "Hello");
    }

    #[test]
    fn whitespace_collapses_across_runs() {
        let mgr = FontManager::default();
        let lines = wrap_text(
            &[run("  Dear \n  ", false), run("John", true), run(" Doe ", false)],
            1000.0,
            &mgr,
        );
        assert_eq!(lines.len(), 1);
        assert_eq!(line_text(&lines[0]), "Dear John Doe");
        assert_eq!(lines[0].segments.len(), 3);
        assert_eq!(lines[0].segments[1].run, 1);
    }

    #[test]
    fn glued_runs_do_not_split() {
        let mgr = FontManager::default();
        let lines = wrap_text(&[run("ab", false), run("cd", true)], 20.0, &mgr);
        assert_eq!(lines.len(), 1);
        assert_eq!(line_text(&lines[0]), "abcd");
    }

    #[test]
    fn missing_font_file_is_a_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let settings = vec![FontSettings {
            family: "Body".into(),
            weight: "normal".into(),
            style: "normal".into(),
            path: "missing.ttf".into(),
        }];
        let err = FontManager::from_settings(&settings, dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Font { .. }));
    }
}
