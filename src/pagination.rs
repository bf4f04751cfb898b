//! Pagination – splits laid-out flow boxes into pages.
//!
//! Handles:
//! - Page boundaries of each sequence's page master
//! - `break-before` / `break-after` and `keep-together`
//! - Splitting tables between rows and paragraphs between lines
//! - Static `region-before` / `region-after` content repeated on every page

use crate::area_tree::{AreaBox, AreaTree, BorderArea, ImageArea, LineArea, PageArea, TextArea};
use crate::config::ResolvedSettings;
use crate::error::TransformError;
use crate::fo::{FoDocument, PageGeometry, PageSequence};
use crate::fonts::{FontManager, PAGE_NUMBER_MARK};
use crate::layout::{color_array, compute_layout, BoxContent, PositionedBox};
use crate::resources::ImageStore;
use crate::style::{build_styled_tree, ComputedStyle};

/// Tolerance for float rounding at the bottom of a page.
const EPSILON: f32 = 0.01;

/// Lay out and paginate every page sequence of a document.
pub fn lay_out_document(
    doc: &FoDocument,
    settings: &ResolvedSettings,
    fonts: &FontManager,
    images: &mut ImageStore,
    title: &str,
) -> Result<AreaTree, TransformError> {
    let mut tree = AreaTree {
        title: title.to_string(),
        pages: Vec::new(),
    };
    for sequence in &doc.sequences {
        let geometry = match doc.master_for(sequence) {
            Some(master) => PageGeometry::from_master(master, settings),
            None => {
                log::warn!("No simple-page-master declared; using engine page defaults.");
                PageGeometry::from_settings(settings)
            }
        };
        let pages = lay_out_sequence(sequence, &geometry, settings, fonts, images, tree.pages.len() + 1)?;
        tree.pages.extend(pages);
    }
    Ok(tree)
}

fn lay_out_sequence(
    sequence: &PageSequence,
    geometry: &PageGeometry,
    settings: &ResolvedSettings,
    fonts: &FontManager,
    images: &mut ImageStore,
    first_number: usize,
) -> Result<Vec<PageArea>, TransformError> {
    let dpi = settings.source_resolution;
    let base = ComputedStyle::for_sequence(settings, &sequence.inherited);

    let flow_nodes = build_styled_tree(&sequence.flow, &base, dpi);
    let flow = compute_layout(&flow_nodes, &base, geometry.body.width, fonts, images, dpi)?;

    let mut statics = Vec::new();
    for (region, content, name) in [
        (geometry.before, &sequence.before, "xsl-region-before"),
        (geometry.after, &sequence.after, "xsl-region-after"),
    ] {
        if content.is_empty() {
            continue;
        }
        let Some(rect) = region else {
            log::warn!("static-content for {name} has no matching region; dropped.");
            continue;
        };
        let nodes = build_styled_tree(content, &base, dpi);
        for b in compute_layout(&nodes, &base, rect.width, fonts, images, dpi)? {
            let mut area = area_from(&b);
            area.translate(rect.x, rect.y);
            statics.push(area);
        }
    }

    Ok(paginate(&flow, &statics, geometry, first_number))
}

/// Place flow boxes onto pages of `geometry`, numbering from `first_number`.
pub fn paginate(
    flow: &[PositionedBox],
    statics: &[AreaBox],
    geometry: &PageGeometry,
    first_number: usize,
) -> Vec<PageArea> {
    let mut paginator = Paginator {
        geometry,
        pages: Vec::new(),
        current: Vec::new(),
        page_top: 0.0,
    };
    for pbox in flow {
        paginator.place(pbox);
    }
    let mut pages = paginator.pages;
    if !paginator.current.is_empty() || pages.is_empty() {
        pages.push(paginator.current);
    }

    pages
        .into_iter()
        .enumerate()
        .map(|(index, flow_boxes)| {
            let number = first_number + index;
            let label = number.to_string();
            let mut boxes: Vec<AreaBox> = statics.to_vec();
            boxes.extend(flow_boxes);
            for b in &mut boxes {
                b.for_each_span_mut(&mut |span| {
                    if span.text.contains(PAGE_NUMBER_MARK) {
                        span.text = span.text.replace(PAGE_NUMBER_MARK, &label);
                    }
                });
            }
            PageArea {
                number,
                width: geometry.width,
                height: geometry.height,
                boxes,
            }
        })
        .collect()
}

struct Paginator<'a> {
    geometry: &'a PageGeometry,
    pages: Vec<Vec<AreaBox>>,
    current: Vec<AreaBox>,
    /// Flow y at which the current page begins.
    page_top: f32,
}

impl Paginator<'_> {
    fn body_height(&self) -> f32 {
        self.geometry.body.height
    }

    fn new_page(&mut self, flow_y: f32) {
        self.pages.push(std::mem::take(&mut self.current));
        self.page_top = flow_y;
    }

    fn place(&mut self, pbox: &PositionedBox) {
        if pbox.style.break_before && !self.current.is_empty() {
            self.new_page(pbox.y);
        }

        let overflows = pbox.y + pbox.height - self.page_top > self.body_height() + EPSILON;
        let is_container = matches!(pbox.content, BoxContent::None) && !pbox.children.is_empty();
        if pbox.splittable && is_container && (overflows || has_nested_break(pbox)) {
            for child in &pbox.children {
                self.place(child);
            }
            if pbox.style.break_after {
                self.new_page(pbox.y + pbox.height);
            }
            return;
        }

        if overflows {
            if let BoxContent::Text { lines } = &pbox.content {
                if pbox.splittable && lines.len() > 1 {
                    self.place_lines(pbox, lines);
                    return;
                }
            }
            if !self.current.is_empty() {
                self.new_page(pbox.y);
            }
        }

        let area = self.to_page(pbox);
        self.current.push(area);

        if pbox.style.break_after {
            self.new_page(pbox.y + pbox.height);
        }
    }

    /// Place a paragraph line by line, breaking pages between lines.
    fn place_lines(&mut self, pbox: &PositionedBox, lines: &[LineArea]) {
        let mut chunk: Vec<LineArea> = Vec::new();
        let mut chunk_top = pbox.y;
        for line in lines {
            let line_y = pbox.y + line.y_offset;
            let overflows = line_y + line.height - self.page_top > self.body_height() + EPSILON;
            if overflows && (!chunk.is_empty() || !self.current.is_empty()) {
                self.flush_lines(pbox, &mut chunk, chunk_top);
                self.new_page(line_y);
            }
            if chunk.is_empty() {
                chunk_top = line_y;
            }
            chunk.push(line.clone());
        }
        self.flush_lines(pbox, &mut chunk, chunk_top);
    }

    fn flush_lines(&mut self, pbox: &PositionedBox, chunk: &mut Vec<LineArea>, chunk_top: f32) {
        if chunk.is_empty() {
            return;
        }
        let shift = chunk_top - pbox.y;
        let mut lines = std::mem::take(chunk);
        for line in &mut lines {
            line.y_offset -= shift;
        }
        let height = lines.iter().map(|l| l.height).sum();
        let mut area = AreaBox::new(pbox.x, chunk_top, pbox.width, height);
        area.text = Some(TextArea { lines });
        area.translate(self.geometry.body.x, self.geometry.body.y - self.page_top);
        self.current.push(area);
    }

    fn to_page(&self, pbox: &PositionedBox) -> AreaBox {
        let mut area = area_from(pbox);
        area.translate(self.geometry.body.x, self.geometry.body.y - self.page_top);
        area
    }
}

fn has_nested_break(pbox: &PositionedBox) -> bool {
    pbox.children
        .iter()
        .any(|c| c.style.break_before || c.style.break_after || has_nested_break(c))
}

/// Convert a positioned box tree into areas, keeping flow coordinates.
fn area_from(pbox: &PositionedBox) -> AreaBox {
    let mut area = AreaBox::new(pbox.x, pbox.y, pbox.width, pbox.height);

    if !pbox.style.background_color.is_transparent() {
        area.background_color = Some(color_array(pbox.style.background_color));
    }
    if pbox.style.border_width > 0.0 {
        area.border = Some(BorderArea {
            width: pbox.style.border_width,
            color: color_array(pbox.style.border_color),
        });
    }

    match &pbox.content {
        BoxContent::Text { lines } => {
            area.text = Some(TextArea {
                lines: lines.clone(),
            });
        }
        BoxContent::Image { src } => {
            area.image = Some(ImageArea {
                src: src.clone(),
                width: pbox.width,
                height: pbox.height,
            });
        }
        BoxContent::None => {}
    }

    area.children = pbox.children.iter().map(area_from).collect();
    area
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineSettings;
    use crate::fo::FoTreeBuilder;
    use crate::resources::ResourceResolver;
    use crate::transform::transform;

    fn document(statics: &str, flow: &str) -> AreaTree {
        let markup = format!(
            r#"<fo:root xmlns:fo="http://www.w3.org/1999/XSL/Format">
  <fo:layout-master-set>
    <fo:simple-page-master master-name="A5" page-width="148mm" page-height="210mm" margin="10mm">
      <fo:region-body margin-bottom="12mm"/>
      <fo:region-after extent="10mm"/>
    </fo:simple-page-master>
  </fo:layout-master-set>
  <fo:page-sequence master-reference="A5">{statics}<fo:flow flow-name="xsl-region-body">{flow}</fo:flow></fo:page-sequence>
</fo:root>"#
        );
        let mut builder = FoTreeBuilder::new();
        transform(&markup, &mut builder).unwrap();
        let doc = builder.finish().unwrap();
        let settings = EngineSettings::default().resolve().unwrap();
        let fonts = FontManager::default();
        let mut images = ImageStore::new(ResourceResolver::new("."));
        lay_out_document(&doc, &settings, &fonts, &mut images, "Test").unwrap()
    }

    #[test]
    fn single_page() {
        let tree = document("", "<fo:block>Short text</fo:block>");
        assert_eq!(tree.pages.len(), 1);
        assert_eq!(tree.page_text(0), "Short text");
        assert_eq!(tree.title, "Test");
    }

    #[test]
    fn empty_flow_still_yields_a_page() {
        let tree = document("", "");
        assert_eq!(tree.pages.len(), 1);
    }

    #[test]
    fn multiple_pages() {
        let flow: String = (0..80)
            .map(|i| format!("<fo:block>Paragraph {i} with some text</fo:block>"))
            .collect();
        let tree = document("", &flow);
        assert!(tree.pages.len() > 1, "Expected multiple pages, got {}", tree.pages.len());
        for page in &tree.pages {
            for b in &page.boxes {
                assert!(b.y + b.height <= page.height, "box leaks off the page");
            }
        }
    }

    #[test]
    fn forced_breaks() {
        let tree = document(
            "",
            r#"<fo:block>One</fo:block><fo:block break-before="page">Two</fo:block><fo:block break-after="page">Three</fo:block><fo:block>Four</fo:block>"#,
        );
        assert_eq!(tree.pages.len(), 3);
        assert_eq!(tree.page_text(0), "One");
        assert_eq!(tree.page_text(1), "Two\nThree");
        assert_eq!(tree.page_text(2), "Four");
    }

    #[test]
    fn nested_break_inside_container() {
        let tree = document(
            "",
            r#"<fo:block><fo:block>A</fo:block><fo:block break-before="page">B</fo:block></fo:block>"#,
        );
        assert_eq!(tree.pages.len(), 2);
    }

    #[test]
    fn long_paragraph_splits_between_lines() {
        let words = "lorem ipsum dolor sit amet ".repeat(400);
        let tree = document("", &format!("<fo:block>{words}</fo:block>"));
        assert!(tree.pages.len() > 1);
    }

    #[test]
    fn table_rows_move_to_next_page() {
        let rows: String = (0..60)
            .map(|i| {
                format!(
                    "<fo:table-row><fo:table-cell><fo:block>Row {i}</fo:block></fo:table-cell></fo:table-row>"
                )
            })
            .collect();
        let tree = document(
            "",
            &format!("<fo:table><fo:table-body>{rows}</fo:table-body></fo:table>"),
        );
        assert!(tree.pages.len() > 1);
        let all: String = (0..tree.pages.len()).map(|i| tree.page_text(i)).collect::<Vec<_>>().join("\n");
        assert!(all.contains("Row 0") && all.contains("Row 59"));
    }

    #[test]
    fn footer_repeats_with_page_numbers() {
        let tree = document(
            r#"<fo:static-content flow-name="xsl-region-after"><fo:block>Page <fo:page-number/></fo:block></fo:static-content>"#,
            r#"<fo:block>One</fo:block><fo:block break-before="page">Two</fo:block>"#,
        );
        assert_eq!(tree.pages.len(), 2);
        assert!(tree.page_text(0).contains("Page 1"));
        assert!(tree.page_text(1).contains("Page 2"));
        let footer = &tree.pages[1].boxes[0];
        assert!(footer.y > tree.pages[1].height / 2.0);
    }
}
