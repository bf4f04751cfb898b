//! Formatting-object tree – the in-memory form of a layout markup document.
//!
//! We support a controlled subset of XSL-FO:
//! - Page setup: root, layout-master-set, simple-page-master, region-*
//! - Content: page-sequence, flow, static-content
//! - Blocks: block, block-container, table*, list-*
//! - Inline: inline, basic-link, page-number, external-graphic
//!
//! Unknown objects are kept (treated as block containers) and logged, so a
//! single unsupported element never aborts a document.

use std::collections::HashMap;

use crate::config::ResolvedSettings;
use crate::error::TransformError;
use crate::style::parse_length;
use crate::transform::ContentHandler;

// ---------------------------------------------------------------------------
// FO types
// ---------------------------------------------------------------------------

/// The kind of a supported formatting object.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FoKind {
    Root,
    LayoutMasterSet,
    SimplePageMaster,
    RegionBody,
    RegionBefore,
    RegionAfter,
    PageSequence,
    Flow,
    StaticContent,
    Block,
    BlockContainer,
    Inline,
    BasicLink,
    PageNumber,
    ExternalGraphic,
    Table,
    TableColumn,
    TableHeader,
    TableBody,
    TableFooter,
    TableRow,
    TableCell,
    ListBlock,
    ListItem,
    ListItemLabel,
    ListItemBody,
    /// Catch-all for unsupported objects – kept and laid out as blocks.
    Unknown(String),
}

impl FoKind {
    pub fn from_name(name: &str) -> Self {
        match name {
            "root" => FoKind::Root,
            "layout-master-set" => FoKind::LayoutMasterSet,
            "simple-page-master" => FoKind::SimplePageMaster,
            "region-body" => FoKind::RegionBody,
            "region-before" => FoKind::RegionBefore,
            "region-after" => FoKind::RegionAfter,
            "page-sequence" => FoKind::PageSequence,
            "flow" => FoKind::Flow,
            "static-content" => FoKind::StaticContent,
            "block" => FoKind::Block,
            "block-container" => FoKind::BlockContainer,
            "inline" => FoKind::Inline,
            "basic-link" => FoKind::BasicLink,
            "page-number" => FoKind::PageNumber,
            "external-graphic" => FoKind::ExternalGraphic,
            "table" => FoKind::Table,
            "table-column" => FoKind::TableColumn,
            "table-header" => FoKind::TableHeader,
            "table-body" => FoKind::TableBody,
            "table-footer" => FoKind::TableFooter,
            "table-row" => FoKind::TableRow,
            "table-cell" => FoKind::TableCell,
            "list-block" => FoKind::ListBlock,
            "list-item" => FoKind::ListItem,
            "list-item-label" => FoKind::ListItemLabel,
            "list-item-body" => FoKind::ListItemBody,
            other => FoKind::Unknown(other.to_string()),
        }
    }

    /// Objects that flow as part of a line rather than stacking as blocks.
    pub fn is_inline(&self) -> bool {
        matches!(self, FoKind::Inline | FoKind::BasicLink | FoKind::PageNumber)
    }
}

/// A node in the formatting-object tree.
#[derive(Debug, Clone)]
pub enum FoNode {
    Element(FoElement),
    Text(String),
}

/// A formatting object carrying kind, properties, and children.
#[derive(Debug, Clone)]
pub struct FoElement {
    pub kind: FoKind,
    pub attributes: HashMap<String, String>,
    pub children: Vec<FoNode>,
}

impl FoElement {
    pub fn new(kind: FoKind) -> Self {
        Self {
            kind,
            attributes: HashMap::new(),
            children: Vec::new(),
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(|s| s.as_str())
    }

    /// Child formatting objects, skipping text.
    pub fn elements(&self) -> impl Iterator<Item = &FoElement> {
        self.children.iter().filter_map(|c| match c {
            FoNode::Element(e) => Some(e),
            FoNode::Text(_) => None,
        })
    }
}

// ---------------------------------------------------------------------------
// Tree builder – a ContentHandler that assembles the FO tree
// ---------------------------------------------------------------------------

/// Builds an [`FoElement`] tree from markup events.
#[derive(Debug, Default)]
pub struct FoTreeBuilder {
    stack: Vec<FoElement>,
    root: Option<FoElement>,
}

impl FoTreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume the builder and split the tree into masters and sequences.
    pub fn finish(self) -> Result<FoDocument, TransformError> {
        let root = self.root.ok_or(TransformError::MissingRoot)?;
        FoDocument::from_root(root)
    }
}

impl ContentHandler for FoTreeBuilder {
    fn start_element(
        &mut self,
        name: &str,
        attributes: Vec<(String, String)>,
    ) -> Result<(), TransformError> {
        let kind = FoKind::from_name(name);
        if self.stack.is_empty() {
            if kind != FoKind::Root {
                return Err(TransformError::MissingRoot);
            }
            if self.root.is_some() {
                return Err(TransformError::Markup {
                    position: 0,
                    reason: "more than one root formatting object".to_string(),
                });
            }
        }
        if let FoKind::Unknown(other) = &kind {
            log::warn!("Unsupported formatting object |{other}| laid out as a block.");
        }
        let mut element = FoElement::new(kind);
        element.attributes = attributes.into_iter().collect();
        self.stack.push(element);
        Ok(())
    }

    fn end_element(&mut self, _name: &str) -> Result<(), TransformError> {
        let element = self.stack.pop().ok_or_else(|| TransformError::Markup {
            position: 0,
            reason: "unbalanced end element".to_string(),
        })?;
        match self.stack.last_mut() {
            Some(parent) => parent.children.push(FoNode::Element(element)),
            None => self.root = Some(element),
        }
        Ok(())
    }

    fn characters(&mut self, text: &str) -> Result<(), TransformError> {
        match self.stack.last_mut() {
            Some(parent) => match parent.children.last_mut() {
                Some(FoNode::Text(existing)) => existing.push_str(text),
                _ => parent.children.push(FoNode::Text(text.to_string())),
            },
            None if text.trim().is_empty() => {}
            None => log::warn!("Ignoring text outside the root formatting object."),
        }
        Ok(())
    }

    fn end_document(&mut self) -> Result<(), TransformError> {
        if let Some(open) = self.stack.last() {
            return Err(TransformError::Markup {
                position: 0,
                reason: format!("unclosed formatting object {:?}", open.kind),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Document structure
// ---------------------------------------------------------------------------

/// A parsed layout document: page masters plus the sequences using them.
#[derive(Debug, Clone)]
pub struct FoDocument {
    pub masters: Vec<FoElement>,
    pub sequences: Vec<PageSequence>,
}

/// One `page-sequence` with its flow and static regions.
#[derive(Debug, Clone)]
pub struct PageSequence {
    pub master_reference: String,
    /// Properties declared on `root` and `page-sequence`, inherited by content.
    pub inherited: HashMap<String, String>,
    pub flow: Vec<FoNode>,
    pub before: Vec<FoNode>,
    pub after: Vec<FoNode>,
}

impl FoDocument {
    pub fn from_root(root: FoElement) -> Result<Self, TransformError> {
        let mut masters = Vec::new();
        let mut sequences = Vec::new();

        for child in root.elements() {
            match child.kind {
                FoKind::LayoutMasterSet => masters.extend(
                    child
                        .elements()
                        .filter(|m| m.kind == FoKind::SimplePageMaster)
                        .cloned(),
                ),
                FoKind::PageSequence => {
                    let mut inherited = root.attributes.clone();
                    inherited.extend(
                        child
                            .attributes
                            .iter()
                            .filter(|(k, _)| k.as_str() != "master-reference")
                            .map(|(k, v)| (k.clone(), v.clone())),
                    );
                    let mut sequence = PageSequence {
                        master_reference: child.attr("master-reference").unwrap_or("").to_string(),
                        inherited,
                        flow: Vec::new(),
                        before: Vec::new(),
                        after: Vec::new(),
                    };
                    for part in child.elements() {
                        match (&part.kind, part.attr("flow-name")) {
                            (FoKind::Flow, _) => sequence.flow.extend(part.children.iter().cloned()),
                            (FoKind::StaticContent, Some("xsl-region-before")) => {
                                sequence.before.extend(part.children.iter().cloned())
                            }
                            (FoKind::StaticContent, Some("xsl-region-after")) => {
                                sequence.after.extend(part.children.iter().cloned())
                            }
                            (kind, flow_name) => log::warn!(
                                "Ignoring {kind:?} (flow-name {flow_name:?}) in page-sequence."
                            ),
                        }
                    }
                    sequences.push(sequence);
                }
                _ => log::warn!("Ignoring {:?} directly under root.", child.kind),
            }
        }

        if sequences.is_empty() {
            return Err(TransformError::EmptyDocument);
        }
        Ok(Self { masters, sequences })
    }

    /// The master a sequence refers to; falls back to the first master.
    pub fn master_for(&self, sequence: &PageSequence) -> Option<&FoElement> {
        let named = self
            .masters
            .iter()
            .find(|m| m.attr("master-name") == Some(sequence.master_reference.as_str()));
        if named.is_none() && !self.masters.is_empty() {
            log::warn!(
                "Unknown page master |{}|, using the first master.",
                sequence.master_reference
            );
        }
        named.or_else(|| self.masters.first())
    }
}

// ---------------------------------------------------------------------------
// Page geometry
// ---------------------------------------------------------------------------

/// An axis-aligned rectangle in points, origin at the page's top-left.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Resolved geometry of one page master.
#[derive(Debug, Clone, PartialEq)]
pub struct PageGeometry {
    pub width: f32,
    pub height: f32,
    /// Page margins (top, right, bottom, left).
    pub margins: [f32; 4],
    pub body: Rect,
    pub before: Option<Rect>,
    pub after: Option<Rect>,
}

impl PageGeometry {
    /// Geometry from engine defaults alone.
    pub fn from_settings(settings: &ResolvedSettings) -> Self {
        let m = settings.page_margin;
        Self::assemble(
            settings.page_width,
            settings.page_height,
            [m, m, m, m],
            [0.0; 4],
            None,
            None,
        )
    }

    /// Geometry of a `simple-page-master`, with engine defaults for gaps.
    pub fn from_master(master: &FoElement, settings: &ResolvedSettings) -> Self {
        let dpi = settings.source_resolution;
        let len = |el: &FoElement, name: &str| {
            el.attr(name)
                .and_then(|v| parse_length(v, settings.font_size, dpi))
        };

        let width = len(master, "page-width").unwrap_or(settings.page_width);
        let height = len(master, "page-height").unwrap_or(settings.page_height);
        let margins = sides(master, "margin", settings.page_margin, &len);

        let mut body_margins = [0.0; 4];
        let mut before_extent = None;
        let mut after_extent = None;
        for region in master.elements() {
            match region.kind {
                FoKind::RegionBody => body_margins = sides(region, "margin", 0.0, &len),
                FoKind::RegionBefore => before_extent = len(region, "extent"),
                FoKind::RegionAfter => after_extent = len(region, "extent"),
                _ => {}
            }
        }

        Self::assemble(width, height, margins, body_margins, before_extent, after_extent)
    }

    fn assemble(
        width: f32,
        height: f32,
        margins: [f32; 4],
        body_margins: [f32; 4],
        before_extent: Option<f32>,
        after_extent: Option<f32>,
    ) -> Self {
        let [mt, mr, mb, ml] = margins;
        let [bt, br, bb, bl] = body_margins;
        let body = Rect {
            x: ml + bl,
            y: mt + bt,
            width: (width - ml - mr - bl - br).max(1.0),
            height: (height - mt - mb - bt - bb).max(1.0),
        };
        let region_width = (width - ml - mr).max(1.0);
        let before = before_extent.map(|extent| Rect {
            x: ml,
            y: mt,
            width: region_width,
            height: extent,
        });
        let after = after_extent.map(|extent| Rect {
            x: ml,
            y: height - mb - extent,
            width: region_width,
            height: extent,
        });
        Self {
            width,
            height,
            margins,
            body,
            before,
            after,
        }
    }
}

/// Resolve `{prefix}-top/right/bottom/left` with the shorthand as fallback.
fn sides<F>(el: &FoElement, prefix: &str, default: f32, len: &F) -> [f32; 4]
where
    F: Fn(&FoElement, &str) -> Option<f32>,
{
    let all = len(el, prefix).unwrap_or(default);
    ["top", "right", "bottom", "left"].map(|side| len(el, &format!("{prefix}-{side}")).unwrap_or(all))
}
