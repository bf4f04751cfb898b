//! # fo-view – template-driven XSL-FO → PDF/RTF document views
//!
//! A [`DocumentView`] renders an application data model into a paginated
//! document. Each render goes through the same stages:
//!
//! 1. **Configure** – typed view configuration and document metadata
//!    ([`config`], [`metadata`])
//! 2. **Engine** – one formatting engine per process, built on first use
//!    ([`engine`])
//! 3. **Merge** – the data model is merged into a layout template, yielding
//!    XSL-FO markup ([`templates`])
//! 4. **Transform** – the markup streams into the engine's format writer
//!    ([`driver`], [`transform`], [`writer`])
//!
//! The built-in formatting engine parses the formatting-object tree ([`fo`]),
//! resolves properties ([`style`]), lays content out with Taffy ([`layout`]),
//! splits it into pages ([`pagination`], [`area_tree`]) and emits PDF via
//! printpdf or flowing RTF.

pub mod area_tree;
pub mod config;
pub mod driver;
pub mod engine;
pub mod error;
pub mod fo;
pub mod fonts;
pub mod layout;
pub mod metadata;
pub mod pagination;
pub mod resources;
pub mod style;
pub mod templates;
pub mod transform;
pub mod view;
pub mod writer;

// Re-exports for convenience
pub use config::{ConfigSource, EngineConfig, ViewConfig};
pub use engine::{Engine, EngineFactory, Session};
pub use error::{render_error, ErrorKind, RenderError};
pub use templates::DataModel;
pub use view::DocumentView;
pub use writer::OutputFormat;
