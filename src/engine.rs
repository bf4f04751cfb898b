//! The formatting engine, its per-call session and the process-wide factory.
//!
//! An [`Engine`] is expensive to build (configuration parsing, font loading)
//! and immutable afterwards, so one instance is shared by every render. Each
//! render gets a fresh [`Session`] carrying its document metadata.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use once_cell::sync::{Lazy, OnceCell};

use crate::area_tree::AreaTree;
use crate::config::{EngineConfig, EngineSettings, ResolvedSettings};
use crate::error::{ConfigError, TransformError};
use crate::fo::FoTreeBuilder;
use crate::fonts::FontManager;
use crate::metadata::DocumentMetadata;
use crate::pagination::lay_out_document;
use crate::resources::{ImageStore, ResourceResolver};
use crate::transform::transform;
use crate::writer::{DocumentWriter, OutputFormat};

/// A configured formatting engine.
#[derive(Debug)]
pub struct Engine {
    settings: ResolvedSettings,
    fonts: FontManager,
    resource_base: PathBuf,
}

impl Engine {
    /// Parse and validate the configuration, then load the configured fonts.
    pub fn build(config: &EngineConfig) -> Result<Self, ConfigError> {
        let text = config.source.read()?;
        let raw = EngineSettings::parse(&text)?;
        let settings = raw.resolve()?;
        let fonts = FontManager::from_settings(&raw.fonts, &config.resource_base)?;
        log::debug!(
            "Built formatting engine; resource base {}, {} embedded font(s).",
            config.resource_base.display(),
            fonts.keys().len()
        );
        Ok(Self {
            settings,
            fonts,
            resource_base: config.resource_base.clone(),
        })
    }

    pub fn settings(&self) -> &ResolvedSettings {
        &self.settings
    }

    pub fn fonts(&self) -> &FontManager {
        &self.fonts
    }

    pub fn resource_base(&self) -> &Path {
        &self.resource_base
    }

    /// A session with engine defaults and the creation date set to now.
    pub fn new_session(&self) -> Session {
        Session {
            producer: self.settings.producer.clone(),
            creator: None,
            author: None,
            title: None,
            creation_date: Utc::now(),
            target_resolution: self.settings.target_resolution,
        }
    }

    /// A writer producing `format` into `sink` for one session.
    pub fn new_writer<'a>(
        &'a self,
        format: OutputFormat,
        session: &'a Session,
        sink: &'a mut dyn Write,
    ) -> DocumentWriter<'a> {
        DocumentWriter::new(format, self, session, sink)
    }

    pub(crate) fn image_store(&self) -> ImageStore {
        ImageStore::new(ResourceResolver::new(&self.resource_base))
    }

    /// Parse, lay out and paginate `markup` without producing output.
    pub fn lay_out(&self, markup: &str, session: &Session) -> Result<AreaTree, TransformError> {
        let mut builder = FoTreeBuilder::new();
        transform(markup, &mut builder)?;
        let doc = builder.finish()?;
        let mut images = self.image_store();
        lay_out_document(&doc, &self.settings, &self.fonts, &mut images, session.title())
    }
}

/// Per-render metadata ("user agent").
#[derive(Debug, Clone)]
pub struct Session {
    producer: String,
    creator: Option<String>,
    author: Option<String>,
    title: Option<String>,
    creation_date: DateTime<Utc>,
    target_resolution: u32,
}

impl Session {
    /// Override every value present in `metadata`.
    pub fn apply(&mut self, metadata: &DocumentMetadata) {
        if let Some(producer) = &metadata.producer {
            self.producer = producer.clone();
        }
        if let Some(creator) = &metadata.creator {
            self.creator = Some(creator.clone());
        }
        if let Some(author) = &metadata.author {
            self.author = Some(author.clone());
        }
        if let Some(title) = &metadata.title {
            self.title = Some(title.clone());
        }
        if let Some(date) = metadata.creation_date {
            self.creation_date = date;
        }
        if let Some(dpi) = metadata.target_resolution {
            self.target_resolution = dpi;
        }
    }

    pub fn set_producer(&mut self, producer: impl Into<String>) {
        self.producer = producer.into();
    }

    pub fn set_creator(&mut self, creator: impl Into<String>) {
        self.creator = Some(creator.into());
    }

    pub fn set_author(&mut self, author: impl Into<String>) {
        self.author = Some(author.into());
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = Some(title.into());
    }

    pub fn set_creation_date(&mut self, date: DateTime<Utc>) {
        self.creation_date = date;
    }

    pub fn set_target_resolution(&mut self, dpi: u32) {
        self.target_resolution = dpi;
    }

    pub fn producer(&self) -> &str {
        &self.producer
    }

    pub fn creator(&self) -> Option<&str> {
        self.creator.as_deref()
    }

    pub fn author(&self) -> Option<&str> {
        self.author.as_deref()
    }

    /// The document title, empty when unset.
    pub fn title(&self) -> &str {
        self.title.as_deref().unwrap_or("")
    }

    pub fn creation_date(&self) -> DateTime<Utc> {
        self.creation_date
    }

    pub fn target_resolution(&self) -> u32 {
        self.target_resolution
    }
}

static SHARED: Lazy<EngineFactory> = Lazy::new(EngineFactory::new);

/// Builds one [`Engine`] and hands out the same instance afterwards.
///
/// A failed build is not cached; the next call tries again.
#[derive(Debug, Default)]
pub struct EngineFactory {
    cell: OnceCell<Arc<Engine>>,
    attempts: AtomicUsize,
}

impl EngineFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide factory.
    pub fn shared() -> &'static EngineFactory {
        &SHARED
    }

    pub fn get_or_build(&self, config: &EngineConfig) -> Result<Arc<Engine>, ConfigError> {
        let engine = self.cell.get_or_try_init(|| {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            log::debug!(
                "Creating formatting engine with resource base {}.",
                config.resource_base.display()
            );
            Engine::build(config).map(Arc::new)
        })?;
        if engine.resource_base() != config.resource_base {
            log::warn!(
                "Engine already built with resource base {}; ignoring {}.",
                engine.resource_base().display(),
                config.resource_base.display()
            );
        }
        Ok(Arc::clone(engine))
    }

    /// The engine, if it has been built.
    pub fn get(&self) -> Option<Arc<Engine>> {
        self.cell.get().cloned()
    }

    /// Number of construction attempts so far, failed ones included.
    pub fn build_attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}
