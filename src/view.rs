//! Document views – the public entry point of the rendering pipeline.
//!
//! A [`DocumentView`] renders its data model through a layout template into
//! one output format. Views are cheap; the formatting engine behind them is
//! built once by an [`EngineFactory`] and shared.

use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use crate::config::{EngineConfig, ViewConfig};
use crate::driver::{self, Diagnostics, RenderingContext, StderrDiagnostics};
use crate::engine::{Engine, EngineFactory};
use crate::error::{InputError, RenderError};
use crate::templates::{materialize, DataModel, MarkupDocument, MiniJinjaEngine, TemplateEngine};

/// The process-wide factory, or one owned by the host.
enum FactoryHandle {
    Shared(&'static EngineFactory),
    Owned(Arc<EngineFactory>),
}

impl FactoryHandle {
    fn get(&self) -> &EngineFactory {
        match self {
            FactoryHandle::Shared(factory) => factory,
            FactoryHandle::Owned(factory) => factory,
        }
    }
}

pub struct DocumentView {
    config: ViewConfig,
    model: Option<DataModel>,
    factory: FactoryHandle,
    templates: Arc<dyn TemplateEngine>,
    diagnostics: Arc<dyn Diagnostics>,
}

impl DocumentView {
    /// A view using the process-wide engine and templates under the
    /// configured template root.
    pub fn new(config: ViewConfig) -> Self {
        let templates = Arc::new(MiniJinjaEngine::new(&config.template_root));
        Self {
            config,
            model: None,
            factory: FactoryHandle::Shared(EngineFactory::shared()),
            templates,
            diagnostics: Arc::new(StderrDiagnostics),
        }
    }

    pub fn with_model(mut self, model: DataModel) -> Self {
        self.model = Some(model);
        self
    }

    pub fn set_model(&mut self, model: Option<DataModel>) {
        self.model = model;
    }

    /// Use `factory` instead of the process-wide one, e.g. one per tenant.
    pub fn with_engine_factory(mut self, factory: Arc<EngineFactory>) -> Self {
        self.factory = FactoryHandle::Owned(factory);
        self
    }

    pub fn with_template_engine(mut self, templates: Arc<dyn TemplateEngine>) -> Self {
        self.templates = templates;
        self
    }

    pub fn with_diagnostics(mut self, diagnostics: Arc<dyn Diagnostics>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn config(&self) -> &ViewConfig {
        &self.config
    }

    pub fn content_type(&self) -> &'static str {
        self.config.format.mime_type()
    }

    /// Render into `out`; failures surface as [`io::Error`]s carrying the
    /// [`RenderError`] (see [`crate::error::render_error`]).
    pub fn serialize(&self, out: &mut dyn Write) -> io::Result<()> {
        self.render(out).map_err(io::Error::from)
    }

    /// Render in memory and write `path` only once the document is complete,
    /// so a failed render leaves an existing file untouched.
    pub fn serialize_to_file(&self, path: &Path) -> io::Result<usize> {
        let mut bytes = Vec::new();
        self.serialize(&mut bytes)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, &bytes)?;
        Ok(bytes.len())
    }

    /// Render into `out`, which is buffered and flushed exactly once.
    pub fn render(&self, out: &mut dyn Write) -> Result<(), RenderError> {
        let mut buffered = BufWriter::new(out);
        match self.prepare() {
            Ok((engine, markup)) => {
                let context = RenderingContext::new(self.config.metadata.clone(), self.config.format);
                driver::render(&engine, &context, &markup, &mut buffered, self.diagnostics.as_ref())
            }
            Err(e) => {
                if let Err(flush) = buffered.flush() {
                    log::error!("Flushing output of view '{}' failed: {flush}", self.config.name);
                }
                Err(e)
            }
        }
    }

    /// Everything before the driver: model check, engine, merged markup.
    fn prepare(&self) -> Result<(Arc<Engine>, MarkupDocument), RenderError> {
        let model = self
            .model
            .as_ref()
            .filter(|m| !m.is_null())
            .ok_or_else(|| InputError::MissingModel(self.config.name.clone()))?;

        let engine_config = EngineConfig::for_template(self.config.engine.clone(), &self.config.template_file());
        let engine = self.factory.get().get_or_build(&engine_config)?;

        let markup = materialize(self.templates.as_ref(), &self.config.template, Some(model))?;
        Ok((engine, markup))
    }
}

impl std::fmt::Debug for DocumentView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentView")
            .field("config", &self.config)
            .field("has_model", &self.model.is_some())
            .finish()
    }
}
