//! Template materialization – merges a data model into a layout template.
//!
//! The merged markup is rendered fully to memory before it is formatted.
//! Merging is a small share of the total render time, and the buffered
//! markup can be dumped verbatim when the transform fails.

use std::path::{Path, PathBuf};
use std::time::Instant;

use minijinja::{AutoEscape, Environment, ErrorKind};
use serde::Serialize;
use serde_json::Value;

use crate::error::InputError;

/// The application data merged into a template.
#[derive(Debug, Clone, PartialEq)]
pub struct DataModel(Value);

impl DataModel {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// Convert any serialisable value into a model.
    pub fn from_serialize<T: Serialize>(value: &T) -> Result<Self, InputError> {
        Ok(Self(serde_json::to_value(value)?))
    }

    /// A JSON `null` model counts as absent.
    pub fn is_null(&self) -> bool {
        self.0.is_null()
    }

    pub fn value(&self) -> &Value {
        &self.0
    }
}

impl From<Value> for DataModel {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// Merged layout markup, ready for the formatting engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkupDocument {
    text: String,
}

impl MarkupDocument {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// A loaded template.
pub trait Template {
    /// Merge `model` into the template.
    fn serialize(&self, model: &DataModel) -> Result<String, InputError>;
}

/// Loads templates by path.
pub trait TemplateEngine: Send + Sync {
    fn get_template(&self, path: &Path) -> Result<Box<dyn Template + '_>, InputError>;
}

/// Jinja-compatible templates loaded from a directory; every substituted
/// value is escaped for XML.
pub struct MiniJinjaEngine {
    env: Environment<'static>,
    root: PathBuf,
}

impl MiniJinjaEngine {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let mut env = Environment::new();
        env.set_loader(minijinja::path_loader(&root));
        env.set_auto_escape_callback(|_| AutoEscape::Html);
        Self { env, root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl std::fmt::Debug for MiniJinjaEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MiniJinjaEngine").field("root", &self.root).finish()
    }
}

struct MiniJinjaTemplate<'env> {
    name: String,
    inner: minijinja::Template<'env, 'env>,
}

impl Template for MiniJinjaTemplate<'_> {
    fn serialize(&self, model: &DataModel) -> Result<String, InputError> {
        self.inner
            .render(model.value())
            .map_err(|e| InputError::Template {
                name: self.name.clone(),
                reason: describe(&e),
            })
    }
}

impl TemplateEngine for MiniJinjaEngine {
    fn get_template(&self, path: &Path) -> Result<Box<dyn Template + '_>, InputError> {
        // Loader names always use forward slashes.
        let name = path.to_string_lossy().replace('\\', "/");
        match self.env.get_template(&name) {
            Ok(inner) => Ok(Box::new(MiniJinjaTemplate { name, inner })),
            Err(e) if e.kind() == ErrorKind::TemplateNotFound => Err(InputError::TemplateNotFound(name)),
            Err(e) => Err(InputError::Template {
                name,
                reason: describe(&e),
            }),
        }
    }
}

/// An error message including the template line, when known.
fn describe(err: &minijinja::Error) -> String {
    match err.line() {
        Some(line) => format!("{err} (line {line})"),
        None => err.to_string(),
    }
}

/// Load `path` through `engine` and merge `model` into it.
///
/// A missing model fails before the template is touched.
pub fn materialize(
    engine: &dyn TemplateEngine,
    path: &Path,
    model: Option<&DataModel>,
) -> Result<MarkupDocument, InputError> {
    let model = model
        .filter(|m| !m.is_null())
        .ok_or_else(|| InputError::MissingModel(path.display().to_string()))?;

    let start = Instant::now();
    let template = engine.get_template(path)?;
    let text = template.serialize(model)?;
    log::info!(
        "Merged template {} into {} bytes of markup in {:?}.",
        path.display(),
        text.len(),
        start.elapsed()
    );
    Ok(MarkupDocument::new(text))
}
