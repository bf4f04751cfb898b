//! Error taxonomy for the rendering pipeline.
//!
//! Every failure is reported as a [`RenderError`] whose [`ErrorKind`] tells
//! the caller which stage rejected the request. Views translate it into an
//! [`io::Error`] for hosts that only speak I/O; [`render_error`] recovers the
//! original value from such an error.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// The engine configuration could not be loaded or failed validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read engine configuration '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed engine configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid engine configuration: {0}")]
    Invalid(String),

    #[error("cannot load font '{}': {reason}", path.display())]
    Font { path: PathBuf, reason: String },
}

/// The caller supplied something the pipeline cannot work with.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("missing model for view '{0}'")]
    MissingModel(String),

    #[error("template '{0}' not found")]
    TemplateNotFound(String),

    #[error("template '{name}' failed: {reason}")]
    Template { name: String, reason: String },

    #[error("data model is not serialisable: {0}")]
    Model(#[from] serde_json::Error),

    #[error("invalid creation-date '{value}': {reason}")]
    CreationDate { value: String, reason: String },

    #[error("invalid target-resolution '{value}': {reason}")]
    TargetResolution { value: String, reason: String },
}

/// The formatting engine failed to turn markup into a document.
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("malformed layout markup at byte {position}: {reason}")]
    Markup { position: u64, reason: String },

    #[error("layout markup has no root formatting object")]
    MissingRoot,

    #[error("document is empty: no page-sequence found")]
    EmptyDocument,

    #[error("layout failed: {0}")]
    Layout(String),

    #[error("{format} output failed: {reason}")]
    Output { format: &'static str, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// A comprehensive error type for one render call.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("input error: {0}")]
    Input(#[from] InputError),

    #[error("transform error: {0}")]
    Transform(#[from] TransformError),
}

/// Coarse classification of a [`RenderError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Input,
    Transform,
}

impl RenderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RenderError::Configuration(_) => ErrorKind::Configuration,
            RenderError::Input(_) => ErrorKind::Input,
            RenderError::Transform(_) => ErrorKind::Transform,
        }
    }
}

impl From<RenderError> for io::Error {
    fn from(err: RenderError) -> Self {
        io::Error::other(err)
    }
}

/// Recover the [`RenderError`] wrapped by a view's I/O failure, if any.
pub fn render_error(err: &io::Error) -> Option<&RenderError> {
    err.get_ref().and_then(|inner| inner.downcast_ref::<RenderError>())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_keeps_render_error() {
        let err: io::Error = RenderError::from(TransformError::EmptyDocument).into();
        assert_eq!(err.kind(), io::ErrorKind::Other);
        let inner = render_error(&err).expect("render error should survive conversion");
        assert_eq!(inner.kind(), ErrorKind::Transform);
    }

    #[test]
    fn plain_io_error_has_no_render_error() {
        let err = io::Error::new(io::ErrorKind::BrokenPipe, "closed");
        assert!(render_error(&err).is_none());
    }

    #[test]
    fn kinds_follow_stage() {
        let input = RenderError::from(InputError::MissingModel("page".into()));
        assert_eq!(input.kind(), ErrorKind::Input);
        let config = RenderError::from(ConfigError::Invalid("zero resolution".into()));
        assert_eq!(config.kind(), ErrorKind::Configuration);
        assert!(config.to_string().contains("zero resolution"));
    }
}
