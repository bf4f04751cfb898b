//! Resource resolution – external graphics referenced from layout markup.
//!
//! Sources may be plain paths, `url(...)` wrappers, `file:` URIs or base64
//! `data:` URIs. Relative paths resolve against the engine's resource base
//! (the template's directory). Remote URLs are not fetched.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64_STD, Engine as _};
use image::ImageFormat;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("unsupported resource location '{0}'")]
    Unsupported(String),

    #[error("invalid data URI: {0}")]
    InvalidDataUri(String),

    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot decode image: {0}")]
    Decode(String),
}

/// Resolves resource locations against a base directory.
#[derive(Debug, Clone)]
pub struct ResourceResolver {
    base: PathBuf,
}

impl ResourceResolver {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Load the bytes behind `src`.
    pub fn load(&self, src: &str) -> Result<Vec<u8>, ResourceError> {
        let location = strip_url(src);
        if location.starts_with("data:") {
            return parse_data_uri(location);
        }
        if location.starts_with("http://") || location.starts_with("https://") {
            return Err(ResourceError::Unsupported(location.to_string()));
        }
        let path = match location.strip_prefix("file:") {
            Some(rest) => PathBuf::from(rest.trim_start_matches("//")),
            None => PathBuf::from(location),
        };
        let path = self.base.join(path);
        fs::read(&path).map_err(|source| ResourceError::Io { path, source })
    }
}

/// Unwrap `url(...)` and surrounding quotes.
pub fn strip_url(src: &str) -> &str {
    let src = src.trim();
    let inner = src
        .strip_prefix("url(")
        .and_then(|rest| rest.strip_suffix(')'))
        .unwrap_or(src)
        .trim();
    inner
        .strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
        .or_else(|| inner.strip_prefix('"').and_then(|s| s.strip_suffix('"')))
        .unwrap_or(inner)
}

/// Parse a `data:<mime>;base64,<data>` URI and return the raw decoded bytes.
pub fn parse_data_uri(src: &str) -> Result<Vec<u8>, ResourceError> {
    let rest = src
        .strip_prefix("data:")
        .ok_or_else(|| ResourceError::InvalidDataUri("missing `data:` scheme".to_string()))?;
    let comma = rest.find(',').ok_or_else(|| {
        ResourceError::InvalidDataUri("missing `,` between header and data".to_string())
    })?;
    let header = &rest[..comma];
    if !header.contains(";base64") {
        return Err(ResourceError::InvalidDataUri(
            "only base64-encoded data URIs are supported".to_string(),
        ));
    }
    BASE64_STD
        .decode(rest[comma + 1..].trim())
        .map_err(|e| ResourceError::InvalidDataUri(e.to_string()))
}

/// An image loaded for one document.
#[derive(Debug, Clone)]
pub struct LoadedImage {
    pub bytes: Vec<u8>,
    pub format: ImageFormat,
    pub width_px: u32,
    pub height_px: u32,
}

impl LoadedImage {
    /// Decode enough of `bytes` to learn the format and pixel size.
    pub fn decode(bytes: Vec<u8>) -> Result<Self, ResourceError> {
        let format = image::guess_format(&bytes).map_err(|e| ResourceError::Decode(e.to_string()))?;
        if !matches!(format, ImageFormat::Png | ImageFormat::Jpeg) {
            return Err(ResourceError::Decode(format!(
                "unsupported image format {format:?}"
            )));
        }
        let decoded =
            image::load_from_memory_with_format(&bytes, format).map_err(|e| ResourceError::Decode(e.to_string()))?;
        Ok(Self {
            width_px: decoded.width(),
            height_px: decoded.height(),
            format,
            bytes,
        })
    }
}

/// Per-document cache of external graphics, keyed by their `src` value.
///
/// A graphic that fails to load is logged once and remembered as missing.
#[derive(Debug)]
pub struct ImageStore {
    resolver: ResourceResolver,
    images: HashMap<String, Option<Arc<LoadedImage>>>,
}

impl ImageStore {
    pub fn new(resolver: ResourceResolver) -> Self {
        Self {
            resolver,
            images: HashMap::new(),
        }
    }

    /// Load (once) and return the image behind `src`.
    pub fn get(&mut self, src: &str) -> Option<Arc<LoadedImage>> {
        if let Some(cached) = self.images.get(src) {
            return cached.clone();
        }
        let loaded = self
            .resolver
            .load(src)
            .and_then(LoadedImage::decode)
            .map(Arc::new);
        let entry = match loaded {
            Ok(image) => Some(image),
            Err(e) => {
                let preview: String = src.chars().take(80).collect();
                log::warn!("Skipping external graphic {preview:?}: {e}");
                None
            }
        };
        self.images.insert(src.to_string(), entry.clone());
        entry
    }

    /// An image already loaded by [`ImageStore::get`].
    pub fn cached(&self, src: &str) -> Option<Arc<LoadedImage>> {
        self.images.get(src).cloned().flatten()
    }
}
