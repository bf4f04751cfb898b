//! Configuration – engine settings (JSON) and typed view configuration.
//!
//! Engine settings are validated strictly: unknown keys, malformed lengths
//! and zero resolutions are rejected when the engine is built. View
//! configuration resolves its metadata properties once, up front.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{ConfigError, InputError};
use crate::metadata::DocumentMetadata;
use crate::style::parse_length;
use crate::writer::OutputFormat;

/// Built-in engine configuration used when no other source is given.
pub const DEFAULT_CONFIGURATION: &str = include_str!("../resources/engine.json");

/// Raw engine settings as written in the configuration file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct EngineSettings {
    /// Resolution used for `px` lengths and intrinsic image sizes.
    pub source_resolution: u32,
    /// Default output resolution for embedded bitmaps.
    pub target_resolution: u32,
    /// Page geometry used when a page master leaves it unspecified.
    pub page: PageSettings,
    pub font_family: String,
    pub font_size: String,
    /// Producer written into document metadata unless a view overrides it.
    pub producer: String,
    /// TrueType fonts, paths relative to the resource base.
    pub fonts: Vec<FontSettings>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            source_resolution: 72,
            target_resolution: 72,
            page: PageSettings::default(),
            font_family: "Helvetica".to_string(),
            font_size: "12pt".to_string(),
            producer: concat!("fo-view ", env!("CARGO_PKG_VERSION")).to_string(),
            fonts: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PageSettings {
    pub width: String,
    pub height: String,
    pub margin: String,
}

impl Default for PageSettings {
    fn default() -> Self {
        Self {
            width: "210mm".to_string(),
            height: "297mm".to_string(),
            margin: "20mm".to_string(),
        }
    }
}

/// One configured font face.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FontSettings {
    pub family: String,
    #[serde(default = "FontSettings::normal")]
    pub weight: String,
    #[serde(default = "FontSettings::normal")]
    pub style: String,
    pub path: PathBuf,
}

impl FontSettings {
    fn normal() -> String {
        "normal".to_string()
    }

    pub fn is_bold(&self) -> Result<bool, ConfigError> {
        match self.weight.as_str() {
            "normal" | "400" => Ok(false),
            "bold" | "700" => Ok(true),
            other => Err(ConfigError::Invalid(format!(
                "font '{}' has unsupported weight '{other}'",
                self.family
            ))),
        }
    }

    pub fn is_italic(&self) -> Result<bool, ConfigError> {
        match self.style.as_str() {
            "normal" => Ok(false),
            "italic" | "oblique" => Ok(true),
            other => Err(ConfigError::Invalid(format!(
                "font '{}' has unsupported style '{other}'",
                self.family
            ))),
        }
    }
}

/// Engine settings after validation, with lengths resolved to points.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSettings {
    pub source_resolution: f32,
    pub target_resolution: u32,
    pub page_width: f32,
    pub page_height: f32,
    pub page_margin: f32,
    pub font_family: String,
    pub font_size: f32,
    pub producer: String,
}

impl EngineSettings {
    /// Parse settings from JSON text.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Validate every value and resolve lengths to points.
    pub fn resolve(&self) -> Result<ResolvedSettings, ConfigError> {
        if self.source_resolution == 0 {
            return Err(ConfigError::Invalid("source-resolution must be positive".into()));
        }
        if self.target_resolution == 0 {
            return Err(ConfigError::Invalid("target-resolution must be positive".into()));
        }
        if self.font_family.trim().is_empty() {
            return Err(ConfigError::Invalid("font-family must not be empty".into()));
        }

        let dpi = self.source_resolution as f32;
        let length = |key: &str, value: &str| {
            parse_length(value, 12.0, dpi)
                .filter(|pt| *pt >= 0.0)
                .ok_or_else(|| ConfigError::Invalid(format!("{key} has invalid length '{value}'")))
        };

        let page_width = length("page.width", &self.page.width)?;
        let page_height = length("page.height", &self.page.height)?;
        let page_margin = length("page.margin", &self.page.margin)?;
        let font_size = length("font-size", &self.font_size)?;

        if page_width <= 2.0 * page_margin || page_height <= 2.0 * page_margin {
            return Err(ConfigError::Invalid(
                "page margins leave no room for content".into(),
            ));
        }
        if font_size <= 0.0 {
            return Err(ConfigError::Invalid("font-size must be positive".into()));
        }
        for font in &self.fonts {
            font.is_bold()?;
            font.is_italic()?;
        }

        Ok(ResolvedSettings {
            source_resolution: dpi,
            target_resolution: self.target_resolution,
            page_width,
            page_height,
            page_margin,
            font_family: self.font_family.trim().to_string(),
            font_size,
            producer: self.producer.clone(),
        })
    }
}

/// Where the base engine configuration comes from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ConfigSource {
    /// The configuration bundled with the crate.
    #[default]
    Embedded,
    File(PathBuf),
    Inline(String),
}

impl ConfigSource {
    pub fn read(&self) -> Result<Cow<'_, str>, ConfigError> {
        match self {
            ConfigSource::Embedded => Ok(Cow::Borrowed(DEFAULT_CONFIGURATION)),
            ConfigSource::Inline(text) => Ok(Cow::Borrowed(text.as_str())),
            ConfigSource::File(path) => fs::read_to_string(path)
                .map(Cow::Owned)
                .map_err(|source| ConfigError::Read {
                    path: path.clone(),
                    source,
                }),
        }
    }
}

/// Everything needed to build an engine once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub source: ConfigSource,
    /// Directory against which fonts, images and other resources resolve.
    pub resource_base: PathBuf,
}

impl EngineConfig {
    pub fn new(source: ConfigSource, resource_base: impl Into<PathBuf>) -> Self {
        Self {
            source,
            resource_base: resource_base.into(),
        }
    }

    /// Configuration whose resources resolve next to `template_file`.
    pub fn for_template(source: ConfigSource, template_file: &Path) -> Self {
        let base = template_file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Self::new(source, base)
    }
}

/// Typed configuration of one document view.
#[derive(Debug, Clone)]
pub struct ViewConfig {
    /// Name used in log and error messages.
    pub name: String,
    pub template_root: PathBuf,
    /// Template path relative to `template_root`.
    pub template: PathBuf,
    pub format: OutputFormat,
    pub metadata: DocumentMetadata,
    pub engine: ConfigSource,
}

impl ViewConfig {
    pub fn new(
        template_root: impl Into<PathBuf>,
        template: impl Into<PathBuf>,
        format: OutputFormat,
    ) -> Self {
        let template = template.into();
        let name = template
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("document")
            .to_string();
        Self {
            name,
            template_root: template_root.into(),
            template,
            format,
            metadata: DocumentMetadata::default(),
            engine: ConfigSource::default(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Resolve metadata from named properties; malformed values fail here.
    pub fn with_properties(
        mut self,
        properties: &HashMap<String, String>,
    ) -> Result<Self, InputError> {
        self.metadata = DocumentMetadata::resolve(properties)?;
        Ok(self)
    }

    pub fn with_metadata(mut self, metadata: DocumentMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_engine_config(mut self, source: ConfigSource) -> Self {
        self.engine = source;
        self
    }

    pub fn template_file(&self) -> PathBuf {
        self.template_root.join(&self.template)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_configuration_is_valid() {
        let text = ConfigSource::Embedded.read().unwrap();
        let settings = EngineSettings::parse(&text).unwrap();
        let resolved = settings.resolve().unwrap();
        assert!((resolved.page_width - 595.28).abs() < 0.1);
        assert!((resolved.page_height - 841.89).abs() < 0.1);
        assert_eq!(resolved.font_size, 12.0);
        assert_eq!(resolved.target_resolution, 72);
    }

    #[test]
    fn empty_object_uses_defaults() {
        let settings = EngineSettings::parse("{}").unwrap();
        assert_eq!(settings.source_resolution, 72);
        assert_eq!(settings.font_family, "Helvetica");
        assert!(settings.fonts.is_empty());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = EngineSettings::parse(r#"{ "strict-validation": false }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let zero = EngineSettings::parse(r#"{ "target-resolution": 0 }"#).unwrap();
        assert!(zero.resolve().is_err());

        let width = EngineSettings::parse(r#"{ "page": { "width": "wide" } }"#).unwrap();
        assert!(width.resolve().is_err());

        let weight = EngineSettings::parse(
            r#"{ "fonts": [ { "family": "Body", "weight": "heavy", "path": "a.ttf" } ] }"#,
        )
        .unwrap();
        assert!(weight.resolve().is_err());
    }

    #[test]
    fn resource_base_is_template_directory() {
        let config = EngineConfig::for_template(
            ConfigSource::Embedded,
            Path::new("/srv/views/invoice/page.fo"),
        );
        assert_eq!(config.resource_base, PathBuf::from("/srv/views/invoice"));
    }

    #[test]
    fn view_config_names_after_template() {
        let view = ViewConfig::new("/srv/views", "invoice/page.fo", OutputFormat::Pdf);
        assert_eq!(view.name, "page");
        assert_eq!(view.template_file(), PathBuf::from("/srv/views/invoice/page.fo"));
    }

    #[test]
    fn view_config_overrides() {
        let metadata = DocumentMetadata {
            title: Some("Invoice".to_string()),
            target_resolution: Some(150),
            ..DocumentMetadata::default()
        };
        let view = ViewConfig::new("/srv/views", "invoice/page.fo", OutputFormat::Pdf)
            .with_name("invoice")
            .with_metadata(metadata.clone());
        assert_eq!(view.name, "invoice");
        assert_eq!(view.metadata, metadata);
    }

    #[test]
    fn view_config_validates_properties() {
        let mut props = HashMap::new();
        props.insert("target-resolution".to_string(), "abc".to_string());
        let result = ViewConfig::new(".", "page.fo", OutputFormat::Rtf).with_properties(&props);
        assert!(matches!(result, Err(InputError::TargetResolution { .. })));
    }
}
