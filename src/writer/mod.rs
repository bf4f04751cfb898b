//! Output backends.
//!
//! A [`DocumentWriter`] is the destination of the markup transform: it
//! collects the formatting-object tree and, at the end of the document,
//! formats it into the selected [`OutputFormat`] on its sink.

pub mod image;
pub mod pdf;
pub mod rtf;

use std::fmt;
use std::io::Write;
use std::str::FromStr;
use std::time::Instant;

use crate::engine::{Engine, Session};
use crate::error::TransformError;
use crate::fo::FoTreeBuilder;
use crate::transform::ContentHandler;

/// Binary formats the engine can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OutputFormat {
    #[default]
    Pdf,
    Rtf,
}

impl OutputFormat {
    pub fn mime_type(self) -> &'static str {
        match self {
            OutputFormat::Pdf => "application/pdf",
            OutputFormat::Rtf => "application/rtf",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Pdf => "pdf",
            OutputFormat::Rtf => "rtf",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            OutputFormat::Pdf => "PDF",
            OutputFormat::Rtf => "RTF",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pdf" | "application/pdf" => Ok(OutputFormat::Pdf),
            "rtf" | "application/rtf" | "text/rtf" => Ok(OutputFormat::Rtf),
            other => Err(format!("unknown output format '{other}' (expected pdf or rtf)")),
        }
    }
}

/// Formats one document for one session.
pub struct DocumentWriter<'a> {
    format: OutputFormat,
    engine: &'a Engine,
    session: &'a Session,
    sink: &'a mut dyn Write,
    builder: FoTreeBuilder,
}

impl<'a> DocumentWriter<'a> {
    pub fn new(
        format: OutputFormat,
        engine: &'a Engine,
        session: &'a Session,
        sink: &'a mut dyn Write,
    ) -> Self {
        Self {
            format,
            engine,
            session,
            sink,
            builder: FoTreeBuilder::new(),
        }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// The handler the markup transform should feed.
    pub fn default_handler(&mut self) -> &mut dyn ContentHandler {
        self
    }

    fn write_document(&mut self) -> Result<(), TransformError> {
        let start = Instant::now();
        let doc = std::mem::take(&mut self.builder).finish()?;
        let mut images = self.engine.image_store();
        let bytes = match self.format {
            OutputFormat::Pdf => pdf::write_pdf(&doc, self.engine, self.session, &mut images)?,
            OutputFormat::Rtf => rtf::write_rtf(&doc, self.engine, self.session, &mut images)?,
        };
        self.sink.write_all(&bytes)?;
        log::info!(
            "Formatted {} bytes of {} in {:?}.",
            bytes.len(),
            self.format,
            start.elapsed()
        );
        Ok(())
    }
}

impl ContentHandler for DocumentWriter<'_> {
    fn start_document(&mut self) -> Result<(), TransformError> {
        self.builder.start_document()
    }

    fn start_element(
        &mut self,
        name: &str,
        attributes: Vec<(String, String)>,
    ) -> Result<(), TransformError> {
        self.builder.start_element(name, attributes)
    }

    fn end_element(&mut self, name: &str) -> Result<(), TransformError> {
        self.builder.end_element(name)
    }

    fn characters(&mut self, text: &str) -> Result<(), TransformError> {
        self.builder.characters(text)
    }

    fn end_document(&mut self) -> Result<(), TransformError> {
        self.builder.end_document()?;
        self.write_document()
    }
}
