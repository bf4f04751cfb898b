//! Rendering driver – runs merged markup through the engine's format writer.
//!
//! The sink is flushed exactly once per call, whatever the outcome. When the
//! transform fails the complete markup goes to a [`Diagnostics`] channel so
//! the offending document can be inspected.

use std::io::{self, Write};
use std::sync::Mutex;
use std::time::Instant;

use crate::engine::Engine;
use crate::error::{RenderError, TransformError};
use crate::metadata::DocumentMetadata;
use crate::templates::MarkupDocument;
use crate::transform::transform;
use crate::writer::OutputFormat;

/// Per-call rendering parameters.
#[derive(Debug, Clone, Default)]
pub struct RenderingContext {
    pub metadata: DocumentMetadata,
    pub format: OutputFormat,
}

impl RenderingContext {
    pub fn new(metadata: DocumentMetadata, format: OutputFormat) -> Self {
        Self { metadata, format }
    }
}

/// Receives the markup of documents that failed to transform.
pub trait Diagnostics: Send + Sync {
    fn dump_markup(&self, markup: &str);
}

/// Writes failed markup to standard error.
#[derive(Debug, Default, Clone, Copy)]
pub struct StderrDiagnostics;

impl Diagnostics for StderrDiagnostics {
    fn dump_markup(&self, markup: &str) {
        let mut stderr = io::stderr().lock();
        let _ = writeln!(stderr, "{markup}");
    }
}

/// Keeps dumped markup in memory.
#[derive(Debug, Default)]
pub struct MemoryDiagnostics {
    dumps: Mutex<Vec<String>>,
}

impl MemoryDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dumps(&self) -> Vec<String> {
        match self.dumps.lock() {
            Ok(dumps) => dumps.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl Diagnostics for MemoryDiagnostics {
    fn dump_markup(&self, markup: &str) {
        match self.dumps.lock() {
            Ok(mut dumps) => dumps.push(markup.to_string()),
            Err(poisoned) => poisoned.into_inner().push(markup.to_string()),
        }
    }
}

/// Transform `markup` into `context.format` on `sink`.
pub fn render(
    engine: &Engine,
    context: &RenderingContext,
    markup: &MarkupDocument,
    sink: &mut dyn Write,
    diagnostics: &dyn Diagnostics,
) -> Result<(), RenderError> {
    let start = Instant::now();
    let result = run_transform(engine, context, markup, sink);

    if let Err(e) = &result {
        log::error!("Transformation of {} markup failed: {e}", context.format);
        diagnostics.dump_markup(markup.as_str());
    }

    let flushed = sink.flush();
    match (result, flushed) {
        (Ok(()), Ok(())) => {
            log::info!(
                "Transformed {} bytes of markup to {} in {:?}.",
                markup.len(),
                context.format,
                start.elapsed()
            );
            Ok(())
        }
        (Ok(()), Err(e)) => Err(TransformError::Io(e).into()),
        (Err(e), Ok(())) => Err(e.into()),
        (Err(e), Err(flush)) => {
            log::error!("Flushing output after failed transformation also failed: {flush}");
            Err(e.into())
        }
    }
}

fn run_transform(
    engine: &Engine,
    context: &RenderingContext,
    markup: &MarkupDocument,
    sink: &mut dyn Write,
) -> Result<(), TransformError> {
    let mut session = engine.new_session();
    session.apply(&context.metadata);
    let mut writer = engine.new_writer(context.format, &session, sink);
    transform(markup.as_str(), writer.default_handler())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigSource, EngineConfig};
    use crate::error::ErrorKind;

    /// Counts flushes; optionally fails them.
    struct CountingSink {
        bytes: Vec<u8>,
        flushes: usize,
        fail_flush: bool,
    }

    impl CountingSink {
        fn new(fail_flush: bool) -> Self {
            Self {
                bytes: Vec::new(),
                flushes: 0,
                fail_flush,
            }
        }
    }

    impl Write for CountingSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.bytes.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            self.flushes += 1;
            if self.fail_flush {
                return Err(io::Error::other("disk full"));
            }
            Ok(())
        }
    }

    const VALID: &str = r#"<fo:root xmlns:fo="http://www.w3.org/1999/XSL/Format">
  <fo:layout-master-set>
    <fo:simple-page-master master-name="A4"><fo:region-body/></fo:simple-page-master>
  </fo:layout-master-set>
  <fo:page-sequence master-reference="A4">
    <fo:flow flow-name="xsl-region-body"><fo:block>Hello</fo:block></fo:flow>
  </fo:page-sequence>
</fo:root>"#;

    fn engine() -> Engine {
        Engine::build(&EngineConfig::new(ConfigSource::Embedded, ".")).unwrap()
    }

    #[test]
    fn successful_render_flushes_once() {
        let diagnostics = MemoryDiagnostics::new();
        let mut sink = CountingSink::new(false);
        let context = RenderingContext::new(DocumentMetadata::default(), OutputFormat::Pdf);
        render(&engine(), &context, &MarkupDocument::new(VALID), &mut sink, &diagnostics).unwrap();
        assert_eq!(sink.flushes, 1);
        assert!(sink.bytes.starts_with(b"%PDF-"));
        assert!(diagnostics.dumps().is_empty());
    }

    #[test]
    fn failed_transform_dumps_markup_and_flushes_once() {
        let diagnostics = MemoryDiagnostics::new();
        let mut sink = CountingSink::new(false);
        let context = RenderingContext::new(DocumentMetadata::default(), OutputFormat::Rtf);
        let markup = MarkupDocument::new("<fo:root xmlns:fo=\"x\"><fo:block></fo:root>");
        let err = render(&engine(), &context, &markup, &mut sink, &diagnostics).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transform);
        assert_eq!(sink.flushes, 1);
        assert_eq!(diagnostics.dumps(), vec![markup.as_str().to_string()]);
    }

    #[test]
    fn flush_failure_after_success_is_a_transform_error() {
        let diagnostics = MemoryDiagnostics::new();
        let mut sink = CountingSink::new(true);
        let context = RenderingContext::default();
        let err = render(&engine(), &context, &MarkupDocument::new(VALID), &mut sink, &diagnostics).unwrap_err();
        assert!(matches!(err, RenderError::Transform(TransformError::Io(_))));
        assert_eq!(sink.flushes, 1);
    }

    #[test]
    fn flush_failure_after_error_keeps_original_error() {
        let diagnostics = MemoryDiagnostics::new();
        let mut sink = CountingSink::new(true);
        let context = RenderingContext::default();
        let err = render(&engine(), &context, &MarkupDocument::new("not markup"), &mut sink, &diagnostics)
            .unwrap_err();
        assert!(matches!(err, RenderError::Transform(TransformError::MissingRoot)
            | RenderError::Transform(TransformError::Markup { .. })));
        assert_eq!(diagnostics.dumps().len(), 1);
    }
}
