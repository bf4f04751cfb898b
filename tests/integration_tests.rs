//! Integration tests for the fo-view pipeline.
//!
//! These tests validate:
//! - PDF and RTF output for a merged template, with the declared content type
//! - Input validation happening before the engine is touched
//! - One-time, non-poisoning engine construction under concurrency
//! - The diagnostics dump and flush contract on transform failure
//! - Pagination of merged documents

use std::collections::HashMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fo_view::config::{ConfigSource, EngineConfig, ViewConfig};
use fo_view::driver::{Diagnostics, MemoryDiagnostics};
use fo_view::engine::EngineFactory;
use fo_view::error::{render_error, ErrorKind, InputError, RenderError, TransformError};
use fo_view::templates::DataModel;
use fo_view::view::DocumentView;
use fo_view::writer::OutputFormat;
use serde::Serialize;
use serde_json::json;

// =====================================================================
// Helpers
// =====================================================================

fn fixtures() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests").join("fixtures")
}

/// A factory private to one test.
fn isolated_factory() -> Arc<EngineFactory> {
    Arc::new(EngineFactory::new())
}

#[derive(Serialize)]
struct Person {
    name: &'static str,
    surname: &'static str,
}

fn john_doe() -> DataModel {
    DataModel::from_serialize(&Person {
        name: "John",
        surname: "Doe",
    })
    .unwrap()
}

fn page_view(format: OutputFormat) -> DocumentView {
    DocumentView::new(ViewConfig::new(fixtures(), "page.fo", format))
        .with_engine_factory(isolated_factory())
        .with_model(john_doe())
}

fn properties(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn write_template(dir: &Path, name: &str, body: &str) {
    std::fs::write(dir.join(name), body).unwrap();
}

/// Records bytes and counts flushes reaching the underlying stream.
#[derive(Default)]
struct FlushCounter {
    bytes: Vec<u8>,
    flushes: usize,
}

impl Write for FlushCounter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.bytes.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flushes += 1;
        Ok(())
    }
}

const SIMPLE_MASTER: &str = r#"<fo:layout-master-set>
    <fo:simple-page-master master-name="A4" page-width="210mm" page-height="297mm" margin="20mm">
      <fo:region-body/>
    </fo:simple-page-master>
  </fo:layout-master-set>"#;

// =====================================================================
// Output formats
// =====================================================================

#[test]
fn page_template_renders_pdf() {
    let view = page_view(OutputFormat::Pdf);
    let mut out = Vec::new();
    view.serialize(&mut out).unwrap();
    assert_eq!(view.content_type(), "application/pdf");
    assert!(out.len() > 100, "PDF too small: {} bytes", out.len());
    assert_eq!(&out[0..5], b"%PDF-", "Missing PDF header");
}

#[test]
fn page_template_renders_rtf() {
    let view = page_view(OutputFormat::Rtf);
    let mut out = Vec::new();
    view.serialize(&mut out).unwrap();
    assert_eq!(view.content_type(), "application/rtf");
    let text = String::from_utf8(out).unwrap();
    assert!(text.starts_with("{\\rtf"));
    assert!(text.contains("Hello John Doe,"));
    assert!(text.contains("\\fldinst PAGE"));
}

#[test]
fn metadata_reaches_the_document() {
    let config = ViewConfig::new(fixtures(), "page.fo", OutputFormat::Rtf)
        .with_properties(&properties(&[
            ("title", "Welcome letter"),
            ("author", "Billing"),
            ("creation-date", "\"2020-02-29T10:00:00Z\""),
        ]))
        .unwrap();
    let view = DocumentView::new(config)
        .with_engine_factory(isolated_factory())
        .with_model(john_doe());
    let mut out = Vec::new();
    view.serialize(&mut out).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text.contains("{\\title Welcome letter}"));
    assert!(text.contains("{\\author Billing}"));
    assert!(text.contains("\\yr2020\\mo2\\dy29\\hr10"));
}

#[test]
fn every_render_flushes_exactly_once() {
    for format in [OutputFormat::Pdf, OutputFormat::Rtf] {
        let view = page_view(format);
        let mut sink = FlushCounter::default();
        view.render(&mut sink).unwrap();
        assert_eq!(sink.flushes, 1, "{format} flushed {} times", sink.flushes);
        assert!(!sink.bytes.is_empty());
    }
}

// =====================================================================
// Input validation
// =====================================================================

#[test]
fn absent_model_is_an_input_error() {
    let factory = isolated_factory();
    let view = DocumentView::new(ViewConfig::new(fixtures(), "page.fo", OutputFormat::Pdf))
        .with_engine_factory(Arc::clone(&factory));
    let mut sink = FlushCounter::default();
    let err = view.render(&mut sink).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Input);
    assert_eq!(factory.build_attempts(), 0);
    assert_eq!(sink.flushes, 1);
    assert!(sink.bytes.is_empty());
}

#[test]
fn serialize_carries_the_render_error() {
    let view = DocumentView::new(ViewConfig::new(fixtures(), "page.fo", OutputFormat::Pdf))
        .with_engine_factory(isolated_factory());
    let err = view.serialize(&mut Vec::new()).unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::Other);
    let inner = render_error(&err).expect("render error inside io::Error");
    assert!(matches!(inner, RenderError::Input(InputError::MissingModel(_))));
}

#[test]
fn malformed_creation_date_is_rejected_at_configuration() {
    let err = ViewConfig::new(fixtures(), "page.fo", OutputFormat::Pdf)
        .with_properties(&properties(&[("creation-date", "not-a-date")]))
        .unwrap_err();
    assert!(matches!(err, InputError::CreationDate { .. }));
}

#[test]
fn malformed_target_resolution_is_rejected_at_configuration() {
    let err = ViewConfig::new(fixtures(), "page.fo", OutputFormat::Pdf)
        .with_properties(&properties(&[("target-resolution", "abc")]))
        .unwrap_err();
    assert!(matches!(err, InputError::TargetResolution { .. }));
}

#[test]
fn missing_template_is_an_input_error() {
    let view = DocumentView::new(ViewConfig::new(fixtures(), "absent.fo", OutputFormat::Pdf))
        .with_engine_factory(isolated_factory())
        .with_model(john_doe());
    let err = view.render(&mut Vec::new()).unwrap_err();
    assert!(matches!(err, RenderError::Input(InputError::TemplateNotFound(_))));
}

// =====================================================================
// Engine factory
// =====================================================================

#[test]
fn concurrent_first_use_builds_one_engine() {
    let factory = EngineFactory::new();
    let config = EngineConfig::new(ConfigSource::Embedded, fixtures());
    let engines: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| scope.spawn(|| factory.get_or_build(&config).unwrap()))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    assert_eq!(factory.build_attempts(), 1);
    for engine in &engines[1..] {
        assert!(Arc::ptr_eq(&engines[0], engine));
    }
}

#[test]
fn failed_construction_does_not_poison_the_factory() {
    let factory = isolated_factory();
    let dir = tempfile::tempdir().unwrap();
    write_template(dir.path(), "page.fo", &std::fs::read_to_string(fixtures().join("page.fo")).unwrap());

    let broken = ViewConfig::new(dir.path(), "page.fo", OutputFormat::Pdf)
        .with_engine_config(ConfigSource::Inline("{\"source-resolution\": 0}".into()));
    let view = DocumentView::new(broken)
        .with_engine_factory(Arc::clone(&factory))
        .with_model(john_doe());
    let err = view.render(&mut Vec::new()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert!(factory.get().is_none());

    let fixed = ViewConfig::new(dir.path(), "page.fo", OutputFormat::Pdf);
    let view = DocumentView::new(fixed)
        .with_engine_factory(Arc::clone(&factory))
        .with_model(john_doe());
    let mut out = Vec::new();
    view.render(&mut out).unwrap();
    assert!(out.starts_with(b"%PDF-"));
    assert_eq!(factory.build_attempts(), 2);
}

#[test]
fn engine_config_file_and_fonts_are_validated() {
    let dir = tempfile::tempdir().unwrap();
    let config_file = dir.path().join("engine.json");
    std::fs::write(
        &config_file,
        r#"{"fonts": [{"family": "Body", "path": "fonts/missing.ttf"}]}"#,
    )
    .unwrap();
    let factory = EngineFactory::new();
    let err = factory
        .get_or_build(&EngineConfig::new(ConfigSource::File(config_file), dir.path()))
        .unwrap_err();
    assert!(err.to_string().contains("missing.ttf"));
}

// =====================================================================
// Transform failures
// =====================================================================

#[test]
fn failed_render_keeps_the_previous_output_file() {
    let dir = tempfile::tempdir().unwrap();
    write_template(
        dir.path(),
        "bad.fo",
        "<fo:root xmlns:fo=\"http://www.w3.org/1999/XSL/Format\"><fo:block>{{ name }}</fo:root>",
    );
    let output = dir.path().join("bad.pdf");
    std::fs::write(&output, b"previous good document").unwrap();

    let view = DocumentView::new(ViewConfig::new(dir.path(), "bad.fo", OutputFormat::Pdf))
        .with_engine_factory(isolated_factory())
        .with_diagnostics(Arc::new(MemoryDiagnostics::new()))
        .with_model(john_doe());
    let err = view.serialize_to_file(&output).unwrap_err();
    assert_eq!(render_error(&err).map(RenderError::kind), Some(ErrorKind::Transform));
    assert_eq!(std::fs::read(&output).unwrap(), b"previous good document");
}

#[test]
fn successful_render_writes_the_output_file() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("out").join("page.pdf");
    let written = page_view(OutputFormat::Pdf).serialize_to_file(&output).unwrap();
    let bytes = std::fs::read(&output).unwrap();
    assert_eq!(bytes.len(), written);
    assert!(bytes.starts_with(b"%PDF-"));
}

#[test]
fn transform_failure_dumps_markup_and_flushes_once() {
    let dir = tempfile::tempdir().unwrap();
    write_template(
        dir.path(),
        "broken.fo",
        "<fo:root xmlns:fo=\"http://www.w3.org/1999/XSL/Format\"><fo:block>{{ name }}</fo:root>",
    );
    let diagnostics = Arc::new(MemoryDiagnostics::new());
    let view = DocumentView::new(ViewConfig::new(dir.path(), "broken.fo", OutputFormat::Pdf))
        .with_engine_factory(isolated_factory())
        .with_diagnostics(diagnostics.clone() as Arc<dyn Diagnostics>)
        .with_model(john_doe());

    let mut sink = FlushCounter::default();
    let err = view.render(&mut sink).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transform);
    assert_eq!(sink.flushes, 1);
    assert!(sink.bytes.is_empty());

    let dumps = diagnostics.dumps();
    assert_eq!(dumps.len(), 1);
    assert!(dumps[0].contains("<fo:block>John</fo:root>"));
}

#[test]
fn document_without_page_sequence_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    write_template(
        dir.path(),
        "empty.fo",
        &format!("<fo:root xmlns:fo=\"http://www.w3.org/1999/XSL/Format\">{SIMPLE_MASTER}</fo:root>"),
    );
    let view = DocumentView::new(ViewConfig::new(dir.path(), "empty.fo", OutputFormat::Rtf))
        .with_engine_factory(isolated_factory())
        .with_diagnostics(Arc::new(MemoryDiagnostics::new()))
        .with_model(john_doe());
    let err = view.render(&mut Vec::new()).unwrap_err();
    assert!(matches!(err, RenderError::Transform(TransformError::EmptyDocument)));
}

// =====================================================================
// Layout through the engine
// =====================================================================

#[test]
fn merged_rows_paginate() {
    let dir = tempfile::tempdir().unwrap();
    write_template(
        dir.path(),
        "report.fo",
        &format!(
            r#"<fo:root xmlns:fo="http://www.w3.org/1999/XSL/Format">{SIMPLE_MASTER}
  <fo:page-sequence master-reference="A4">
    <fo:flow flow-name="xsl-region-body">
      <fo:table>
        <fo:table-body>
        {{% for row in rows %}}<fo:table-row><fo:table-cell><fo:block>{{{{ row }}}}</fo:block></fo:table-cell></fo:table-row>
        {{% endfor %}}</fo:table-body>
      </fo:table>
    </fo:flow>
  </fo:page-sequence>
</fo:root>"#
        ),
    );
    let rows: Vec<String> = (1..=120).map(|i| format!("Line item {i}")).collect();
    let model = DataModel::from(json!({ "rows": rows }));

    let factory = isolated_factory();
    let engine = factory
        .get_or_build(&EngineConfig::new(ConfigSource::Embedded, dir.path()))
        .unwrap();
    let templates = fo_view::templates::MiniJinjaEngine::new(dir.path());
    let markup = fo_view::templates::materialize(&templates, Path::new("report.fo"), Some(&model)).unwrap();
    let tree = engine.lay_out(markup.as_str(), &engine.new_session()).unwrap();

    assert!(tree.pages.len() > 1, "expected several pages, got {}", tree.pages.len());
    let last = tree.pages.len() - 1;
    assert!(tree.page_text(0).starts_with("Line item 1"));
    assert!(tree.page_text(last).ends_with("Line item 120"));
    for (i, page) in tree.pages.iter().enumerate() {
        assert_eq!(page.number, i + 1);
    }
}
