//! Generic markup transform – streams a markup source into a
//! [`ContentHandler`] destination, event by event.
//!
//! The destination decides what to build (a formatting-object tree, a
//! document writer, a test recorder); this module only guarantees that the
//! source is well-formed XML and that every event reaches the handler in
//! document order.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::TransformError;

/// Receiver of markup events, in the manner of a SAX content handler.
///
/// Element names arrive without their namespace prefix; namespace
/// declarations are not reported as attributes.
pub trait ContentHandler {
    fn start_document(&mut self) -> Result<(), TransformError> {
        Ok(())
    }

    fn start_element(
        &mut self,
        name: &str,
        attributes: Vec<(String, String)>,
    ) -> Result<(), TransformError>;

    fn end_element(&mut self, name: &str) -> Result<(), TransformError>;

    fn characters(&mut self, text: &str) -> Result<(), TransformError>;

    fn end_document(&mut self) -> Result<(), TransformError>;
}

/// Feed `source` through `destination`.
///
/// Malformed markup (mismatched tags, bad entities, broken attributes)
/// aborts the transform with [`TransformError::Markup`].
pub fn transform(source: &str, destination: &mut dyn ContentHandler) -> Result<(), TransformError> {
    let mut reader = Reader::from_str(source);
    destination.start_document()?;

    loop {
        let position = reader.buffer_position() as u64;
        let event = reader.read_event().map_err(|e| TransformError::Markup {
            position,
            reason: e.to_string(),
        })?;

        match event {
            Event::Start(e) => {
                let (name, attributes) = element_parts(&e, position)?;
                destination.start_element(&name, attributes)?;
            }
            Event::Empty(e) => {
                let (name, attributes) = element_parts(&e, position)?;
                destination.start_element(&name, attributes)?;
                destination.end_element(&name)?;
            }
            Event::End(e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                destination.end_element(&name)?;
            }
            Event::Text(e) => {
                let text = e.unescape().map_err(|err| TransformError::Markup {
                    position,
                    reason: err.to_string(),
                })?;
                destination.characters(&text)?;
            }
            Event::CData(e) => {
                let raw = e.into_inner();
                destination.characters(&String::from_utf8_lossy(&raw))?;
            }
            Event::Eof => break,
            // Declarations, comments, processing instructions, doctypes.
            _ => {}
        }
    }

    destination.end_document()
}

fn element_parts(
    element: &BytesStart<'_>,
    position: u64,
) -> Result<(String, Vec<(String, String)>), TransformError> {
    let name = String::from_utf8_lossy(element.local_name().as_ref()).into_owned();
    let mut attributes = Vec::new();
    for attr in element.attributes() {
        let attr = attr.map_err(|e| TransformError::Markup {
            position,
            reason: e.to_string(),
        })?;
        if attr.key.as_ref().starts_with(b"xmlns") {
            continue;
        }
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| TransformError::Markup {
                position,
                reason: e.to_string(),
            })?
            .into_owned();
        attributes.push((key, value));
    }
    Ok((name, attributes))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records events as flat strings.
    #[derive(Default)]
    struct Recorder {
        events: Vec<String>,
    }

    impl ContentHandler for Recorder {
        fn start_document(&mut self) -> Result<(), TransformError> {
            self.events.push("start-document".into());
            Ok(())
        }

        fn start_element(
            &mut self,
            name: &str,
            attributes: Vec<(String, String)>,
        ) -> Result<(), TransformError> {
            let attrs: Vec<String> = attributes.iter().map(|(k, v)| format!("{k}={v}")).collect();
            self.events.push(format!("<{name} {}>", attrs.join(",")));
            Ok(())
        }

        fn end_element(&mut self, name: &str) -> Result<(), TransformError> {
            self.events.push(format!("</{name}>"));
            Ok(())
        }

        fn characters(&mut self, text: &str) -> Result<(), TransformError> {
            self.events.push(format!("text:{text}"));
            Ok(())
        }

        fn end_document(&mut self) -> Result<(), TransformError> {
            self.events.push("end-document".into());
            Ok(())
        }
    }

    #[test]
    fn events_arrive_in_order_without_prefixes() {
        let markup = r#"<?xml version="1.0"?><fo:root xmlns:fo="http://www.w3.org/1999/XSL/Format"><fo:block font-weight="bold">A &amp; B</fo:block><fo:page-number/></fo:root>"#;
        let mut recorder = Recorder::default();
        transform(markup, &mut recorder).unwrap();
        assert_eq!(
            recorder.events,
            vec![
                "start-document",
                "<root >",
                "<block font-weight=bold>",
                "text:A & B",
                "</block>",
                "<page-number >",
                "</page-number>",
                "</root>",
                "end-document",
            ]
        );
    }

    #[test]
    fn mismatched_tags_fail() {
        let mut recorder = Recorder::default();
        let err = transform("<root><block></root>", &mut recorder).unwrap_err();
        assert!(matches!(err, TransformError::Markup { .. }));
        assert!(!recorder.events.contains(&"end-document".to_string()));
    }

    #[test]
    fn cdata_is_reported_as_text() {
        let mut recorder = Recorder::default();
        transform("<block><![CDATA[a < b]]></block>", &mut recorder).unwrap();
        assert!(recorder.events.contains(&"text:a < b".to_string()));
    }
}
