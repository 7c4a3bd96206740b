//! Flattens the XML payload of a record (usually its `EventData` or `UserData` element)
//! into a single line of `key: value` pairs suitable for one CSV cell.
//!
//! ```text
//! <EventData>
//!   <Data Name="SubjectUserSid">S-1-5-18</Data>
//!   <Data Name="SubjectUserName">WIN-HOST$</Data>
//! </EventData>
//! ```
//!
//! becomes `SubjectUserSid: S-1-5-18, SubjectUserName: WIN-HOST$`.
//!
//! The root element is structural and never becomes a key. Below it, an element is keyed by its
//! `Name` attribute when it has one and by its element name otherwise; nested elements are keyed
//! by their path (`LogFileCleared.SubjectUserName`). Remaining attributes are treated as named
//! children of their element, namespace declarations are dropped.

use crate::err::MalformedPayload;

use log::trace;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

const FIELD_SEPARATOR: &str = ", ";
const KEY_VALUE_SEPARATOR: &str = ": ";

#[derive(Debug, Default, Clone, PartialEq)]
struct Element {
    name: String,
    attributes: Vec<(String, String)>,
    text: String,
    children: Vec<Element>,
}

impl Element {
    fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    fn has_text(&self) -> bool {
        !self.text.trim().is_empty()
    }
}

fn is_namespace_declaration(name: &str) -> bool {
    name == "xmlns" || name.starts_with("xmlns:")
}

/// Normalizes `xml` into its flattened `key: value` form.
pub fn normalize(xml: &str) -> Result<String, MalformedPayload> {
    let root = parse_document(xml)?;

    let text = flatten(&root)
        .into_iter()
        .map(|(key, value)| format!("{key}{KEY_VALUE_SEPARATOR}{value}"))
        .collect::<Vec<_>>()
        .join(FIELD_SEPARATOR);

    Ok(text)
}

/// Returns the ordered `(key, value)` fields of a payload, before they are joined.
pub fn fields(xml: &str) -> Result<Vec<(String, String)>, MalformedPayload> {
    parse_document(xml).map(|root| flatten(&root))
}

fn parse_document(xml: &str) -> Result<Element, MalformedPayload> {
    let mut reader = Reader::from_str(xml);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        let position = reader.buffer_position() as u64;
        let event = reader
            .read_event()
            .map_err(|e| MalformedPayload::new(position, e.to_string()))?;

        match event {
            Event::Start(start) => {
                stack.push(open_element(&start, position)?);
            }
            Event::Empty(start) => {
                let element = open_element(&start, position)?;
                close_element(element, &mut stack, &mut root, position)?;
            }
            Event::End(end) => {
                let name = decode_name(end.name().as_ref(), position)?;
                let element = match stack.pop() {
                    Some(element) if element.name == name => element,
                    Some(element) => {
                        return Err(MalformedPayload::new(
                            position,
                            format!("expected `</{}>`, found `</{}>`", element.name, name),
                        ));
                    }
                    None => {
                        return Err(MalformedPayload::new(
                            position,
                            format!("unexpected closing tag `</{name}>`"),
                        ));
                    }
                };
                close_element(element, &mut stack, &mut root, position)?;
            }
            Event::Text(text) => {
                let text = text
                    .unescape()
                    .map_err(|e| MalformedPayload::new(position, e.to_string()))?;
                push_text(&text, &mut stack, position)?;
            }
            Event::CData(cdata) => {
                let text = String::from_utf8(cdata.into_inner().into_owned())
                    .map_err(|e| MalformedPayload::new(position, e.to_string()))?;
                push_text(&text, &mut stack, position)?;
            }
            Event::Eof => break,
            // Declarations, comments, processing instructions and doctypes carry no data.
            other => trace!("Skipping XML event {:?}", other),
        }
    }

    if let Some(open) = stack.last() {
        return Err(MalformedPayload::new(
            reader.buffer_position() as u64,
            format!("unexpected end of document, `<{}>` is not closed", open.name),
        ));
    }

    root.ok_or_else(|| MalformedPayload::new(0, "document has no root element"))
}

fn decode_name(bytes: &[u8], position: u64) -> Result<String, MalformedPayload> {
    std::str::from_utf8(bytes)
        .map(str::to_owned)
        .map_err(|e| MalformedPayload::new(position, e.to_string()))
}

fn open_element(start: &BytesStart<'_>, position: u64) -> Result<Element, MalformedPayload> {
    let mut element = Element {
        name: decode_name(start.name().as_ref(), position)?,
        ..Element::default()
    };

    for attribute in start.attributes() {
        let attribute = attribute.map_err(|e| MalformedPayload::new(position, e.to_string()))?;
        let key = decode_name(attribute.key.as_ref(), position)?;
        let value = attribute
            .unescape_value()
            .map_err(|e| MalformedPayload::new(position, e.to_string()))?;

        element.attributes.push((key, value.into_owned()));
    }

    Ok(element)
}

fn close_element(
    element: Element,
    stack: &mut [Element],
    root: &mut Option<Element>,
    position: u64,
) -> Result<(), MalformedPayload> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None if root.is_some() => {
            return Err(MalformedPayload::new(
                position,
                format!("second root element `<{}>`", element.name),
            ));
        }
        None => *root = Some(element),
    }

    Ok(())
}

fn push_text(text: &str, stack: &mut [Element], position: u64) -> Result<(), MalformedPayload> {
    match stack.last_mut() {
        Some(element) => element.text.push_str(text),
        None if text.trim().is_empty() => {}
        None => {
            return Err(MalformedPayload::new(
                position,
                "text outside of the root element",
            ));
        }
    }

    Ok(())
}

fn flatten(root: &Element) -> Vec<(String, String)> {
    let mut fields = Vec::new();

    for (name, value) in &root.attributes {
        if !is_namespace_declaration(name) {
            fields.push((name.clone(), value.clone()));
        }
    }

    if (root.children.is_empty() || root.has_text()) && !root.text.is_empty() {
        fields.push((root.name.clone(), root.text.clone()));
    }

    for child in &root.children {
        collect(child, None, &mut fields);
    }

    fields
}

fn collect(element: &Element, parent_key: Option<&str>, fields: &mut Vec<(String, String)>) {
    let own = element.attribute("Name").unwrap_or(&element.name);
    let key = match parent_key {
        Some(parent) => format!("{parent}.{own}"),
        None => own.to_owned(),
    };

    // Whitespace between child elements is indentation, not data.
    if element.children.is_empty() || element.has_text() {
        fields.push((key.clone(), element.text.clone()));
    }

    for (name, value) in &element.attributes {
        if name != "Name" && !is_namespace_declaration(name) {
            fields.push((format!("{key}.{name}"), value.clone()));
        }
    }

    for child in &element.children {
        collect(child, Some(&key), fields);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_named_event_data() {
        let xml = r#"<EventData><Data Name="SubjectUserSid">S-1-5-18</Data><Data Name="SubjectUserName">WIN-HOST$</Data></EventData>"#;

        assert_eq!(
            normalize(xml).unwrap(),
            "SubjectUserSid: S-1-5-18, SubjectUserName: WIN-HOST$"
        );
    }

    #[test]
    fn test_indented_payload_with_declaration() {
        let xml = "<?xml version=\"1.0\" encoding=\"utf-8\"?>\r\n<EventData>\r\n  <Data Name=\"TargetUserName\">alice</Data>\r\n  <Data Name=\"LogonType\">3</Data>\r\n</EventData>\r\n";

        assert_eq!(normalize(xml).unwrap(), "TargetUserName: alice, LogonType: 3");
    }

    #[test]
    fn test_unnamed_data_and_binary() {
        let xml = r#"<EventData><Data>first</Data><Data>second</Data><Binary Length="2">00FF</Binary></EventData>"#;

        assert_eq!(
            normalize(xml).unwrap(),
            "Data: first, Data: second, Binary: 00FF, Binary.Length: 2"
        );
    }

    #[test]
    fn test_user_data_is_keyed_by_path() {
        let xml = r#"<UserData><LogFileCleared xmlns="http://manifests.microsoft.com/win/2004/08/windows/eventlog"><SubjectUserSid>S-1-5-21-1</SubjectUserSid><SubjectUserName>bob</SubjectUserName></LogFileCleared></UserData>"#;

        assert_eq!(
            normalize(xml).unwrap(),
            "LogFileCleared.SubjectUserSid: S-1-5-21-1, LogFileCleared.SubjectUserName: bob"
        );
    }

    #[test]
    fn test_empty_values() {
        assert_eq!(normalize("<EventData/>").unwrap(), "");
        assert_eq!(normalize("<EventData></EventData>").unwrap(), "");
        assert_eq!(
            normalize(r#"<EventData><Data Name="Empty"/><Data Name="X">1</Data></EventData>"#)
                .unwrap(),
            "Empty: , X: 1"
        );
    }

    #[test]
    fn test_entities_and_cdata_are_unescaped() {
        let xml = r#"<EventData><Data Name="Cmd">a &amp; b &lt;c&gt;</Data><Data Name="Script"><![CDATA[if (x < 1) {}]]></Data></EventData>"#;

        assert_eq!(
            normalize(xml).unwrap(),
            "Cmd: a & b <c>, Script: if (x < 1) {}"
        );
    }

    #[test]
    fn test_leaf_root() {
        assert_eq!(normalize("<Message>hello</Message>").unwrap(), "Message: hello");
    }

    #[test]
    fn test_normalization_is_idempotent() {
        let xml = r#"<EventData><Data Name="A">1</Data><Data Name="B">two, three</Data></EventData>"#;

        assert_eq!(normalize(xml).unwrap(), normalize(xml).unwrap());
        assert_eq!(fields(xml).unwrap().len(), 2);
    }

    #[test]
    fn test_malformed_payloads_are_rejected() {
        for xml in [
            "",
            "not xml at all",
            "<EventData><Data Name=\"A\">1</Data>",
            "<a></b>",
            "<a/><b/>",
            "<a/>trailing",
            "<a x=\"1\" x=\"2\"/>",
        ] {
            assert!(normalize(xml).is_err(), "expected `{xml}` to be rejected");
        }
    }
}
