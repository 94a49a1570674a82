//! Callback XML Codec
//!
//! The platform's XML documents are flat: a single `<xml>` root whose children are
//! named scalar fields, either bare text or CDATA. Parsing is deliberately loose so
//! that every event shape (text, image, location, subscribe, menu click, ...) lands
//! in the same field map without erroring on names we do not know about.

use std::collections::BTreeMap;

use quick_xml::events::Event;
use quick_xml::Reader;
use serde::Serialize;
use thiserror::Error;

/// XML decoding errors.
#[derive(Debug, Error)]
pub enum XmlError {
    #[error("Malformed XML: {0}")]
    Malformed(String),
    #[error("Document has no root element")]
    Empty,
    #[error("Missing field: {0}")]
    MissingField(&'static str),
}

impl From<quick_xml::Error> for XmlError {
    fn from(err: quick_xml::Error) -> Self {
        Self::Malformed(err.to_string())
    }
}

/// Field name → text for every leaf element under the root.
pub type XmlFields = BTreeMap<String, String>;

/// Parse a flat XML document into its leaf fields.
///
/// Nested elements are flattened by leaf name; the first occurrence of a
/// repeated name wins. Attributes are ignored.
pub fn parse_fields(xml: &str) -> Result<XmlFields, XmlError> {
    let mut reader = Reader::from_str(xml);

    let mut fields = XmlFields::new();
    // (name, has_child_elements)
    let mut stack: Vec<(String, bool)> = Vec::new();
    let mut text = String::new();
    let mut saw_root = false;

    loop {
        match reader.read_event()? {
            Event::Start(start) => {
                if let Some(parent) = stack.last_mut() {
                    parent.1 = true;
                }
                let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
                stack.push((name, false));
                saw_root = true;
                text.clear();
            }
            Event::Empty(empty) => {
                if let Some(parent) = stack.last_mut() {
                    parent.1 = true;
                    let name = String::from_utf8_lossy(empty.local_name().as_ref()).into_owned();
                    fields.entry(name).or_default();
                } else {
                    saw_root = true;
                }
            }
            Event::Text(t) => {
                if stack.len() > 1 {
                    text.push_str(&t.unescape()?);
                }
            }
            Event::CData(c) => {
                if stack.len() > 1 {
                    let s = std::str::from_utf8(&c)
                        .map_err(|e| XmlError::Malformed(format!("CDATA is not UTF-8: {e}")))?;
                    text.push_str(s);
                }
            }
            Event::End(_) => {
                if let Some((name, has_children)) = stack.pop() {
                    // Only leaves below the root become fields
                    if !stack.is_empty() && !has_children {
                        fields.entry(name).or_insert_with(|| text.clone());
                    }
                }
                text.clear();
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(XmlError::Malformed("unclosed element at end of document".into()));
    }
    if !saw_root {
        return Err(XmlError::Empty);
    }

    Ok(fields)
}

/// Pull the ciphertext out of an inbound event envelope.
pub fn extract_encrypt(envelope: &str) -> Result<String, XmlError> {
    parse_fields(envelope)?
        .remove("Encrypt")
        .filter(|s| !s.is_empty())
        .ok_or(XmlError::MissingField("Encrypt"))
}

/// A decrypted and parsed callback event.
///
/// Platform fields serialize under their XML element names so that downstream
/// consumers see `MsgType`, `AgentID`, ... exactly as the platform sent them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DecryptedEvent {
    #[serde(rename = "ToUserName")]
    pub to_user: String,
    #[serde(rename = "FromUserName")]
    pub from_user: String,
    #[serde(rename = "CreateTime")]
    pub create_time: String,
    #[serde(rename = "MsgType")]
    pub msg_type: String,
    #[serde(rename = "Content")]
    pub content: String,
    #[serde(rename = "MsgId")]
    pub msg_id: String,
    #[serde(rename = "AgentID")]
    pub agent_id: String,
    #[serde(rename = "Event", skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    #[serde(rename = "EventKey", skip_serializing_if = "Option::is_none")]
    pub event_key: Option<String>,
    #[serde(rename = "MediaId", skip_serializing_if = "Option::is_none")]
    pub media_id: Option<String>,
    /// The decrypted XML exactly as received.
    #[serde(rename = "decryptedXML")]
    pub decrypted_xml: String,
    /// The inbound request body carrying the ciphertext.
    #[serde(rename = "originalEncryptedXML")]
    pub original_encrypted_xml: String,
    /// Every leaf field of the decrypted document, including ones not modelled above.
    #[serde(rename = "fullXmlData")]
    pub full_xml_data: XmlFields,
}

impl DecryptedEvent {
    /// Parse decrypted XML into an event, retaining the raw inputs for auditing.
    pub fn from_xml(decrypted_xml: &str, original_encrypted_xml: &str) -> Result<Self, XmlError> {
        let fields = parse_fields(decrypted_xml)?;

        let text = |name: &str| fields.get(name).cloned().unwrap_or_default();
        let optional = |name: &str| fields.get(name).filter(|s| !s.is_empty()).cloned();

        Ok(Self {
            to_user: text("ToUserName"),
            from_user: text("FromUserName"),
            create_time: text("CreateTime"),
            msg_type: text("MsgType"),
            content: text("Content"),
            msg_id: text("MsgId"),
            agent_id: text("AgentID"),
            event: optional("Event"),
            event_key: optional("EventKey"),
            media_id: optional("MediaId"),
            decrypted_xml: decrypted_xml.to_string(),
            original_encrypted_xml: original_encrypted_xml.to_string(),
            full_xml_data: fields,
        })
    }
}

/// Serialize an event back into the platform's XML shape.
pub fn serialize_event(event: &DecryptedEvent) -> String {
    let mut xml = String::from("<xml>");
    push_cdata(&mut xml, "ToUserName", &event.to_user);
    push_cdata(&mut xml, "FromUserName", &event.from_user);
    push_text(&mut xml, "CreateTime", &event.create_time);
    push_cdata(&mut xml, "MsgType", &event.msg_type);
    if !event.content.is_empty() {
        push_cdata(&mut xml, "Content", &event.content);
    }
    if !event.msg_id.is_empty() {
        push_text(&mut xml, "MsgId", &event.msg_id);
    }
    if !event.agent_id.is_empty() {
        push_text(&mut xml, "AgentID", &event.agent_id);
    }
    if let Some(ref name) = event.event {
        push_cdata(&mut xml, "Event", name);
    }
    if let Some(ref key) = event.event_key {
        push_cdata(&mut xml, "EventKey", key);
    }
    if let Some(ref media_id) = event.media_id {
        push_cdata(&mut xml, "MediaId", media_id);
    }
    xml.push_str("</xml>");
    xml
}

/// Build the outer envelope the platform POSTs, wrapping an encrypted payload.
pub fn encrypted_envelope(to_user: &str, agent_id: &str, encrypt: &str) -> String {
    let mut xml = String::from("<xml>");
    push_cdata(&mut xml, "ToUserName", to_user);
    push_cdata(&mut xml, "AgentID", agent_id);
    push_cdata(&mut xml, "Encrypt", encrypt);
    xml.push_str("</xml>");
    xml
}

fn push_cdata(xml: &mut String, name: &str, value: &str) {
    // "]]>" cannot appear inside a CDATA section; split it across two sections
    let escaped = value.replace("]]>", "]]]]><![CDATA[>");
    xml.push_str(&format!("<{name}><![CDATA[{escaped}]]></{name}>"));
}

fn push_text(xml: &mut String, name: &str, value: &str) {
    let escaped = quick_xml::escape::escape(value);
    xml.push_str(&format!("<{name}>{escaped}</{name}>"));
}
