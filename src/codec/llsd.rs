//! LLSD structured data in its XML and JSON surface forms.
//!
//! # Responsibilities
//! - Parse LLSD-XML (`<llsd>` documents) and LLSD-JSON
//! - Serialize values back to either form
//! - Provide the canonical documents the dispatcher synthesizes
//!
//! # Design Decisions
//! - Maps keep insertion order so responses serialize deterministically
//! - Binary values use base64 in both surface forms
//! - JSON has no date/uri/uuid/binary types; they serialize as strings and
//!   come back as strings

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use indexmap::IndexMap;
use serde_json::Value as JsonValue;
use std::fmt::Write;
use thiserror::Error;
use uuid::Uuid;

use crate::codec::xml::{escape, parse_document, XmlError, XmlNode};

/// The document an empty LLSD request body stands for.
pub const CANONICAL_GET_XML: &str =
    r#"<?xml version="1.0" encoding="UTF-8"?><llsd><map><key>request</key><string>get</string></map></llsd>"#;

/// Error decoding an LLSD document.
#[derive(Debug, Error)]
pub enum LlsdError {
    #[error(transparent)]
    Xml(#[from] XmlError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("root element is <{0}>, expected <llsd>")]
    NotLlsd(String),

    #[error("invalid {kind} value {text:?}")]
    InvalidScalar { kind: &'static str, text: String },

    #[error("unknown element <{0}>")]
    UnknownElement(String),

    #[error("map has a <{0}> where a <key> was expected")]
    MissingKey(String),
}

/// Which LLSD surface form a response should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlsdEncoding {
    Xml,
    Json,
}

/// A single LLSD value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum LlsdValue {
    #[default]
    Undefined,
    Boolean(bool),
    Integer(i32),
    Real(f64),
    String(String),
    Uuid(Uuid),
    /// ISO-8601 timestamp kept verbatim.
    Date(String),
    Uri(String),
    Binary(Vec<u8>),
    Array(Vec<LlsdValue>),
    Map(IndexMap<String, LlsdValue>),
}

impl LlsdValue {
    /// The value an empty request body is treated as.
    pub fn canonical_get() -> Self {
        let mut map = IndexMap::new();
        map.insert("request".to_string(), LlsdValue::from("get"));
        LlsdValue::Map(map)
    }

    /// Reply sent when no handler can serve an LLSD request.
    pub fn no_handler_response() -> Self {
        let mut map = IndexMap::new();
        map.insert("reason".to_string(), LlsdValue::from("LLSDRequest"));
        map.insert(
            "message".to_string(),
            LlsdValue::from("No handler registered for LLSD Requests"),
        );
        map.insert("login".to_string(), LlsdValue::from("false"));
        LlsdValue::Map(map)
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, LlsdValue::Undefined)
    }

    pub fn as_map(&self) -> Option<&IndexMap<String, LlsdValue>> {
        match self {
            LlsdValue::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            LlsdValue::String(s) | LlsdValue::Date(s) | LlsdValue::Uri(s) => Some(s),
            _ => None,
        }
    }

    /// Look up a key when this value is a map.
    pub fn get(&self, key: &str) -> Option<&LlsdValue> {
        self.as_map().and_then(|m| m.get(key))
    }

    /// Parse either surface form, choosing by the first non-space byte.
    pub fn parse(body: &[u8]) -> Result<Self, LlsdError> {
        let text = String::from_utf8_lossy(body);
        let trimmed = text.trim_start();
        if trimmed.starts_with('<') {
            Self::parse_xml(trimmed)
        } else {
            Self::parse_json(trimmed)
        }
    }

    pub fn parse_xml(body: &str) -> Result<Self, LlsdError> {
        let root = parse_document(body)?;
        if root.name != "llsd" {
            return Err(LlsdError::NotLlsd(root.name));
        }
        match root.children.first() {
            Some(node) => from_xml_node(node),
            None => Ok(LlsdValue::Undefined),
        }
    }

    pub fn parse_json(body: &str) -> Result<Self, LlsdError> {
        let json: JsonValue = serde_json::from_str(body)?;
        Ok(Self::from(json))
    }

    pub fn to_xml(&self) -> String {
        let mut out = String::from(r#"<?xml version="1.0" encoding="UTF-8"?><llsd>"#);
        self.write_xml(&mut out);
        out.push_str("</llsd>");
        out
    }

    pub fn to_json(&self) -> String {
        JsonValue::from(self).to_string()
    }

    pub fn encode(&self, encoding: LlsdEncoding) -> String {
        match encoding {
            LlsdEncoding::Xml => self.to_xml(),
            LlsdEncoding::Json => self.to_json(),
        }
    }

    fn write_xml(&self, out: &mut String) {
        match self {
            LlsdValue::Undefined => out.push_str("<undef />"),
            LlsdValue::Boolean(b) => {
                let _ = write!(out, "<boolean>{}</boolean>", if *b { 1 } else { 0 });
            }
            LlsdValue::Integer(i) => {
                let _ = write!(out, "<integer>{}</integer>", i);
            }
            LlsdValue::Real(r) => {
                let _ = write!(out, "<real>{}</real>", r);
            }
            LlsdValue::String(s) => {
                let _ = write!(out, "<string>{}</string>", escape(s));
            }
            LlsdValue::Uuid(u) => {
                let _ = write!(out, "<uuid>{}</uuid>", u);
            }
            LlsdValue::Date(d) => {
                let _ = write!(out, "<date>{}</date>", escape(d));
            }
            LlsdValue::Uri(u) => {
                let _ = write!(out, "<uri>{}</uri>", escape(u));
            }
            LlsdValue::Binary(bytes) => {
                let _ = write!(out, "<binary encoding=\"base64\">{}</binary>", STANDARD.encode(bytes));
            }
            LlsdValue::Array(items) => {
                out.push_str("<array>");
                for item in items {
                    item.write_xml(out);
                }
                out.push_str("</array>");
            }
            LlsdValue::Map(map) => {
                out.push_str("<map>");
                for (key, value) in map {
                    let _ = write!(out, "<key>{}</key>", escape(key));
                    value.write_xml(out);
                }
                out.push_str("</map>");
            }
        }
    }
}

fn from_xml_node(node: &XmlNode) -> Result<LlsdValue, LlsdError> {
    let text = node.text.trim();
    let value = match node.name.as_str() {
        "undef" => LlsdValue::Undefined,
        "boolean" => LlsdValue::Boolean(matches!(text, "1" | "true")),
        "integer" => LlsdValue::Integer(if text.is_empty() { 0 } else { scalar(text, "integer")? }),
        "real" => LlsdValue::Real(if text.is_empty() { 0.0 } else { scalar(text, "real")? }),
        "string" => LlsdValue::String(node.text.clone()),
        "uuid" => LlsdValue::Uuid(if text.is_empty() { Uuid::nil() } else { scalar(text, "uuid")? }),
        "date" => LlsdValue::Date(text.to_string()),
        "uri" => LlsdValue::Uri(text.to_string()),
        "binary" => {
            let compact: String = text.split_whitespace().collect();
            let bytes = STANDARD.decode(compact).map_err(|_| LlsdError::InvalidScalar {
                kind: "binary",
                text: text.to_string(),
            })?;
            LlsdValue::Binary(bytes)
        }
        "array" => LlsdValue::Array(
            node.children
                .iter()
                .map(from_xml_node)
                .collect::<Result<Vec<_>, _>>()?,
        ),
        "map" => {
            let mut map = IndexMap::new();
            let mut children = node.children.iter();
            while let Some(key) = children.next() {
                if key.name != "key" {
                    return Err(LlsdError::MissingKey(key.name.clone()));
                }
                let value = match children.next() {
                    Some(v) => from_xml_node(v)?,
                    None => LlsdValue::Undefined,
                };
                map.insert(key.text.clone(), value);
            }
            LlsdValue::Map(map)
        }
        other => return Err(LlsdError::UnknownElement(other.to_string())),
    };
    Ok(value)
}

fn scalar<T: std::str::FromStr>(text: &str, kind: &'static str) -> Result<T, LlsdError> {
    text.parse().map_err(|_| LlsdError::InvalidScalar {
        kind,
        text: text.to_string(),
    })
}

impl From<&str> for LlsdValue {
    fn from(s: &str) -> Self {
        LlsdValue::String(s.to_string())
    }
}

impl From<String> for LlsdValue {
    fn from(s: String) -> Self {
        LlsdValue::String(s)
    }
}

impl From<JsonValue> for LlsdValue {
    fn from(json: JsonValue) -> Self {
        match json {
            JsonValue::Null => LlsdValue::Undefined,
            JsonValue::Bool(b) => LlsdValue::Boolean(b),
            JsonValue::Number(n) => match n.as_i64().and_then(|i| i32::try_from(i).ok()) {
                Some(i) => LlsdValue::Integer(i),
                None => LlsdValue::Real(n.as_f64().unwrap_or_default()),
            },
            JsonValue::String(s) => LlsdValue::String(s),
            JsonValue::Array(items) => LlsdValue::Array(items.into_iter().map(LlsdValue::from).collect()),
            JsonValue::Object(map) => {
                LlsdValue::Map(map.into_iter().map(|(k, v)| (k, LlsdValue::from(v))).collect())
            }
        }
    }
}

impl From<&LlsdValue> for JsonValue {
    fn from(value: &LlsdValue) -> Self {
        match value {
            LlsdValue::Undefined => JsonValue::Null,
            LlsdValue::Boolean(b) => JsonValue::Bool(*b),
            LlsdValue::Integer(i) => JsonValue::from(*i),
            LlsdValue::Real(r) => JsonValue::from(*r),
            LlsdValue::String(s) | LlsdValue::Date(s) | LlsdValue::Uri(s) => JsonValue::String(s.clone()),
            LlsdValue::Uuid(u) => JsonValue::String(u.to_string()),
            LlsdValue::Binary(bytes) => JsonValue::String(STANDARD.encode(bytes)),
            LlsdValue::Array(items) => JsonValue::Array(items.iter().map(JsonValue::from).collect()),
            LlsdValue::Map(map) => {
                JsonValue::Object(map.iter().map(|(k, v)| (k.clone(), JsonValue::from(v))).collect())
            }
        }
    }
}
