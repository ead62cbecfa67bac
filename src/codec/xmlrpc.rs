//! XML-RPC envelopes.
//!
//! Covers `<methodCall>` and `<methodResponse>` (including `<fault>`) with
//! the standard scalar types, structs, arrays and the common `<nil/>`
//! extension.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use indexmap::IndexMap;
use std::fmt::Write;
use thiserror::Error;

use crate::codec::xml::{escape, parse_document, XmlError, XmlNode};

/// Fault code for a method name with no registered handler.
pub const METHOD_NOT_FOUND: i32 = -32601;

/// Fault code for a handler that failed while executing.
pub const INTERNAL_ERROR: i32 = -32603;

/// Error decoding an XML-RPC envelope.
#[derive(Debug, Error)]
pub enum XmlRpcError {
    #[error(transparent)]
    Xml(#[from] XmlError),

    #[error("expected <{expected}> but found <{found}>")]
    UnexpectedElement { expected: &'static str, found: String },

    #[error("invalid {kind} value {text:?}")]
    InvalidScalar { kind: &'static str, text: String },

    #[error("malformed envelope: {0}")]
    Malformed(&'static str),
}

/// A single XML-RPC value.
#[derive(Debug, Clone, PartialEq)]
pub enum XmlRpcValue {
    Int(i32),
    Boolean(bool),
    String(String),
    Double(f64),
    /// ISO-8601 timestamp kept verbatim.
    DateTime(String),
    Base64(Vec<u8>),
    Struct(IndexMap<String, XmlRpcValue>),
    Array(Vec<XmlRpcValue>),
    Nil,
}

impl XmlRpcValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            XmlRpcValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            XmlRpcValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&IndexMap<String, XmlRpcValue>> {
        match self {
            XmlRpcValue::Struct(m) => Some(m),
            _ => None,
        }
    }

    fn write_xml(&self, out: &mut String) {
        out.push_str("<value>");
        match self {
            XmlRpcValue::Int(i) => {
                let _ = write!(out, "<i4>{}</i4>", i);
            }
            XmlRpcValue::Boolean(b) => {
                let _ = write!(out, "<boolean>{}</boolean>", if *b { 1 } else { 0 });
            }
            XmlRpcValue::String(s) => {
                let _ = write!(out, "<string>{}</string>", escape(s));
            }
            XmlRpcValue::Double(d) => {
                let _ = write!(out, "<double>{}</double>", d);
            }
            XmlRpcValue::DateTime(s) => {
                let _ = write!(out, "<dateTime.iso8601>{}</dateTime.iso8601>", escape(s));
            }
            XmlRpcValue::Base64(bytes) => {
                let _ = write!(out, "<base64>{}</base64>", STANDARD.encode(bytes));
            }
            XmlRpcValue::Struct(members) => {
                out.push_str("<struct>");
                for (name, value) in members {
                    let _ = write!(out, "<member><name>{}</name>", escape(name));
                    value.write_xml(out);
                    out.push_str("</member>");
                }
                out.push_str("</struct>");
            }
            XmlRpcValue::Array(items) => {
                out.push_str("<array><data>");
                for item in items {
                    item.write_xml(out);
                }
                out.push_str("</data></array>");
            }
            XmlRpcValue::Nil => out.push_str("<nil/>"),
        }
        out.push_str("</value>");
    }

    fn from_value_node(node: &XmlNode) -> Result<Self, XmlRpcError> {
        expect_name(node, "value")?;
        let typed = match node.children.first() {
            // Untyped values are strings.
            None => return Ok(XmlRpcValue::String(node.text.clone())),
            Some(t) => t,
        };
        let text = typed.text.trim();
        let value = match typed.name.as_str() {
            "i4" | "int" => XmlRpcValue::Int(parse_scalar(text, "int")?),
            "boolean" => match text {
                "1" | "true" => XmlRpcValue::Boolean(true),
                "0" | "false" => XmlRpcValue::Boolean(false),
                _ => {
                    return Err(XmlRpcError::InvalidScalar {
                        kind: "boolean",
                        text: text.to_string(),
                    })
                }
            },
            "string" => XmlRpcValue::String(typed.text.clone()),
            "double" => XmlRpcValue::Double(parse_scalar(text, "double")?),
            "dateTime.iso8601" => XmlRpcValue::DateTime(text.to_string()),
            "base64" => {
                let compact: String = text.split_whitespace().collect();
                let bytes = STANDARD.decode(compact).map_err(|_| XmlRpcError::InvalidScalar {
                    kind: "base64",
                    text: text.to_string(),
                })?;
                XmlRpcValue::Base64(bytes)
            }
            "struct" => {
                let mut members = IndexMap::new();
                for member in &typed.children {
                    expect_name(member, "member")?;
                    let name = member
                        .child("name")
                        .ok_or(XmlRpcError::Malformed("struct member without <name>"))?;
                    let value = member
                        .child("value")
                        .ok_or(XmlRpcError::Malformed("struct member without <value>"))?;
                    members.insert(name.text.trim().to_string(), Self::from_value_node(value)?);
                }
                XmlRpcValue::Struct(members)
            }
            "array" => {
                let data = typed
                    .child("data")
                    .ok_or(XmlRpcError::Malformed("array without <data>"))?;
                let items = data
                    .children
                    .iter()
                    .map(Self::from_value_node)
                    .collect::<Result<Vec<_>, _>>()?;
                XmlRpcValue::Array(items)
            }
            "nil" => XmlRpcValue::Nil,
            other => {
                return Err(XmlRpcError::UnexpectedElement {
                    expected: "value type",
                    found: other.to_string(),
                })
            }
        };
        Ok(value)
    }
}

impl From<&str> for XmlRpcValue {
    fn from(s: &str) -> Self {
        XmlRpcValue::String(s.to_string())
    }
}

impl From<String> for XmlRpcValue {
    fn from(s: String) -> Self {
        XmlRpcValue::String(s)
    }
}

impl From<i32> for XmlRpcValue {
    fn from(i: i32) -> Self {
        XmlRpcValue::Int(i)
    }
}

impl From<bool> for XmlRpcValue {
    fn from(b: bool) -> Self {
        XmlRpcValue::Boolean(b)
    }
}

/// A decoded `<methodCall>`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct XmlRpcRequest {
    /// `None` when the envelope carried no (or an empty) `<methodName>`.
    pub method_name: Option<String>,
    pub params: Vec<XmlRpcValue>,
}

impl XmlRpcRequest {
    pub fn new(method_name: impl Into<String>, params: Vec<XmlRpcValue>) -> Self {
        Self {
            method_name: Some(method_name.into()),
            params,
        }
    }

    pub fn parse(body: &str) -> Result<Self, XmlRpcError> {
        let root = parse_document(body)?;
        expect_name(&root, "methodCall")?;
        let method_name = root
            .child("methodName")
            .map(|n| n.text.trim().to_string())
            .filter(|n| !n.is_empty());
        let params = match root.child("params") {
            Some(params) => parse_params(params)?,
            None => Vec::new(),
        };
        Ok(Self { method_name, params })
    }

    pub fn to_xml(&self) -> String {
        let mut out = String::from(r#"<?xml version="1.0"?><methodCall>"#);
        if let Some(name) = &self.method_name {
            let _ = write!(out, "<methodName>{}</methodName>", escape(name));
        }
        write_params(&mut out, &self.params);
        out.push_str("</methodCall>");
        out
    }
}

/// A `<methodResponse>`: either a single result value or a fault.
#[derive(Debug, Clone, PartialEq)]
pub enum XmlRpcResponse {
    Success(XmlRpcValue),
    Fault { code: i32, message: String },
}

impl XmlRpcResponse {
    pub fn fault(code: i32, message: impl Into<String>) -> Self {
        XmlRpcResponse::Fault {
            code,
            message: message.into(),
        }
    }

    pub fn is_fault(&self) -> bool {
        matches!(self, XmlRpcResponse::Fault { .. })
    }

    pub fn parse(body: &str) -> Result<Self, XmlRpcError> {
        let root = parse_document(body)?;
        expect_name(&root, "methodResponse")?;
        if let Some(fault) = root.child("fault") {
            let value = fault
                .child("value")
                .ok_or(XmlRpcError::Malformed("fault without <value>"))?;
            let value = XmlRpcValue::from_value_node(value)?;
            let members = value
                .as_struct()
                .ok_or(XmlRpcError::Malformed("fault value is not a struct"))?;
            let code = members
                .get("faultCode")
                .and_then(XmlRpcValue::as_i32)
                .ok_or(XmlRpcError::Malformed("fault without integer faultCode"))?;
            let message = members
                .get("faultString")
                .and_then(XmlRpcValue::as_str)
                .unwrap_or_default()
                .to_string();
            return Ok(XmlRpcResponse::Fault { code, message });
        }
        let params = root
            .child("params")
            .ok_or(XmlRpcError::Malformed("response without <params> or <fault>"))?;
        let value = parse_params(params)?
            .into_iter()
            .next()
            .unwrap_or(XmlRpcValue::Nil);
        Ok(XmlRpcResponse::Success(value))
    }

    pub fn to_xml(&self) -> String {
        let mut out = String::from(r#"<?xml version="1.0"?><methodResponse>"#);
        match self {
            XmlRpcResponse::Success(value) => write_params(&mut out, std::slice::from_ref(value)),
            XmlRpcResponse::Fault { code, message } => {
                let mut members = IndexMap::new();
                members.insert("faultCode".to_string(), XmlRpcValue::Int(*code));
                members.insert("faultString".to_string(), XmlRpcValue::String(message.clone()));
                out.push_str("<fault>");
                XmlRpcValue::Struct(members).write_xml(&mut out);
                out.push_str("</fault>");
            }
        }
        out.push_str("</methodResponse>");
        out
    }
}

fn parse_params(params: &XmlNode) -> Result<Vec<XmlRpcValue>, XmlRpcError> {
    params
        .children
        .iter()
        .map(|param| {
            expect_name(param, "param")?;
            let value = param
                .child("value")
                .ok_or(XmlRpcError::Malformed("param without <value>"))?;
            XmlRpcValue::from_value_node(value)
        })
        .collect()
}

fn write_params(out: &mut String, params: &[XmlRpcValue]) {
    out.push_str("<params>");
    for param in params {
        out.push_str("<param>");
        param.write_xml(out);
        out.push_str("</param>");
    }
    out.push_str("</params>");
}

fn expect_name(node: &XmlNode, expected: &'static str) -> Result<(), XmlRpcError> {
    if node.name == expected {
        Ok(())
    } else {
        Err(XmlRpcError::UnexpectedElement {
            expected,
            found: node.name.clone(),
        })
    }
}

fn parse_scalar<T: std::str::FromStr>(text: &str, kind: &'static str) -> Result<T, XmlRpcError> {
    text.parse().map_err(|_| XmlRpcError::InvalidScalar {
        kind,
        text: text.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deep_nesting_is_an_error() {
        let body = format!(
            "<?xml version=\"1.0\"?><methodCall><methodName>a</methodName><params><param>{}{}</param></params></methodCall>",
            "<value><array><data>".repeat(2_000),
            "</data></array></value>".repeat(2_000)
        );
        assert!(matches!(XmlRpcRequest::parse(&body), Err(XmlRpcError::Xml(XmlError::TooDeep))));
    }

    #[test]
    fn test_parse_login_call() {
        let body = r#"<?xml version="1.0"?>
            <methodCall>
              <methodName>login_to_simulator</methodName>
              <params>
                <param><value><struct>
                  <member><name>first</name><value><string>Test</string></value></member>
                  <member><name>agree</name><value><boolean>1</boolean></value></member>
                  <member><name>bare</name><value>plain</value></member>
                </struct></value></param>
                <param><value><array><data><value><i4>7</i4></value><value><nil/></value></data></array></value></param>
              </params>
            </methodCall>"#;
        let request = XmlRpcRequest::parse(body).unwrap();
        assert_eq!(request.method_name.as_deref(), Some("login_to_simulator"));
        assert_eq!(request.params.len(), 2);

        let members = request.params[0].as_struct().unwrap();
        assert_eq!(members["first"], XmlRpcValue::from("Test"));
        assert_eq!(members["agree"], XmlRpcValue::Boolean(true));
        assert_eq!(members["bare"], XmlRpcValue::from("plain"));
        assert_eq!(
            request.params[1],
            XmlRpcValue::Array(vec![XmlRpcValue::Int(7), XmlRpcValue::Nil])
        );
    }

    #[test]
    fn test_missing_method_name_is_none() {
        let request = XmlRpcRequest::parse("<?xml version=\"1.0\"?><methodCall><params/></methodCall>").unwrap();
        assert!(request.method_name.is_none());
        assert!(request.params.is_empty());
    }

    #[test]
    fn test_fault_envelope_shape() {
        let xml = XmlRpcResponse::fault(METHOD_NOT_FOUND, "Requested method [x] not found").to_xml();
        assert!(xml.contains("<name>faultCode</name><value><i4>-32601</i4></value>"));

        match XmlRpcResponse::parse(&xml).unwrap() {
            XmlRpcResponse::Fault { code, message } => {
                assert_eq!(code, METHOD_NOT_FOUND);
                assert_eq!(message, "Requested method [x] not found");
            }
            other => panic!("expected fault, got {:?}", other),
        }
    }

    #[test]
    fn test_escapes_string_content() {
        let xml = XmlRpcResponse::Success(XmlRpcValue::from("a<b & c")).to_xml();
        assert!(xml.contains("a&lt;b &amp; c"));
        assert_eq!(
            XmlRpcResponse::parse(&xml).unwrap(),
            XmlRpcResponse::Success(XmlRpcValue::from("a<b & c"))
        );
    }

    #[test]
    fn test_rejects_bad_scalar() {
        let body = "<methodCall><methodName>m</methodName><params><param><value><int>x</int></value></param></params></methodCall>";
        assert!(matches!(
            XmlRpcRequest::parse(body),
            Err(XmlRpcError::InvalidScalar { kind: "int", .. })
        ));
    }
}
