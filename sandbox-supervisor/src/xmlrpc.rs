//! Minimal XML-RPC codec: enough to call supervisord.
//!
//! Requests are written with [`quick_xml::Writer`]; responses are read into a
//! small element tree and then interpreted as a [`Value`] or a fault.

use std::collections::BTreeMap;

use quick_xml::escape::{escape, unescape};
use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::SupervisorError;

/// An XML-RPC value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Bool(bool),
    String(String),
    Double(f64),
    Array(Vec<Value>),
    Struct(BTreeMap<String, Value>),
    Nil,
}

impl Value {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Member of a struct value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Struct(members) => members.get(key),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

/// A decoded `methodResponse`.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Success(Value),
    Fault { code: i64, message: String },
}

/// Serialize a `methodCall` document.
pub fn encode_call(method: &str, params: &[Value]) -> String {
    let mut out = String::from("<?xml version=\"1.0\"?>\n<methodCall><methodName>");
    out.push_str(&escape(method));
    out.push_str("</methodName><params>");
    for param in params {
        out.push_str("<param>");
        encode_value(param, &mut out);
        out.push_str("</param>");
    }
    out.push_str("</params></methodCall>\n");
    out
}

fn encode_value(value: &Value, out: &mut String) {
    out.push_str("<value>");
    match value {
        Value::Int(i) => out.push_str(&format!("<int>{i}</int>")),
        Value::Bool(b) => out.push_str(&format!("<boolean>{}</boolean>", u8::from(*b))),
        Value::String(s) => {
            out.push_str("<string>");
            out.push_str(&escape(s.as_str()));
            out.push_str("</string>");
        }
        Value::Double(d) => out.push_str(&format!("<double>{d}</double>")),
        Value::Array(items) => {
            out.push_str("<array><data>");
            for item in items {
                encode_value(item, out);
            }
            out.push_str("</data></array>");
        }
        Value::Struct(members) => {
            out.push_str("<struct>");
            for (name, member) in members {
                out.push_str("<member><name>");
                out.push_str(&escape(name.as_str()));
                out.push_str("</name>");
                encode_value(member, out);
                out.push_str("</member>");
            }
            out.push_str("</struct>");
        }
        Value::Nil => out.push_str("<nil/>"),
    }
    out.push_str("</value>");
}

#[derive(Debug, Default)]
struct Element {
    name: String,
    text: String,
    children: Vec<Element>,
}

impl Element {
    fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }
}

fn xml_err(message: impl Into<String>) -> SupervisorError {
    SupervisorError::Xml(message.into())
}

fn unescape_text(raw: &[u8]) -> Result<String, SupervisorError> {
    let text = String::from_utf8_lossy(raw);
    unescape(&text)
        .map(|s| s.into_owned())
        .map_err(|e| xml_err(e.to_string()))
}

fn parse_tree(body: &str) -> Result<Element, SupervisorError> {
    let mut reader = Reader::from_str(body);
    let mut stack: Vec<Element> = vec![Element::default()];

    loop {
        match reader.read_event() {
            Ok(Event::Start(elem)) => stack.push(Element {
                name: String::from_utf8_lossy(elem.name().as_ref()).into_owned(),
                ..Element::default()
            }),
            Ok(Event::Empty(elem)) => {
                let node = Element {
                    name: String::from_utf8_lossy(elem.name().as_ref()).into_owned(),
                    ..Element::default()
                };
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(node);
                }
            }
            Ok(Event::End(_)) => {
                let node = stack.pop().ok_or_else(|| xml_err("unbalanced end tag"))?;
                let parent = stack
                    .last_mut()
                    .ok_or_else(|| xml_err("unbalanced end tag"))?;
                parent.children.push(node);
            }
            Ok(Event::Text(text)) => {
                let decoded = unescape_text(&text)?;
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&decoded);
                }
            }
            Ok(Event::GeneralRef(reference)) => {
                let entity = format!("&{};", String::from_utf8_lossy(&reference));
                let decoded = unescape(&entity).map_err(|e| xml_err(e.to_string()))?;
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&decoded);
                }
            }
            Ok(Event::CData(data)) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&data));
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(xml_err(format!(
                    "{e} at position {}",
                    reader.error_position()
                )))
            }
        }
    }

    if stack.len() != 1 {
        return Err(xml_err("unexpected end of document"));
    }
    stack.pop().ok_or_else(|| xml_err("empty document"))
}

fn parse_value(node: &Element) -> Result<Value, SupervisorError> {
    // A <value> without a type element is a string.
    let Some(typed) = node.children.first() else {
        return Ok(Value::String(node.text.clone()));
    };
    let text = typed.text.trim();
    match typed.name.as_str() {
        "int" | "i4" | "i8" => text
            .parse()
            .map(Value::Int)
            .map_err(|_| xml_err(format!("bad integer {text:?}"))),
        "boolean" => match text {
            "1" => Ok(Value::Bool(true)),
            "0" => Ok(Value::Bool(false)),
            other => Err(xml_err(format!("bad boolean {other:?}"))),
        },
        "double" => text
            .parse()
            .map(Value::Double)
            .map_err(|_| xml_err(format!("bad double {text:?}"))),
        "string" => Ok(Value::String(typed.text.clone())),
        "nil" => Ok(Value::Nil),
        "array" => {
            let data = typed
                .child("data")
                .ok_or_else(|| xml_err("array without data"))?;
            data.children_named("value")
                .map(parse_value)
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array)
        }
        "struct" => {
            let mut members = BTreeMap::new();
            for member in typed.children_named("member") {
                let name = member
                    .child("name")
                    .ok_or_else(|| xml_err("struct member without name"))?;
                let value = member
                    .child("value")
                    .ok_or_else(|| xml_err("struct member without value"))?;
                members.insert(name.text.clone(), parse_value(value)?);
            }
            Ok(Value::Struct(members))
        }
        other => Err(xml_err(format!("unsupported value type <{other}>"))),
    }
}

/// Decode a `methodResponse` document.
pub fn decode_response(body: &str) -> Result<Response, SupervisorError> {
    let document = parse_tree(body)?;
    let response = document
        .child("methodResponse")
        .ok_or_else(|| xml_err("missing methodResponse"))?;

    if let Some(fault) = response.child("fault") {
        let value = fault
            .child("value")
            .map(parse_value)
            .transpose()?
            .ok_or_else(|| xml_err("fault without value"))?;
        let code = value
            .get("faultCode")
            .and_then(Value::as_i64)
            .ok_or_else(|| xml_err("fault without faultCode"))?;
        let message = value
            .get("faultString")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        return Ok(Response::Fault { code, message });
    }

    let value = response
        .child("params")
        .and_then(|p| p.child("param"))
        .and_then(|p| p.child("value"))
        .ok_or_else(|| xml_err("response without a param value"))?;
    Ok(Response::Success(parse_value(value)?))
}
