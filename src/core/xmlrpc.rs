//! Minimal XML-RPC codec covering the subset TestLink speaks.
//!
//! Requests are a `methodCall` carrying one `<struct>` parameter; responses
//! are decoded into [`serde_json::Value`] (strings, ints, booleans, doubles,
//! structs, arrays). `<fault>` responses become [`XmlRpcError::Fault`].

use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum XmlRpcError {
    /// The server answered with a `<fault>` element
    #[error("XML-RPC fault {code}: {message}")]
    Fault { code: i64, message: String },

    /// The payload is not the XML-RPC subset this codec understands
    #[error("malformed XML-RPC response: {0}")]
    Parse(String),
}

/// Encodes a method call with a single struct parameter
pub fn encode_request(method: &str, params: &Map<String, Value>) -> String {
    let mut out = String::with_capacity(256);
    out.push_str("<?xml version=\"1.0\"?>");
    out.push_str("<methodCall><methodName>");
    escape_into(method, &mut out);
    out.push_str("</methodName><params><param>");
    encode_value(&Value::Object(params.clone()), &mut out);
    out.push_str("</param></params></methodCall>");
    out
}

fn encode_value(value: &Value, out: &mut String) {
    out.push_str("<value>");
    match value {
        Value::Null => out.push_str("<nil/>"),
        Value::Bool(b) => {
            out.push_str("<boolean>");
            out.push_str(if *b { "1" } else { "0" });
            out.push_str("</boolean>");
        }
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                out.push_str("<int>");
                out.push_str(&i.to_string());
                out.push_str("</int>");
            } else {
                out.push_str("<double>");
                out.push_str(&n.to_string());
                out.push_str("</double>");
            }
        }
        Value::String(s) => {
            out.push_str("<string>");
            escape_into(s, out);
            out.push_str("</string>");
        }
        Value::Array(items) => {
            out.push_str("<array><data>");
            for item in items {
                encode_value(item, out);
            }
            out.push_str("</data></array>");
        }
        Value::Object(members) => {
            out.push_str("<struct>");
            for (name, member) in members {
                out.push_str("<member><name>");
                escape_into(name, out);
                out.push_str("</name>");
                encode_value(member, out);
                out.push_str("</member>");
            }
            out.push_str("</struct>");
        }
    }
    out.push_str("</value>");
}

fn escape_into(text: &str, out: &mut String) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
}

/// Decodes a `methodResponse`, returning the single result value
pub fn decode_response(xml: &str) -> Result<Value, XmlRpcError> {
    let mut parser = Parser::new(xml);
    parser.skip_prolog();
    parser.expect_open("methodResponse")?;

    if parser.try_open("fault") {
        let fault = parser.parse_value()?;
        parser.expect_close("fault")?;
        parser.expect_close("methodResponse")?;
        return Err(fault_from_value(&fault));
    }

    parser.expect_open("params")?;
    parser.expect_open("param")?;
    let value = parser.parse_value()?;
    parser.expect_close("param")?;
    parser.expect_close("params")?;
    parser.expect_close("methodResponse")?;
    Ok(value)
}

fn fault_from_value(fault: &Value) -> XmlRpcError {
    let code = fault
        .get("faultCode")
        .and_then(|c| c.as_i64().or_else(|| c.as_str().and_then(|s| s.parse().ok())))
        .unwrap_or(0);
    let message = fault
        .get("faultString")
        .and_then(|m| m.as_str())
        .unwrap_or("unknown fault")
        .to_string();
    XmlRpcError::Fault { code, message }
}

/// Recursive-descent reader over the fixed XML-RPC element grammar.
///
/// Not a general XML parser: no attributes, no comments, no CDATA. That is
/// the shape PHP's xmlrpc layer emits and all TestLink responses fit it.
struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn skip_ws(&mut self) {
        let trimmed = self.rest().trim_start();
        self.pos = self.input.len() - trimmed.len();
    }

    fn skip_prolog(&mut self) {
        self.skip_ws();
        if self.rest().starts_with("<?xml") {
            match self.rest().find("?>") {
                Some(end) => self.pos += end + 2,
                None => self.pos = self.input.len(),
            }
        }
    }

    fn eat(&mut self, token: &str) -> bool {
        if self.rest().starts_with(token) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    fn expect_open(&mut self, name: &str) -> Result<(), XmlRpcError> {
        self.skip_ws();
        if self.eat_tag('<', name) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("<{name}>")))
        }
    }

    fn expect_close(&mut self, name: &str) -> Result<(), XmlRpcError> {
        if self.at_close(name) {
            self.pos += 2 + name.len() + 1;
            Ok(())
        } else {
            Err(self.unexpected(&format!("</{name}>")))
        }
    }

    fn try_open(&mut self, name: &str) -> bool {
        self.skip_ws();
        self.eat_tag('<', name)
    }

    fn eat_tag(&mut self, open: char, name: &str) -> bool {
        let rest = self.rest();
        if rest.starts_with(open) && rest[1..].starts_with(name) {
            let after = &rest[1 + name.len()..];
            if after.starts_with('>') {
                self.pos += 1 + name.len() + 1;
                return true;
            }
        }
        false
    }

    fn at_close(&mut self, name: &str) -> bool {
        self.skip_ws();
        let rest = self.rest();
        rest.starts_with("</") && rest[2..].starts_with(name) && rest[2 + name.len()..].starts_with('>')
    }

    fn unexpected(&self, wanted: &str) -> XmlRpcError {
        let got: String = self.rest().chars().take(24).collect();
        XmlRpcError::Parse(format!("expected {wanted} at byte {}, found '{got}'", self.pos))
    }

    /// Raw character data up to the next '<', entities resolved
    fn text(&mut self) -> Result<String, XmlRpcError> {
        let end = self
            .rest()
            .find('<')
            .ok_or_else(|| self.unexpected("character data"))?;
        let raw = &self.rest()[..end];
        self.pos += end;
        unescape(raw)
    }

    /// Parses one `<value>...</value>` element
    fn parse_value(&mut self) -> Result<Value, XmlRpcError> {
        self.expect_open("value")?;
        let raw = self.text()?;

        // An untyped value is a string: `<value>text</value>`
        if self.at_close("value") {
            self.expect_close("value")?;
            return Ok(Value::String(raw));
        }
        if !raw.trim().is_empty() {
            return Err(self.unexpected("</value> after character data"));
        }

        let value = self.parse_typed()?;
        self.expect_close("value")?;
        Ok(value)
    }

    fn parse_typed(&mut self) -> Result<Value, XmlRpcError> {
        self.skip_ws();
        if self.eat("<nil/>") {
            return Ok(Value::Null);
        }
        if self.try_open("string") {
            let text = self.text()?;
            self.expect_close("string")?;
            return Ok(Value::String(text));
        }
        for int_tag in ["int", "i4"] {
            if self.try_open(int_tag) {
                let text = self.text()?;
                self.expect_close(int_tag)?;
                let parsed: i64 = text
                    .trim()
                    .parse()
                    .map_err(|_| XmlRpcError::Parse(format!("invalid integer '{text}'")))?;
                return Ok(Value::from(parsed));
            }
        }
        if self.try_open("boolean") {
            let text = self.text()?;
            self.expect_close("boolean")?;
            return Ok(Value::Bool(text.trim() == "1"));
        }
        if self.try_open("double") {
            let text = self.text()?;
            self.expect_close("double")?;
            let parsed: f64 = text
                .trim()
                .parse()
                .map_err(|_| XmlRpcError::Parse(format!("invalid double '{text}'")))?;
            return Ok(Value::from(parsed));
        }
        if self.try_open("dateTime.iso8601") {
            let text = self.text()?;
            self.expect_close("dateTime.iso8601")?;
            return Ok(Value::String(text));
        }
        if self.try_open("base64") {
            let text = self.text()?;
            self.expect_close("base64")?;
            return Ok(Value::String(text));
        }
        if self.try_open("struct") {
            let mut members = Map::new();
            while !self.at_close("struct") {
                self.expect_open("member")?;
                self.expect_open("name")?;
                let name = self.text()?;
                self.expect_close("name")?;
                let value = self.parse_value()?;
                self.expect_close("member")?;
                members.insert(name, value);
            }
            self.expect_close("struct")?;
            return Ok(Value::Object(members));
        }
        if self.try_open("array") {
            self.expect_open("data")?;
            let mut items = Vec::new();
            while !self.at_close("data") {
                items.push(self.parse_value()?);
            }
            self.expect_close("data")?;
            self.expect_close("array")?;
            return Ok(Value::Array(items));
        }
        Err(self.unexpected("a value type element"))
    }
}

fn unescape(raw: &str) -> Result<String, XmlRpcError> {
    if !raw.contains('&') {
        return Ok(raw.to_string());
    }
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.char_indices();
    while let Some((idx, ch)) = chars.next() {
        if ch != '&' {
            out.push(ch);
            continue;
        }
        let entity_end = raw[idx..]
            .find(';')
            .ok_or_else(|| XmlRpcError::Parse(format!("unterminated entity in '{raw}'")))?;
        let entity = &raw[idx + 1..idx + entity_end];
        match entity {
            "amp" => out.push('&'),
            "lt" => out.push('<'),
            "gt" => out.push('>'),
            "quot" => out.push('"'),
            "apos" => out.push('\''),
            _ => {
                let code = entity
                    .strip_prefix("#x")
                    .map(|hex| u32::from_str_radix(hex, 16))
                    .or_else(|| entity.strip_prefix('#').map(|dec| dec.parse()))
                    .and_then(|parsed| parsed.ok())
                    .and_then(char::from_u32)
                    .ok_or_else(|| XmlRpcError::Parse(format!("unknown entity '&{entity};'")))?;
                out.push(code);
            }
        }
        // Consume the rest of the entity
        for _ in 0..entity_end {
            chars.next();
        }
    }
    Ok(out)
}
