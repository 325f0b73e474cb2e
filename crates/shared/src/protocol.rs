use std::fmt;

use serde::{
    de::{MapAccess, Visitor},
    ser::SerializeMap,
    Deserialize, Deserializer, Serialize, Serializer,
};

use crate::{
    domain::{LineNumber, Opcode},
    error::EngineError,
};

/// Emitted if serializing an envelope ever fails, so the caller still
/// receives exactly one well-formed error frame.
const FALLBACK_ERROR_FRAME: &str = r#"{"status":"error","opcode":"","payload":null}"#;

/// One inbound command frame.
///
/// Older browser clients send `message`, `cond` and `lineNum`; both
/// spellings decode to the same fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandEnvelope {
    #[serde(alias = "message")]
    pub opcode: String,
    #[serde(default)]
    pub path: String,
    #[serde(default, alias = "cond")]
    pub condition: String,
    #[serde(default)]
    pub value: String,
    #[serde(
        default,
        rename = "lineNumber",
        alias = "lineNum",
        deserialize_with = "line_number_text",
        skip_serializing_if = "String::is_empty"
    )]
    pub line_number: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawLineNumber {
    Text(String),
    Number(u64),
    Other(serde_json::Value),
}

/// Keeps whatever the client sent as text; only the line opcodes parse it.
fn line_number_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<RawLineNumber>::deserialize(deserializer)? {
        Some(RawLineNumber::Text(text)) => text,
        Some(RawLineNumber::Number(number)) => number.to_string(),
        Some(RawLineNumber::Other(value)) => value.to_string(),
        None => String::new(),
    })
}

impl CommandEnvelope {
    pub fn new(opcode: Opcode) -> Self {
        Self {
            opcode: opcode.as_str().to_string(),
            ..Self::default()
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = condition.into();
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = value.into();
        self
    }

    pub fn with_line(mut self, line: u64) -> Self {
        self.line_number = line.to_string();
        self
    }

    pub fn decode(text: &str) -> Result<Self, EngineError> {
        serde_json::from_str(text)
            .map_err(|error| EngineError::Protocol(format!("malformed command: {error}")))
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn opcode(&self) -> Result<Opcode, EngineError> {
        self.opcode.parse()
    }

    pub fn line_number(&self) -> Result<LineNumber, EngineError> {
        self.line_number.parse()
    }
}

/// Flat string map that keeps the order its producer inserted entries in.
///
/// File buffers rely on this to reach the client in ascending line order,
/// which a sorted string map would break once line 10 appears.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Payload(Vec<(String, String)>);

impl Payload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self(vec![(key.into(), value.into())])
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.push((key.into(), value.into()));
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .rev()
            .find(|(candidate, _)| candidate == key)
            .map(|(_, value)| value.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(k, _)| k.as_str())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Payload {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl Serialize for Payload {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, value) in &self.0 {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Payload {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(PayloadVisitor)
    }
}

struct PayloadVisitor;

impl<'de> Visitor<'de> for PayloadVisitor {
    type Value = Payload;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a flat map of string values")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Payload, A::Error> {
        let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
        while let Some(entry) = access.next_entry::<String, String>()? {
            entries.push(entry);
        }
        Ok(Payload(entries))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Success,
    Error,
}

/// One outbound result frame; every command produces exactly one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultEnvelope {
    pub status: Status,
    pub opcode: String,
    pub payload: Option<Payload>,
}

#[derive(Serialize)]
struct WireEnvelope<'a> {
    status: Status,
    opcode: &'a str,
    payload: Option<&'a Payload>,
}

/// Serializes a result frame without taking ownership of its parts.
pub fn encode(status: Status, opcode: &str, payload: Option<&Payload>) -> String {
    serde_json::to_string(&WireEnvelope {
        status,
        opcode,
        payload,
    })
    .unwrap_or_else(|_| FALLBACK_ERROR_FRAME.to_string())
}

impl ResultEnvelope {
    pub fn success(opcode: Opcode, payload: Option<Payload>) -> Self {
        Self {
            status: Status::Success,
            opcode: opcode.as_str().to_string(),
            payload,
        }
    }

    pub fn error(opcode: Opcode, payload: Option<Payload>) -> Self {
        Self {
            status: Status::Error,
            opcode: opcode.as_str().to_string(),
            payload,
        }
    }

    /// Error for a frame that could not be routed to any operation.
    pub fn rejected(raw_opcode: &str, reason: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            opcode: raw_opcode.to_string(),
            payload: Some(Payload::single("error", reason)),
        }
    }

    pub fn unknown_opcode(raw_opcode: &str, path: &str) -> Self {
        let mut payload = Payload::single("error", "unknown opcode");
        payload.push("opcode", raw_opcode);
        payload.push("path", path);
        Self {
            status: Status::Error,
            opcode: raw_opcode.to_string(),
            payload: Some(payload),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }

    pub fn encode(&self) -> String {
        encode(self.status, &self.opcode, self.payload.as_ref())
    }

    pub fn decode(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
#[path = "tests/protocol_tests.rs"]
mod tests;
