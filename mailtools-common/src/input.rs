//! The input shapes a [`Recipients`] collection accepts.
//!
//! Each shape has its own variant, so ingestion resolves what it was given
//! once, at the boundary, instead of probing types as it walks the input.

use std::{fmt, io::BufRead};

use serde_json::Value;

use crate::{
    error::{RecipientError, Result},
    recipient::{MergeData, Recipient},
    recipients::Recipients,
};

pub enum RecipientInput {
    /// Newline-separated recipient tokens, or a JSON object of
    /// address to merge data when the text starts with `{"`.
    Text(String),
    /// An address with its merge data.
    Pair(String, MergeData),
    /// Address to merge data; a `null` value means no data.
    Map(serde_json::Map<String, Value>),
    /// A stream read line by line.
    Reader(Box<dyn BufRead + Send>),
    List(Vec<RecipientInput>),
    Recipient(Recipient),
}

impl RecipientInput {
    pub fn reader(reader: impl BufRead + Send + 'static) -> Self {
        Self::Reader(Box::new(reader))
    }

    pub(crate) fn ingest(self, recipients: &mut Recipients) -> Result<()> {
        match self {
            Self::Text(text) => ingest_text(&text, recipients),
            Self::Pair(address, data) => recipients.push(Recipient::new(&address, data)?),
            Self::Map(map) => ingest_map(map, recipients),
            Self::Reader(reader) => {
                for line in reader.lines() {
                    ingest_line(&line?, recipients)?;
                }
                Ok(())
            }
            Self::List(items) => items
                .into_iter()
                .try_for_each(|item| item.ingest(recipients)),
            Self::Recipient(recipient) => recipients.push(recipient),
        }
    }
}

fn ingest_line(line: &str, recipients: &mut Recipients) -> Result<()> {
    if line.trim().is_empty() {
        return Ok(());
    }
    recipients.push(Recipient::parse(line)?)
}

fn ingest_text(text: &str, recipients: &mut Recipients) -> Result<()> {
    if text.trim_start().starts_with("{\"") {
        return match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(map)) => ingest_map(map, recipients),
            Ok(_) => Err(RecipientError::malformed(text, "expected a JSON object")),
            Err(e) => Err(RecipientError::malformed(text, e.to_string())),
        };
    }

    text.lines()
        .try_for_each(|line| ingest_line(line, recipients))
}

fn ingest_map(map: serde_json::Map<String, Value>, recipients: &mut Recipients) -> Result<()> {
    for (address, value) in map {
        let data = match value {
            Value::Object(data) => data,
            Value::Null => MergeData::new(),
            other => {
                return Err(RecipientError::malformed(
                    &address,
                    format!("merge data must be an object, found {other}"),
                ));
            }
        };
        recipients.push(Recipient::new(&address, data)?)?;
    }
    Ok(())
}

impl fmt::Debug for RecipientInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Self::Pair(address, data) => f.debug_tuple("Pair").field(address).field(data).finish(),
            Self::Map(map) => f.debug_tuple("Map").field(map).finish(),
            Self::Reader(_) => f.write_str("Reader(..)"),
            Self::List(items) => f.debug_tuple("List").field(items).finish(),
            Self::Recipient(recipient) => f.debug_tuple("Recipient").field(recipient).finish(),
        }
    }
}

impl From<&str> for RecipientInput {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for RecipientInput {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&String> for RecipientInput {
    fn from(value: &String) -> Self {
        Self::Text(value.clone())
    }
}

impl<S: Into<String>> From<(S, MergeData)> for RecipientInput {
    fn from((address, data): (S, MergeData)) -> Self {
        Self::Pair(address.into(), data)
    }
}

impl From<serde_json::Map<String, Value>> for RecipientInput {
    fn from(value: serde_json::Map<String, Value>) -> Self {
        Self::Map(value)
    }
}

impl From<Recipient> for RecipientInput {
    fn from(value: Recipient) -> Self {
        Self::Recipient(value)
    }
}

impl<T: Into<Self>> From<Vec<T>> for RecipientInput {
    fn from(value: Vec<T>) -> Self {
        value.into_iter().collect()
    }
}

impl<T: Into<Self>> FromIterator<T> for RecipientInput {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::List(iter.into_iter().map(Into::into).collect())
    }
}

/// Resolves a JSON document into an input shape: a string is text, an
/// `[address, {data}]` pair is one recipient, any other array is a list
/// and an object is an address map.
impl TryFrom<Value> for RecipientInput {
    type Error = RecipientError;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::String(text) => Ok(Self::Text(text)),
            Value::Object(map) => Ok(Self::Map(map)),
            Value::Null => Ok(Self::List(Vec::new())),
            Value::Array(items) => match <[Value; 2]>::try_from(items) {
                Ok([Value::String(address), Value::Object(data)]) => Ok(Self::Pair(address, data)),
                Ok(pair) => pair.into_iter().map(Self::try_from).collect::<Result<_>>().map(Self::List),
                Err(items) => items
                    .into_iter()
                    .map(Self::try_from)
                    .collect::<Result<_>>()
                    .map(Self::List),
            },
            other => Err(RecipientError::malformed(
                &other.to_string(),
                "not a recipient shape",
            )),
        }
    }
}
