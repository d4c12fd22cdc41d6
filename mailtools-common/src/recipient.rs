//! A single addressee and its mail-merge data.
//!
//! Recipients arrive in a handful of textual shorthands. [`Recipient::parse`]
//! tries each shape in turn and the first one that matches wins:
//!
//! 1. `address {"json":"object"}`
//! 2. `address`, `address Name`, or separator-delimited fields using the
//!    first comma, pipe or tab after the address:
//!    `address|Name|key=value;key=value`
//! 3. an `local@domain` substring embedded anywhere in the token
//! 4. a 32 digit hexadecimal (pre-hashed) identifier
//! 5. the whole token, verbatim
//!
//! The serialised record form, used by the spill store and by queue files,
//! is `address` alone or `address<TAB><json>` when merge data is present.
//! It is read back with [`Recipient::from_record`], which splits on the
//! tab only, so addresses holding spaces, commas or pipes survive.

use std::{fmt, sync::LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    address,
    error::{RecipientError, Result},
};

/// Merge data attached to a recipient.
pub type MergeData = serde_json::Map<String, Value>;

/// Key under which a recipient's display name is stored.
pub const NAME_FIELD: &str = "name";

#[allow(clippy::unwrap_used)]
static JSON_FORM: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\S+)\s+(\{.*\})").unwrap());

#[allow(clippy::unwrap_used)]
static EMBEDDED_ADDRESS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\w[\w.\-+=']*@\w[\w.\-]+\w)").unwrap());

#[allow(clippy::unwrap_used)]
static HASHED_PREFIX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(?i)([0-9a-f]{32})\b").unwrap());

#[allow(clippy::unwrap_used)]
static DATA_FIELD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"^(\{"?\w|\w+=)"#).unwrap());

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    address: String,
    #[serde(default)]
    data: MergeData,
}

impl Recipient {
    /// Build a recipient from an address and its merge data, normalising
    /// the address.
    ///
    /// # Errors
    ///
    /// [`RecipientError::MalformedRecipient`] for an empty address, or
    /// [`RecipientError::InvalidAddress`] when normalisation fails.
    pub fn new(address: &str, data: MergeData) -> Result<Self> {
        let trimmed = address.trim();
        if trimmed.is_empty() {
            return Err(RecipientError::malformed(address, "empty address"));
        }

        let address =
            address::normalize(trimmed).map_err(|source| RecipientError::InvalidAddress {
                address: trimmed.to_string(),
                source,
            })?;

        Ok(Self { address, data })
    }

    /// Parse one raw recipient token.
    ///
    /// # Errors
    ///
    /// [`RecipientError::MalformedRecipient`] when no shape yields an
    /// address or the merge data is unreadable, and
    /// [`RecipientError::InvalidAddress`] when the address fails
    /// normalisation.
    pub fn parse(token: &str) -> Result<Self> {
        let token = token.trim();

        if let Some(captures) = JSON_FORM.captures(token) {
            let data = parse_json_object(token, &captures[2])?;
            return Self::new(&captures[1], data);
        }

        if let Some((address, data)) = split_fields(token)? {
            return Self::new(address, data);
        }

        if let Some(found) = EMBEDDED_ADDRESS.captures(token) {
            return Self::new(&found[1], MergeData::new());
        }

        if let Some(found) = HASHED_PREFIX.captures(token) {
            return Self::new(&found[1], MergeData::new());
        }

        if token.is_empty() {
            return Err(RecipientError::malformed(token, "empty recipient"));
        }

        Self::new(token, MergeData::new())
    }

    /// Read one line of the record form written by [`fmt::Display`].
    ///
    /// # Errors
    ///
    /// [`RecipientError::MalformedRecipient`] for an empty line or merge
    /// data that is not a JSON object, and
    /// [`RecipientError::InvalidAddress`] when the address fails
    /// normalisation.
    pub fn from_record(line: &str) -> Result<Self> {
        let line = line.trim_end_matches(['\r', '\n']);

        match line.split_once('\t') {
            Some((address, data)) => Self::new(address, parse_json_object(line, data)?),
            None => Self::new(line, MergeData::new()),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub const fn data(&self) -> &MergeData {
        &self.data
    }

    pub fn into_parts(self) -> (String, MergeData) {
        (self.address, self.data)
    }

    /// The display name carried in the merge data, if any.
    pub fn name(&self) -> Option<&str> {
        self.data.get(NAME_FIELD).and_then(Value::as_str)
    }

    /// Returns `true` when the address is a pre-hashed identifier.
    pub fn is_hashed(&self) -> bool {
        address::is_hashed(&self.address)
    }
}

/// Writes the record form: `address` or `address<TAB><json>`.
impl fmt::Display for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.data.is_empty() {
            return f.write_str(&self.address);
        }

        let data = serde_json::to_string(&self.data).map_err(|_| fmt::Error)?;
        write!(f, "{}\t{data}", self.address)
    }
}

impl std::str::FromStr for Recipient {
    type Err = RecipientError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_record(s)
    }
}

/// Handles shape 2: an address optionally followed by separator-delimited
/// fields. Returns `None` when the token starts with a separator, leaving
/// it to the later shapes.
fn split_fields(token: &str) -> Result<Option<(&str, MergeData)>> {
    let is_separator = |ch: char| ch.is_whitespace() || ch == ',' || ch == '|';

    let Some((index, separator)) = token.char_indices().find(|&(_, ch)| is_separator(ch)) else {
        if token.is_empty() {
            return Ok(None);
        }
        return Ok(Some((token, MergeData::new())));
    };

    if index == 0 {
        return Ok(None);
    }

    if separator == ' ' {
        let (address, name) = token.split_at(index);
        let mut data = MergeData::new();
        data.insert(NAME_FIELD.to_string(), Value::String(name.trim().to_string()));
        return Ok(Some((address, data)));
    }

    let mut fields: Vec<&str> = token.split(separator).map(str::trim).collect();
    while fields.len() > 1 && fields.last().is_some_and(|f| f.is_empty()) {
        fields.pop();
    }

    let address = fields[0];
    let data = match &fields[1..] {
        [] => MergeData::new(),
        [only] if DATA_FIELD.is_match(only) => parse_data(token, only)?,
        [only] => {
            let mut data = MergeData::new();
            data.insert(NAME_FIELD.to_string(), Value::String((*only).to_string()));
            data
        }
        [name, .., last] => {
            let mut data = parse_data(token, last)?;
            data.insert(NAME_FIELD.to_string(), Value::String((*name).to_string()));
            data
        }
    };

    Ok(Some((address, data)))
}

/// Parse a merge-data string: either a JSON object or
/// `key=value;key=value`. Anything else carries no data.
///
/// # Errors
///
/// [`RecipientError::MalformedRecipient`] when the JSON is unreadable or a
/// pair lacks its `=`.
pub fn parse_data(token: &str, data: &str) -> Result<MergeData> {
    let data = data.trim();

    if data.starts_with('{') {
        return parse_json_object(token, data);
    }

    if !DATA_FIELD.is_match(data) {
        return Ok(MergeData::new());
    }

    let mut fields = MergeData::new();
    for pair in data.split(';').map(str::trim).filter(|p| !p.is_empty()) {
        let Some((key, value)) = pair.split_once('=') else {
            return Err(RecipientError::malformed(
                token,
                format!("field {pair:?} is not key=value"),
            ));
        };
        fields.insert(
            key.trim().to_string(),
            Value::String(value.trim().to_string()),
        );
    }

    Ok(fields)
}

fn parse_json_object(token: &str, json: &str) -> Result<MergeData> {
    match serde_json::from_str::<Value>(json) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(RecipientError::malformed(
            token,
            "merge data is not a JSON object",
        )),
        Err(e) => Err(RecipientError::malformed(token, e.to_string())),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn data(value: Value) -> MergeData {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_address_with_json() {
        let r = Recipient::parse(r#"pat@example.com {"name":"Pat"}"#).unwrap();
        assert_eq!(r.address(), "pat@example.com");
        assert_eq!(r.data(), &data(json!({"name": "Pat"})));
        assert_eq!(r.name(), Some("Pat"));
    }

    #[test]
    fn test_bare_address() {
        let r = Recipient::parse("  pat@Example.com\n").unwrap();
        assert_eq!(r.address(), "pat@example.com");
        assert!(r.data().is_empty());
    }

    #[test]
    fn test_address_and_name() {
        let r = Recipient::parse("pat@example.com Pat Smith").unwrap();
        assert_eq!(r.address(), "pat@example.com");
        assert_eq!(r.name(), Some("Pat Smith"));
    }

    #[test]
    fn test_delimited_name_and_fields() {
        let r = Recipient::parse("pat@example.com|Pat|city=Paris; zip = 75001").unwrap();
        assert_eq!(
            r.data(),
            &data(json!({"name": "Pat", "city": "Paris", "zip": "75001"}))
        );

        let r = Recipient::parse("pat@example.com, Pat, ignored, level=3").unwrap();
        assert_eq!(r.data(), &data(json!({"name": "Pat", "level": "3"})));
    }

    #[test]
    fn test_delimited_single_field() {
        let r = Recipient::parse("pat@example.com,Pat").unwrap();
        assert_eq!(r.data(), &data(json!({"name": "Pat"})));

        let r = Recipient::parse("pat@example.com|city=Paris").unwrap();
        assert_eq!(r.data(), &data(json!({"city": "Paris"})));

        let r = Recipient::parse("pat@example.com\t{\"name\":\"Pat\",\"n\":1}").unwrap();
        assert_eq!(r.data(), &data(json!({"name": "Pat", "n": 1})));
    }

    #[test]
    fn test_trailing_separator_carries_no_data() {
        let r = Recipient::parse("pat@example.com,").unwrap();
        assert!(r.data().is_empty());
    }

    #[test]
    fn test_embedded_address() {
        let r = Recipient::parse(", Pat <pat@example.com>").unwrap();
        assert_eq!(r.address(), "pat@example.com");
    }

    #[test]
    fn test_hashed_identifier() {
        let r = Recipient::parse("0123456789ABCDEF0123456789abcdef").unwrap();
        assert_eq!(r.address(), "0123456789abcdef0123456789abcdef");
        assert!(r.is_hashed());
    }

    #[test]
    fn test_empty_token_is_malformed() {
        assert!(matches!(
            Recipient::parse("   "),
            Err(RecipientError::MalformedRecipient { .. })
        ));
    }

    #[test]
    fn test_bad_json_is_malformed() {
        assert!(matches!(
            Recipient::parse(r#"pat@example.com {"name":}"#),
            Err(RecipientError::MalformedRecipient { .. })
        ));
        assert!(matches!(
            Recipient::parse("pat@example.com|x|nokeyvalue=1;broken"),
            Err(RecipientError::MalformedRecipient { .. })
        ));
    }

    #[test]
    fn test_invalid_address() {
        assert!(matches!(
            Recipient::parse("not-an-address"),
            Err(RecipientError::InvalidAddress { .. })
        ));
    }

    #[test]
    fn test_record_form() {
        let plain = Recipient::parse("you@example.com").unwrap();
        assert_eq!(plain.to_string(), "you@example.com");

        let merged = Recipient::parse(r#"you@example.com {"name":"You"}"#).unwrap();
        assert_eq!(merged.to_string(), "you@example.com\t{\"name\":\"You\"}");
        assert_eq!(Recipient::parse(&merged.to_string()).unwrap(), merged);
    }

    #[test]
    fn test_record_form_keeps_separators_in_address() {
        for recipient in [
            Recipient::new("a|b@example.com", MergeData::new()).unwrap(),
            Recipient::new("a,b@example.com", data(json!({"name": "A, B"}))).unwrap(),
            Recipient::new(r#""pat smith"@example.com"#, MergeData::new()).unwrap(),
            Recipient::new(r#""pat smith"@example.com"#, data(json!({"n": 1}))).unwrap(),
        ] {
            let record = recipient.to_string();
            assert_eq!(Recipient::from_record(&record).unwrap(), recipient);
            assert_eq!(record.parse::<Recipient>().unwrap(), recipient);
        }
    }

    #[test]
    fn test_record_form_rejects_bad_data() {
        assert!(matches!(
            Recipient::from_record("pat@example.com\t[1,2]"),
            Err(RecipientError::MalformedRecipient { .. })
        ));
        assert!(matches!(
            Recipient::from_record(""),
            Err(RecipientError::MalformedRecipient { .. })
        ));
    }

    #[test]
    fn test_text_after_json_is_ignored() {
        let r = Recipient::parse(r#"pat@example.com {"name":"Pat"} trailing"#).unwrap();
        assert_eq!(r.address(), "pat@example.com");
        assert_eq!(r.data(), &data(json!({"name": "Pat"})));
    }
}
