//! The flat-text queue file:
//!
//! ```text
//! <return-path>
//! <address>[<TAB><json-data>]
//! ...
//! <blank line>
//! <raw message body>
//! ```

use mailtools_common::{Message, Recipient, Recipients};

use crate::error::{Result, SpoolError};

/// Render `message` as a queue file. The body is written verbatim.
///
/// # Errors
///
/// If a spilled recipient list cannot be read back.
pub fn serialize(message: &Message) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(message.body().len() + 128);
    message
        .recipients()
        .write_to(&mut out, Some(message.return_path()))?;

    out.push(b'\n');
    out.extend_from_slice(message.body().as_bytes());
    Ok(out)
}

/// Parse a queue file back into a message.
///
/// # Errors
///
/// [`SpoolError::MalformedQueueFile`] when the return path or the blank
/// separator line is missing, or a recipient line does not parse. No
/// partial message is returned.
pub fn deserialize(text: &str) -> Result<Message> {
    let (envelope, body) = split_envelope(text)?;
    let mut lines = envelope.lines();

    let return_path = lines
        .next()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .ok_or_else(|| SpoolError::malformed("missing return path"))?;

    let mut recipients = Recipients::new();
    for line in lines {
        let recipient = Recipient::from_record(line)
            .map_err(|e| SpoolError::malformed(format!("bad recipient line: {e}")))?;
        recipients.push(recipient)?;
    }

    Ok(Message::new(body, return_path, recipients))
}

/// Splits at the first blank line. The envelope keeps no trailing newline;
/// the body starts right after the separator.
fn split_envelope(text: &str) -> Result<(&str, &str)> {
    if let Some(body) = text.strip_prefix('\n') {
        return Ok(("", body));
    }

    text.split_once("\n\n")
        .ok_or_else(|| SpoolError::malformed("missing blank line after envelope"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use mailtools_common::MergeData;
    use pretty_assertions::assert_eq;

    use super::*;

    fn basic_message() -> Message {
        Message::builder()
            .body("Subject: Testing\n\nHi")
            .return_path("me@example.com")
            .recipient("you@example.com")
            .build()
            .unwrap()
    }

    fn text(message: &Message) -> String {
        String::from_utf8(serialize(message).unwrap()).unwrap()
    }

    #[test]
    fn test_serialize_layout() {
        assert_eq!(
            text(&basic_message()),
            "me@example.com\nyou@example.com\n\nSubject: Testing\n\nHi"
        );
    }

    #[test]
    fn test_round_trip_with_merge_data() {
        let message = Message::builder()
            .body("Subject: Testing\n\nHi\n\n")
            .return_path("me@example.com")
            .recipient(r#"you@example.com {"name":"You"}"#)
            .recipient("them@example.com")
            .build()
            .unwrap();

        let serialized = text(&message);
        assert!(serialized.starts_with("me@example.com\nyou@example.com\t{\"name\":\"You\"}\n"));

        let parsed = deserialize(&serialized).unwrap();
        assert_eq!(parsed.return_path(), "me@example.com");
        assert_eq!(parsed.body(), "Subject: Testing\n\nHi\n\n");
        assert_eq!(
            parsed.recipients().to_map().unwrap(),
            message.recipients().to_map().unwrap()
        );
        assert_eq!(
            parsed.recipients().addresses().unwrap(),
            vec!["you@example.com", "them@example.com"]
        );
    }

    #[test]
    fn test_round_trip_keeps_separators_in_addresses() {
        let message = Message::builder()
            .body("Hi")
            .return_path("me@example.com")
            .recipient(Recipient::new("a|b@example.com", MergeData::new()).unwrap())
            .recipient(r#""pat smith"@example.com {"name":"Pat"}"#)
            .build()
            .unwrap();

        let parsed = deserialize(&text(&message)).unwrap();
        assert_eq!(
            parsed.recipients().addresses().unwrap(),
            vec!["a|b@example.com", r#""pat smith"@example.com"#]
        );
        assert_eq!(
            parsed.recipients().to_map().unwrap(),
            message.recipients().to_map().unwrap()
        );
    }

    #[test]
    fn test_empty_body_and_null_sender() {
        let message = Message::builder().recipient("you@example.com").build().unwrap();
        let parsed = deserialize(&text(&message)).unwrap();

        assert_eq!(parsed.return_path(), "<>");
        assert_eq!(parsed.body(), "");
        assert_eq!(parsed.recipients().count(), 1);
    }

    #[test]
    fn test_malformed_files() {
        for bad in [
            "",
            "\nbody",
            "me@example.com\nyou@example.com",
            "me@example.com\nnot-an-address\n\nbody",
        ] {
            assert!(
                matches!(deserialize(bad), Err(SpoolError::MalformedQueueFile { .. })),
                "{bad:?} should be malformed"
            );
        }
    }
}
