//! Netstrings, `<length>:<bytes>,`, and the QMQP message packing built on
//! them:
//!
//! ```text
//! netstring( netstring(body + "\n") + netstring(return_path)
//!            + netstring(recipient) + ... )
//! ```
//!
//! Only recipient addresses travel on the wire; merge data stays behind.

use mailtools_common::{MergeData, Message, Recipient, Recipients, RecipientError};

use crate::error::{NetstringError, Result};

/// Encode `bytes` as a netstring.
pub fn encode(bytes: &[u8]) -> Vec<u8> {
    let length = bytes.len().to_string();
    let mut out = Vec::with_capacity(length.len() + bytes.len() + 2);
    out.extend_from_slice(length.as_bytes());
    out.push(b':');
    out.extend_from_slice(bytes);
    out.push(b',');
    out
}

/// Encode a string as a netstring; the length counts bytes, not chars.
pub fn encode_str(s: &str) -> String {
    format!("{}:{s},", s.len())
}

/// Split one netstring off the front of `buf`, returning its content and
/// whatever follows the trailing comma.
///
/// # Errors
///
/// [`NetstringError::InvalidNetstring`] when the length prefix or `:` is
/// missing, fewer bytes than declared follow, or the `,` is absent.
pub fn decode(buf: &[u8]) -> Result<(&[u8], &[u8])> {
    let digits = buf.iter().take_while(|b| b.is_ascii_digit()).count();
    if digits == 0 {
        return Err(NetstringError::invalid("missing length prefix"));
    }

    let length: usize = std::str::from_utf8(&buf[..digits])?
        .parse()
        .map_err(|_| NetstringError::invalid("length prefix out of range"))?;

    let rest = match buf[digits..].split_first() {
        Some((b':', rest)) => rest,
        _ => return Err(NetstringError::invalid("missing ':' after length")),
    };

    if rest.len() <= length {
        return Err(NetstringError::invalid(format!(
            "declared {length} bytes but only {} available",
            rest.len()
        )));
    }

    let (content, tail) = rest.split_at(length);
    match tail.split_first() {
        Some((b',', remainder)) => Ok((content, remainder)),
        _ => Err(NetstringError::invalid("missing ',' terminator")),
    }
}

/// [`decode`] for text.
///
/// # Errors
///
/// As [`decode`], and [`NetstringError::Utf8`] if the content splits a
/// multi-byte character.
pub fn decode_str(buf: &str) -> Result<(&str, &str)> {
    let (content, remainder) = decode(buf.as_bytes())?;
    Ok((std::str::from_utf8(content)?, std::str::from_utf8(remainder)?))
}

/// Decode every netstring in a concatenation.
///
/// # Errors
///
/// The first netstring that fails [`decode`].
pub fn decode_list(mut buf: &[u8]) -> Result<Vec<&[u8]>> {
    let mut strings = Vec::new();
    while !buf.is_empty() {
        let (content, remainder) = decode(buf)?;
        strings.push(content);
        buf = remainder;
    }
    Ok(strings)
}

/// Pack a message for QMQP.
///
/// # Errors
///
/// If a spilled recipient list cannot be read back.
pub fn encode_message(message: &Message) -> std::result::Result<Vec<u8>, RecipientError> {
    let mut body = String::with_capacity(message.body().len() + 1);
    body.push_str(message.body());
    body.push('\n');

    let mut inner = encode(body.as_bytes());
    inner.extend(encode(message.return_path().as_bytes()));

    for recipient in message.recipients().iter()? {
        inner.extend(encode(recipient?.address().as_bytes()));
    }

    Ok(encode(&inner))
}

/// Unpack a QMQP message. The newline added to the body by
/// [`encode_message`] is removed.
///
/// # Errors
///
/// [`NetstringError::InvalidNetstring`] for bad framing or fewer than two
/// inner strings, [`NetstringError::Utf8`] for non-UTF-8 content and
/// [`NetstringError::Recipient`] for an unusable recipient address.
pub fn decode_message(buf: &[u8]) -> Result<Message> {
    let (packed, _) = decode(buf)?;
    let strings = decode_list(packed)?;

    let [body, return_path, addresses @ ..] = strings.as_slice() else {
        return Err(NetstringError::invalid(
            "message needs a body and a return path",
        ));
    };

    let body = std::str::from_utf8(body)?;
    let body = body.strip_suffix('\n').unwrap_or(body);

    let mut recipients = Recipients::new();
    for address in addresses {
        recipients.push(Recipient::new(std::str::from_utf8(address)?, MergeData::new())?)?;
    }

    Ok(Message::new(body, std::str::from_utf8(return_path)?, recipients))
}
