//! Mailbox syntax checks used to normalise recipient addresses
//!
//! Addresses are validated against the RFC 5321 mailbox grammar and
//! returned in a canonical form: surrounding angle brackets removed and
//! the domain case-folded. The local part is left untouched, since its
//! case is significant to the receiving host.
//!
//! ```text
//! Mailbox        = Local-part "@" ( Domain / address-literal )
//! Local-part     = Dot-string / Quoted-string
//! Dot-string     = Atom *("." Atom)
//! Domain         = sub-domain *("." sub-domain)
//! sub-domain     = Let-dig [Ldh-str]
//! ```

use std::net::{Ipv4Addr, Ipv6Addr};

use thiserror::Error;

/// Maximum mailbox length once angle brackets are removed.
const MAX_MAILBOX_LEN: usize = 254;
const MAX_LOCAL_PART_LEN: usize = 64;
const MAX_DOMAIN_LEN: usize = 255;

pub type Result<T> = std::result::Result<T, AddressError>;

/// Reasons a mailbox fails normalisation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("Empty address")]
    Empty,

    #[error("Address exceeds {MAX_MAILBOX_LEN} octets")]
    TooLong,

    #[error("Local-part exceeds {MAX_LOCAL_PART_LEN} octets")]
    LocalPartTooLong,

    #[error("Domain exceeds {MAX_DOMAIN_LEN} octets")]
    DomainTooLong,

    #[error("Missing '@' separator in mailbox")]
    MissingAtSign,

    #[error("Invalid local-part: {0}")]
    InvalidLocalPart(String),

    #[error("Invalid domain: {0}")]
    InvalidDomain(String),

    #[error("Invalid address literal: {0}")]
    InvalidAddressLiteral(String),

    #[error("Invalid quoted string: {0}")]
    InvalidQuotedString(String),
}

/// A mailbox split into its two halves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mailbox {
    pub local_part: String,
    pub domain: String,
}

impl std::fmt::Display for Mailbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.local_part, self.domain)
    }
}

/// Returns `true` for a 32 digit hexadecimal token, the pre-hashed
/// form an address may be supplied in.
pub fn is_hashed(input: &str) -> bool {
    input.len() == 32 && input.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Normalise an address into `local@domain` form.
///
/// Hashed identifiers are only lower-cased. Anything else must parse as
/// a mailbox, optionally wrapped in `<` `>`.
///
/// # Errors
///
/// Returns an [`AddressError`] describing the first syntax violation.
pub fn normalize(input: &str) -> Result<String> {
    let trimmed = input.trim();

    if is_hashed(trimmed) {
        return Ok(trimmed.to_ascii_lowercase());
    }

    parse_mailbox(trimmed).map(|mailbox| mailbox.to_string())
}

/// Parse a mailbox, with or without surrounding angle brackets.
///
/// # Errors
///
/// Returns an [`AddressError`] describing the first syntax violation.
pub fn parse_mailbox(input: &str) -> Result<Mailbox> {
    let trimmed = input.trim();
    let bare = trimmed
        .strip_prefix('<')
        .and_then(|s| s.strip_suffix('>'))
        .unwrap_or(trimmed);

    if bare.is_empty() {
        return Err(AddressError::Empty);
    }

    if bare.len() > MAX_MAILBOX_LEN {
        return Err(AddressError::TooLong);
    }

    let at = find_unquoted_at(bare)?;
    let (local_part, domain) = (&bare[..at], &bare[at + 1..]);

    if local_part.len() > MAX_LOCAL_PART_LEN {
        return Err(AddressError::LocalPartTooLong);
    }
    if domain.len() > MAX_DOMAIN_LEN {
        return Err(AddressError::DomainTooLong);
    }

    Ok(Mailbox {
        local_part: parse_local_part(local_part)?,
        domain: parse_domain_or_address_literal(domain)?,
    })
}

fn find_unquoted_at(input: &str) -> Result<usize> {
    let mut in_quotes = false;
    let mut in_brackets = false;
    let mut prev_was_backslash = false;

    for (i, ch) in input.char_indices() {
        if ch == '"' && !prev_was_backslash && !in_brackets {
            in_quotes = !in_quotes;
        } else if ch == '[' && !in_quotes {
            in_brackets = true;
        } else if ch == ']' && !in_quotes {
            in_brackets = false;
        } else if ch == '@' && !in_quotes && !in_brackets {
            return Ok(i);
        }

        prev_was_backslash = ch == '\\' && !prev_was_backslash;
    }

    Err(AddressError::MissingAtSign)
}

fn parse_local_part(input: &str) -> Result<String> {
    if input.is_empty() {
        return Err(AddressError::InvalidLocalPart(
            "Empty local-part".to_string(),
        ));
    }

    if input.starts_with('"') {
        parse_quoted_string(input)
    } else {
        parse_dot_string(input)
    }
}

fn parse_dot_string(input: &str) -> Result<String> {
    if input.starts_with('.') || input.ends_with('.') {
        return Err(AddressError::InvalidLocalPart(
            "Dot-string cannot start or end with '.'".to_string(),
        ));
    }

    if input.contains("..") {
        return Err(AddressError::InvalidLocalPart(
            "Dot-string cannot contain consecutive dots".to_string(),
        ));
    }

    if let Some(ch) = input.chars().find(|&ch| ch != '.' && !is_atext(ch)) {
        return Err(AddressError::InvalidLocalPart(format!(
            "Invalid character '{ch}' in atom"
        )));
    }

    Ok(input.to_string())
}

fn parse_quoted_string(input: &str) -> Result<String> {
    if input.len() < 2 || !input.ends_with('"') {
        return Err(AddressError::InvalidQuotedString(
            "Unclosed quoted string".to_string(),
        ));
    }

    let mut chars = input[1..input.len() - 1].chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            match chars.next() {
                Some(next) if next.is_ascii_graphic() || next == ' ' => {}
                Some(next) => {
                    return Err(AddressError::InvalidQuotedString(format!(
                        "Invalid quoted-pair: \\{next}"
                    )));
                }
                None => {
                    return Err(AddressError::InvalidQuotedString(
                        "Backslash at end of quoted string".to_string(),
                    ));
                }
            }
        } else if !is_qtext_smtp(ch) {
            return Err(AddressError::InvalidQuotedString(format!(
                "Invalid character '{ch}' in quoted string"
            )));
        }
    }

    Ok(input.to_string())
}

fn parse_domain_or_address_literal(input: &str) -> Result<String> {
    if input.starts_with('[') {
        parse_address_literal(input)
    } else {
        parse_domain(input)
    }
}

fn parse_domain(input: &str) -> Result<String> {
    if input.is_empty() {
        return Err(AddressError::InvalidDomain("Empty domain".to_string()));
    }

    if input.starts_with('.') || input.ends_with('.') {
        return Err(AddressError::InvalidDomain(
            "Domain cannot start or end with '.'".to_string(),
        ));
    }

    for subdomain in input.split('.') {
        parse_subdomain(subdomain)?;
    }

    Ok(input.to_ascii_lowercase())
}

fn parse_subdomain(input: &str) -> Result<()> {
    let (Some(first), Some(last)) = (input.chars().next(), input.chars().last()) else {
        return Err(AddressError::InvalidDomain("Empty subdomain".to_string()));
    };

    if !first.is_ascii_alphanumeric() {
        return Err(AddressError::InvalidDomain(format!(
            "Subdomain must start with letter or digit, got '{first}'"
        )));
    }

    if !last.is_ascii_alphanumeric() {
        return Err(AddressError::InvalidDomain(format!(
            "Subdomain must end with letter or digit, got '{last}'"
        )));
    }

    if let Some(ch) = input
        .chars()
        .find(|&ch| !ch.is_ascii_alphanumeric() && ch != '-')
    {
        return Err(AddressError::InvalidDomain(format!(
            "Invalid character '{ch}' in subdomain"
        )));
    }

    Ok(())
}

fn parse_address_literal(input: &str) -> Result<String> {
    let Some(content) = input.strip_prefix('[').and_then(|s| s.strip_suffix(']')) else {
        return Err(AddressError::InvalidAddressLiteral(
            "Address literal must be enclosed in brackets".to_string(),
        ));
    };

    if content.parse::<Ipv4Addr>().is_ok() {
        return Ok(input.to_string());
    }

    if let Some(ipv6) = content.strip_prefix("IPv6:") {
        return ipv6
            .parse::<Ipv6Addr>()
            .map(|_| input.to_string())
            .map_err(|e| AddressError::InvalidAddressLiteral(e.to_string()));
    }

    match content.split_once(':') {
        Some((tag, value)) if !tag.is_empty() && !value.is_empty() => Ok(input.to_string()),
        _ => Err(AddressError::InvalidAddressLiteral(format!(
            "Invalid address literal format: {content}"
        ))),
    }
}

/// atext = ALPHA / DIGIT / "!" / "#" / "$" / "%" / "&" / "'" / "*" / "+" /
///         "-" / "/" / "=" / "?" / "^" / "_" / "`" / "{" / "|" / "}" / "~"
#[inline]
const fn is_atext(ch: char) -> bool {
    ch.is_ascii_alphanumeric()
        || matches!(
            ch,
            '!' | '#'
                | '$'
                | '%'
                | '&'
                | '\''
                | '*'
                | '+'
                | '-'
                | '/'
                | '='
                | '?'
                | '^'
                | '_'
                | '`'
                | '{'
                | '|'
                | '}'
                | '~'
        )
}

/// qtextSMTP = %d32-33 / %d35-91 / %d93-126
#[inline]
const fn is_qtext_smtp(ch: char) -> bool {
    matches!(ch as u32, 32..=33 | 35..=91 | 93..=126)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_folds_domain_only() {
        assert_eq!(normalize("Pat@Example.COM").unwrap(), "Pat@example.com");
    }

    #[test]
    fn test_normalize_strips_brackets() {
        assert_eq!(normalize(" <pat@example.com> ").unwrap(), "pat@example.com");
    }

    #[test]
    fn test_normalize_hashed_identifier() {
        assert_eq!(
            normalize("0123456789ABCDEF0123456789ABCDEF").unwrap(),
            "0123456789abcdef0123456789abcdef"
        );
    }

    #[test]
    fn test_quoted_local_part() {
        let mailbox = parse_mailbox(r#""user name"@example.com"#).unwrap();
        assert_eq!(mailbox.local_part, r#""user name""#);
    }

    #[test]
    fn test_address_literals() {
        assert_eq!(
            normalize("user@[192.168.1.1]").unwrap(),
            "user@[192.168.1.1]"
        );
        assert_eq!(
            normalize("user@[IPv6:2001:db8::1]").unwrap(),
            "user@[IPv6:2001:db8::1]"
        );
        assert!(normalize("user@[IPv6:nonsense]").is_err());
    }

    #[test]
    fn test_invalid_addresses() {
        assert_eq!(normalize("").unwrap_err(), AddressError::Empty);
        assert_eq!(
            normalize("userexample.com").unwrap_err(),
            AddressError::MissingAtSign
        );
        assert!(matches!(
            normalize("user..name@example.com"),
            Err(AddressError::InvalidLocalPart(_))
        ));
        assert!(matches!(
            normalize(".@aaa.aa"),
            Err(AddressError::InvalidLocalPart(_))
        ));
        assert!(matches!(
            normalize("user@example-.com"),
            Err(AddressError::InvalidDomain(_))
        ));
        assert!(matches!(
            normalize("user@.example.com"),
            Err(AddressError::InvalidDomain(_))
        ));
    }

    #[test]
    fn test_length_limits() {
        let long_local = format!("{}@example.com", "a".repeat(70));
        assert_eq!(
            normalize(&long_local).unwrap_err(),
            AddressError::LocalPartTooLong
        );

        let long_path = format!("{}@example.com", "a".repeat(300));
        assert_eq!(normalize(&long_path).unwrap_err(), AddressError::TooLong);
    }
}
