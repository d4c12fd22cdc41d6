//! A QMQP server's reply.

use crate::netstring;

/// The status class of a reply, from its first byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// `K`: the message was accepted.
    Accepted,
    /// `Z`: temporary failure.
    TemporaryFailure,
    /// `D`: permanent failure.
    PermanentFailure,
    /// A netstring reply with some other first byte.
    Unknown,
    /// The reply was not a netstring; the text is what the server sent.
    Raw,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: Status,
    /// The unwrapped status text, `Kok 1700000000 qp 4242` for example.
    pub text: String,
}

impl Response {
    /// Read a raw reply. A well-formed netstring is unwrapped and
    /// classified; anything else is kept verbatim as [`Status::Raw`].
    pub fn parse(reply: &[u8]) -> Self {
        let Ok((content, _)) = netstring::decode(reply) else {
            return Self {
                status: Status::Raw,
                text: String::from_utf8_lossy(reply).into_owned(),
            };
        };

        let status = match content.first() {
            Some(b'K') => Status::Accepted,
            Some(b'Z') => Status::TemporaryFailure,
            Some(b'D') => Status::PermanentFailure,
            _ => Status::Unknown,
        };

        Self {
            status,
            text: String::from_utf8_lossy(content).into_owned(),
        }
    }

    #[must_use]
    pub fn is_accepted(&self) -> bool {
        self.status == Status::Accepted
    }

    /// The text after the status letter, or all of it for raw replies.
    pub fn message(&self) -> &str {
        match self.status {
            Status::Raw | Status::Unknown => &self.text,
            _ => self.text.get(1..).unwrap_or_default(),
        }
    }
}

impl std::fmt::Display for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}
