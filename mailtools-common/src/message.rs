//! The delivery message: an opaque body, the envelope return path and the
//! recipients it is addressed to.

use crate::{error::Result, input::RecipientInput, recipients::Recipients};

/// Return path meaning "send no bounces".
pub const NULL_SENDER: &str = "<>";

/// Suffix marking a VERP-enabled return path.
pub const VERP_FLAG: &str = "-@[]";

#[derive(Debug, Default)]
pub struct Message {
    body: String,
    return_path: String,
    recipients: Recipients,
}

impl Message {
    /// An empty or blank `return_path` becomes the null sender.
    pub fn new(body: impl Into<String>, return_path: impl Into<String>, recipients: Recipients) -> Self {
        let mut message = Self {
            body: body.into(),
            return_path: String::new(),
            recipients,
        };
        message.set_return_path(return_path);
        message
    }

    pub fn builder() -> MessageBuilder {
        MessageBuilder::default()
    }

    #[inline]
    pub fn body(&self) -> &str {
        &self.body
    }

    #[inline]
    pub fn return_path(&self) -> &str {
        if self.return_path.is_empty() {
            NULL_SENDER
        } else {
            &self.return_path
        }
    }

    pub fn set_return_path(&mut self, return_path: impl Into<String>) {
        let return_path = return_path.into();
        self.return_path = if return_path.trim().is_empty() {
            NULL_SENDER.to_string()
        } else {
            return_path
        };
    }

    #[inline]
    pub const fn recipients(&self) -> &Recipients {
        &self.recipients
    }

    #[inline]
    pub const fn recipients_mut(&mut self) -> &mut Recipients {
        &mut self.recipients
    }

    pub fn into_parts(self) -> (String, String, Recipients) {
        let return_path = self.return_path().to_string();
        (self.body, return_path, self.recipients)
    }

    pub fn is_verp(&self) -> bool {
        self.return_path().ends_with(VERP_FLAG)
    }

    /// Turn `local@host` into `local-@host-@[]`. Returns whether the return
    /// path is VERP-enabled afterwards, which is never the case for the
    /// null sender or a return path without an `@`.
    pub fn verp(&mut self) -> bool {
        if self.is_verp() {
            return true;
        }

        let return_path = self.return_path();
        if return_path == NULL_SENDER || !return_path.contains('@') {
            return false;
        }

        self.return_path = format!("{}{VERP_FLAG}", return_path.replacen('@', "-@", 1));
        true
    }

    /// Undo [`Message::verp`].
    pub fn verp_off(&mut self) {
        let Some(stripped) = self.return_path.strip_suffix(VERP_FLAG) else {
            return;
        };

        self.return_path = stripped.replacen("-@", "@", 1);
    }

    /// The address a bounce for `recipient` returns to:
    /// `local-@host-@[]` and `user@rhost` give `local-user=rhost@host`.
    /// `None` unless VERP is enabled.
    pub fn verp_address_for(&self, recipient: &str) -> Option<String> {
        let (local, host) = self
            .return_path()
            .strip_suffix(VERP_FLAG)?
            .split_once("-@")?;

        let encoded = recipient.replacen('@', "=", 1);
        Some(format!("{local}-{encoded}@{host}"))
    }
}

/// Collects the pieces of a [`Message`]; recipients are parsed when
/// [`MessageBuilder::build`] runs.
#[derive(Debug, Default)]
pub struct MessageBuilder {
    body: String,
    return_path: Option<String>,
    recipients: Vec<RecipientInput>,
    threshold: Option<usize>,
}

impl MessageBuilder {
    #[must_use]
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    #[must_use]
    pub fn return_path(mut self, return_path: impl Into<String>) -> Self {
        self.return_path = Some(return_path.into());
        self
    }

    #[must_use]
    pub fn recipient(mut self, recipient: impl Into<RecipientInput>) -> Self {
        self.recipients.push(recipient.into());
        self
    }

    #[must_use]
    pub fn recipients<I, T>(mut self, recipients: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<RecipientInput>,
    {
        self.recipients.extend(recipients.into_iter().map(Into::into));
        self
    }

    /// Spill the recipient collection after `threshold` entries.
    #[must_use]
    pub const fn spill_threshold(mut self, threshold: usize) -> Self {
        self.threshold = Some(threshold);
        self
    }

    /// # Errors
    ///
    /// The first recipient that fails to parse.
    pub fn build(self) -> Result<Message> {
        let mut recipients = self
            .threshold
            .map_or_else(Recipients::new, Recipients::with_threshold);

        for input in self.recipients {
            recipients.add(input)?;
        }

        Ok(Message::new(
            self.body,
            self.return_path.unwrap_or_default(),
            recipients,
        ))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn build(return_path: &str) -> Message {
        Message::builder()
            .body("Subject: Testing\n\nHi")
            .return_path(return_path)
            .recipient("you@example.com")
            .build()
            .unwrap()
    }

    #[test]
    fn test_default_return_path_is_null_sender() {
        let message = Message::builder().body("Hi").build().unwrap();
        assert_eq!(message.return_path(), NULL_SENDER);
        assert!(message.recipients().is_empty());

        let message = Message::new("Hi", "  ", Recipients::new());
        assert_eq!(message.return_path(), NULL_SENDER);
    }

    #[test]
    fn test_verp_round_trip() {
        let mut message = build("me@example.com");

        assert!(message.verp());
        assert_eq!(message.return_path(), "me-@example.com-@[]");
        assert!(message.is_verp());

        assert!(message.verp());
        assert_eq!(message.return_path(), "me-@example.com-@[]");

        message.verp_off();
        assert_eq!(message.return_path(), "me@example.com");
        assert!(!message.is_verp());

        message.verp_off();
        assert_eq!(message.return_path(), "me@example.com");
    }

    #[test]
    fn test_verp_ignores_null_sender() {
        let mut message = build("<>");
        assert!(!message.verp());
        assert_eq!(message.return_path(), "<>");

        let mut message = build("postmaster");
        assert!(!message.verp());
        assert_eq!(message.return_path(), "postmaster");
    }

    #[test]
    fn test_verp_address_for() {
        let mut message = build("bounces@lists.example.com");
        assert_eq!(message.verp_address_for("you@example.org"), None);

        message.verp();
        assert_eq!(
            message.verp_address_for("you@example.org").as_deref(),
            Some("bounces-you=example.org@lists.example.com")
        );
    }

    #[test]
    fn test_builder_collects_recipients() {
        let message = Message::builder()
            .recipients(["a@example.com", "b@example.com"])
            .recipient("c@example.com C")
            .build()
            .unwrap();

        assert_eq!(message.recipients().count(), 3);
        assert!(Message::builder().recipient("nobody").build().is_err());
    }
}
