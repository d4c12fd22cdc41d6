use super::store::{RecipientStore, StoreIter};
use crate::{error::Result, recipient::Recipient};

/// Holds recipients in a `Vec` until the collection spills.
#[derive(Debug, Default)]
pub struct MemoryStore {
    recipients: Vec<Recipient>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecipientStore for MemoryStore {
    fn push(&mut self, recipient: Recipient) -> Result<()> {
        self.recipients.push(recipient);
        Ok(())
    }

    fn len(&self) -> usize {
        self.recipients.len()
    }

    fn iter(&self) -> Result<StoreIter<'_>> {
        Ok(Box::new(self.recipients.iter().cloned().map(Ok)))
    }
}
