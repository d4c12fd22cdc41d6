use std::fmt;

use crate::{error::Result, recipient::Recipient};

/// Forward-only iterator over stored recipients.
pub type StoreIter<'a> = Box<dyn Iterator<Item = Result<Recipient>> + 'a>;

/// Backing storage for a [`Recipients`](super::Recipients) collection.
///
/// Implementations keep insertion order: `iter` yields exactly the
/// recipients passed to `push`, in the order they were pushed.
pub trait RecipientStore: fmt::Debug + Send + Sync {
    /// Append one recipient.
    ///
    /// # Errors
    ///
    /// If the backing storage cannot be written.
    fn push(&mut self, recipient: Recipient) -> Result<()>;

    /// Number of recipients stored.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate the stored recipients in insertion order.
    ///
    /// # Errors
    ///
    /// If the backing storage cannot be opened for reading.
    fn iter(&self) -> Result<StoreIter<'_>>;
}
