//! An ordered collection of recipients that moves itself to disk once it
//! grows past [`SPILL_THRESHOLD`] entries.
//!
//! Callers never see the storage mode change: [`Recipients::add`] and
//! [`Recipients::iter`] behave identically before and after the switch.

mod memory;
mod spill;
mod store;

use std::{collections::BTreeSet, fs::File, io::Write, path::Path};

use md5::{Digest, Md5};
use serde_json::Value;

pub use self::{
    memory::MemoryStore,
    spill::SpillStore,
    store::{RecipientStore, StoreIter},
};
use crate::{
    error::Result,
    input::RecipientInput,
    internal,
    recipient::{MergeData, Recipient},
};

/// Number of recipients held in memory before the collection spills.
pub const SPILL_THRESHOLD: usize = 1000;

#[derive(Debug)]
pub struct Recipients {
    store: Box<dyn RecipientStore>,
    spilled: bool,
    threshold: usize,
}

impl Default for Recipients {
    fn default() -> Self {
        Self::new()
    }
}

impl Recipients {
    pub fn new() -> Self {
        Self::with_threshold(SPILL_THRESHOLD)
    }

    /// A collection that spills after `threshold` recipients instead of
    /// the default.
    pub fn with_threshold(threshold: usize) -> Self {
        Self {
            store: Box::new(MemoryStore::new()),
            spilled: false,
            threshold: threshold.max(1),
        }
    }

    /// Ingest recipients from any accepted input shape.
    ///
    /// Recipients parsed before an error is hit stay in the collection.
    ///
    /// # Errors
    ///
    /// The first parse or storage error met while walking the input.
    pub fn add(&mut self, input: impl Into<RecipientInput>) -> Result<()> {
        input.into().ingest(self)
    }

    /// Append one already-parsed recipient.
    ///
    /// # Errors
    ///
    /// If the collection had to spill, or is spilled, and the backing
    /// file could not be written.
    pub fn push(&mut self, recipient: Recipient) -> Result<()> {
        self.store.push(recipient)?;

        if !self.spilled && self.store.len() >= self.threshold {
            self.spill()?;
        }

        Ok(())
    }

    fn spill(&mut self) -> Result<()> {
        let mut spill = SpillStore::new()?;
        for recipient in self.store.iter()? {
            spill.push(recipient?)?;
        }

        internal!(
            level = DEBUG,
            "Recipient collection spilled to disk after {} entries",
            spill.len()
        );

        self.store = Box::new(spill);
        self.spilled = true;
        Ok(())
    }

    /// Number of recipients added so far.
    pub fn count(&self) -> usize {
        self.store.len()
    }

    pub fn len(&self) -> usize {
        self.count()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub const fn is_spilled(&self) -> bool {
        self.spilled
    }

    /// Iterate in insertion order.
    ///
    /// # Errors
    ///
    /// If the spill file cannot be reopened. Individual items carry their
    /// own read or parse errors.
    pub fn iter(&self) -> Result<StoreIter<'_>> {
        self.store.iter()
    }

    pub fn addresses(&self) -> Result<Vec<String>> {
        self.iter()?
            .map(|recipient| recipient.map(|r| r.address().to_string()))
            .collect()
    }

    /// `(hash, address)` per recipient, in insertion order. Mailbox
    /// addresses are replaced by their lowercase hex MD5; pre-hashed
    /// identifiers are their own hash.
    pub fn to_md5(&self) -> Result<Vec<(String, String)>> {
        self.iter()?
            .map(|recipient| {
                recipient.map(|r| {
                    let (address, _) = r.into_parts();
                    (md5_hex(&address), address)
                })
            })
            .collect()
    }

    /// The distinct hashes of [`Recipients::to_md5`].
    pub fn to_md5_set(&self) -> Result<BTreeSet<String>> {
        Ok(self.to_md5()?.into_iter().map(|(hash, _)| hash).collect())
    }

    /// Address to merge data. A later duplicate address replaces an
    /// earlier one.
    pub fn to_map(&self) -> Result<MergeData> {
        let mut map = MergeData::new();
        for recipient in self.iter()? {
            let (address, data) = recipient?.into_parts();
            map.insert(address, Value::Object(data));
        }
        Ok(map)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.to_map()?)?)
    }

    /// Write an optional header line followed by one record per
    /// recipient.
    pub fn write_to<W: Write>(&self, writer: &mut W, header: Option<&str>) -> Result<()> {
        if let Some(header) = header {
            writeln!(writer, "{header}")?;
        }

        for recipient in self.iter()? {
            writeln!(writer, "{}", recipient?)?;
        }

        Ok(())
    }

    pub fn save(&self, path: &Path, header: Option<&str>) -> Result<()> {
        let mut file = std::io::BufWriter::new(File::create(path)?);
        self.write_to(&mut file, header)?;
        file.flush()?;
        Ok(())
    }
}

fn md5_hex(address: &str) -> String {
    if address.contains('@') {
        hex::encode(Md5::digest(address.as_bytes()))
    } else {
        address.to_string()
    }
}

impl TryFrom<RecipientInput> for Recipients {
    type Error = crate::error::RecipientError;

    fn try_from(input: RecipientInput) -> Result<Self> {
        let mut recipients = Self::new();
        recipients.add(input)?;
        Ok(recipients)
    }
}
