use std::{
    fs::File,
    io::{BufRead, BufReader, Write},
};

use tempfile::NamedTempFile;

use super::store::{RecipientStore, StoreIter};
use crate::{error::Result, recipient::Recipient};

/// Append-only temporary file of serialised recipient records, one per
/// line. The file is removed when the store is dropped.
#[derive(Debug)]
pub struct SpillStore {
    file: NamedTempFile,
    len: usize,
}

impl SpillStore {
    /// Create an empty spill file in the system temporary directory.
    ///
    /// # Errors
    ///
    /// If the temporary file cannot be created.
    pub fn new() -> Result<Self> {
        let file = tempfile::Builder::new()
            .prefix("mailtools-recipients.")
            .tempfile()?;

        Ok(Self { file, len: 0 })
    }
}

impl RecipientStore for SpillStore {
    fn push(&mut self, recipient: Recipient) -> Result<()> {
        writeln!(self.file.as_file_mut(), "{recipient}")?;
        self.len += 1;
        Ok(())
    }

    fn len(&self) -> usize {
        self.len
    }

    fn iter(&self) -> Result<StoreIter<'_>> {
        let reader = BufReader::new(File::open(self.file.path())?);

        Ok(Box::new(reader.lines().map(|line| {
            let line = line?;
            Recipient::from_record(&line)
        })))
    }
}
