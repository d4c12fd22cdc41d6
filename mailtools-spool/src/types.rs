use std::{fmt, str::FromStr};

/// Lifecycle marker carried in the last segment of a spool file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryState {
    /// Never attempted.
    New,
    /// Deferred this many times.
    Deferred(u32),
}

impl EntryState {
    /// Number of times the entry has been deferred; `New` counts as zero.
    pub const fn generation(self) -> u32 {
        match self {
            Self::New => 0,
            Self::Deferred(generation) => generation,
        }
    }
}

impl fmt::Display for EntryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::New => f.write_str("new"),
            Self::Deferred(generation) => write!(f, "{generation}"),
        }
    }
}

/// The name of a spool file: `<epoch>.<random>.<state>`.
///
/// For a new entry the epoch is the creation time; once deferred it is the
/// earliest time the entry may be attempted again.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SpoolEntryName {
    epoch: u64,
    tag: String,
    state: EntryState,
}

impl SpoolEntryName {
    pub fn new(epoch: u64, tag: impl Into<String>, state: EntryState) -> Self {
        Self {
            epoch,
            tag: tag.into(),
            state,
        }
    }

    /// A fresh name with a random tag.
    pub fn generate(epoch: u64) -> Self {
        let tag = rand::random_range(0..100_000u32);
        Self::new(epoch, format!("{tag:05}"), EntryState::New)
    }

    /// Parse a spool file name.
    ///
    /// Rejects anything that could escape the spool directory, hidden and
    /// temporary files, and names not made of exactly three segments.
    pub fn from_filename(filename: &str) -> Option<Self> {
        if filename.contains('/') || filename.contains('\\') || filename.starts_with('.') {
            return None;
        }

        let mut parts = filename.split('.');
        let (Some(epoch), Some(tag), Some(state), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return None;
        };

        if tag.is_empty() || !tag.chars().all(|c| c.is_ascii_alphanumeric()) {
            return None;
        }

        let state = match state {
            "new" => EntryState::New,
            generation => EntryState::Deferred(generation.parse().ok()?),
        };

        Some(Self::new(epoch.parse().ok()?, tag, state))
    }

    pub const fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub const fn state(&self) -> EntryState {
        self.state
    }

    /// `true` unless the entry is deferred until after `now`.
    pub const fn is_due(&self, now: u64) -> bool {
        self.epoch <= now
    }

    /// The same entry, rescheduled.
    #[must_use]
    pub fn with_schedule(&self, epoch: u64, state: EntryState) -> Self {
        Self::new(epoch, self.tag.clone(), state)
    }

    /// The same schedule under a fresh random tag.
    #[must_use]
    pub fn retagged(&self) -> Self {
        Self {
            tag: Self::generate(self.epoch).tag,
            ..self.clone()
        }
    }
}

impl fmt::Display for SpoolEntryName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.epoch, self.tag, self.state)
    }
}

impl FromStr for SpoolEntryName {
    type Err = crate::SpoolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_filename(s).ok_or_else(|| crate::SpoolError::InvalidEntryName(s.to_string()))
    }
}
