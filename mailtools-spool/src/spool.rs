use std::{
    future::Future,
    io,
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

use mailtools_common::{Message, internal};
use tokio::fs;

use crate::{
    config::SpoolConfig,
    error::{HandlerError, Result, SpoolError, ValidationError},
    queue_file,
    types::{EntryState, SpoolEntryName},
};

/// Prefix of files still being written.
const TEMP_PREFIX: &str = ".tmp_";

/// A visible spool file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpoolEntry {
    pub path: PathBuf,
    pub name: SpoolEntryName,
}

/// Where [`Spool::defer`] put an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Deferral {
    /// Renamed within the spool, due again at the new name's epoch.
    Deferred(SpoolEntry),
    /// Moved, name unchanged, into the dead-letter directory.
    DeadLettered(PathBuf),
}

/// Seconds since the Unix epoch.
pub fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs())
}

/// A directory of queue files consumed by a single processor.
///
/// Entries become visible only once fully written: [`Spool::enqueue`]
/// writes under a hidden temporary name and renames into place.
/// Processing removes an entry on success, and on failure defers it with
/// exponential backoff until the retry policy gives up and it moves to the
/// dead-letter directory.
///
/// Two `process` loops must not run against the same directory at once.
#[derive(Debug, Clone)]
pub struct Spool {
    config: SpoolConfig,
}

impl Spool {
    pub const fn new(config: SpoolConfig) -> Self {
        Self { config }
    }

    pub const fn config(&self) -> &SpoolConfig {
        &self.config
    }

    pub fn path(&self) -> &Path {
        self.config.path()
    }

    pub fn dead_letter_path(&self) -> &Path {
        self.config.dead_letter()
    }

    /// Create the spool and dead-letter directories if needed, and remove
    /// temporary files orphaned by a crash between write and rename.
    ///
    /// # Errors
    ///
    /// If a directory cannot be created, or exists but is not a directory.
    pub async fn init(&self) -> Result<()> {
        internal!("Initialising spool at {} ...", self.path().display());

        for dir in [self.path(), self.dead_letter_path()] {
            if !fs::try_exists(dir).await? {
                internal!("{} does not exist, creating...", dir.display());
                fs::create_dir_all(dir).await?;
            } else if !fs::metadata(dir).await?.is_dir() {
                return Err(ValidationError::NotDirectory(dir.to_path_buf()).into());
            }
        }

        self.cleanup_temporary_files().await
    }

    async fn cleanup_temporary_files(&self) -> Result<()> {
        let mut entries = fs::read_dir(self.path()).await?;
        let mut cleaned = 0;

        while let Some(entry) = entries.next_entry().await? {
            if entry.file_name().to_string_lossy().starts_with(TEMP_PREFIX) {
                fs::remove_file(entry.path()).await?;
                cleaned += 1;
            }
        }

        if cleaned > 0 {
            internal!(
                level = INFO,
                "Cleaned up {cleaned} orphaned temporary files from spool"
            );
        }

        Ok(())
    }

    /// Persist `message` as a new entry and return its visible name.
    ///
    /// # Errors
    ///
    /// If the message cannot be serialised or the file cannot be written.
    #[tracing::instrument(level = "debug", skip(self, message))]
    pub async fn enqueue(&self, message: &Message) -> Result<SpoolEntryName> {
        let contents = queue_file::serialize(message)?;

        let temp_path = loop {
            let temp_path = self
                .path()
                .join(format!("{TEMP_PREFIX}{}", SpoolEntryName::generate(now())));

            if !fs::try_exists(&temp_path).await? {
                break temp_path;
            }
        };

        fs::write(&temp_path, &contents).await?;
        let SpoolEntry { path, name } =
            Self::place(&temp_path, self.path(), SpoolEntryName::generate(now())).await?;

        internal!(level = DEBUG, "Spooled message to {}", path.display());

        Ok(name)
    }

    /// Move `from` into `dir` as `name` without replacing whatever is
    /// already there. A taken name is retried under a fresh tag.
    async fn place(from: &Path, dir: &Path, mut name: SpoolEntryName) -> Result<SpoolEntry> {
        loop {
            let path = dir.join(name.to_string());

            match fs::hard_link(from, &path).await {
                Ok(()) => {
                    fs::remove_file(from).await?;
                    return Ok(SpoolEntry { path, name });
                }
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                    internal!(level = DEBUG, "Spool name {name} is taken, retagging");
                    name = name.retagged();
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    async fn list(dir: &Path) -> Result<Vec<SpoolEntry>> {
        let mut entries = fs::read_dir(dir).await?;
        let mut found = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let filename = entry.file_name();
            let filename = filename.to_string_lossy();

            if let Some(name) = SpoolEntryName::from_filename(&filename) {
                found.push((filename.into_owned(), SpoolEntry {
                    path: entry.path(),
                    name,
                }));
            }
        }

        found.sort_by(|(a, _), (b, _)| a.cmp(b));
        Ok(found.into_iter().map(|(_, entry)| entry).collect())
    }

    /// Every visible entry, deferred or not, in name order.
    ///
    /// # Errors
    ///
    /// If the spool directory cannot be listed.
    pub async fn entries(&self) -> Result<Vec<SpoolEntry>> {
        Self::list(self.path()).await
    }

    /// The entries due for processing now, in name order.
    ///
    /// # Errors
    ///
    /// If the spool directory cannot be listed.
    pub async fn iterate(&self) -> Result<Vec<SpoolEntry>> {
        let now = now();
        let mut entries = self.entries().await?;
        entries.retain(|entry| entry.name.is_due(now));
        Ok(entries)
    }

    /// Read one entry without changing its state.
    ///
    /// # Errors
    ///
    /// If the file cannot be read or is not a well-formed queue file.
    pub async fn load(&self, entry: &SpoolEntry) -> Result<Message> {
        let bytes = fs::read(&entry.path).await?;
        let text = String::from_utf8(bytes)
            .map_err(|e| SpoolError::malformed(format!("not UTF-8: {e}")))?;

        queue_file::deserialize(&text)
    }

    /// Hand each due entry to `handler`, one at a time.
    ///
    /// An entry is removed once its handler succeeds. When the handler
    /// fails the entry is deferred and the failure is returned as
    /// [`SpoolError::Handler`]; entries after it are left for the next
    /// pass. A malformed entry is moved straight to the dead-letter
    /// directory and its error returned.
    ///
    /// Returns the number of entries handled successfully.
    ///
    /// # Errors
    ///
    /// The first handler failure, malformed entry or I/O error.
    pub async fn process<F, Fut, E>(&self, mut handler: F) -> Result<usize>
    where
        F: FnMut(Message) -> Fut,
        Fut: Future<Output = std::result::Result<(), E>>,
        E: Into<HandlerError>,
    {
        let mut processed = 0;

        for entry in self.iterate().await? {
            let message = match self.load(&entry).await {
                Ok(message) => message,
                Err(err @ SpoolError::MalformedQueueFile { .. }) => {
                    internal!(
                        level = WARN,
                        "Dead-lettering malformed spool entry {}: {err}",
                        entry.name
                    );
                    self.dead_letter(&entry).await?;
                    return Err(err);
                }
                Err(err) => return Err(err),
            };

            if let Err(source) = handler(message).await {
                let source: HandlerError = source.into();
                internal!(
                    level = WARN,
                    "Handler failed for spool entry {}: {source}",
                    entry.name
                );
                self.defer(&entry).await?;

                return Err(SpoolError::Handler {
                    entry: entry.name.to_string(),
                    source,
                });
            }

            fs::remove_file(&entry.path).await?;
            internal!(level = DEBUG, "Removed processed spool entry {}", entry.name);
            processed += 1;
        }

        Ok(processed)
    }

    /// Reschedule `entry` one generation later, or dead-letter it once the
    /// retry policy is exhausted.
    ///
    /// # Errors
    ///
    /// If the rename fails.
    pub async fn defer(&self, entry: &SpoolEntry) -> Result<Deferral> {
        let generation = entry.name.state().generation().saturating_add(1);
        let retry = self.config.retry();

        if !retry.should_retry(generation) {
            return self.dead_letter(entry).await.map(Deferral::DeadLettered);
        }

        let name = entry.name.with_schedule(
            retry.next_attempt_at(now(), generation),
            EntryState::Deferred(generation),
        );
        let deferred = Self::place(&entry.path, self.path(), name).await?;

        internal!(
            level = DEBUG,
            "Deferred spool entry {} to {} (generation {generation})",
            entry.name,
            deferred.name
        );

        Ok(Deferral::Deferred(deferred))
    }

    async fn dead_letter(&self, entry: &SpoolEntry) -> Result<PathBuf> {
        let SpoolEntry { path, .. } =
            Self::place(&entry.path, self.dead_letter_path(), entry.name.clone()).await?;

        internal!(
            level = WARN,
            "Moved spool entry {} to dead letters at {}",
            entry.name,
            path.display()
        );

        Ok(path)
    }

    /// Delete every visible entry, deferred or not. Returns how many were
    /// removed.
    ///
    /// # Errors
    ///
    /// If the directory cannot be listed or a file cannot be removed.
    pub async fn clear(&self) -> Result<usize> {
        let entries = self.entries().await?;
        for entry in &entries {
            fs::remove_file(&entry.path).await?;
        }

        internal!(level = INFO, "Cleared {} spool entries", entries.len());
        Ok(entries.len())
    }

    /// Entries in the dead-letter directory, in name order.
    ///
    /// # Errors
    ///
    /// If the dead-letter directory cannot be listed.
    pub async fn dead_letters(&self) -> Result<Vec<SpoolEntry>> {
        Self::list(self.dead_letter_path()).await
    }

    /// Move a dead-lettered entry back into the spool as a new entry.
    ///
    /// # Errors
    ///
    /// [`SpoolError::InvalidEntryName`] for a name that is not a spool
    /// name, [`SpoolError::NotFound`] if no such dead letter exists.
    pub async fn revive(&self, name: &str) -> Result<SpoolEntryName> {
        let dead: SpoolEntryName = name.parse()?;
        let from = self.dead_letter_path().join(dead.to_string());

        if !fs::try_exists(&from).await? {
            return Err(SpoolError::NotFound(name.to_string()));
        }

        let revived = Self::place(&from, self.path(), dead.with_schedule(now(), EntryState::New))
            .await?
            .name;

        internal!(level = INFO, "Revived dead letter {dead} as {revived}");
        Ok(revived)
    }
}
