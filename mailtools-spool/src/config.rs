use std::path::{Component, Path, PathBuf};

use serde::Deserialize;

use crate::{
    error::{Result, ValidationError},
    retry::RetryPolicy,
};

/// Directories no spool may live under.
const SYSTEM_DIRECTORIES: [&str; 9] = [
    "/etc",
    "/bin",
    "/sbin",
    "/usr/bin",
    "/usr/sbin",
    "/boot",
    "/sys",
    "/proc",
    "/dev",
];

/// Where the spool lives and how it retries.
///
/// ```ron
/// MailTools (
///     spool: (
///         path: "/var/spool/mailtools",
///         dead_letter: "/var/spool/mailtools.dead",
///         retry: (max_generations: 10, base_delay_secs: 60),
///     ),
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpoolConfig {
    path: PathBuf,
    dead_letter: PathBuf,
    retry: RetryPolicy,
}

impl Default for SpoolConfig {
    fn default() -> Self {
        Self {
            path: defaults::path(),
            dead_letter: defaults::dead_letter(),
            retry: RetryPolicy::default(),
        }
    }
}

impl<'de> Deserialize<'de> for SpoolConfig {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct SpoolConfigHelper {
            #[serde(default = "defaults::path")]
            path: PathBuf,
            #[serde(default = "defaults::dead_letter")]
            dead_letter: PathBuf,
            #[serde(default)]
            retry: RetryPolicy,
        }

        let helper = SpoolConfigHelper::deserialize(deserializer)?;
        Self::builder()
            .path(helper.path)
            .dead_letter(helper.dead_letter)
            .retry(helper.retry)
            .build()
            .map_err(serde::de::Error::custom)
    }
}

impl SpoolConfig {
    #[must_use]
    pub fn builder() -> SpoolConfigBuilder {
        SpoolConfigBuilder::default()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn dead_letter(&self) -> &Path {
        &self.dead_letter
    }

    pub const fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Reject paths that traverse upwards, are relative, or sit inside a
    /// system directory.
    pub fn validate_path(path: &Path) -> std::result::Result<(), ValidationError> {
        if path.components().any(|c| c == Component::ParentDir) {
            return Err(ValidationError::ParentDirectory(path.to_path_buf()));
        }

        if !path.is_absolute() {
            return Err(ValidationError::NotAbsolute(path.to_path_buf()));
        }

        if let Some(&prefix) = SYSTEM_DIRECTORIES
            .iter()
            .find(|prefix| path.starts_with(prefix))
        {
            return Err(ValidationError::SystemDirectory {
                prefix,
                path: path.to_path_buf(),
            });
        }

        Ok(())
    }
}

/// Builder for [`SpoolConfig`]; unset fields keep their defaults.
#[derive(Debug, Default)]
pub struct SpoolConfigBuilder {
    path: Option<PathBuf>,
    dead_letter: Option<PathBuf>,
    retry: Option<RetryPolicy>,
}

impl SpoolConfigBuilder {
    #[must_use]
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    #[must_use]
    pub fn dead_letter(mut self, path: impl Into<PathBuf>) -> Self {
        self.dead_letter = Some(path.into());
        self
    }

    #[must_use]
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    /// # Errors
    ///
    /// If either directory fails [`SpoolConfig::validate_path`], or both
    /// name the same directory.
    pub fn build(self) -> Result<SpoolConfig> {
        let path = self.path.unwrap_or_else(defaults::path);
        let dead_letter = self.dead_letter.unwrap_or_else(defaults::dead_letter);

        SpoolConfig::validate_path(&path)?;
        SpoolConfig::validate_path(&dead_letter)?;

        if path == dead_letter {
            return Err(ValidationError::SameDirectory(path).into());
        }

        Ok(SpoolConfig {
            path,
            dead_letter,
            retry: self.retry.unwrap_or_default(),
        })
    }
}

mod defaults {
    use std::path::PathBuf;

    pub fn path() -> PathBuf {
        PathBuf::from("/tmp/maildrop")
    }

    pub fn dead_letter() -> PathBuf {
        PathBuf::from("/tmp/maildrop.dead")
    }
}
