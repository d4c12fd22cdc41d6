use std::path::{Path, PathBuf};

use anyhow::Context;
use mailtools_qmqp::{ClientConfig, ServerConfig};
use mailtools_spool::SpoolConfig;
use serde::Deserialize;

/// Searched, in order, when no configuration file is named explicitly.
pub const DEFAULT_CONFIG_PATHS: [&str; 2] = [
    "./mailtools.config.ron",
    "/etc/mailtools/mailtools.config.ron",
];

/// The whole configuration document.
///
/// ```ron
/// MailTools (
///     spool: (path: "/var/spool/mailtools", dead_letter: "/var/spool/mailtools.dead"),
///     client: (servers: ["10.0.0.5", "10.0.0.6:6280"]),
///     server: (listen: "0.0.0.0:628"),
/// )
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct MailTools {
    #[serde(default)]
    pub spool: SpoolConfig,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

impl MailTools {
    /// Parse a RON configuration document.
    ///
    /// # Errors
    ///
    /// If the document is not valid RON or a spool path fails validation.
    pub fn from_ron(document: &str) -> anyhow::Result<Self> {
        Ok(ron::from_str(document)?)
    }

    /// Read and parse the configuration file at `path`.
    ///
    /// # Errors
    ///
    /// If the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let document = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        Self::from_ron(&document)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Load the configuration named by `explicit`, or the first default
    /// path that exists. Built-in defaults apply when there is none.
    ///
    /// # Errors
    ///
    /// If `explicit` names a missing file, or the chosen file is invalid.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        match find_config_file(explicit, &DEFAULT_CONFIG_PATHS.map(PathBuf::from))? {
            Some(path) => Self::from_file(&path),
            None => Ok(Self::default()),
        }
    }

    /// Replace the spool directories, keeping the retry policy.
    ///
    /// # Errors
    ///
    /// If the resulting spool configuration fails validation.
    pub fn with_spool_paths(
        mut self,
        path: Option<PathBuf>,
        dead_letter: Option<PathBuf>,
    ) -> anyhow::Result<Self> {
        if path.is_none() && dead_letter.is_none() {
            return Ok(self);
        }

        self.spool = SpoolConfig::builder()
            .path(path.unwrap_or_else(|| self.spool.path().to_path_buf()))
            .dead_letter(dead_letter.unwrap_or_else(|| self.spool.dead_letter().to_path_buf()))
            .retry(self.spool.retry().clone())
            .build()?;

        Ok(self)
    }
}

/// Find the configuration file using the following precedence:
/// 1. `explicit` (the `MAILTOOLS_CONFIG` environment variable or `--config`)
/// 2. each of `defaults`, in order
///
/// # Errors
///
/// If `explicit` is given but does not exist.
pub fn find_config_file(
    explicit: Option<&Path>,
    defaults: &[PathBuf],
) -> anyhow::Result<Option<PathBuf>> {
    if let Some(path) = explicit {
        if path.exists() {
            return Ok(Some(path.to_path_buf()));
        }
        anyhow::bail!("MAILTOOLS_CONFIG points to non-existent file: {}", path.display());
    }

    Ok(defaults.iter().find(|path| path.exists()).cloned())
}
