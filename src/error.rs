use std::path::PathBuf;

/// The error cases callers are expected to branch on. Everything else is
/// wrapped in `anyhow` context on the way up.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A requested thing (tool, version, remote resource) does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The resolved version is absent from the installs directory.
    #[error("{name}@{version} is not installed")]
    VersionNotInstalled { name: String, version: String },

    /// Downloaded file did not match the checksum the plugin provided.
    /// Install aborts; no partial state is retained.
    #[error("checksum mismatch for {}", file.display())]
    ChecksumMismatch { file: PathBuf },

    /// An optional hook declined to answer. Not a failure: the caller falls
    /// back to its documented default behaviour.
    #[error("no result provided")]
    NoResultProvided,

    /// No plugin manifest exists for the tool.
    #[error("no plugin manifest for {0}")]
    ManifestNotFound(String),
}

impl Error {
    pub fn version_not_installed(name: &str, version: &str) -> Error {
        Error::VersionNotInstalled {
            name: name.to_string(),
            version: version.to_string(),
        }
    }
}
