//! Admin-time errors. Every variant here corresponds to one of spec.md
//! §6/§7's "admin-time validation failures ... reported to operator with
//! non-zero exit; DB file unchanged" -- `main` is the only place that
//! turns one of these into a process exit code, so the db-write call sites
//! in `commands` can return early on error with the db untouched.

use keys_protocol::DomainParseError;

#[derive(Debug, thiserror::Error)]
pub enum AdminError {
    #[error(transparent)]
    Core(#[from] keys_core::CoreError),

    #[error("key '{0}' already exists")]
    DuplicateName(String),

    #[error("key '{0}' not found")]
    NotFound(String),

    #[error("invalid domain: {0}")]
    Domain(#[from] DomainParseError),

    #[error("key data failed validation")]
    InvalidKeyData,

    #[error("no --name given and the key has no comment to derive one from")]
    NameRequired,

    #[error("--keyfile or --keydata is required")]
    KeyDataRequired,

    #[error("failed to read keyfile {path}: {source}")]
    ReadKeyfile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read pidfile {path}: {source}")]
    ReadPidfile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("pidfile {path} does not contain a valid pid: {text}")]
    BadPid { path: String, text: String },

    #[error("failed to signal pid {pid}: {source}")]
    Signal {
        pid: i32,
        #[source]
        source: nix::errno::Errno,
    },

    #[error("failed to serialize output: {0}")]
    Serialize(#[from] serde_json::Error),
}
