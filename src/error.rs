use thiserror::Error;

/// The single error type for all vault operations.
///
/// Messages are intentionally terse: they say what failed without revealing
/// anything about cryptographic state.
#[derive(Error, Debug)]
pub enum VaultError {
    /// The operation needs the master key and the vault is sealed.
    #[error("vault is sealed")]
    Sealed,

    /// A master secret already exists; `initialise` may run only once.
    #[error("vault already initialised")]
    AlreadyInitialised,

    /// `"master"` is reserved for the vault's own key material.
    #[error("name is reserved")]
    ReservedName,

    /// AEAD authentication failed: wrong key, tampered or truncated data.
    #[error("unable to decrypt")]
    DecryptFailed,

    /// The system randomness source failed to produce bytes.
    #[error("randomness source failed")]
    EntropyFailed,

    /// A root secret with this name already exists.
    #[error("secret already exists")]
    Duplicate,

    /// The requested row does not exist.
    #[error("not found")]
    NotFound,

    /// Malformed name, base64, or missing required field.
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),

    /// Opaque persistence failure.
    #[error("storage error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, VaultError>;
