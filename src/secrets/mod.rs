/// Secret and Key entities and the envelope operations over them.
///
/// The key hierarchy has three layers: the process-resident master key
/// (see `crate::master`), one per-secret key per root secret, and one
/// X25519 credential per user. Shares bridge the last two: a share boxes
/// a per-secret key to a user credential so the user can decrypt without
/// the master key being live.
pub mod key;
pub mod secret;

pub use key::Key;
pub use secret::Secret;

/// Names for keys and secrets: non-empty, `[0-9a-zA-Z_.-]` only.
pub(crate) fn valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}
