/// Cryptographic primitives for the vault.
///
/// This is the only module that touches cipher and curve crates directly.
/// Everything above it speaks in terms of `seal_sym`/`open_sym`,
/// `seal_asym`/`open_asym` and the zeroize-on-drop owner types.
pub mod aead;
pub mod boxes;
pub mod sensitive;
