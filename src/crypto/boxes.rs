/// Authenticated asymmetric encryption for shared secrets.
///
/// X25519 Diffie-Hellman between the sender scalar and the recipient point,
/// the shared point run through a domain-separated BLAKE3 keyed hash, then
/// the same AEAD as the symmetric path. DH commutes, so
/// `seal_asym(a_priv, b_pub, ..)` opens with `open_asym(b_priv, a_pub, ..)`
/// and neither side needs the other's scalar.
use rand::rngs::OsRng;
use subtle::ConstantTimeEq;
use x25519_dalek::{PublicKey, StaticSecret};

use crate::crypto::aead::{self, NONCE_LEN};
use crate::crypto::sensitive::SensitiveBytes32;
use crate::error::Result;

/// Domain separator for deriving an AEAD key from a DH shared point.
const BOX_DOMAIN: &[u8; 32] = b"coffer-box-v1-key-derivation!!!!";

/// Generate an X25519 keypair. The private scalar comes back in a
/// zeroize-on-drop owner.
pub fn keypair() -> ([u8; 32], SensitiveBytes32) {
    let secret = StaticSecret::random_from_rng(OsRng);
    let public = PublicKey::from(&secret);
    (public.to_bytes(), SensitiveBytes32::new(secret.to_bytes()))
}

/// X25519 base-point multiplication: derive the public key for a scalar.
pub fn scalar_base_mult(scalar: &SensitiveBytes32) -> [u8; 32] {
    let secret = StaticSecret::from(*scalar.as_bytes());
    PublicKey::from(&secret).to_bytes()
}

/// Derive the AEAD key both directions of the DH agree on.
fn shared_key(scalar: &SensitiveBytes32, point: &[u8; 32]) -> SensitiveBytes32 {
    let secret = StaticSecret::from(*scalar.as_bytes());
    let shared = secret.diffie_hellman(&PublicKey::from(*point));
    SensitiveBytes32::new(blake3::keyed_hash(BOX_DOMAIN, shared.as_bytes()).into())
}

/// Encrypt `plaintext` so that only the holder of the scalar matching
/// `recipient_pub` can open it, authenticated as coming from `sender_priv`.
pub fn seal_asym(
    sender_priv: &SensitiveBytes32,
    recipient_pub: &[u8; 32],
    nonce: &[u8; NONCE_LEN],
    plaintext: &[u8],
) -> Result<Vec<u8>> {
    let key = shared_key(sender_priv, recipient_pub);
    aead::seal_sym(&key, nonce, plaintext)
}

/// Open a box sealed by `seal_asym`, from the recipient's side.
pub fn open_asym(
    recipient_priv: &SensitiveBytes32,
    sender_pub: &[u8; 32],
    nonce: &[u8; NONCE_LEN],
    ciphertext: &[u8],
) -> Result<Vec<u8>> {
    let key = shared_key(recipient_priv, sender_pub);
    aead::open_sym(&key, nonce, ciphertext)
}

/// Constant-time byte comparison. No early exit on mismatch; a length
/// difference is not secret and fails immediately.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::aead::generate_nonce;

    #[test]
    fn test_box_roundtrip() {
        let (alice_pub, alice_priv) = keypair();
        let (bob_pub, bob_priv) = keypair();
        let nonce = generate_nonce().unwrap();

        let sealed = seal_asym(&alice_priv, &bob_pub, &nonce, b"wrapped key").unwrap();
        let opened = open_asym(&bob_priv, &alice_pub, &nonce, &sealed).unwrap();
        assert_eq!(&opened, b"wrapped key");
    }

    #[test]
    fn test_wrong_recipient_fails() {
        let (alice_pub, alice_priv) = keypair();
        let (bob_pub, _) = keypair();
        let (_, eve_priv) = keypair();
        let nonce = generate_nonce().unwrap();

        let sealed = seal_asym(&alice_priv, &bob_pub, &nonce, b"wrapped key").unwrap();
        assert!(open_asym(&eve_priv, &alice_pub, &nonce, &sealed).is_err());
    }

    #[test]
    fn test_wrong_sender_pub_fails() {
        let (_, alice_priv) = keypair();
        let (bob_pub, bob_priv) = keypair();
        let (eve_pub, _) = keypair();
        let nonce = generate_nonce().unwrap();

        let sealed = seal_asym(&alice_priv, &bob_pub, &nonce, b"wrapped key").unwrap();
        assert!(open_asym(&bob_priv, &eve_pub, &nonce, &sealed).is_err());
    }

    #[test]
    fn test_scalar_base_mult_matches_keypair() {
        let (public, private) = keypair();
        assert_eq!(scalar_base_mult(&private), public);
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
        assert!(constant_time_eq(b"", b""));
    }
}
