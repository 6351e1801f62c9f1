/// Process-wide master key state.
///
/// The master key exists in exactly one place: a module-private static
/// behind a reader/writer lock. Sealed is not a separate flag; the vault is
/// sealed exactly when the buffer is all-zero, so the two can never drift
/// apart. Writers (`initialise`, `unseal`, `seal`) hold the write lock for
/// the whole state transition; readers borrow the key through `with_key`,
/// which holds the read lock only for the duration of the primitive calls
/// that consume it.
use std::sync::RwLock;

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::aead;
use crate::crypto::sensitive::SensitiveBytes32;
use crate::error::{Result, VaultError};
use crate::secrets::{Key, Secret};

#[derive(Zeroize, ZeroizeOnDrop)]
struct Master {
    mk: [u8; 32],
}

impl Master {
    const fn new() -> Self {
        Self { mk: [0u8; 32] }
    }

    fn is_sealed(&self) -> bool {
        self.mk.iter().all(|&b| b == 0)
    }
}

static MASTER: RwLock<Master> = RwLock::new(Master::new());

fn read_master() -> std::sync::RwLockReadGuard<'static, Master> {
    MASTER.read().unwrap_or_else(|e| e.into_inner())
}

fn write_master() -> std::sync::RwLockWriteGuard<'static, Master> {
    MASTER.write().unwrap_or_else(|e| e.into_inner())
}

/// True while the master key buffer is all-zero.
pub fn is_sealed() -> bool {
    read_master().is_sealed()
}

/// Zero the master key. Every operation that needs it fails with `Sealed`
/// until the next successful `unseal`.
pub fn seal() {
    write_master().mk.zeroize();
}

/// Create a brand-new master key and the Secret that stores it.
///
/// The returned Secret is named `"master"`, carries the master key sealed
/// under a freshly generated wrapping Key, and still holds that Key's raw
/// scalar so the caller can surface it to the operator exactly once. The
/// wrapping Key is deliberately left unwrapped in storage: wrapping it under
/// the master key it protects would be circular.
///
/// The caller is responsible for the persistence preflight (refusing a
/// second master) before invoking this; the in-memory state is re-checked
/// here under the lock.
pub fn initialise() -> Result<Secret> {
    if !is_sealed() {
        return Err(VaultError::AlreadyInitialised);
    }

    // Build everything fallible before touching the static, so an entropy
    // failure leaves the vault sealed.
    let key = Key::generate("master")?;
    let nonce = aead::generate_nonce()?;

    let mk = aead::generate_key()?;

    let wrapping = key.raw().ok_or(VaultError::InvalidInput(
        "key material is not unwrapped",
    ))?;
    let message = aead::seal_sym(wrapping, &nonce, mk.as_bytes())?;

    let mut guard = write_master();
    if !guard.is_sealed() {
        return Err(VaultError::AlreadyInitialised);
    }
    guard.mk.copy_from_slice(mk.as_bytes());
    drop(guard);

    Ok(Secret::master_record(message, nonce, key))
}

/// Open the stored master Secret with the operator-supplied wrapping key
/// and install the result. The supplied key is consumed and zeroed whether
/// or not the unseal succeeds.
pub fn unseal(master_secret: &Secret, key: SensitiveBytes32) -> Result<()> {
    let mut guard = write_master();

    let mut buf = aead::open_sym(&key, &master_secret.nonce, &master_secret.message)?;
    let mk = SensitiveBytes32::from_slice(&buf);
    buf.zeroize();
    let mk = mk.ok_or(VaultError::DecryptFailed)?;

    guard.mk.copy_from_slice(mk.as_bytes());
    Ok(())
}

/// Run `f` with a borrowed copy of the master key, holding the read lock
/// for the duration of the call. Fails with `Sealed` when the vault is
/// sealed. The copy handed to `f` is zeroed as soon as the call returns.
pub(crate) fn with_key<R>(f: impl FnOnce(&SensitiveBytes32) -> Result<R>) -> Result<R> {
    let guard = read_master();
    if guard.is_sealed() {
        return Err(VaultError::Sealed);
    }
    let mk = SensitiveBytes32::new(guard.mk);
    f(&mk)
}

#[cfg(test)]
pub(crate) mod testing {
    //! The master key is process state, so tests that touch it serialize
    //! on this lock and start from a sealed vault.
    use std::sync::{Mutex, MutexGuard};

    static LOCK: Mutex<()> = Mutex::new(());

    pub(crate) fn exclusive() -> MutexGuard<'static, ()> {
        let guard = LOCK.lock().unwrap_or_else(|e| e.into_inner());
        super::seal();
        guard
    }
}
