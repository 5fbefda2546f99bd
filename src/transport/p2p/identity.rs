//! Loads, generates, and persists the endpoint's long-lived Ed25519 secret
//! key. The key file is written atomically (temp file + rename) with
//! owner-only permissions so a crash mid-write never leaves a torn key.

use std::fs;
use std::path::{Path, PathBuf};

use iroh::SecretKey;

pub const KEY_FILE_NAME: &str = "xplorer-identity.key";

pub fn key_path(storage_path: &Path) -> PathBuf {
    storage_path.join(KEY_FILE_NAME)
}

/// Load the secret key from `storage_path`, generating and persisting a new
/// one if none exists yet.
pub fn load_or_generate(storage_path: &Path) -> anyhow::Result<SecretKey> {
    fs::create_dir_all(storage_path)?;
    let path = key_path(storage_path);

    if let Ok(bytes) = fs::read(&path) {
        let key_bytes: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| anyhow::anyhow!("identity key file is not 32 bytes"))?;
        return Ok(SecretKey::from_bytes(&key_bytes));
    }

    let secret_key = SecretKey::generate();
    persist_atomically(&path, &secret_key.to_bytes())?;
    Ok(secret_key)
}

/// Read the raw 32 bytes on disk, if any.
pub fn export(storage_path: &Path) -> anyhow::Result<Option<[u8; 32]>> {
    let path = key_path(storage_path);
    match fs::read(&path) {
        Ok(bytes) => {
            let key_bytes: [u8; 32] = bytes
                .as_slice()
                .try_into()
                .map_err(|_| anyhow::anyhow!("identity key file is not 32 bytes"))?;
            Ok(Some(key_bytes))
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

/// Persist `key_bytes` and clear every other file in `storage_path` so the
/// endpoint re-initializes cleanly with the new identity on next start.
pub fn import(storage_path: &Path, key_bytes: &[u8]) -> anyhow::Result<()> {
    anyhow::ensure!(key_bytes.len() == 32, "secret key must be exactly 32 bytes");
    fs::create_dir_all(storage_path)?;
    clear_storage(storage_path)?;
    persist_atomically(&key_path(storage_path), key_bytes)
}

/// Delete the key file and clear the storage directory so a fresh identity
/// is generated on next start.
pub fn reset(storage_path: &Path) -> anyhow::Result<()> {
    clear_storage(storage_path)
}

fn clear_storage(storage_path: &Path) -> anyhow::Result<()> {
    if !storage_path.exists() {
        return Ok(());
    }
    for entry in fs::read_dir(storage_path)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            fs::remove_dir_all(path)?;
        } else {
            fs::remove_file(path)?;
        }
    }
    Ok(())
}

fn persist_atomically(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, bytes)?;
    set_owner_only_permissions(&tmp_path)?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(unix)]
fn set_owner_only_permissions(path: &Path) -> anyhow::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_owner_only_permissions(_path: &Path) -> anyhow::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_and_reloads_the_same_identity() {
        let dir = tempfile::tempdir().unwrap();
        let first = load_or_generate(dir.path()).unwrap();
        let second = load_or_generate(dir.path()).unwrap();
        assert_eq!(first.to_bytes(), second.to_bytes());
    }

    #[test]
    fn export_returns_none_before_any_key_exists() {
        let dir = tempfile::tempdir().unwrap();
        assert!(export(dir.path()).unwrap().is_none());
    }

    #[test]
    fn import_then_load_recovers_the_same_identity() {
        let dir = tempfile::tempdir().unwrap();
        let original = load_or_generate(dir.path()).unwrap();
        let exported = export(dir.path()).unwrap().unwrap();

        reset(dir.path()).unwrap();
        import(dir.path(), &exported).unwrap();

        let reloaded = load_or_generate(dir.path()).unwrap();
        assert_eq!(original.to_bytes(), reloaded.to_bytes());
    }

    #[test]
    fn reset_changes_the_identity_on_next_load() {
        let dir = tempfile::tempdir().unwrap();
        let first = load_or_generate(dir.path()).unwrap();
        reset(dir.path()).unwrap();
        let second = load_or_generate(dir.path()).unwrap();
        assert_ne!(first.to_bytes(), second.to_bytes());
    }

    #[test]
    fn import_rejects_wrong_length_keys() {
        let dir = tempfile::tempdir().unwrap();
        assert!(import(dir.path(), &[0u8; 16]).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn key_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        load_or_generate(dir.path()).unwrap();
        let meta = fs::metadata(key_path(dir.path())).unwrap();
        assert_eq!(meta.permissions().mode() & 0o777, 0o600);
    }
}
