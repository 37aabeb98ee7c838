//! Local credential table: usernames mapped to argon2 PHC hashes, persisted as JSON.
//! This is the reference login backend; the gates never read it directly.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use parking_lot::RwLock;
use password_hash::{PasswordHash, SaltString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::identity::ADMIN_PRINCIPAL;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("users file {path}: {source}")]
    Io { path: PathBuf, #[source] source: std::io::Error },
    #[error("users file {path} is not valid JSON: {source}")]
    Parse { path: PathBuf, #[source] source: serde_json::Error },
    #[error("password hashing failed: {0}")]
    Hash(String),
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct UsersFile {
    #[serde(default)]
    users: BTreeMap<String, String>,
}

pub fn hash_password(password: &str) -> Result<String, CredentialError> {
    let mut salt_bytes = [0u8; 16];
    getrandom::getrandom(&mut salt_bytes).map_err(|e| CredentialError::Hash(e.to_string()))?;
    let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| CredentialError::Hash(e.to_string()))?;
    let argon2 = Argon2::default();
    let phc = argon2.hash_password(password.as_bytes(), &salt).map_err(|e| CredentialError::Hash(e.to_string()))?.to_string();
    Ok(phc)
}

pub fn verify_password(hash: &str, password: &str) -> bool {
    if let Ok(parsed) = PasswordHash::new(hash) {
        let argon2 = Argon2::default();
        argon2.verify_password(password.as_bytes(), &parsed).is_ok()
    } else { false }
}

fn read_users(path: &Path) -> Result<UsersFile, CredentialError> {
    if !path.exists() { return Ok(UsersFile::default()); }
    let bytes = std::fs::read(path).map_err(|source| CredentialError::Io { path: path.to_path_buf(), source })?;
    serde_json::from_slice(&bytes).map_err(|source| CredentialError::Parse { path: path.to_path_buf(), source })
}

fn write_users(path: &Path, file: &UsersFile) -> Result<(), CredentialError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|source| CredentialError::Io { path: dir.to_path_buf(), source })?;
    }
    let text = serde_json::to_vec_pretty(file).map_err(|source| CredentialError::Parse { path: path.to_path_buf(), source })?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, text).map_err(|source| CredentialError::Io { path: tmp.clone(), source })?;
    std::fs::rename(&tmp, path).map_err(|source| CredentialError::Io { path: path.to_path_buf(), source })
}

/// Create the users file with the admin account if it does not exist yet.
pub fn ensure_default_admin(path: &Path, admin_password: &str) -> Result<(), CredentialError> {
    if path.exists() { return Ok(()); }
    let mut file = UsersFile::default();
    file.users.insert(ADMIN_PRINCIPAL.to_string(), hash_password(admin_password)?);
    write_users(path, &file)?;
    info!(target: "forte::security", "seeded admin account in {}", path.display());
    Ok(())
}

/// In-memory view of the users file.
#[derive(Debug)]
pub struct UserTable {
    path: PathBuf,
    users: RwLock<BTreeMap<String, String>>,
}

impl UserTable {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, CredentialError> {
        let path = path.into();
        let file = read_users(&path)?;
        Ok(Self { path, users: RwLock::new(file.users) })
    }

    pub fn authenticate(&self, username: &str, password: &str) -> bool {
        let hash = self.users.read().get(username).cloned();
        match hash {
            Some(h) => verify_password(&h, password),
            None => false,
        }
    }

    /// Add or replace a user and persist the table.
    pub fn set_password(&self, username: &str, password: &str) -> Result<(), CredentialError> {
        let hash = hash_password(password)?;
        let mut users = self.users.write();
        users.insert(username.to_string(), hash);
        write_users(&self.path, &UsersFile { users: users.clone() })
    }

    pub fn contains(&self, username: &str) -> bool { self.users.read().contains_key(username) }

    pub fn len(&self) -> usize { self.users.read().len() }

    pub fn is_empty(&self) -> bool { self.users.read().is_empty() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn seeds_admin_once_and_verifies() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("users.json");
        ensure_default_admin(&path, "pw").unwrap();
        ensure_default_admin(&path, "other").unwrap();
        let table = UserTable::load(&path).unwrap();
        assert_eq!(table.len(), 1);
        assert!(table.authenticate("forte", "pw"));
        assert!(!table.authenticate("forte", "other"));
        assert!(!table.authenticate("nobody", "pw"));
    }

    #[test]
    fn set_password_persists() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("nested").join("users.json");
        let table = UserTable::load(&path).unwrap();
        assert!(table.is_empty());
        table.set_password("alice", "wonderland").unwrap();
        let reloaded = UserTable::load(&path).unwrap();
        assert!(reloaded.contains("alice"));
        assert!(reloaded.authenticate("alice", "wonderland"));
    }

    #[test]
    fn malformed_file_is_an_error() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("users.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(UserTable::load(&path), Err(CredentialError::Parse { .. })));
    }

    #[test]
    fn garbage_hash_never_verifies() {
        assert!(!verify_password("not-a-phc-string", "x"));
        let phc = hash_password("x").unwrap();
        assert!(verify_password(&phc, "x"));
    }
}
