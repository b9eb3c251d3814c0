//! Credential vault - encrypted per-supplier session cookies on disk
//!
//! One bundle per supplier at `<dir>/<slug>-cookies.enc`. The bundle is a small
//! JSON envelope (supplier, creation time, ciphertext); the encrypted payload is
//! the JSON list of cookies. File access is serialized per supplier.

pub mod cipher;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::domain::{PriceWatchError, PriceWatchResult, Supplier};
use crate::infrastructure::browser::StoredCookie;
use cipher::VaultCipher;

/// On-disk envelope of one credential bundle
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BundleFile {
    supplier: Supplier,
    created_at: DateTime<Utc>,
    ciphertext: String,
}

/// Metadata about a stored bundle, without decrypting it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleInfo {
    pub supplier: Supplier,
    pub created_at: DateTime<Utc>,
}

pub struct CredentialVault {
    directory: PathBuf,
    cipher: VaultCipher,
    locks: HashMap<Supplier, Mutex<()>>,
}

impl CredentialVault {
    pub fn new(directory: impl Into<PathBuf>, key_material: &str) -> Self {
        let locks = Supplier::ALL.iter().map(|s| (*s, Mutex::new(()))).collect();
        Self {
            directory: directory.into(),
            cipher: VaultCipher::from_key_material(key_material),
            locks,
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn bundle_path(&self, supplier: Supplier) -> PathBuf {
        self.directory.join(format!("{}-cookies.enc", supplier.slug()))
    }

    fn lock(&self, supplier: Supplier) -> &Mutex<()> {
        // Every supplier gets a lock in `new`
        &self.locks[&supplier]
    }

    /// Encrypt and persist cookies, replacing any previous bundle
    pub async fn store(&self, supplier: Supplier, cookies: &[StoredCookie]) -> PriceWatchResult<()> {
        let _guard = self.lock(supplier).lock().await;

        let payload = serde_json::to_vec(cookies)?;
        let ciphertext = self
            .cipher
            .encrypt(&payload)
            .map_err(|e| encryption_failed(supplier, &e))?;
        let bundle = BundleFile {
            supplier,
            created_at: Utc::now(),
            ciphertext,
        };

        tokio::fs::create_dir_all(&self.directory).await?;
        let path = self.bundle_path(supplier);
        let staging = path.with_extension("enc.tmp");
        tokio::fs::write(&staging, serde_json::to_vec_pretty(&bundle)?).await?;
        tokio::fs::rename(&staging, &path).await?;

        info!("🔐 Stored {} cookie(s) for {}", cookies.len(), supplier);
        Ok(())
    }

    /// Read and decrypt the cookies of a supplier
    pub async fn load(&self, supplier: Supplier) -> PriceWatchResult<Vec<StoredCookie>> {
        let _guard = self.lock(supplier).lock().await;

        let bundle = self.read_bundle(supplier).await?;
        let decryption_failed = |reason: String| PriceWatchError::DecryptionFailed { supplier, reason };

        if bundle.supplier != supplier {
            return Err(decryption_failed(format!("bundle belongs to {}", bundle.supplier)));
        }
        let payload = self
            .cipher
            .decrypt(&bundle.ciphertext)
            .map_err(|e| decryption_failed(e.to_string()))?;
        let cookies: Vec<StoredCookie> =
            serde_json::from_slice(&payload).map_err(|e| decryption_failed(e.to_string()))?;

        debug!("Loaded {} cookie(s) for {}", cookies.len(), supplier);
        Ok(cookies)
    }

    /// Delete the bundle. Missing bundles are not an error.
    pub async fn invalidate(&self, supplier: Supplier) -> PriceWatchResult<()> {
        let _guard = self.lock(supplier).lock().await;

        match tokio::fs::remove_file(self.bundle_path(supplier)).await {
            Ok(()) => {
                warn!("🗑️ Invalidated stored session for {}", supplier);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Creation time of the stored bundle, if one exists and is readable
    pub async fn info(&self, supplier: Supplier) -> Option<BundleInfo> {
        let _guard = self.lock(supplier).lock().await;
        self.read_bundle(supplier).await.ok().map(|bundle| BundleInfo {
            supplier,
            created_at: bundle.created_at,
        })
    }

    pub async fn has_bundle(&self, supplier: Supplier) -> bool {
        self.info(supplier).await.is_some()
    }

    async fn read_bundle(&self, supplier: Supplier) -> PriceWatchResult<BundleFile> {
        let raw = match tokio::fs::read(self.bundle_path(supplier)).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(PriceWatchError::CredentialNotFound(supplier));
            }
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&raw).map_err(|e| PriceWatchError::DecryptionFailed {
            supplier,
            reason: format!("unreadable bundle: {e}"),
        })
    }
}

fn encryption_failed(supplier: Supplier, err: &cipher::CipherError) -> PriceWatchError {
    PriceWatchError::EncryptionFailed {
        supplier,
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "vault-test-key-0123456789";

    fn cookie(name: &str, value: &str) -> StoredCookie {
        StoredCookie {
            name: name.to_string(),
            value: value.to_string(),
            domain: ".lca-distribution.com".to_string(),
            path: "/".to_string(),
            expires: Some(1_900_000_000.0),
            http_only: true,
            secure: true,
            same_site: None,
        }
    }

    #[tokio::test]
    async fn stored_cookies_load_back() {
        let dir = tempfile::tempdir().unwrap();
        let vault = CredentialVault::new(dir.path(), KEY);
        let cookies = vec![cookie("PHPSESSID", "abc"), cookie("cart", "42")];

        vault.store(Supplier::Lca, &cookies).await.unwrap();

        assert_eq!(vault.load(Supplier::Lca).await.unwrap(), cookies);
        assert!(vault.has_bundle(Supplier::Lca).await);
        assert!(!vault.has_bundle(Supplier::Kmls).await);
    }

    #[tokio::test]
    async fn bundle_on_disk_does_not_leak_cookie_values() {
        let dir = tempfile::tempdir().unwrap();
        let vault = CredentialVault::new(dir.path(), KEY);
        vault.store(Supplier::Kmls, &[cookie("session", "very-secret-value")]).await.unwrap();

        let raw = std::fs::read_to_string(vault.bundle_path(Supplier::Kmls)).unwrap();
        assert!(!raw.contains("very-secret-value"));
        assert!(raw.contains("v1:"));
    }

    #[tokio::test]
    async fn missing_bundle_is_credential_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let vault = CredentialVault::new(dir.path(), KEY);
        let err = vault.load(Supplier::Kmls).await.unwrap_err();
        assert!(matches!(err, PriceWatchError::CredentialNotFound(Supplier::Kmls)));
    }

    #[tokio::test]
    async fn wrong_key_is_decryption_failure() {
        let dir = tempfile::tempdir().unwrap();
        CredentialVault::new(dir.path(), KEY)
            .store(Supplier::Lca, &[cookie("a", "b")])
            .await
            .unwrap();

        let other = CredentialVault::new(dir.path(), "a-completely-different-key");
        let err = other.load(Supplier::Lca).await.unwrap_err();
        assert!(matches!(err, PriceWatchError::DecryptionFailed { supplier: Supplier::Lca, .. }));
    }

    #[tokio::test]
    async fn tampered_bundle_is_decryption_failure() {
        let dir = tempfile::tempdir().unwrap();
        let vault = CredentialVault::new(dir.path(), KEY);
        vault.store(Supplier::Lca, &[cookie("a", "b")]).await.unwrap();

        let path = vault.bundle_path(Supplier::Lca);
        let mut bundle: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        let ciphertext = bundle["ciphertext"].as_str().unwrap().to_string();
        let flipped = if ciphertext.ends_with('A') { "B" } else { "A" };
        let tampered = format!("{}{}", &ciphertext[..ciphertext.len() - 2], flipped.repeat(2));
        bundle["ciphertext"] = serde_json::Value::String(tampered);
        std::fs::write(&path, bundle.to_string()).unwrap();

        let err = vault.load(Supplier::Lca).await.unwrap_err();
        assert!(matches!(err, PriceWatchError::DecryptionFailed { .. }));
    }

    #[tokio::test]
    async fn invalidate_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let vault = CredentialVault::new(dir.path(), KEY);
        vault.store(Supplier::Kmls, &[cookie("a", "b")]).await.unwrap();

        vault.invalidate(Supplier::Kmls).await.unwrap();
        vault.invalidate(Supplier::Kmls).await.unwrap();
        assert!(!vault.bundle_path(Supplier::Kmls).exists());
    }

    #[tokio::test]
    async fn store_overwrites_previous_bundle() {
        let dir = tempfile::tempdir().unwrap();
        let vault = CredentialVault::new(dir.path(), KEY);
        vault.store(Supplier::Lca, &[cookie("old", "1")]).await.unwrap();
        vault.store(Supplier::Lca, &[cookie("new", "2")]).await.unwrap();

        let loaded = vault.load(Supplier::Lca).await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].name, "new");
    }

    #[test]
    fn sealing_errors_name_the_encryption_step() {
        let err = encryption_failed(Supplier::Kmls, &cipher::CipherError::Encryption);
        assert!(matches!(err, PriceWatchError::EncryptionFailed { supplier: Supplier::Kmls, .. }));
        assert!(err.to_string().contains("could not be encrypted"));
        assert!(!err.to_string().contains("decrypted"));
    }
}
