//! Persisted set of trusted creator wallets: wallets whose tokens, in simulation, reached
//! the profit multiple within one hour. Monotonically grows during a
//! session; grounded on `decision_module.py`'s trusted-creator cache.

use crate::errors::SniperError;
use crate::types::WalletId;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

pub struct CreatorCache {
    path: PathBuf,
    wallets: RwLock<BTreeSet<WalletId>>,
}

impl CreatorCache {
    /// Load the cache from disk, or start empty if the file does not exist
    /// or is malformed.
    pub async fn load<P: Into<PathBuf>>(path: P) -> Self {
        let path = path.into();
        let wallets = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => serde_json::from_str::<BTreeSet<WalletId>>(&contents).unwrap_or_default(),
            Err(_) => BTreeSet::new(),
        };
        Self { path, wallets: RwLock::new(wallets) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn contains(&self, wallet: &WalletId) -> bool {
        self.wallets.read().await.contains(wallet)
    }

    pub async fn len(&self) -> usize {
        self.wallets.read().await.len()
    }

    /// Insert a wallet and persist the whole set atomically. Inserting the
    /// same wallet twice yields size-1 --
    /// `BTreeSet::insert` is already idempotent on duplicates.
    pub async fn insert(&self, wallet: WalletId) -> Result<(), SniperError> {
        let mut guard = self.wallets.write().await;
        guard.insert(wallet);
        self.persist(&guard).await
    }

    async fn persist(&self, wallets: &BTreeSet<WalletId>) -> Result<(), SniperError> {
        let json = serde_json::to_vec_pretty(wallets)
            .map_err(|e| SniperError::data_shape("creator_cache_write", e.to_string()))?;

        // Write-to-temp-then-rename for crash atomicity: a reader never
        // observes a half-written file.
        let tmp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, &json)
            .await
            .map_err(|e| SniperError::system(format!("writing creator cache: {e}")))?;
        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|e| SniperError::system(format!("persisting creator cache: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::pubkey::Pubkey;
    use tempfile::NamedTempFile;

    fn fixed_wallet(byte: u8) -> WalletId {
        let mut b = [0u8; 32];
        b.fill(byte);
        WalletId::new(Pubkey::new_from_array(b))
    }

    #[tokio::test]
    async fn insert_same_wallet_twice_yields_size_one() {
        let tmp = NamedTempFile::new().unwrap();
        let cache = CreatorCache::load(tmp.path().to_path_buf()).await;
        let w = fixed_wallet(1);
        cache.insert(w).await.unwrap();
        cache.insert(w).await.unwrap();
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn persisted_cache_reloads() {
        let tmp = NamedTempFile::new().unwrap();
        let path = tmp.path().to_path_buf();
        {
            let cache = CreatorCache::load(path.clone()).await;
            cache.insert(fixed_wallet(2)).await.unwrap();
        }
        let reloaded = CreatorCache::load(path).await;
        assert!(reloaded.contains(&fixed_wallet(2)).await);
    }

    #[tokio::test]
    async fn missing_file_starts_empty() {
        let cache = CreatorCache::load("/tmp/nonexistent-creator-cache-xyz.json").await;
        assert_eq!(cache.len().await, 0);
    }
}
