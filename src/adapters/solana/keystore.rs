//! Agent Wallet Key Store
//!
//! One custodial keypair per user, sealed with AES-256-GCM and persisted to a
//! JSON file. Writes go through a temp file and rename so a crash never
//! leaves a truncated store behind.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use chrono::{DateTime, Utc};
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use solana_sdk::signature::{Keypair, Signer};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use crate::ports::storage::{KeyStore, KeyStoreError, WalletInfo};

/// Decode a 64-hex-char AES-256 key
pub fn parse_encryption_key(hex_key: &str) -> Result<[u8; 32], KeyStoreError> {
    let bytes = hex::decode(hex_key.trim()).map_err(|e| KeyStoreError::InvalidKey(e.to_string()))?;
    bytes
        .try_into()
        .map_err(|b: Vec<u8>| KeyStoreError::InvalidKey(format!("expected 32 bytes, got {}", b.len())))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SealedWallet {
    user_id: String,
    public_key: String,
    ciphertext: String,
    iv: String,
    auth_tag: String,
    created_at: DateTime<Utc>,
}

impl SealedWallet {
    fn info(&self, already_exists: bool) -> WalletInfo {
        WalletInfo {
            user_id: self.user_id.clone(),
            public_key: self.public_key.clone(),
            created_at: self.created_at,
            already_exists,
        }
    }
}

pub struct FileKeyStore {
    path: PathBuf,
    key: LessSafeKey,
    rng: SystemRandom,
    write_lock: Mutex<()>,
}

impl FileKeyStore {
    /// Store at `<data_dir>/wallets.json`
    pub fn open(data_dir: &Path, encryption_key: &[u8; 32]) -> Result<Self, KeyStoreError> {
        let unbound =
            UnboundKey::new(&AES_256_GCM, encryption_key).map_err(|_| KeyStoreError::InvalidKey("rejected by AES-256-GCM".into()))?;
        Ok(Self {
            path: data_dir.join("wallets.json"),
            key: LessSafeKey::new(unbound),
            rng: SystemRandom::new(),
            write_lock: Mutex::new(()),
        })
    }

    async fn load(&self) -> Result<Vec<SealedWallet>, KeyStoreError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) if content.trim().is_empty() => Ok(Vec::new()),
            Ok(content) => serde_json::from_str(&content).map_err(|e| KeyStoreError::Serialization(e.to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(KeyStoreError::Io(e.to_string())),
        }
    }

    async fn save(&self, wallets: &[SealedWallet]) -> Result<(), KeyStoreError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| KeyStoreError::Io(e.to_string()))?;
        }
        let json = serde_json::to_vec_pretty(wallets).map_err(|e| KeyStoreError::Serialization(e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| KeyStoreError::Io(e.to_string()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| KeyStoreError::Io(e.to_string()))
    }

    fn seal(&self, user_id: &str, keypair: &Keypair) -> Result<SealedWallet, KeyStoreError> {
        let mut iv = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut iv)
            .map_err(|_| KeyStoreError::Encryption("random IV unavailable".into()))?;

        let mut in_out = keypair.to_bytes().to_vec();
        let tag = self
            .key
            .seal_in_place_separate_tag(Nonce::assume_unique_for_key(iv), Aad::empty(), &mut in_out)
            .map_err(|_| KeyStoreError::Encryption("seal failed".into()))?;

        Ok(SealedWallet {
            user_id: user_id.to_string(),
            public_key: keypair.pubkey().to_string(),
            ciphertext: B64.encode(&in_out),
            iv: B64.encode(iv),
            auth_tag: B64.encode(tag.as_ref()),
            created_at: Utc::now(),
        })
    }

    fn unseal(&self, sealed: &SealedWallet) -> Result<Keypair, KeyStoreError> {
        let decode = |field: &str| B64.decode(field).map_err(|e| KeyStoreError::Decryption(e.to_string()));
        let iv: [u8; NONCE_LEN] = decode(&sealed.iv)?
            .try_into()
            .map_err(|_| KeyStoreError::Decryption("bad IV length".into()))?;

        let mut buf = decode(&sealed.ciphertext)?;
        buf.extend_from_slice(&decode(&sealed.auth_tag)?);

        let plain = self
            .key
            .open_in_place(Nonce::assume_unique_for_key(iv), Aad::empty(), &mut buf)
            .map_err(|_| KeyStoreError::Decryption("authentication failed".into()))?;

        let keypair = Keypair::try_from(&plain[..]).map_err(|e| KeyStoreError::Decryption(e.to_string()))?;
        if keypair.pubkey().to_string() != sealed.public_key {
            return Err(KeyStoreError::KeyMismatch(sealed.public_key.clone()));
        }
        Ok(keypair)
    }
}

#[async_trait]
impl KeyStore for FileKeyStore {
    async fn create(&self, user_id: &str) -> Result<WalletInfo, KeyStoreError> {
        let _guard = self.write_lock.lock().await;
        let mut wallets = self.load().await?;

        if let Some(existing) = wallets.iter().find(|w| w.user_id == user_id) {
            return Ok(existing.info(true));
        }

        let keypair = Keypair::new();
        let sealed = self.seal(user_id, &keypair)?;
        let info = sealed.info(false);
        wallets.push(sealed);
        self.save(&wallets).await?;

        tracing::info!("Created agent wallet {} for user {}", info.public_key, user_id);
        Ok(info)
    }

    async fn wallet_for_user(&self, user_id: &str) -> Result<Option<WalletInfo>, KeyStoreError> {
        Ok(self
            .load()
            .await?
            .iter()
            .find(|w| w.user_id == user_id)
            .map(|w| w.info(true)))
    }

    async fn keypair(&self, address: &str) -> Result<Option<Keypair>, KeyStoreError> {
        let wallets = self.load().await?;
        match wallets.iter().find(|w| w.public_key == address) {
            Some(sealed) => self.unseal(sealed).map(Some),
            None => Ok(None),
        }
    }
}
