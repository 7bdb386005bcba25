// src/keys.rs
use async_trait::async_trait;
use ethers::signers::coins_bip39::English;
use ethers::signers::{LocalWallet, MnemonicBuilder, Signer};
use ethers::types::{Address, Signature, H256};
use tracing::debug;

use crate::error::{Result, UserOpError};

/// Source of signer keys, in the order their signatures are concatenated.
#[async_trait]
pub trait KeyProvider: Send + Sync {
    fn identities(&self) -> Vec<Address>;

    /// Personal-message signature (`\x19Ethereum Signed Message:\n32` prefix)
    /// over `hash` with the key at `index`.
    async fn sign_personal(&self, index: usize, hash: H256) -> Result<Signature>;
}

/// In-process keys.
#[derive(Debug, Clone)]
pub struct LocalKeys {
    wallets: Vec<LocalWallet>,
}

impl LocalKeys {
    pub fn new(wallets: Vec<LocalWallet>) -> Result<Self> {
        if wallets.is_empty() {
            return Err(UserOpError::InvalidParameters("no signer keys configured".into()));
        }
        Ok(Self { wallets })
    }

    pub fn from_private_keys<S: AsRef<str>>(keys: &[S]) -> Result<Self> {
        let wallets = keys
            .iter()
            .map(|key| {
                key.as_ref()
                    .trim()
                    .parse::<LocalWallet>()
                    .map_err(|e| UserOpError::InvalidParameters(format!("private key: {e}")))
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(wallets)
    }

    /// Derives one key per index along `m/44'/60'/0'/0/{index}`.
    pub fn from_mnemonic(phrase: &str, indices: &[u32]) -> Result<Self> {
        let wallets = indices
            .iter()
            .map(|&index| {
                MnemonicBuilder::<English>::default()
                    .phrase(phrase)
                    .index(index)
                    .and_then(|builder| builder.build())
                    .map_err(|e| UserOpError::InvalidParameters(format!("mnemonic index {index}: {e}")))
            })
            .collect::<Result<Vec<_>>>()?;
        debug!("Derived {} signer keys from mnemonic", wallets.len());
        Self::new(wallets)
    }

    pub fn len(&self) -> usize {
        self.wallets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wallets.is_empty()
    }
}

#[async_trait]
impl KeyProvider for LocalKeys {
    fn identities(&self) -> Vec<Address> {
        self.wallets.iter().map(Signer::address).collect()
    }

    async fn sign_personal(&self, index: usize, hash: H256) -> Result<Signature> {
        let wallet = self.wallets.get(index).ok_or_else(|| {
            UserOpError::InvalidParameters(format!("no signer key at index {index}"))
        })?;
        wallet
            .sign_message(hash)
            .await
            .map_err(|e| UserOpError::Signing(e.to_string()))
    }
}
