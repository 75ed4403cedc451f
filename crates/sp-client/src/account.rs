use std::fmt;
use std::path::{Path, PathBuf};

use k256::ecdsa::SigningKey;
use sha3::{Digest, Keccak256};

use crate::Error;

/// A signing account: secp256k1 key plus its Ethereum-style address.
#[derive(Clone)]
pub struct Account {
    address: String,
    key: SigningKey,
}

impl Account {
    /// Builds an account from a hex private key, with or without `0x`.
    pub fn from_private_key_hex(hex_key: &str) -> Result<Self, Error> {
        let raw = hex::decode(hex_key.trim().trim_start_matches("0x"))
            .map_err(|e| Error::InvalidKey(format!("not hex: {e}")))?;
        let key = SigningKey::from_slice(&raw)
            .map_err(|e| Error::InvalidKey(format!("not a secp256k1 scalar: {e}")))?;
        Ok(Self::from_signing_key(key))
    }

    pub fn from_signing_key(key: SigningKey) -> Self {
        let point = key.verifying_key().to_encoded_point(false);
        // Uncompressed SEC1 point: 0x04 || X || Y.
        let digest = Keccak256::digest(&point.as_bytes()[1..]);
        let address = format!("0x{}", hex::encode(&digest[12..]));
        Self { address, key }
    }

    /// Lowercase `0x`-prefixed address.
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn signing_key(&self) -> &SigningKey {
        &self.key
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

/// Source of the account used to sign requests and chain messages.
pub trait KeyStore: Send + Sync {
    fn default_account(&self) -> Result<Account, Error>;
}

/// Key store backed by a file holding an unencrypted hex private key.
#[derive(Debug, Clone)]
pub struct HexKeyFile {
    path: PathBuf,
}

impl HexKeyFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl KeyStore for HexKeyFile {
    fn default_account(&self) -> Result<Account, Error> {
        let contents = std::fs::read_to_string(&self.path)?;
        Account::from_private_key_hex(&contents)
    }
}
