use std::fs;
use std::path::{Path, PathBuf};

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use tracing::{debug, info};

use crate::constants::{KEYPAIR_SIZE, PRIV_KEY_FILE, PUBKEY_SIZE, PUB_KEY_FILE, SECRET_KEY_SIZE};
use crate::error::KeyError;

/// The signing collaborator the handshake depends on.
///
/// Implementations must be ready before they are handed to a client; a
/// key source that cannot produce usable key material reports it as a
/// [`KeyError`] from its constructor instead.
pub trait Keys: Send + Sync {
    /// Raw public key bytes.
    fn public_key(&self) -> Vec<u8>;

    /// Detached signature over `message`.
    fn sign(&self, message: &[u8]) -> Vec<u8>;

    /// Whether `signature` over `message` verifies under `public_key`.
    fn verify(&self, message: &[u8], signature: &[u8], public_key: &[u8]) -> bool;
}

/// An Ed25519 keypair, held in memory or backed by a key folder.
///
/// A key folder holds `key.pub` and `key.priv` as hex text. The private
/// file stores the 32-byte seed followed by the public key.
#[derive(Clone)]
pub struct KeyRing {
    signing_key: SigningKey,
    folder: Option<PathBuf>,
}

impl KeyRing {
    /// Generate a new random in-memory keyring
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
            folder: None,
        }
    }

    /// In-memory keyring, restored from a hex secret when one is given.
    pub fn memory(secret_hex: Option<&str>) -> Result<Self, KeyError> {
        match secret_hex {
            Some(hex_key) => {
                let bytes = hex::decode(hex_key.trim())?;
                Self::from_secret_bytes(&bytes)
            }
            None => Ok(Self::generate()),
        }
    }

    /// Load the keyring in `folder`, creating the folder and a fresh
    /// keypair on first use.
    pub fn load(folder: impl AsRef<Path>) -> Result<Self, KeyError> {
        let folder = folder.as_ref();
        let priv_path = folder.join(PRIV_KEY_FILE);
        let pub_path = folder.join(PUB_KEY_FILE);

        if !folder.exists() {
            fs::create_dir_all(folder)?;
        }

        if !priv_path.exists() {
            let fresh = Self::generate();
            fs::write(&pub_path, hex::encode(fresh.public_key_bytes()))?;
            fs::write(&priv_path, hex::encode(fresh.secret_bytes()))?;
            info!(folder = %folder.display(), "Generated new keyring");
        }

        let priv_hex = fs::read_to_string(&priv_path)?;
        let bytes = hex::decode(priv_hex.trim())?;
        if bytes.len() != KEYPAIR_SIZE {
            return Err(KeyError::KeyFile(format!(
                "{} must hold {KEYPAIR_SIZE} bytes, found {}",
                priv_path.display(),
                bytes.len()
            )));
        }

        let mut keyring = Self::from_secret_bytes(&bytes)?;
        keyring.folder = Some(folder.to_path_buf());
        debug!(folder = %folder.display(), "Loaded keyring");
        Ok(keyring)
    }

    /// Restore from a 32-byte seed or a 64-byte seed-plus-public-key.
    pub fn from_secret_bytes(secret: &[u8]) -> Result<Self, KeyError> {
        let seed: [u8; SECRET_KEY_SIZE] = secret
            .get(..SECRET_KEY_SIZE)
            .and_then(|s| s.try_into().ok())
            .ok_or(KeyError::InvalidKeyBytes)?;
        let signing_key = SigningKey::from_bytes(&seed);

        match secret.len() {
            SECRET_KEY_SIZE => {}
            KEYPAIR_SIZE => {
                if secret[SECRET_KEY_SIZE..] != signing_key.verifying_key().to_bytes() {
                    return Err(KeyError::KeyFile(
                        "public half does not match the secret seed".into(),
                    ));
                }
            }
            _ => return Err(KeyError::InvalidKeyBytes),
        }

        Ok(Self {
            signing_key,
            folder: None,
        })
    }

    pub fn public_key_bytes(&self) -> [u8; PUBKEY_SIZE] {
        self.signing_key.verifying_key().to_bytes()
    }

    /// Seed followed by public key. Only the owner should ever see this.
    pub fn secret_bytes(&self) -> [u8; KEYPAIR_SIZE] {
        self.signing_key.to_keypair_bytes()
    }

    /// The key folder, `None` for in-memory keyrings.
    pub fn folder(&self) -> Option<&Path> {
        self.folder.as_deref()
    }
}

impl Keys for KeyRing {
    fn public_key(&self) -> Vec<u8> {
        self.public_key_bytes().to_vec()
    }

    fn sign(&self, message: &[u8]) -> Vec<u8> {
        self.signing_key.sign(message).to_bytes().to_vec()
    }

    fn verify(&self, message: &[u8], signature: &[u8], public_key: &[u8]) -> bool {
        verify_signature(public_key, message, signature).is_ok()
    }
}

/// Verify a detached signature against raw public key bytes
pub fn verify_signature(
    pubkey_bytes: &[u8],
    message: &[u8],
    signature: &[u8],
) -> Result<(), KeyError> {
    let pubkey: [u8; PUBKEY_SIZE] = pubkey_bytes
        .try_into()
        .map_err(|_| KeyError::InvalidKeyBytes)?;
    let verifying_key = VerifyingKey::from_bytes(&pubkey).map_err(|_| KeyError::InvalidKeyBytes)?;
    let signature = Signature::from_slice(signature).map_err(|_| KeyError::BadSignature)?;
    verifying_key
        .verify(message, &signature)
        .map_err(|_| KeyError::BadSignature)
}
