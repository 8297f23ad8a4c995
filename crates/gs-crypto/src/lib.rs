use ed25519_dalek::{Signature, Signer as DalekSigner, SigningKey};
use rand::rngs::OsRng;
use thiserror::Error;
use zeroize::{Zeroize, Zeroizing};

pub const SECRET_KEY_LEN: usize = 32;
pub const KEYPAIR_LEN: usize = 64;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("keypair must be {KEYPAIR_LEN} bytes, got {0}")]
    InvalidLength(usize),
    #[error("keypair public half does not match its secret half")]
    PublicKeyMismatch,
    #[error("keypair file is not a JSON byte array: {0}")]
    Format(String),
}

/// Signs raw ledger messages with an ed25519 key.
pub trait MessageSigner: Send + Sync {
    fn public_key_bytes(&self) -> [u8; 32];
    fn sign_message(&self, message: &[u8]) -> [u8; 64];

    fn address(&self) -> String {
        bs58::encode(self.public_key_bytes()).into_string()
    }
}

pub struct Ed25519Signer {
    signing_key: SigningKey,
}

impl Ed25519Signer {
    pub fn new_random() -> Self {
        let mut rng = OsRng;
        let signing_key = SigningKey::generate(&mut rng);
        Self { signing_key }
    }

    pub fn from_secret_key_bytes(secret_key: [u8; SECRET_KEY_LEN]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(&secret_key),
        }
    }

    /// Accepts the 64-byte `secret || public` layout used by Solana keypair files.
    pub fn from_keypair_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        if bytes.len() != KEYPAIR_LEN {
            return Err(KeyError::InvalidLength(bytes.len()));
        }

        let mut secret = [0_u8; SECRET_KEY_LEN];
        secret.copy_from_slice(&bytes[..SECRET_KEY_LEN]);
        let signer = Self::from_secret_key_bytes(secret);
        secret.zeroize();

        if signer.public_key_bytes()[..] != bytes[SECRET_KEY_LEN..] {
            return Err(KeyError::PublicKeyMismatch);
        }

        Ok(signer)
    }

    /// Parses a keypair file body such as `[12, 201, ...]`.
    pub fn from_keypair_json(json: &str) -> Result<Self, KeyError> {
        let bytes: Zeroizing<Vec<u8>> = Zeroizing::new(
            serde_json::from_str(json.trim()).map_err(|err| KeyError::Format(err.to_string()))?,
        );
        Self::from_keypair_bytes(&bytes)
    }

    pub fn to_keypair_json(&self) -> Zeroizing<String> {
        let mut bytes = Zeroizing::new(Vec::with_capacity(KEYPAIR_LEN));
        bytes.extend_from_slice(&self.signing_key.to_bytes());
        bytes.extend_from_slice(&self.public_key_bytes());
        let rendered: Vec<String> = bytes.iter().map(|byte| byte.to_string()).collect();
        Zeroizing::new(format!("[{}]", rendered.join(",")))
    }
}

impl MessageSigner for Ed25519Signer {
    fn public_key_bytes(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    fn sign_message(&self, message: &[u8]) -> [u8; 64] {
        let signature: Signature = self.signing_key.sign(message);
        signature.to_bytes()
    }
}
