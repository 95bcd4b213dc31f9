//! The account's Ed25519 identity.

use std::fmt;

use ed25519_dalek::SigningKey;
use swarm_config_core::types::USER_PREFIX;
use swarm_config_core::SessionId;

use crate::error::{Result, StateError};

/// The account keys a State is constructed from.
///
/// The session id is the `05`-prefixed X25519 form of the Ed25519 public
/// key, which is how the account's swarm is addressed.
#[derive(Clone)]
pub struct UserKeys {
    signing_key: SigningKey,
}

impl UserKeys {
    /// Generate a new random identity, for creating an account.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        Self {
            signing_key: SigningKey::generate(&mut rng),
        }
    }

    /// Create from a 32-byte seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// Create from a 32-byte seed or a 64-byte `seed || public key`.
    pub fn from_secret_key(secret: &[u8]) -> Result<Self> {
        match secret.len() {
            32 => {
                let mut seed = [0u8; 32];
                seed.copy_from_slice(secret);
                Ok(Self::from_seed(&seed))
            }
            64 => {
                let mut keypair = [0u8; 64];
                keypair.copy_from_slice(secret);
                let signing_key = SigningKey::from_keypair_bytes(&keypair)
                    .map_err(|_| StateError::KeyMismatch)?;
                Ok(Self { signing_key })
            }
            len => Err(StateError::InvalidKeyLength(len)),
        }
    }

    /// The raw Ed25519 public key.
    pub fn ed25519_public_key(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    /// The 64-byte `seed || public key` form.
    pub fn secret_key_bytes(&self) -> [u8; 64] {
        self.signing_key.to_keypair_bytes()
    }

    pub fn session_id(&self) -> SessionId {
        let x25519 = self.signing_key.verifying_key().to_montgomery().to_bytes();
        SessionId::new(USER_PREFIX, x25519)
    }
}

impl fmt::Debug for UserKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UserKeys({:?})", self.session_id())
    }
}
