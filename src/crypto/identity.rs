use anyhow::{Context, Result};
use base64::{engine::general_purpose, Engine as _};
use ed25519_dalek::{SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::{debug, info};

/// Unique identifier for a node, derived from its public key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(String);

impl NodeId {
    const SHORT_LEN: usize = 8;

    pub fn from_verifying_key(verifying_key: &VerifyingKey) -> Self {
        Self::from_bytes(&verifying_key.to_bytes())
    }

    /// Hex-encoded SHA-256 of the given public key bytes
    pub fn from_bytes(public_key: &[u8]) -> Self {
        Self(hex::encode(Sha256::digest(public_key)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Leading characters of the id, for logs
    pub fn short(&self) -> &str {
        self.0.get(..Self::SHORT_LEN).unwrap_or(&self.0)
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Serialize, Deserialize)]
struct IdentityData {
    secret_key: String,
    public_key: String,
}

/// Ed25519 key pair a node is known by
pub struct Identity {
    signing_key: SigningKey,
    node_id: NodeId,
}

impl Identity {
    /// Generate a new random identity
    pub fn generate() -> Result<Self> {
        use rand::RngCore;
        let mut csprng = rand::rngs::OsRng;
        let mut secret_bytes = [0u8; 32];
        csprng.fill_bytes(&mut secret_bytes);
        Ok(Self::from_signing_key(SigningKey::from_bytes(&secret_bytes)))
    }

    fn from_signing_key(signing_key: SigningKey) -> Self {
        let node_id = NodeId::from_verifying_key(&signing_key.verifying_key());
        Self {
            signing_key,
            node_id,
        }
    }

    /// Load an identity file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read identity file {}", path.display()))?;
        let data: IdentityData =
            serde_json::from_str(&content).context("Failed to parse identity file")?;

        let secret_bytes = general_purpose::STANDARD
            .decode(&data.secret_key)
            .context("Invalid secret key encoding")?;
        let secret_array: [u8; 32] = secret_bytes.as_slice().try_into().map_err(|_| {
            anyhow::anyhow!(
                "Invalid secret key length: expected 32 bytes, got {}",
                secret_bytes.len()
            )
        })?;

        let identity = Self::from_signing_key(SigningKey::from_bytes(&secret_array));

        let stored_public = general_purpose::STANDARD
            .decode(&data.public_key)
            .context("Invalid public key encoding")?;
        if stored_public != identity.verifying_key().to_bytes() {
            anyhow::bail!("Public key in {} does not match its secret key", path.display());
        }

        debug!(node_id = %identity.node_id, "Identity loaded from {}", path.display());
        Ok(identity)
    }

    /// Write the identity as JSON, creating parent directories as needed
    pub fn save(&self, path: &Path) -> Result<()> {
        crate::crypto::storage::ensure_directory_exists(path)?;

        let data = IdentityData {
            secret_key: general_purpose::STANDARD.encode(self.signing_key.to_bytes()),
            public_key: general_purpose::STANDARD.encode(self.verifying_key().to_bytes()),
        };
        let json = serde_json::to_string_pretty(&data).context("Failed to serialize identity")?;

        std::fs::write(path, json)
            .with_context(|| format!("Failed to write identity file {}", path.display()))?;
        crate::crypto::storage::restrict_permissions(path)?;
        Ok(())
    }

    /// Load the identity at `path`, generating and saving one if the file is missing
    pub fn load_or_generate(path: &Path) -> Result<Self> {
        if path.exists() {
            return Self::load(path);
        }

        let identity = Self::generate()?;
        identity.save(path)?;
        info!(node_id = %identity.node_id, "Generated new identity at {}", path.display());
        Ok(identity)
    }

    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    /// Get the verifying (public) key
    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }
}
