//! # meshbook-identity
//!
//! The node's long-lived ed25519 keypair.
//!
//! Generated once on first start and persisted in node storage under
//! `private_key` / `public_key` using the libp2p protobuf key encoding.
//! Every later start loads the same keypair, so the node keeps its peer id
//! and its order-id secret across restarts.

use libp2p::PeerId;
use libp2p::identity::{Keypair, PublicKey};
use tracing::info;

use meshbook_storage::Storage;
use meshbook_types::constants::{PRIVATE_KEY_KEY, PUBLIC_KEY_KEY};
use meshbook_types::{MeshbookError, Result};

/// A node's keypair. Immutable once generated.
#[derive(Clone)]
pub struct NodeIdentity {
    keypair: Keypair,
}

impl std::fmt::Debug for NodeIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeIdentity")
            .field("peer_id", &self.peer_id())
            .finish_non_exhaustive()
    }
}

impl NodeIdentity {
    /// A fresh ed25519 identity, not persisted.
    #[must_use]
    pub fn generate() -> Self {
        Self {
            keypair: Keypair::generate_ed25519(),
        }
    }

    /// Load the identity stored in `storage`, generating and persisting a new
    /// one if none exists.
    ///
    /// # Errors
    /// `IdentityCorrupt` if key material exists but does not decode, or the
    /// stored public key does not belong to the private key. An existing
    /// identity is never replaced.
    pub fn load_or_generate(storage: &dyn Storage) -> Result<Self> {
        let private = storage.get(PRIVATE_KEY_KEY)?;
        let public = storage.get(PUBLIC_KEY_KEY)?;

        match (private, public) {
            (None, None) => {
                let identity = Self::generate();
                identity.store(storage)?;
                info!(peer = %identity.peer_id(), "generated new node identity");
                Ok(identity)
            }
            (Some(private), Some(public)) => {
                let identity = Self::decode(&private, &public)?;
                info!(peer = %identity.peer_id(), "loaded node identity");
                Ok(identity)
            }
            (Some(_), None) => Err(MeshbookError::IdentityCorrupt(
                "private key stored without public key".to_string(),
            )),
            (None, Some(_)) => Err(MeshbookError::IdentityCorrupt(
                "public key stored without private key".to_string(),
            )),
        }
    }

    fn decode(private: &[u8], public: &[u8]) -> Result<Self> {
        let keypair = Keypair::from_protobuf_encoding(private)
            .map_err(|e| MeshbookError::IdentityCorrupt(format!("private key: {e}")))?;
        let public = PublicKey::try_decode_protobuf(public)
            .map_err(|e| MeshbookError::IdentityCorrupt(format!("public key: {e}")))?;
        if keypair.public() != public {
            return Err(MeshbookError::IdentityCorrupt(
                "stored public key does not match private key".to_string(),
            ));
        }
        Ok(Self { keypair })
    }

    fn store(&self, storage: &dyn Storage) -> Result<()> {
        storage.put(PRIVATE_KEY_KEY, &self.signing_secret()?)?;
        storage.put(PUBLIC_KEY_KEY, &self.keypair.public().encode_protobuf())?;
        Ok(())
    }

    #[must_use]
    pub fn peer_id(&self) -> PeerId {
        self.keypair.public().to_peer_id()
    }

    #[must_use]
    pub fn keypair(&self) -> &Keypair {
        &self.keypair
    }

    /// Private key material (protobuf encoding), the key for order-id digests.
    pub fn signing_secret(&self) -> Result<Vec<u8>> {
        self.keypair
            .to_protobuf_encoding()
            .map_err(|e| MeshbookError::KeyEncoding(e.to_string()))
    }
}
