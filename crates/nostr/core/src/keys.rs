//! Schnorr key generation and event signing.
//!
//! This module exists to let tests and examples mint realistic signed
//! events; the sync engine itself never signs anything — signing lives
//! behind the [`crate::Signer`]-shaped collaborator the real application
//! supplies (spec.md §6).

use secp256k1::{Keypair, Message, Secp256k1, SecretKey as Secp256k1SecretKey};

use crate::error::{CoreError, Result};
use crate::event::{Event, EventTemplate, compute_id};

/// A raw 32-byte secp256k1 secret key.
#[derive(Clone)]
pub struct SecretKey(Secp256k1SecretKey);

impl SecretKey {
    pub fn from_hex(hex_str: &str) -> Result<Self> {
        let bytes = hex::decode(hex_str)?;
        let inner = Secp256k1SecretKey::from_slice(&bytes).map_err(|_| CoreError::InvalidSecretKey)?;
        Ok(Self(inner))
    }

    pub fn public_key_hex(&self) -> String {
        let secp = Secp256k1::new();
        let keypair = Keypair::from_secret_key(&secp, &self.0);
        let (xonly, _parity) = keypair.x_only_public_key();
        hex::encode(xonly.serialize())
    }
}

/// Generate a fresh random secret key.
pub fn generate_secret_key() -> SecretKey {
    let secp = Secp256k1::new();
    let (secret_key, _public_key) = secp.generate_keypair(&mut rand::thread_rng());
    SecretKey(secret_key)
}

/// Sign a template and produce a fully-formed [`Event`].
pub fn finalize_event(template: &EventTemplate, secret_key: &SecretKey) -> Result<Event> {
    let secp = Secp256k1::new();
    let keypair = Keypair::from_secret_key(&secp, &secret_key.0);
    let (xonly, _parity) = keypair.x_only_public_key();
    let pubkey = hex::encode(xonly.serialize());

    let id_hex = compute_id(&pubkey, template);
    let id_bytes = hex::decode(&id_hex)?;
    let message =
        Message::from_digest_slice(&id_bytes).map_err(|error| CoreError::Signing(error.to_string()))?;

    let signature = secp.sign_schnorr_no_aux_rand(&message, &keypair);

    Ok(Event {
        id: id_hex,
        pubkey,
        created_at: template.created_at,
        kind: template.kind,
        tags: template.tags.clone(),
        content: template.content.clone(),
        sig: hex::encode(signature.as_ref()),
    })
}
