// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Key pair generation and rotation.
//!
//! One fixed algorithm fleet-wide (Ed25519 via `ring`) so every proxy
//! server accepts the same `authorized_keys` format. Rotation is
//! write-after-success: the new pair is generated fully before the
//! stored record is touched, so a generation failure leaves the
//! previous pair intact.

use std::time::{SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use ring::rand::SystemRandom;
use ring::signature::{Ed25519KeyPair, KeyPair as _};
use uuid::Uuid;

use crate::store::{Store, User};

const SSH_KEY_TYPE: &str = "ssh-ed25519";

/// A freshly generated asymmetric credential.
#[derive(Debug, Clone)]
pub struct KeyPair {
    /// OpenSSH `authorized_keys` line (`ssh-ed25519 <b64-blob> <comment>`).
    pub public_key: String,
    /// Base64-encoded PKCS#8 document holding the private half.
    pub private_key: String,
}

/// Generate a fresh Ed25519 key pair, tagging the public line with
/// `comment` (conventionally the owner's email).
pub fn generate_key_pair(comment: &str) -> anyhow::Result<KeyPair> {
    let rng = SystemRandom::new();
    let pkcs8 = Ed25519KeyPair::generate_pkcs8(&rng)
        .map_err(|_| anyhow::anyhow!("key pair generation failed"))?;
    let pair = Ed25519KeyPair::from_pkcs8(pkcs8.as_ref())
        .map_err(|e| anyhow::anyhow!("generated key rejected: {e}"))?;

    Ok(KeyPair {
        public_key: openssh_public_key(pair.public_key().as_ref(), comment),
        private_key: STANDARD.encode(pkcs8.as_ref()),
    })
}

/// Replace `user_id`'s key pair with a fresh one.
///
/// Stamps the generation time, marks the user for redistribution, and
/// persists the whole record in one save so concurrent readers see
/// either the fully-old or fully-new pair, never a mix.
pub async fn rotate_key_pair(store: &Store, user_id: &Uuid) -> anyhow::Result<User> {
    let mut user = store.find_user(user_id).await?;

    // Generate before mutating anything; a failure here must not
    // corrupt the stored pair.
    let pair = generate_key_pair(&user.email)?;

    user.public_key = pair.public_key;
    user.private_key = pair.private_key;
    user.key_generated_at = epoch_secs();
    user.needs_redistribution = true;
    store.save_user(user.clone()).await?;

    tracing::info!(user = %user.email, "key pair rotated");
    Ok(user)
}

/// Render a raw Ed25519 public key as an OpenSSH `authorized_keys` line.
///
/// The blob is SSH wire format: length-prefixed algorithm name followed
/// by the length-prefixed key bytes (RFC 4253 string encoding).
fn openssh_public_key(raw: &[u8], comment: &str) -> String {
    let mut blob = Vec::with_capacity(8 + SSH_KEY_TYPE.len() + raw.len());
    blob.extend_from_slice(&(SSH_KEY_TYPE.len() as u32).to_be_bytes());
    blob.extend_from_slice(SSH_KEY_TYPE.as_bytes());
    blob.extend_from_slice(&(raw.len() as u32).to_be_bytes());
    blob.extend_from_slice(raw);
    format!("{SSH_KEY_TYPE} {} {comment}", STANDARD.encode(blob))
}

pub(crate) fn epoch_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}
