//! Core cryptographic primitives: hashing, key derivation, authenticated
//! ballot encryption, commitment construction and receipt codes.
//!
//! All secrets come from the caller-provided CSPRNG. The election key is
//! derived from injected master key material, never read from ambient state.

use crate::*;
use aes_gcm::aead::{generic_array::GenericArray, Aead, NewAead};
use aes_gcm::Aes256Gcm;
use chrono::{DateTime, Utc};
use hkdf::Hkdf;
use hmac::{Hmac, Mac, NewMac};
use rand::{CryptoRng, RngCore};
use sha2::{Digest, Sha256};

const AES_NONCE_LENGTH: usize = 12;

/// Master key material for election-key derivation.
///
/// In production this comes from an HSM or vault; the core only ever sees
/// the raw bytes via injection.
#[derive(Clone)]
pub struct MasterKey([u8; 32]);

impl MasterKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        MasterKey(bytes)
    }

    pub fn random<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut bytes = [0u8; 32];
        rng.fill_bytes(&mut bytes);
        MasterKey(bytes)
    }
}

/// SHA-256, hex-encoded.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Generate a raw credential secret: 256 bits, 64 hex characters.
/// The raw secret goes to the participant; only its hash is ever stored.
pub fn generate_credential_secret<R: RngCore + CryptoRng>(rng: &mut R) -> String {
    let mut bytes = [0u8; 32];
    rng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Hash a raw credential secret for storage and lookup.
pub fn credential_hash(raw_secret: &str) -> String {
    sha256_hex(raw_secret.as_bytes())
}

/// Random salt for ballot commitments, base64 of 256 bits.
pub fn generate_commitment_salt<R: RngCore + CryptoRng>(rng: &mut R) -> String {
    let mut bytes = [0u8; 32];
    rng.fill_bytes(&mut bytes);
    base64::encode(bytes)
}

/// Derive an election-scoped AES-256 key from the master key.
pub fn derive_election_key(master: &MasterKey, election_id: &str) -> [u8; 32] {
    let h = Hkdf::<Sha256>::new(Some(election_id.as_bytes()), &master.0);
    let mut out = [0u8; 32];
    h.expand(b"anonballot-election-key", &mut out)
        .expect("anonballot: hkdf expand failed");
    out
}

/// One-way hash of a participant's real-world identifier, scoped to one
/// election. HMAC keyed with the election key so the same person hashes
/// differently per election and rainbow tables are useless.
pub fn participant_hash(master: &MasterKey, election_id: &str, identifier: &str) -> String {
    let key = derive_election_key(master, election_id);
    let mut mac =
        Hmac::<Sha256>::new_from_slice(&key).expect("anonballot: hmac accepts any key length");
    mac.update(identifier.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// An AES-256-GCM encrypted ballot payload. The auth tag is appended to the
/// ciphertext by the AEAD; tampering fails decryption.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct EncryptedPayload {
    #[serde(with = "hex_serde")]
    pub nonce: Vec<u8>,

    #[serde(with = "hex_serde")]
    pub ciphertext: Vec<u8>,
}

impl EncryptedPayload {
    /// Base64 of the ciphertext, the form bound into the commitment.
    pub fn ciphertext_b64(&self) -> String {
        base64::encode(&self.ciphertext)
    }
}

/// Encrypt a selection set under the election-scoped key.
pub fn encrypt_selections<R: RngCore + CryptoRng>(
    rng: &mut R,
    master: &MasterKey,
    election_id: &str,
    selections: &[Selection],
) -> Result<EncryptedPayload, Error> {
    let key = derive_election_key(master, election_id);
    let plaintext = serde_cbor::to_vec(&selections)?;

    let aead = Aes256Gcm::new(GenericArray::from_slice(&key));
    let mut nonce = [0u8; AES_NONCE_LENGTH];
    rng.fill_bytes(&mut nonce);

    let ciphertext = aead
        .encrypt(GenericArray::from_slice(&nonce), plaintext.as_slice())
        .map_err(|_| CryptoError::AeadFailure)?;

    Ok(EncryptedPayload {
        nonce: nonce.to_vec(),
        ciphertext,
    })
}

/// Decrypt a ballot payload. Exposed for the tallying phase only.
pub fn decrypt_selections(
    master: &MasterKey,
    election_id: &str,
    payload: &EncryptedPayload,
) -> Result<Vec<Selection>, Error> {
    let key = derive_election_key(master, election_id);
    let aead = Aes256Gcm::new(GenericArray::from_slice(&key));

    let plaintext = aead
        .decrypt(
            GenericArray::from_slice(&payload.nonce),
            payload.ciphertext.as_slice(),
        )
        .map_err(|_| CryptoError::AeadFailure)?;

    Ok(serde_cbor::from_slice(&plaintext)?)
}

/// Commitment binding the encrypted ballot, salt, election and timestamp:
/// `H(ciphertext || salt || election_id || timestamp)`.
/// Deterministic, and carries no participant-identifying information.
pub fn ballot_commitment(
    encrypted_ballot: &str,
    salt: &str,
    election_id: &str,
    timestamp_millis: i64,
) -> String {
    let payload = format!(
        "{}|{}|{}|{}",
        encrypted_ballot, salt, election_id, timestamp_millis
    );
    sha256_hex(payload.as_bytes())
}

/// Check a commitment against its inputs.
pub fn verify_ballot_commitment(
    commitment: &str,
    encrypted_ballot: &str,
    salt: &str,
    election_id: &str,
    timestamp_millis: i64,
) -> bool {
    let expected = ballot_commitment(encrypted_ballot, salt, election_id, timestamp_millis);
    // Byte-compare over fixed-length hex; both sides are locally computed.
    expected.as_bytes() == commitment.as_bytes()
}

/// Short human-shareable receipt: the first 16 hex characters of the
/// commitment, upper-cased. Safe to hand to the voter; it reveals nothing
/// the public commitment does not.
pub fn receipt_code(commitment: &str) -> String {
    commitment[..16].to_uppercase()
}

pub fn timestamp_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}
