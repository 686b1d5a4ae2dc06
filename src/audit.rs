//! Append-only, hash-linked log of every state-changing action.
//!
//! Each entry's hash covers the previous entry's hash, so retroactive edits
//! invalidate every later entry. Verification recomputes the chain from
//! genesis and surfaces the first divergence; it never repairs.

use crate::*;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use log::warn;
use uuid::Uuid;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AuditEntry {
    pub id: Uuid,
    pub election_id: String,

    pub action: String,
    pub resource: String,
    pub resource_id: String,

    pub details: IndexMap<String, serde_json::Value>,
    pub timestamp: DateTime<Utc>,

    /// Empty string at genesis.
    pub previous_hash: String,
    pub hash: String,
}

/// Canonical payload the chain hash is computed over. Field order is fixed
/// by this struct; `details` must be an IndexMap so key order is stable.
#[derive(Serialize)]
struct HashPayload<'a> {
    #[serde(rename = "previousHash")]
    previous_hash: &'a str,
    action: &'a str,
    resource: &'a str,
    #[serde(rename = "resourceId")]
    resource_id: &'a str,
    timestamp: &'a str,
    details: &'a IndexMap<String, serde_json::Value>,
}

/// `H(prev || action || resource || resourceId || timestamp || details)`
/// over the canonical JSON payload.
pub fn chain_hash(
    previous_hash: &str,
    action: &str,
    resource: &str,
    resource_id: &str,
    timestamp: DateTime<Utc>,
    details: &IndexMap<String, serde_json::Value>,
) -> Result<String, Error> {
    let timestamp = timestamp.to_rfc3339();
    let payload = HashPayload {
        previous_hash,
        action,
        resource,
        resource_id,
        timestamp: &timestamp,
        details,
    };
    Ok(sha256_hex(serde_json::to_string(&payload)?.as_bytes()))
}

impl AuditEntry {
    pub fn new(
        election_id: &str,
        previous_hash: &str,
        action: &str,
        resource: &str,
        resource_id: &str,
        details: IndexMap<String, serde_json::Value>,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, Error> {
        let hash = chain_hash(
            previous_hash,
            action,
            resource,
            resource_id,
            timestamp,
            &details,
        )?;

        Ok(AuditEntry {
            id: Uuid::new_v4(),
            election_id: election_id.to_string(),
            action: action.to_string(),
            resource: resource.to_string(),
            resource_id: resource_id.to_string(),
            details,
            timestamp,
            previous_hash: previous_hash.to_string(),
            hash,
        })
    }
}

/// Append an entry to the chain for an election, linking to the most recent
/// stored entry (or the empty genesis hash).
pub fn append_audit_entry<S: Store>(
    store: &mut S,
    election_id: &str,
    action: &str,
    resource: &str,
    resource_id: &str,
    details: IndexMap<String, serde_json::Value>,
    now: DateTime<Utc>,
) -> Result<AuditEntry, Error> {
    let previous = store.last_audit_hash(election_id).unwrap_or_default();
    let entry = AuditEntry::new(
        election_id,
        &previous,
        action,
        resource,
        resource_id,
        details,
        now,
    )?;
    store.append_audit(entry.clone());
    Ok(entry)
}

/// Recompute the chain from genesis. Any divergence means a stored entry
/// was mutated after the fact; the error names the first bad entry.
pub fn verify_audit_chain(entries: &[AuditEntry]) -> Result<(), Error> {
    let mut previous = String::new();

    for (index, entry) in entries.iter().enumerate() {
        if entry.previous_hash != previous {
            warn!(
                "audit chain broken link at entry {} ({})",
                index, entry.id
            );
            return Err(CryptoError::AuditChainMismatch {
                index,
                entry_id: entry.id.to_string(),
            }
            .into());
        }

        let recomputed = chain_hash(
            &entry.previous_hash,
            &entry.action,
            &entry.resource,
            &entry.resource_id,
            entry.timestamp,
            &entry.details,
        )?;

        if recomputed != entry.hash {
            warn!(
                "audit chain hash mismatch at entry {} ({})",
                index, entry.id
            );
            return Err(CryptoError::AuditChainMismatch {
                index,
                entry_id: entry.id.to_string(),
            }
            .into());
        }

        previous = entry.hash.clone();
    }

    Ok(())
}
