use crate::*;
use chrono::{DateTime, Utc};

/// Proof that a commitment was written to the external ledger.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AnchorReceipt {
    pub tx_id: String,
    pub block_number: u64,
    pub anchored_at: DateTime<Utc>,
}

/// External ledger the system anchors commitment hashes to.
///
/// Only the commitment hash ever crosses this boundary. Anchoring is
/// best-effort at submission time: a failure here must never lose the vote,
/// so callers log and carry on, leaving the ballot unconfirmed for a later
/// retry.
pub trait Anchor {
    fn anchor_commitment(
        &mut self,
        election_id: &str,
        commitment_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<AnchorReceipt, Error>;
}

/// In-memory anchor. Assigns sequential block numbers and remembers every
/// anchored commitment so tests can assert on what crossed the boundary.
#[derive(Default, Clone)]
pub struct MemAnchor {
    pub anchored: Vec<(String, String)>,
}

impl Anchor for MemAnchor {
    fn anchor_commitment(
        &mut self,
        election_id: &str,
        commitment_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<AnchorReceipt, Error> {
        self.anchored
            .push((election_id.to_string(), commitment_hash.to_string()));

        Ok(AnchorReceipt {
            tx_id: format!("0x{}", sha256_hex(commitment_hash.as_bytes())),
            block_number: self.anchored.len() as u64,
            anchored_at: now,
        })
    }
}

/// Anchor that always fails, for exercising the degraded path.
#[derive(Default, Clone)]
pub struct FailingAnchor;

impl Anchor for FailingAnchor {
    fn anchor_commitment(
        &mut self,
        _election_id: &str,
        _commitment_hash: &str,
        _now: DateTime<Utc>,
    ) -> Result<AnchorReceipt, Error> {
        Err(ExternalError::AnchorUnreachable("connection refused".to_string()).into())
    }
}
