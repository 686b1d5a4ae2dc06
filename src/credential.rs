use crate::*;
use chrono::{DateTime, Utc};
use uuid::Uuid;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CredentialStatus {
    Issued,
    Used,
    Expired,
    Revoked,
}

impl std::fmt::Display for CredentialStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let name = match self {
            CredentialStatus::Issued => "issued",
            CredentialStatus::Used => "used",
            CredentialStatus::Expired => "expired",
            CredentialStatus::Revoked => "revoked",
        };
        write!(f, "{}", name)
    }
}

/// A one-time anonymous authorization. The participant holds the raw
/// secret; only its hash is stored. Ballots reference the credential hash,
/// never the participant, so the credential is the blind intermediary that
/// breaks the identity-to-ballot link.
///
/// Vote-change lineage is tracked credential-to-credential via `previous`;
/// it is never propagated to a ballot.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Credential {
    pub id: Uuid,
    pub election_id: String,
    pub participant_id: Uuid,

    /// sha256 of the raw secret
    pub credential_hash: String,

    pub status: CredentialStatus,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,

    pub version: u32,
    pub previous: Option<Uuid>,
}

impl Credential {
    pub fn new(
        election_id: &str,
        participant_id: Uuid,
        credential_hash: &str,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
        version: u32,
        previous: Option<Uuid>,
    ) -> Self {
        Credential {
            id: Uuid::new_v4(),
            election_id: election_id.to_string(),
            participant_id,
            credential_hash: credential_hash.to_string(),
            status: CredentialStatus::Issued,
            issued_at,
            expires_at,
            used_at: None,
            version,
            previous,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }

    /// Issued is the only non-terminal state: Used, Expired and Revoked are
    /// all terminal.
    pub fn transition(&mut self, to: CredentialStatus, now: DateTime<Utc>) -> Result<(), Error> {
        use CredentialStatus::*;

        let allowed = match (self.status, to) {
            (Issued, Used) | (Issued, Expired) | (Issued, Revoked) => true,
            (Issued, Issued) => false,
            (Used, _) | (Expired, _) | (Revoked, _) => false,
        };

        if !allowed {
            return Err(ConflictError::InvalidTransition {
                kind: "credential",
                from: self.status.to_string(),
                to: to.to_string(),
            }
            .into());
        }

        if to == Used {
            self.used_at = Some(now);
        }
        self.status = to;
        Ok(())
    }
}
