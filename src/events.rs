use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Facts emitted by the voting service after each state change, for outer
/// layers (notifications, projections) to consume. Events never carry the
/// participant-to-ballot link.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    CredentialIssued {
        election_id: String,
        participant_id: Uuid,
        credential_id: Uuid,
        version: u32,
        expires_at: DateTime<Utc>,
    },
    BallotSubmitted {
        election_id: String,
        ballot_id: Uuid,
        commitment_hash: String,
        receipt_code: String,
    },
    BallotConfirmed {
        election_id: String,
        ballot_id: Uuid,
        anchor_tx_id: String,
    },
    BallotSuperseded {
        election_id: String,
        ballot_id: Uuid,
        superseded_by: Uuid,
    },
}
