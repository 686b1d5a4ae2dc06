use crate::*;
use chrono::{DateTime, Utc};
use uuid::Uuid;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantStatus {
    Pending,
    Verified,
    Voted,
    Rejected,
    Blocked,
}

impl std::fmt::Display for ParticipantStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let name = match self {
            ParticipantStatus::Pending => "pending",
            ParticipantStatus::Verified => "verified",
            ParticipantStatus::Voted => "voted",
            ParticipantStatus::Rejected => "rejected",
            ParticipantStatus::Blocked => "blocked",
        };
        write!(f, "{}", name)
    }
}

/// An eligible participant, identified only by a one-way election-scoped
/// hash of their real-world identifier. Holds no reference to any ballot.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Participant {
    pub id: Uuid,
    pub election_id: String,

    /// HMAC of the real-world identifier, keyed per election.
    pub participant_hash: String,

    pub status: ParticipantStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Participant {
    /// Created on allowlist import.
    pub fn new(election_id: &str, participant_hash: &str, now: DateTime<Utc>) -> Self {
        Participant {
            id: Uuid::new_v4(),
            election_id: election_id.to_string(),
            participant_hash: participant_hash.to_string(),
            status: ParticipantStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move the participant through its lifecycle. Rejected and Blocked are
    /// terminal; re-recording Voted is allowed for vote-change flows.
    pub fn transition(&mut self, to: ParticipantStatus, now: DateTime<Utc>) -> Result<(), Error> {
        use ParticipantStatus::*;

        let allowed = match (self.status, to) {
            (Pending, Verified) | (Pending, Rejected) | (Pending, Blocked) => true,
            (Verified, Voted) | (Verified, Blocked) => true,
            (Voted, Voted) | (Voted, Blocked) => true,
            (Pending, _) | (Verified, _) | (Voted, _) => false,
            (Rejected, _) | (Blocked, _) => false,
        };

        if !allowed {
            return Err(ConflictError::InvalidTransition {
                kind: "participant",
                from: self.status.to_string(),
                to: to.to_string(),
            }
            .into());
        }

        self.status = to;
        self.updated_at = now;
        Ok(())
    }
}
