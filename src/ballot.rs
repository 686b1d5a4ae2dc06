use crate::*;
use chrono::{DateTime, Utc};
use uuid::Uuid;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BallotStatus {
    Pending,
    Confirmed,
    Tallied,
    Superseded,
    Rejected,
}

impl std::fmt::Display for BallotStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let name = match self {
            BallotStatus::Pending => "pending",
            BallotStatus::Confirmed => "confirmed",
            BallotStatus::Tallied => "tallied",
            BallotStatus::Superseded => "superseded",
            BallotStatus::Rejected => "rejected",
        };
        write!(f, "{}", name)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VoteChannel {
    Web,
    Whatsapp,
    Api,
    Offline,
    Paper,
}

impl std::fmt::Display for VoteChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let name = match self {
            VoteChannel::Web => "web",
            VoteChannel::Whatsapp => "whatsapp",
            VoteChannel::Api => "api",
            VoteChannel::Offline => "offline",
            VoteChannel::Paper => "paper",
        };
        write!(f, "{}", name)
    }
}

/// The anonymized vote container.
///
/// Holds the credential hash (never a participant id), the encrypted
/// selection payload and the publicly verifiable commitment. No field here
/// can recover which participant produced the ballot.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Ballot {
    pub id: Uuid,
    pub election_id: String,

    /// Links to the consumed credential, not the participant.
    pub credential_hash: String,

    pub commitment_hash: String,
    pub commitment_salt: String,
    pub payload: EncryptedPayload,

    pub channel: VoteChannel,
    pub status: BallotStatus,

    pub submitted_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub tallied_at: Option<DateTime<Utc>>,

    pub version: u32,

    /// Set once the commitment has been anchored to the ledger.
    pub anchor: Option<AnchorReceipt>,
}

impl Ballot {
    /// Tallied, Superseded and Rejected are terminal. Any non-terminal
    /// ballot may be superseded when a newer ballot from a later credential
    /// version of the same lineage is confirmed.
    pub fn transition(&mut self, to: BallotStatus, now: DateTime<Utc>) -> Result<(), Error> {
        use BallotStatus::*;

        let allowed = match (self.status, to) {
            (Pending, Confirmed) | (Pending, Rejected) | (Pending, Superseded) => true,
            (Confirmed, Tallied) | (Confirmed, Superseded) => true,
            (Pending, _) | (Confirmed, _) => false,
            (Tallied, _) | (Superseded, _) | (Rejected, _) => false,
        };

        if !allowed {
            return Err(ConflictError::InvalidTransition {
                kind: "ballot",
                from: self.status.to_string(),
                to: to.to_string(),
            }
            .into());
        }

        match to {
            Confirmed => self.confirmed_at = Some(now),
            Tallied => self.tallied_at = Some(now),
            _ => {}
        }
        self.status = to;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture(now: DateTime<Utc>) -> Ballot {
        Ballot {
            id: Uuid::new_v4(),
            election_id: "el_1".to_string(),
            credential_hash: "ch".to_string(),
            commitment_hash: "cm".to_string(),
            commitment_salt: "salt".to_string(),
            payload: EncryptedPayload {
                nonce: vec![0; 12],
                ciphertext: vec![1, 2, 3],
            },
            channel: VoteChannel::Web,
            status: BallotStatus::Pending,
            submitted_at: now,
            confirmed_at: None,
            tallied_at: None,
            version: 1,
            anchor: None,
        }
    }

    #[test]
    fn test_happy_path() {
        let now = Utc::now();
        let mut b = fixture(now);

        b.transition(BallotStatus::Confirmed, now).unwrap();
        assert_eq!(b.confirmed_at, Some(now));
        b.transition(BallotStatus::Tallied, now).unwrap();
        assert_eq!(b.tallied_at, Some(now));

        // Tallied is terminal
        assert!(b.transition(BallotStatus::Superseded, now).is_err());
    }

    #[test]
    fn test_supersession_from_non_terminal_states() {
        let now = Utc::now();

        let mut pending = fixture(now);
        assert!(pending.transition(BallotStatus::Superseded, now).is_ok());

        let mut confirmed = fixture(now);
        confirmed.transition(BallotStatus::Confirmed, now).unwrap();
        assert!(confirmed.transition(BallotStatus::Superseded, now).is_ok());

        let mut rejected = fixture(now);
        rejected.transition(BallotStatus::Rejected, now).unwrap();
        let err = rejected
            .transition(BallotStatus::Superseded, now)
            .unwrap_err();
        assert!(err.is_conflict());
    }
}
