use crate::*;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Everything a ballot submission writes, applied all-or-nothing.
///
/// The credential arrives already transitioned to Used and the participant
/// to Voted; the store either persists the whole set or none of it, so a
/// half-applied submission is never observable.
#[derive(Debug, Clone)]
pub struct Submission {
    pub ballot: Ballot,
    pub credential: Credential,
    pub participant: Participant,
    pub superseded: Option<Ballot>,
    pub audit: AuditEntry,
}

/// The persistence collaborator.
///
/// Implementations must provide transactional writes, enforce uniqueness on
/// credential hashes and ballot commitment hashes, and answer "last audit
/// entry for election X" efficiently. Uniqueness violations surface as
/// `ConflictError` so two concurrent requests can never both succeed.
pub trait Store {
    fn election(&self, id: &str) -> Option<Election>;
    fn put_election(&mut self, election: Election);

    fn participant(&self, election_id: &str, participant_hash: &str) -> Option<Participant>;
    fn participant_by_id(&self, id: Uuid) -> Option<Participant>;
    fn put_participant(&mut self, participant: Participant);

    fn credential_by_hash(&self, election_id: &str, credential_hash: &str) -> Option<Credential>;
    fn credential_by_id(&self, id: Uuid) -> Option<Credential>;

    /// The at-most-one ISSUED, unexpired credential for a participant.
    fn active_credential(&self, participant_id: Uuid, now: DateTime<Utc>) -> Option<Credential>;

    /// Highest-version credential for a participant (head of the lineage).
    fn latest_credential(&self, participant_id: Uuid) -> Option<Credential>;

    /// Insert with a uniqueness guarantee on the credential hash.
    fn insert_credential(&mut self, credential: Credential) -> Result<(), Error>;

    fn ballot_by_commitment(&self, commitment_hash: &str) -> Option<Ballot>;
    fn ballot_by_credential_hash(&self, credential_hash: &str) -> Option<Ballot>;
    fn ballots(&self, election_id: &str) -> Vec<Ballot>;
    fn update_ballot(&mut self, ballot: Ballot);

    /// Atomically persist a ballot submission: the new ballot (unique on
    /// both credential hash and commitment hash), the consumed credential,
    /// the voted participant, the optional superseded prior ballot and the
    /// audit entry.
    fn commit_submission(&mut self, submission: Submission) -> Result<(), Error>;

    fn last_audit_hash(&self, election_id: &str) -> Option<String>;
    fn append_audit(&mut self, entry: AuditEntry);
    fn audit_entries(&self, election_id: &str) -> Vec<AuditEntry>;
}

/// A simple store that uses in-memory BTreeMaps. Used in tests and as the
/// reference for the uniqueness/atomicity semantics a real backend must
/// provide.
#[derive(Default, Clone)]
pub struct MemStore {
    elections: BTreeMap<String, Election>,
    participants: BTreeMap<String, Participant>,
    credentials: BTreeMap<String, Credential>,
    ballots: BTreeMap<String, Ballot>,
    audit: BTreeMap<String, Vec<AuditEntry>>,
}

impl MemStore {
    fn check_submission(&self, submission: &Submission) -> Result<(), Error> {
        let ballot = &submission.ballot;
        if self
            .ballots
            .values()
            .any(|b| b.credential_hash == ballot.credential_hash)
        {
            return Err(ConflictError::DuplicateBallotForCredential.into());
        }
        if self
            .ballots
            .values()
            .any(|b| b.commitment_hash == ballot.commitment_hash)
        {
            return Err(ConflictError::DuplicateCommitment.into());
        }
        Ok(())
    }
}

impl Store for MemStore {
    fn election(&self, id: &str) -> Option<Election> {
        self.elections.get(id).cloned()
    }

    fn put_election(&mut self, election: Election) {
        self.elections.insert(election.id.clone(), election);
    }

    fn participant(&self, election_id: &str, participant_hash: &str) -> Option<Participant> {
        self.participants
            .values()
            .find(|p| p.election_id == election_id && p.participant_hash == participant_hash)
            .cloned()
    }

    fn participant_by_id(&self, id: Uuid) -> Option<Participant> {
        self.participants.get(&id.to_string()).cloned()
    }

    fn put_participant(&mut self, participant: Participant) {
        self.participants
            .insert(participant.id.to_string(), participant);
    }

    fn credential_by_hash(&self, election_id: &str, credential_hash: &str) -> Option<Credential> {
        self.credentials
            .values()
            .find(|c| c.election_id == election_id && c.credential_hash == credential_hash)
            .cloned()
    }

    fn credential_by_id(&self, id: Uuid) -> Option<Credential> {
        self.credentials.get(&id.to_string()).cloned()
    }

    fn active_credential(&self, participant_id: Uuid, now: DateTime<Utc>) -> Option<Credential> {
        self.credentials
            .values()
            .find(|c| {
                c.participant_id == participant_id
                    && c.status == CredentialStatus::Issued
                    && !c.is_expired(now)
            })
            .cloned()
    }

    fn latest_credential(&self, participant_id: Uuid) -> Option<Credential> {
        self.credentials
            .values()
            .filter(|c| c.participant_id == participant_id)
            .max_by_key(|c| c.version)
            .cloned()
    }

    fn insert_credential(&mut self, credential: Credential) -> Result<(), Error> {
        if self
            .credentials
            .values()
            .any(|c| c.credential_hash == credential.credential_hash)
        {
            return Err(ConflictError::DuplicateCredentialHash.into());
        }
        self.credentials
            .insert(credential.id.to_string(), credential);
        Ok(())
    }

    fn ballot_by_commitment(&self, commitment_hash: &str) -> Option<Ballot> {
        self.ballots
            .values()
            .find(|b| b.commitment_hash == commitment_hash)
            .cloned()
    }

    fn ballot_by_credential_hash(&self, credential_hash: &str) -> Option<Ballot> {
        self.ballots
            .values()
            .find(|b| b.credential_hash == credential_hash)
            .cloned()
    }

    fn ballots(&self, election_id: &str) -> Vec<Ballot> {
        self.ballots
            .values()
            .filter(|b| b.election_id == election_id)
            .cloned()
            .collect()
    }

    fn update_ballot(&mut self, ballot: Ballot) {
        self.ballots.insert(ballot.id.to_string(), ballot);
    }

    fn commit_submission(&mut self, submission: Submission) -> Result<(), Error> {
        // Uniqueness checks first so nothing is written on conflict
        self.check_submission(&submission)?;

        let Submission {
            ballot,
            credential,
            participant,
            superseded,
            audit,
        } = submission;

        self.ballots.insert(ballot.id.to_string(), ballot);
        self.credentials
            .insert(credential.id.to_string(), credential);
        self.participants
            .insert(participant.id.to_string(), participant);
        if let Some(superseded) = superseded {
            self.ballots.insert(superseded.id.to_string(), superseded);
        }
        self.append_audit(audit);

        Ok(())
    }

    fn last_audit_hash(&self, election_id: &str) -> Option<String> {
        self.audit
            .get(election_id)
            .and_then(|entries| entries.last())
            .map(|entry| entry.hash.clone())
    }

    fn append_audit(&mut self, entry: AuditEntry) {
        self.audit
            .entry(entry.election_id.clone())
            .or_insert_with(Vec::new)
            .push(entry);
    }

    fn audit_entries(&self, election_id: &str) -> Vec<AuditEntry> {
        self.audit.get(election_id).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use indexmap::IndexMap;

    #[test]
    fn test_credential_hash_uniqueness() {
        let now = Utc::now();
        let mut store = MemStore::default();

        let participant = Participant::new("el_1", "ph", now);
        let a = Credential::new(
            "el_1",
            participant.id,
            "same-hash",
            now,
            now + Duration::hours(1),
            1,
            None,
        );
        let b = Credential::new(
            "el_1",
            participant.id,
            "same-hash",
            now,
            now + Duration::hours(1),
            1,
            None,
        );

        store.insert_credential(a).unwrap();
        let err = store.insert_credential(b).unwrap_err();
        assert!(err.is_conflict());
    }

    #[test]
    fn test_commit_submission_is_all_or_nothing() {
        let now = Utc::now();
        let mut store = MemStore::default();

        let mut participant = Participant::new("el_1", "ph", now);
        participant.transition(ParticipantStatus::Verified, now).unwrap();

        let credential = Credential::new(
            "el_1",
            participant.id,
            "cred-hash",
            now,
            now + Duration::hours(1),
            1,
            None,
        );

        let ballot = Ballot {
            id: Uuid::new_v4(),
            election_id: "el_1".to_string(),
            credential_hash: "cred-hash".to_string(),
            commitment_hash: "commit-1".to_string(),
            commitment_salt: "salt".to_string(),
            payload: EncryptedPayload {
                nonce: vec![0; 12],
                ciphertext: vec![1],
            },
            channel: VoteChannel::Web,
            status: BallotStatus::Pending,
            submitted_at: now,
            confirmed_at: None,
            tallied_at: None,
            version: 1,
            anchor: None,
        };

        let audit = AuditEntry::new(
            "el_1",
            "",
            "vote.ballot_submitted",
            "Ballot",
            &ballot.id.to_string(),
            IndexMap::new(),
            now,
        )
        .unwrap();

        let submission = Submission {
            ballot: ballot.clone(),
            credential,
            participant,
            superseded: None,
            audit,
        };

        store.commit_submission(submission.clone()).unwrap();

        // A second submission reusing the credential hash is refused and
        // writes nothing new
        let audit_len = store.audit_entries("el_1").len();
        let mut dup = submission;
        dup.ballot.id = Uuid::new_v4();
        dup.ballot.commitment_hash = "commit-2".to_string();
        assert!(store.commit_submission(dup).unwrap_err().is_conflict());
        assert_eq!(store.audit_entries("el_1").len(), audit_len);
        assert!(store.ballot_by_commitment("commit-2").is_none());
    }
}
