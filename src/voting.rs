//! The voting service: credential issuance, anonymized ballot submission,
//! public verification and participant status.
//!
//! This is the only place where a participant identity and a ballot exist in
//! the same scope, and the link between them is dropped before anything is
//! persisted. The store, clock and anchor are injected so the core stays
//! deterministic under test.

use crate::*;
use chrono::{DateTime, Duration, Utc};
use indexmap::IndexMap;
use log::{info, warn};
use rand::rngs::OsRng;
use uuid::Uuid;

/// How long an issued credential stays valid.
pub const CREDENTIAL_TTL_MINUTES: i64 = 60;

/// Handed back from credential issuance. `secret` is the only copy of the
/// raw credential; it is never stored.
#[derive(Debug, Clone)]
pub struct IssuedCredential {
    pub credential_id: Uuid,
    pub secret: String,
    pub expires_at: DateTime<Utc>,
    pub version: u32,
}

/// Handed back from ballot submission. Contains nothing that identifies the
/// participant.
#[derive(Debug, Clone)]
pub struct SubmissionReceipt {
    pub ballot_id: Uuid,
    pub commitment_hash: String,
    pub receipt_code: String,
    pub status: BallotStatus,
    pub anchored: bool,
}

/// Public verification result for a commitment hash.
#[derive(Debug, Clone)]
pub struct VerifyOutcome {
    pub status: BallotStatus,
    pub commitment_valid: bool,
    pub submitted_at: DateTime<Utc>,
    pub anchor: Option<AnchorReceipt>,
}

/// Participant-facing status, with no reference to any ballot.
#[derive(Debug, Clone)]
pub struct ParticipantView {
    pub status: ParticipantStatus,
    pub has_active_credential: bool,
}

pub struct VotingService<S: Store, C: Clock, A: Anchor> {
    store: S,
    clock: C,
    anchor: A,
    master_key: MasterKey,
    events: Vec<DomainEvent>,
}

impl<S: Store, C: Clock, A: Anchor> VotingService<S, C, A> {
    pub fn new(store: S, clock: C, anchor: A, master_key: MasterKey) -> Self {
        VotingService {
            store,
            clock,
            anchor,
            master_key,
            events: Vec::new(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Drain the domain events emitted since the last call.
    pub fn take_events(&mut self) -> Vec<DomainEvent> {
        std::mem::take(&mut self.events)
    }

    /// Register a participant on the election allowlist. The raw identifier
    /// is hashed immediately and never stored.
    pub fn register_participant(
        &mut self,
        election_id: &str,
        identifier: &str,
    ) -> Result<Participant, Error> {
        let now = self.clock.now();
        let hash = participant_hash(&self.master_key, election_id, identifier);
        let participant = Participant::new(election_id, &hash, now);
        self.store.put_participant(participant.clone());
        Ok(participant)
    }

    /// Issue a one-time voting credential to a verified participant.
    ///
    /// For vote changes, a new credential version is chained onto the
    /// participant's previous one; the lineage lives entirely on the
    /// credential side so ballots stay unlinkable.
    pub fn request_credential(
        &mut self,
        election_id: &str,
        identifier: &str,
    ) -> Result<IssuedCredential, Error> {
        let now = self.clock.now();

        let election = self
            .store
            .election(election_id)
            .ok_or_else(|| NotFoundError::Election(election_id.to_string()))?;
        election.assert_voting_open(now)?;

        let hash = participant_hash(&self.master_key, election_id, identifier);
        let participant = self
            .store
            .participant(election_id, &hash)
            .ok_or(NotFoundError::Participant)?;

        match participant.status {
            ParticipantStatus::Blocked => {
                return Err(AuthorizationError::ParticipantBlocked.into())
            }
            ParticipantStatus::Rejected => {
                return Err(AuthorizationError::ParticipantRejected.into())
            }
            ParticipantStatus::Pending => {
                return Err(AuthorizationError::ParticipantNotVerified.into())
            }
            ParticipantStatus::Verified => {}
            ParticipantStatus::Voted => {
                if !election.allow_vote_change {
                    return Err(ConflictError::AlreadyVoted.into());
                }
                let deadline = election.vote_change_deadline.unwrap_or(election.voting_end_at);
                if now > deadline {
                    return Err(ConflictError::VoteChangeDeadlinePassed.into());
                }
            }
        }

        if self
            .store
            .active_credential(participant.id, now)
            .is_some()
        {
            return Err(ConflictError::ActiveCredentialExists.into());
        }

        let previous = self.store.latest_credential(participant.id);
        let version = previous.as_ref().map(|c| c.version + 1).unwrap_or(1);
        let previous_id = previous.map(|c| c.id);

        let secret = generate_credential_secret(&mut OsRng);
        let expires_at = now + Duration::minutes(CREDENTIAL_TTL_MINUTES);
        let credential = Credential::new(
            election_id,
            participant.id,
            &credential_hash(&secret),
            now,
            expires_at,
            version,
            previous_id,
        );
        self.store.insert_credential(credential.clone())?;

        let mut details = IndexMap::new();
        details.insert("version".to_string(), serde_json::json!(version));
        details.insert(
            "expiresAt".to_string(),
            serde_json::json!(expires_at.to_rfc3339()),
        );
        append_audit_entry(
            &mut self.store,
            election_id,
            "vote.token_issued",
            "Credential",
            &credential.id.to_string(),
            details,
            now,
        )?;

        info!(
            "issued credential v{} for election {}",
            version, election_id
        );
        self.events.push(DomainEvent::CredentialIssued {
            election_id: election_id.to_string(),
            participant_id: participant.id,
            credential_id: credential.id,
            version,
            expires_at,
        });

        Ok(IssuedCredential {
            credential_id: credential.id,
            secret,
            expires_at,
            version,
        })
    }

    /// Submit an anonymized ballot against a one-time credential.
    ///
    /// Consumes the credential, records the participant as voted and stores
    /// a ballot that references only the credential hash. If the credential
    /// is a later version of a lineage, the prior ballot is superseded in
    /// the same transaction. Anchoring happens after commit and is
    /// best-effort: an anchor failure leaves the ballot PENDING, it never
    /// loses the vote.
    pub fn submit_ballot(
        &mut self,
        election_id: &str,
        secret: &str,
        selections: &[Selection],
        channel: VoteChannel,
    ) -> Result<SubmissionReceipt, Error> {
        let now = self.clock.now();

        let election = self
            .store
            .election(election_id)
            .ok_or_else(|| NotFoundError::Election(election_id.to_string()))?;
        election.assert_voting_open(now)?;

        let presented_hash = credential_hash(secret);
        let mut credential = self
            .store
            .credential_by_hash(election_id, &presented_hash)
            .ok_or(AuthorizationError::UnknownCredential)?;

        if credential.status != CredentialStatus::Issued {
            return Err(ConflictError::CredentialConsumed(credential.status.to_string()).into());
        }
        if credential.is_expired(now) {
            return Err(AuthorizationError::CredentialExpired.into());
        }

        let mut participant = self
            .store
            .participant_by_id(credential.participant_id)
            .ok_or(NotFoundError::Participant)?;
        if participant.status == ParticipantStatus::Blocked {
            return Err(AuthorizationError::ParticipantBlocked.into());
        }

        election.validate_selections(selections)?;

        // Vote change: the prior ballot is found by walking the credential
        // lineage, never through the participant. Expired-unused links in
        // the chain are skipped.
        let mut superseded = None;
        let mut prior = credential.previous;
        while let Some(previous_id) = prior {
            let previous = self
                .store
                .credential_by_id(previous_id)
                .ok_or(NotFoundError::Credential)?;
            if let Some(ballot) = self
                .store
                .ballot_by_credential_hash(&previous.credential_hash)
            {
                superseded = Some(ballot);
                break;
            }
            prior = previous.previous;
        }

        let payload = encrypt_selections(&mut OsRng, &self.master_key, election_id, selections)?;
        let salt = generate_commitment_salt(&mut OsRng);
        let millis = timestamp_millis(now);
        let commitment =
            ballot_commitment(&payload.ciphertext_b64(), &salt, election_id, millis);
        let receipt = receipt_code(&commitment);

        let ballot = Ballot {
            id: Uuid::new_v4(),
            election_id: election_id.to_string(),
            credential_hash: presented_hash,
            commitment_hash: commitment.clone(),
            commitment_salt: salt,
            payload,
            channel,
            status: BallotStatus::Pending,
            submitted_at: now,
            confirmed_at: None,
            tallied_at: None,
            version: credential.version,
            anchor: None,
        };

        credential.transition(CredentialStatus::Used, now)?;
        participant.transition(ParticipantStatus::Voted, now)?;

        let superseded = match superseded {
            Some(mut prior) => {
                prior.transition(BallotStatus::Superseded, now)?;
                Some(prior)
            }
            None => None,
        };

        let mut details = IndexMap::new();
        details.insert("channel".to_string(), serde_json::json!(ballot.channel.to_string()));
        details.insert("version".to_string(), serde_json::json!(ballot.version));
        let previous_hash = self.store.last_audit_hash(election_id).unwrap_or_default();
        let audit = AuditEntry::new(
            election_id,
            &previous_hash,
            "vote.ballot_submitted",
            "Ballot",
            &ballot.id.to_string(),
            details,
            now,
        )?;

        let ballot_id = ballot.id;
        let superseded_id = superseded.as_ref().map(|b| b.id);
        self.store.commit_submission(Submission {
            ballot: ballot.clone(),
            credential,
            participant,
            superseded,
            audit,
        })?;

        info!("ballot {} committed for election {}", ballot_id, election_id);
        self.events.push(DomainEvent::BallotSubmitted {
            election_id: election_id.to_string(),
            ballot_id,
            commitment_hash: commitment.clone(),
            receipt_code: receipt.clone(),
        });
        if let Some(superseded_by) = superseded_id {
            self.events.push(DomainEvent::BallotSuperseded {
                election_id: election_id.to_string(),
                ballot_id: superseded_by,
                superseded_by: ballot_id,
            });
        }

        let status = self.try_anchor(ballot, now);

        Ok(SubmissionReceipt {
            ballot_id,
            commitment_hash: commitment,
            receipt_code: receipt,
            status,
            anchored: status == BallotStatus::Confirmed,
        })
    }

    /// Anchor the commitment and confirm the ballot. Failure is logged and
    /// swallowed; the ballot stays PENDING for a retry sweep.
    fn try_anchor(&mut self, mut ballot: Ballot, now: DateTime<Utc>) -> BallotStatus {
        let receipt = match self
            .anchor
            .anchor_commitment(&ballot.election_id, &ballot.commitment_hash, now)
        {
            Ok(receipt) => receipt,
            Err(err) => {
                warn!(
                    "anchoring failed for ballot {}, leaving pending: {}",
                    ballot.id, err
                );
                return ballot.status;
            }
        };

        if let Err(err) = ballot.transition(BallotStatus::Confirmed, now) {
            warn!("could not confirm ballot {}: {}", ballot.id, err);
            return ballot.status;
        }
        ballot.anchor = Some(receipt.clone());
        self.store.update_ballot(ballot.clone());

        let mut details = IndexMap::new();
        details.insert("txId".to_string(), serde_json::json!(receipt.tx_id));
        details.insert(
            "blockNumber".to_string(),
            serde_json::json!(receipt.block_number),
        );
        if let Err(err) = append_audit_entry(
            &mut self.store,
            &ballot.election_id,
            "vote.ballot_confirmed",
            "Ballot",
            &ballot.id.to_string(),
            details,
            now,
        ) {
            warn!("audit append failed after confirmation: {}", err);
        }

        self.events.push(DomainEvent::BallotConfirmed {
            election_id: ballot.election_id.clone(),
            ballot_id: ballot.id,
            anchor_tx_id: receipt.tx_id,
        });

        ballot.status
    }

    /// Public verification: look up a ballot by its commitment hash and
    /// recompute the commitment from the stored inputs.
    pub fn verify_ballot(&self, commitment_hash: &str) -> Result<VerifyOutcome, Error> {
        let ballot = self
            .store
            .ballot_by_commitment(commitment_hash)
            .ok_or(NotFoundError::Ballot)?;

        let commitment_valid = verify_ballot_commitment(
            &ballot.commitment_hash,
            &ballot.payload.ciphertext_b64(),
            &ballot.commitment_salt,
            &ballot.election_id,
            timestamp_millis(ballot.submitted_at),
        );

        Ok(VerifyOutcome {
            status: ballot.status,
            commitment_valid,
            submitted_at: ballot.submitted_at,
            anchor: ballot.anchor,
        })
    }

    /// Participant-facing status. Says whether they have voted, never which
    /// ballot is theirs.
    pub fn participant_status(
        &self,
        election_id: &str,
        identifier: &str,
    ) -> Result<ParticipantView, Error> {
        let hash = participant_hash(&self.master_key, election_id, identifier);
        let participant = self
            .store
            .participant(election_id, &hash)
            .ok_or(NotFoundError::Participant)?;

        let has_active_credential = self
            .store
            .active_credential(participant.id, self.clock.now())
            .is_some();

        Ok(ParticipantView {
            status: participant.status,
            has_active_credential,
        })
    }
}
