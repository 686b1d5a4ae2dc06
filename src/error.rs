use thiserror::Error;

/// Error types
///
/// Validation, authorization and conflict errors are surfaced synchronously
/// to the caller. Crypto errors abort the stage that produced them and must
/// never yield a partial result. External errors are retryable and never
/// affect the validity of an already-committed ballot.
#[derive(Debug, Error)]
pub enum Error {
    #[error("anonballot validation: {0}")]
    Validation(#[from] ValidationError),

    #[error("anonballot authorization: {0}")]
    Authorization(#[from] AuthorizationError),

    #[error("anonballot conflict: {0}")]
    Conflict(#[from] ConflictError),

    #[error("anonballot not found: {0}")]
    NotFound(#[from] NotFoundError),

    #[error("anonballot crypto: {0}")]
    Crypto(#[from] CryptoError),

    #[error("anonballot external service: {0}")]
    External(#[from] ExternalError),

    #[error("anonballot: CBOR serialization error: {0}")]
    Cbor(#[from] serde_cbor::Error),

    #[error("anonballot: JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict(_))
    }

    pub fn is_crypto(&self) -> bool {
        matches!(self, Error::Crypto(_))
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::External(_))
    }
}

/// Malformed input: unknown contests or options, selection cardinality
/// outside contest rules, closed or out-of-window elections.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("election {0} is not active (status: {1})")]
    ElectionNotActive(String, String),

    #[error("voting has not started yet")]
    VotingNotStarted,

    #[error("voting has ended")]
    VotingEnded,

    #[error("at least one selection is required")]
    EmptySelections,

    #[error("unknown contest: {0}")]
    UnknownContest(String),

    #[error("unknown option {option} for contest {contest}")]
    UnknownOption { contest: String, option: String },

    #[error("contest {contest} requires between {min} and {max} selections, got {got}")]
    SelectionCardinality {
        contest: String,
        min: u32,
        max: u32,
        got: u32,
    },

    #[error("threshold {0} is invalid for {1} nodes")]
    InvalidThreshold(usize, usize),

    #[error("participant is not on the allowlist")]
    NotOnAllowlist,

    #[error("selection does not fit the mix-net encoding (contest index {0}, option index {1})")]
    SelectionNotEncodable(u16, u16),
}

/// The presented credential cannot authorize a submission.
#[derive(Debug, Error)]
pub enum AuthorizationError {
    #[error("invalid credential")]
    UnknownCredential,

    #[error("credential has expired")]
    CredentialExpired,

    #[error("participant has been blocked")]
    ParticipantBlocked,

    #[error("participant verification was rejected")]
    ParticipantRejected,

    #[error("participant is not verified")]
    ParticipantNotVerified,
}

/// Double voting, concurrent credential collisions and attempts to leave a
/// terminal lifecycle state.
#[derive(Debug, Error)]
pub enum ConflictError {
    #[error("participant has already voted and vote change is not allowed")]
    AlreadyVoted,

    #[error("vote change deadline has passed")]
    VoteChangeDeadlinePassed,

    #[error("an active credential already exists for this participant")]
    ActiveCredentialExists,

    #[error("credential hash already exists")]
    DuplicateCredentialHash,

    #[error("credential has already been used (status: {0})")]
    CredentialConsumed(String),

    #[error("a ballot was already submitted with this credential")]
    DuplicateBallotForCredential,

    #[error("ballot commitment hash already exists")]
    DuplicateCommitment,

    #[error("invalid {kind} transition: {from} -> {to}")]
    InvalidTransition {
        kind: &'static str,
        from: String,
        to: String,
    },
}

#[derive(Debug, Error)]
pub enum NotFoundError {
    #[error("election {0} not found")]
    Election(String),

    #[error("participant not found or not registered")]
    Participant,

    #[error("ballot not found")]
    Ballot,

    #[error("credential not found")]
    Credential,
}

/// Failures inside the decryption and proof stages. These abort the stage;
/// no partially-decrypted or unverified result is ever returned.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("not enough decryption shares: need {0}, found {1}")]
    NotEnoughShares(usize, usize),

    #[error("decryption share from node {0} failed verification")]
    InvalidDecryptionShare(u32),

    #[error("decrypted plaintext is outside the selection-code range")]
    PlaintextOutOfRange,

    #[error("AEAD authentication failed")]
    AeadFailure,

    #[error("proof verification failed: {0}")]
    ProofVerificationFailed(&'static str),

    #[error("ballot {0} carries an invalid encryption randomness proof")]
    InvalidEncryptionProof(usize),

    #[error("audit chain hash mismatch at entry {index} ({entry_id})")]
    AuditChainMismatch { index: usize, entry_id: String },

    #[error("mix-net is not initialized")]
    MixnetNotInitialized,

    #[error("mix-net ballot count changed at stage {stage}: {input} in, {output} out")]
    BallotCountMismatch {
        stage: usize,
        input: usize,
        output: usize,
    },
}

/// Anchoring/ledger failures. Always retryable; never unwinds a ballot.
#[derive(Debug, Error)]
pub enum ExternalError {
    #[error("blockchain anchor unreachable: {0}")]
    AnchorUnreachable(String),

    #[error("anchor transaction rejected: {0}")]
    AnchorRejected(String),
}
