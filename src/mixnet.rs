//! Re-encryption mix-net cascade.
//!
//! Each node shuffles the ballot set with a fresh random permutation and
//! re-randomizes every ciphertext, then publishes a signed shuffle proof.
//! The aggregate re-encryption relation is checked with a Chaum-Pedersen
//! proof over the ciphertext sums, so a verifier can confirm the output is
//! a re-encryption of the input set without learning the permutation.
//!
//! After the final layer no remaining metadata orders the outputs, and the
//! joint decryption key exists only as threshold shares across the nodes.

use crate::*;
use chrono::{DateTime, Utc};
use curve25519_dalek::constants::RISTRETTO_BASEPOINT_POINT;
use curve25519_dalek::ristretto::RistrettoPoint;
use curve25519_dalek::scalar::Scalar;
use curve25519_dalek::traits::Identity;
use ed25519_dalek::{ExpandedSecretKey, Keypair, PublicKey, Signature};
use log::warn;
use rand::seq::SliceRandom;
use rand::{CryptoRng, RngCore};

const SHUFFLE_GENERATOR_SEED: &[u8] = b"anonballot-shuffle-commitment";

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MixNodeStatus {
    Ready,
    Completed,
    Failed,
}

/// Public descriptor of a mix node: everything a verifier needs.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MixNode {
    pub id: String,
    pub index: u32,

    #[serde(with = "EdPublicKeyHex")]
    pub verifying_key: PublicKey,

    /// The node's dealt share commitment `x_i * G`. Decryption shares are
    /// checked against this point, never against material the share
    /// carries itself.
    pub share_public: RistrettoPoint,

    pub status: MixNodeStatus,
}

/// One node's private runtime state.
struct MixNodeRuntime {
    descriptor: MixNode,
    signing: Keypair,
    key_share: KeyShare,
}

/// A ballot inside the cascade. Deliberately carries no ballot id and no
/// submitter-linked field; position and randomness are all that change
/// between layers.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct EncryptedBallot {
    /// One ciphertext per selection.
    pub ciphertexts: Vec<Ciphertext>,

    /// Proofs of knowledge of the encryption randomness. Present only at
    /// layer 0; consumed when mixing starts, since re-encryption
    /// invalidates them.
    pub pok: Option<Vec<SchnorrProof>>,

    pub layer: u32,
}

/// Published by a node after its shuffle. The input/output hashes pin the
/// ciphertext sets, the Chaum-Pedersen proof ties the output sum to the
/// input sum, and the signature binds the whole statement to the node.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ShuffleProof {
    pub input_hash: String,
    pub output_hash: String,

    pub permutation_commitment: RistrettoPoint,
    pub reencryption_proof: ChaumPedersenProof,

    pub node_id: String,
    pub node_index: u32,

    #[serde(with = "EdSignatureHex")]
    pub signature: Signature,

    pub timestamp: DateTime<Utc>,
}

/// One completed layer: the full output set plus its proof, kept so any
/// verifier can recompute the per-stage sums.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MixStage {
    pub node_id: String,
    pub layer: u32,
    pub output: Vec<EncryptedBallot>,
    pub proof: ShuffleProof,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MixnetResult {
    pub stages: Vec<MixStage>,
    pub mixed: Vec<EncryptedBallot>,
}

/// Encrypt a validated selection set for the cascade, one exponential
/// ElGamal ciphertext per selection, with proofs of encryption randomness.
pub fn encrypt_ballot<R: RngCore + CryptoRng>(
    rng: &mut R,
    key: &EncryptionKey,
    election: &Election,
    selections: &[Selection],
) -> Result<EncryptedBallot, Error> {
    let mut ciphertexts = Vec::with_capacity(selections.len());
    let mut pok = Vec::with_capacity(selections.len());

    for selection in selections {
        let code = election.selection_code(selection)?;
        let (ciphertext, randomness) = encrypt(rng, key, code)?;
        pok.push(SchnorrProof::prove(rng, &ciphertext, &randomness));
        ciphertexts.push(ciphertext);
    }

    Ok(EncryptedBallot {
        ciphertexts,
        pok: Some(pok),
        layer: 0,
    })
}

impl EncryptedBallot {
    /// Check the layer-0 proofs of knowledge. Always false once mixed.
    pub fn verify_pok(&self) -> bool {
        match &self.pok {
            Some(proofs) => {
                proofs.len() == self.ciphertexts.len()
                    && proofs
                        .iter()
                        .zip(&self.ciphertexts)
                        .all(|(proof, ciphertext)| proof.verify(ciphertext))
            }
            None => false,
        }
    }

    fn ciphertext_hash(&self) -> Result<String, Error> {
        Ok(sha256_hex(&serde_cbor::to_vec(&self.ciphertexts)?))
    }
}

/// Order-independent hash of a ballot set: per-ballot hashes, sorted, then
/// hashed together. Two sets match iff they hold the same ciphertexts.
fn ballot_set_hash(ballots: &[EncryptedBallot]) -> Result<String, Error> {
    let mut hashes = ballots
        .iter()
        .map(|b| b.ciphertext_hash())
        .collect::<Result<Vec<_>, _>>()?;
    hashes.sort();
    Ok(sha256_hex(hashes.join("").as_bytes()))
}

fn ciphertext_sums(ballots: &[EncryptedBallot]) -> (RistrettoPoint, RistrettoPoint) {
    let mut c1 = RistrettoPoint::identity();
    let mut c2 = RistrettoPoint::identity();
    for ballot in ballots {
        for ciphertext in &ballot.ciphertexts {
            c1 += ciphertext.c1;
            c2 += ciphertext.c2;
        }
    }
    (c1, c2)
}

fn shuffle_statement(input_hash: &str, output_hash: &str, layer: u32) -> Vec<u8> {
    let mut statement = Vec::new();
    statement.extend_from_slice(input_hash.as_bytes());
    statement.extend_from_slice(output_hash.as_bytes());
    statement.extend_from_slice(&layer.to_le_bytes());
    statement
}

/// The full cascade: node roster, signing keys and threshold key shares.
pub struct Mixnet {
    pub threshold: usize,
    pub encryption_key: EncryptionKey,
    nodes: Vec<MixNodeRuntime>,
}

impl Mixnet {
    /// Set up a cascade of `node_ids.len()` nodes with decryption
    /// threshold `threshold`.
    pub fn new<R: RngCore + CryptoRng>(
        rng: &mut R,
        threshold: usize,
        node_ids: &[&str],
    ) -> Result<Self, Error> {
        let (encryption_key, shares) = generate_key_shares(rng, threshold, node_ids.len())?;

        let nodes = node_ids
            .iter()
            .zip(shares)
            .enumerate()
            .map(|(i, (id, key_share))| {
                let signing = Keypair::generate(rng);
                MixNodeRuntime {
                    descriptor: MixNode {
                        id: id.to_string(),
                        index: i as u32 + 1,
                        verifying_key: signing.public,
                        share_public: key_share.public,
                        status: MixNodeStatus::Ready,
                    },
                    signing,
                    key_share,
                }
            })
            .collect();

        Ok(Mixnet {
            threshold,
            encryption_key,
            nodes,
        })
    }

    pub fn roster(&self) -> Vec<MixNode> {
        self.nodes.iter().map(|n| n.descriptor.clone()).collect()
    }

    /// Run every ballot through the full cascade.
    ///
    /// Layer-0 ballots must carry valid proofs of encryption randomness.
    /// A single invalid ballot rejects the whole batch, named by position,
    /// so every stage output holds exactly as many ballots as the input.
    pub fn mix<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
        input: Vec<EncryptedBallot>,
    ) -> Result<MixnetResult, Error> {
        if self.nodes.is_empty() {
            return Err(CryptoError::MixnetNotInitialized.into());
        }

        for (index, ballot) in input.iter().enumerate() {
            if !ballot.verify_pok() {
                warn!("ballot {} failed its encryption randomness proof", index);
                return Err(CryptoError::InvalidEncryptionProof(index).into());
            }
        }

        let mut current: Vec<EncryptedBallot> = input
            .into_iter()
            .map(|ballot| EncryptedBallot {
                ciphertexts: ballot.ciphertexts,
                pok: None,
                layer: 0,
            })
            .collect();

        let encryption_key = self.encryption_key;
        let mut stages = Vec::with_capacity(self.nodes.len());

        for node in &mut self.nodes {
            let layer = node.descriptor.index;
            let input_hash = ballot_set_hash(&current)?;
            let (in_c1, in_c2) = ciphertext_sums(&current);

            // Fresh permutation, then re-randomize every ciphertext
            let mut order: Vec<usize> = (0..current.len()).collect();
            order.shuffle(rng);

            let mut total_randomness = Scalar::zero();
            let output: Vec<EncryptedBallot> = order
                .iter()
                .map(|&i| {
                    let ciphertexts = current[i]
                        .ciphertexts
                        .iter()
                        .map(|ciphertext| {
                            let (rerandomized, r) = reencrypt(rng, &encryption_key, ciphertext);
                            total_randomness += r;
                            rerandomized
                        })
                        .collect();
                    EncryptedBallot {
                        ciphertexts,
                        pok: None,
                        layer,
                    }
                })
                .collect();

            let output_hash = ballot_set_hash(&output)?;
            let (out_c1, out_c2) = ciphertext_sums(&output);

            // Aggregate re-encryption relation: the ciphertext sums differ
            // by exactly (R*G, R*pk) for the node's total randomness R
            let reencryption_proof = ChaumPedersenProof::prove(
                rng,
                &RISTRETTO_BASEPOINT_POINT,
                &encryption_key.0,
                &(out_c1 - in_c1),
                &(out_c2 - in_c2),
                &total_randomness,
            );

            let permutation_commitment = commit_permutation(rng, &order);

            let statement = shuffle_statement(&input_hash, &output_hash, layer);
            let expanded: ExpandedSecretKey = (&node.signing.secret).into();
            let signature = expanded.sign(&statement, &node.signing.public);

            let proof = ShuffleProof {
                input_hash,
                output_hash,
                permutation_commitment,
                reencryption_proof,
                node_id: node.descriptor.id.clone(),
                node_index: node.descriptor.index,
                signature,
                timestamp: Utc::now(),
            };

            node.descriptor.status = MixNodeStatus::Completed;
            stages.push(MixStage {
                node_id: node.descriptor.id.clone(),
                layer,
                output: output.clone(),
                proof,
            });
            current = output;
        }

        Ok(MixnetResult {
            stages,
            mixed: current,
        })
    }

    /// Threshold-decrypt the cascade output back to selection codes.
    /// `threshold` nodes each produce verified decryption shares per
    /// ciphertext.
    pub fn decrypt_outputs<R: RngCore + CryptoRng>(
        &self,
        rng: &mut R,
        mixed: &[EncryptedBallot],
    ) -> Result<Vec<Vec<u32>>, Error> {
        if self.nodes.is_empty() {
            return Err(CryptoError::MixnetNotInitialized.into());
        }

        let share_publics: Vec<RistrettoPoint> =
            self.nodes.iter().map(|n| n.key_share.public).collect();

        mixed
            .iter()
            .map(|ballot| {
                ballot
                    .ciphertexts
                    .iter()
                    .map(|ciphertext| {
                        let shares: Vec<DecryptionShare> = self.nodes[..self.threshold]
                            .iter()
                            .map(|node| node.key_share.decrypt_share(rng, ciphertext))
                            .collect();
                        combine_shares(ciphertext, &shares, self.threshold, &share_publics)
                    })
                    .collect()
            })
            .collect()
    }
}

/// Pedersen vector commitment to the permutation, published so the node is
/// bound to one permutation per layer.
fn commit_permutation<R: RngCore + CryptoRng>(rng: &mut R, order: &[usize]) -> RistrettoPoint {
    let generators = pedersen_generators(order.len() + 1, SHUFFLE_GENERATOR_SEED);
    let blinding = Scalar::random(rng);

    let mut commitment = blinding * generators[order.len()];
    for (slot, &source) in order.iter().enumerate() {
        commitment += Scalar::from(source as u64) * generators[slot];
    }
    commitment
}

/// Verify a full cascade transcript against the original input set.
///
/// Checks, per stage: ballot count, input/output set hashes, the aggregate
/// re-encryption proof against recomputed ciphertext sums, and the node
/// signature over the shuffle statement. Fails on the first divergence;
/// a transcript is either fully valid or worthless.
pub fn verify_mix(
    input: &[EncryptedBallot],
    stages: &[MixStage],
    roster: &[MixNode],
    key: &EncryptionKey,
) -> Result<(), Error> {
    let mut previous: Vec<EncryptedBallot> = input
        .iter()
        .map(|ballot| EncryptedBallot {
            ciphertexts: ballot.ciphertexts.clone(),
            pok: None,
            layer: 0,
        })
        .collect();

    for (index, stage) in stages.iter().enumerate() {
        if stage.output.len() != previous.len() {
            warn!(
                "mix stage {}: ballot count changed from {} to {}",
                index,
                previous.len(),
                stage.output.len()
            );
            return Err(CryptoError::BallotCountMismatch {
                stage: index,
                input: previous.len(),
                output: stage.output.len(),
            }
            .into());
        }

        let input_hash = ballot_set_hash(&previous)?;
        let output_hash = ballot_set_hash(&stage.output)?;
        if stage.proof.input_hash != input_hash || stage.proof.output_hash != output_hash {
            warn!("mix stage {}: set hash mismatch", index);
            return Err(CryptoError::ProofVerificationFailed("shuffle set hash").into());
        }

        let (in_c1, in_c2) = ciphertext_sums(&previous);
        let (out_c1, out_c2) = ciphertext_sums(&stage.output);
        if !stage.proof.reencryption_proof.verify(
            &RISTRETTO_BASEPOINT_POINT,
            &key.0,
            &(out_c1 - in_c1),
            &(out_c2 - in_c2),
        ) {
            warn!("mix stage {}: re-encryption proof failed", index);
            return Err(CryptoError::ProofVerificationFailed("shuffle re-encryption").into());
        }

        let node = roster
            .iter()
            .find(|n| n.index == stage.proof.node_index)
            .ok_or(CryptoError::ProofVerificationFailed("unknown mix node"))?;
        let statement = shuffle_statement(&input_hash, &output_hash, stage.layer);
        if node
            .verifying_key
            .verify_strict(&statement, &stage.proof.signature)
            .is_err()
        {
            warn!("mix stage {}: bad signature from {}", index, stage.node_id);
            return Err(CryptoError::ProofVerificationFailed("shuffle signature").into());
        }

        previous = stage.output.clone();
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    fn cascade() -> Mixnet {
        Mixnet::new(&mut OsRng, 2, &["node-a", "node-b", "node-c"]).unwrap()
    }

    fn encrypt_codes(key: &EncryptionKey, codes: &[u32]) -> EncryptedBallot {
        let mut ciphertexts = Vec::new();
        let mut pok = Vec::new();
        for &code in codes {
            let (ciphertext, r) = encrypt(&mut OsRng, key, code).unwrap();
            pok.push(SchnorrProof::prove(&mut OsRng, &ciphertext, &r));
            ciphertexts.push(ciphertext);
        }
        EncryptedBallot {
            ciphertexts,
            pok: Some(pok),
            layer: 0,
        }
    }

    #[test]
    fn test_mix_preserves_plaintexts() {
        let mut mixnet = cascade();
        let key = mixnet.encryption_key;

        let input: Vec<EncryptedBallot> = [[0u32, 257], [1, 258], [0, 259]]
            .iter()
            .map(|codes| encrypt_codes(&key, codes))
            .collect();

        let result = mixnet.mix(&mut OsRng, input).unwrap();
        assert_eq!(result.stages.len(), 3);
        assert_eq!(result.mixed.len(), 3);
        assert!(result.mixed.iter().all(|b| b.pok.is_none()));

        let mut decrypted = mixnet.decrypt_outputs(&mut OsRng, &result.mixed).unwrap();
        decrypted.sort();
        assert_eq!(
            decrypted,
            vec![vec![0, 257], vec![0, 259], vec![1, 258]]
        );
    }

    #[test]
    fn test_cascade_transcript_verifies() {
        let mut mixnet = cascade();
        let key = mixnet.encryption_key;
        let roster = mixnet.roster();

        let input: Vec<EncryptedBallot> =
            (0..4).map(|i| encrypt_codes(&key, &[i])).collect();

        let result = mixnet.mix(&mut OsRng, input.clone()).unwrap();
        verify_mix(&input, &result.stages, &roster, &key).unwrap();
    }

    #[test]
    fn test_tampered_stage_fails_verification() {
        let mut mixnet = cascade();
        let key = mixnet.encryption_key;
        let roster = mixnet.roster();

        let input: Vec<EncryptedBallot> =
            (0..3).map(|i| encrypt_codes(&key, &[i])).collect();
        let result = mixnet.mix(&mut OsRng, input.clone()).unwrap();

        // Replace one mixed ciphertext with a fresh encryption of something else
        let mut forged = result.stages.clone();
        let (substitute, _) = encrypt(&mut OsRng, &key, 42).unwrap();
        forged[1].output[0].ciphertexts[0] = substitute;

        assert!(verify_mix(&input, &forged, &roster, &key).is_err());
    }

    #[test]
    fn test_removed_ballot_fails_count_check() {
        let mut mixnet = cascade();
        let key = mixnet.encryption_key;
        let roster = mixnet.roster();

        let input: Vec<EncryptedBallot> =
            (0..3).map(|i| encrypt_codes(&key, &[i])).collect();
        let result = mixnet.mix(&mut OsRng, input.clone()).unwrap();

        let mut truncated = result.stages.clone();
        truncated[2].output.pop();

        let err = verify_mix(&input, &truncated, &roster, &key).unwrap_err();
        assert!(matches!(
            err,
            Error::Crypto(CryptoError::BallotCountMismatch { stage: 2, .. })
        ));
    }

    #[test]
    fn test_duplicated_ballot_fails_verification() {
        let mut mixnet = cascade();
        let key = mixnet.encryption_key;
        let roster = mixnet.roster();

        let input: Vec<EncryptedBallot> =
            (0..3).map(|i| encrypt_codes(&key, &[i])).collect();
        let result = mixnet.mix(&mut OsRng, input.clone()).unwrap();

        // Overwrite one stage-output ballot with a copy of another. The
        // count is unchanged, so only the set hash can catch it.
        let mut forged = result.stages.clone();
        let duplicate = forged[1].output[1].clone();
        forged[1].output[0] = duplicate;

        let err = verify_mix(&input, &forged, &roster, &key).unwrap_err();
        assert!(matches!(
            err,
            Error::Crypto(CryptoError::ProofVerificationFailed("shuffle set hash"))
        ));
    }

    #[test]
    fn test_invalid_pok_ballot_rejects_batch() {
        let mut mixnet = cascade();
        let key = mixnet.encryption_key;

        let good = encrypt_codes(&key, &[5]);
        let mut bad = encrypt_codes(&key, &[6]);
        // Swap in a proof for a different ciphertext
        bad.pok = good.pok.clone();
        let (other, _) = encrypt(&mut OsRng, &key, 6).unwrap();
        bad.ciphertexts = vec![other];

        let err = mixnet.mix(&mut OsRng, vec![good, bad]).unwrap_err();
        assert!(matches!(
            err,
            Error::Crypto(CryptoError::InvalidEncryptionProof(1))
        ));
    }
}
