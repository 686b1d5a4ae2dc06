//! Threshold decryption for the mix-net output.
//!
//! Key shares are dealt with Shamir secret sharing over the Ristretto scalar
//! field; the joint secret never exists after dealing. Each node produces a
//! partial decryption with a Chaum-Pedersen correctness proof, and any
//! `threshold` verified shares reconstruct the plaintext via Lagrange
//! interpolation in the exponent.

use crate::*;
use curve25519_dalek::constants::RISTRETTO_BASEPOINT_POINT;
use curve25519_dalek::constants::RISTRETTO_BASEPOINT_TABLE;
use curve25519_dalek::ristretto::RistrettoPoint;
use curve25519_dalek::scalar::Scalar;
use rand::{CryptoRng, RngCore};

/// One node's slice of the joint decryption key. Indexes start at 1;
/// index 0 would leak the joint secret itself.
#[derive(Debug, Clone)]
pub struct KeyShare {
    pub index: u32,
    pub secret: Scalar,
    pub public: RistrettoPoint,
}

/// A partial decryption of one ciphertext: `share = x_i * c1`, with a proof
/// that the same `x_i` underlies the node's dealt share commitment. The
/// carried `public` is convenience only; verification always pins it to the
/// commitment the dealer published for that node.
#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
pub struct DecryptionShare {
    pub node_index: u32,
    pub share: RistrettoPoint,
    pub public: RistrettoPoint,
    pub proof: ChaumPedersenProof,
}

/// Deal a fresh joint keypair as `n` shares with reconstruction
/// threshold `threshold`.
pub fn generate_key_shares<R: RngCore + CryptoRng>(
    rng: &mut R,
    threshold: usize,
    n: usize,
) -> Result<(EncryptionKey, Vec<KeyShare>), Error> {
    if threshold == 0 || threshold > n {
        return Err(ValidationError::InvalidThreshold(threshold, n).into());
    }

    // f(0) is the joint secret, f(i) is node i's share
    let coefficients: Vec<Scalar> = (0..threshold).map(|_| Scalar::random(rng)).collect();

    let shares = (1..=n as u32)
        .map(|index| {
            let x = Scalar::from(index as u64);
            let mut secret = Scalar::zero();
            for coefficient in coefficients.iter().rev() {
                secret = secret * x + coefficient;
            }
            KeyShare {
                index,
                secret,
                public: &secret * &RISTRETTO_BASEPOINT_TABLE,
            }
        })
        .collect();

    let key = EncryptionKey(&coefficients[0] * &RISTRETTO_BASEPOINT_TABLE);
    Ok((key, shares))
}

impl KeyShare {
    /// Partially decrypt one ciphertext and prove the share is well-formed.
    pub fn decrypt_share<R: RngCore + CryptoRng>(
        &self,
        rng: &mut R,
        ciphertext: &Ciphertext,
    ) -> DecryptionShare {
        let share = self.secret * ciphertext.c1;
        let proof = ChaumPedersenProof::prove(
            rng,
            &RISTRETTO_BASEPOINT_POINT,
            &ciphertext.c1,
            &self.public,
            &share,
            &self.secret,
        );

        DecryptionShare {
            node_index: self.index,
            share,
            public: self.public,
            proof,
        }
    }
}

impl DecryptionShare {
    /// Check the share against the dealt commitment `expected_public`.
    /// A node that runs the protocol honestly with a key of its own
    /// choosing produces a self-consistent proof; only the comparison
    /// against the dealer's commitment catches it.
    pub fn verify(&self, ciphertext: &Ciphertext, expected_public: &RistrettoPoint) -> bool {
        self.public == *expected_public
            && self.proof.verify(
                &RISTRETTO_BASEPOINT_POINT,
                &ciphertext.c1,
                &self.public,
                &self.share,
            )
    }
}

/// Lagrange coefficient for `index` evaluated at zero over `indexes`.
fn lagrange_at_zero(index: u32, indexes: &[u32]) -> Scalar {
    let x_i = Scalar::from(index as u64);
    let mut coefficient = Scalar::one();
    for &other in indexes {
        if other == index {
            continue;
        }
        let x_j = Scalar::from(other as u64);
        coefficient *= x_j * (x_j - x_i).invert();
    }
    coefficient
}

/// Combine verified decryption shares and recover the selection code.
///
/// `share_publics` holds the dealt commitments in node order, `x_i * G` at
/// position `i - 1`. Every presented share is checked against its
/// commitment first; a single bad share aborts the whole combination,
/// naming the offending node, rather than producing an unattributable
/// garbage plaintext. Duplicate node indexes are collapsed before counting.
pub fn combine_shares(
    ciphertext: &Ciphertext,
    shares: &[DecryptionShare],
    threshold: usize,
    share_publics: &[RistrettoPoint],
) -> Result<u32, Error> {
    for share in shares {
        // Indexes are dealt from 1; 0 or out-of-roster means a forged share
        let expected = (share.node_index as usize)
            .checked_sub(1)
            .and_then(|i| share_publics.get(i))
            .ok_or(CryptoError::InvalidDecryptionShare(share.node_index))?;
        if !share.verify(ciphertext, expected) {
            return Err(CryptoError::InvalidDecryptionShare(share.node_index).into());
        }
    }

    let mut unique: Vec<&DecryptionShare> = Vec::with_capacity(shares.len());
    for share in shares {
        if !unique.iter().any(|s| s.node_index == share.node_index) {
            unique.push(share);
        }
    }
    if unique.len() < threshold {
        return Err(CryptoError::NotEnoughShares(threshold, unique.len()).into());
    }

    // Deterministic: lowest indexes win when more than threshold arrive
    unique.sort_by_key(|s| s.node_index);
    let selected = &unique[..threshold];
    let indexes: Vec<u32> = selected.iter().map(|s| s.node_index).collect();

    let mut combined = ciphertext.c2;
    for share in selected {
        combined -= lagrange_at_zero(share.node_index, &indexes) * share.share;
    }

    recover_code(&combined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    fn publics(shares: &[KeyShare]) -> Vec<RistrettoPoint> {
        shares.iter().map(|s| s.public).collect()
    }

    #[test]
    fn test_threshold_decryption() {
        let (key, shares) = generate_key_shares(&mut OsRng, 2, 3).unwrap();
        let (ciphertext, _) = encrypt(&mut OsRng, &key, 514).unwrap();
        let publics = publics(&shares);

        // Any 2 of 3 shares recover the code
        let partials: Vec<DecryptionShare> = shares
            .iter()
            .map(|s| s.decrypt_share(&mut OsRng, &ciphertext))
            .collect();

        let code = combine_shares(&ciphertext, &partials[..2], 2, &publics).unwrap();
        assert_eq!(code, 514);
        let code = combine_shares(&ciphertext, &partials[1..], 2, &publics).unwrap();
        assert_eq!(code, 514);
        let code = combine_shares(&ciphertext, &partials, 2, &publics).unwrap();
        assert_eq!(code, 514);
    }

    #[test]
    fn test_too_few_shares() {
        let (key, shares) = generate_key_shares(&mut OsRng, 2, 3).unwrap();
        let (ciphertext, _) = encrypt(&mut OsRng, &key, 1).unwrap();
        let publics = publics(&shares);

        let partial = shares[0].decrypt_share(&mut OsRng, &ciphertext);
        let err = combine_shares(&ciphertext, &[partial], 2, &publics).unwrap_err();
        assert!(matches!(
            err,
            Error::Crypto(CryptoError::NotEnoughShares(2, 1))
        ));

        // A duplicated share does not count twice
        let err = combine_shares(&ciphertext, &[partial, partial], 2, &publics).unwrap_err();
        assert!(matches!(
            err,
            Error::Crypto(CryptoError::NotEnoughShares(2, 1))
        ));
    }

    #[test]
    fn test_forged_share_is_rejected() {
        let (key, shares) = generate_key_shares(&mut OsRng, 2, 3).unwrap();
        let (ciphertext, _) = encrypt(&mut OsRng, &key, 9).unwrap();
        let publics = publics(&shares);

        let good = shares[0].decrypt_share(&mut OsRng, &ciphertext);
        let mut forged = shares[1].decrypt_share(&mut OsRng, &ciphertext);
        forged.share = Scalar::random(&mut OsRng) * RISTRETTO_BASEPOINT_POINT;

        let err = combine_shares(&ciphertext, &[good, forged], 2, &publics).unwrap_err();
        assert!(matches!(
            err,
            Error::Crypto(CryptoError::InvalidDecryptionShare(2))
        ));
    }

    #[test]
    fn test_rogue_key_share_is_rejected() {
        let (key, shares) = generate_key_shares(&mut OsRng, 2, 3).unwrap();
        let (ciphertext, _) = encrypt(&mut OsRng, &key, 9).unwrap();
        let publics = publics(&shares);

        // Node 2 discards its dealt share and runs the protocol honestly
        // with a key it invented, producing a self-consistent proof
        let rogue_secret = Scalar::random(&mut OsRng);
        let rogue = KeyShare {
            index: 2,
            secret: rogue_secret,
            public: &rogue_secret * &RISTRETTO_BASEPOINT_TABLE,
        };
        let forged = rogue.decrypt_share(&mut OsRng, &ciphertext);
        assert!(!forged.verify(&ciphertext, &publics[1]));

        let good = shares[0].decrypt_share(&mut OsRng, &ciphertext);
        let err = combine_shares(&ciphertext, &[good, forged], 2, &publics).unwrap_err();
        assert!(matches!(
            err,
            Error::Crypto(CryptoError::InvalidDecryptionShare(2))
        ));

        // An index outside the roster is equally attributable
        let mut out_of_roster = forged;
        out_of_roster.node_index = 9;
        let err = combine_shares(&ciphertext, &[good, out_of_roster], 2, &publics).unwrap_err();
        assert!(matches!(
            err,
            Error::Crypto(CryptoError::InvalidDecryptionShare(9))
        ));
    }

    #[test]
    fn test_invalid_threshold() {
        assert!(generate_key_shares(&mut OsRng, 0, 3).is_err());
        assert!(generate_key_shares(&mut OsRng, 4, 3).is_err());
    }
}
