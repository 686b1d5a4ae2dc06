//! Exponential ElGamal over Ristretto, used by the mix-net cascade.
//!
//! Selection codes are encrypted in the exponent so ciphertexts can be
//! re-randomized by mix nodes without the decryption key. The plaintext
//! space is bounded by the selection-code encoding, so decryption recovers
//! the exponent by bounded scan.

use crate::*;
use curve25519_dalek::constants::RISTRETTO_BASEPOINT_POINT;
use curve25519_dalek::constants::RISTRETTO_BASEPOINT_TABLE;
use curve25519_dalek::ristretto::RistrettoPoint;
use curve25519_dalek::scalar::Scalar;
use curve25519_dalek::traits::Identity;
use rand::{CryptoRng, RngCore};
use sha2::{Digest, Sha512};

/// Largest encodable selection code:
/// `MAX_CONTESTS * MAX_OPTIONS_PER_CONTEST - 1`.
pub const MAX_PLAINTEXT: u32 = 65_535;

/// The mix-net election public key. The matching secret exists only as
/// distributed key shares.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncryptionKey(pub RistrettoPoint);

/// `(c1, c2) = (r*G, m*G + r*pk)`
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ciphertext {
    pub c1: RistrettoPoint,
    pub c2: RistrettoPoint,
}

/// Fiat-Shamir challenge over a transcript of points.
fn challenge_scalar(points: &[&RistrettoPoint]) -> Scalar {
    let mut hasher = Sha512::new();
    hasher.update(b"anonballot-v1");
    for point in points {
        hasher.update(point.compress().as_bytes());
    }
    Scalar::from_hash(hasher)
}

/// Encrypt a selection code. Returns the randomness so the caller can prove
/// knowledge of it; the randomness must be discarded after proving.
pub fn encrypt<R: RngCore + CryptoRng>(
    rng: &mut R,
    key: &EncryptionKey,
    code: u32,
) -> Result<(Ciphertext, Scalar), Error> {
    if code > MAX_PLAINTEXT {
        return Err(CryptoError::PlaintextOutOfRange.into());
    }

    let r = Scalar::random(rng);
    let m = Scalar::from(code as u64);

    Ok((
        Ciphertext {
            c1: &r * &RISTRETTO_BASEPOINT_TABLE,
            c2: &m * &RISTRETTO_BASEPOINT_TABLE + r * key.0,
        },
        r,
    ))
}

/// Re-randomize a ciphertext without changing the plaintext. Returns the
/// added randomness for the node's shuffle proof.
pub fn reencrypt<R: RngCore + CryptoRng>(
    rng: &mut R,
    key: &EncryptionKey,
    ciphertext: &Ciphertext,
) -> (Ciphertext, Scalar) {
    let r = Scalar::random(rng);

    (
        Ciphertext {
            c1: ciphertext.c1 + &r * &RISTRETTO_BASEPOINT_TABLE,
            c2: ciphertext.c2 + r * key.0,
        },
        r,
    )
}

/// Recover a selection code from a decrypted group element `m*G` by bounded
/// scan over the plaintext space.
pub fn recover_code(decrypted: &RistrettoPoint) -> Result<u32, Error> {
    let mut accumulator = RistrettoPoint::identity();
    for code in 0..=MAX_PLAINTEXT {
        if &accumulator == decrypted {
            return Ok(code);
        }
        accumulator += RISTRETTO_BASEPOINT_POINT;
    }
    Err(CryptoError::PlaintextOutOfRange.into())
}

/// Schnorr proof of knowledge of the encryption randomness `r` in
/// `c1 = r*G`, bound to the full ciphertext.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchnorrProof {
    pub commit: RistrettoPoint,
    pub response: Scalar,
}

impl SchnorrProof {
    pub fn prove<R: RngCore + CryptoRng>(
        rng: &mut R,
        ciphertext: &Ciphertext,
        randomness: &Scalar,
    ) -> Self {
        let w = Scalar::random(rng);
        let commit = &w * &RISTRETTO_BASEPOINT_TABLE;
        let e = challenge_scalar(&[&ciphertext.c1, &ciphertext.c2, &commit]);

        SchnorrProof {
            commit,
            response: w + e * randomness,
        }
    }

    pub fn verify(&self, ciphertext: &Ciphertext) -> bool {
        let e = challenge_scalar(&[&ciphertext.c1, &ciphertext.c2, &self.commit]);
        &self.response * &RISTRETTO_BASEPOINT_TABLE == self.commit + e * ciphertext.c1
    }
}

/// Chaum-Pedersen proof that `y1 = x*g1` and `y2 = x*g2` share the same
/// discrete log `x`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChaumPedersenProof {
    pub commit_g: RistrettoPoint,
    pub commit_h: RistrettoPoint,
    pub response: Scalar,
}

impl ChaumPedersenProof {
    pub fn prove<R: RngCore + CryptoRng>(
        rng: &mut R,
        g1: &RistrettoPoint,
        g2: &RistrettoPoint,
        y1: &RistrettoPoint,
        y2: &RistrettoPoint,
        x: &Scalar,
    ) -> Self {
        let w = Scalar::random(rng);
        let commit_g = w * g1;
        let commit_h = w * g2;
        let e = challenge_scalar(&[g1, y1, g2, y2, &commit_g, &commit_h]);

        ChaumPedersenProof {
            commit_g,
            commit_h,
            response: w + e * x,
        }
    }

    pub fn verify(
        &self,
        g1: &RistrettoPoint,
        g2: &RistrettoPoint,
        y1: &RistrettoPoint,
        y2: &RistrettoPoint,
    ) -> bool {
        let e = challenge_scalar(&[g1, y1, g2, y2, &self.commit_g, &self.commit_h]);
        self.response * g1 == self.commit_g + e * y1
            && self.response * g2 == self.commit_h + e * y2
    }
}

/// Derive `n` independent Pedersen generators from a domain-separated seed.
/// Nothing knows the discrete logs between them.
pub fn pedersen_generators(n: usize, seed: &[u8]) -> Vec<RistrettoPoint> {
    (0..n)
        .map(|i| {
            let mut input = Vec::with_capacity(seed.len() + 8);
            input.extend_from_slice(seed);
            input.extend_from_slice(&(i as u64).to_le_bytes());
            RistrettoPoint::hash_from_bytes::<Sha512>(&input)
        })
        .collect()
}
