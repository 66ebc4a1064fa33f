//! ElGamal over Ristretto255.
//!
//! A ballot choice `m` is embedded as the point `m·G`, so plaintexts are
//! recovered by a bounded search rather than a general decoding step.

use curve25519_dalek::{
    constants::RISTRETTO_BASEPOINT_POINT as G, ristretto::RistrettoPoint, scalar::Scalar,
    traits::Identity,
};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

pub type Point = RistrettoPoint;

/// Largest choice that [`recover_choice`] will search for.
pub const MAX_CHOICE: u32 = 1024;

/// Draw a fresh secret scalar.
pub fn random_scalar() -> Scalar {
    Scalar::random(&mut OsRng)
}

/// The public point of a secret scalar.
pub fn public(secret: &Scalar) -> Point {
    secret * G
}

/// An ElGamal ciphertext `(K, C) = (k·G, k·X + M)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ciphertext {
    pub alpha: Point,
    pub beta: Point,
}

impl Ciphertext {
    /// Encrypt `choice` under the election key.
    pub fn encrypt(key: &Point, choice: u32) -> Self {
        let k = random_scalar();
        Self {
            alpha: k * G,
            beta: k * key + Scalar::from(choice) * G,
        }
    }

    /// Re-randomise the ciphertext without changing its plaintext.
    pub fn reencrypt(&self, key: &Point) -> Self {
        let r = random_scalar();
        Self {
            alpha: self.alpha + r * G,
            beta: self.beta + r * key,
        }
    }

    /// One node's contribution to decrypting this ciphertext.
    pub fn partial(&self, share: &Scalar) -> Point {
        share * self.alpha
    }

    /// Strip every partial decryption off the ciphertext, leaving `M`.
    pub fn combine<'a, I>(&self, partials: I) -> Point
    where
        I: IntoIterator<Item = &'a Point>,
    {
        self.beta - partials.into_iter().sum::<Point>()
    }
}

/// Recover `m` from `m·G`, for `m` up to [`MAX_CHOICE`].
pub fn recover_choice(message: &Point) -> Option<u32> {
    let mut candidate = Point::identity();
    for choice in 0..=MAX_CHOICE {
        if candidate == *message {
            return Some(choice);
        }
        candidate += G;
    }
    None
}
