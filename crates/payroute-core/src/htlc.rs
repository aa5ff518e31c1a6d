//! Hash-time locks
//!
//! A [`HashTimeLock`] commits to the hash of a secret held by the payment
//! initiator. Funds locked under it move only once a hop has verified the
//! revealed [`Secret`] against the stored [`SecretHash`].

use std::time::Duration;

use derive_more::Display;
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::time::SimTime;

/// Identifier of one end-to-end payment, chosen by the initiator
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PaymentId(Uuid);

impl PaymentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// First eight hex digits, for log lines
    pub fn short(&self) -> String {
        self.0.as_simple().to_string()[..8].to_string()
    }
}

impl Default for PaymentId {
    fn default() -> Self {
        Self::new()
    }
}

/// Preimage of a lock
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Secret([u8; 32]);

impl Secret {
    /// Draw a fresh secret from the thread RNG
    pub fn random() -> Self {
        let mut bytes = [0u8; 32];
        rand::rng().fill(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn hash(&self) -> SecretHash {
        SecretHash(*blake3::hash(&self.0).as_bytes())
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // never log the preimage
        write!(f, "Secret(..)")
    }
}

/// BLAKE3 digest of a [`Secret`]
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SecretHash([u8; 32]);

impl SecretHash {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Debug for SecretHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecretHash({})", self)
    }
}

impl std::fmt::Display for SecretHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(&self.0[..6]))
    }
}

/// A conditional transfer of `amount`, claimable with the preimage of
/// `secret_hash` until `expires_at`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashTimeLock {
    pub amount: u64,
    pub secret_hash: SecretHash,
    pub expires_at: SimTime,
}

impl HashTimeLock {
    pub fn new(amount: u64, secret_hash: SecretHash, expires_at: SimTime) -> Self {
        Self {
            amount,
            secret_hash,
            expires_at,
        }
    }

    /// Check whether `secret` opens this lock
    pub fn verify(&self, secret: &Secret) -> bool {
        secret.hash() == self.secret_hash
    }

    pub fn is_expired(&self, now: SimTime) -> bool {
        now >= self.expires_at
    }

    /// Lock for the next channel along the path
    ///
    /// Same amount and hash, expiring `delta` earlier so each hop has time to
    /// claim upstream after paying downstream. Returns `None` if the derived
    /// lock would already be expired.
    pub fn derive_next(&self, delta: Duration, now: SimTime) -> Option<HashTimeLock> {
        let remaining = now.until(self.expires_at);
        if remaining <= delta {
            return None;
        }
        Some(HashTimeLock {
            amount: self.amount,
            secret_hash: self.secret_hash,
            expires_at: now + (remaining - delta),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_verifies_only_its_secret() {
        let secret = Secret::random();
        let lock = HashTimeLock::new(10, secret.hash(), SimTime::from_secs(10));
        assert!(lock.verify(&secret));
        assert!(!lock.verify(&Secret::from_bytes([7u8; 32])));
    }

    #[test]
    fn test_derive_next_shortens_expiry() {
        let lock = HashTimeLock::new(10, Secret::random().hash(), SimTime::from_secs(10));
        let now = SimTime::from_secs(2);

        let next = lock.derive_next(Duration::from_secs(1), now).unwrap();
        assert_eq!(next.expires_at, SimTime::from_secs(9));
        assert_eq!(next.amount, 10);
        assert_eq!(next.secret_hash, lock.secret_hash);

        assert!(lock.derive_next(Duration::from_secs(8), now).is_none());
    }

    #[test]
    fn test_secret_debug_is_redacted() {
        let secret = Secret::from_bytes([0xAB; 32]);
        assert!(!format!("{:?}", secret).contains("ab"));
    }

    #[test]
    fn test_payment_id_short() {
        let id = PaymentId::new();
        assert_eq!(id.short().len(), 8);
        assert_ne!(id, PaymentId::new());
    }
}
