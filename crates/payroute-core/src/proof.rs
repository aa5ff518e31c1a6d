//! Balance proofs
//!
//! One payload shape, optionally sealed. A sealed proof carries an opaque
//! authenticator and the claimed sender; no signature scheme is applied.

use serde::{Deserialize, Serialize};

use crate::htlc::SecretHash;
use crate::identity::PeerIdentity;

/// Digest binding a balance payload's amounts to its lock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BalanceHash([u8; 32]);

impl BalanceHash {
    fn compute(transferred_amount: u64, locked_amount: u64, secret_hash: &SecretHash) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&transferred_amount.to_le_bytes());
        hasher.update(&locked_amount.to_le_bytes());
        hasher.update(secret_hash.as_bytes());
        Self(*hasher.finalize().as_bytes())
    }
}

/// Opaque authenticity tag on a sealed proof
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Authenticator([u8; 32]);

/// Cumulative amount owed on a channel, plus what is currently locked
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalancePayload {
    /// Total settled transfer from sender to receiver, including this one
    /// once it is committed
    pub transferred_amount: u64,
    /// Amount still pending under a lock
    pub locked_amount: u64,
    pub balance_hash: BalanceHash,
}

impl BalancePayload {
    pub fn new(transferred_amount: u64, locked_amount: u64, secret_hash: &SecretHash) -> Self {
        Self {
            transferred_amount,
            locked_amount,
            balance_hash: BalanceHash::compute(transferred_amount, locked_amount, secret_hash),
        }
    }

    /// Check that the hash binds these amounts to `secret_hash`
    pub fn is_bound_to(&self, secret_hash: &SecretHash) -> bool {
        self.balance_hash
            == BalanceHash::compute(self.transferred_amount, self.locked_amount, secret_hash)
    }
}

/// Whether a proof has been sealed by its sender
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "I: PeerIdentity")]
pub enum ProofSeal<I: PeerIdentity> {
    Unsigned,
    Signed { authenticator: Authenticator, sender: I },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "I: PeerIdentity")]
pub struct BalanceProof<I: PeerIdentity> {
    pub payload: BalancePayload,
    pub seal: ProofSeal<I>,
}

impl<I: PeerIdentity> BalanceProof<I> {
    pub fn unsigned(payload: BalancePayload) -> Self {
        Self {
            payload,
            seal: ProofSeal::Unsigned,
        }
    }

    /// Seal this proof as sent by `sender`
    pub fn sign(self, sender: &I) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&sender.address_bytes());
        hasher.update(&self.payload.balance_hash.0);
        let authenticator = Authenticator(*hasher.finalize().as_bytes());
        Self {
            payload: self.payload,
            seal: ProofSeal::Signed {
                authenticator,
                sender: sender.clone(),
            },
        }
    }

    pub fn is_signed(&self) -> bool {
        matches!(self.seal, ProofSeal::Signed { .. })
    }

    /// Claimed sender of a sealed proof
    pub fn sender(&self) -> Option<&I> {
        match &self.seal {
            ProofSeal::Unsigned => None,
            ProofSeal::Signed { sender, .. } => Some(sender),
        }
    }
}
