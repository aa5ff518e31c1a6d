//! Node addressing
//!
//! The protocol engines are generic over [`PeerIdentity`] so the same
//! discovery and payment logic runs against:
//!
//! - `SimulationIdentity`: single-letter addresses ('A'..'Z') for tests and scenarios
//! - `Ipv4Identity`: IPv4 addresses, as used by ad-hoc wireless deployments

use std::fmt;
use std::hash::Hash;
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::error::IdentityError;

/// Address of a node running the protocol
///
/// `Ord` is required so that neighbor sets iterate deterministically,
/// which keeps simulated runs reproducible.
pub trait PeerIdentity:
    Clone
    + Eq
    + Ord
    + Hash
    + Send
    + Sync
    + fmt::Debug
    + fmt::Display
    + Serialize
    + DeserializeOwned
    + 'static
{
    /// Canonical byte form, bound into balance-proof seals
    fn address_bytes(&self) -> Vec<u8>;

    fn from_address_bytes(bytes: &[u8]) -> Result<Self, IdentityError>;

    /// Label used in log fields
    fn log_label(&self) -> String {
        self.to_string()
    }
}

/// Simulated node named by a capital letter
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SimulationIdentity(pub char);

impl SimulationIdentity {
    /// Number of distinct simulated addresses
    pub const MAX_NODES: usize = 26;

    pub fn new(letter: char) -> Option<Self> {
        letter.is_ascii_uppercase().then_some(Self(letter))
    }

    /// The `index`th letter, `A` being 0
    pub fn nth(index: usize) -> Option<Self> {
        u8::try_from(index)
            .ok()
            .filter(|i| usize::from(*i) < Self::MAX_NODES)
            .map(|i| Self(char::from(b'A' + i)))
    }

    /// `A` through the `count`th letter; stops at `Z`
    pub fn first_n(count: usize) -> Vec<Self> {
        (0..count).map_while(Self::nth).collect()
    }

    pub fn as_char(&self) -> char {
        self.0
    }

    pub fn index(&self) -> usize {
        usize::from(self.0 as u8 - b'A')
    }
}

impl fmt::Display for SimulationIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl PeerIdentity for SimulationIdentity {
    fn address_bytes(&self) -> Vec<u8> {
        vec![self.0 as u8]
    }

    fn from_address_bytes(bytes: &[u8]) -> Result<Self, IdentityError> {
        match bytes {
            [byte] => Self::new(char::from(*byte)).ok_or_else(|| {
                IdentityError::InvalidFormat(format!("not a node letter: {:#04x}", byte))
            }),
            _ => Err(IdentityError::InvalidLength {
                expected: 1,
                actual: bytes.len(),
            }),
        }
    }
}

/// IPv4 node address
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Ipv4Identity(pub Ipv4Addr);

impl Ipv4Identity {
    /// Address of the `n`th host in 10.1.0.0/16, the addressing plan used by
    /// the ad-hoc testbeds
    pub fn testbed(n: u16) -> Self {
        let [hi, lo] = n.to_be_bytes();
        Self(Ipv4Addr::new(10, 1, hi, lo))
    }
}

impl fmt::Display for Ipv4Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl PeerIdentity for Ipv4Identity {
    fn address_bytes(&self) -> Vec<u8> {
        self.0.octets().to_vec()
    }

    fn from_address_bytes(bytes: &[u8]) -> Result<Self, IdentityError> {
        let octets: [u8; 4] = bytes.try_into().map_err(|_| IdentityError::InvalidLength {
            expected: 4,
            actual: bytes.len(),
        })?;
        Ok(Self(Ipv4Addr::from(octets)))
    }

    /// Host part only; every testbed node shares 10.1
    fn log_label(&self) -> String {
        let [_, _, c, d] = self.0.octets();
        format!("{c}.{d}")
    }
}
