//! Standard Monero addresses.
//!
//! Binary layout (69 bytes): network prefix, public spend key, public view key,
//! and the first four bytes of keccak256 over the preceding 65 bytes. The text
//! form is the block base58 of those bytes (95 characters).

pub mod base58;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha3::{Digest, Keccak256};

use crate::crypto::{PublicKey, PublicKeyPair};
use crate::types::{AddressError, CryptoError};

pub const ADDRESS_BYTES_LEN: usize = 1 + 32 + 32 + 4;
pub const ENCODED_ADDRESS_LEN: usize = 8 * 11 + 7;
const CHECKSUM_LEN: usize = 4;

const PREFIX_STD_MAINNET: u8 = 18;
const PREFIX_SUB_MAINNET: u8 = 42;
const PREFIX_STD_STAGENET: u8 = 24;
const PREFIX_SUB_STAGENET: u8 = 36;
const PREFIX_STD_TESTNET: u8 = 53;
const PREFIX_SUB_TESTNET: u8 = 63;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    Stagenet,
    Testnet,
    /// Local regtest-style network; addresses use the mainnet prefix.
    #[serde(alias = "development")]
    Dev,
}

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mainnet => "mainnet",
            Self::Stagenet => "stagenet",
            Self::Testnet => "testnet",
            Self::Dev => "dev",
        }
    }

    fn standard_prefix(&self) -> u8 {
        match self {
            Self::Mainnet | Self::Dev => PREFIX_STD_MAINNET,
            Self::Stagenet => PREFIX_STD_STAGENET,
            Self::Testnet => PREFIX_STD_TESTNET,
        }
    }

    /// Network type understood by `monero` / `monero-rpc`.
    pub fn to_monero(&self) -> monero::Network {
        match self {
            Self::Mainnet | Self::Dev => monero::Network::Mainnet,
            Self::Stagenet => monero::Network::Stagenet,
            Self::Testnet => monero::Network::Testnet,
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "mainnet" => Ok(Self::Mainnet),
            "stagenet" => Ok(Self::Stagenet),
            "testnet" => Ok(Self::Testnet),
            "dev" | "development" => Ok(Self::Dev),
            other => Err(format!(
                "invalid network {other:?} (expected mainnet/stagenet/testnet/dev)"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressType {
    Standard,
    Subaddress,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address([u8; ADDRESS_BYTES_LEN]);

impl Address {
    /// Standard address of a public key pair.
    pub fn standard(network: Network, keys: &PublicKeyPair) -> Self {
        let mut decoded = [0u8; ADDRESS_BYTES_LEN];
        decoded[0] = network.standard_prefix();
        decoded[1..33].copy_from_slice(&keys.spend_key().to_compressed());
        decoded[33..65].copy_from_slice(&keys.view_key().to_compressed());
        let checksum = checksum(&decoded[..65]);
        decoded[65..].copy_from_slice(&checksum);
        Self(decoded)
    }

    /// Validates length, checksum and network prefix, in that order.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, AddressError> {
        let decoded: [u8; ADDRESS_BYTES_LEN] =
            bytes.try_into().map_err(|_| AddressError::Length {
                expected: ADDRESS_BYTES_LEN,
                got: bytes.len(),
            })?;

        if checksum(&decoded[..65]) != decoded[65..] {
            return Err(AddressError::Checksum);
        }
        match decoded[0] {
            PREFIX_STD_MAINNET | PREFIX_SUB_MAINNET | PREFIX_STD_STAGENET | PREFIX_SUB_STAGENET
            | PREFIX_STD_TESTNET | PREFIX_SUB_TESTNET => Ok(Self(decoded)),
            prefix => Err(AddressError::UnknownPrefix(prefix)),
        }
    }

    pub fn to_bytes(&self) -> [u8; ADDRESS_BYTES_LEN] {
        self.0
    }

    /// Network of the prefix. `Dev` addresses report `Mainnet`.
    pub fn network(&self) -> Network {
        match self.0[0] {
            PREFIX_STD_STAGENET | PREFIX_SUB_STAGENET => Network::Stagenet,
            PREFIX_STD_TESTNET | PREFIX_SUB_TESTNET => Network::Testnet,
            _ => Network::Mainnet,
        }
    }

    pub fn address_type(&self) -> AddressType {
        match self.0[0] {
            PREFIX_SUB_MAINNET | PREFIX_SUB_STAGENET | PREFIX_SUB_TESTNET => AddressType::Subaddress,
            _ => AddressType::Standard,
        }
    }

    /// Checks the address may be used on `expected`. Testnet is decodable but
    /// never accepted.
    pub fn validate_network(&self, expected: Network) -> Result<(), AddressError> {
        let got = self.network();
        let accepted = match got {
            Network::Mainnet => matches!(expected, Network::Mainnet | Network::Dev),
            Network::Stagenet => expected == Network::Stagenet,
            Network::Testnet | Network::Dev => false,
        };
        if accepted {
            Ok(())
        } else {
            Err(AddressError::NetworkMismatch {
                expected: expected.as_str(),
                got: got.as_str(),
            })
        }
    }

    pub fn public_spend_key(&self) -> Result<PublicKey, CryptoError> {
        PublicKey::from_slice(&self.0[1..33])
    }

    pub fn public_view_key(&self) -> Result<PublicKey, CryptoError> {
        PublicKey::from_slice(&self.0[33..65])
    }

    pub fn public_key_pair(&self) -> Result<PublicKeyPair, CryptoError> {
        Ok(PublicKeyPair::new(
            self.public_spend_key()?,
            self.public_view_key()?,
        ))
    }
}

fn checksum(data: &[u8]) -> [u8; CHECKSUM_LEN] {
    let digest = Keccak256::digest(data);
    let mut out = [0u8; CHECKSUM_LEN];
    out.copy_from_slice(&digest[..CHECKSUM_LEN]);
    out
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&base58::encode(&self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value.len() != ENCODED_ADDRESS_LEN {
            return Err(AddressError::Length {
                expected: ENCODED_ADDRESS_LEN,
                got: value.len(),
            });
        }
        let decoded = base58::decode(value)?;
        Self::from_bytes(&decoded)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}
