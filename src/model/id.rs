use std::{
    fmt::{Debug, Display, Formatter},
    str::FromStr,
};

use data_encoding::HEXLOWER;
use rocket::{
    http::{
        impl_from_uri_param_identity,
        uri::fmt::{Path, UriDisplay},
    },
    request::FromParam,
};
use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Number of bytes kept by [`LedgerId::short`].
const SHORT_LEN: usize = 8;

/// Identifier of a ledger: the SHA-256 digest of its genesis record.
#[derive(Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct LedgerId([u8; 32]);

impl LedgerId {
    /// Derive the identifier of a ledger from the bytes of its genesis record.
    pub fn digest(genesis: &[u8]) -> Self {
        Self(Sha256::digest(genesis).into())
    }

    /// Short fingerprint, used to key per-election state held in memory.
    pub fn short(&self) -> String {
        HEXLOWER.encode(&self.0[..SHORT_LEN])
    }
}

impl From<[u8; 32]> for LedgerId {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl Display for LedgerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&HEXLOWER.encode(&self.0))
    }
}

impl Debug for LedgerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "LedgerId({})", self.short())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseIdError {
    #[error("Ledger ID is not lowercase hex: {0}")]
    Encoding(#[from] data_encoding::DecodeError),
    #[error("Ledger ID must be 32 bytes, got {0}")]
    Length(usize),
}

impl FromStr for LedgerId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = HEXLOWER.decode(s.as_bytes())?;
        let len = bytes.len();
        bytes
            .try_into()
            .map(Self)
            .map_err(|_| ParseIdError::Length(len))
    }
}

impl Serialize for LedgerId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for LedgerId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(D::Error::custom)
    }
}

impl<'a> FromParam<'a> for LedgerId {
    type Error = ParseIdError;

    fn from_param(param: &'a str) -> Result<Self, Self::Error> {
        param.parse()
    }
}

impl UriDisplay<Path> for LedgerId {
    fn fmt(&self, formatter: &mut rocket::http::uri::fmt::Formatter<'_, Path>) -> std::fmt::Result {
        formatter.write_value(self.to_string())
    }
}

impl_from_uri_param_identity!([Path] LedgerId);
