//! Log record and its serialized form
//!
//! A record is an opaque byte payload plus the offset the log assigned to
//! it. Records are serialized as MessagePack maps with named fields, which
//! keeps the encoding self-describing and deterministic. The store wraps
//! the encoded bytes in its own length-prefixed frame.

use crate::error::Result;
use serde::{Deserialize, Serialize};

/// A single entry in the commit log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Opaque payload
    #[serde(with = "serde_bytes")]
    pub value: Vec<u8>,

    /// Offset assigned by the log on append.
    ///
    /// Any value set by the caller is overwritten.
    pub offset: u64,
}

impl Record {
    /// Create a record with the given payload and offset 0.
    pub fn new(value: impl Into<Vec<u8>>) -> Self {
        Record {
            value: value.into(),
            offset: 0,
        }
    }

    /// Serialize the record to bytes.
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(self)?)
    }

    /// Deserialize a record from bytes produced by [`Record::encode`].
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}

impl From<Vec<u8>> for Record {
    fn from(value: Vec<u8>) -> Self {
        Record::new(value)
    }
}

impl From<&[u8]> for Record {
    fn from(value: &[u8]) -> Self {
        Record::new(value)
    }
}
