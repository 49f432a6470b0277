//! Decoder for the unixfs `Data` protobuf message.
//!
//! ```text
//! message Data {
//!     required DataType Type = 1;
//!     optional bytes Data = 2;
//!     optional uint64 filesize = 3;
//!     repeated uint64 blocksizes = 4;
//!     optional uint64 hashType = 5;
//!     optional uint64 fanout = 6;
//!     optional uint32 mode = 7;
//!     optional UnixTime mtime = 8;
//! }
//! ```
//!
//! Only `Type` and `Data` are kept; prost skips the other fields.

use prost::Message;

use crate::error::{AppError, Result};

/// unixfs node type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum DataType {
    Raw = 0,
    Directory = 1,
    File = 2,
    Metadata = 3,
    Symlink = 4,
    HamtShard = 5,
}

impl DataType {
    /// Label stored as the node's semantic type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::Directory => "directory",
            Self::File => "file",
            Self::Metadata => "metadata",
            Self::Symlink => "symlink",
            Self::HamtShard => "hamt-shard",
        }
    }
}

/// Wire form of the message. `Type` is declared optional so a missing field
/// can be told apart from `Raw`.
#[derive(Clone, PartialEq, Message)]
struct Data {
    #[prost(enumeration = "DataType", optional, tag = "1")]
    r#type: Option<i32>,
    #[prost(bytes = "vec", optional, tag = "2")]
    data: Option<Vec<u8>>,
}

/// Decoded unixfs `Data` message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnixFsData {
    pub kind: DataType,
    pub data: Option<Vec<u8>>,
}

/// Decode a unixfs `Data` message.
pub fn decode(buf: &[u8]) -> Result<UnixFsData> {
    let message = Data::decode(buf).map_err(unixfs_error)?;

    let code = message
        .r#type
        .ok_or_else(|| unixfs_error("missing Type field"))?;
    let kind = DataType::try_from(code)
        .map_err(|_| unixfs_error(format!("unknown data type {code}")))?;

    Ok(UnixFsData {
        kind,
        data: message.data,
    })
}

fn unixfs_error(message: impl std::fmt::Display) -> AppError {
    AppError::Unixfs(message.to_string())
}
