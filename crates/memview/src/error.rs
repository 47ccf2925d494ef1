use thiserror::Error;

use crate::remote::MemOp;

#[derive(Debug, Error)]
pub enum Error {
    #[error("field '{field}' declared at offset {offset} behind layout cursor {cursor}")]
    LayoutConflict {
        field: String,
        offset: usize,
        cursor: usize,
    },

    #[error("deferred type '{0}' was never linked")]
    UnlinkedType(String),

    #[error("no field named '{0}'")]
    UnknownField(String),

    #[error("invalid value: {0}")]
    InvalidValue(String),

    #[error("index {index} out of bounds for length {len}")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error("remote {op} of {len} bytes at {address:#x} failed: {source}")]
    RemoteIo {
        op: MemOp,
        address: u64,
        len: usize,
        source: std::io::Error,
    },

    #[error("bad signature token [{index}]: {message}")]
    SignatureFormat { index: usize, message: String },

    #[error("attempted to index a null pointer view")]
    NullPointerDeref,

    #[error("read-only violation: {0}")]
    ReadOnlyViolation(String),

    #[error("hook install at {address:#x} failed: {source}")]
    HookInstall {
        address: u64,
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
