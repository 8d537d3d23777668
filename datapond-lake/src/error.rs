// CLASSIFICATION: COMMUNITY
// Filename: error.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-17

//! Error taxonomy for the lake engine.
//!
//! Every operation either applies fully or returns one of these variants
//! with no state changed. [`LakeError::code`] yields the service error code
//! the HTTP layer puts in `x-ms-error-code`.

use std::fmt;

use thiserror::Error;

use crate::path::NodeKind;

/// Which half of the write protocol rejected an offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOp {
    /// `append` at a position.
    Append,
    /// `flush` up to a position.
    Flush,
}

impl fmt::Display for WriteOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteOp::Append => write!(f, "append"),
            WriteOp::Flush => write!(f, "flush"),
        }
    }
}

/// Errors returned by lake operations.
#[derive(Debug, Error)]
pub enum LakeError {
    /// No node exists at the path, or an intermediate segment is missing.
    #[error("the specified path does not exist: {path}")]
    PathNotFound { path: String },

    /// The terminal segment already exists (with another kind, or the
    /// caller asked to fail if it exists), or an intermediate segment is a file.
    #[error("the specified path already exists as a {existing}: {path}")]
    PathConflict { path: String, existing: NodeKind },

    /// Non-recursive delete of a directory with children.
    #[error("the directory is not empty: {path}")]
    DirectoryNotEmpty { path: String },

    /// The filesystem root cannot be removed through a path delete.
    #[error("the root of filesystem {filesystem} cannot be deleted")]
    RootNotDeletable { filesystem: String },

    /// A directory operation targeted a file.
    #[error("the specified path is not a directory: {path}")]
    NotADirectory { path: String },

    /// Append or flush position does not line up with the buffered stream.
    #[error("invalid {op} position {offset} (committed {committed}, appended through {end})")]
    InvalidOffset {
        op: WriteOp,
        offset: u64,
        committed: u64,
        end: u64,
    },

    /// Requested range reaches past the committed length.
    #[error("range {start}+{len} is not satisfiable (committed length {committed})")]
    RangeNotSatisfiable { start: u64, len: u64, committed: u64 },

    /// A filesystem with this name is already registered.
    #[error("filesystem with name {name} already exists")]
    AlreadyExists { name: String },

    /// No filesystem with this name is registered.
    #[error("filesystem with name {name} does not exist")]
    NotFound { name: String },

    /// Filesystem name or path segment uses characters outside the allowed set.
    #[error("the specified resource name contains invalid characters: {name}")]
    InvalidName { name: String },

    /// Engine configuration rejected at startup.
    #[error("invalid lake configuration: {0}")]
    InvalidConfig(String),

    /// The backing disk failed.
    #[error("storage I/O error: {0}")]
    StorageIo(#[from] std::io::Error),

    /// Injected by the failure gate; shaped like a genuine busy response.
    #[error("The server is currently unable to receive requests. Please retry your request.")]
    SimulatedServiceFailure,
}

/// Convenience alias used across the engine.
pub type LakeResult<T> = Result<T, LakeError>;

impl LakeError {
    /// Service error code for this failure.
    pub fn code(&self) -> &'static str {
        match self {
            LakeError::PathNotFound { .. } => "PathNotFound",
            LakeError::PathConflict { .. } => "PathAlreadyExists",
            LakeError::DirectoryNotEmpty { .. } => "DirectoryNotEmpty",
            LakeError::RootNotDeletable { .. } => "OperationNotPermittedOnRoot",
            LakeError::NotADirectory { .. } => "PathIsNotDirectory",
            LakeError::InvalidOffset {
                op: WriteOp::Append,
                ..
            } => "InvalidAppendPosition",
            LakeError::InvalidOffset {
                op: WriteOp::Flush,
                ..
            } => "InvalidFlushPosition",
            LakeError::RangeNotSatisfiable { .. } => "InvalidRange",
            LakeError::AlreadyExists { .. } => "FilesystemAlreadyExists",
            LakeError::NotFound { .. } => "FilesystemNotFound",
            LakeError::InvalidName { .. } => "InvalidResourceName",
            LakeError::InvalidConfig(_) => "InvalidConfiguration",
            LakeError::StorageIo(_) => "InternalError",
            LakeError::SimulatedServiceFailure => "ServerBusy",
        }
    }

    pub(crate) fn not_found(path: impl Into<String>) -> Self {
        LakeError::PathNotFound { path: path.into() }
    }
}
