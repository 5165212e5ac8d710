// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Error types for memfs core

use std::io;

/// Core filesystem error type
#[derive(thiserror::Error, Debug)]
pub enum FsError {
    #[error("node capacity exceeded")]
    CapacityExceeded,
    #[error("name too long")]
    NameTooLong,
    #[error("path too long")]
    PathTooLong,
    #[error("name not allowed")]
    InvalidName,
    #[error("not found")]
    NotFound,
    #[error("not a directory")]
    NotADirectory,
    #[error("is a directory")]
    IsADirectory,
    #[error("already exists")]
    AlreadyExists,
    #[error("directory not empty")]
    NotEmpty,
    #[error("busy")]
    Busy,
    #[error("cyclic link")]
    CyclicLink,
    #[error("permission denied")]
    PermissionDenied,
    #[error("invalid handle")]
    InvalidHandle,
    #[error("too many open files")]
    TooManyOpenFiles,
    #[error("invalid argument")]
    InvalidArgument,
    #[error("corrupt store: {0}")]
    CorruptStore(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Payload-free discriminant of [`FsError`], for callers that only care which
/// failure happened.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    CapacityExceeded,
    NameTooLong,
    PathTooLong,
    InvalidName,
    NotFound,
    NotADirectory,
    IsADirectory,
    AlreadyExists,
    NotEmpty,
    Busy,
    CyclicLink,
    PermissionDenied,
    InvalidHandle,
    TooManyOpenFiles,
    InvalidArgument,
    CorruptStore,
    Io,
}

impl FsError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FsError::CapacityExceeded => ErrorKind::CapacityExceeded,
            FsError::NameTooLong => ErrorKind::NameTooLong,
            FsError::PathTooLong => ErrorKind::PathTooLong,
            FsError::InvalidName => ErrorKind::InvalidName,
            FsError::NotFound => ErrorKind::NotFound,
            FsError::NotADirectory => ErrorKind::NotADirectory,
            FsError::IsADirectory => ErrorKind::IsADirectory,
            FsError::AlreadyExists => ErrorKind::AlreadyExists,
            FsError::NotEmpty => ErrorKind::NotEmpty,
            FsError::Busy => ErrorKind::Busy,
            FsError::CyclicLink => ErrorKind::CyclicLink,
            FsError::PermissionDenied => ErrorKind::PermissionDenied,
            FsError::InvalidHandle => ErrorKind::InvalidHandle,
            FsError::TooManyOpenFiles => ErrorKind::TooManyOpenFiles,
            FsError::InvalidArgument => ErrorKind::InvalidArgument,
            FsError::CorruptStore(_) => ErrorKind::CorruptStore,
            FsError::Io(_) => ErrorKind::Io,
        }
    }

    pub(crate) fn corrupt(msg: impl Into<String>) -> Self {
        FsError::CorruptStore(msg.into())
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::CapacityExceeded => "CapacityExceeded",
            ErrorKind::NameTooLong => "NameTooLong",
            ErrorKind::PathTooLong => "PathTooLong",
            ErrorKind::InvalidName => "InvalidName",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::NotADirectory => "NotADirectory",
            ErrorKind::IsADirectory => "IsADirectory",
            ErrorKind::AlreadyExists => "AlreadyExists",
            ErrorKind::NotEmpty => "NotEmpty",
            ErrorKind::Busy => "Busy",
            ErrorKind::CyclicLink => "CyclicLink",
            ErrorKind::PermissionDenied => "PermissionDenied",
            ErrorKind::InvalidHandle => "InvalidHandle",
            ErrorKind::TooManyOpenFiles => "TooManyOpenFiles",
            ErrorKind::InvalidArgument => "InvalidArgument",
            ErrorKind::CorruptStore => "CorruptStore",
            ErrorKind::Io => "IOError",
        };
        f.write_str(s)
    }
}

pub type FsResult<T> = Result<T, FsError>;
