//! Error kinds for the recoverable failures of each engine.
//!
//! Kernel-invariant violations (unknown PID in the memory manager, a block
//! index past the end of the image, the clock hand landing on a free frame)
//! are not represented here; they abort the simulation with a panic.

use core::fmt;

/// Recoverable block-device failure (host I/O trouble on a valid index).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiskError {
    Io,
}

impl fmt::Display for DiskError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DiskError::Io => write!(f, "disk I/O error"),
        }
    }
}

/// Recoverable memory-manager failure: the access is refused but the
/// simulation carries on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemError {
    InvalidAddress,
    OutOfSwap,
    Disk(DiskError),
}

impl fmt::Display for MemError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MemError::InvalidAddress => write!(f, "virtual address out of range"),
            MemError::OutOfSwap => write!(f, "out of swap blocks"),
            MemError::Disk(e) => write!(f, "{}", e),
        }
    }
}

impl From<DiskError> for MemError {
    fn from(e: DiskError) -> Self {
        MemError::Disk(e)
    }
}

/// Recoverable file-system failure. The file system never panics for a bad
/// path, a full allocator, or a stale descriptor; the caller logs the kind
/// and the operation reports failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    NotMounted,
    BadMagic,
    LayoutMismatch,
    NoSpace,
    NotFound,
    AlreadyExists,
    NotADirectory,
    NotAFile,
    DirectoryFull,
    BadDescriptor,
    Disk(DiskError),
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FsError::NotMounted => write!(f, "file system not mounted"),
            FsError::BadMagic => write!(f, "magic number mismatch"),
            FsError::LayoutMismatch => write!(f, "on-disk layout mismatch"),
            FsError::NoSpace => write!(f, "no free inodes or blocks"),
            FsError::NotFound => write!(f, "no such file or directory"),
            FsError::AlreadyExists => write!(f, "already exists"),
            FsError::NotADirectory => write!(f, "not a directory"),
            FsError::NotAFile => write!(f, "not a regular file"),
            FsError::DirectoryFull => write!(f, "directory full"),
            FsError::BadDescriptor => write!(f, "bad file descriptor"),
            FsError::Disk(e) => write!(f, "{}", e),
        }
    }
}

impl From<DiskError> for FsError {
    fn from(e: DiskError) -> Self {
        FsError::Disk(e)
    }
}
