//! Error types for sync operations.

use std::error::Error;
use std::fmt;
use std::io;

use crate::vfs::VfsError;

/// Top-level error type for setup and transfer failures.
///
/// Per-file and per-album failures inside a running session are contained
/// as `crate::outcome::Outcome` values instead; `SyncError` surfaces only
/// where an operation cannot continue at all.
#[derive(Debug)]
pub enum SyncError {
	/// A remote protocol call failed.
	Vfs(VfsError),

	/// Local filesystem I/O error.
	Io(io::Error),

	/// Invalid configuration.
	InvalidConfig { message: String },

	/// No storage volume was reachable on the device.
	NoVolumes,

	/// The configuration names no file types; nothing would ever match.
	NoFileTypes,
}

impl fmt::Display for SyncError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			SyncError::Vfs(e) => write!(f, "device error: {}", e),
			SyncError::Io(e) => write!(f, "I/O error: {}", e),
			SyncError::InvalidConfig { message } => {
				write!(f, "invalid configuration: {}", message)
			}
			SyncError::NoVolumes => {
				write!(f, "could not find any storage volumes; no media synced")
			}
			SyncError::NoFileTypes => {
				write!(f, "no file types configured; no media synced")
			}
		}
	}
}

impl Error for SyncError {}

impl From<VfsError> for SyncError {
	fn from(e: VfsError) -> Self {
		SyncError::Vfs(e)
	}
}

impl From<io::Error> for SyncError {
	fn from(e: io::Error) -> Self {
		SyncError::Io(e)
	}
}

impl From<String> for SyncError {
	fn from(message: String) -> Self {
		SyncError::InvalidConfig { message }
	}
}

// vim: ts=4
