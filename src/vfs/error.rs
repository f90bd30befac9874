//! Device protocol errors and their log-ready classification.
//!
//! The remote protocol reports failures as numeric codes. A handful of
//! codes carry useful meaning for the user (missing file, bad volume
//! reference, full card); everything else is surfaced as a generic
//! "<operation> error <code>" line. Classification only shapes the message
//! and the log level, never control flow -- with one exception handled at
//! the call site: the already-exists code on mkdir, which callers treat as
//! success.

use std::fmt;
use std::io;

use super::VolumeRef;

/// Result type for protocol operations.
pub type VfsResult<T> = Result<T, VfsError>;

/// Well-known protocol error codes.
pub mod code {
	/// Unspecific failure.
	pub const GENERIC: i32 = 0x2A02;
	/// The target already exists (distinguished during mkdir).
	pub const ALREADY_EXISTS: i32 = 0x2A06;
	/// File or directory not found.
	pub const NOT_FOUND: i32 = 0x2A08;
	/// The volume reference is not valid.
	pub const BAD_VOLUME: i32 = 0x2A09;
	/// Directory is not empty.
	pub const DIR_NOT_EMPTY: i32 = 0x2A0D;
	/// No space left on the volume.
	pub const VOLUME_FULL: i32 = 0x2A0F;
}

/// The protocol operation that failed, for message context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VfsOp {
	EnumerateVolumes,
	VolumeInfo,
	Open,
	Close,
	Read,
	Write,
	Seek,
	Enumerate,
	GetDate,
	SetDate,
	Stat,
	Delete,
	MkDir,
}

impl VfsOp {
	fn name(self) -> &'static str {
		match self {
			VfsOp::EnumerateVolumes => "volume enumeration",
			VfsOp::VolumeInfo => "volume info",
			VfsOp::Open => "open",
			VfsOp::Close => "close",
			VfsOp::Read => "read",
			VfsOp::Write => "write",
			VfsOp::Seek => "seek",
			VfsOp::Enumerate => "enumerate",
			VfsOp::GetDate => "get-date",
			VfsOp::SetDate => "set-date",
			VfsOp::Stat => "stat",
			VfsOp::Delete => "delete",
			VfsOp::MkDir => "mkdir",
		}
	}
}

/// How severe a classified error is for the enclosing operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
	Warning,
	Fatal,
}

/// A failed protocol call: raw code plus enough context for one log line.
#[derive(Debug, Clone)]
pub struct VfsError {
	pub code: i32,
	pub op: VfsOp,
	pub volume: Option<VolumeRef>,
	pub path: Option<String>,
}

impl VfsError {
	pub fn new(code: i32, op: VfsOp) -> VfsError {
		VfsError { code, op, volume: None, path: None }
	}

	pub fn with_volume(mut self, volume: VolumeRef) -> VfsError {
		self.volume = Some(volume);
		self
	}

	pub fn with_path(mut self, path: &str) -> VfsError {
		self.path = Some(path.to_string());
		self
	}

	/// Check against one of the [`code`] constants.
	pub fn is(&self, code: i32) -> bool {
		self.code == code
	}

	/// Rank the error for log-level selection.
	///
	/// A missing file or volume is ordinarily a condition the engine works
	/// around; exhausted space and transfer failures are not.
	pub fn severity(&self) -> Severity {
		match self.code {
			code::NOT_FOUND | code::BAD_VOLUME | code::ALREADY_EXISTS => Severity::Warning,
			_ => match self.op {
				VfsOp::GetDate | VfsOp::SetDate | VfsOp::Stat => Severity::Warning,
				_ => Severity::Fatal,
			},
		}
	}

	fn message(&self) -> String {
		match self.code {
			code::NOT_FOUND => "not found".to_string(),
			code::BAD_VOLUME => "invalid volume reference".to_string(),
			code::DIR_NOT_EMPTY => "directory not empty".to_string(),
			code::VOLUME_FULL => "no space left on volume".to_string(),
			code::ALREADY_EXISTS => "already exists".to_string(),
			other => format!("{} error {}", self.op.name(), other),
		}
	}
}

impl fmt::Display for VfsError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.message())?;
		if let Some(path) = &self.path {
			write!(f, ": '{}'", path)?;
		}
		if let Some(volume) = self.volume {
			write!(f, " on volume {}", volume)?;
		}
		if !matches!(
			self.code,
			code::NOT_FOUND | code::BAD_VOLUME | code::DIR_NOT_EMPTY | code::VOLUME_FULL
				| code::ALREADY_EXISTS
		) {
			return Ok(());
		}
		write!(f, " ({})", self.op.name())
	}
}

impl std::error::Error for VfsError {}

/// Map a local I/O failure onto the shared code space, so one classifier
/// covers both endpoints.
pub fn from_io(op: VfsOp, err: &io::Error) -> VfsError {
	let code = match err.kind() {
		io::ErrorKind::NotFound => code::NOT_FOUND,
		io::ErrorKind::AlreadyExists => code::ALREADY_EXISTS,
		io::ErrorKind::DirectoryNotEmpty => code::DIR_NOT_EMPTY,
		io::ErrorKind::StorageFull => code::VOLUME_FULL,
		_ => code::GENERIC,
	};
	VfsError::new(code, op)
}


// vim: ts=4
