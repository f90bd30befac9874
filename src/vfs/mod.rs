//! Remote-filesystem protocol abstraction.
//!
//! The device side of a sync is only reachable through a narrow protocol:
//! open/read/write/seek/close on file handles, batched directory
//! enumeration with an opaque cursor, per-handle date access, and
//! volume-level info/delete/mkdir. All engine code depends on the [`Vfs`]
//! trait, never on a concrete link implementation.
//!
//! Two implementations ship with the crate: [`local::LocalVfs`] exposes a
//! volume mounted as a local directory (a card in a USB reader), and
//! [`testing::FakeVfs`] is a scriptable in-memory device used by the test
//! suite to reproduce protocol misbehavior.

pub mod error;
pub mod local;
pub mod testing;

pub use self::error::{code, from_io, Severity, VfsError, VfsOp, VfsResult};

use async_trait::async_trait;
use std::time::SystemTime;

/// Opaque reference to a storage volume on the device.
pub type VolumeRef = u32;

/// Handle to an open remote file or directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileHandle(pub u32);

/// Opaque enumeration cursor threaded through successive listing calls.
///
/// The protocol is known to hand back out-of-range cursor values; callers
/// that need a dependable listing reset the cursor to [`Cursor::START`]
/// before every call instead of trusting a returned one (see
/// `crate::enumerate`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor(pub u32);

impl Cursor {
	pub const START: Cursor = Cursor(0);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
	Read,
	ReadWrite,
	/// Read-write, creating the file when it does not exist.
	ReadWriteCreate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekOrigin {
	Start,
	Current,
	End,
}

/// Which of a file's two timestamps an operation addresses.
///
/// Remote modification-time reads are unreliable: the device accepts
/// writes to it but may answer reads with the creation time instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateKind {
	Created,
	Modified,
}

/// Entry attribute bitmask as reported by the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FileAttrs(pub u32);

impl FileAttrs {
	pub const READ_ONLY: u32 = 0x01;
	pub const HIDDEN: u32 = 0x02;
	pub const SYSTEM: u32 = 0x04;
	pub const VOLUME_LABEL: u32 = 0x08;
	pub const DIRECTORY: u32 = 0x10;
	pub const ARCHIVE: u32 = 0x20;
	pub const LINK: u32 = 0x40;

	pub fn contains(self, flag: u32) -> bool {
		self.0 & flag != 0
	}

	pub fn is_directory(self) -> bool {
		self.contains(FileAttrs::DIRECTORY)
	}

	/// True for anything the backup pass must not treat as a regular file:
	/// hidden, system, volume-label, directory or link entries. Read-only
	/// and archive bits are deliberately ignored.
	pub fn is_special(self) -> bool {
		self.contains(
			FileAttrs::HIDDEN
				| FileAttrs::SYSTEM
				| FileAttrs::VOLUME_LABEL
				| FileAttrs::DIRECTORY
				| FileAttrs::LINK,
		)
	}
}

/// One directory entry from a remote listing.
#[derive(Debug, Clone)]
pub struct DirEntry {
	pub name: String,
	pub attrs: FileAttrs,
	/// File size in bytes; zero for directories.
	pub size: u64,
	pub created: Option<SystemTime>,
	pub modified: Option<SystemTime>,
}

impl DirEntry {
	pub fn is_directory(&self) -> bool {
		self.attrs.is_directory()
	}
}

/// What kind of storage backs a volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaClass {
	InternalFlash,
	RemovableCard,
	Unknown,
}

#[derive(Debug, Clone)]
pub struct VolumeInfo {
	pub media_class: MediaClass,
	/// Slot number, meaningful for removable cards in multi-slot devices.
	pub slot: u32,
	/// Hidden volumes are excluded from the device's native enumeration.
	pub hidden: bool,
}

/// The remote-filesystem protocol surface.
///
/// Every call blocks the single engine thread until the device answers;
/// implementations keep per-connection state behind interior mutability so
/// the engine can hold one shared reference.
#[async_trait]
pub trait Vfs: Send + Sync {
	/// Native volume enumeration. May omit hidden volumes; see
	/// `crate::volume::discover_volumes` for the compensating wrapper.
	async fn enumerate_volumes(&self, max: usize) -> VfsResult<Vec<VolumeRef>>;

	async fn volume_info(&self, volume: VolumeRef) -> VfsResult<VolumeInfo>;

	async fn open(&self, volume: VolumeRef, path: &str, mode: OpenMode) -> VfsResult<FileHandle>;

	async fn close(&self, handle: FileHandle) -> VfsResult<()>;

	/// Read up to `buf.len()` bytes; returns the number actually read.
	async fn read(&self, handle: FileHandle, buf: &mut [u8]) -> VfsResult<usize>;

	/// Write up to `buf.len()` bytes; returns the number actually written.
	async fn write(&self, handle: FileHandle, buf: &[u8]) -> VfsResult<usize>;

	async fn seek(&self, handle: FileHandle, origin: SeekOrigin, offset: i64) -> VfsResult<()>;

	/// One batched listing call: up to `max` entries starting at `cursor`.
	/// The cursor is updated in place; its post-call value is not
	/// trustworthy on misbehaving devices.
	async fn enumerate(
		&self,
		handle: FileHandle,
		cursor: &mut Cursor,
		max: usize,
	) -> VfsResult<Vec<DirEntry>>;

	async fn get_date(&self, handle: FileHandle, kind: DateKind) -> VfsResult<SystemTime>;

	async fn set_date(&self, handle: FileHandle, kind: DateKind, time: SystemTime)
		-> VfsResult<()>;

	/// Look up a path without opening it. `Ok(None)` means "not present".
	async fn stat(&self, volume: VolumeRef, path: &str) -> VfsResult<Option<DirEntry>>;

	async fn delete(&self, volume: VolumeRef, path: &str) -> VfsResult<()>;

	/// Create one directory. The parent must exist. Fails with
	/// [`code::ALREADY_EXISTS`] when the path is already present; callers
	/// treat that as success.
	async fn mkdir(&self, volume: VolumeRef, path: &str) -> VfsResult<()>;
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_attr_masks() {
		let dir = FileAttrs(FileAttrs::DIRECTORY);
		assert!(dir.is_directory());
		assert!(dir.is_special());

		let archived = FileAttrs(FileAttrs::ARCHIVE | FileAttrs::READ_ONLY);
		assert!(!archived.is_special());

		let hidden = FileAttrs(FileAttrs::HIDDEN);
		assert!(hidden.is_special());
		assert!(!hidden.is_directory());
	}
}

// vim: ts=4
