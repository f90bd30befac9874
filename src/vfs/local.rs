//! Mounted-volume implementation of the device protocol.
//!
//! When a card is mounted through a USB reader instead of the device link,
//! the same engine can reconcile it: `LocalVfs` exposes one mounted
//! directory tree as a single well-behaved volume. It is also the concrete
//! endpoint the integration tests drive against real files.

use std::collections::HashMap;
use std::fs;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::SystemTime;

use async_trait::async_trait;

use super::error::{code, from_io, VfsError, VfsOp, VfsResult};
use super::{
	Cursor, DateKind, DirEntry, FileAttrs, FileHandle, MediaClass, OpenMode, SeekOrigin, Vfs,
	VolumeInfo, VolumeRef,
};

enum OpenNode {
	File { file: fs::File, path: PathBuf },
	Dir { path: PathBuf },
}

struct HandleTable {
	next: u32,
	open: HashMap<u32, OpenNode>,
}

/// A single volume backed by a locally mounted directory.
pub struct LocalVfs {
	mount: PathBuf,
	volume: VolumeRef,
	info: VolumeInfo,
	state: Mutex<HandleTable>,
}

impl LocalVfs {
	/// Expose `mount` as a removable-card volume with reference 2, the
	/// customary first non-hidden reference on multi-volume devices.
	pub fn new(mount: impl Into<PathBuf>) -> LocalVfs {
		LocalVfs {
			mount: mount.into(),
			volume: 2,
			info: VolumeInfo { media_class: MediaClass::RemovableCard, slot: 1, hidden: false },
			state: Mutex::new(HandleTable { next: 1, open: HashMap::new() }),
		}
	}

	pub fn with_media_class(mut self, media_class: MediaClass) -> LocalVfs {
		self.info.media_class = media_class;
		self
	}

	pub fn volume_ref(&self) -> VolumeRef {
		self.volume
	}

	fn resolve(&self, path: &str) -> PathBuf {
		self.mount.join(path)
	}

	fn check_volume(&self, volume: VolumeRef, op: VfsOp) -> VfsResult<()> {
		if volume == self.volume {
			Ok(())
		} else {
			Err(VfsError::new(code::BAD_VOLUME, op).with_volume(volume))
		}
	}

	fn entry_from_meta(name: String, meta: &fs::Metadata) -> DirEntry {
		let mut attrs = 0;
		if meta.is_dir() {
			attrs |= FileAttrs::DIRECTORY;
		}
		if name.starts_with('.') {
			attrs |= FileAttrs::HIDDEN;
		}
		DirEntry {
			name,
			attrs: FileAttrs(attrs),
			size: if meta.is_dir() { 0 } else { meta.len() },
			created: meta.created().ok().or_else(|| meta.modified().ok()),
			modified: meta.modified().ok(),
		}
	}

	fn sorted_entries(&self, dir: &Path) -> std::io::Result<Vec<DirEntry>> {
		let mut entries = Vec::new();
		for entry in fs::read_dir(dir)? {
			let entry = entry?;
			let name = entry.file_name().to_string_lossy().into_owned();
			let meta = fs::metadata(entry.path())?;
			entries.push(LocalVfs::entry_from_meta(name, &meta));
		}
		entries.sort_by(|a, b| a.name.cmp(&b.name));
		Ok(entries)
	}

	fn node_path(table: &HandleTable, handle: FileHandle, op: VfsOp) -> VfsResult<PathBuf> {
		match table.open.get(&handle.0) {
			Some(OpenNode::File { path, .. }) => Ok(path.clone()),
			Some(OpenNode::Dir { path }) => Ok(path.clone()),
			None => Err(VfsError::new(code::GENERIC, op)),
		}
	}
}

#[async_trait]
impl Vfs for LocalVfs {
	async fn enumerate_volumes(&self, _max: usize) -> VfsResult<Vec<VolumeRef>> {
		Ok(vec![self.volume])
	}

	async fn volume_info(&self, volume: VolumeRef) -> VfsResult<VolumeInfo> {
		self.check_volume(volume, VfsOp::VolumeInfo)?;
		Ok(self.info.clone())
	}

	async fn open(&self, volume: VolumeRef, path: &str, mode: OpenMode) -> VfsResult<FileHandle> {
		self.check_volume(volume, VfsOp::Open)?;
		let full = self.resolve(path);
		let wrap = |e: &std::io::Error| from_io(VfsOp::Open, e).with_path(path).with_volume(volume);

		let node = match fs::metadata(&full) {
			Ok(meta) if meta.is_dir() => OpenNode::Dir { path: full },
			Ok(_) => {
				let file = match mode {
					OpenMode::Read => fs::File::open(&full),
					OpenMode::ReadWrite | OpenMode::ReadWriteCreate => {
						fs::OpenOptions::new().read(true).write(true).open(&full)
					}
				}
				.map_err(|e| wrap(&e))?;
				OpenNode::File { file, path: full }
			}
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
				if mode != OpenMode::ReadWriteCreate {
					return Err(wrap(&e));
				}
				let file = fs::OpenOptions::new()
					.read(true)
					.write(true)
					.create(true)
					.truncate(true)
					.open(&full)
					.map_err(|e| wrap(&e))?;
				OpenNode::File { file, path: full }
			}
			Err(e) => return Err(wrap(&e)),
		};

		let mut table = self.state.lock().unwrap();
		let id = table.next;
		table.next += 1;
		table.open.insert(id, node);
		Ok(FileHandle(id))
	}

	async fn close(&self, handle: FileHandle) -> VfsResult<()> {
		let mut table = self.state.lock().unwrap();
		table
			.open
			.remove(&handle.0)
			.map(|_| ())
			.ok_or_else(|| VfsError::new(code::GENERIC, VfsOp::Close))
	}

	async fn read(&self, handle: FileHandle, buf: &mut [u8]) -> VfsResult<usize> {
		let mut table = self.state.lock().unwrap();
		match table.open.get_mut(&handle.0) {
			Some(OpenNode::File { file, path }) => {
				let path = path.clone();
				file.read(buf)
					.map_err(|e| from_io(VfsOp::Read, &e).with_path(&path.to_string_lossy()))
			}
			_ => Err(VfsError::new(code::GENERIC, VfsOp::Read)),
		}
	}

	async fn write(&self, handle: FileHandle, buf: &[u8]) -> VfsResult<usize> {
		let mut table = self.state.lock().unwrap();
		match table.open.get_mut(&handle.0) {
			Some(OpenNode::File { file, path }) => {
				let path = path.clone();
				file.write(buf)
					.map_err(|e| from_io(VfsOp::Write, &e).with_path(&path.to_string_lossy()))
			}
			_ => Err(VfsError::new(code::GENERIC, VfsOp::Write)),
		}
	}

	async fn seek(&self, handle: FileHandle, origin: SeekOrigin, offset: i64) -> VfsResult<()> {
		let mut table = self.state.lock().unwrap();
		match table.open.get_mut(&handle.0) {
			Some(OpenNode::File { file, .. }) => {
				let pos = match origin {
					SeekOrigin::Start => SeekFrom::Start(offset as u64),
					SeekOrigin::Current => SeekFrom::Current(offset),
					SeekOrigin::End => SeekFrom::End(offset),
				};
				file.seek(pos).map(|_| ()).map_err(|e| from_io(VfsOp::Seek, &e))
			}
			_ => Err(VfsError::new(code::GENERIC, VfsOp::Seek)),
		}
	}

	async fn enumerate(
		&self,
		handle: FileHandle,
		cursor: &mut Cursor,
		max: usize,
	) -> VfsResult<Vec<DirEntry>> {
		let dir = {
			let table = self.state.lock().unwrap();
			match table.open.get(&handle.0) {
				Some(OpenNode::Dir { path }) => path.clone(),
				_ => return Err(VfsError::new(code::GENERIC, VfsOp::Enumerate)),
			}
		};
		let entries = self
			.sorted_entries(&dir)
			.map_err(|e| from_io(VfsOp::Enumerate, &e).with_path(&dir.to_string_lossy()))?;
		let start = (cursor.0 as usize).min(entries.len());
		let end = (start + max).min(entries.len());
		*cursor = Cursor(end as u32);
		Ok(entries[start..end].to_vec())
	}

	async fn get_date(&self, handle: FileHandle, kind: DateKind) -> VfsResult<SystemTime> {
		let path = {
			let table = self.state.lock().unwrap();
			LocalVfs::node_path(&table, handle, VfsOp::GetDate)?
		};
		let meta = fs::metadata(&path).map_err(|e| from_io(VfsOp::GetDate, &e))?;
		let time = match kind {
			DateKind::Created => meta.created().or_else(|_| meta.modified()),
			DateKind::Modified => meta.modified(),
		};
		time.map_err(|e| from_io(VfsOp::GetDate, &e))
	}

	async fn set_date(
		&self,
		handle: FileHandle,
		kind: DateKind,
		time: SystemTime,
	) -> VfsResult<()> {
		let path = {
			let table = self.state.lock().unwrap();
			LocalVfs::node_path(&table, handle, VfsOp::SetDate)?
		};
		match kind {
			DateKind::Modified => {
				filetime::set_file_mtime(&path, filetime::FileTime::from_system_time(time))
					.map_err(|e| from_io(VfsOp::SetDate, &e))
			}
			// Creation time is not settable through the local filesystem
			// API; accept the write so callers see device-like behavior.
			DateKind::Created => Ok(()),
		}
	}

	async fn stat(&self, volume: VolumeRef, path: &str) -> VfsResult<Option<DirEntry>> {
		self.check_volume(volume, VfsOp::Stat)?;
		let full = self.resolve(path);
		let name = full
			.file_name()
			.map(|n| n.to_string_lossy().into_owned())
			.unwrap_or_else(|| path.to_string());
		match fs::metadata(&full) {
			Ok(meta) => Ok(Some(LocalVfs::entry_from_meta(name, &meta))),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
			Err(e) => Err(from_io(VfsOp::Stat, &e).with_path(path).with_volume(volume)),
		}
	}

	async fn delete(&self, volume: VolumeRef, path: &str) -> VfsResult<()> {
		self.check_volume(volume, VfsOp::Delete)?;
		let full = self.resolve(path);
		fs::remove_file(&full)
			.map_err(|e| from_io(VfsOp::Delete, &e).with_path(path).with_volume(volume))
	}

	async fn mkdir(&self, volume: VolumeRef, path: &str) -> VfsResult<()> {
		self.check_volume(volume, VfsOp::MkDir)?;
		let full = self.resolve(path);
		fs::create_dir(&full)
			.map_err(|e| from_io(VfsOp::MkDir, &e).with_path(path).with_volume(volume))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_open_read_roundtrip() {
		let dir = tempfile::tempdir().unwrap();
		fs::write(dir.path().join("a.jpg"), b"payload").unwrap();
		let vfs = LocalVfs::new(dir.path());
		let volume = vfs.volume_ref();

		let h = vfs.open(volume, "a.jpg", OpenMode::Read).await.unwrap();
		let mut buf = [0u8; 16];
		let n = vfs.read(h, &mut buf).await.unwrap();
		assert_eq!(&buf[..n], b"payload");
		vfs.close(h).await.unwrap();
	}

	#[tokio::test]
	async fn test_enumerate_is_sorted_and_cursor_advances() {
		let dir = tempfile::tempdir().unwrap();
		fs::write(dir.path().join("b.jpg"), b"b").unwrap();
		fs::write(dir.path().join("a.jpg"), b"a").unwrap();
		fs::create_dir(dir.path().join("album")).unwrap();
		let vfs = LocalVfs::new(dir.path());
		let volume = vfs.volume_ref();

		let h = vfs.open(volume, "", OpenMode::Read).await.unwrap();
		let mut cursor = Cursor::START;
		let first = vfs.enumerate(h, &mut cursor, 2).await.unwrap();
		assert_eq!(first.len(), 2);
		assert_eq!(first[0].name, "a.jpg");
		let rest = vfs.enumerate(h, &mut cursor, 2).await.unwrap();
		assert_eq!(rest.len(), 1);
		assert_eq!(rest[0].name, "b.jpg");
		assert!(first[1].is_directory());
	}

	#[tokio::test]
	async fn test_mkdir_twice_reports_already_exists() {
		let dir = tempfile::tempdir().unwrap();
		let vfs = LocalVfs::new(dir.path());
		let volume = vfs.volume_ref();

		vfs.mkdir(volume, "Fresh").await.unwrap();
		let err = vfs.mkdir(volume, "Fresh").await.unwrap_err();
		assert!(err.is(code::ALREADY_EXISTS));
	}

	#[tokio::test]
	async fn test_wrong_volume_is_rejected() {
		let dir = tempfile::tempdir().unwrap();
		let vfs = LocalVfs::new(dir.path());
		let err = vfs.stat(99, "x").await.unwrap_err();
		assert!(err.is(code::BAD_VOLUME));
	}
}

// vim: ts=4
