//! Timestamp propagation between the device and the local mirror.
//!
//! Backed-up files carry the capture date of the media, not the time of
//! the sync, so both directions copy timestamps across. The device
//! rejects dates before 1980, and creating a directory entry clobbers the
//! parent directory's own modification time as a side effect -- both
//! quirks are handled here.

use std::fs;
use std::io;
use std::path::Path;
use std::time::{Duration, SystemTime};

use filetime::FileTime;

use crate::vfs::{DateKind, FileHandle, Vfs, VfsResult};

/// 1980-01-01T00:00:00Z, the earliest date the device accepts.
pub const EARLIEST_REMOTE_DATE_SECS: u64 = 315_532_800;

/// Clamp a timestamp up to the device's accepted range.
pub fn clamp_remote_date(time: SystemTime) -> SystemTime {
	let floor = SystemTime::UNIX_EPOCH + Duration::from_secs(EARLIEST_REMOTE_DATE_SECS);
	if time < floor {
		floor
	} else {
		time
	}
}

/// The capture date of a remote file.
///
/// With `prefer_modified` the modification time is requested, though the
/// device may answer such reads with the creation time anyway; the
/// creation time is the dependable default.
pub async fn remote_file_time(
	vfs: &dyn Vfs,
	handle: FileHandle,
	prefer_modified: bool,
) -> VfsResult<SystemTime> {
	let kind = if prefer_modified { DateKind::Modified } else { DateKind::Created };
	vfs.get_date(handle, kind).await
}

/// Stamp both remote dates from one local timestamp. The creation date is
/// what the device's media application displays.
pub async fn stamp_remote(vfs: &dyn Vfs, handle: FileHandle, time: SystemTime) -> VfsResult<()> {
	let time = clamp_remote_date(time);
	vfs.set_date(handle, DateKind::Modified, time).await?;
	vfs.set_date(handle, DateKind::Created, time).await
}

/// Modification time of a local file or directory.
pub fn local_mtime(path: &Path) -> io::Result<SystemTime> {
	fs::metadata(path)?.modified()
}

/// Set a local file's or directory's modification time, leaving the
/// access time alone.
pub fn set_local_mtime(path: &Path, time: SystemTime) -> io::Result<()> {
	filetime::set_file_mtime(path, FileTime::from_system_time(time))
}

/// Create one local directory, repairing the parent's modification time
/// afterwards (directory creation bumps it as a side effect).
///
/// Returns `Ok(true)` when the directory was created, `Ok(false)` when it
/// already existed.
pub fn create_local_dir(path: &Path) -> io::Result<bool> {
	let parent_mtime = path.parent().and_then(|p| local_mtime(p).ok());
	match fs::create_dir(path) {
		Ok(()) => {
			if let (Some(parent), Some(mtime)) = (path.parent(), parent_mtime) {
				let _ = set_local_mtime(parent, mtime);
			}
			Ok(true)
		}
		Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(false),
		Err(e) => Err(e),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_clamp_floor() {
		let old = SystemTime::UNIX_EPOCH + Duration::from_secs(1000);
		let clamped = clamp_remote_date(old);
		assert_eq!(
			clamped,
			SystemTime::UNIX_EPOCH + Duration::from_secs(EARLIEST_REMOTE_DATE_SECS)
		);

		let recent = SystemTime::UNIX_EPOCH + Duration::from_secs(1_400_000_000);
		assert_eq!(clamp_remote_date(recent), recent);
	}

	#[test]
	fn test_create_local_dir_repairs_parent_mtime() {
		let tmp = tempfile::tempdir().unwrap();
		let parent = tmp.path().join("albums");
		fs::create_dir(&parent).unwrap();
		let stamp = SystemTime::UNIX_EPOCH + Duration::from_secs(1_111_111_111);
		set_local_mtime(&parent, stamp).unwrap();

		assert!(create_local_dir(&parent.join("Trip")).unwrap());
		assert_eq!(local_mtime(&parent).unwrap(), stamp);

		// Second creation is a no-op.
		assert!(!create_local_dir(&parent.join("Trip")).unwrap());
	}

	#[test]
	fn test_set_local_mtime_roundtrip() {
		let tmp = tempfile::tempdir().unwrap();
		let file = tmp.path().join("x.jpg");
		fs::write(&file, b"x").unwrap();
		let stamp = SystemTime::UNIX_EPOCH + Duration::from_secs(1_234_567_890);
		set_local_mtime(&file, stamp).unwrap();
		assert_eq!(local_mtime(&file).unwrap(), stamp);
	}
}

// vim: ts=4
