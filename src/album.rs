//! Per-album two-phase reconciliation.
//!
//! An album is one (remote directory, local directory) pair; the root of
//! a media tree is itself the "unfiled" album. Phase 1 restores local
//! files the device does not have; phase 2 backs up device files and
//! applies the collision policy: same-name files are compared (size
//! first, bytes on demand) and a differing device file is preserved under
//! an alternate `name_N.ext` rather than overwriting the local copy.
//! Restore never renames -- a same-name device file is left untouched.
//!
//! Phase order matters: the restore scan checks names against the remote
//! listing taken before any transfer, which keeps it from re-uploading
//! files that are themselves the product of an earlier backup (including
//! renamed conflict copies).

use std::path::{Path, PathBuf};

use tokio::fs;

use crate::config::{Config, ExcludeSet};
use crate::enumerate::{enumerate_dir, Listing};
use crate::logging::*;
use crate::outcome::Outcome;
use crate::timestamp::{create_local_dir, local_mtime, remote_file_time, set_local_mtime, stamp_remote};
use crate::transfer::{Comparison, TransferBuffers};
use crate::vfs::{code, DirEntry, FileHandle, OpenMode, SeekOrigin, Severity, Vfs, VfsError, VolumeRef};

/// Names shorter than this can't be media files ("a.jpg" needs 5 chars;
/// 2 rejects the degenerate cases the device is known to produce).
const MIN_NAME_LEN: usize = 2;

/// Bound on the `_N` rename space; exhaustion fails the file by design.
const MAX_RENAME_ATTEMPTS: u32 = 9;

/// Whether an album sync starts from the remote side (the normal case)
/// or was initiated by a local-only directory, requiring the remote
/// album to be created first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlbumMode {
	BackupLed,
	RestoreLed,
}

#[derive(Debug, Clone, Copy)]
pub struct AlbumResult {
	pub outcome: Outcome,
	/// A remote album directory was created this pass. Freshly created
	/// album directories destabilize the device's own media bookkeeping
	/// until its media application is opened once; the caller must
	/// surface this to the user.
	pub created_remote_dir: bool,
}

/// Join a remote directory and an entry name. An empty directory stands
/// for the volume root.
pub(crate) fn remote_join(dir: &str, name: &str) -> String {
	if dir.is_empty() {
		name.to_string()
	} else {
		format!("{}/{}", dir, name)
	}
}

/// Log a protocol error at the level its classification calls for.
pub(crate) fn log_vfs(err: &VfsError, what: &str) {
	match err.severity() {
		Severity::Fatal => error!("{}: {}", what, err),
		Severity::Warning => warn!("{}: {}", what, err),
	}
}

/// Everything one album sync needs: configuration, compiled exclusions,
/// the device connection, the session's transfer buffers and the volume
/// being worked on. No process-wide state.
pub struct AlbumSynchronizer<'a> {
	pub config: &'a Config,
	pub excludes: &'a ExcludeSet,
	pub vfs: &'a dyn Vfs,
	pub buffers: &'a mut TransferBuffers,
	pub volume: VolumeRef,
}

impl<'a> AlbumSynchronizer<'a> {
	/// Reconcile one album. `name` is `None` for the unfiled album (the
	/// root itself), in which case both directories must already exist.
	pub async fn sync(
		&mut self,
		remote_root: &str,
		local_root: &Path,
		name: Option<&str>,
		mode: AlbumMode,
	) -> AlbumResult {
		let remote_dir = match name {
			Some(n) => remote_join(remote_root, n),
			None => remote_root.to_string(),
		};
		if self.excludes.is_excluded(self.volume, &remote_dir) {
			return AlbumResult { outcome: Outcome::Clean, created_remote_dir: false };
		}
		let local_dir = match name {
			Some(n) => local_root.join(n),
			None => local_root.to_path_buf(),
		};

		let mut created_remote_dir = false;
		if mode == AlbumMode::RestoreLed && name.is_some() {
			debug!(dir = %remote_dir, volume = self.volume, "creating remote album directory");
			match self.vfs.mkdir(self.volume, &remote_dir).await {
				Ok(()) => {}
				// Idempotent mkdir: the directory being there already is
				// success, not failure.
				Err(e) if e.is(code::ALREADY_EXISTS) => {}
				Err(e) => {
					log_vfs(&e, "could not create remote album directory");
					return AlbumResult { outcome: Outcome::AlbumFailed, created_remote_dir };
				}
			}
			created_remote_dir = true;
		}

		// Opened read-write so dates can be set on the handle later.
		let dir = match self.vfs.open(self.volume, &remote_dir, OpenMode::ReadWrite).await {
			Ok(h) => h,
			Err(e) => {
				log_vfs(&e, "could not open remote album directory");
				return AlbumResult { outcome: Outcome::AlbumFailed, created_remote_dir };
			}
		};
		let outcome = self.sync_opened(dir, &remote_dir, &local_dir, name, mode).await;
		let _ = self.vfs.close(dir).await;
		AlbumResult { outcome, created_remote_dir }
	}

	async fn sync_opened(
		&mut self,
		dir: FileHandle,
		remote_dir: &str,
		local_dir: &PathBuf,
		name: Option<&str>,
		mode: AlbumMode,
	) -> Outcome {
		let mut outcome = Outcome::Clean;

		if name.is_some() {
			match create_local_dir(local_dir) {
				Ok(true) => {
					// Copy the remote directory's date onto the new one.
					match remote_file_time(self.vfs, dir, self.config.prefer_date_modified).await
					{
						Ok(t) => {
							if let Err(e) = set_local_mtime(local_dir, t) {
								warn!(dir = %local_dir.display(), error = %e,
									"could not set local album directory date");
							}
						}
						Err(e) => log_vfs(&e, "could not get remote album directory date"),
					}
				}
				Ok(false) => {}
				Err(e) => {
					error!(dir = %local_dir.display(), error = %e,
						"could not create local album directory");
					return Outcome::AlbumFailed;
				}
			}
			if mode == AlbumMode::RestoreLed {
				// The new remote directory gets the local one's date.
				match local_mtime(local_dir) {
					Ok(t) => {
						if let Err(e) = stamp_remote(self.vfs, dir, t).await {
							log_vfs(&e, "could not set remote album directory date");
						}
					}
					Err(e) => {
						error!(dir = %local_dir.display(), error = %e,
							"could not read local album directory status");
						return Outcome::AlbumFailed;
					}
				}
			}
		}

		info!(album = %remote_dir, volume = self.volume, "syncing album");

		// A freshly created remote album has nothing to list.
		let listing = if mode == AlbumMode::RestoreLed {
			Listing::empty()
		} else {
			match enumerate_dir(self.vfs, dir).await {
				Ok(listing) => {
					if listing.truncated {
						outcome = outcome.merge(Outcome::Warning);
					}
					listing
				}
				Err(e) => {
					log_vfs(&e, "could not list remote album directory");
					return outcome.merge(Outcome::AlbumFailed);
				}
			}
		};

		if self.config.do_restore {
			outcome = outcome.merge(self.restore_scan(&listing, remote_dir, local_dir).await);
		}
		if self.config.do_backup {
			outcome = outcome.merge(self.backup_scan(&listing, remote_dir, local_dir).await);
		}
		debug!(album = %remote_dir, outcome = ?outcome, "album done");
		outcome
	}

	/// Phase 1: upload local files unknown to the device.
	async fn restore_scan(
		&mut self,
		listing: &Listing,
		remote_dir: &str,
		local_dir: &Path,
	) -> Outcome {
		let mut outcome = Outcome::Clean;
		let mut entries = match fs::read_dir(local_dir).await {
			Ok(rd) => rd,
			Err(e) => {
				error!(dir = %local_dir.display(), error = %e,
					"could not read local album directory");
				return Outcome::AlbumFailed;
			}
		};
		loop {
			let entry = match entries.next_entry().await {
				Ok(Some(entry)) => entry,
				Ok(None) => break,
				Err(e) => {
					error!(dir = %local_dir.display(), error = %e, "local listing failed");
					outcome = outcome.merge(Outcome::FileFailed);
					break;
				}
			};
			let file_name = entry.file_name().to_string_lossy().into_owned();
			// stat, not the entry type, so symlinked media still counts.
			let meta = match fs::metadata(entry.path()).await {
				Ok(meta) => meta,
				Err(e) => {
					error!(file = %entry.path().display(), error = %e,
						"could not read local file status");
					outcome = outcome.merge(Outcome::FileFailed);
					continue;
				}
			};
			if !meta.is_file()
				|| file_name.len() < MIN_NAME_LEN
				|| !self.config.matches_file_type(&file_name, true)
			{
				continue;
			}
			if let Some(remote) = listing.find(&file_name) {
				if remote.size != meta.len() {
					warn!(file = %file_name,
						"exists on both sides with different sizes; device copy left untouched");
				} else {
					debug!(file = %file_name, "already on device");
				}
				continue;
			}
			outcome = outcome
				.merge(self.restore_file(local_dir, remote_dir, &file_name, meta.len()).await);
		}
		outcome
	}

	/// Phase 2: back up device files, renaming on conflict.
	async fn backup_scan(
		&mut self,
		listing: &Listing,
		remote_dir: &str,
		local_dir: &Path,
	) -> Outcome {
		let mut outcome = Outcome::Clean;
		for entry in &listing.entries {
			debug!(file = %entry.name, attrs = entry.attrs.0, "remote entry");
			if entry.attrs.is_special()
				|| entry.name.len() < MIN_NAME_LEN
				|| !self.config.matches_file_type(&entry.name, false)
			{
				continue;
			}
			outcome = outcome.merge(self.backup_file(remote_dir, local_dir, entry).await);
		}
		outcome
	}

	/// Back up one remote file unless the mirror already holds it.
	pub(crate) async fn backup_file(
		&mut self,
		remote_dir: &str,
		local_dir: &Path,
		entry: &DirEntry,
	) -> Outcome {
		let remote_path = remote_join(remote_dir, &entry.name);
		let handle = match self.vfs.open(self.volume, &remote_path, OpenMode::Read).await {
			Ok(h) => h,
			Err(e) => {
				log_vfs(&e, "could not open remote file for reading");
				return Outcome::FileFailed;
			}
		};
		let outcome = self.backup_opened(handle, local_dir, entry).await;
		let _ = self.vfs.close(handle).await;
		outcome
	}

	async fn backup_opened(
		&mut self,
		handle: FileHandle,
		local_dir: &Path,
		entry: &DirEntry,
	) -> Outcome {
		let size = entry.size;
		let mut dest = local_dir.join(&entry.name);

		if let Ok(meta) = fs::metadata(&dest).await {
			let mut equal = false;
			if meta.len() != size {
				warn!(file = %dest.display(), local = meta.len(), remote = size,
					"already exists with different size");
			} else if !self.config.compare_content {
				equal = true;
			} else {
				match fs::File::open(&dest).await {
					Ok(mut local) => {
						equal = self.buffers.compare(self.vfs, handle, &mut local, size).await
							== Comparison::Equal;
						if !equal {
							warn!(file = %dest.display(), "already exists with different content");
						}
						if let Err(e) = self.vfs.seek(handle, SeekOrigin::Start, 0).await {
							log_vfs(&e, "could not rewind remote file after comparison");
							return Outcome::FileFailed;
						}
					}
					Err(e) => {
						warn!(file = %dest.display(), error = %e,
							"cannot open for comparison, may have different content");
					}
				}
			}
			if equal {
				debug!(file = %dest.display(), "already exists, not copying");
				return Outcome::Clean;
			}
			match rename_candidate(&entry.name, |c| local_dir.join(c).exists()) {
				Some(alternate) => {
					warn!(from = %entry.name, to = %alternate,
						"backing up under an alternate name");
					dest = local_dir.join(alternate);
				}
				None => {
					warn!(file = %entry.name, "all alternate names taken, not backed up");
					return Outcome::FileFailed;
				}
			}
		}

		// create_new: an unexpected existing file must never be clobbered.
		let mut local =
			match fs::OpenOptions::new().write(true).create_new(true).open(&dest).await {
				Ok(f) => f,
				Err(e) => {
					error!(file = %dest.display(), error = %e, "cannot open for writing");
					return Outcome::FileFailed;
				}
			};
		info!(file = %dest.display(), bytes = size, "backing up");
		match self.buffers.backup(self.vfs, handle, &mut local, size).await {
			Ok(_) => {
				drop(local);
				// Stamp the mirror copy with the capture date.
				match remote_file_time(self.vfs, handle, self.config.prefer_date_modified).await {
					Ok(t) => {
						if let Err(e) = set_local_mtime(&dest, t) {
							warn!(file = %dest.display(), error = %e, "could not set file date");
						}
					}
					Err(e) => log_vfs(&e, "could not get remote file date"),
				}
				Outcome::Clean
			}
			Err(e) => {
				error!(file = %dest.display(), error = %e, "transfer failed");
				drop(local);
				if fs::remove_file(&dest).await.is_ok() {
					warn!(file = %dest.display(), "deleted incomplete local file");
				}
				Outcome::FileFailed
			}
		}
	}

	/// Upload one local file. Collisions never reach this point in the
	/// album scan (same-name files are skipped against the listing), so
	/// the remote open simply creates the file.
	pub(crate) async fn restore_file(
		&mut self,
		local_dir: &Path,
		remote_dir: &str,
		name: &str,
		size: u64,
	) -> Outcome {
		let local_path = local_dir.join(name);
		let remote_path = remote_join(remote_dir, name);
		let mtime = match local_mtime(&local_path) {
			Ok(t) => t,
			Err(e) => {
				error!(file = %local_path.display(), error = %e,
					"could not read local file status");
				return Outcome::FileFailed;
			}
		};
		let mut src = match fs::File::open(&local_path).await {
			Ok(f) => f,
			Err(e) => {
				error!(file = %local_path.display(), error = %e, "cannot open for reading");
				return Outcome::FileFailed;
			}
		};
		let handle =
			match self.vfs.open(self.volume, &remote_path, OpenMode::ReadWriteCreate).await {
				Ok(h) => h,
				Err(e) => {
					log_vfs(&e, "could not open remote file for writing");
					return Outcome::FileFailed;
				}
			};
		info!(file = %remote_path, bytes = size, "restoring");
		match self.buffers.restore(&mut src, self.vfs, handle, size).await {
			Ok(_) => {
				if let Err(e) = stamp_remote(self.vfs, handle, mtime).await {
					log_vfs(&e, "could not set remote file date");
				}
				let _ = self.vfs.close(handle).await;
				Outcome::Clean
			}
			Err(e) => {
				error!(file = %remote_path, error = %e, "transfer failed");
				let _ = self.vfs.close(handle).await;
				match self.vfs.delete(self.volume, &remote_path).await {
					Ok(()) => warn!(file = %remote_path, "deleted incomplete remote file"),
					Err(e) => log_vfs(&e, "could not delete incomplete remote file"),
				}
				Outcome::FileFailed
			}
		}
	}
}

/// Alternate destination name for a conflicting backup: `_N` inserted
/// before the extension, N counting 1 through 9. `None` means the rename
/// space is exhausted.
pub fn rename_candidate(name: &str, mut exists: impl FnMut(&str) -> bool) -> Option<String> {
	let (stem, ext) = match name.rfind('.') {
		Some(idx) => (&name[..idx], &name[idx..]),
		None => (name, ""),
	};
	for n in 1..=MAX_RENAME_ATTEMPTS {
		let candidate = format!("{}_{}{}", stem, n, ext);
		if !exists(&candidate) {
			return Some(candidate);
		}
	}
	None
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_rename_candidate_first_free() {
		let name = rename_candidate("photo.jpg", |_| false).unwrap();
		assert_eq!(name, "photo_1.jpg");
	}

	#[test]
	fn test_rename_candidate_skips_taken_names() {
		let taken = ["photo_1.jpg", "photo_2.jpg"];
		let name = rename_candidate("photo.jpg", |c| taken.contains(&c)).unwrap();
		assert_eq!(name, "photo_3.jpg");
	}

	#[test]
	fn test_rename_candidate_space_is_bounded() {
		assert_eq!(rename_candidate("photo.jpg", |_| true), None);
	}

	#[test]
	fn test_rename_candidate_without_extension() {
		let name = rename_candidate("clip", |_| false).unwrap();
		assert_eq!(name, "clip_1");
	}

	#[test]
	fn test_rename_candidate_multiple_dots() {
		let name = rename_candidate("archive.tar.gz", |_| false).unwrap();
		assert_eq!(name, "archive.tar_1.gz");
	}
}

// vim: ts=4
