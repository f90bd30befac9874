//! Volume-level sync driving and outcome aggregation.
//!
//! One `SyncSession` is one run: discover volumes, then for every
//! (root rule, volume) pair reconcile the root's albums, aggregate every
//! album outcome into a volume outcome and every volume outcome into the
//! session report. A volume failing never stops the other volumes.

use serde::Serialize;
use std::path::Path;

use crate::album::{log_vfs, remote_join, AlbumMode, AlbumSynchronizer};
use crate::config::{Config, ExcludeSet, PathRule, THUMBNAIL_DIR};
use crate::enumerate::enumerate_dir;
use crate::error::SyncError;
use crate::logging::*;
use crate::outcome::Outcome;
use crate::timestamp::{create_local_dir, local_mtime, set_local_mtime, stamp_remote};
use crate::transfer::TransferBuffers;
use crate::vfs::{code, OpenMode, Vfs, VfsResult, VolumeRef};
use crate::volume::{discover_volumes, Volume};

/// What one run did, per volume plus the host-visible log lines.
#[derive(Debug, Default)]
pub struct SyncReport {
	pub volumes: Vec<(VolumeRef, Outcome)>,
	/// At least one album directory was created on the device this run;
	/// the device's media application must be opened once before the
	/// next sync to settle its bookkeeping.
	pub created_remote_albums: bool,
	/// One-line entries for the host's sync log.
	pub log_lines: Vec<String>,
}

impl SyncReport {
	/// A run succeeds when at least one volume yielded media, even if
	/// some of it failed to sync.
	pub fn success(&self) -> bool {
		self.volumes.iter().any(|(_, o)| *o < Outcome::NoMedia)
	}

	/// Worst outcome observed across all volumes.
	pub fn overall(&self) -> Outcome {
		self.volumes.iter().fold(Outcome::Clean, |acc, (_, o)| acc.merge(*o))
	}
}

/// One sync run over one device connection.
pub struct SyncSession {
	config: Config,
	excludes: ExcludeSet,
	buffers: TransferBuffers,
}

impl SyncSession {
	pub fn new(config: Config) -> Result<SyncSession, SyncError> {
		if config.file_types.is_empty() {
			return Err(SyncError::NoFileTypes);
		}
		let excludes = ExcludeSet::compile(&config.exclude)?;
		Ok(SyncSession { config, excludes, buffers: TransferBuffers::new() })
	}

	pub fn config(&self) -> &Config {
		&self.config
	}

	/// Reconcile every volume of the connected device with the mirror.
	pub async fn run(&mut self, vfs: &dyn Vfs) -> Result<SyncReport, SyncError> {
		info!("starting media sync");
		let refs = discover_volumes(vfs).await?;
		let base = self.config.resolve_local_root();
		std::fs::create_dir_all(&base)?;
		info!(mirror = %base.display(), volumes = refs.len(), "mirror directory ready");

		let mut report = SyncReport::default();
		for vref in refs {
			let volume = match vfs.volume_info(vref).await {
				Ok(info) => Volume { vref, info },
				Err(e) => {
					// Without volume info there is no mirror directory to
					// sync into; the volume yields nothing.
					log_vfs(&e, "could not get volume info");
					report.log_lines.push(format!(
						"WARNING: could not find any media on volume {}; no media synced.",
						vref
					));
					report.volumes.push((vref, Outcome::NoMedia));
					continue;
				}
			};
			let (outcome, created) = self.sync_volume(vfs, &volume, &base).await;
			report.created_remote_albums |= created;
			match outcome {
				Outcome::NoMedia => report.log_lines.push(format!(
					"WARNING: could not find any media on volume {}; no media synced.",
					vref
				)),
				o if o.is_failure() => report.log_lines.push(format!(
					"WARNING: errors occurred on volume {}; some media may not be synced.",
					vref
				)),
				_ => {}
			}
			report.volumes.push((vref, outcome));
		}
		if !report.success() {
			report.log_lines.push("Synchronization of media was incomplete.".to_string());
		}
		if report.created_remote_albums {
			warn!(
				"new album directories were created on the device; \
				open its media application once before the next sync"
			);
			report.log_lines.push(
				"IMPORTANT: open the device's media application once before the next sync."
					.to_string(),
			);
		}
		debug!(outcome = ?report.overall(), "sync done");
		Ok(report)
	}

	async fn sync_volume(
		&mut self,
		vfs: &dyn Vfs,
		volume: &Volume,
		base: &Path,
	) -> (Outcome, bool) {
		debug!(volume = volume.vref, "searching media roots");
		let mut outcome = self.delete_pass(vfs, volume).await;
		let mut created = false;
		let mut roots_found = false;

		let vol_root = base.join(volume.local_dir_name());
		let root_paths: Vec<String> =
			self.config.roots_for(volume.vref).map(|r| r.path.clone()).collect();
		for root in &root_paths {
			if self.excludes.is_excluded(volume.vref, root) {
				continue;
			}
			let dir = match vfs.open(volume.vref, root, OpenMode::Read).await {
				Ok(h) => h,
				Err(e) => {
					debug!(root = %root, volume = volume.vref, error = %e,
						"media root not present");
					continue;
				}
			};
			roots_found = true;
			let (o, c) = self.sync_open_root(vfs, volume, dir, root, &vol_root).await;
			let _ = vfs.close(dir).await;
			outcome = outcome.merge(o);
			created |= c;
		}

		let (o, c, extras_found) = self.extras_pass(vfs, volume, &vol_root).await;
		outcome = outcome.merge(o);
		created |= c;
		roots_found |= extras_found;

		if !roots_found {
			(Outcome::NoMedia, created)
		} else {
			(outcome, created)
		}
	}

	/// Sync one opened media root: the unfiled album, then every remote
	/// album candidate, then local-only albums in restore-led mode.
	async fn sync_open_root(
		&mut self,
		vfs: &dyn Vfs,
		volume: &Volume,
		dir: crate::vfs::FileHandle,
		root: &str,
		vol_root: &Path,
	) -> (Outcome, bool) {
		let mut outcome = Outcome::Clean;
		let mut created = false;
		debug!(root = %root, volume = volume.vref, "opened media root");

		if let Err(e) = create_local_dir(vol_root) {
			error!(dir = %vol_root.display(), error = %e, "could not create local mirror root");
			return (Outcome::AlbumFailed, created);
		}

		let sync_thumbnails = self.config.sync_thumbnail_dir;
		let do_restore = self.config.do_restore;
		let mut album = AlbumSynchronizer {
			config: &self.config,
			excludes: &self.excludes,
			vfs,
			buffers: &mut self.buffers,
			volume: volume.vref,
		};

		// The root itself holds unfiled media on some devices.
		let r = album.sync(root, vol_root, None, AlbumMode::BackupLed).await;
		outcome = outcome.merge(r.outcome);
		created |= r.created_remote_dir;

		// Remote album candidates.
		let listing = match enumerate_dir(vfs, dir).await {
			Ok(listing) => {
				if listing.truncated {
					outcome = outcome.merge(Outcome::Warning);
				}
				listing
			}
			Err(e) => {
				log_vfs(&e, "could not list media root");
				return (outcome.merge(Outcome::AlbumFailed), created);
			}
		};
		for entry in &listing.entries {
			debug!(name = %entry.name, attrs = entry.attrs.0, "root entry");
			if !entry.is_directory() {
				continue;
			}
			if entry.name == THUMBNAIL_DIR && !sync_thumbnails {
				debug!("skipping thumbnail cache directory");
				continue;
			}
			let r = album.sync(root, vol_root, Some(&entry.name), AlbumMode::BackupLed).await;
			outcome = outcome.merge(r.outcome);
			created |= r.created_remote_dir;
		}

		// Local-only albums get restored, creating the remote side.
		if do_restore {
			let local_dirs = match std::fs::read_dir(vol_root) {
				Ok(rd) => rd,
				Err(e) => {
					error!(dir = %vol_root.display(), error = %e,
						"could not read local mirror root");
					return (outcome.merge(Outcome::AlbumFailed), created);
				}
			};
			for entry in local_dirs {
				let entry = match entry {
					Ok(e) => e,
					Err(e) => {
						error!(dir = %vol_root.display(), error = %e, "local listing failed");
						outcome = outcome.merge(Outcome::AlbumFailed);
						break;
					}
				};
				let name = entry.file_name().to_string_lossy().into_owned();
				let meta = match std::fs::metadata(entry.path()) {
					Ok(m) => m,
					Err(e) => {
						error!(dir = %entry.path().display(), error = %e,
							"could not read local directory status");
						outcome = outcome.merge(Outcome::AlbumFailed);
						continue;
					}
				};
				if !meta.is_dir()
					|| (name == THUMBNAIL_DIR && !sync_thumbnails)
					|| listing.contains_name(&name)
				{
					continue;
				}
				debug!(album = %name, "local-only album");
				let r = album.sync(root, vol_root, Some(&name), AlbumMode::RestoreLed).await;
				outcome = outcome.merge(r.outcome);
				created |= r.created_remote_dir;
			}
		}

		(outcome, created)
	}

	/// Unconditionally delete configured remote paths.
	async fn delete_pass(&self, vfs: &dyn Vfs, volume: &Volume) -> Outcome {
		let mut outcome = Outcome::Clean;
		for rule in self.config.delete.iter().filter(|r| r.applies_to(volume.vref)) {
			match vfs.delete(volume.vref, &rule.path).await {
				Ok(()) => info!(file = %rule.path, volume = volume.vref, "deleted remote file"),
				Err(e) if e.is(code::NOT_FOUND) => {
					debug!(file = %rule.path, "delete target not present");
				}
				Err(e) => {
					log_vfs(&e, "could not delete remote file");
					outcome = outcome.merge(Outcome::Warning);
				}
			}
		}
		outcome
	}

	/// Sync configured paths outside the album structure.
	async fn extras_pass(
		&mut self,
		vfs: &dyn Vfs,
		volume: &Volume,
		vol_root: &Path,
	) -> (Outcome, bool, bool) {
		let rules: Vec<PathRule> = self
			.config
			.additional_files
			.iter()
			.filter(|r| r.applies_to(volume.vref))
			.cloned()
			.collect();
		let mut outcome = Outcome::Clean;
		let mut created = false;
		let mut found = false;
		for rule in &rules {
			if self.excludes.is_excluded(volume.vref, &rule.path) {
				continue;
			}
			let (parent, leaf) = split_path(&rule.path);
			let local_parent =
				if parent.is_empty() { vol_root.to_path_buf() } else { vol_root.join(parent) };

			let stat = match vfs.stat(volume.vref, &rule.path).await {
				Ok(s) => s,
				Err(e) => {
					log_vfs(&e, "could not look up additional path");
					outcome = outcome.merge(Outcome::FileFailed);
					continue;
				}
			};
			let prefer_modified = self.config.prefer_date_modified;
			match stat {
				Some(entry) => {
					found = true;
					if let Err(e) = std::fs::create_dir_all(vol_root) {
						error!(dir = %vol_root.display(), error = %e,
							"could not create local mirror root");
						outcome = outcome.merge(Outcome::FileFailed);
						continue;
					}
					if let Err(e) =
						ensure_local_chain(vfs, volume.vref, prefer_modified, vol_root, parent)
							.await
					{
						error!(path = %rule.path, error = %e,
							"could not create local directories for additional path");
						outcome = outcome.merge(Outcome::FileFailed);
						continue;
					}
					let mut album = AlbumSynchronizer {
						config: &self.config,
						excludes: &self.excludes,
						vfs,
						buffers: &mut self.buffers,
						volume: volume.vref,
					};
					if entry.is_directory() {
						let r =
							album.sync(parent, &local_parent, Some(leaf), AlbumMode::BackupLed).await;
						outcome = outcome.merge(r.outcome);
						created |= r.created_remote_dir;
					} else {
						outcome =
							outcome.merge(album.backup_file(parent, &local_parent, &entry).await);
					}
				}
				None => {
					let local_full = vol_root.join(&rule.path);
					let meta = match std::fs::metadata(&local_full) {
						Ok(m) => m,
						Err(_) => {
							debug!(path = %rule.path,
								"additional path not present on either side");
							continue;
						}
					};
					if !self.config.do_restore {
						continue;
					}
					found = true;
					match ensure_remote_chain(vfs, volume.vref, vol_root, parent).await {
						Ok(chain_created) => created |= chain_created,
						Err(e) => {
							log_vfs(&e, "could not create remote directories for additional path");
							outcome = outcome.merge(Outcome::FileFailed);
							continue;
						}
					}
					let mut album = AlbumSynchronizer {
						config: &self.config,
						excludes: &self.excludes,
						vfs,
						buffers: &mut self.buffers,
						volume: volume.vref,
					};
					if meta.is_dir() {
						let r = album
							.sync(parent, &local_parent, Some(leaf), AlbumMode::RestoreLed)
							.await;
						outcome = outcome.merge(r.outcome);
						created |= r.created_remote_dir;
					} else {
						outcome = outcome
							.merge(album.restore_file(&local_parent, parent, leaf, meta.len()).await);
					}
				}
			}
		}
		(outcome, created, found)
	}

	/// Diagnostic list-only mode: walk the configured roots on every
	/// volume down to the configured depth, mutating nothing.
	pub async fn list(&self, vfs: &dyn Vfs, json: bool) -> Result<(), SyncError> {
		let refs = discover_volumes(vfs).await?;
		for vref in refs {
			match vfs.volume_info(vref).await {
				Ok(info) => {
					if !json {
						println!(
							"volume {} ({:?}, slot {}{})",
							vref,
							info.media_class,
							info.slot,
							if info.hidden { ", hidden" } else { "" }
						);
					}
				}
				Err(e) => {
					log_vfs(&e, "could not get volume info");
					continue;
				}
			}
			let roots: Vec<String> = self.config.roots_for(vref).map(|r| r.path.clone()).collect();
			for root in &roots {
				self.list_tree(vfs, vref, root, json).await;
			}
		}
		Ok(())
	}

	async fn list_tree(&self, vfs: &dyn Vfs, volume: VolumeRef, root: &str, json: bool) {
		// Iterative walk; depth is bounded by configuration, not by the
		// directory structure.
		let mut stack = vec![(root.to_string(), 0u32)];
		while let Some((path, depth)) = stack.pop() {
			let dir = match vfs.open(volume, &path, OpenMode::Read).await {
				Ok(h) => h,
				Err(e) => {
					debug!(dir = %path, volume, error = %e, "not listable");
					continue;
				}
			};
			let listing = match enumerate_dir(vfs, dir).await {
				Ok(l) => l,
				Err(e) => {
					log_vfs(&e, "could not list directory");
					let _ = vfs.close(dir).await;
					continue;
				}
			};
			let _ = vfs.close(dir).await;
			for entry in &listing.entries {
				let full = remote_join(&path, &entry.name);
				if json {
					let record = ListRecord {
						volume,
						path: &full,
						directory: entry.is_directory(),
						size: entry.size,
						created: epoch_secs(entry.created),
						modified: epoch_secs(entry.modified),
					};
					match serde_json::to_string(&record) {
						Ok(line) => println!("{}", line),
						Err(e) => error!(error = %e, "could not encode listing entry"),
					}
				} else {
					println!(
						"{:>9}  {}{}",
						entry.size,
						full,
						if entry.is_directory() { "/" } else { "" }
					);
				}
				if entry.is_directory() && depth + 1 < self.config.list_depth {
					stack.push((full, depth + 1));
				}
			}
		}
	}
}

#[derive(Serialize)]
struct ListRecord<'a> {
	volume: VolumeRef,
	path: &'a str,
	directory: bool,
	size: u64,
	created: Option<u64>,
	modified: Option<u64>,
}

fn epoch_secs(time: Option<std::time::SystemTime>) -> Option<u64> {
	time.and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok()).map(|d| d.as_secs())
}

fn split_path(path: &str) -> (&str, &str) {
	match path.rfind('/') {
		Some(idx) => (&path[..idx], &path[idx + 1..]),
		None => ("", path),
	}
}

/// Create the local directories mirroring `rel` under `base`, one segment
/// at a time, copying each newly created directory's date from its remote
/// counterpart.
async fn ensure_local_chain(
	vfs: &dyn Vfs,
	volume: VolumeRef,
	prefer_modified: bool,
	base: &Path,
	rel: &str,
) -> std::io::Result<()> {
	if rel.is_empty() {
		return Ok(());
	}
	let mut local = base.to_path_buf();
	let mut remote = String::new();
	for segment in rel.split('/') {
		local.push(segment);
		if !remote.is_empty() {
			remote.push('/');
		}
		remote.push_str(segment);
		if create_local_dir(&local)? {
			if let Ok(Some(entry)) = vfs.stat(volume, &remote).await {
				let time = if prefer_modified {
					entry.modified.or(entry.created)
				} else {
					entry.created.or(entry.modified)
				};
				if let Some(time) = time {
					let _ = set_local_mtime(&local, time);
				}
			}
		}
	}
	Ok(())
}

/// Create the remote directories for `rel`, one segment at a time,
/// stamping each newly created one with its local counterpart's date.
/// Returns whether any directory was actually created.
async fn ensure_remote_chain(
	vfs: &dyn Vfs,
	volume: VolumeRef,
	base_local: &Path,
	rel: &str,
) -> VfsResult<bool> {
	if rel.is_empty() {
		return Ok(false);
	}
	let mut created = false;
	let mut remote = String::new();
	let mut local = base_local.to_path_buf();
	for segment in rel.split('/') {
		local.push(segment);
		if !remote.is_empty() {
			remote.push('/');
		}
		remote.push_str(segment);
		match vfs.mkdir(volume, &remote).await {
			Ok(()) => {
				created = true;
				if let Ok(time) = local_mtime(&local) {
					if let Ok(handle) = vfs.open(volume, &remote, OpenMode::ReadWrite).await {
						let _ = stamp_remote(vfs, handle, time).await;
						let _ = vfs.close(handle).await;
					}
				}
			}
			Err(e) if e.is(code::ALREADY_EXISTS) => {}
			Err(e) => return Err(e),
		}
	}
	Ok(created)
}

// vim: ts=4
