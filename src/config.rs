//! Configuration for sync operations.
//!
//! One `Config` struct is the single source of truth for a run: boolean
//! behavior flags, the remote root directories to scan, the file-type
//! rules that decide what is media, and the path rules for exclusion,
//! unconditional deletion and out-of-structure extras. Built-in defaults
//! cover the common device layout; a TOML file overrides them and CLI
//! flags override the file.

use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::SyncError;
use crate::vfs::VolumeRef;

/// Thumbnail cache directory some devices keep inside media roots; not an
/// album, skipped unless explicitly enabled.
pub const THUMBNAIL_DIR: &str = "#Thumbnail";

/// Which sync directions a file type participates in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SyncDirection {
	/// Backed up from the device and restored to it.
	#[default]
	Both,
	/// Backed up only; never uploaded to the device.
	BackupOnly,
}

impl SyncDirection {
	pub fn allows_restore(self) -> bool {
		self == SyncDirection::Both
	}
}

/// A remote root directory treated as a container of albums.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RootRule {
	pub path: String,
	/// Restrict the rule to one volume; unbound applies to all.
	#[serde(default)]
	pub volume: Option<VolumeRef>,
}

/// An extension plus the directions it syncs in. Matching is
/// case-insensitive on the extension only.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileTypeRule {
	pub ext: String,
	#[serde(default)]
	pub direction: SyncDirection,
}

/// A volume-scoped remote path, used by the exclude, delete and
/// additional-files rule lists.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathRule {
	pub path: String,
	#[serde(default)]
	pub volume: Option<VolumeRef>,
}

impl PathRule {
	pub fn applies_to(&self, volume: VolumeRef) -> bool {
		self.volume.map_or(true, |v| v == volume)
	}
}

/// Unified configuration for one sync run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
	/// Base directory of the local mirror. Defaults to `$HOME/Media`,
	/// falling back to `./Media` when `HOME` is unset.
	pub local_root: Option<PathBuf>,

	/// Sync the thumbnail cache directory as if it were an album.
	pub sync_thumbnail_dir: bool,

	/// Request remote modification times instead of creation times when
	/// stamping backed-up files. Modification-time reads are unreliable on
	/// some devices.
	pub prefer_date_modified: bool,

	/// Byte-compare same-size files instead of assuming they are equal.
	pub compare_content: bool,

	/// Copy device-only files into the mirror.
	pub do_backup: bool,

	/// Copy mirror-only files onto the device.
	pub do_restore: bool,

	/// Recursion depth for the diagnostic `list` mode.
	pub list_depth: u32,

	/// Remote root directories scanned for albums.
	pub roots: Vec<RootRule>,

	/// File types that count as media.
	pub file_types: Vec<FileTypeRule>,

	/// Subtrees skipped entirely.
	pub exclude: Vec<PathRule>,

	/// Remote files deleted unconditionally at the start of each volume.
	pub delete: Vec<PathRule>,

	/// Specific files or directories synced outside the album structure.
	pub additional_files: Vec<PathRule>,
}

impl Default for Config {
	fn default() -> Self {
		Config {
			local_root: None,
			sync_thumbnail_dir: false,
			prefer_date_modified: false,
			compare_content: false,
			do_backup: true,
			do_restore: true,
			list_depth: 2,
			roots: ["Photos & Videos", "Fotos & Videos", "DCIM"]
				.iter()
				.map(|p| RootRule { path: p.to_string(), volume: None })
				.collect(),
			file_types: [".jpg", ".3gp", ".3g2", ".amr", ".qcp"]
				.iter()
				.map(|e| FileTypeRule { ext: e.to_string(), direction: SyncDirection::Both })
				.collect(),
			exclude: vec![],
			delete: vec![],
			additional_files: vec![],
		}
	}
}

impl Config {
	/// Load configuration from a TOML file.
	pub fn load(path: &Path) -> Result<Config, SyncError> {
		let text = std::fs::read_to_string(path)?;
		toml::from_str(&text).map_err(|e| SyncError::InvalidConfig {
			message: format!("{}: {}", path.display(), e),
		})
	}

	/// Resolve the local mirror base directory.
	pub fn resolve_local_root(&self) -> PathBuf {
		if let Some(root) = &self.local_root {
			return root.clone();
		}
		match std::env::var("HOME") {
			Ok(home) => PathBuf::from(home).join("Media"),
			Err(_) => PathBuf::from("Media"),
		}
	}

	/// Root rules applicable to one volume.
	pub fn roots_for(&self, volume: VolumeRef) -> impl Iterator<Item = &RootRule> {
		self.roots.iter().filter(move |r| r.volume.map_or(true, |v| v == volume))
	}

	/// Whether `name`'s extension matches a rule, honoring direction.
	/// Restore requires a rule that is not backup-only; backup accepts
	/// any matching rule.
	pub fn matches_file_type(&self, name: &str, restore: bool) -> bool {
		let ext = match name.rfind('.') {
			Some(idx) => &name[idx..],
			None => return false,
		};
		self.file_types.iter().any(|rule| {
			rule.ext.eq_ignore_ascii_case(ext) && (!restore || rule.direction.allows_restore())
		})
	}
}

/// Exclusion rules compiled into one glob set. A rule covers the named
/// path and everything beneath it.
pub struct ExcludeSet {
	set: GlobSet,
	volumes: Vec<Option<VolumeRef>>,
}

impl ExcludeSet {
	pub fn compile(rules: &[PathRule]) -> Result<ExcludeSet, SyncError> {
		let mut builder = GlobSetBuilder::new();
		let mut volumes = Vec::new();
		for rule in rules {
			let base = rule.path.trim_end_matches('/');
			for pattern in [base.to_string(), format!("{}/**", base)].iter() {
				let glob = Glob::new(pattern).map_err(|e| SyncError::InvalidConfig {
					message: format!("bad exclude pattern '{}': {}", rule.path, e),
				})?;
				builder.add(glob);
				volumes.push(rule.volume);
			}
		}
		let set = builder
			.build()
			.map_err(|e| SyncError::InvalidConfig { message: e.to_string() })?;
		Ok(ExcludeSet { set, volumes })
	}

	pub fn is_excluded(&self, volume: VolumeRef, path: &str) -> bool {
		self.set
			.matches(path)
			.into_iter()
			.any(|idx| self.volumes[idx].map_or(true, |v| v == volume))
	}
}


// vim: ts=4
