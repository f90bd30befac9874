//! Robust remote directory enumeration.
//!
//! The protocol's listing call takes a requested batch size and an opaque
//! cursor, and misbehaves in the field: it corrupts the cursor to
//! out-of-range values and under-reports item counts with no reliable
//! "more data" signal. Re-reading from the start with a doubling batch
//! size sidesteps both defects: the cursor is reset before every call (a
//! returned cursor is never trusted), and a call that returns fewer items
//! than requested proves the whole directory was seen. A hard round cap
//! guarantees termination even under pathological responses.

use crate::logging::*;
use crate::vfs::{Cursor, DirEntry, FileHandle, Vfs, VfsResult};

/// Initial requested batch size.
pub const MIN_DIR_ITEMS: usize = 2;
/// Upper bound on the size of one directory listing.
pub const MAX_DIR_ITEMS: usize = 1024;
/// Hard cap on listing rounds, so enumeration terminates no matter what
/// the device answers.
pub const MAX_ENUM_ROUNDS: u32 = 16;

/// A complete (or deliberately truncated) directory listing.
#[derive(Debug, Clone, Default)]
pub struct Listing {
	pub entries: Vec<DirEntry>,
	/// Set when the listing hit [`MAX_DIR_ITEMS`] or [`MAX_ENUM_ROUNDS`]
	/// and may be missing entries.
	pub truncated: bool,
}

impl Listing {
	pub fn empty() -> Listing {
		Listing::default()
	}

	pub fn find(&self, name: &str) -> Option<&DirEntry> {
		self.entries.iter().find(|e| e.name == name)
	}

	pub fn contains_name(&self, name: &str) -> bool {
		self.find(name).is_some()
	}
}

/// List every entry of an open remote directory.
///
/// Errors are returned to the caller unclassified; how severe a failed
/// listing is depends on whether the directory is a media root or an
/// album.
pub async fn enumerate_dir(vfs: &dyn Vfs, dir: FileHandle) -> VfsResult<Listing> {
	let mut want = MIN_DIR_ITEMS;
	let mut entries: Vec<DirEntry> = Vec::new();

	for round in 0..MAX_ENUM_ROUNDS {
		// Never resume from a returned cursor; it may be garbage.
		let mut cursor = Cursor::START;
		let batch = vfs.enumerate(dir, &mut cursor, want).await?;
		debug!(
			round,
			requested = want,
			returned = batch.len(),
			cursor = cursor.0,
			"directory listing round"
		);
		let complete = batch.len() < want;
		entries = batch;
		if complete {
			return Ok(Listing { entries, truncated: false });
		}
		if want * 2 > MAX_DIR_ITEMS {
			warn!(
				items = entries.len(),
				limit = MAX_DIR_ITEMS,
				"directory too large to list completely; using truncated listing"
			);
			return Ok(Listing { entries, truncated: true });
		}
		want *= 2;
	}

	warn!(
		rounds = MAX_ENUM_ROUNDS,
		items = entries.len(),
		"directory listing did not settle; using last listing"
	);
	Ok(Listing { entries, truncated: true })
}

// vim: ts=4
