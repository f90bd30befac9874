//! Storage volume discovery.
//!
//! Some devices deliberately exclude their primary internal store from the
//! native volume enumeration: the first non-hidden reference is 2, and
//! reference 1 exists but carries the hidden attribute. Discovery probes
//! reference 1 directly and prepends it when it is real, so internal
//! media gets synced along with the cards.

use crate::error::SyncError;
use crate::logging::*;
use crate::vfs::{MediaClass, Vfs, VolumeInfo, VolumeRef};

/// Cap on the number of volumes handled in one run.
pub const MAX_VOLUMES: usize = 16;

/// The volume reference some devices hide from native enumeration.
const HIDDEN_BUILTIN_REF: VolumeRef = 1;

/// One discovered volume, immutable for the rest of the run.
#[derive(Debug, Clone)]
pub struct Volume {
	pub vref: VolumeRef,
	pub info: VolumeInfo,
}

impl Volume {
	/// Name of this volume's subdirectory in the local mirror.
	pub fn local_dir_name(&self) -> String {
		match self.info.media_class {
			MediaClass::InternalFlash => "Internal".to_string(),
			MediaClass::RemovableCard => "SDCard".to_string(),
			MediaClass::Unknown => format!("Card{}", self.info.slot),
		}
	}
}

/// List accessible volume references, recovering the hidden built-in one.
///
/// A failing native enumeration is treated as zero volumes rather than an
/// error; the run only fails when the native call failed *and* no hidden
/// volume could be recovered.
pub async fn discover_volumes(vfs: &dyn Vfs) -> Result<Vec<VolumeRef>, SyncError> {
	let (mut refs, native_failed) = match vfs.enumerate_volumes(MAX_VOLUMES).await {
		Ok(refs) => (refs, false),
		Err(e) => {
			debug!(error = %e, "native volume enumeration failed; probing for hidden volume");
			(Vec::new(), true)
		}
	};
	debug!(count = refs.len(), "native volume enumeration");

	if !refs.contains(&HIDDEN_BUILTIN_REF) {
		match vfs.volume_info(HIDDEN_BUILTIN_REF).await {
			Ok(info) if info.hidden => {
				debug!("found hidden volume {}", HIDDEN_BUILTIN_REF);
				refs.insert(0, HIDDEN_BUILTIN_REF);
				if refs.len() > MAX_VOLUMES {
					error!("volumes beyond {} were discarded", MAX_VOLUMES);
					refs.truncate(MAX_VOLUMES);
				}
			}
			Ok(_) => {}
			Err(e) => debug!(error = %e, "no hidden volume {}", HIDDEN_BUILTIN_REF),
		}
	}

	if native_failed && refs.is_empty() {
		Err(SyncError::NoVolumes)
	} else {
		Ok(refs)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::vfs::testing::FakeVfs;

	#[tokio::test]
	async fn test_hidden_volume_is_prepended() {
		let vfs = FakeVfs::new();
		vfs.add_volume(1, MediaClass::InternalFlash, 0, true, false);
		vfs.add_volume(2, MediaClass::RemovableCard, 1, false, true);
		vfs.add_volume(3, MediaClass::RemovableCard, 2, false, true);

		let refs = discover_volumes(&vfs).await.unwrap();
		assert_eq!(refs, vec![1, 2, 3]);
	}

	#[tokio::test]
	async fn test_hidden_volume_alone_recovers_failed_enumeration() {
		let vfs = FakeVfs::new();
		vfs.add_volume(1, MediaClass::InternalFlash, 0, true, false);
		vfs.fail_volume_enumeration(true);

		let refs = discover_volumes(&vfs).await.unwrap();
		assert_eq!(refs, vec![1]);
	}

	#[tokio::test]
	async fn test_failed_enumeration_without_hidden_volume_is_an_error() {
		let vfs = FakeVfs::new();
		vfs.fail_volume_enumeration(true);
		assert!(discover_volumes(&vfs).await.is_err());
	}

	#[tokio::test]
	async fn test_successful_enumeration_with_zero_volumes_is_not_an_error() {
		let vfs = FakeVfs::new();
		let refs = discover_volumes(&vfs).await.unwrap();
		assert!(refs.is_empty());
	}

	#[tokio::test]
	async fn test_visible_volume_one_is_not_duplicated() {
		let vfs = FakeVfs::new();
		vfs.add_volume(1, MediaClass::InternalFlash, 0, false, true);
		let refs = discover_volumes(&vfs).await.unwrap();
		assert_eq!(refs, vec![1]);
	}

	#[test]
	fn test_local_dir_names() {
		let v = |media_class, slot| Volume {
			vref: 2,
			info: VolumeInfo { media_class, slot, hidden: false },
		};
		assert_eq!(v(MediaClass::InternalFlash, 0).local_dir_name(), "Internal");
		assert_eq!(v(MediaClass::RemovableCard, 1).local_dir_name(), "SDCard");
		assert_eq!(v(MediaClass::Unknown, 3).local_dir_name(), "Card3");
	}
}

// vim: ts=4
