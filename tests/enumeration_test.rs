//! Directory enumeration against misbehaving devices.

use mediasyncr::enumerate::{enumerate_dir, MAX_DIR_ITEMS};
use mediasyncr::vfs::testing::{EnumQuirk, FakeVfs};
use mediasyncr::vfs::{MediaClass, OpenMode, Vfs};

const VOLUME: u32 = 2;

fn device_with_album(files: usize) -> FakeVfs {
	let vfs = FakeVfs::new();
	vfs.add_volume(VOLUME, MediaClass::RemovableCard, 1, false, true);
	vfs.add_dir(VOLUME, "DCIM/Album");
	for i in 0..files {
		vfs.add_file(VOLUME, &format!("DCIM/Album/img{:04}.jpg", i), b"x");
	}
	vfs
}

async fn listed_names(vfs: &FakeVfs) -> Vec<String> {
	let dir = vfs.open(VOLUME, "DCIM/Album", OpenMode::Read).await.unwrap();
	let listing = enumerate_dir(vfs, dir).await.unwrap();
	vfs.close(dir).await.unwrap();
	let mut names: Vec<String> = listing.entries.iter().map(|e| e.name.clone()).collect();
	names.sort();
	names
}

#[tokio::test]
async fn test_well_behaved_device_lists_everything() {
	let vfs = device_with_album(37);
	let names = listed_names(&vfs).await;
	assert_eq!(names.len(), 37);
	assert_eq!(names[0], "img0000.jpg");
	assert_eq!(names[36], "img0036.jpg");
}

#[tokio::test]
async fn test_empty_directory() {
	let vfs = device_with_album(0);
	assert!(listed_names(&vfs).await.is_empty());
}

#[tokio::test]
async fn test_corrupted_cursor_gives_same_listing_as_well_behaved() {
	let honest = device_with_album(37);
	let expected = listed_names(&honest).await;

	let broken = device_with_album(37);
	broken.set_quirk(EnumQuirk::CorruptCursor);
	let got = listed_names(&broken).await;

	assert_eq!(got, expected);
}

#[tokio::test]
async fn test_corrupted_cursor_terminates_within_round_cap() {
	let vfs = device_with_album(10);
	vfs.set_quirk(EnumQuirk::CorruptCursor);
	let before = vfs.ops().len();
	let _ = listed_names(&vfs).await;
	let calls = vfs.ops().iter().skip(before).filter(|op| op.starts_with("enumerate ")).count();
	assert!(calls <= 16, "{} listing calls", calls);
}

#[tokio::test]
async fn test_under_reporting_device_still_terminates() {
	let vfs = device_with_album(50);
	vfs.set_quirk(EnumQuirk::UnderReport(3));
	// The count lies, so completeness cannot be guaranteed; termination
	// and a usable partial listing can.
	let names = listed_names(&vfs).await;
	assert!(!names.is_empty());
	assert!(names.len() <= 50);
}

#[tokio::test]
async fn test_oversized_directory_is_truncated_not_fatal() {
	let vfs = device_with_album(MAX_DIR_ITEMS + 10);
	let dir = vfs.open(VOLUME, "DCIM/Album", OpenMode::Read).await.unwrap();
	let listing = enumerate_dir(&vfs, dir).await.unwrap();
	assert!(listing.truncated);
	assert!(!listing.entries.is_empty());
	assert!(listing.entries.len() <= MAX_DIR_ITEMS);
}

// vim: ts=4
