//! End-to-end sync against a really mounted volume directory.

use std::fs;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

use filetime::FileTime;
use mediasyncr::config::Config;
use mediasyncr::outcome::Outcome;
use mediasyncr::session::SyncSession;
use mediasyncr::vfs::local::LocalVfs;

fn set_mtime(path: &std::path::Path, secs: u64) -> SystemTime {
	let time = SystemTime::UNIX_EPOCH + Duration::from_secs(secs);
	filetime::set_file_mtime(path, FileTime::from_system_time(time)).unwrap();
	time
}

#[tokio::test]
async fn test_mounted_card_roundtrip() {
	let card = TempDir::new().unwrap();
	fs::create_dir(card.path().join("DCIM")).unwrap();
	fs::create_dir(card.path().join("DCIM/Trip")).unwrap();
	fs::write(card.path().join("DCIM/Trip/pic.jpg"), b"on the card").unwrap();
	let pic_time = set_mtime(&card.path().join("DCIM/Trip/pic.jpg"), 1_500_000_000);

	let mirror = TempDir::new().unwrap();
	let config = Config {
		local_root: Some(mirror.path().join("Media")),
		prefer_date_modified: true,
		compare_content: true,
		..Config::default()
	};
	let vfs = LocalVfs::new(card.path());
	let mut session = SyncSession::new(config).unwrap();

	// Backup pass pulls the card file into the mirror, with its date.
	let report = session.run(&vfs).await.unwrap();
	assert_eq!(report.overall(), Outcome::Clean);
	let mirrored = mirror.path().join("Media/SDCard/Trip/pic.jpg");
	assert_eq!(fs::read(&mirrored).unwrap(), b"on the card");
	assert_eq!(fs::metadata(&mirrored).unwrap().modified().unwrap(), pic_time);

	// A file dropped into the mirror goes up on the next pass.
	let extra = mirror.path().join("Media/SDCard/extra.jpg");
	fs::write(&extra, b"from the mirror").unwrap();
	let extra_time = set_mtime(&extra, 1_600_000_000);
	let report = session.run(&vfs).await.unwrap();
	assert_eq!(report.overall(), Outcome::Clean);
	let uploaded = card.path().join("DCIM/extra.jpg");
	assert_eq!(fs::read(&uploaded).unwrap(), b"from the mirror");
	assert_eq!(fs::metadata(&uploaded).unwrap().modified().unwrap(), extra_time);

	// And a third pass changes nothing.
	let report = session.run(&vfs).await.unwrap();
	assert_eq!(report.overall(), Outcome::Clean);
	assert_eq!(fs::read(&mirrored).unwrap(), b"on the card");
	assert!(!mirror.path().join("Media/SDCard/Trip/pic_1.jpg").exists());
	assert!(!card.path().join("DCIM/extra_1.jpg").exists());
}

#[tokio::test]
async fn test_mounted_card_without_roots_reports_no_media() {
	let card = TempDir::new().unwrap();
	fs::create_dir(card.path().join("MUSIC")).unwrap();
	let mirror = TempDir::new().unwrap();
	let config = Config { local_root: Some(mirror.path().join("Media")), ..Config::default() };
	let vfs = LocalVfs::new(card.path());

	let mut session = SyncSession::new(config).unwrap();
	let report = session.run(&vfs).await.unwrap();
	assert!(!report.success());
	assert_eq!(report.overall(), Outcome::NoMedia);
}

// vim: ts=4
