//! Volume-level outcomes, host log lines and the rule passes.

use std::fs;
use tempfile::TempDir;

use mediasyncr::config::{Config, PathRule};
use mediasyncr::outcome::Outcome;
use mediasyncr::session::SyncSession;
use mediasyncr::vfs::testing::FakeVfs;
use mediasyncr::vfs::MediaClass;

fn mirror_config(tmp: &TempDir) -> Config {
	Config { local_root: Some(tmp.path().join("Media")), ..Config::default() }
}

#[tokio::test]
async fn test_volume_without_media_roots_reports_no_media() {
	let vfs = FakeVfs::new();
	vfs.add_volume(2, MediaClass::RemovableCard, 1, false, true);
	vfs.add_dir(2, "SomethingElse");
	let tmp = TempDir::new().unwrap();

	let mut session = SyncSession::new(mirror_config(&tmp)).unwrap();
	let report = session.run(&vfs).await.unwrap();

	assert_eq!(report.volumes, vec![(2, Outcome::NoMedia)]);
	assert!(!report.success());
	assert!(report.log_lines.iter().any(|l| l.contains("could not find any media on volume 2")));
	assert!(report
		.log_lines
		.iter()
		.any(|l| l.contains("Synchronization of media was incomplete.")));
}

#[tokio::test]
async fn test_one_good_volume_makes_the_run_succeed() {
	let vfs = FakeVfs::new();
	vfs.add_volume(1, MediaClass::InternalFlash, 0, true, false);
	vfs.add_volume(2, MediaClass::RemovableCard, 1, false, true);
	vfs.add_file(2, "DCIM/pic.jpg", b"pic");
	// Hidden internal volume 1 has no media roots at all.
	let tmp = TempDir::new().unwrap();

	let mut session = SyncSession::new(mirror_config(&tmp)).unwrap();
	let report = session.run(&vfs).await.unwrap();

	// Discovery put the hidden volume first.
	assert_eq!(report.volumes, vec![(1, Outcome::NoMedia), (2, Outcome::Clean)]);
	assert!(report.success());
	assert!(report.log_lines.iter().any(|l| l.contains("volume 1")));
	assert!(report
		.log_lines
		.iter()
		.all(|l| !l.contains("Synchronization of media was incomplete.")));
}

#[tokio::test]
async fn test_no_file_types_is_a_setup_error() {
	let mut config = Config::default();
	config.file_types.clear();
	assert!(SyncSession::new(config).is_err());
}

#[tokio::test]
async fn test_no_volumes_is_a_setup_error() {
	let vfs = FakeVfs::new();
	vfs.fail_volume_enumeration(true);
	let tmp = TempDir::new().unwrap();
	let mut session = SyncSession::new(mirror_config(&tmp)).unwrap();
	assert!(session.run(&vfs).await.is_err());
}

#[tokio::test]
async fn test_delete_rules_remove_remote_files() {
	let vfs = FakeVfs::new();
	vfs.add_volume(2, MediaClass::RemovableCard, 1, false, true);
	vfs.add_file(2, "DCIM/pic.jpg", b"pic");
	vfs.add_file(2, "DCIM/stale.jpg", b"stale");
	let tmp = TempDir::new().unwrap();
	let mut config = mirror_config(&tmp);
	config.delete = vec![
		PathRule { path: "DCIM/stale.jpg".to_string(), volume: None },
		// A missing target is not an error.
		PathRule { path: "DCIM/nothere.jpg".to_string(), volume: None },
	];

	let mut session = SyncSession::new(config).unwrap();
	let report = session.run(&vfs).await.unwrap();

	assert_eq!(report.overall(), Outcome::Clean);
	assert!(!vfs.has_path(2, "DCIM/stale.jpg"));
	// Deleted before the backup pass, so no mirror copy appeared.
	assert!(!tmp.path().join("Media/SDCard/stale.jpg").exists());
}

#[tokio::test]
async fn test_delete_rules_honor_volume_affinity() {
	let vfs = FakeVfs::new();
	vfs.add_volume(2, MediaClass::RemovableCard, 1, false, true);
	vfs.add_file(2, "DCIM/keep.jpg", b"keep");
	let tmp = TempDir::new().unwrap();
	let mut config = mirror_config(&tmp);
	config.delete = vec![PathRule { path: "DCIM/keep.jpg".to_string(), volume: Some(7) }];

	let mut session = SyncSession::new(config).unwrap();
	session.run(&vfs).await.unwrap();
	assert!(vfs.has_path(2, "DCIM/keep.jpg"));
}

#[tokio::test]
async fn test_additional_file_is_backed_up_from_outside_the_roots() {
	let vfs = FakeVfs::new();
	vfs.add_volume(2, MediaClass::RemovableCard, 1, false, true);
	vfs.add_file(2, "DCIM/pic.jpg", b"pic");
	vfs.add_file(2, "Extras/special.jpg", b"special");
	let tmp = TempDir::new().unwrap();
	let mut config = mirror_config(&tmp);
	config.additional_files = vec![PathRule { path: "Extras/special.jpg".to_string(), volume: None }];

	let mut session = SyncSession::new(config).unwrap();
	let report = session.run(&vfs).await.unwrap();

	assert_eq!(report.overall(), Outcome::Clean);
	assert_eq!(
		fs::read(tmp.path().join("Media/SDCard/Extras/special.jpg")).unwrap(),
		b"special"
	);
}

#[tokio::test]
async fn test_additional_local_path_is_restored_with_directory_chain() {
	let vfs = FakeVfs::new();
	vfs.add_volume(2, MediaClass::RemovableCard, 1, false, true);
	vfs.add_file(2, "DCIM/pic.jpg", b"pic");
	let tmp = TempDir::new().unwrap();
	let mut config = mirror_config(&tmp);
	config.additional_files = vec![PathRule { path: "Notes/memo.jpg".to_string(), volume: None }];

	let notes = tmp.path().join("Media/SDCard/Notes");
	fs::create_dir_all(&notes).unwrap();
	fs::write(notes.join("memo.jpg"), b"memo").unwrap();

	let mut session = SyncSession::new(config).unwrap();
	let report = session.run(&vfs).await.unwrap();

	assert_eq!(report.overall(), Outcome::Clean);
	assert!(vfs.has_path(2, "Notes"));
	assert_eq!(vfs.file_data(2, "Notes/memo.jpg").unwrap(), b"memo");
	// Directories created on the device count as the destabilizing case.
	assert!(report.created_remote_albums);
}

#[tokio::test]
async fn test_volume_scoped_roots_only_apply_to_their_volume() {
	let vfs = FakeVfs::new();
	vfs.add_volume(2, MediaClass::RemovableCard, 1, false, true);
	vfs.add_volume(3, MediaClass::RemovableCard, 2, false, true);
	vfs.add_file(2, "Special/pic.jpg", b"two");
	vfs.add_file(3, "Special/pic.jpg", b"three");
	let tmp = TempDir::new().unwrap();
	let mut config = mirror_config(&tmp);
	config.roots = vec![mediasyncr::config::RootRule {
		path: "Special".to_string(),
		volume: Some(2),
	}];

	let mut session = SyncSession::new(config).unwrap();
	let report = session.run(&vfs).await.unwrap();

	// Volume 3 has the directory, but no rule applies to it.
	assert_eq!(report.volumes, vec![(2, Outcome::Clean), (3, Outcome::NoMedia)]);
	assert!(tmp.path().join("Media/SDCard/pic.jpg").exists());
}

// vim: ts=4
