//! Configuration file loading.

use std::fs;
use tempfile::TempDir;

use mediasyncr::config::{Config, SyncDirection};

#[test]
fn test_load_toml_file() {
	let tmp = TempDir::new().unwrap();
	let path = tmp.path().join("config.toml");
	fs::write(
		&path,
		r#"
localRoot = "/srv/media-mirror"
compareContent = true
preferDateModified = true
listDepth = 4

[[roots]]
path = "DCIM"

[[fileTypes]]
ext = ".jpg"

[[fileTypes]]
ext = ".mp4"
direction = "backup-only"

[[exclude]]
path = "DCIM/#Recycle"
volume = 2

[[delete]]
path = "DCIM/Thumbs.db"

[[additionalFiles]]
path = "Audio/greeting.amr"
"#,
	)
	.unwrap();

	let config = Config::load(&path).unwrap();
	assert_eq!(config.local_root.as_deref(), Some(std::path::Path::new("/srv/media-mirror")));
	assert!(config.compare_content);
	assert!(config.prefer_date_modified);
	assert_eq!(config.list_depth, 4);
	assert_eq!(config.roots.len(), 1);
	assert_eq!(config.file_types.len(), 2);
	assert_eq!(config.file_types[1].direction, SyncDirection::BackupOnly);
	assert_eq!(config.exclude[0].volume, Some(2));
	assert_eq!(config.delete[0].path, "DCIM/Thumbs.db");
	assert_eq!(config.additional_files[0].path, "Audio/greeting.amr");
	// Untouched flags keep their defaults.
	assert!(config.do_backup);
	assert!(config.do_restore);
}

#[test]
fn test_missing_file_is_an_error() {
	assert!(Config::load(std::path::Path::new("/nonexistent/config.toml")).is_err());
}

#[test]
fn test_malformed_file_is_an_error() {
	let tmp = TempDir::new().unwrap();
	let path = tmp.path().join("config.toml");
	fs::write(&path, "compareContent = \"maybe\"").unwrap();
	assert!(Config::load(&path).is_err());
}

// vim: ts=4
