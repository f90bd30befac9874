use clap::{Arg, ArgAction, Command};
use std::error::Error;
use std::path::{Path, PathBuf};

use mediasyncr::config::Config;
use mediasyncr::logging;
use mediasyncr::session::SyncSession;
use mediasyncr::vfs::local::LocalVfs;

/// Load the explicit config file, or `~/.config/mediasyncr/config.toml`
/// when present, or built-in defaults.
fn load_config(explicit: Option<&String>) -> Result<Config, Box<dyn Error>> {
	if let Some(path) = explicit {
		return Ok(Config::load(Path::new(path))?);
	}
	if let Ok(home) = std::env::var("HOME") {
		let path = PathBuf::from(home).join(".config/mediasyncr/config.toml");
		if path.exists() {
			eprintln!("rcfile: {:?}", path);
			return Ok(Config::load(&path)?);
		}
	}
	Ok(Config::default())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn Error>> {
	logging::init_tracing();

	let matches = Command::new("mediasyncr")
		.version("0.3.0")
		.about("2-way media volume sync utility")
		.subcommand_required(true)
		.arg(
			Arg::new("config")
				.short('c')
				.long("config")
				.value_name("FILE")
				.help("Configuration file"),
		)
		.subcommand(
			Command::new("sync")
				.about("Sync a mounted volume with the local mirror")
				.arg(Arg::new("mount").required(true).help("Mount point of the volume"))
				.arg(
					Arg::new("mirror")
						.long("mirror")
						.value_name("DIR")
						.help("Local mirror base directory"),
				)
				.arg(
					Arg::new("no-backup")
						.long("no-backup")
						.action(ArgAction::SetTrue)
						.help("Skip copying device files into the mirror"),
				)
				.arg(
					Arg::new("no-restore")
						.long("no-restore")
						.action(ArgAction::SetTrue)
						.help("Skip copying mirror files onto the device"),
				)
				.arg(
					Arg::new("compare-content")
						.long("compare-content")
						.action(ArgAction::SetTrue)
						.help("Byte-compare same-size files instead of trusting sizes"),
				)
				.arg(
					Arg::new("thumbnails")
						.long("thumbnails")
						.action(ArgAction::SetTrue)
						.help("Sync the thumbnail cache directory too"),
				),
		)
		.subcommand(
			Command::new("list")
				.about("List media roots without syncing")
				.arg(Arg::new("mount").required(true).help("Mount point of the volume"))
				.arg(
					Arg::new("depth")
						.long("depth")
						.value_name("N")
						.value_parser(clap::value_parser!(u32))
						.help("Recursion depth"),
				)
				.arg(
					Arg::new("json")
						.long("json")
						.action(ArgAction::SetTrue)
						.help("Emit one JSON object per entry"),
				),
		)
		.get_matches();

	let mut config = load_config(matches.get_one::<String>("config"))?;

	if let Some(matches) = matches.subcommand_matches("sync") {
		let mount =
			matches.get_one::<String>("mount").ok_or("sync: mount point argument required")?;
		if let Some(mirror) = matches.get_one::<String>("mirror") {
			config.local_root = Some(PathBuf::from(mirror));
		}
		if matches.get_flag("no-backup") {
			config.do_backup = false;
		}
		if matches.get_flag("no-restore") {
			config.do_restore = false;
		}
		if matches.get_flag("compare-content") {
			config.compare_content = true;
		}
		if matches.get_flag("thumbnails") {
			config.sync_thumbnail_dir = true;
		}

		let vfs = LocalVfs::new(mount.as_str());
		let mut session = SyncSession::new(config)?;
		let report = session.run(&vfs).await?;
		for line in &report.log_lines {
			println!("{}", line);
		}
		if !report.success() {
			std::process::exit(1);
		}
	} else if let Some(matches) = matches.subcommand_matches("list") {
		let mount =
			matches.get_one::<String>("mount").ok_or("list: mount point argument required")?;
		if let Some(depth) = matches.get_one::<u32>("depth") {
			config.list_depth = *depth;
		}
		let vfs = LocalVfs::new(mount.as_str());
		let session = SyncSession::new(config)?;
		session.list(&vfs, matches.get_flag("json")).await?;
	}

	Ok(())
}

// vim: ts=4
