//! # mediasyncr - Media Volume Synchronizer
//!
//! mediasyncr reconciles the media directory tree on a device's storage
//! volumes with a mirror tree on the local filesystem. Every immediate
//! subdirectory of a configured root is an "album"; files existing only on
//! the device are backed up, files existing only locally are restored, and
//! same-name files that differ are preserved under a renamed copy instead
//! of being overwritten.
//!
//! The device is reached exclusively through the narrow [`vfs::Vfs`]
//! protocol trait, and the engine carries workarounds for the protocol's
//! known field defects: hidden internal volumes, corrupted enumeration
//! cursors and wrong listing counts.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use mediasyncr::config::Config;
//! use mediasyncr::session::SyncSession;
//! use mediasyncr::vfs::local::LocalVfs;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let vfs = LocalVfs::new("/mnt/card");
//!     let mut session = SyncSession::new(Config::default())?;
//!     let report = session.run(&vfs).await?;
//!     for line in &report.log_lines {
//!         println!("{}", line);
//!     }
//!     Ok(())
//! }
//! ```

pub mod album;
pub mod config;
pub mod enumerate;
pub mod error;
pub mod logging;
pub mod outcome;
pub mod session;
pub mod timestamp;
pub mod transfer;
pub mod vfs;
pub mod volume;

// Re-export commonly used types and functions
pub use config::{Config, SyncDirection};
pub use error::SyncError;
pub use outcome::Outcome;
pub use session::{SyncReport, SyncSession};
pub use vfs::Vfs;

// vim: ts=4
