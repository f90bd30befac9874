//! Chunked byte transfer and comparison between endpoints.
//!
//! Two fixed-capacity buffers are allocated once per session and reused
//! for every transfer and comparison; callers must fully consume a
//! buffer's contents before the next operation overwrites it. Transfers
//! loop until the declared size is consumed; any I/O error aborts the
//! whole transfer. Comparison is byte-exact and treats a read error on
//! either side as "different" -- preserving data is the safe answer when
//! a comparison is inconclusive.

use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::error::SyncError;
use crate::logging::*;
use crate::vfs::{code, FileHandle, Vfs, VfsError, VfsOp, VfsResult};

/// Capacity of each of the two reusable transfer buffers.
pub const BUFFER_SIZE: usize = 32 * 1024;

/// Result of a content comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
	Equal,
	Different,
}

/// The session's pair of reusable transfer buffers.
pub struct TransferBuffers {
	primary: Vec<u8>,
	secondary: Vec<u8>,
}

impl TransferBuffers {
	pub fn new() -> TransferBuffers {
		TransferBuffers { primary: vec![0; BUFFER_SIZE], secondary: vec![0; BUFFER_SIZE] }
	}

	/// Copy `size` bytes from an open remote file into a local file.
	pub async fn backup(
		&mut self,
		vfs: &dyn Vfs,
		src: FileHandle,
		dst: &mut fs::File,
		size: u64,
	) -> Result<u64, SyncError> {
		let mut left = size;
		while left > 0 {
			let want = (left as usize).min(self.primary.len());
			fill_remote(vfs, src, &mut self.primary[..want]).await?;
			dst.write_all(&self.primary[..want]).await?;
			left -= want as u64;
		}
		dst.flush().await?;
		Ok(size)
	}

	/// Copy `size` bytes from a local file to an open remote file.
	pub async fn restore(
		&mut self,
		src: &mut fs::File,
		vfs: &dyn Vfs,
		dst: FileHandle,
		size: u64,
	) -> Result<u64, SyncError> {
		let mut left = size;
		while left > 0 {
			let want = (left as usize).min(self.primary.len());
			src.read_exact(&mut self.primary[..want]).await?;
			let mut offset = 0;
			while offset < want {
				let written = vfs.write(dst, &self.primary[offset..want]).await?;
				if written == 0 {
					return Err(SyncError::Vfs(VfsError::new(code::GENERIC, VfsOp::Write)));
				}
				offset += written;
			}
			left -= want as u64;
		}
		Ok(size)
	}

	/// Byte-exact comparison of an open remote file against a local file.
	pub async fn compare(
		&mut self,
		vfs: &dyn Vfs,
		remote: FileHandle,
		local: &mut fs::File,
		size: u64,
	) -> Comparison {
		let mut left = size;
		while left > 0 {
			let want = (left as usize).min(self.primary.len());
			if let Err(e) = fill_remote(vfs, remote, &mut self.primary[..want]).await {
				error!(error = %e, "read failed during comparison, assuming different");
				return Comparison::Different;
			}
			if let Err(e) = local.read_exact(&mut self.secondary[..want]).await {
				error!(error = %e, "local read failed during comparison, assuming different");
				return Comparison::Different;
			}
			if self.primary[..want] != self.secondary[..want] {
				return Comparison::Different;
			}
			left -= want as u64;
		}
		Comparison::Equal
	}
}

impl Default for TransferBuffers {
	fn default() -> Self {
		TransferBuffers::new()
	}
}

/// Fill `buf` completely from the remote handle. A zero-length read
/// mid-file means the device cut the stream short of the declared size.
async fn fill_remote(vfs: &dyn Vfs, handle: FileHandle, buf: &mut [u8]) -> VfsResult<()> {
	let mut offset = 0;
	while offset < buf.len() {
		let n = vfs.read(handle, &mut buf[offset..]).await?;
		if n == 0 {
			return Err(VfsError::new(code::GENERIC, VfsOp::Read));
		}
		offset += n;
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::vfs::testing::FakeVfs;
	use crate::vfs::{MediaClass, OpenMode};

	fn device_with_file(path: &str, data: &[u8]) -> FakeVfs {
		let vfs = FakeVfs::new();
		vfs.add_volume(2, MediaClass::RemovableCard, 1, false, true);
		vfs.add_file(2, path, data);
		vfs
	}

	#[tokio::test]
	async fn test_backup_copies_exact_bytes() {
		let payload: Vec<u8> = (0..100_000u32).map(|i| (i % 251) as u8).collect();
		let vfs = device_with_file("DCIM/big.jpg", &payload);
		let dir = tempfile::tempdir().unwrap();
		let dst_path = dir.path().join("big.jpg");

		let h = vfs.open(2, "DCIM/big.jpg", OpenMode::Read).await.unwrap();
		let mut dst = fs::File::create(&dst_path).await.unwrap();
		let mut buffers = TransferBuffers::new();
		let n = buffers.backup(&vfs, h, &mut dst, payload.len() as u64).await.unwrap();
		assert_eq!(n, payload.len() as u64);
		drop(dst);
		assert_eq!(std::fs::read(&dst_path).unwrap(), payload);
	}

	#[tokio::test]
	async fn test_restore_copies_exact_bytes() {
		let payload: Vec<u8> = (0..70_000u32).map(|i| (i % 199) as u8).collect();
		let vfs = FakeVfs::new();
		vfs.add_volume(2, MediaClass::RemovableCard, 1, false, true);
		vfs.add_dir(2, "DCIM");
		let dir = tempfile::tempdir().unwrap();
		let src_path = dir.path().join("big.jpg");
		std::fs::write(&src_path, &payload).unwrap();

		let h = vfs.open(2, "DCIM/big.jpg", OpenMode::ReadWriteCreate).await.unwrap();
		let mut src = fs::File::open(&src_path).await.unwrap();
		let mut buffers = TransferBuffers::new();
		buffers.restore(&mut src, &vfs, h, payload.len() as u64).await.unwrap();
		assert_eq!(vfs.file_data(2, "DCIM/big.jpg").unwrap(), payload);
	}

	#[tokio::test]
	async fn test_compare_equal_and_single_byte_difference() {
		let mut payload = vec![7u8; 50_000];
		let vfs = device_with_file("DCIM/a.jpg", &payload);
		let dir = tempfile::tempdir().unwrap();
		let local_path = dir.path().join("a.jpg");
		std::fs::write(&local_path, &payload).unwrap();

		let mut buffers = TransferBuffers::new();
		let h = vfs.open(2, "DCIM/a.jpg", OpenMode::Read).await.unwrap();
		let mut local = fs::File::open(&local_path).await.unwrap();
		assert_eq!(
			buffers.compare(&vfs, h, &mut local, payload.len() as u64).await,
			Comparison::Equal
		);
		vfs.close(h).await.unwrap();

		// Flip one byte near the end.
		payload[49_999] ^= 0xFF;
		std::fs::write(&local_path, &payload).unwrap();
		let h = vfs.open(2, "DCIM/a.jpg", OpenMode::Read).await.unwrap();
		let mut local = fs::File::open(&local_path).await.unwrap();
		assert_eq!(
			buffers.compare(&vfs, h, &mut local, payload.len() as u64).await,
			Comparison::Different
		);
	}

	#[tokio::test]
	async fn test_compare_read_error_is_different() {
		// Local file shorter than the declared size: the local read fails,
		// which must be treated as a difference, never as equality.
		let payload = vec![1u8; 4096];
		let vfs = device_with_file("DCIM/a.jpg", &payload);
		let dir = tempfile::tempdir().unwrap();
		let local_path = dir.path().join("a.jpg");
		std::fs::write(&local_path, &payload[..100]).unwrap();

		let mut buffers = TransferBuffers::new();
		let h = vfs.open(2, "DCIM/a.jpg", OpenMode::Read).await.unwrap();
		let mut local = fs::File::open(&local_path).await.unwrap();
		assert_eq!(
			buffers.compare(&vfs, h, &mut local, payload.len() as u64).await,
			Comparison::Different
		);
	}
}

// vim: ts=4
