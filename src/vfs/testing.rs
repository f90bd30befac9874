//! Scriptable in-memory device for the test suite.
//!
//! `FakeVfs` models a multi-volume device as nested path maps and lets a
//! test dial in the protocol misbehavior the engine has to survive:
//! corrupted enumeration cursors, under-reported item counts, failing
//! native volume enumeration, and hidden volumes. Every protocol call is
//! recorded in an operation log so tests can assert what was *not*
//! touched.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;

use super::error::{code, VfsError, VfsOp, VfsResult};
use super::{
	Cursor, DateKind, DirEntry, FileAttrs, FileHandle, MediaClass, OpenMode, SeekOrigin, Vfs,
	VolumeInfo, VolumeRef,
};

/// Deterministic default timestamp for nodes created without one.
pub fn default_time() -> SystemTime {
	SystemTime::UNIX_EPOCH + Duration::from_secs(1_200_000_000)
}

/// How the fake answers directory-enumeration calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumQuirk {
	/// Honest cursor and counts.
	WellBehaved,
	/// Entries are served, but the returned cursor is out-of-range
	/// garbage, as misbehaving firmware produces.
	CorruptCursor,
	/// At most this many entries come back per call, with no signal that
	/// more exist.
	UnderReport(usize),
}

#[derive(Clone)]
enum Node {
	Dir { created: SystemTime, modified: SystemTime },
	File { data: Vec<u8>, attrs: FileAttrs, created: SystemTime, modified: SystemTime },
}

struct FakeVolume {
	info: VolumeInfo,
	/// Whether native volume enumeration reports this volume.
	listed: bool,
	nodes: BTreeMap<String, Node>,
}

struct OpenHandle {
	volume: VolumeRef,
	path: String,
	pos: usize,
}

struct DeviceState {
	volumes: BTreeMap<VolumeRef, FakeVolume>,
	handles: HashMap<u32, OpenHandle>,
	next_handle: u32,
	quirk: EnumQuirk,
	volume_enumeration_fails: bool,
	modified_reads_return_created: bool,
	ops: Vec<String>,
}

pub struct FakeVfs {
	state: Mutex<DeviceState>,
}

impl FakeVfs {
	pub fn new() -> FakeVfs {
		FakeVfs {
			state: Mutex::new(DeviceState {
				volumes: BTreeMap::new(),
				handles: HashMap::new(),
				next_handle: 1,
				quirk: EnumQuirk::WellBehaved,
				volume_enumeration_fails: false,
				modified_reads_return_created: false,
				ops: Vec::new(),
			}),
		}
	}

	pub fn add_volume(
		&self,
		volume: VolumeRef,
		media_class: MediaClass,
		slot: u32,
		hidden: bool,
		listed: bool,
	) {
		let mut state = self.state.lock().unwrap();
		state.volumes.insert(
			volume,
			FakeVolume {
				info: VolumeInfo { media_class, slot, hidden },
				listed,
				nodes: BTreeMap::new(),
			},
		);
	}

	/// Create a directory node, including missing parents.
	pub fn add_dir(&self, volume: VolumeRef, path: &str) {
		let mut state = self.state.lock().unwrap();
		let vol = state.volumes.get_mut(&volume).expect("unknown fake volume");
		let mut prefix = String::new();
		for segment in path.split('/') {
			if !prefix.is_empty() {
				prefix.push('/');
			}
			prefix.push_str(segment);
			vol.nodes.entry(prefix.clone()).or_insert(Node::Dir {
				created: default_time(),
				modified: default_time(),
			});
		}
	}

	pub fn add_file(&self, volume: VolumeRef, path: &str, data: &[u8]) {
		self.add_file_with_attrs(volume, path, data, FileAttrs::default());
	}

	pub fn add_file_with_attrs(
		&self,
		volume: VolumeRef,
		path: &str,
		data: &[u8],
		attrs: FileAttrs,
	) {
		if let Some(parent) = parent_of(path) {
			self.add_dir(volume, parent);
		}
		let mut state = self.state.lock().unwrap();
		let vol = state.volumes.get_mut(&volume).expect("unknown fake volume");
		vol.nodes.insert(
			path.to_string(),
			Node::File {
				data: data.to_vec(),
				attrs,
				created: default_time(),
				modified: default_time(),
			},
		);
	}

	pub fn set_quirk(&self, quirk: EnumQuirk) {
		self.state.lock().unwrap().quirk = quirk;
	}

	pub fn fail_volume_enumeration(&self, fail: bool) {
		self.state.lock().unwrap().volume_enumeration_fails = fail;
	}

	/// Model the device quirk where modification-time reads answer with
	/// the creation time instead.
	pub fn return_created_for_modified(&self, broken: bool) {
		self.state.lock().unwrap().modified_reads_return_created = broken;
	}

	pub fn set_node_times(
		&self,
		volume: VolumeRef,
		path: &str,
		created: SystemTime,
		modified: SystemTime,
	) {
		let mut state = self.state.lock().unwrap();
		let vol = state.volumes.get_mut(&volume).expect("unknown fake volume");
		match vol.nodes.get_mut(path) {
			Some(Node::File { created: c, modified: m, .. })
			| Some(Node::Dir { created: c, modified: m }) => {
				*c = created;
				*m = modified;
			}
			None => panic!("no such fake node: {}", path),
		}
	}

	pub fn file_data(&self, volume: VolumeRef, path: &str) -> Option<Vec<u8>> {
		let state = self.state.lock().unwrap();
		match state.volumes.get(&volume)?.nodes.get(path) {
			Some(Node::File { data, .. }) => Some(data.clone()),
			_ => None,
		}
	}

	pub fn has_path(&self, volume: VolumeRef, path: &str) -> bool {
		let state = self.state.lock().unwrap();
		state.volumes.get(&volume).map(|v| v.nodes.contains_key(path)).unwrap_or(false)
	}

	pub fn node_times(&self, volume: VolumeRef, path: &str) -> Option<(SystemTime, SystemTime)> {
		let state = self.state.lock().unwrap();
		match state.volumes.get(&volume)?.nodes.get(path) {
			Some(Node::File { created, modified, .. }) => Some((*created, *modified)),
			Some(Node::Dir { created, modified }) => Some((*created, *modified)),
			None => None,
		}
	}

	/// Every protocol call so far, as "<op> <volume>:<path>" lines.
	pub fn ops(&self) -> Vec<String> {
		self.state.lock().unwrap().ops.clone()
	}
}

impl Default for FakeVfs {
	fn default() -> Self {
		FakeVfs::new()
	}
}

fn parent_of(path: &str) -> Option<&str> {
	path.rfind('/').map(|idx| &path[..idx])
}

fn children(nodes: &BTreeMap<String, Node>, dir: &str) -> Vec<DirEntry> {
	let prefix = if dir.is_empty() { String::new() } else { format!("{}/", dir) };
	nodes
		.iter()
		.filter(|(path, _)| {
			path.starts_with(&prefix)
				&& path.len() > prefix.len()
				&& !path[prefix.len()..].contains('/')
		})
		.map(|(path, node)| entry_for(&path[prefix.len()..], node))
		.collect()
}

fn entry_for(name: &str, node: &Node) -> DirEntry {
	match node {
		Node::Dir { created, modified } => DirEntry {
			name: name.to_string(),
			attrs: FileAttrs(FileAttrs::DIRECTORY),
			size: 0,
			created: Some(*created),
			modified: Some(*modified),
		},
		Node::File { data, attrs, created, modified } => DirEntry {
			name: name.to_string(),
			attrs: *attrs,
			size: data.len() as u64,
			created: Some(*created),
			modified: Some(*modified),
		},
	}
}

impl DeviceState {
	fn log(&mut self, op: &str, volume: VolumeRef, path: &str) {
		self.ops.push(format!("{} {}:{}", op, volume, path));
	}

	fn volume(&self, volume: VolumeRef, op: VfsOp) -> VfsResult<&FakeVolume> {
		self.volumes
			.get(&volume)
			.ok_or_else(|| VfsError::new(code::BAD_VOLUME, op).with_volume(volume))
	}

	fn handle_target(&self, handle: FileHandle, op: VfsOp) -> VfsResult<(VolumeRef, String)> {
		match self.handles.get(&handle.0) {
			Some(h) => Ok((h.volume, h.path.clone())),
			None => Err(VfsError::new(code::GENERIC, op)),
		}
	}
}

#[async_trait]
impl Vfs for FakeVfs {
	async fn enumerate_volumes(&self, max: usize) -> VfsResult<Vec<VolumeRef>> {
		let mut state = self.state.lock().unwrap();
		state.log("enumerate-volumes", 0, "");
		if state.volume_enumeration_fails {
			return Err(VfsError::new(code::GENERIC, VfsOp::EnumerateVolumes));
		}
		Ok(state
			.volumes
			.iter()
			.filter(|(_, v)| v.listed)
			.map(|(vref, _)| *vref)
			.take(max)
			.collect())
	}

	async fn volume_info(&self, volume: VolumeRef) -> VfsResult<VolumeInfo> {
		let mut state = self.state.lock().unwrap();
		state.log("volume-info", volume, "");
		state.volume(volume, VfsOp::VolumeInfo).map(|v| v.info.clone())
	}

	async fn open(&self, volume: VolumeRef, path: &str, mode: OpenMode) -> VfsResult<FileHandle> {
		let mut state = self.state.lock().unwrap();
		state.log("open", volume, path);
		let exists = {
			let vol = state.volume(volume, VfsOp::Open)?;
			vol.nodes.contains_key(path)
		};
		if !exists {
			if mode != OpenMode::ReadWriteCreate {
				return Err(VfsError::new(code::NOT_FOUND, VfsOp::Open)
					.with_path(path)
					.with_volume(volume));
			}
			let parent_ok = match parent_of(path) {
				Some(parent) => {
					matches!(state.volumes[&volume].nodes.get(parent), Some(Node::Dir { .. }))
				}
				None => true,
			};
			if !parent_ok {
				return Err(VfsError::new(code::NOT_FOUND, VfsOp::Open)
					.with_path(path)
					.with_volume(volume));
			}
			let vol = state.volumes.get_mut(&volume).unwrap();
			vol.nodes.insert(
				path.to_string(),
				Node::File {
					data: Vec::new(),
					attrs: FileAttrs::default(),
					created: default_time(),
					modified: default_time(),
				},
			);
		}
		let id = state.next_handle;
		state.next_handle += 1;
		state.handles.insert(id, OpenHandle { volume, path: path.to_string(), pos: 0 });
		Ok(FileHandle(id))
	}

	async fn close(&self, handle: FileHandle) -> VfsResult<()> {
		let mut state = self.state.lock().unwrap();
		state
			.handles
			.remove(&handle.0)
			.map(|_| ())
			.ok_or_else(|| VfsError::new(code::GENERIC, VfsOp::Close))
	}

	async fn read(&self, handle: FileHandle, buf: &mut [u8]) -> VfsResult<usize> {
		let mut state = self.state.lock().unwrap();
		let (volume, path) = state.handle_target(handle, VfsOp::Read)?;
		let (n, data_at_pos) = {
			let pos = state.handles[&handle.0].pos;
			match state.volumes[&volume].nodes.get(&path) {
				Some(Node::File { data, .. }) => {
					let n = buf.len().min(data.len().saturating_sub(pos));
					(n, data[pos..pos + n].to_vec())
				}
				_ => return Err(VfsError::new(code::GENERIC, VfsOp::Read).with_path(&path)),
			}
		};
		buf[..n].copy_from_slice(&data_at_pos);
		state.handles.get_mut(&handle.0).unwrap().pos += n;
		Ok(n)
	}

	async fn write(&self, handle: FileHandle, buf: &[u8]) -> VfsResult<usize> {
		let mut state = self.state.lock().unwrap();
		let (volume, path) = state.handle_target(handle, VfsOp::Write)?;
		let pos = state.handles[&handle.0].pos;
		match state.volumes.get_mut(&volume).and_then(|v| v.nodes.get_mut(&path)) {
			Some(Node::File { data, .. }) => {
				if data.len() < pos + buf.len() {
					data.resize(pos + buf.len(), 0);
				}
				data[pos..pos + buf.len()].copy_from_slice(buf);
			}
			_ => return Err(VfsError::new(code::GENERIC, VfsOp::Write).with_path(&path)),
		}
		state.handles.get_mut(&handle.0).unwrap().pos += buf.len();
		Ok(buf.len())
	}

	async fn seek(&self, handle: FileHandle, origin: SeekOrigin, offset: i64) -> VfsResult<()> {
		let mut state = self.state.lock().unwrap();
		let (volume, path) = state.handle_target(handle, VfsOp::Seek)?;
		let len = match state.volumes[&volume].nodes.get(&path) {
			Some(Node::File { data, .. }) => data.len() as i64,
			_ => 0,
		};
		let pos = state.handles[&handle.0].pos as i64;
		let new = match origin {
			SeekOrigin::Start => offset,
			SeekOrigin::Current => pos + offset,
			SeekOrigin::End => len + offset,
		};
		if new < 0 {
			return Err(VfsError::new(code::GENERIC, VfsOp::Seek));
		}
		state.handles.get_mut(&handle.0).unwrap().pos = new as usize;
		Ok(())
	}

	async fn enumerate(
		&self,
		handle: FileHandle,
		cursor: &mut Cursor,
		max: usize,
	) -> VfsResult<Vec<DirEntry>> {
		let mut state = self.state.lock().unwrap();
		let (volume, path) = state.handle_target(handle, VfsOp::Enumerate)?;
		state.log("enumerate", volume, &path);
		let all = {
			let vol = state.volume(volume, VfsOp::Enumerate)?;
			if !path.is_empty() && !matches!(vol.nodes.get(&path), Some(Node::Dir { .. })) {
				return Err(VfsError::new(code::GENERIC, VfsOp::Enumerate).with_path(&path));
			}
			children(&vol.nodes, &path)
		};
		match state.quirk {
			EnumQuirk::WellBehaved => {
				let start = (cursor.0 as usize).min(all.len());
				let end = (start + max).min(all.len());
				*cursor = Cursor(end as u32);
				Ok(all[start..end].to_vec())
			}
			EnumQuirk::CorruptCursor => {
				// Entries come back from the start of the directory, but
				// the cursor is trashed with an out-of-range value.
				let end = max.min(all.len());
				*cursor = Cursor(1888);
				Ok(all[..end].to_vec())
			}
			EnumQuirk::UnderReport(limit) => {
				let start = (cursor.0 as usize).min(all.len());
				let end = (start + max.min(limit)).min(all.len());
				*cursor = Cursor(end as u32);
				Ok(all[start..end].to_vec())
			}
		}
	}

	async fn get_date(&self, handle: FileHandle, kind: DateKind) -> VfsResult<SystemTime> {
		let state = self.state.lock().unwrap();
		let (volume, path) = state.handle_target(handle, VfsOp::GetDate)?;
		let (created, modified) = match state.volumes[&volume].nodes.get(&path) {
			Some(Node::File { created, modified, .. }) => (*created, *modified),
			Some(Node::Dir { created, modified }) => (*created, *modified),
			None => return Err(VfsError::new(code::NOT_FOUND, VfsOp::GetDate).with_path(&path)),
		};
		Ok(match kind {
			DateKind::Created => created,
			DateKind::Modified if state.modified_reads_return_created => created,
			DateKind::Modified => modified,
		})
	}

	async fn set_date(
		&self,
		handle: FileHandle,
		kind: DateKind,
		time: SystemTime,
	) -> VfsResult<()> {
		let mut state = self.state.lock().unwrap();
		let (volume, path) = state.handle_target(handle, VfsOp::SetDate)?;
		match state.volumes.get_mut(&volume).and_then(|v| v.nodes.get_mut(&path)) {
			Some(Node::File { created, modified, .. }) | Some(Node::Dir { created, modified }) => {
				match kind {
					DateKind::Created => *created = time,
					DateKind::Modified => *modified = time,
				}
				Ok(())
			}
			None => Err(VfsError::new(code::NOT_FOUND, VfsOp::SetDate).with_path(&path)),
		}
	}

	async fn stat(&self, volume: VolumeRef, path: &str) -> VfsResult<Option<DirEntry>> {
		let mut state = self.state.lock().unwrap();
		state.log("stat", volume, path);
		let vol = state.volume(volume, VfsOp::Stat)?;
		let name = path.rsplit('/').next().unwrap_or(path);
		Ok(vol.nodes.get(path).map(|node| entry_for(name, node)))
	}

	async fn delete(&self, volume: VolumeRef, path: &str) -> VfsResult<()> {
		let mut state = self.state.lock().unwrap();
		state.log("delete", volume, path);
		state.volume(volume, VfsOp::Delete)?;
		let vol = state.volumes.get_mut(&volume).unwrap();
		match vol.nodes.get(path) {
			Some(Node::File { .. }) => {
				vol.nodes.remove(path);
				Ok(())
			}
			Some(Node::Dir { .. }) => {
				let has_children = !children(&vol.nodes, path).is_empty();
				if has_children {
					Err(VfsError::new(code::DIR_NOT_EMPTY, VfsOp::Delete)
						.with_path(path)
						.with_volume(volume))
				} else {
					vol.nodes.remove(path);
					Ok(())
				}
			}
			None => Err(VfsError::new(code::NOT_FOUND, VfsOp::Delete)
				.with_path(path)
				.with_volume(volume)),
		}
	}

	async fn mkdir(&self, volume: VolumeRef, path: &str) -> VfsResult<()> {
		let mut state = self.state.lock().unwrap();
		state.log("mkdir", volume, path);
		state.volume(volume, VfsOp::MkDir)?;
		let vol = state.volumes.get_mut(&volume).unwrap();
		if vol.nodes.contains_key(path) {
			return Err(VfsError::new(code::ALREADY_EXISTS, VfsOp::MkDir)
				.with_path(path)
				.with_volume(volume));
		}
		let parent_ok = match parent_of(path) {
			Some(parent) => matches!(vol.nodes.get(parent), Some(Node::Dir { .. })),
			None => true,
		};
		if !parent_ok {
			return Err(VfsError::new(code::NOT_FOUND, VfsOp::MkDir)
				.with_path(path)
				.with_volume(volume));
		}
		vol.nodes.insert(
			path.to_string(),
			Node::Dir { created: default_time(), modified: default_time() },
		);
		Ok(())
	}
}

// vim: ts=4
