//! Mockable generation of the random identifiers we hand out: certificate serials
//! and session ids.

use ::uuid::Uuid;
use std::sync::{
	atomic::{AtomicUsize, Ordering},
	Arc,
};

/// Source of v4 UUIDs. Tests swap in a fixed sequence so that issued serials
/// and session ids are predictable.
///
/// Cloning shares the underlying source, so a sequence keeps advancing across
/// clones.
#[derive(Debug, Clone)]
pub struct UuidProvider {
	provider: Arc<dyn UuidProviderT>,
}

impl UuidProvider {
	pub fn new_random() -> Self {
		Self {
			provider: Arc::new(OsRandom),
		}
	}

	/// Cycles through `uuids` in order. Only available in `cfg(test)`.
	///
	/// # Panics
	/// Panics if `uuids` is empty.
	#[cfg(test)]
	pub fn new_from_sequence(uuids: Vec<Uuid>) -> Self {
		Self {
			provider: Arc::new(Sequence::new(uuids)),
		}
	}

	#[inline]
	pub fn next_v4(&self) -> Uuid {
		self.provider.next_v4()
	}
}

impl Default for UuidProvider {
	fn default() -> Self {
		Self::new_random()
	}
}

trait UuidProviderT: std::fmt::Debug + Send + Sync + 'static {
	fn next_v4(&self) -> Uuid;
}

#[derive(Debug)]
struct OsRandom;

impl UuidProviderT for OsRandom {
	fn next_v4(&self) -> Uuid {
		Uuid::new_v4()
	}
}

#[derive(Debug)]
struct Sequence {
	uuids: Vec<Uuid>,
	pos: AtomicUsize,
}

impl Sequence {
	#[allow(dead_code)]
	fn new(uuids: Vec<Uuid>) -> Self {
		assert!(!uuids.is_empty(), "a uuid sequence needs at least one entry");
		Self {
			uuids,
			pos: AtomicUsize::new(0),
		}
	}
}

impl UuidProviderT for Sequence {
	fn next_v4(&self) -> Uuid {
		let idx = self.pos.fetch_add(1, Ordering::SeqCst) % self.uuids.len();
		self.uuids[idx]
	}
}
