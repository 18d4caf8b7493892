//! Process-wide term caches.
//!
//! Entries are derived from the term table and safe to recompute, so concurrent readers may
//! observe a stale value until the writer's invalidation lands. Every store carries the
//! generation its reader observed before loading; stores from an earlier generation are dropped.

use std::{
	collections::HashMap,
	sync::{
		Arc, RwLock,
		atomic::{AtomicU64, Ordering},
	},
};

use edw_domain::{
	snapshot::{self, SnapshotKey, TermSnapshot},
	term::{Term, TermId, TermTree},
};

use crate::{Error, Result, invalidation::ChildrenEviction};

#[derive(Default)]
pub struct TermCache {
	tree: RwLock<Option<Arc<TermTree>>>,
	snapshots: RwLock<HashMap<SnapshotKey, Arc<TermSnapshot>>>,
	children: RwLock<HashMap<String, Arc<Vec<Term>>>>,
	generation: AtomicU64,
}
impl TermCache {
	pub fn new() -> Self {
		Self::default()
	}

	/// Read before loading anything that will be stored back.
	pub fn generation(&self) -> u64 {
		self.generation.load(Ordering::Acquire)
	}

	pub fn tree(&self) -> Option<Arc<TermTree>> {
		self.tree.read().unwrap_or_else(|err| err.into_inner()).clone()
	}

	/// Returns false when the tree was loaded before the last clear and was dropped.
	pub fn store_tree(&self, tree: Arc<TermTree>, generation: u64) -> bool {
		let mut slot = self.tree.write().unwrap_or_else(|err| err.into_inner());

		if self.generation() != generation {
			return false;
		}

		*slot = Some(tree);

		true
	}

	pub fn snapshot(&self, key: &SnapshotKey) -> Option<Arc<TermSnapshot>> {
		self.snapshots.read().unwrap_or_else(|err| err.into_inner()).get(key).cloned()
	}

	/// Last writer within a generation wins.
	pub fn store_snapshot(&self, snapshot: Arc<TermSnapshot>, generation: u64) -> bool {
		let mut snapshots = self.snapshots.write().unwrap_or_else(|err| err.into_inner());

		if self.generation() != generation {
			return false;
		}

		snapshots.insert(snapshot.key().clone(), snapshot);

		true
	}

	pub fn snapshot_count(&self) -> usize {
		self.snapshots.read().unwrap_or_else(|err| err.into_inner()).len()
	}

	pub fn children(&self, key: &str) -> Option<Arc<Vec<Term>>> {
		self.children.read().unwrap_or_else(|err| err.into_inner()).get(key).cloned()
	}

	pub fn store_children(&self, key: String, children: Arc<Vec<Term>>, generation: u64) -> bool {
		let mut cached = self.children.write().unwrap_or_else(|err| err.into_inner());

		if self.generation() != generation {
			return false;
		}

		cached.insert(key, children);

		true
	}

	pub fn has_children_key(&self, key: &str) -> bool {
		self.children.read().unwrap_or_else(|err| err.into_inner()).contains_key(key)
	}

	/// Returns how many cached entries were removed.
	pub fn evict_children(&self, eviction: &ChildrenEviction) -> usize {
		let mut children = self.children.write().unwrap_or_else(|err| err.into_inner());

		match eviction {
			ChildrenEviction::Keep => 0,
			ChildrenEviction::All => {
				let removed = children.len();

				children.clear();

				removed
			},
			ChildrenEviction::Keys(keys) =>
				keys.iter().filter(|key| children.remove(key.as_str()).is_some()).count(),
		}
	}

	/// Drops every decompressed snapshot and the cached tree, and starts a new generation.
	pub fn clear_decompress(&self) {
		let mut tree = self.tree.write().unwrap_or_else(|err| err.into_inner());
		let mut snapshots = self.snapshots.write().unwrap_or_else(|err| err.into_inner());

		self.generation.fetch_add(1, Ordering::AcqRel);
		snapshots.clear();

		*tree = None;
	}
}

/// Decompresses term selections against one tree, memoizing through the cache when one is
/// attached.
pub struct Decompressor<'a> {
	tree: Arc<TermTree>,
	cache: Option<(&'a TermCache, u64)>,
	active_only: bool,
}
impl<'a> Decompressor<'a> {
	/// `generation` is the cache generation observed before `tree` was read.
	pub fn cached(
		tree: Arc<TermTree>,
		cache: &'a TermCache,
		generation: u64,
		active_only: bool,
	) -> Self {
		Self { tree, cache: Some((cache, generation)), active_only }
	}

	/// Always recomputes and never stores.
	pub fn uncached(tree: Arc<TermTree>, active_only: bool) -> Self {
		Self { tree, cache: None, active_only }
	}

	pub fn tree(&self) -> &TermTree {
		&self.tree
	}

	pub fn active_only(&self) -> bool {
		self.active_only
	}

	pub fn decompress(&self, term_ids: &[TermId], fix_it: bool) -> Result<Arc<TermSnapshot>> {
		let key = SnapshotKey::new(term_ids, self.active_only);

		if let Some((cache, _)) = self.cache
			&& let Some(hit) = cache.snapshot(&key)
		{
			tracing::debug!(terms = ?key.term_ids(), "Decompress cache hit.");

			if !fix_it && let Some(&stale) = hit.dropped().first() {
				return Err(Error::from(edw_domain::Error::UnknownTerm(stale)));
			}

			return Ok(hit);
		}

		let computed = Arc::new(snapshot::decompress(&self.tree, term_ids, self.active_only, fix_it)?);

		if !computed.dropped().is_empty() {
			tracing::warn!(dropped = ?computed.dropped(), "Dropped stale term ids while decompressing.");
		}

		if let Some((cache, generation)) = self.cache {
			tracing::debug!(terms = ?key.term_ids(), "Decompress cache miss.");

			if !cache.store_snapshot(computed.clone(), generation) {
				tracing::debug!(terms = ?key.term_ids(), "Discarded snapshot from a cleared generation.");
			}
		}

		Ok(computed)
	}
}
