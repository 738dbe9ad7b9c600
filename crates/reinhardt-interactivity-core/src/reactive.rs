//! Dependency tracking for fine-grained client updates.
//!
//! Every binding evaluation runs with a [`DependencyTracker`] that records the
//! state and context keys it reads. The [`DependencyGraph`] keeps the
//! key -> binding edges, so a mutation only re-runs bindings that read one of
//! the changed keys.
//!
//! Granularity is one top-level key per namespace (`state.user.name` depends
//! on `user`) and one key per context frame.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::context::FrameId;

/// Identifier of a binding, assigned in document order then declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BindingId(pub(crate) usize);

impl BindingId {
	/// The raw sequence number.
	pub fn index(self) -> usize {
		self.0
	}
}

/// A unit of state a binding can depend on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DepKey {
	/// A top-level key of a namespace.
	State {
		/// Namespace name.
		namespace: String,
		/// Top-level key.
		key: String,
	},
	/// A key looked up in a specific context frame.
	Context {
		/// Frame consulted.
		frame: FrameId,
		/// Identifier looked up.
		key: String,
	},
}

impl DepKey {
	/// Shorthand for a state dependency.
	pub fn state(namespace: impl Into<String>, key: impl Into<String>) -> Self {
		Self::State {
			namespace: namespace.into(),
			key: key.into(),
		}
	}

	/// Shorthand for a context dependency.
	pub fn context(frame: FrameId, key: impl Into<String>) -> Self {
		Self::Context {
			frame,
			key: key.into(),
		}
	}
}

/// Records reads made while evaluating one binding.
#[derive(Debug, Default)]
pub struct DependencyTracker {
	reads: RefCell<BTreeSet<DepKey>>,
}

impl DependencyTracker {
	/// Creates an empty tracker.
	pub fn new() -> Self {
		Self::default()
	}

	/// Records a read.
	pub fn record(&self, key: DepKey) {
		self.reads.borrow_mut().insert(key);
	}

	/// Records several reads.
	pub fn record_all<I: IntoIterator<Item = DepKey>>(&self, keys: I) {
		self.reads.borrow_mut().extend(keys);
	}

	/// Drains the recorded reads.
	pub fn take(&self) -> BTreeSet<DepKey> {
		std::mem::take(&mut *self.reads.borrow_mut())
	}
}

/// Key -> binding subscription graph.
#[derive(Debug, Default)]
pub(crate) struct DependencyGraph {
	subscribers: HashMap<DepKey, BTreeSet<BindingId>>,
	dependencies: BTreeMap<BindingId, BTreeSet<DepKey>>,
}

impl DependencyGraph {
	/// Replaces the dependencies of `binding`.
	pub(crate) fn track(&mut self, binding: BindingId, deps: BTreeSet<DepKey>) {
		self.clear(binding);
		for dep in &deps {
			self.subscribers
				.entry(dep.clone())
				.or_default()
				.insert(binding);
		}
		self.dependencies.insert(binding, deps);
	}

	/// Removes `binding` from the graph.
	pub(crate) fn remove(&mut self, binding: BindingId) {
		self.clear(binding);
		self.dependencies.remove(&binding);
	}

	fn clear(&mut self, binding: BindingId) {
		if let Some(old) = self.dependencies.get(&binding) {
			for dep in old {
				if let Some(subs) = self.subscribers.get_mut(dep) {
					subs.remove(&binding);
					if subs.is_empty() {
						self.subscribers.remove(dep);
					}
				}
			}
		}
	}

	/// Bindings subscribed to any of `changed`, in binding order.
	pub(crate) fn affected<'a, I>(&self, changed: I) -> BTreeSet<BindingId>
	where
		I: IntoIterator<Item = &'a DepKey>,
	{
		changed
			.into_iter()
			.filter_map(|key| self.subscribers.get(key))
			.flatten()
			.copied()
			.collect()
	}

	/// Dependencies recorded for `binding`.
	pub(crate) fn dependencies(&self, binding: BindingId) -> Option<&BTreeSet<DepKey>> {
		self.dependencies.get(&binding)
	}

	/// Number of bindings subscribed to `key`.
	#[cfg(test)]
	pub(crate) fn subscriber_count(&self, key: &DepKey) -> usize {
		self.subscribers.get(key).map(BTreeSet::len).unwrap_or(0)
	}
}
