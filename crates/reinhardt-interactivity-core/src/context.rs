//! Context scope chain.
//!
//! A frame is attached to the element carrying a context directive and is
//! visible to that element's subtree only. Lookups start at the nearest
//! enclosing frame and walk outward, so a child frame shadows its parent's
//! keys while leaving the others visible. Sibling subtrees never see each
//! other's frames.

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::dom::{Document, NodeId};
use crate::error::{InteractivityError, InteractivityResult};
use crate::expr::{Resolved, lookup_path};
use crate::reactive::{DepKey, DependencyTracker};
use crate::store::{StateStore, write_path};

/// Identifier of a context frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameId(usize);

impl FrameId {
	/// The raw sequence number.
	pub fn index(self) -> usize {
		self.0
	}
}

#[derive(Debug, Clone)]
struct Frame {
	element: NodeId,
	parent: Option<FrameId>,
	values: Map<String, Value>,
	active: bool,
}

/// All context frames of one document.
#[derive(Debug, Default)]
pub struct ContextChain {
	frames: Vec<Frame>,
	by_element: HashMap<NodeId, FrameId>,
}

impl ContextChain {
	/// Creates an empty chain.
	pub fn new() -> Self {
		Self::default()
	}

	/// Pushes a frame scoped to `element`'s subtree.
	///
	/// Pushing onto an element that already owns a frame merges into it.
	pub fn push_context(
		&mut self,
		doc: &Document,
		element: NodeId,
		values: Map<String, Value>,
	) -> FrameId {
		if let Some(&existing) = self.by_element.get(&element) {
			if let Some(frame) = self.frames.get_mut(existing.0).filter(|f| f.active) {
				frame.values.extend(values);
				return existing;
			}
		}
		let parent = doc
			.ancestors(element)
			.find_map(|a| self.active_frame_of(a));
		let id = FrameId(self.frames.len());
		self.frames.push(Frame {
			element,
			parent,
			values,
			active: true,
		});
		self.by_element.insert(element, id);
		id
	}

	/// Installs a document-level frame visible to every element.
	pub fn push_root(&mut self, doc: &Document, values: Map<String, Value>) -> FrameId {
		self.push_context(doc, doc.root(), values)
	}

	fn active_frame_of(&self, element: NodeId) -> Option<FrameId> {
		self.by_element
			.get(&element)
			.copied()
			.filter(|id| self.frames.get(id.0).is_some_and(|f| f.active))
	}

	/// Nearest frame enclosing `element` (the element's own frame included).
	pub fn frame_at(&self, doc: &Document, element: NodeId) -> Option<FrameId> {
		std::iter::once(element)
			.chain(doc.ancestors(element))
			.find_map(|n| self.active_frame_of(n))
	}

	/// Element a frame is attached to.
	pub fn frame_element(&self, frame: FrameId) -> Option<NodeId> {
		self.frames.get(frame.0).map(|f| f.element)
	}

	/// Frames enclosing `element`, innermost first.
	fn chain(&self, doc: &Document, element: NodeId) -> impl Iterator<Item = (FrameId, &Frame)> {
		let start = self.frame_at(doc, element);
		std::iter::successors(start, |id| self.frames.get(id.0).and_then(|f| f.parent))
			.filter_map(|id| self.frames.get(id.0).map(|f| (id, f)))
	}

	/// Looks `key` up innermost-first, recording every frame consulted.
	pub fn lookup(
		&self,
		doc: &Document,
		element: NodeId,
		key: &str,
		tracker: Option<&DependencyTracker>,
	) -> Option<&Value> {
		for (id, frame) in self.chain(doc, element) {
			if let Some(tracker) = tracker {
				tracker.record(DepKey::context(id, key));
			}
			if let Some(value) = frame.values.get(key) {
				return Some(value);
			}
		}
		None
	}

	/// Resolves a dot-path against the context chain.
	pub(crate) fn lookup_path(
		&self,
		doc: &Document,
		element: NodeId,
		segments: &[String],
		tracker: Option<&DependencyTracker>,
	) -> Option<Resolved> {
		let (key, rest) = segments.split_first()?;
		self.lookup(doc, element, key, tracker)
			.map(|value| lookup_path(value, rest))
	}

	/// Resolves a bare identifier path: context frames first, then `namespace`.
	///
	/// Fails with [`InteractivityError::UnresolvedReference`] only when the
	/// first segment is defined nowhere.
	pub fn resolve(
		&self,
		doc: &Document,
		element: NodeId,
		identifier: &str,
		store: &StateStore,
		namespace: Option<&str>,
		tracker: Option<&DependencyTracker>,
	) -> InteractivityResult<Resolved> {
		let segments: Vec<String> = identifier.split('.').map(str::to_string).collect();
		if let Some(resolved) = self.lookup_path(doc, element, &segments, tracker) {
			return Ok(resolved);
		}
		if let Some(namespace) = namespace {
			let resolved = store.lookup(namespace, &segments, tracker);
			if store.contains_key(namespace, &segments[0]) {
				return Ok(resolved);
			}
		}
		Err(InteractivityError::UnresolvedReference(
			identifier.to_string(),
		))
	}

	/// Writes a dot-path into the nearest frame that defines its first
	/// segment, or into the nearest frame when none does.
	///
	/// Returns the changed key, or `None` if nothing changed or no frame
	/// encloses `element`.
	pub fn set(
		&mut self,
		doc: &Document,
		element: NodeId,
		segments: &[String],
		value: Value,
	) -> Option<DepKey> {
		let (key, rest) = segments.split_first()?;
		let target = self
			.chain(doc, element)
			.find(|(_, f)| f.values.contains_key(key))
			.map(|(id, _)| id)
			.or_else(|| self.frame_at(doc, element))?;
		let frame = self.frames.get_mut(target.0)?;
		let existed = frame.values.contains_key(key);
		let slot = frame.values.entry(key.clone()).or_insert(Value::Null);
		let changed = write_path(slot, rest, value) || !existed;
		changed.then(|| DepKey::context(target, key.as_str()))
	}

	/// All keys visible at `element`, inner frames shadowing outer ones.
	pub fn merged(&self, doc: &Document, element: NodeId) -> Map<String, Value> {
		let frames: Vec<&Frame> = self.chain(doc, element).map(|(_, f)| f).collect();
		let mut merged = Map::new();
		for frame in frames.into_iter().rev() {
			for (key, value) in &frame.values {
				merged.insert(key.clone(), value.clone());
			}
		}
		merged
	}

	/// Deactivates frames attached inside `root`'s subtree. Returns how many.
	pub fn remove_subtree(&mut self, doc: &Document, root: NodeId) -> usize {
		let mut removed = 0;
		for frame in self.frames.iter_mut().filter(|f| f.active) {
			if doc.contains(root, frame.element) {
				frame.active = false;
				self.by_element.remove(&frame.element);
				removed += 1;
			}
		}
		removed
	}

	/// Number of active frames.
	pub fn len(&self) -> usize {
		self.frames.iter().filter(|f| f.active).count()
	}

	/// Whether no frame is active.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}
