//! Client actions and callbacks.
//!
//! Synchronous actions receive an [`ActionContext`] with read and write access
//! to the store and the context frames enclosing the element that triggered
//! them. Asynchronous actions receive an owned [`ActionSnapshot`] instead and
//! return a batch of [`Mutation`]s, applied together once the future resolves.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use serde_json::{Map, Value};

use crate::context::ContextChain;
use crate::dom::{Document, NodeId};
use crate::error::{InteractivityError, InteractivityResult};
use crate::expr::Resolved;
use crate::reactive::{DepKey, DependencyTracker};
use crate::store::{StateStore, split_path};

/// Synchronous action or callback.
pub type ActionFn = Arc<dyn Fn(&mut ActionContext<'_>) -> InteractivityResult<()> + Send + Sync>;

/// Asynchronous action.
pub type AsyncActionFn =
	Arc<dyn Fn(ActionSnapshot) -> BoxFuture<'static, InteractivityResult<Vec<Mutation>>> + Send + Sync>;

/// A registered handler.
#[derive(Clone)]
pub enum ActionHandler {
	/// Runs inline with mutable access.
	Sync(ActionFn),
	/// Runs on a snapshot and returns mutations.
	Async(AsyncActionFn),
}

impl fmt::Debug for ActionHandler {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Sync(_) => f.write_str("Sync(..)"),
			Self::Async(_) => f.write_str("Async(..)"),
		}
	}
}

/// Actions and callbacks, keyed by namespace and reference
/// (`actions.toggle`, `callbacks.logOpen`).
#[derive(Debug, Clone, Default)]
pub struct ActionRegistry {
	handlers: HashMap<(String, String), ActionHandler>,
}

impl ActionRegistry {
	/// Creates an empty registry.
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers `actions.<name>` in `namespace`.
	pub fn action<F>(&mut self, namespace: &str, name: &str, action: F) -> &mut Self
	where
		F: Fn(&mut ActionContext<'_>) -> InteractivityResult<()> + Send + Sync + 'static,
	{
		self.insert(namespace, format!("actions.{}", name), ActionHandler::Sync(Arc::new(action)))
	}

	/// Registers `callbacks.<name>` in `namespace`.
	pub fn callback<F>(&mut self, namespace: &str, name: &str, callback: F) -> &mut Self
	where
		F: Fn(&mut ActionContext<'_>) -> InteractivityResult<()> + Send + Sync + 'static,
	{
		self.insert(namespace, format!("callbacks.{}", name), ActionHandler::Sync(Arc::new(callback)))
	}

	/// Registers an asynchronous `actions.<name>` in `namespace`.
	pub fn async_action<F, Fut>(&mut self, namespace: &str, name: &str, action: F) -> &mut Self
	where
		F: Fn(ActionSnapshot) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = InteractivityResult<Vec<Mutation>>> + Send + 'static,
	{
		let handler: AsyncActionFn = Arc::new(move |snapshot| action(snapshot).boxed());
		self.insert(namespace, format!("actions.{}", name), ActionHandler::Async(handler))
	}

	fn insert(&mut self, namespace: &str, key: String, handler: ActionHandler) -> &mut Self {
		self.handlers.insert((namespace.to_string(), key), handler);
		self
	}

	/// Handler registered under `key` (e.g. `actions.toggle`) in `namespace`.
	pub fn get(&self, namespace: &str, key: &str) -> Option<&ActionHandler> {
		self.handlers.get(&(namespace.to_string(), key.to_string()))
	}

	/// Number of registered handlers.
	pub fn len(&self) -> usize {
		self.handlers.len()
	}

	/// Whether nothing is registered.
	pub fn is_empty(&self) -> bool {
		self.handlers.is_empty()
	}
}

/// An event delivered to listeners.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
	/// Event type, e.g. `click`.
	pub event_type: String,
	/// Element the event was dispatched on.
	pub target: NodeId,
	/// Free-form payload.
	pub detail: Value,
}

impl Event {
	/// Creates an event without detail.
	pub fn new(event_type: impl Into<String>, target: NodeId) -> Self {
		Self {
			event_type: event_type.into(),
			target,
			detail: Value::Null,
		}
	}

	/// Attaches a payload.
	pub fn with_detail(mut self, detail: Value) -> Self {
		self.detail = detail;
		self
	}
}

/// A write produced by an asynchronous action.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
	/// Write a dot-path in a namespace (the action's own when `None`).
	State {
		/// Target namespace.
		namespace: Option<String>,
		/// Dot-path below the namespace.
		path: String,
		/// New value.
		value: Value,
	},
	/// Write a dot-path in the context frames enclosing the element.
	Context {
		/// Dot-path whose first segment names the context key.
		path: String,
		/// New value.
		value: Value,
	},
}

impl Mutation {
	/// State write in the action's namespace.
	pub fn state(path: impl Into<String>, value: Value) -> Self {
		Self::State {
			namespace: None,
			path: path.into(),
			value,
		}
	}

	/// State write in another namespace.
	pub fn state_in(namespace: impl Into<String>, path: impl Into<String>, value: Value) -> Self {
		Self::State {
			namespace: Some(namespace.into()),
			path: path.into(),
			value,
		}
	}

	/// Context write.
	pub fn context(path: impl Into<String>, value: Value) -> Self {
		Self::Context {
			path: path.into(),
			value,
		}
	}
}

/// Owned view handed to asynchronous actions.
#[derive(Debug, Clone)]
pub struct ActionSnapshot {
	/// Namespace of the action.
	pub namespace: String,
	/// Element whose listener fired.
	pub element: NodeId,
	/// Client-visible state of the namespace.
	pub state: Map<String, Value>,
	/// Context keys visible at the element.
	pub context: Map<String, Value>,
	/// Configuration of the namespace.
	pub config: Map<String, Value>,
	/// Triggering event, if any.
	pub event: Option<Event>,
}

/// Access handed to synchronous actions and callbacks.
pub struct ActionContext<'a> {
	pub(crate) store: &'a mut StateStore,
	pub(crate) contexts: &'a mut ContextChain,
	pub(crate) doc: &'a Document,
	pub(crate) namespace: &'a str,
	pub(crate) element: NodeId,
	pub(crate) event: Option<&'a Event>,
	pub(crate) tracker: Option<&'a DependencyTracker>,
	pub(crate) changed: BTreeSet<DepKey>,
}

impl<'a> ActionContext<'a> {
	/// Namespace of the running action.
	pub fn namespace(&self) -> &str {
		self.namespace
	}

	/// Element the action is attached to.
	pub fn element(&self) -> NodeId {
		self.element
	}

	/// Triggering event (`None` for callbacks).
	pub fn event(&self) -> Option<&Event> {
		self.event
	}

	/// Reads a dot-path from the action's namespace.
	pub fn state(&self, path: &str) -> Resolved {
		self.state_in(self.namespace, path)
	}

	/// Reads a dot-path from another namespace.
	pub fn state_in(&self, namespace: &str, path: &str) -> Resolved {
		self.store.lookup(namespace, &split_path(path), self.tracker)
	}

	/// Reads a dot-path from the context frames enclosing the element.
	pub fn context(&self, path: &str) -> Resolved {
		self.contexts
			.lookup_path(self.doc, self.element, &split_path(path), self.tracker)
			.unwrap_or_default()
	}

	/// Configuration of the action's namespace.
	pub fn config(&self) -> Map<String, Value> {
		self.store.config(self.namespace)
	}

	/// Writes a dot-path in the action's namespace.
	pub fn set_state(&mut self, path: &str, value: Value) -> InteractivityResult<()> {
		let namespace = self.namespace;
		self.set_state_in(namespace, path, value)
	}

	/// Writes a dot-path in another namespace.
	pub fn set_state_in(&mut self, namespace: &str, path: &str, value: Value) -> InteractivityResult<()> {
		if let Some(key) = self.store.set_path(namespace, &split_path(path), value)? {
			self.changed.insert(key);
		}
		Ok(())
	}

	/// Writes a dot-path into the nearest context frame defining its first
	/// segment. Fails when no frame encloses the element.
	pub fn set_context(&mut self, path: &str, value: Value) -> InteractivityResult<()> {
		let segments = split_path(path);
		if self.contexts.frame_at(self.doc, self.element).is_none() {
			return Err(InteractivityError::UnresolvedReference(format!("context.{}", path)));
		}
		if let Some(key) = self.contexts.set(self.doc, self.element, &segments, value) {
			self.changed.insert(key);
		}
		Ok(())
	}

	/// Applies one mutation.
	pub fn apply(&mut self, mutation: Mutation) -> InteractivityResult<()> {
		match mutation {
			Mutation::State {
				namespace: Some(namespace),
				path,
				value,
			} => self.set_state_in(&namespace, &path, value),
			Mutation::State {
				namespace: None,
				path,
				value,
			} => self.set_state(&path, value),
			Mutation::Context { path, value } => self.set_context(&path, value),
		}
	}
}
