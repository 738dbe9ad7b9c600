//! Directive registry.
//!
//! A directive is the suffix of a `data-wp-<name>` attribute. The registry maps
//! names to [`DirectiveHandler`]s; structural directives (`interactive`,
//! `context`) are handled by the processor itself and never registered.

mod builtin;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::dom::{Document, NodeId};
use crate::expr::{Expression, Resolved};

pub use builtin::{
	BindDirective, ClassDirective, InitDirective, OnDirective, StyleDirective, TextDirective,
	WatchDirective,
};

/// Which pass is applying directives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
	/// One-shot server pass over static markup.
	Server,
	/// Live client pass.
	Client,
}

/// Everything a handler receives about one binding.
#[derive(Debug, Clone)]
pub struct DirectiveInput<'a> {
	/// The evaluated expression (undefined for action references).
	pub value: Resolved,
	/// The `--modifier` suffix, if any.
	pub modifier: Option<&'a str>,
	/// The parsed expression.
	pub expression: &'a Expression,
	/// Current pass.
	pub mode: RenderMode,
}

/// Client callback kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackKind {
	/// Runs after hydration and again whenever its reads change.
	Watch,
	/// Runs once after hydration.
	Init,
}

/// What the processor should do after a handler ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SideEffect {
	/// Nothing beyond the DOM mutation.
	None,
	/// Attach an event listener invoking `action`.
	Listen {
		/// Event type, e.g. `click`.
		event: String,
		/// Action registry key, e.g. `actions.toggle`.
		action: String,
	},
	/// Schedule a client callback.
	Callback {
		/// Callback kind.
		kind: CallbackKind,
		/// Callback registry key, e.g. `callbacks.logOpen`.
		action: String,
	},
}

/// Applies one directive to one element.
pub trait DirectiveHandler: Send + Sync {
	/// Mutates `element` according to `input` and reports any side effect.
	fn apply(&self, doc: &mut Document, element: NodeId, input: &DirectiveInput<'_>) -> SideEffect;
}

impl<F> DirectiveHandler for F
where
	F: Fn(&mut Document, NodeId, &DirectiveInput<'_>) -> SideEffect + Send + Sync,
{
	fn apply(&self, doc: &mut Document, element: NodeId, input: &DirectiveInput<'_>) -> SideEffect {
		self(doc, element, input)
	}
}

/// Directive name -> handler.
#[derive(Clone)]
pub struct DirectiveRegistry {
	handlers: HashMap<String, Arc<dyn DirectiveHandler>>,
}

impl fmt::Debug for DirectiveRegistry {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("DirectiveRegistry")
			.field("directives", &self.names())
			.finish()
	}
}

impl Default for DirectiveRegistry {
	fn default() -> Self {
		Self::new()
	}
}

impl DirectiveRegistry {
	/// Registry with the built-in directives.
	pub fn new() -> Self {
		let mut registry = Self::empty();
		registry.register("bind", BindDirective);
		registry.register("text", TextDirective);
		registry.register("class", ClassDirective);
		registry.register("style", StyleDirective);
		registry.register("on", OnDirective);
		registry.register("watch", WatchDirective);
		registry.register("init", InitDirective);
		registry
	}

	/// Registry without any directive.
	pub fn empty() -> Self {
		Self {
			handlers: HashMap::new(),
		}
	}

	/// Associates `name` with `handler`, replacing any previous handler.
	pub fn register<H>(&mut self, name: impl Into<String>, handler: H) -> &mut Self
	where
		H: DirectiveHandler + 'static,
	{
		self.handlers.insert(name.into(), Arc::new(handler));
		self
	}

	/// Handler for `name`.
	pub fn get(&self, name: &str) -> Option<Arc<dyn DirectiveHandler>> {
		self.handlers.get(name).cloned()
	}

	/// Whether `name` is registered.
	pub fn contains(&self, name: &str) -> bool {
		self.handlers.contains_key(name)
	}

	/// Registered names, sorted.
	pub fn names(&self) -> Vec<&str> {
		let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
		names.sort_unstable();
		names
	}
}
