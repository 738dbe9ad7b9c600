//! Client runtime.
//!
//! The runtime adopts server-rendered markup as its live document, hydrates a
//! client store from the embedded payload and runs the directive pass in
//! client mode. That pass attaches listeners and records, for every binding,
//! the state and context keys it read. A binding whose source is undefined on
//! that first pass keeps the server-rendered markup until one of its keys
//! changes.
//!
//! Dispatching an event runs the matching actions, then re-runs only the
//! bindings whose recorded keys intersect the keys the actions changed. Watch
//! callbacks take part in the same flush and may cascade; the cascade is cut
//! off after [`MAX_FLUSH_CYCLES`] rounds.

mod actions;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, trace, warn};

use crate::config::InteractivityConfig;
use crate::context::ContextChain;
use crate::directives::{CallbackKind, DirectiveRegistry, RenderMode, SideEffect};
use crate::dom::{Document, NodeId};
use crate::error::{InteractivityError, InteractivityResult};
use crate::expr::Resolved;
use crate::hydration::{HydrationPayload, hydrate};
use crate::processor::{Binding, DirectiveProcessor, InteractiveRoot};
use crate::reactive::{BindingId, DepKey, DependencyGraph, DependencyTracker};
use crate::store::{DerivedFn, MergeMode, StateReader, StateStore};

pub use actions::{
	ActionContext, ActionFn, ActionHandler, ActionRegistry, ActionSnapshot, AsyncActionFn, Event,
	Mutation,
};

/// Upper bound on watch-callback cascades within one flush.
pub const MAX_FLUSH_CYCLES: usize = 32;

/// What one flush did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
	/// Keys that changed.
	pub changed: BTreeSet<DepKey>,
	/// Bindings re-run, in the order they ran.
	pub rerun: Vec<BindingId>,
	/// Elements whose bindings were re-applied.
	pub elements: BTreeSet<NodeId>,
}

impl FlushReport {
	fn absorb(&mut self, other: FlushReport) {
		self.changed.extend(other.changed);
		self.rerun.extend(other.rerun);
		self.elements.extend(other.elements);
	}
}

#[derive(Debug, Clone)]
struct Listener {
	element: NodeId,
	event: String,
	action: String,
	namespace: String,
}

#[derive(Debug, Clone)]
struct Callback {
	element: NodeId,
	action: String,
	namespace: String,
}

struct PendingState {
	namespace: String,
	partial: Value,
	mode: MergeMode,
}

type DerivedRegistration = (String, String, DerivedFn);

/// Builds a [`ClientRuntime`].
#[derive(Default)]
pub struct ClientRuntimeBuilder {
	payload: Option<HydrationPayload>,
	payload_json: Option<String>,
	states: Vec<PendingState>,
	derived: Vec<DerivedRegistration>,
	registry: Option<DirectiveRegistry>,
	actions: ActionRegistry,
	config: InteractivityConfig,
	root_context: Option<Map<String, Value>>,
}

impl ClientRuntimeBuilder {
	/// Creates a builder. Without an explicit payload the runtime reads the
	/// one embedded in the markup.
	pub fn new() -> Self {
		Self::default()
	}

	/// Uses `payload` instead of the embedded one.
	pub fn payload(mut self, payload: HydrationPayload) -> Self {
		self.payload = Some(payload);
		self
	}

	/// Uses a JSON payload instead of the embedded one.
	pub fn payload_json(mut self, json: impl Into<String>) -> Self {
		self.payload_json = Some(json.into());
		self
	}

	/// Client-side `set_state`, applied after hydration.
	pub fn state(mut self, namespace: impl Into<String>, partial: Value) -> Self {
		self.states.push(PendingState {
			namespace: namespace.into(),
			partial,
			mode: MergeMode::Additive,
		});
		self
	}

	/// Client-side superset merge that may overwrite server keys.
	pub fn state_superset(mut self, namespace: impl Into<String>, partial: Value) -> Self {
		self.states.push(PendingState {
			namespace: namespace.into(),
			partial,
			mode: MergeMode::Superset,
		});
		self
	}

	/// Registers a derived value.
	pub fn derived<F>(mut self, namespace: &str, key: &str, derive: F) -> Self
	where
		F: Fn(&StateReader<'_>) -> Value + Send + Sync + 'static,
	{
		let derive: DerivedFn = Arc::new(derive);
		self.derived
			.push((namespace.to_string(), key.to_string(), derive));
		self
	}

	/// Replaces the directive registry.
	pub fn registry(mut self, registry: DirectiveRegistry) -> Self {
		self.registry = Some(registry);
		self
	}

	/// Sets the actions and callbacks.
	pub fn actions(mut self, actions: ActionRegistry) -> Self {
		self.actions = actions;
		self
	}

	/// Replaces the configuration.
	pub fn config(mut self, config: InteractivityConfig) -> Self {
		self.config = config;
		self
	}

	/// Installs a document-level context frame, matching
	/// [`ServerRenderer::with_root_context`](crate::ssr::ServerRenderer::with_root_context).
	pub fn root_context(mut self, values: Map<String, Value>) -> Self {
		self.root_context = Some(values);
		self
	}

	/// Adopts `markup`, hydrates and runs the client pass, init callbacks
	/// and first watch runs.
	#[tracing::instrument(skip_all)]
	pub fn build(self, markup: &str) -> InteractivityResult<ClientRuntime> {
		self.config.validate()?;
		let doc = Document::parse(markup);

		let payload = match (self.payload, self.payload_json) {
			(Some(payload), _) => payload,
			(None, Some(json)) => HydrationPayload::from_json(&json)?,
			(None, None) => {
				HydrationPayload::extract_from_document(&doc, &self.config.state_script_id)?
					.unwrap_or_default()
			}
		};

		let mut store = StateStore::client();
		for (namespace, key, derive) in self.derived {
			store.set_derived(&namespace, &key, move |reader| derive(reader));
		}
		for pending in self.states {
			store.set_state_with(&pending.namespace, pending.partial, pending.mode)?;
		}
		hydrate(&mut store, &payload)?;

		let processor = DirectiveProcessor::new(
			self.registry.unwrap_or_default(),
			self.config,
			RenderMode::Client,
		);
		let mut contexts = ContextChain::new();
		if let Some(values) = self.root_context {
			contexts.push_root(&doc, values);
		}
		let mut runtime = ClientRuntime {
			doc,
			store,
			contexts,
			processor,
			actions: self.actions,
			bindings: BTreeMap::new(),
			graph: DependencyGraph::default(),
			listeners: Vec::new(),
			watchers: BTreeMap::new(),
			roots: Vec::new(),
			last_flush: FlushReport::default(),
		};
		runtime.start();
		Ok(runtime)
	}
}

/// Live client state for one document.
pub struct ClientRuntime {
	doc: Document,
	store: StateStore,
	contexts: ContextChain,
	processor: DirectiveProcessor,
	actions: ActionRegistry,
	bindings: BTreeMap<BindingId, Binding>,
	graph: DependencyGraph,
	listeners: Vec<Listener>,
	watchers: BTreeMap<BindingId, Callback>,
	roots: Vec<InteractiveRoot>,
	last_flush: FlushReport,
}

impl std::fmt::Debug for ClientRuntime {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ClientRuntime")
			.field("roots", &self.roots)
			.field("bindings", &self.bindings.len())
			.field("listeners", &self.listeners.len())
			.field("watchers", &self.watchers.len())
			.finish()
	}
}

impl ClientRuntime {
	/// Starts building a runtime.
	pub fn builder() -> ClientRuntimeBuilder {
		ClientRuntimeBuilder::new()
	}

	fn start(&mut self) {
		let outcome = self
			.processor
			.process(&mut self.doc, &self.store, &mut self.contexts);
		self.roots = outcome.roots;

		let mut inits = Vec::new();
		for bound in outcome.bindings {
			let id = bound.binding.id;
			let element = bound.binding.element;
			let namespace = bound.binding.namespace.clone();
			match bound.effect {
				SideEffect::None => {}
				SideEffect::Listen { event, action } => self.listeners.push(Listener {
					element,
					event,
					action,
					namespace,
				}),
				SideEffect::Callback { kind, action } => {
					let callback = Callback {
						element,
						action,
						namespace,
					};
					match kind {
						CallbackKind::Watch => {
							self.watchers.insert(id, callback.clone());
						}
						CallbackKind::Init => {}
					}
					inits.push((id, kind, callback));
				}
			}
			self.graph.track(id, bound.deps);
			self.bindings.insert(id, bound.binding);
		}

		let mut changed = BTreeSet::new();
		for (id, kind, callback) in inits {
			let tracker = DependencyTracker::new();
			let tracked = (kind == CallbackKind::Watch).then_some(&tracker);
			let (keys, result) = self.invoke(&callback.namespace, &callback.action, callback.element, None, tracked);
			changed.extend(keys);
			if kind == CallbackKind::Watch {
				self.graph.track(id, tracker.take());
			}
			if let Err(err) = result {
				warn!(action = callback.action.as_str(), error = %err, "callback failed");
			}
		}

		debug!(
			roots = self.roots.len(),
			bindings = self.bindings.len(),
			listeners = self.listeners.len(),
			"client runtime hydrated"
		);
		self.flush(changed);
	}

	/// The live document.
	pub fn document(&self) -> &Document {
		&self.doc
	}

	/// The live document serialized.
	pub fn html(&self) -> String {
		self.doc.to_html()
	}

	/// The client store.
	pub fn store(&self) -> &StateStore {
		&self.store
	}

	/// Reads a dot-path from a namespace.
	pub fn state(&self, namespace: &str, path: &str) -> Resolved {
		self.store.get_state(namespace, path)
	}

	/// First attached element with the given `id` attribute.
	pub fn element_by_id(&self, dom_id: &str) -> Option<NodeId> {
		self.doc.element_by_id(dom_id)
	}

	/// Interactive roots still attached.
	pub fn roots(&self) -> &[InteractiveRoot] {
		&self.roots
	}

	/// Number of live bindings.
	pub fn binding_count(&self) -> usize {
		self.bindings.len()
	}

	/// Number of attached listeners.
	pub fn listener_count(&self) -> usize {
		self.listeners.len()
	}

	/// Bindings attached to `element`, in binding order.
	pub fn bindings_for(&self, element: NodeId) -> Vec<&Binding> {
		self.bindings
			.values()
			.filter(|b| b.element == element)
			.collect()
	}

	/// Keys a binding read during its last run.
	pub fn dependencies(&self, binding: BindingId) -> Option<&BTreeSet<DepKey>> {
		self.graph.dependencies(binding)
	}

	/// Report of the most recent flush.
	pub fn last_flush(&self) -> &FlushReport {
		&self.last_flush
	}

	/// Dispatches `event_type` on `target`.
	pub fn dispatch(&mut self, target: NodeId, event_type: &str) -> InteractivityResult<FlushReport> {
		self.dispatch_event(Event::new(event_type, target))
	}

	/// Dispatches `event_type` on the element with DOM id `dom_id`.
	pub fn dispatch_by_id(&mut self, dom_id: &str, event_type: &str) -> InteractivityResult<FlushReport> {
		let target = self
			.doc
			.element_by_id(dom_id)
			.ok_or_else(|| InteractivityError::UnresolvedReference(format!("#{}", dom_id)))?;
		self.dispatch(target, event_type)
	}

	/// Dispatches an event. Listeners on the target, then on its ancestors up
	/// to the nearest interactive root, run in that order; affected bindings
	/// re-run once all of them have finished. A failing listener does not stop
	/// the others; the first error is returned after the flush.
	#[tracing::instrument(skip(self), fields(event = event.event_type.as_str()))]
	pub fn dispatch_event(&mut self, event: Event) -> InteractivityResult<FlushReport> {
		let listeners = self.listeners_for(&event)?;
		let mut changed = BTreeSet::new();
		let mut first_error = None;
		for listener in listeners {
			let (keys, result) = self.invoke(
				&listener.namespace,
				&listener.action,
				listener.element,
				Some(&event),
				None,
			);
			changed.extend(keys);
			if let Err(err) = result {
				warn!(action = listener.action.as_str(), error = %err, "listener failed");
				first_error.get_or_insert(err);
			}
		}
		let report = self.flush(changed);
		first_error.map_or(Ok(report), Err)
	}

	/// Like [`dispatch_event`](Self::dispatch_event), awaiting asynchronous
	/// actions. Each asynchronous action works on a snapshot; its mutations
	/// are applied together once it resolves.
	pub async fn dispatch_async(&mut self, event: Event) -> InteractivityResult<FlushReport> {
		let listeners = self.listeners_for(&event)?;
		let mut changed = BTreeSet::new();
		let mut first_error = None;
		for listener in listeners {
			let handler = self.actions.get(&listener.namespace, &listener.action).cloned();
			let result = match handler {
				Some(ActionHandler::Async(action)) => {
					let snapshot = ActionSnapshot {
						namespace: listener.namespace.clone(),
						element: listener.element,
						state: self.store.snapshot(&listener.namespace),
						context: self.contexts.merged(&self.doc, listener.element),
						config: self.store.config(&listener.namespace),
						event: Some(event.clone()),
					};
					match action(snapshot).await {
						Ok(mutations) => {
							let (keys, result) =
								self.apply_mutations(&listener.namespace, listener.element, mutations);
							changed.extend(keys);
							result
						}
						Err(err) => Err(err),
					}
				}
				_ => {
					let (keys, result) = self.invoke(
						&listener.namespace,
						&listener.action,
						listener.element,
						Some(&event),
						None,
					);
					changed.extend(keys);
					result
				}
			};
			if let Err(err) = result {
				warn!(action = listener.action.as_str(), error = %err, "listener failed");
				first_error.get_or_insert(err);
			}
		}
		let report = self.flush(changed);
		first_error.map_or(Ok(report), Err)
	}

	/// Runs an action or callback (e.g. `actions.toggle`) as if triggered
	/// from `element`, then flushes.
	pub fn run_action(
		&mut self,
		namespace: &str,
		action: &str,
		element: NodeId,
	) -> InteractivityResult<FlushReport> {
		let (keys, result) = self.invoke(namespace, action, element, None, None);
		let report = self.flush(keys);
		result.map(|_| report)
	}

	/// Client-side `set_state` followed by a flush.
	pub fn set_state(&mut self, namespace: &str, partial: Value) -> InteractivityResult<FlushReport> {
		let changed = self
			.store
			.set_state_with(namespace, partial, MergeMode::Additive)?;
		Ok(self.flush(changed))
	}

	/// Superset merge followed by a flush.
	pub fn set_state_superset(&mut self, namespace: &str, partial: Value) -> InteractivityResult<FlushReport> {
		let changed = self
			.store
			.set_state_with(namespace, partial, MergeMode::Superset)?;
		Ok(self.flush(changed))
	}

	/// Removes `element` from the live document, tearing down the bindings,
	/// listeners and context frames of its subtree. Returns how many bindings
	/// were dropped.
	pub fn remove_element(&mut self, element: NodeId) -> InteractivityResult<usize> {
		if element == self.doc.root() || !self.doc.is_attached(element) {
			return Err(InteractivityError::NodeNotFound(element.index()));
		}
		let doc = &self.doc;
		let removed: Vec<BindingId> = self
			.bindings
			.values()
			.filter(|b| doc.contains(element, b.element))
			.map(|b| b.id)
			.collect();
		for id in &removed {
			self.bindings.remove(id);
			self.watchers.remove(id);
			self.graph.remove(*id);
		}
		self.listeners.retain(|l| !doc.contains(element, l.element));
		self.roots.retain(|r| !doc.contains(element, r.element));
		let frames = self.contexts.remove_subtree(&self.doc, element);
		self.doc.remove(element);

		debug!(
			element = element.index(),
			bindings = removed.len(),
			frames,
			"subtree torn down"
		);
		Ok(removed.len())
	}

	fn listeners_for(&self, event: &Event) -> InteractivityResult<Vec<Listener>> {
		if !self.doc.is_attached(event.target) {
			return Err(InteractivityError::NodeNotFound(event.target.index()));
		}
		let mut path = Vec::new();
		for node in std::iter::once(event.target).chain(self.doc.ancestors(event.target)) {
			path.push(node);
			if self.roots.iter().any(|r| r.element == node) {
				break;
			}
		}
		let mut listeners = Vec::new();
		for node in path {
			listeners.extend(
				self.listeners
					.iter()
					.filter(|l| l.element == node && l.event == event.event_type)
					.cloned(),
			);
		}
		trace!(count = listeners.len(), "listeners matched");
		Ok(listeners)
	}

	fn invoke(
		&mut self,
		namespace: &str,
		action: &str,
		element: NodeId,
		event: Option<&Event>,
		tracker: Option<&DependencyTracker>,
	) -> (BTreeSet<DepKey>, InteractivityResult<()>) {
		let handler = match self.actions.get(namespace, action) {
			Some(ActionHandler::Sync(handler)) => handler.clone(),
			Some(ActionHandler::Async(_)) => {
				return (
					BTreeSet::new(),
					Err(InteractivityError::AsyncActionRequiresAwait(action.to_string())),
				);
			}
			None => {
				return (
					BTreeSet::new(),
					Err(InteractivityError::UnknownAction(format!("{}::{}", namespace, action))),
				);
			}
		};
		let mut cx = ActionContext {
			store: &mut self.store,
			contexts: &mut self.contexts,
			doc: &self.doc,
			namespace,
			element,
			event,
			tracker,
			changed: BTreeSet::new(),
		};
		let result = handler(&mut cx);
		(cx.changed, result)
	}

	fn apply_mutations(
		&mut self,
		namespace: &str,
		element: NodeId,
		mutations: Vec<Mutation>,
	) -> (BTreeSet<DepKey>, InteractivityResult<()>) {
		let mut cx = ActionContext {
			store: &mut self.store,
			contexts: &mut self.contexts,
			doc: &self.doc,
			namespace,
			element,
			event: None,
			tracker: None,
			changed: BTreeSet::new(),
		};
		let result = mutations.into_iter().try_for_each(|m| cx.apply(m));
		(cx.changed, result)
	}

	/// Re-runs bindings affected by `changed`, cascading through watch
	/// callbacks.
	fn flush(&mut self, changed: BTreeSet<DepKey>) -> FlushReport {
		let mut report = FlushReport::default();
		let mut pending = changed;
		let mut cycles = 0;

		while !pending.is_empty() {
			if cycles == MAX_FLUSH_CYCLES {
				warn!(
					cycles,
					pending = pending.len(),
					"watch callbacks keep changing state; flush stopped"
				);
				break;
			}
			cycles += 1;
			self.store.begin_pass();
			let affected = self.graph.affected(&pending);
			let mut round = FlushReport {
				changed: std::mem::take(&mut pending),
				..FlushReport::default()
			};

			for id in affected {
				if let Some(callback) = self.watchers.get(&id).cloned() {
					let tracker = DependencyTracker::new();
					let (keys, result) = self.invoke(
						&callback.namespace,
						&callback.action,
						callback.element,
						None,
						Some(&tracker),
					);
					self.graph.track(id, tracker.take());
					pending.extend(keys);
					if let Err(err) = result {
						warn!(action = callback.action.as_str(), error = %err, "watch callback failed");
					}
					round.rerun.push(id);
					continue;
				}
				let Some(binding) = self.bindings.get(&id).cloned() else {
					continue;
				};
				if !self.doc.is_attached(binding.element) {
					continue;
				}
				let (deps, _) =
					self.processor
						.apply_binding(&mut self.doc, &self.store, &self.contexts, &binding);
				self.graph.track(id, deps);
				round.rerun.push(id);
				round.elements.insert(binding.element);
			}
			report.absorb(round);
		}

		if !report.changed.is_empty() {
			debug!(
				changed = report.changed.len(),
				rerun = report.rerun.len(),
				"flush complete"
			);
		}
		self.last_flush = report.clone();
		report
	}
}
