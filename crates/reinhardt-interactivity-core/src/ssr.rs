//! Server-side rendering pass.
//!
//! A [`RequestContext`] owns the store for exactly one request. The
//! [`ServerRenderer`] holds everything shared across requests (directive
//! registry, configuration, document-level context) and turns host markup
//! plus a request into a [`RenderedPage`].
//!
//! ```ignore
//! let mut request = RequestContext::new();
//! request.set_state("accordion", json!({"isOpen": false}))?;
//!
//! let page = ServerRenderer::new().render(&request, markup)?;
//! let html = page.into_html_with_script();
//! ```

use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::config::InteractivityConfig;
use crate::context::ContextChain;
use crate::directives::{DirectiveRegistry, RenderMode};
use crate::dom::Document;
use crate::error::InteractivityResult;
use crate::hydration::HydrationPayload;
use crate::processor::{DirectiveProcessor, DisabledBinding, InteractiveRoot};
use crate::store::{StateReader, StateStore};

/// State scoped to one server request.
#[derive(Debug)]
pub struct RequestContext {
	store: StateStore,
}

impl Default for RequestContext {
	fn default() -> Self {
		Self::new()
	}
}

impl RequestContext {
	/// Creates a request with an empty server store.
	pub fn new() -> Self {
		Self {
			store: StateStore::server(),
		}
	}

	/// Initializes a namespace. A second call for the same namespace fails
	/// with [`InteractivityError::DuplicateInit`](crate::InteractivityError::DuplicateInit).
	pub fn set_state(&mut self, namespace: &str, partial: Value) -> InteractivityResult<()> {
		self.store.set_state(namespace, partial)
	}

	/// Adds a value that is available to directives but not serialized.
	pub fn set_server_only(&mut self, namespace: &str, key: &str, value: Value) -> &mut Self {
		self.store.set_server_only(namespace, key, value);
		self
	}

	/// Adds a derived value.
	pub fn set_derived<F>(&mut self, namespace: &str, key: &str, derive: F) -> &mut Self
	where
		F: Fn(&StateReader<'_>) -> Value + Send + Sync + 'static,
	{
		self.store.set_derived(namespace, key, derive);
		self
	}

	/// Adds client-visible configuration.
	pub fn set_config(&mut self, namespace: &str, config: Value) -> InteractivityResult<()> {
		self.store.set_config(namespace, config)
	}

	/// The request's store.
	pub fn store(&self) -> &StateStore {
		&self.store
	}
}

/// Output of one server pass.
#[derive(Debug, Clone)]
pub struct RenderedPage {
	/// Rendered markup, without the payload script.
	pub html: String,
	/// Client-visible state.
	pub payload: HydrationPayload,
	/// Interactive roots encountered, in document order.
	pub interactive_roots: Vec<InteractiveRoot>,
	/// Directives that were not applied.
	pub disabled_bindings: Vec<DisabledBinding>,
	script_id: String,
	pretty: bool,
}

impl RenderedPage {
	/// Whether the page needs the client runtime: at least one interactive
	/// root was rendered and the host references at least one client script.
	pub fn requires_client_runtime<S: AsRef<str>>(&self, client_scripts: &[S]) -> bool {
		!self.interactive_roots.is_empty()
			&& client_scripts.iter().any(|s| !s.as_ref().trim().is_empty())
	}

	/// The payload as a `<script type="application/json">` element.
	pub fn to_script_tag(&self) -> String {
		self.payload.to_script_tag(&self.script_id, self.pretty)
	}

	/// The markup with the payload script inserted before `</body>`, or
	/// appended when there is no body. Pages without interactive roots or
	/// state are returned unchanged.
	pub fn into_html_with_script(self) -> String {
		if self.interactive_roots.is_empty() && self.payload.is_empty() {
			return self.html;
		}
		let script = self.to_script_tag();
		let mut html = self.html;
		match html.to_ascii_lowercase().rfind("</body>") {
			Some(pos) => html.insert_str(pos, &script),
			None => html.push_str(&script),
		}
		html
	}
}

/// Renders host markup against a request's store.
#[derive(Debug, Clone, Default)]
pub struct ServerRenderer {
	registry: DirectiveRegistry,
	config: InteractivityConfig,
	root_context: Option<Map<String, Value>>,
}

impl ServerRenderer {
	/// Renderer with the built-in directives and the default configuration.
	pub fn new() -> Self {
		Self::default()
	}

	/// Replaces the directive registry.
	pub fn with_registry(mut self, registry: DirectiveRegistry) -> Self {
		self.registry = registry;
		self
	}

	/// Replaces the configuration.
	pub fn with_config(mut self, config: InteractivityConfig) -> Self {
		self.config = config;
		self
	}

	/// Installs a document-level context frame, e.g. localized strings.
	pub fn with_root_context(mut self, values: Map<String, Value>) -> Self {
		self.root_context
			.get_or_insert_with(Map::new)
			.extend(values);
		self
	}

	/// The directive registry.
	pub fn registry(&self) -> &DirectiveRegistry {
		&self.registry
	}

	/// The configuration.
	pub fn config(&self) -> &InteractivityConfig {
		&self.config
	}

	/// Runs the server pass.
	#[tracing::instrument(skip_all, fields(markup_len = markup.len()))]
	pub fn render(&self, request: &RequestContext, markup: &str) -> InteractivityResult<RenderedPage> {
		self.config.validate()?;

		let mut doc = Document::parse(markup);
		let mut contexts = ContextChain::new();
		if let Some(values) = &self.root_context {
			contexts.push_root(&doc, values.clone());
		}

		let processor = DirectiveProcessor::new(
			self.registry.clone(),
			self.config.clone(),
			RenderMode::Server,
		);
		let outcome = processor.process(&mut doc, request.store(), &mut contexts);
		let payload = HydrationPayload::from_store(request.store());

		debug!(
			namespaces = payload.state.len(),
			"serialized client-visible state"
		);
		info!(
			roots = outcome.roots.len(),
			bindings = outcome.bindings.len(),
			"rendered interactive markup"
		);

		Ok(RenderedPage {
			html: doc.to_html(),
			payload,
			interactive_roots: outcome.roots,
			disabled_bindings: outcome.disabled,
			script_id: self.config.state_script_id.clone(),
			pretty: self.config.pretty_payload,
		})
	}
}
