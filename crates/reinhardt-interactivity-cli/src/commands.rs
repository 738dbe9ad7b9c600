//! Command implementations, kept free of terminal output so they can be tested.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use reinhardt_interactivity_core::context::ContextChain;
use reinhardt_interactivity_core::processor::DisabledBinding;
use reinhardt_interactivity_core::{
	DirectiveProcessor, DirectiveRegistry, Document, HydrationPayload, InteractiveRoot,
	InteractivityConfig, RenderMode, RequestContext, ServerRenderer, StateStore,
};
use serde_json::Value;

/// Inputs of the `render` command.
pub(crate) struct RenderOptions {
	pub(crate) markup: PathBuf,
	pub(crate) state: Option<PathBuf>,
	pub(crate) config: Option<PathBuf>,
	pub(crate) pretty: bool,
}

/// Output of the `render` command.
#[derive(Debug)]
pub(crate) struct RenderResult {
	pub(crate) html: String,
	pub(crate) roots: usize,
	pub(crate) disabled: Vec<DisabledBinding>,
}

/// Output of the `inspect` command.
#[derive(Debug)]
pub(crate) struct InspectReport {
	pub(crate) roots: Vec<InteractiveRoot>,
	pub(crate) bindings: Vec<String>,
	pub(crate) disabled: Vec<DisabledBinding>,
}

fn read(path: &Path) -> Result<String> {
	fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

pub(crate) fn load_config(path: Option<&Path>) -> Result<InteractivityConfig> {
	match path {
		Some(path) => InteractivityConfig::from_toml_str(&read(path)?)
			.with_context(|| format!("Invalid configuration in {}", path.display())),
		None => Ok(InteractivityConfig::default()),
	}
}

/// Builds a request from a payload-shaped JSON file.
pub(crate) fn load_request(path: Option<&Path>) -> Result<RequestContext> {
	let mut request = RequestContext::new();
	let Some(path) = path else {
		return Ok(request);
	};
	let payload = HydrationPayload::from_json(&read(path)?)
		.with_context(|| format!("Invalid state file {}", path.display()))?;
	for (namespace, state) in payload.state {
		request.set_state(&namespace, Value::Object(state))?;
	}
	for (namespace, config) in payload.config {
		request.set_config(&namespace, Value::Object(config))?;
	}
	Ok(request)
}

pub(crate) fn render(options: &RenderOptions) -> Result<RenderResult> {
	let mut config = load_config(options.config.as_deref())?;
	if options.pretty {
		config = config.pretty();
	}
	let request = load_request(options.state.as_deref())?;
	let markup = read(&options.markup)?;

	let page = ServerRenderer::new().with_config(config).render(&request, &markup)?;
	let roots = page.interactive_roots.len();
	let disabled = page.disabled_bindings.clone();
	tracing::info!(roots, disabled = disabled.len(), "rendered {}", options.markup.display());

	Ok(RenderResult {
		html: page.into_html_with_script(),
		roots,
		disabled,
	})
}

/// Runs a server pass against an empty store and describes every binding.
pub(crate) fn inspect(markup: &Path, config: Option<&Path>) -> Result<InspectReport> {
	let config = load_config(config)?;
	let prefix = config.directive_prefix.clone();
	let mut doc = Document::parse(&read(markup)?);
	let processor = DirectiveProcessor::new(DirectiveRegistry::new(), config, RenderMode::Server);
	let outcome = processor.process(&mut doc, &StateStore::server(), &mut ContextChain::new());

	let bindings = outcome
		.bindings
		.iter()
		.map(|bound| {
			let binding = &bound.binding;
			let tag = doc.tag_name(binding.element).unwrap_or("?");
			let target = match doc.get_attribute(binding.element, "id") {
				Some(id) => format!("<{}#{}>", tag, id),
				None => format!("<{}>", tag),
			};
			format!(
				"[{}] {} {}=\"{}\" ({})",
				binding.id.index(),
				target,
				binding.attribute_name(&prefix),
				binding.expression.raw(),
				binding.namespace
			)
		})
		.collect();

	Ok(InspectReport {
		roots: outcome.roots,
		bindings,
		disabled: outcome.disabled,
	})
}
