//! Directive processor.
//!
//! Walks the document depth-first in pre-order. An element carrying the
//! interactive directive opens a root and names the namespace for its
//! subtree; directives outside any root are left alone. At each element the
//! context directive is applied first, then every other directive in
//! attribute declaration order. Binding ids follow that order, so two passes
//! over identical markup produce identical ids.
//!
//! Hiding directives never prune the walk: descendants of a hidden element
//! are still processed.

use std::collections::BTreeSet;
use std::rc::Rc;

use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::config::InteractivityConfig;
use crate::context::ContextChain;
use crate::directives::{DirectiveInput, DirectiveRegistry, RenderMode, SideEffect};
use crate::dom::{Document, NodeId};
use crate::expr::{Expression, Resolved, Source};
use crate::reactive::{BindingId, DepKey, DependencyTracker};
use crate::store::StateStore;

/// Splits `data-wp-<directive>[--<modifier>]` into its parts.
///
/// Returns `None` when `attribute` does not carry `prefix` or names no
/// directive.
pub fn parse_directive_attribute<'a>(
	prefix: &str,
	attribute: &'a str,
) -> Option<(&'a str, Option<&'a str>)> {
	let rest = attribute.strip_prefix(prefix)?;
	let (directive, modifier) = match rest.split_once("--") {
		Some((directive, modifier)) => (directive, Some(modifier).filter(|m| !m.is_empty())),
		None => (rest, None),
	};
	(!directive.is_empty()).then_some((directive, modifier))
}

/// A directive attached to an element.
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
	/// Stable evaluation-order id.
	pub id: BindingId,
	/// Target element.
	pub element: NodeId,
	/// Directive name, e.g. `bind`.
	pub directive: String,
	/// `--modifier` suffix.
	pub modifier: Option<String>,
	/// Parsed expression.
	pub expression: Expression,
	/// Namespace of the enclosing interactive root.
	pub namespace: String,
}

impl Binding {
	/// Attribute name this binding was read from.
	pub fn attribute_name(&self, prefix: &str) -> String {
		match &self.modifier {
			Some(modifier) => format!("{}{}--{}", prefix, self.directive, modifier),
			None => format!("{}{}", prefix, self.directive),
		}
	}
}

/// An element that opened an interactive region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InteractiveRoot {
	/// Root element.
	pub element: NodeId,
	/// Namespace for unqualified lookups in the subtree.
	pub namespace: String,
}

/// A binding together with the result of applying it.
#[derive(Debug, Clone)]
pub struct BoundDirective {
	/// The binding.
	pub binding: Binding,
	/// Keys read while evaluating it.
	pub deps: BTreeSet<DepKey>,
	/// Side effect reported by the handler.
	pub effect: SideEffect,
}

/// A directive that was not applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisabledBinding {
	/// Element carrying the attribute.
	pub element: NodeId,
	/// Full attribute name.
	pub attribute: String,
	/// Why it was disabled.
	pub reason: String,
}

/// Result of one pass.
#[derive(Debug, Clone, Default)]
pub struct ProcessOutcome {
	/// Interactive roots, in document order.
	pub roots: Vec<InteractiveRoot>,
	/// Applied bindings, in binding order.
	pub bindings: Vec<BoundDirective>,
	/// Bindings disabled by malformed expressions or attributes.
	pub disabled: Vec<DisabledBinding>,
}

/// Applies registered directives to a document.
#[derive(Debug, Clone)]
pub struct DirectiveProcessor {
	registry: DirectiveRegistry,
	config: InteractivityConfig,
	mode: RenderMode,
}

impl DirectiveProcessor {
	/// Creates a processor.
	pub fn new(registry: DirectiveRegistry, config: InteractivityConfig, mode: RenderMode) -> Self {
		Self {
			registry,
			config,
			mode,
		}
	}

	/// The pass this processor runs.
	pub fn mode(&self) -> RenderMode {
		self.mode
	}

	/// The active configuration.
	pub fn config(&self) -> &InteractivityConfig {
		&self.config
	}

	/// Runs one pass over `doc`, mutating it in place and pushing context
	/// frames into `contexts`.
	#[tracing::instrument(skip_all, fields(mode = ?self.mode))]
	pub fn process(
		&self,
		doc: &mut Document,
		store: &StateStore,
		contexts: &mut ContextChain,
	) -> ProcessOutcome {
		store.begin_pass();
		let interactive_attr = self.config.interactive_attr();
		let mut outcome = ProcessOutcome::default();
		let mut next_id = 0;

		let mut stack: Vec<(NodeId, Option<Rc<str>>)> = vec![(doc.root(), None)];
		while let Some((node, inherited)) = stack.pop() {
			let mut namespace = inherited;
			if doc.is_element(node) {
				if let Some(value) = doc.get_attribute(node, &interactive_attr) {
					match parse_namespace(value) {
						Some(ns) => {
							trace!(namespace = ns.as_str(), element = node.index(), "interactive root");
							outcome.roots.push(InteractiveRoot {
								element: node,
								namespace: ns.clone(),
							});
							namespace = Some(Rc::from(ns));
						}
						None => warn!(
							value,
							element = node.index(),
							"interactive directive without namespace"
						),
					}
				}
				if let Some(ns) = namespace.as_deref() {
					self.process_element(doc, store, contexts, node, ns, &mut next_id, &mut outcome);
				}
			}
			for &child in doc.children(node).iter().rev() {
				stack.push((child, namespace.clone()));
			}
		}

		debug!(
			roots = outcome.roots.len(),
			bindings = outcome.bindings.len(),
			disabled = outcome.disabled.len(),
			"directive pass complete"
		);
		outcome
	}

	#[allow(clippy::too_many_arguments)]
	fn process_element(
		&self,
		doc: &mut Document,
		store: &StateStore,
		contexts: &mut ContextChain,
		element: NodeId,
		namespace: &str,
		next_id: &mut usize,
		outcome: &mut ProcessOutcome,
	) {
		let prefix = self.config.directive_prefix.as_str();
		let attributes = doc.attributes(element).to_vec();

		for attr in attributes.iter() {
			if let Some(("context", _)) = parse_directive_attribute(prefix, &attr.name) {
				match serde_json::from_str::<Value>(&attr.value) {
					Ok(Value::Object(values)) => {
						contexts.push_context(doc, element, values);
					}
					Ok(_) | Err(_) => {
						warn!(
							attribute = attr.name.as_str(),
							element = element.index(),
							"context directive is not a JSON object"
						);
						outcome.disabled.push(DisabledBinding {
							element,
							attribute: attr.name.clone(),
							reason: "context value is not a JSON object".to_string(),
						});
					}
				}
			}
		}

		for attr in attributes {
			let Some((directive, modifier)) = parse_directive_attribute(prefix, &attr.name) else {
				continue;
			};
			if matches!(directive, "interactive" | "context") {
				continue;
			}
			if !self.registry.contains(directive) {
				if self.config.warn_unknown_directives {
					warn!(directive, element = element.index(), "unknown directive ignored");
				} else {
					debug!(directive, element = element.index(), "unknown directive ignored");
				}
				continue;
			}
			let expression = match Expression::parse(&attr.value) {
				Ok(expression) => expression,
				Err(err) => {
					warn!(
						attribute = attr.name.as_str(),
						element = element.index(),
						error = %err,
						"binding disabled"
					);
					outcome.disabled.push(DisabledBinding {
						element,
						attribute: attr.name.clone(),
						reason: err.to_string(),
					});
					continue;
				}
			};

			let binding = Binding {
				id: BindingId(*next_id),
				element,
				directive: directive.to_string(),
				modifier: modifier.map(str::to_string),
				expression,
				namespace: namespace.to_string(),
			};
			*next_id += 1;
			let adopt = self.mode == RenderMode::Client;
			let (deps, effect) = self.run_binding(doc, store, contexts, &binding, adopt);
			outcome.bindings.push(BoundDirective {
				binding,
				deps,
				effect,
			});
		}
	}

	/// Evaluates and applies one binding, returning its reads and side effect.
	pub(crate) fn apply_binding(
		&self,
		doc: &mut Document,
		store: &StateStore,
		contexts: &ContextChain,
		binding: &Binding,
	) -> (BTreeSet<DepKey>, SideEffect) {
		self.run_binding(doc, store, contexts, binding, false)
	}

	/// With `adopt` set, a binding whose source is undefined leaves the
	/// element as rendered.
	fn run_binding(
		&self,
		doc: &mut Document,
		store: &StateStore,
		contexts: &ContextChain,
		binding: &Binding,
		adopt: bool,
	) -> (BTreeSet<DepKey>, SideEffect) {
		let Some(handler) = self.registry.get(&binding.directive) else {
			return (BTreeSet::new(), SideEffect::None);
		};
		let tracker = DependencyTracker::new();
		let value = if binding.expression.is_action_reference() {
			Resolved::Undefined
		} else {
			let raw = resolve_source(
				doc,
				store,
				contexts,
				binding.element,
				&binding.expression,
				&binding.namespace,
				&tracker,
			);
			if adopt && raw.is_undefined() {
				trace!(
					binding = binding.id.index(),
					expression = binding.expression.raw(),
					"unresolved on hydration, keeping rendered markup"
				);
				return (tracker.take(), SideEffect::None);
			}
			binding.expression.apply_negation(raw)
		};
		let input = DirectiveInput {
			value,
			modifier: binding.modifier.as_deref(),
			expression: &binding.expression,
			mode: self.mode,
		};
		let effect = handler.apply(doc, binding.element, &input);
		(tracker.take(), effect)
	}
}

/// Resolves the source of `expression` at `element` without applying
/// negation, recording reads into `tracker`.
fn resolve_source(
	doc: &Document,
	store: &StateStore,
	contexts: &ContextChain,
	element: NodeId,
	expression: &Expression,
	namespace: &str,
	tracker: &DependencyTracker,
) -> Resolved {
	let namespace = expression.namespace().unwrap_or(namespace);
	match expression.source() {
		Source::State => store.lookup(namespace, expression.path(), Some(tracker)),
		Source::Context => contexts
			.lookup_path(doc, element, expression.path(), Some(tracker))
			.unwrap_or_default(),
		Source::Bare => {
			let identifier = expression.path().join(".");
			match contexts.resolve(doc, element, &identifier, store, Some(namespace), Some(tracker)) {
				Ok(resolved) => resolved,
				Err(err) => {
					debug!(error = %err, "treating unresolved reference as empty");
					Resolved::Undefined
				}
			}
		}
		Source::Actions | Source::Callbacks => Resolved::Undefined,
	}
}

fn parse_namespace(value: &str) -> Option<String> {
	let trimmed = value.trim();
	if trimmed.starts_with('{') {
		let parsed: Value = serde_json::from_str(trimmed).ok()?;
		parsed
			.get("namespace")?
			.as_str()
			.filter(|ns| !ns.is_empty())
			.map(str::to_string)
	} else {
		(!trimmed.is_empty()).then(|| trimmed.to_string())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::{fixture, rstest};
	use serde_json::json;

	#[fixture]
	fn server() -> DirectiveProcessor {
		DirectiveProcessor::new(
			DirectiveRegistry::new(),
			InteractivityConfig::default(),
			RenderMode::Server,
		)
	}

	fn run(processor: &DirectiveProcessor, store: &StateStore, markup: &str) -> (String, ProcessOutcome) {
		let mut doc = Document::parse(markup);
		let mut contexts = ContextChain::new();
		let outcome = processor.process(&mut doc, store, &mut contexts);
		(doc.to_html(), outcome)
	}

	#[rstest]
	#[case("data-wp-bind--hidden", Some(("bind", Some("hidden"))))]
	#[case("data-wp-text", Some(("text", None)))]
	#[case("data-wp-on--click", Some(("on", Some("click"))))]
	#[case("data-wp-class--", Some(("class", None)))]
	#[case("data-wp-", None)]
	#[case("data-other", None)]
	fn test_parse_directive_attribute(
		#[case] attr: &str,
		#[case] expected: Option<(&str, Option<&str>)>,
	) {
		assert_eq!(parse_directive_attribute("data-wp-", attr), expected);
	}

	#[rstest]
	#[case("my-plugin", Some("my-plugin"))]
	#[case(r#"{"namespace":"core/menu"}"#, Some("core/menu"))]
	#[case("  ", None)]
	#[case(r#"{"other":1}"#, None)]
	fn test_parse_namespace(#[case] value: &str, #[case] expected: Option<&str>) {
		assert_eq!(parse_namespace(value).as_deref(), expected);
	}

	#[rstest]
	fn test_accordion_server_render(server: DirectiveProcessor) {
		let mut store = StateStore::server();
		store.set_state("accordion", json!({"isOpen": false})).unwrap();
		let markup = r#"<div data-wp-interactive="accordion"><button data-wp-on--click="actions.toggle">T</button><div data-wp-bind--hidden="!state.isOpen">Body</div></div>"#;

		let (html, outcome) = run(&server, &store, markup);
		assert_eq!(
			html,
			r#"<div data-wp-interactive="accordion"><button data-wp-on--click="actions.toggle">T</button><div data-wp-bind--hidden="!state.isOpen" hidden>Body</div></div>"#
		);
		assert_eq!(outcome.roots.len(), 1);
		assert_eq!(outcome.bindings.len(), 2);
		assert!(outcome.bindings.iter().all(|b| b.effect == SideEffect::None));
	}

	#[rstest]
	fn test_directives_outside_roots_are_untouched(server: DirectiveProcessor) {
		let mut store = StateStore::server();
		store.set_state("ns", json!({"msg": "hi"})).unwrap();
		let markup = r#"<p data-wp-text="state.msg">static</p>"#;
		let (html, outcome) = run(&server, &store, markup);
		assert_eq!(html, markup);
		assert!(outcome.bindings.is_empty());
	}

	#[rstest]
	fn test_hidden_subtree_still_processed(server: DirectiveProcessor) {
		let mut store = StateStore::server();
		store
			.set_state("ns", json!({"open": false, "label": "Inner"}))
			.unwrap();
		let markup = r#"<div data-wp-interactive="ns"><section data-wp-bind--hidden="!state.open"><span data-wp-text="state.label"></span></section></div>"#;
		let (html, _) = run(&server, &store, markup);
		assert!(html.contains("<span data-wp-text=\"state.label\">Inner</span>"));
		assert!(html.contains(" hidden>"));
	}

	#[rstest]
	fn test_malformed_expression_disables_only_that_binding(server: DirectiveProcessor) {
		let mut store = StateStore::server();
		store.set_state("ns", json!({"a": "A", "b": "B"})).unwrap();
		let markup = r#"<div data-wp-interactive="ns"><i data-wp-text="state.a +"></i><b data-wp-text="state.b"></b></div>"#;
		let (html, outcome) = run(&server, &store, markup);
		assert!(html.contains(r#"<i data-wp-text="state.a +"></i>"#));
		assert!(html.contains(r#"<b data-wp-text="state.b">B</b>"#));
		assert_eq!(outcome.disabled.len(), 1);
		assert_eq!(outcome.disabled[0].attribute, "data-wp-text");
	}

	#[rstest]
	fn test_unknown_directive_left_untouched(server: DirectiveProcessor) {
		let store = StateStore::server();
		let markup = r#"<div data-wp-interactive="ns"><p data-wp-foo="state.bar">x</p></div>"#;
		let (html, outcome) = run(&server, &store, markup);
		assert_eq!(html, markup);
		assert!(outcome.bindings.is_empty());
		assert!(outcome.disabled.is_empty());
	}

	#[rstest]
	fn test_binding_ids_follow_document_then_declaration_order(server: DirectiveProcessor) {
		let mut store = StateStore::server();
		store.set_state("ns", json!({"x": 1})).unwrap();
		let markup = r#"<div data-wp-interactive="ns"><a data-wp-text="state.x" data-wp-class--on="state.x"></a><b data-wp-bind--title="state.x"></b><i data-wp-style--width="state.x"></i></div>"#;
		let (_, outcome) = run(&server, &store, markup);
		let order: Vec<(usize, &str)> = outcome
			.bindings
			.iter()
			.map(|b| (b.binding.id.index(), b.binding.directive.as_str()))
			.collect();
		assert_eq!(order, vec![(0, "text"), (1, "class"), (2, "bind"), (3, "style")]);
	}

	#[rstest]
	fn test_text_replaces_descendant_elements(server: DirectiveProcessor) {
		let mut store = StateStore::server();
		store.set_state("ns", json!({"x": "new"})).unwrap();
		let markup = r#"<div data-wp-interactive="ns"><a data-wp-text="state.x"><b data-wp-bind--title="state.x">old</b></a></div>"#;
		let (html, outcome) = run(&server, &store, markup);
		assert_eq!(
			html,
			r#"<div data-wp-interactive="ns"><a data-wp-text="state.x">new</a></div>"#
		);
		assert_eq!(outcome.bindings.len(), 1);
		assert_eq!(outcome.bindings[0].binding.directive, "text");
	}

	#[rstest]
	fn test_client_pass_keeps_markup_for_unresolved_values() {
		let processor = DirectiveProcessor::new(
			DirectiveRegistry::new(),
			InteractivityConfig::default(),
			RenderMode::Client,
		);
		let mut store = StateStore::server();
		store.set_state("ns", json!({"shown": "fresh"})).unwrap();
		let markup = r#"<div data-wp-interactive="ns"><em data-wp-text="state.secret">server</em><p data-wp-bind--hidden="!state.secret" hidden></p><b data-wp-text="state.shown">stale</b></div>"#;
		let (html, outcome) = run(&processor, &store, markup);
		assert_eq!(
			html,
			r#"<div data-wp-interactive="ns"><em data-wp-text="state.secret">server</em><p data-wp-bind--hidden="!state.secret" hidden></p><b data-wp-text="state.shown">fresh</b></div>"#
		);
		assert_eq!(
			outcome.bindings[0].deps,
			BTreeSet::from([DepKey::state("ns", "secret")])
		);
	}

	#[rstest]
	fn test_context_applies_before_other_directives(server: DirectiveProcessor) {
		let store = StateStore::server();
		let markup = r#"<ul data-wp-interactive="ns"><li data-wp-text="context.name" data-wp-context='{"name":"A"}'></li><li data-wp-context='{"name":"B"}'><span data-wp-text="name"></span></li></ul>"#;
		let (html, _) = run(&server, &store, markup);
		assert!(html.contains(r#"data-wp-text="context.name" data-wp-context="{&quot;name&quot;:&quot;A&quot;}">A</li>"#));
		assert!(html.contains(r#"<span data-wp-text="name">B</span>"#));
	}

	#[rstest]
	fn test_nested_root_switches_namespace(server: DirectiveProcessor) {
		let mut store = StateStore::server();
		store.set_state("outer", json!({"v": "O"})).unwrap();
		store.set_state("inner", json!({"v": "I"})).unwrap();
		let markup = r#"<div data-wp-interactive="outer"><p data-wp-text="state.v"></p><div data-wp-interactive='{"namespace":"inner"}'><p data-wp-text="state.v"></p><p data-wp-text="outer::state.v"></p></div></div>"#;
		let (html, outcome) = run(&server, &store, markup);
		assert_eq!(outcome.roots.len(), 2);
		assert_eq!(outcome.roots[1].namespace, "inner");
		assert!(html.contains(r#"<p data-wp-text="state.v">O</p>"#));
		assert!(html.contains(r#"<p data-wp-text="state.v">I</p>"#));
		assert!(html.contains(r#"<p data-wp-text="outer::state.v">O</p>"#));
	}

	#[rstest]
	fn test_client_mode_reports_listeners_and_deps() {
		let processor = DirectiveProcessor::new(
			DirectiveRegistry::new(),
			InteractivityConfig::default(),
			RenderMode::Client,
		);
		let mut store = StateStore::server();
		store.set_state("acc", json!({"isOpen": true})).unwrap();
		let markup = r#"<div data-wp-interactive="acc"><button data-wp-on--click="actions.toggle"></button><p data-wp-bind--hidden="!state.isOpen"></p></div>"#;
		let (_, outcome) = run(&processor, &store, markup);
		assert_eq!(
			outcome.bindings[0].effect,
			SideEffect::Listen {
				event: "click".to_string(),
				action: "actions.toggle".to_string(),
			}
		);
		assert!(outcome.bindings[0].deps.is_empty());
		assert_eq!(
			outcome.bindings[1].deps,
			BTreeSet::from([DepKey::state("acc", "isOpen")])
		);
	}
}
