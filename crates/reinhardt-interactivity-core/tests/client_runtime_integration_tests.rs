//! Integration tests for the client runtime.
//!
//! These tests verify:
//! 1. Server-rendered markup hydrates and reacts to events
//! 2. Only bindings that read changed keys re-run
//! 3. Context frames stay independent between siblings
//! 4. Derived state, watch and init callbacks
//! 5. Event bubbling, asynchronous actions and subtree teardown

use reinhardt_interactivity_core::prelude::*;
use rstest::{fixture, rstest};
use serde_json::{Value, json};

const ACCORDION: &str = r#"<body><div data-wp-interactive="accordion"><button id="toggle" data-wp-on--click="actions.toggle" data-wp-bind--aria-expanded="state.isOpen">Toggle</button><div id="panel" data-wp-bind--hidden="!state.isOpen">Body</div><h2 id="title" data-wp-text="state.title"></h2></div></body>"#;

const LIST: &str = r#"<ul data-wp-interactive="list"><li id="a" data-wp-context='{"open":false}'><button id="a-btn" data-wp-on--click="actions.toggle"></button><p id="a-body" data-wp-bind--hidden="!context.open"></p></li><li id="b" data-wp-context='{"open":false}'><button id="b-btn" data-wp-on--click="actions.toggle"></button><p id="b-body" data-wp-bind--hidden="!context.open"></p></li></ul>"#;

fn toggle_actions(namespace: &str) -> ActionRegistry {
	let mut actions = ActionRegistry::new();
	actions.action(namespace, "toggle", |cx| {
		let open = cx.state("isOpen").is_truthy();
		cx.set_state("isOpen", json!(!open))
	});
	actions
}

fn context_toggle() -> ActionRegistry {
	let mut actions = ActionRegistry::new();
	actions.action("list", "toggle", |cx| {
		let open = cx.context("open").is_truthy();
		cx.set_context("open", json!(!open))
	});
	actions
}

#[fixture]
fn server_html() -> String {
	let mut request = RequestContext::new();
	request
		.set_state("accordion", json!({"isOpen": false, "title": "FAQ"}))
		.unwrap();
	ServerRenderer::new()
		.render(&request, ACCORDION)
		.unwrap()
		.into_html_with_script()
}

#[rstest]
fn test_server_to_client_accordion(server_html: String) {
	// Arrange
	let mut runtime = ClientRuntime::builder()
		.actions(toggle_actions("accordion"))
		.build(&server_html)
		.unwrap();
	let panel = runtime.element_by_id("panel").unwrap();
	let toggle = runtime.element_by_id("toggle").unwrap();
	let title = runtime.element_by_id("title").unwrap();
	assert!(runtime.document().has_attribute(panel, "hidden"));

	// Act
	let report = runtime.dispatch_by_id("toggle", "click").unwrap();

	// Assert
	assert!(!runtime.document().has_attribute(panel, "hidden"));
	assert_eq!(runtime.document().get_attribute(toggle, "aria-expanded"), Some("true"));
	assert_eq!(runtime.document().text_content(title), "FAQ");
	assert_eq!(report.elements, [toggle, panel].into_iter().collect());
	assert_eq!(runtime.state("accordion", "isOpen"), Resolved::Value(json!(true)));
}

#[rstest]
fn test_toggle_twice_restores_markup(server_html: String) {
	// Arrange
	let mut runtime = ClientRuntime::builder()
		.actions(toggle_actions("accordion"))
		.build(&server_html)
		.unwrap();
	let before = runtime.html();

	// Act
	runtime.dispatch_by_id("toggle", "click").unwrap();
	runtime.dispatch_by_id("toggle", "click").unwrap();

	// Assert
	assert_eq!(runtime.html(), before);
}

#[rstest]
fn test_unknown_action_reports_namespace_and_key(server_html: String) {
	// Arrange
	let mut runtime = ClientRuntime::builder().build(&server_html).unwrap();

	// Act
	let result = runtime.dispatch_by_id("toggle", "click");

	// Assert
	assert!(
		matches!(result, Err(InteractivityError::UnknownAction(key)) if key == "accordion::actions.toggle")
	);
}

#[rstest]
fn test_sibling_contexts_are_independent() {
	// Arrange
	let mut runtime = ClientRuntime::builder()
		.actions(context_toggle())
		.build(LIST)
		.unwrap();
	let a_body = runtime.element_by_id("a-body").unwrap();
	let b_body = runtime.element_by_id("b-body").unwrap();

	// Act
	let report = runtime.dispatch_by_id("a-btn", "click").unwrap();

	// Assert
	assert!(!runtime.document().has_attribute(a_body, "hidden"));
	assert!(runtime.document().has_attribute(b_body, "hidden"));
	assert_eq!(report.elements, [a_body].into_iter().collect());
	assert_eq!(report.rerun.len(), 1);
}

#[rstest]
fn test_unknown_directive_leaves_markup_untouched() {
	// Arrange
	let markup = r#"<div data-wp-interactive="ns"><p data-wp-foo="state.bar">x</p></div>"#;

	// Act
	let runtime = ClientRuntime::builder().build(markup).unwrap();

	// Assert
	assert_eq!(runtime.html(), markup);
	assert_eq!(runtime.binding_count(), 0);
}

#[rstest]
fn test_binding_ids_are_deterministic() {
	// Act
	let first = ClientRuntime::builder().build(LIST).unwrap();
	let second = ClientRuntime::builder().build(LIST).unwrap();

	// Assert
	let ids = |runtime: &ClientRuntime, dom_id: &str| -> Vec<usize> {
		let element = runtime.element_by_id(dom_id).unwrap();
		runtime
			.bindings_for(element)
			.iter()
			.map(|b| b.id.index())
			.collect()
	};
	for dom_id in ["a-btn", "a-body", "b-btn", "b-body"] {
		assert_eq!(ids(&first, dom_id), ids(&second, dom_id));
	}
	assert_eq!(ids(&first, "b-body"), vec![3]);
}

#[rstest]
fn test_derived_state_follows_its_inputs() {
	// Arrange
	let markup = r#"<div data-wp-interactive="cart"><button id="add" data-wp-on--click="actions.add"></button><span id="label" data-wp-text="state.label"></span></div>"#;
	let mut actions = ActionRegistry::new();
	actions.action("cart", "add", |cx| {
		let count = cx.state("count").as_value().and_then(Value::as_i64).unwrap_or(0);
		cx.set_state("count", json!(count + 1))
	});
	let mut runtime = ClientRuntime::builder()
		.payload_json(r#"{"state":{"cart":{"count":1}}}"#)
		.derived("cart", "label", |state| json!(format!("{} items", state.value("count"))))
		.actions(actions)
		.build(markup)
		.unwrap();
	let label = runtime.element_by_id("label").unwrap();
	assert_eq!(runtime.document().text_content(label), "1 items");

	// Act
	runtime.dispatch_by_id("add", "click").unwrap();

	// Assert
	assert_eq!(runtime.document().text_content(label), "2 items");
}

#[rstest]
fn test_derived_state_rejects_writes() {
	// Arrange
	let markup = r#"<div id="root" data-wp-interactive="cart"></div>"#;
	let mut actions = ActionRegistry::new();
	actions.action("cart", "overwrite", |cx| cx.set_state("label", json!("nope")));
	let mut runtime = ClientRuntime::builder()
		.derived("cart", "label", |_| json!("fixed"))
		.actions(actions)
		.build(markup)
		.unwrap();
	let root = runtime.element_by_id("root").unwrap();

	// Act
	let result = runtime.run_action("cart", "actions.overwrite", root);

	// Assert
	assert!(matches!(result, Err(InteractivityError::ReadOnlyState { .. })));
	assert_eq!(runtime.state("cart", "label"), Resolved::Value(json!("fixed")));
}

#[rstest]
fn test_watch_reruns_when_its_reads_change() {
	// Arrange
	let markup = r#"<div data-wp-interactive="counter" data-wp-watch="callbacks.double"><button id="inc" data-wp-on--click="actions.inc"></button><span id="out" data-wp-text="state.doubled"></span></div>"#;
	let mut actions = ActionRegistry::new();
	actions
		.action("counter", "inc", |cx| {
			let n = cx.state("n").as_value().and_then(Value::as_i64).unwrap_or(0);
			cx.set_state("n", json!(n + 1))
		})
		.callback("counter", "double", |cx| {
			let n = cx.state("n").as_value().and_then(Value::as_i64).unwrap_or(0);
			cx.set_state("doubled", json!(n * 2))
		});
	let mut runtime = ClientRuntime::builder()
		.payload_json(r#"{"state":{"counter":{"n":2,"doubled":0}}}"#)
		.actions(actions)
		.build(markup)
		.unwrap();
	let out = runtime.element_by_id("out").unwrap();
	assert_eq!(runtime.document().text_content(out), "4");

	// Act
	runtime.dispatch_by_id("inc", "click").unwrap();

	// Assert
	assert_eq!(runtime.document().text_content(out), "6");
}

#[rstest]
fn test_init_runs_once_after_hydration() {
	// Arrange
	let markup = r#"<div data-wp-interactive="app" data-wp-init="callbacks.setup"><button id="poke" data-wp-on--click="actions.poke"></button><span id="inits" data-wp-text="state.inits"></span></div>"#;
	let mut actions = ActionRegistry::new();
	actions
		.callback("app", "setup", |cx| {
			let inits = cx.state("inits").as_value().and_then(Value::as_i64).unwrap_or(0);
			cx.set_state("inits", json!(inits + 1))
		})
		.action("app", "poke", |cx| cx.set_state("poked", json!(true)));

	// Act
	let mut runtime = ClientRuntime::builder()
		.payload_json(r#"{"state":{"app":{"inits":0}}}"#)
		.actions(actions)
		.build(markup)
		.unwrap();
	runtime.dispatch_by_id("poke", "click").unwrap();

	// Assert
	let inits = runtime.element_by_id("inits").unwrap();
	assert_eq!(runtime.document().text_content(inits), "1");
	assert_eq!(runtime.state("app", "inits"), Resolved::Value(json!(1)));
}

#[rstest]
fn test_events_bubble_to_the_root() {
	// Arrange
	let markup = r#"<div id="root" data-wp-interactive="log" data-wp-on--click="actions.outer"><button id="btn" data-wp-on--click="actions.inner"></button></div>"#;
	let mut actions = ActionRegistry::new();
	for name in ["inner", "outer"] {
		actions.action("log", name, move |cx| {
			let mut calls = cx
				.state("calls")
				.into_value()
				.and_then(|v| v.as_array().cloned())
				.unwrap_or_default();
			calls.push(json!(name));
			cx.set_state("calls", Value::Array(calls))
		});
	}
	let mut runtime = ClientRuntime::builder()
		.payload_json(r#"{"state":{"log":{"calls":[]}}}"#)
		.actions(actions)
		.build(markup)
		.unwrap();

	// Act
	runtime.dispatch_by_id("btn", "click").unwrap();

	// Assert
	assert_eq!(
		runtime.state("log", "calls"),
		Resolved::Value(json!(["inner", "outer"]))
	);
}

#[rstest]
fn test_remove_element_tears_down_subtree() {
	// Arrange
	let mut runtime = ClientRuntime::builder()
		.actions(context_toggle())
		.build(LIST)
		.unwrap();
	let item = runtime.element_by_id("a").unwrap();
	let button = runtime.element_by_id("a-btn").unwrap();
	assert_eq!(runtime.listener_count(), 2);

	// Act
	let removed = runtime.remove_element(item).unwrap();

	// Assert
	assert_eq!(removed, 2);
	assert_eq!(runtime.binding_count(), 2);
	assert_eq!(runtime.listener_count(), 1);
	assert!(matches!(
		runtime.dispatch(button, "click"),
		Err(InteractivityError::NodeNotFound(_))
	));
	assert!(runtime.dispatch_by_id("b-btn", "click").is_ok());
}

#[rstest]
fn test_async_action_through_sync_dispatch_is_rejected() {
	// Arrange
	let markup = r#"<div data-wp-interactive="cart"><button id="load" data-wp-on--click="actions.load"></button></div>"#;
	let mut actions = ActionRegistry::new();
	actions.async_action("cart", "load", |_snapshot| async { Ok(Vec::new()) });
	let mut runtime = ClientRuntime::builder().actions(actions).build(markup).unwrap();

	// Act
	let result = runtime.dispatch_by_id("load", "click");

	// Assert
	assert!(matches!(result, Err(InteractivityError::AsyncActionRequiresAwait(_))));
}

#[tokio::test]
async fn test_async_action_applies_mutations_together() {
	// Arrange
	let markup = r#"<div data-wp-interactive="cart"><button id="load" data-wp-on--click="actions.load"></button><span id="count" data-wp-text="state.count"></span><p id="status" data-wp-bind--hidden="!state.loaded">Loaded</p></div>"#;
	let mut actions = ActionRegistry::new();
	actions.async_action("cart", "load", |snapshot| async move {
		let count = snapshot.state.get("count").and_then(Value::as_i64).unwrap_or(0);
		Ok(vec![
			Mutation::state("count", json!(count + 5)),
			Mutation::state("loaded", json!(true)),
		])
	});
	let mut runtime = ClientRuntime::builder()
		.payload_json(r#"{"state":{"cart":{"count":1,"loaded":false}}}"#)
		.actions(actions)
		.build(markup)
		.unwrap();
	let load = runtime.element_by_id("load").unwrap();

	// Act
	let report = runtime.dispatch_async(Event::new("click", load)).await.unwrap();

	// Assert
	let count = runtime.element_by_id("count").unwrap();
	let status = runtime.element_by_id("status").unwrap();
	assert_eq!(runtime.document().text_content(count), "6");
	assert!(!runtime.document().has_attribute(status, "hidden"));
	assert_eq!(report.elements, [count, status].into_iter().collect());
}

#[rstest]
fn test_root_context_matches_server_render() {
	// Arrange
	let translations = json!({"i18n": {"close": "Fermer"}})
		.as_object()
		.cloned()
		.unwrap();
	let markup = r#"<body><div data-wp-interactive="dialog"><button id="close" data-wp-on--click="actions.relabel" data-wp-text="context.i18n.close"></button></div></body>"#;
	let html = ServerRenderer::new()
		.with_root_context(translations.clone())
		.render(&RequestContext::new(), markup)
		.unwrap()
		.into_html_with_script();
	let mut actions = ActionRegistry::new();
	actions.action("dialog", "relabel", |cx| {
		cx.set_context("i18n", json!({"close": "Schließen"}))
	});

	// Act
	let mut runtime = ClientRuntime::builder()
		.root_context(translations)
		.actions(actions)
		.build(&html)
		.unwrap();
	let close = runtime.element_by_id("close").unwrap();
	let hydrated = runtime.document().text_content(close);
	runtime.dispatch(close, "click").unwrap();

	// Assert
	assert_eq!(hydrated, "Fermer");
	assert_eq!(runtime.document().text_content(close), "Schließen");
}

#[rstest]
fn test_root_context_text_kept_without_client_frame() {
	// Arrange
	let translations = json!({"i18n": {"close": "Fermer"}})
		.as_object()
		.cloned()
		.unwrap();
	let markup = r#"<div data-wp-interactive="dialog"><button id="close" data-wp-text="context.i18n.close"></button></div>"#;
	let html = ServerRenderer::new()
		.with_root_context(translations)
		.render(&RequestContext::new(), markup)
		.unwrap()
		.into_html_with_script();

	// Act
	let runtime = ClientRuntime::builder().build(&html).unwrap();

	// Assert
	let close = runtime.element_by_id("close").unwrap();
	assert_eq!(runtime.document().text_content(close), "Fermer");
}

#[rstest]
fn test_failing_listener_does_not_stop_bubbling() {
	// Arrange
	let markup = r#"<div id="root" data-wp-interactive="log" data-wp-on--click="actions.outer"><button id="btn" data-wp-on--click="actions.missing"></button><span id="last" data-wp-text="state.last"></span></div>"#;
	let mut actions = ActionRegistry::new();
	actions.action("log", "outer", |cx| cx.set_state("last", json!("outer")));
	let mut runtime = ClientRuntime::builder()
		.payload_json(r#"{"state":{"log":{"last":"none"}}}"#)
		.actions(actions)
		.build(markup)
		.unwrap();

	// Act
	let result = runtime.dispatch_by_id("btn", "click");

	// Assert
	assert!(
		matches!(result, Err(InteractivityError::UnknownAction(key)) if key == "log::actions.missing")
	);
	let last = runtime.element_by_id("last").unwrap();
	assert_eq!(runtime.state("log", "last"), Resolved::Value(json!("outer")));
	assert_eq!(runtime.document().text_content(last), "outer");
	assert_eq!(runtime.last_flush().elements, [last].into_iter().collect());
}
