//! Built-in directive handlers.

use serde_json::Value;
use tracing::warn;

use super::{CallbackKind, DirectiveHandler, DirectiveInput, RenderMode, SideEffect};
use crate::dom::{Document, NodeId};
use crate::expr::Resolved;

/// `data-wp-bind--<attr>`: sets or removes an attribute.
///
/// `true` renders an empty attribute, `false`, `null` and undefined remove
/// it. `aria-*` and `data-*` attributes keep `"true"` / `"false"` as text.
#[derive(Debug, Clone, Copy, Default)]
pub struct BindDirective;

impl DirectiveHandler for BindDirective {
	fn apply(&self, doc: &mut Document, element: NodeId, input: &DirectiveInput<'_>) -> SideEffect {
		let Some(attr) = input.modifier else {
			warn!(expression = input.expression.raw(), "bind directive without attribute name");
			return SideEffect::None;
		};
		let stringly = attr.starts_with("aria-") || attr.starts_with("data-");
		match input.value.as_value() {
			None | Some(Value::Null) => {
				doc.remove_attribute(element, attr);
			}
			Some(Value::Bool(true)) => {
				doc.set_attribute(element, attr, if stringly { "true" } else { "" });
			}
			Some(Value::Bool(false)) if stringly => {
				doc.set_attribute(element, attr, "false");
			}
			Some(Value::Bool(false)) => {
				doc.remove_attribute(element, attr);
			}
			Some(Value::String(s)) => {
				doc.set_attribute(element, attr, s);
			}
			Some(other) => {
				doc.set_attribute(element, attr, &other.to_string());
			}
		}
		SideEffect::None
	}
}

/// `data-wp-text`: replaces the element's content with the value as text.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextDirective;

impl DirectiveHandler for TextDirective {
	fn apply(&self, doc: &mut Document, element: NodeId, input: &DirectiveInput<'_>) -> SideEffect {
		doc.set_text_content(element, &stringify(&input.value));
		SideEffect::None
	}
}

/// `data-wp-class--<name>`: toggles one class by truthiness.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClassDirective;

impl DirectiveHandler for ClassDirective {
	fn apply(&self, doc: &mut Document, element: NodeId, input: &DirectiveInput<'_>) -> SideEffect {
		match input.modifier {
			Some(class) => {
				doc.toggle_class(element, class, input.value.is_truthy());
			}
			None => warn!(expression = input.expression.raw(), "class directive without class name"),
		}
		SideEffect::None
	}
}

/// `data-wp-style--<property>`: sets or removes one inline style property.
#[derive(Debug, Clone, Copy, Default)]
pub struct StyleDirective;

impl DirectiveHandler for StyleDirective {
	fn apply(&self, doc: &mut Document, element: NodeId, input: &DirectiveInput<'_>) -> SideEffect {
		let Some(property) = input.modifier else {
			warn!(expression = input.expression.raw(), "style directive without property name");
			return SideEffect::None;
		};
		let value = match input.value.as_value() {
			Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
			Some(Value::Number(n)) => Some(n.to_string()),
			_ => None,
		};
		doc.set_style_property(element, property, value.as_deref());
		SideEffect::None
	}
}

/// `data-wp-on--<event>`: attaches a listener on the client.
#[derive(Debug, Clone, Copy, Default)]
pub struct OnDirective;

impl DirectiveHandler for OnDirective {
	fn apply(&self, _doc: &mut Document, _element: NodeId, input: &DirectiveInput<'_>) -> SideEffect {
		if input.mode == RenderMode::Server {
			return SideEffect::None;
		}
		let (Some(event), Some(action)) = (input.modifier, input.expression.action_key()) else {
			warn!(
				expression = input.expression.raw(),
				"event directive needs an event name and an action reference"
			);
			return SideEffect::None;
		};
		SideEffect::Listen {
			event: event.to_string(),
			action,
		}
	}
}

/// `data-wp-watch`: client callback re-run when its reads change.
#[derive(Debug, Clone, Copy, Default)]
pub struct WatchDirective;

impl DirectiveHandler for WatchDirective {
	fn apply(&self, _doc: &mut Document, _element: NodeId, input: &DirectiveInput<'_>) -> SideEffect {
		callback(input, CallbackKind::Watch)
	}
}

/// `data-wp-init`: client callback run once after hydration.
#[derive(Debug, Clone, Copy, Default)]
pub struct InitDirective;

impl DirectiveHandler for InitDirective {
	fn apply(&self, _doc: &mut Document, _element: NodeId, input: &DirectiveInput<'_>) -> SideEffect {
		callback(input, CallbackKind::Init)
	}
}

fn callback(input: &DirectiveInput<'_>, kind: CallbackKind) -> SideEffect {
	if input.mode == RenderMode::Server {
		return SideEffect::None;
	}
	match input.expression.action_key() {
		Some(action) => SideEffect::Callback { kind, action },
		None => {
			warn!(
				expression = input.expression.raw(),
				?kind,
				"callback directive needs an action or callback reference"
			);
			SideEffect::None
		}
	}
}

/// Text rendering of a value: strings verbatim, numbers and booleans as
/// JSON, everything else empty.
pub fn stringify(value: &Resolved) -> String {
	match value.as_value() {
		Some(Value::String(s)) => s.clone(),
		Some(v @ (Value::Number(_) | Value::Bool(_))) => v.to_string(),
		_ => String::new(),
	}
}
