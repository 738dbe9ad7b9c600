//! Directive expressions.
//!
//! Expressions are deliberately tiny: an optional run of `!` negations, an
//! optional `namespace::` prefix and a dot-path. The first path segment selects
//! the source:
//!
//! | Root | Resolves against |
//! |------|------------------|
//! | `state.a.b` | the namespace store |
//! | `context.a.b` | the context scope chain |
//! | `actions.a` / `callbacks.a` | the action registry (event and watch directives) |
//! | `a.b` | context chain first, then the namespace |
//!
//! Parsing uses nom combinators; nothing else is evaluated.

use nom::{
	IResult, Parser,
	branch::alt,
	bytes::complete::{tag, take_while1},
	character::complete::{alpha1, alphanumeric1, char, digit1, multispace0},
	combinator::{all_consuming, opt, recognize},
	multi::{many0_count, separated_list1},
	sequence::{delimited, pair, terminated},
};
use serde_json::Value;

use crate::error::{InteractivityError, InteractivityResult};

/// Where an expression's path is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
	/// `state.*`
	State,
	/// `context.*`
	Context,
	/// `actions.*`
	Actions,
	/// `callbacks.*`
	Callbacks,
	/// A bare identifier path.
	Bare,
}

impl Source {
	/// The root keyword of this source, if it has one.
	pub fn keyword(self) -> Option<&'static str> {
		match self {
			Self::State => Some("state"),
			Self::Context => Some("context"),
			Self::Actions => Some("actions"),
			Self::Callbacks => Some("callbacks"),
			Self::Bare => None,
		}
	}
}

/// A parsed directive expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expression {
	raw: String,
	negations: usize,
	namespace: Option<String>,
	source: Source,
	path: Vec<String>,
}

impl Expression {
	/// Parses an expression string.
	pub fn parse(input: &str) -> InteractivityResult<Self> {
		if input.trim().is_empty() {
			return Err(parse_error(input, "empty expression"));
		}

		let (_, (negations, namespace, segments)) =
			all_consuming(delimited(multispace0, expression, multispace0))
				.parse(input)
				.map_err(|e| match e {
					nom::Err::Error(e) | nom::Err::Failure(e) => {
						parse_error(input, &format!("unexpected input at '{}'", e.input))
					}
					nom::Err::Incomplete(_) => parse_error(input, "incomplete expression"),
				})?;

		let first = segments[0];
		if first.starts_with(|c: char| c.is_ascii_digit()) {
			return Err(parse_error(input, "path must start with an identifier"));
		}

		let source = match first {
			"state" => Source::State,
			"context" => Source::Context,
			"actions" => Source::Actions,
			"callbacks" => Source::Callbacks,
			_ => Source::Bare,
		};

		let path: Vec<String> = match source {
			Source::Bare => segments.iter().map(|s| s.to_string()).collect(),
			_ => segments[1..].iter().map(|s| s.to_string()).collect(),
		};

		if path.is_empty() {
			return Err(parse_error(input, &format!("missing key after '{}'", first)));
		}
		if source == Source::Bare && namespace.is_some() {
			return Err(parse_error(
				input,
				"namespaced expressions need a state or context root",
			));
		}
		if matches!(source, Source::Actions | Source::Callbacks) && negations > 0 {
			return Err(parse_error(input, "action references cannot be negated"));
		}

		Ok(Self {
			raw: input.trim().to_string(),
			negations,
			namespace: namespace.map(str::to_string),
			source,
			path,
		})
	}

	/// The trimmed source text.
	pub fn raw(&self) -> &str {
		&self.raw
	}

	/// The explicit namespace (`ns::state.x`), if any.
	pub fn namespace(&self) -> Option<&str> {
		self.namespace.as_deref()
	}

	/// The resolution source.
	pub fn source(&self) -> Source {
		self.source
	}

	/// Path segments below the root keyword.
	pub fn path(&self) -> &[String] {
		&self.path
	}

	/// Whether the result is logically negated.
	pub fn is_negated(&self) -> bool {
		self.negations % 2 == 1
	}

	/// Whether this expression references an action or callback.
	pub fn is_action_reference(&self) -> bool {
		matches!(self.source, Source::Actions | Source::Callbacks)
	}

	/// Registry key for action references, e.g. `actions.toggle`.
	pub fn action_key(&self) -> Option<String> {
		let keyword = self.source.keyword()?;
		self.is_action_reference()
			.then(|| format!("{}.{}", keyword, self.path.join(".")))
	}

	/// Applies the parsed negations to a resolved value.
	pub fn apply_negation(&self, resolved: Resolved) -> Resolved {
		if self.negations == 0 {
			return resolved;
		}
		let truthy = resolved.is_truthy();
		Resolved::Value(Value::Bool(if self.is_negated() { !truthy } else { truthy }))
	}
}

/// The value an expression evaluates to.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Resolved {
	/// A path segment was missing.
	#[default]
	Undefined,
	/// A concrete JSON value.
	Value(Value),
}

impl Resolved {
	/// JavaScript-style truthiness. `Undefined` is falsy.
	pub fn is_truthy(&self) -> bool {
		match self {
			Self::Undefined => false,
			Self::Value(value) => match value {
				Value::Null => false,
				Value::Bool(b) => *b,
				Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
				Value::String(s) => !s.is_empty(),
				Value::Array(_) | Value::Object(_) => true,
			},
		}
	}

	/// Returns the JSON value, if defined.
	pub fn as_value(&self) -> Option<&Value> {
		match self {
			Self::Undefined => None,
			Self::Value(value) => Some(value),
		}
	}

	/// Consumes self, returning the JSON value if defined.
	pub fn into_value(self) -> Option<Value> {
		match self {
			Self::Undefined => None,
			Self::Value(value) => Some(value),
		}
	}

	/// Whether the value is undefined.
	pub fn is_undefined(&self) -> bool {
		matches!(self, Self::Undefined)
	}
}

impl From<Value> for Resolved {
	fn from(value: Value) -> Self {
		Self::Value(value)
	}
}

/// Walks `segments` into `value`. Arrays accept numeric segments.
pub fn lookup_path(value: &Value, segments: &[String]) -> Resolved {
	let mut current = value;
	for segment in segments {
		let next = match current {
			Value::Object(map) => map.get(segment),
			Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
			_ => None,
		};
		match next {
			Some(v) => current = v,
			None => return Resolved::Undefined,
		}
	}
	Resolved::Value(current.clone())
}

fn parse_error(input: &str, reason: &str) -> InteractivityError {
	InteractivityError::ExpressionParse {
		expression: input.to_string(),
		reason: reason.to_string(),
	}
}

// ============================================================================
// Nom Parsers
// ============================================================================

/// Identifier: letter, `_` or `$`, then alphanumerics, `_` or `$`.
fn identifier(input: &str) -> IResult<&str, &str> {
	recognize(pair(
		alt((alpha1, tag("_"), tag("$"))),
		many0_count(alt((alphanumeric1, tag("_"), tag("$")))),
	))
	.parse(input)
}

/// Path segment: identifier or array index.
fn segment(input: &str) -> IResult<&str, &str> {
	alt((identifier, digit1)).parse(input)
}

/// `namespace::` prefix. Namespaces may contain `-` and `/`.
fn namespace_prefix(input: &str) -> IResult<&str, &str> {
	terminated(
		take_while1(|c: char| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '/')),
		tag("::"),
	)
	.parse(input)
}

fn expression(input: &str) -> IResult<&str, (usize, Option<&str>, Vec<&str>)> {
	(
		many0_count(terminated(char('!'), multispace0)),
		opt(namespace_prefix),
		separated_list1(char('.'), segment),
	)
		.parse(input)
}
