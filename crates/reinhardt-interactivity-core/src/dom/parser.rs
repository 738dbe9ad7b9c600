//! Tolerant markup parser.
//!
//! This is not an HTML5 tree builder. It keeps the host's markup as written
//! (attribute order, text escapes, comments) so the server pass only changes
//! what directives touch, and the client can adopt server output unchanged.

use nom::{
	IResult, Parser,
	bytes::complete::{tag, take_till1, take_until, take_while, take_while1},
	character::complete::{alpha1, char, multispace0, multispace1},
	combinator::{opt, recognize},
	multi::many0,
	sequence::{delimited, pair, preceded},
};

use super::serialize::VOID_ELEMENTS;
use super::{Attribute, Document, ElementData, NodeId, NodeKind};

/// Elements whose content is raw text up to the matching end tag.
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style", "textarea", "title"];

type RawAttribute<'a> = (&'a str, Option<&'a str>);

pub(crate) fn parse_document(input: &str) -> Document {
	let mut doc = Document::new();
	let root = doc.root();
	let mut stack: Vec<NodeId> = vec![root];
	let mut rest = input;

	while !rest.is_empty() {
		let parent = stack.last().copied().unwrap_or(root);

		if let Ok((next, body)) = comment(rest) {
			doc.append(parent, NodeKind::Comment(body.to_string()));
			rest = next;
			continue;
		}
		if let Ok((next, name)) = end_tag(rest) {
			close_element(&doc, &mut stack, &name.to_ascii_lowercase());
			rest = next;
			continue;
		}
		if let Ok((next, body)) = declaration(rest) {
			doc.append(parent, NodeKind::Declaration(body.to_string()));
			rest = next;
			continue;
		}
		if let Ok((next, (name, attrs, self_closing))) = start_tag(rest) {
			let tag = name.to_ascii_lowercase();
			let element = ElementData {
				tag: tag.clone(),
				attrs: attrs
					.into_iter()
					.map(|(name, value)| Attribute {
						name: name.to_ascii_lowercase(),
						value: value.map(decode_entities).unwrap_or_default(),
					})
					.collect(),
				self_closing,
			};
			let id = doc.append(parent, NodeKind::Element(element));
			rest = next;

			if self_closing || VOID_ELEMENTS.contains(&tag.as_str()) {
				continue;
			}
			if RAW_TEXT_ELEMENTS.contains(&tag.as_str()) {
				let (body, after) = split_raw_text(rest, &tag);
				if !body.is_empty() {
					doc.append_text_markup(id, body);
				}
				rest = after;
				continue;
			}
			stack.push(id);
			continue;
		}
		match text(rest) {
			Ok((next, body)) => {
				doc.append_text_markup(parent, body);
				rest = next;
			}
			Err(_) => {
				// A stray '<' that starts no markup construct.
				doc.append_text_markup(parent, "<");
				rest = &rest[1..];
			}
		}
	}

	doc
}

/// Pops the open-element stack back to the nearest element named `name`.
/// Unmatched end tags are ignored.
fn close_element(doc: &Document, stack: &mut Vec<NodeId>, name: &str) {
	if let Some(pos) = stack
		.iter()
		.rposition(|&id| doc.tag_name(id) == Some(name))
	{
		if pos > 0 {
			stack.truncate(pos);
		}
	}
}

/// Splits raw text content from the input, consuming the end tag if present.
fn split_raw_text<'a>(input: &'a str, tag_name: &str) -> (&'a str, &'a str) {
	let needle = format!("</{}", tag_name);
	match input.to_ascii_lowercase().find(&needle) {
		Some(idx) => {
			let (body, tail) = input.split_at(idx);
			match end_tag(tail) {
				Ok((after, _)) => (body, after),
				Err(_) => (body, &tail[needle.len()..]),
			}
		}
		None => (input, ""),
	}
}

/// Decodes the character references that matter for attribute values and text.
pub(crate) fn decode_entities(input: &str) -> String {
	if !input.contains('&') {
		return input.to_string();
	}
	let mut out = String::with_capacity(input.len());
	let mut rest = input;
	while let Some(pos) = rest.find('&') {
		out.push_str(&rest[..pos]);
		rest = &rest[pos..];
		match entity(rest) {
			Some((decoded, consumed)) => {
				out.push(decoded);
				rest = &rest[consumed..];
			}
			None => {
				out.push('&');
				rest = &rest[1..];
			}
		}
	}
	out.push_str(rest);
	out
}

fn entity(input: &str) -> Option<(char, usize)> {
	let end = input.find(';')?;
	let name = &input[1..end];
	let decoded = match name {
		"amp" => '&',
		"lt" => '<',
		"gt" => '>',
		"quot" => '"',
		"apos" | "#39" => '\'',
		"nbsp" => '\u{a0}',
		_ => {
			let code = if let Some(hex) = name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
				u32::from_str_radix(hex, 16).ok()?
			} else {
				name.strip_prefix('#')?.parse::<u32>().ok()?
			};
			char::from_u32(code)?
		}
	};
	Some((decoded, end + 1))
}

// ============================================================================
// Nom Parsers
// ============================================================================

fn tag_name(input: &str) -> IResult<&str, &str> {
	recognize(pair(
		alpha1,
		take_while(|c: char| c.is_ascii_alphanumeric() || matches!(c, '-' | ':' | '_')),
	))
	.parse(input)
}

fn attribute_name(input: &str) -> IResult<&str, &str> {
	take_while1(|c: char| {
		!c.is_whitespace() && !matches!(c, '/' | '>' | '=' | '"' | '\'' | '<')
	})
	.parse(input)
}

fn attribute_value(input: &str) -> IResult<&str, &str> {
	nom::branch::alt((
		delimited(char('"'), take_while(|c: char| c != '"'), char('"')),
		delimited(char('\''), take_while(|c: char| c != '\''), char('\'')),
		take_while1(|c: char| !c.is_whitespace() && c != '>'),
	))
	.parse(input)
}

fn attribute(input: &str) -> IResult<&str, RawAttribute<'_>> {
	pair(
		attribute_name,
		opt(preceded(
			delimited(multispace0, char('='), multispace0),
			attribute_value,
		)),
	)
	.parse(input)
}

fn start_tag(input: &str) -> IResult<&str, (&str, Vec<RawAttribute<'_>>, bool)> {
	let (input, _) = char('<').parse(input)?;
	let (input, name) = tag_name(input)?;
	let (input, attrs) = many0(preceded(multispace1, attribute)).parse(input)?;
	let (input, _) = multispace0.parse(input)?;
	let (input, slash) = opt(char('/')).parse(input)?;
	let (input, _) = multispace0.parse(input)?;
	let (input, _) = char('>').parse(input)?;
	Ok((input, (name, attrs, slash.is_some())))
}

fn end_tag(input: &str) -> IResult<&str, &str> {
	delimited(
		tag("</"),
		tag_name,
		pair(take_while(|c: char| c != '>'), char('>')),
	)
	.parse(input)
}

fn comment(input: &str) -> IResult<&str, &str> {
	delimited(tag("<!--"), take_until("-->"), tag("-->")).parse(input)
}

fn declaration(input: &str) -> IResult<&str, &str> {
	delimited(tag("<!"), take_while(|c: char| c != '>'), char('>')).parse(input)
}

fn text(input: &str) -> IResult<&str, &str> {
	take_till1(|c: char| c == '<').parse(input)
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	#[rstest]
	#[case("<!DOCTYPE html><html><body>x</body></html>")]
	#[case("<!-- note --><p>a</p>")]
	#[case(r#"<script type="application/json">{"a":"</div>"}</script>"#)]
	#[case("<svg><path d=\"M0\" /></svg>")]
	#[case("a < b and c")]
	#[case("<p>unclosed")]
	fn test_round_trip(#[case] html: &str) {
		let doc = parse_document(html);
		let expected = if html == "<p>unclosed" { "<p>unclosed</p>" } else { html };
		assert_eq!(doc.to_html(), expected);
	}

	#[rstest]
	fn test_unquoted_and_single_quoted_attributes() {
		let doc = parse_document("<div a=1 b='two' c>x</div>");
		let div = doc.element_children(doc.root())[0];
		assert_eq!(doc.get_attribute(div, "a"), Some("1"));
		assert_eq!(doc.get_attribute(div, "b"), Some("two"));
		assert_eq!(doc.get_attribute(div, "c"), Some(""));
	}

	#[rstest]
	fn test_uppercase_names_are_lowered() {
		let doc = parse_document(r#"<DIV Data-WP-Text="state.x"></DIV>"#);
		let div = doc.element_children(doc.root())[0];
		assert_eq!(doc.tag_name(div), Some("div"));
		assert_eq!(doc.get_attribute(div, "data-wp-text"), Some("state.x"));
	}

	#[rstest]
	fn test_stray_end_tag_ignored() {
		let doc = parse_document("<div><span>a</b></span></div>");
		assert_eq!(doc.to_html(), "<div><span>a</span></div>");
	}

	#[rstest]
	fn test_script_body_is_raw() {
		let doc = parse_document(r#"<script id="s">{"x":"a &amp; b"}</script>"#);
		let script = doc.element_children(doc.root())[0];
		assert_eq!(doc.raw_text(script), r#"{"x":"a &amp; b"}"#);
	}

	#[rstest]
	#[case("a &amp; b", "a & b")]
	#[case("&lt;x&gt;", "<x>")]
	#[case("&#65;&#x42;", "AB")]
	#[case("&unknown; &", "&unknown; &")]
	#[case("&quot;q&quot;", "\"q\"")]
	fn test_decode_entities(#[case] input: &str, #[case] expected: &str) {
		assert_eq!(decode_entities(input), expected);
	}
}
