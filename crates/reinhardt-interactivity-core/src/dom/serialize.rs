//! Markup serialization.

use super::{Document, NodeId, NodeKind};

/// Elements without end tags.
pub(crate) const VOID_ELEMENTS: &[&str] = &[
	"area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
	"wbr",
];

/// Escapes a string for use in a double-quoted attribute value.
pub fn escape_attr(s: &str) -> String {
	s.replace('&', "&amp;")
		.replace('"', "&quot;")
		.replace('<', "&lt;")
		.replace('>', "&gt;")
}

/// Escapes a string for use as text content.
pub fn escape_text(s: &str) -> String {
	s.replace('&', "&amp;")
		.replace('<', "&lt;")
		.replace('>', "&gt;")
}

pub(crate) fn write_node(doc: &Document, id: NodeId, out: &mut String) {
	match doc.kind(id) {
		None | Some(NodeKind::Fragment) => {
			for &child in doc.children(id) {
				write_node(doc, child, out);
			}
		}
		Some(NodeKind::Text(text)) => out.push_str(text),
		Some(NodeKind::Comment(body)) => {
			out.push_str("<!--");
			out.push_str(body);
			out.push_str("-->");
		}
		Some(NodeKind::Declaration(body)) => {
			out.push_str("<!");
			out.push_str(body);
			out.push('>');
		}
		Some(NodeKind::Element(el)) => {
			out.push('<');
			out.push_str(&el.tag);
			for attr in &el.attrs {
				out.push(' ');
				out.push_str(&attr.name);
				if !attr.value.is_empty() {
					out.push_str("=\"");
					out.push_str(&escape_attr(&attr.value));
					out.push('"');
				}
			}
			if el.self_closing {
				out.push_str(" />");
				return;
			}
			out.push('>');
			if VOID_ELEMENTS.contains(&el.tag.as_str()) {
				return;
			}
			for &child in doc.children(id) {
				write_node(doc, child, out);
			}
			out.push_str("</");
			out.push_str(&el.tag);
			out.push('>');
		}
	}
}
