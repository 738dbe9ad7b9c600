//! Markup tree used by both render modes.
//!
//! The server pass mutates a [`Document`] parsed from the host's markup and
//! serializes it back. The client runtime keeps the same structure alive as
//! its "live DOM". Nodes live in an arena and are addressed by [`NodeId`];
//! removed nodes stay in the arena but are no longer reachable from the root.

mod parser;
mod serialize;

pub use serialize::{escape_attr, escape_text};

/// Index of a node inside a [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
	/// The raw arena index.
	pub fn index(self) -> usize {
		self.0
	}
}

/// A single `name="value"` pair. Declaration order is preserved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
	/// Lower-cased attribute name.
	pub name: String,
	/// Decoded attribute value.
	pub value: String,
}

/// Element payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementData {
	/// Lower-cased tag name.
	pub tag: String,
	/// Attributes in declaration order.
	pub attrs: Vec<Attribute>,
	/// Whether the source used `<tag />` syntax.
	pub self_closing: bool,
}

/// What a node is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
	/// The synthetic document root.
	Fragment,
	/// An element.
	Element(ElementData),
	/// Text, stored as markup (already escaped).
	Text(String),
	/// `<!--...-->`
	Comment(String),
	/// `<!...>` declarations such as the doctype.
	Declaration(String),
}

#[derive(Debug, Clone)]
struct Node {
	kind: NodeKind,
	parent: Option<NodeId>,
	children: Vec<NodeId>,
}

/// An arena-backed markup tree.
#[derive(Debug, Clone)]
pub struct Document {
	nodes: Vec<Node>,
}

impl Default for Document {
	fn default() -> Self {
		Self::new()
	}
}

impl Document {
	/// Creates an empty document.
	pub fn new() -> Self {
		Self {
			nodes: vec![Node {
				kind: NodeKind::Fragment,
				parent: None,
				children: Vec::new(),
			}],
		}
	}

	/// Parses markup. Parsing is tolerant and never fails: unknown or broken
	/// constructs are kept as text.
	pub fn parse(markup: &str) -> Self {
		parser::parse_document(markup)
	}

	/// Serializes the document back to markup.
	pub fn to_html(&self) -> String {
		let mut out = String::new();
		for &child in self.children(self.root()) {
			serialize::write_node(self, child, &mut out);
		}
		out
	}

	/// Serializes a single node and its subtree.
	pub fn node_html(&self, id: NodeId) -> String {
		let mut out = String::new();
		serialize::write_node(self, id, &mut out);
		out
	}

	/// The synthetic root node.
	pub fn root(&self) -> NodeId {
		NodeId(0)
	}

	/// The node's kind.
	pub fn kind(&self, id: NodeId) -> Option<&NodeKind> {
		self.nodes.get(id.0).map(|n| &n.kind)
	}

	/// Element data for `id`, if it is an element.
	pub fn element(&self, id: NodeId) -> Option<&ElementData> {
		match self.kind(id) {
			Some(NodeKind::Element(el)) => Some(el),
			_ => None,
		}
	}

	fn element_mut(&mut self, id: NodeId) -> Option<&mut ElementData> {
		match self.nodes.get_mut(id.0).map(|n| &mut n.kind) {
			Some(NodeKind::Element(el)) => Some(el),
			_ => None,
		}
	}

	/// Whether `id` is an element.
	pub fn is_element(&self, id: NodeId) -> bool {
		self.element(id).is_some()
	}

	/// Tag name of an element.
	pub fn tag_name(&self, id: NodeId) -> Option<&str> {
		self.element(id).map(|el| el.tag.as_str())
	}

	/// Parent of `id`.
	pub fn parent(&self, id: NodeId) -> Option<NodeId> {
		self.nodes.get(id.0).and_then(|n| n.parent)
	}

	/// Children of `id` in document order.
	pub fn children(&self, id: NodeId) -> &[NodeId] {
		self.nodes
			.get(id.0)
			.map(|n| n.children.as_slice())
			.unwrap_or(&[])
	}

	/// Element children of `id`.
	pub fn element_children(&self, id: NodeId) -> Vec<NodeId> {
		self.children(id)
			.iter()
			.copied()
			.filter(|&c| self.is_element(c))
			.collect()
	}

	/// Iterates over strict ancestors, innermost first.
	pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
		std::iter::successors(self.parent(id), move |&n| self.parent(n))
	}

	/// `id` and its descendants in pre-order.
	pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
		let mut out = Vec::new();
		let mut stack = vec![id];
		while let Some(node) = stack.pop() {
			out.push(node);
			stack.extend(self.children(node).iter().rev().copied());
		}
		out
	}

	/// Whether `node` is `ancestor` or lies inside its subtree.
	pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
		node == ancestor || self.ancestors(node).any(|a| a == ancestor)
	}

	/// Whether `id` is still reachable from the root.
	pub fn is_attached(&self, id: NodeId) -> bool {
		id.0 < self.nodes.len() && self.contains(self.root(), id)
	}

	/// Attributes of an element, in declaration order.
	pub fn attributes(&self, id: NodeId) -> &[Attribute] {
		self.element(id).map(|el| el.attrs.as_slice()).unwrap_or(&[])
	}

	/// Value of an attribute.
	pub fn get_attribute(&self, id: NodeId, name: &str) -> Option<&str> {
		self.attributes(id)
			.iter()
			.find(|a| a.name == name)
			.map(|a| a.value.as_str())
	}

	/// Whether an attribute is present.
	pub fn has_attribute(&self, id: NodeId, name: &str) -> bool {
		self.get_attribute(id, name).is_some()
	}

	/// Sets an attribute, appending it if absent. Returns whether anything changed.
	pub fn set_attribute(&mut self, id: NodeId, name: &str, value: &str) -> bool {
		let Some(el) = self.element_mut(id) else {
			return false;
		};
		match el.attrs.iter_mut().find(|a| a.name == name) {
			Some(attr) if attr.value == value => false,
			Some(attr) => {
				attr.value = value.to_string();
				true
			}
			None => {
				el.attrs.push(Attribute {
					name: name.to_string(),
					value: value.to_string(),
				});
				true
			}
		}
	}

	/// Removes an attribute. Returns whether it was present.
	pub fn remove_attribute(&mut self, id: NodeId, name: &str) -> bool {
		let Some(el) = self.element_mut(id) else {
			return false;
		};
		let before = el.attrs.len();
		el.attrs.retain(|a| a.name != name);
		el.attrs.len() != before
	}

	/// Class names of an element.
	pub fn classes(&self, id: NodeId) -> Vec<&str> {
		self.get_attribute(id, "class")
			.map(|c| c.split_whitespace().collect())
			.unwrap_or_default()
	}

	/// Whether the element carries `class`.
	pub fn has_class(&self, id: NodeId, class: &str) -> bool {
		self.classes(id).contains(&class)
	}

	/// Adds or removes a class name. Removing the last class drops the attribute.
	pub fn toggle_class(&mut self, id: NodeId, class: &str, on: bool) -> bool {
		let mut classes: Vec<String> = self.classes(id).into_iter().map(str::to_string).collect();
		let present = classes.iter().any(|c| c == class);
		match (on, present) {
			(true, false) => classes.push(class.to_string()),
			(false, true) => classes.retain(|c| c != class),
			_ => return false,
		}
		if classes.is_empty() {
			self.remove_attribute(id, "class")
		} else {
			self.set_attribute(id, "class", &classes.join(" "))
		}
	}

	/// Value of one inline style property.
	pub fn style_property(&self, id: NodeId, property: &str) -> Option<String> {
		parse_style(self.get_attribute(id, "style").unwrap_or(""))
			.into_iter()
			.find(|(p, _)| p == property)
			.map(|(_, v)| v)
	}

	/// Sets (`Some`) or removes (`None`) one inline style property.
	pub fn set_style_property(&mut self, id: NodeId, property: &str, value: Option<&str>) -> bool {
		let mut declarations = parse_style(self.get_attribute(id, "style").unwrap_or(""));
		match value {
			Some(value) => match declarations.iter_mut().find(|(p, _)| p == property) {
				Some((_, existing)) => *existing = value.to_string(),
				None => declarations.push((property.to_string(), value.to_string())),
			},
			None => declarations.retain(|(p, _)| p != property),
		}
		if declarations.is_empty() {
			self.remove_attribute(id, "style")
		} else {
			let style = declarations
				.iter()
				.map(|(p, v)| format!("{}: {};", p, v))
				.collect::<Vec<_>>()
				.join(" ");
			self.set_attribute(id, "style", &style)
		}
	}

	/// Decoded text of the subtree.
	pub fn text_content(&self, id: NodeId) -> String {
		parser::decode_entities(&self.raw_text(id))
	}

	/// Undecoded text of the subtree (script bodies, for example).
	pub fn raw_text(&self, id: NodeId) -> String {
		self.descendants(id)
			.into_iter()
			.filter_map(|n| match self.kind(n) {
				Some(NodeKind::Text(t)) => Some(t.as_str()),
				_ => None,
			})
			.collect()
	}

	/// Replaces all children of an element with one text node.
	/// Returns whether the rendered text changed.
	pub fn set_text_content(&mut self, id: NodeId, text: &str) -> bool {
		if !self.is_element(id) {
			return false;
		}
		let escaped = escape_text(text);
		let children = self.children(id).to_vec();
		if let [only] = children.as_slice() {
			if matches!(self.kind(*only), Some(NodeKind::Text(t)) if *t == escaped) {
				return false;
			}
		}
		if children.is_empty() && escaped.is_empty() {
			return false;
		}
		for child in children {
			self.detach(child);
		}
		if !escaped.is_empty() {
			self.append(id, NodeKind::Text(escaped));
		}
		true
	}

	/// Appends a new node under `parent` and returns its id.
	pub fn append(&mut self, parent: NodeId, kind: NodeKind) -> NodeId {
		let id = NodeId(self.nodes.len());
		self.nodes.push(Node {
			kind,
			parent: Some(parent),
			children: Vec::new(),
		});
		if let Some(p) = self.nodes.get_mut(parent.0) {
			p.children.push(id);
		}
		id
	}

	/// Appends markup text, merging with a preceding text sibling.
	pub(crate) fn append_text_markup(&mut self, parent: NodeId, text: &str) {
		let last = self.children(parent).last().copied();
		if let Some(last) = last {
			if let Some(Node {
				kind: NodeKind::Text(existing),
				..
			}) = self.nodes.get_mut(last.0)
			{
				existing.push_str(text);
				return;
			}
		}
		self.append(parent, NodeKind::Text(text.to_string()));
	}

	/// Detaches `id` (and therefore its subtree) from the tree.
	pub fn remove(&mut self, id: NodeId) -> bool {
		if id == self.root() || !self.is_attached(id) {
			return false;
		}
		self.detach(id);
		true
	}

	fn detach(&mut self, id: NodeId) {
		if let Some(parent) = self.parent(id) {
			if let Some(p) = self.nodes.get_mut(parent.0) {
				p.children.retain(|&c| c != id);
			}
		}
		if let Some(node) = self.nodes.get_mut(id.0) {
			node.parent = None;
		}
	}

	/// First attached element whose `id` attribute equals `dom_id`.
	pub fn element_by_id(&self, dom_id: &str) -> Option<NodeId> {
		self.descendants(self.root())
			.into_iter()
			.find(|&n| self.get_attribute(n, "id") == Some(dom_id))
	}
}

fn parse_style(style: &str) -> Vec<(String, String)> {
	style
		.split(';')
		.filter_map(|decl| {
			let (property, value) = decl.split_once(':')?;
			let property = property.trim();
			(!property.is_empty()).then(|| (property.to_string(), value.trim().to_string()))
		})
		.collect()
}
