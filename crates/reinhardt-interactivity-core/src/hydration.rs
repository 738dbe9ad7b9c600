//! Hydration bridge.
//!
//! The server serializes the client-visible part of its store into a
//! [`HydrationPayload`], embedded in the page as a JSON script element. The
//! client parses it back and merges it into its own store before any
//! client-side `set_state` call is applied.
//!
//! Wire format:
//!
//! ```json
//! {"state": {"<namespace>": {"key": "value"}}, "config": {"<namespace>": {}}}
//! ```
//!
//! Missing namespaces read as empty objects; `config` is optional.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::dom::{Document, escape_attr};
use crate::error::InteractivityResult;
use crate::store::StateStore;

/// Serialized client-visible state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HydrationPayload {
	/// Plain state per namespace.
	#[serde(default)]
	pub state: BTreeMap<String, Map<String, Value>>,
	/// Non-reactive configuration per namespace.
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub config: BTreeMap<String, Map<String, Value>>,
}

impl HydrationPayload {
	/// Creates an empty payload.
	pub fn new() -> Self {
		Self::default()
	}

	/// Collects the plain values and configuration of every namespace.
	/// Server-only and derived entries are left out.
	pub fn from_store(store: &StateStore) -> Self {
		let state = store
			.namespaces()
			.map(|ns| (ns.to_string(), store.snapshot(ns)))
			.filter(|(_, values)| !values.is_empty())
			.collect();
		Self {
			state,
			config: store.all_config().clone(),
		}
	}

	/// State of `namespace`; empty when absent.
	pub fn namespace(&self, namespace: &str) -> Map<String, Value> {
		self.state.get(namespace).cloned().unwrap_or_default()
	}

	/// Whether the payload carries nothing.
	pub fn is_empty(&self) -> bool {
		self.state.is_empty() && self.config.is_empty()
	}

	/// Serializes the payload to JSON.
	pub fn to_json(&self) -> Result<String, serde_json::Error> {
		serde_json::to_string(self)
	}

	/// Serializes the payload to pretty-printed JSON.
	pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
		serde_json::to_string_pretty(self)
	}

	/// Deserializes a payload.
	pub fn from_json(json: &str) -> InteractivityResult<Self> {
		Ok(serde_json::from_str(json)?)
	}

	/// Renders a `<script type="application/json">` element.
	///
	/// `<` is written as `\u003c` so no string in the payload can close the
	/// script element.
	pub fn to_script_tag(&self, id: &str, pretty: bool) -> String {
		let json = if pretty {
			self.to_json_pretty()
		} else {
			self.to_json()
		}
		.unwrap_or_else(|_| "{}".to_string());
		format!(
			r#"<script type="application/json" id="{}">{}</script>"#,
			escape_attr(id),
			json.replace('<', "\\u003c")
		)
	}

	/// Reads the payload embedded in `doc` under `script_id`.
	///
	/// Returns `Ok(None)` when the page carries no payload.
	pub fn extract_from_document(doc: &Document, script_id: &str) -> InteractivityResult<Option<Self>> {
		let Some(script) = doc.element_by_id(script_id) else {
			debug!(script_id, "no hydration payload in document");
			return Ok(None);
		};
		let json = doc.raw_text(script);
		if json.trim().is_empty() {
			return Ok(None);
		}
		Self::from_json(&json).map(Some)
	}
}

/// Serializes the client-visible part of `store`.
pub fn serialize(store: &StateStore) -> HydrationPayload {
	HydrationPayload::from_store(store)
}

/// Merges `payload` into a client store, then applies queued client calls.
pub fn hydrate(store: &mut StateStore, payload: &HydrationPayload) -> InteractivityResult<()> {
	debug!(namespaces = payload.state.len(), "hydrating store");
	store.absorb_server_state(&payload.state, &payload.config)
}

/// Parses `json` and merges it into a client store.
pub fn hydrate_json(store: &mut StateStore, json: &str) -> InteractivityResult<()> {
	let payload = HydrationPayload::from_json(json)?;
	hydrate(store, &payload)
}
