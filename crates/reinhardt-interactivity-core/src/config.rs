//! Engine configuration.
//!
//! Configuration is plain data: it can be built in code with the builder
//! methods or loaded from a TOML table.
//!
//! ```toml
//! directive_prefix = "data-wp-"
//! state_script_id = "wp-interactivity-state"
//! pretty_payload = false
//! warn_unknown_directives = false
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{InteractivityError, InteractivityResult};

/// Default attribute prefix for directives.
pub const DEFAULT_DIRECTIVE_PREFIX: &str = "data-wp-";

/// Default id of the `<script>` element carrying the hydration payload.
pub const DEFAULT_STATE_SCRIPT_ID: &str = "wp-interactivity-state";

/// Options shared by the server renderer and the client runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InteractivityConfig {
	/// Attribute prefix identifying directives (`data-wp-` by default).
	pub directive_prefix: String,
	/// Id of the script element holding the serialized state.
	pub state_script_id: String,
	/// Whether the payload script is pretty-printed.
	pub pretty_payload: bool,
	/// Log unknown directive names at warn level instead of debug level.
	pub warn_unknown_directives: bool,
}

impl Default for InteractivityConfig {
	fn default() -> Self {
		Self {
			directive_prefix: DEFAULT_DIRECTIVE_PREFIX.to_string(),
			state_script_id: DEFAULT_STATE_SCRIPT_ID.to_string(),
			pretty_payload: false,
			warn_unknown_directives: false,
		}
	}
}

impl InteractivityConfig {
	/// Creates the default configuration.
	pub fn new() -> Self {
		Self::default()
	}

	/// Loads configuration from a TOML document. Missing keys keep their defaults.
	pub fn from_toml_str(source: &str) -> InteractivityResult<Self> {
		let config: Self = toml::from_str(source)?;
		config.validate()?;
		Ok(config)
	}

	/// Sets the directive prefix.
	pub fn directive_prefix(mut self, prefix: impl Into<String>) -> Self {
		self.directive_prefix = prefix.into();
		self
	}

	/// Sets the payload script id.
	pub fn state_script_id(mut self, id: impl Into<String>) -> Self {
		self.state_script_id = id.into();
		self
	}

	/// Pretty-prints the payload script.
	pub fn pretty(mut self) -> Self {
		self.pretty_payload = true;
		self
	}

	/// Logs unknown directives at warn level.
	pub fn warn_unknown(mut self) -> Self {
		self.warn_unknown_directives = true;
		self
	}

	/// Full name of the interactive-root marker attribute.
	pub fn interactive_attr(&self) -> String {
		format!("{}interactive", self.directive_prefix)
	}

	/// Rejects unusable values.
	pub fn validate(&self) -> InteractivityResult<()> {
		if self.directive_prefix.is_empty() {
			return Err(InteractivityError::InvalidConfig {
				field: "directive_prefix".to_string(),
				message: "must not be empty".to_string(),
			});
		}
		if self.state_script_id.trim().is_empty() {
			return Err(InteractivityError::InvalidConfig {
				field: "state_script_id".to_string(),
				message: "must not be blank".to_string(),
			});
		}
		Ok(())
	}
}
