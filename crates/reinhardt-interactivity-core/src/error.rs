//! Error types for the interactivity engine.
//!
//! Only store-initialization conflicts and hydration conflicts are programmer
//! errors. Everything that can go wrong with a single directive (malformed
//! expressions, unresolved references, unknown directives) is reported through
//! `tracing` and never aborts a pass.

use thiserror::Error;

/// Errors that can occur while rendering, hydrating or dispatching actions.
#[derive(Debug, Error)]
pub enum InteractivityError {
	/// `set_state` was called twice for the same namespace during one server request.
	#[error("State for namespace '{0}' was already initialized in this request")]
	DuplicateInit(String),

	/// An identifier was absent from every context frame and from the active namespace.
	#[error("Unresolved reference: {0}")]
	UnresolvedReference(String),

	/// A client-side `set_state` call tried to overwrite a server-provided key.
	#[error("Hydration conflict in namespace '{namespace}': key '{key}' was provided by the server")]
	HydrationConflict {
		/// Namespace holding the conflicting key.
		namespace: String,
		/// Top-level key that would have been overwritten.
		key: String,
	},

	/// A directive expression could not be parsed.
	#[error("Invalid directive expression '{expression}': {reason}")]
	ExpressionParse {
		/// The raw expression text.
		expression: String,
		/// Why parsing failed.
		reason: String,
	},

	/// A value that must be a JSON object was something else.
	#[error("Expected a JSON object for {0}")]
	NotAnObject(String),

	/// A derived value was targeted by a write.
	#[error("State '{namespace}.{key}' is derived and cannot be written")]
	ReadOnlyState {
		/// Namespace holding the derived value.
		namespace: String,
		/// Key of the derived value.
		key: String,
	},

	/// No action or callback is registered under this reference.
	#[error("Unknown action '{0}'")]
	UnknownAction(String),

	/// An asynchronous action was dispatched through the synchronous path.
	#[error("Action '{0}' is asynchronous and must be dispatched with dispatch_async")]
	AsyncActionRequiresAwait(String),

	/// A node id does not refer to an attached element.
	#[error("Node {0} is not an attached element")]
	NodeNotFound(usize),

	/// The hydration payload was not valid JSON or did not have the expected shape.
	#[error("Invalid state payload: {0}")]
	Payload(#[from] serde_json::Error),

	/// The configuration file could not be parsed.
	#[error("Invalid configuration: {0}")]
	Config(#[from] toml::de::Error),

	/// The configuration parsed but holds an unusable value.
	#[error("Invalid configuration value for '{field}': {message}")]
	InvalidConfig {
		/// Offending field.
		field: String,
		/// Why the value was rejected.
		message: String,
	},
}

/// Result type alias for interactivity operations.
pub type InteractivityResult<T> = Result<T, InteractivityError>;
