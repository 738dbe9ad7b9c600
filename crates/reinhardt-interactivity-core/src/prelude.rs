//! Convenience re-exports for common usage.
//!
//! ```ignore
//! use reinhardt_interactivity_core::prelude::*;
//! ```

// Errors and configuration
pub use crate::config::InteractivityConfig;
pub use crate::error::{InteractivityError, InteractivityResult};

// Server side
pub use crate::hydration::HydrationPayload;
pub use crate::ssr::{RenderedPage, RequestContext, ServerRenderer};
pub use crate::store::{MergeMode, StateReader, StateStore};

// Client side
pub use crate::client::{
	ActionContext, ActionRegistry, ActionSnapshot, ClientRuntime, Event, FlushReport, Mutation,
};

// Extension points
pub use crate::directives::{DirectiveHandler, DirectiveInput, DirectiveRegistry, RenderMode, SideEffect};
pub use crate::dom::{Document, NodeId};
pub use crate::expr::Resolved;
