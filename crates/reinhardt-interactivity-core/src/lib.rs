//! Directive-driven DOM reconciliation for the Reinhardt framework.
//!
//! Markup declares its behavior through `data-wp-*` attributes bound to a
//! namespaced, context-scoped state store. The same markup is processed
//! twice:
//!
//! - **Server**: [`ServerRenderer`] applies the directives once, producing
//!   static HTML plus a [`HydrationPayload`] of client-visible state.
//! - **Client**: [`ClientRuntime`] adopts that HTML, hydrates its own store,
//!   attaches listeners and re-runs only the bindings affected by each action.
//!
//! # Directives
//!
//! | Attribute | Effect |
//! |-----------|--------|
//! | `data-wp-interactive="ns"` | opens an interactive root for namespace `ns` |
//! | `data-wp-context='{"k": 1}'` | pushes a context frame for the subtree |
//! | `data-wp-bind--attr="state.x"` | sets or removes `attr` |
//! | `data-wp-text="state.x"` | replaces the text content |
//! | `data-wp-class--name="state.x"` | toggles class `name` |
//! | `data-wp-style--prop="state.x"` | sets or removes style property `prop` |
//! | `data-wp-on--event="actions.a"` | runs action `a` on `event` (client) |
//! | `data-wp-watch="callbacks.c"` | runs `c` whenever its reads change (client) |
//! | `data-wp-init="callbacks.c"` | runs `c` once after hydration (client) |
//!
//! # Quick Start
//!
//! ```ignore
//! use reinhardt_interactivity_core::prelude::*;
//! use serde_json::json;
//!
//! let mut request = RequestContext::new();
//! request.set_state("accordion", json!({"isOpen": false}))?;
//! let page = ServerRenderer::new().render(&request, markup)?;
//! let html = page.into_html_with_script();
//!
//! let mut actions = ActionRegistry::new();
//! actions.action("accordion", "toggle", |cx| {
//!     let open = cx.state("isOpen").is_truthy();
//!     cx.set_state("isOpen", json!(!open))
//! });
//! let mut runtime = ClientRuntime::builder().actions(actions).build(&html)?;
//! runtime.dispatch_by_id("toggle", "click")?;
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod client;
pub mod config;
pub mod context;
pub mod directives;
pub mod dom;
pub mod error;
pub mod expr;
pub mod hydration;
pub mod prelude;
pub mod processor;
pub mod reactive;
pub mod ssr;
pub mod store;

// Re-export commonly used types at crate root
pub use client::{
	ActionContext, ActionRegistry, ActionSnapshot, ClientRuntime, ClientRuntimeBuilder, Event,
	FlushReport, Mutation,
};
pub use config::InteractivityConfig;
pub use context::{ContextChain, FrameId};
pub use directives::{
	CallbackKind, DirectiveHandler, DirectiveInput, DirectiveRegistry, RenderMode, SideEffect,
};
pub use dom::{Document, NodeId};
pub use error::{InteractivityError, InteractivityResult};
pub use expr::{Expression, Resolved};
pub use hydration::{HydrationPayload, hydrate, serialize};
pub use processor::{Binding, DirectiveProcessor, InteractiveRoot, ProcessOutcome};
pub use reactive::{BindingId, DepKey};
pub use ssr::{RenderedPage, RequestContext, ServerRenderer};
pub use store::{MergeMode, StateReader, StateStore, StoreMode};
