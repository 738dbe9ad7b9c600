//! # Reinhardt Interactivity
//!
//! Directive-driven interactivity for server-rendered Reinhardt pages.
//!
//! Pages declare behavior with `data-wp-*` attributes. The server applies the
//! directives once and embeds the client-visible state; the client runtime
//! adopts the same markup, hydrates that state and keeps the DOM in sync as
//! actions change it.
//!
//! This crate re-exports [`reinhardt_interactivity_core`]. See its
//! documentation for the directive reference.
//!
//! ## Quick Start
//!
//! ```ignore
//! use reinhardt_interactivity::prelude::*;
//! use serde_json::json;
//!
//! let mut request = RequestContext::new();
//! request.set_state("counter", json!({"count": 0}))?;
//! let html = ServerRenderer::new()
//!     .render(&request, r#"<p data-wp-interactive="counter" data-wp-text="state.count"></p>"#)?
//!     .into_html_with_script();
//! ```

#![warn(missing_docs)]

pub use reinhardt_interactivity_core::*;

/// Prelude module for convenient imports.
pub mod prelude {
	pub use reinhardt_interactivity_core::prelude::*;
}

#[cfg(test)]
mod tests {
	use super::prelude::*;
	use rstest::rstest;
	use serde_json::json;

	#[rstest]
	fn test_facade_renders_through_core() {
		// Arrange
		let mut request = RequestContext::new();
		request.set_state("counter", json!({"count": 3})).unwrap();

		// Act
		let page = ServerRenderer::new()
			.render(
				&request,
				r#"<p data-wp-interactive="counter" data-wp-text="state.count"></p>"#,
			)
			.unwrap();

		// Assert
		assert_eq!(
			page.html,
			r#"<p data-wp-interactive="counter" data-wp-text="state.count">3</p>"#
		);
	}
}
