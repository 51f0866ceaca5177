//! Rendering behaviours for the conduct engine.
//!
//! A render pipeline is built by two kinds of behaviour layered over the
//! context's view steps:
//!
//! - [`ViewStateBehaviour`] projects the control state into the model step
//!   the rest of the pipeline starts from
//! - [`TemplateViewBehaviour`] finds the best-matching external template by
//!   the `area`/`concern`/`action` fallback search and transforms the last
//!   step with it
//!
//! Concrete templating backends implement [`TemplateEngine`];
//! [`PlaceholderEngine`] is a minimal one. Compiled templates live in an
//! injected [`TemplateCache`], safe to share across concurrent contexts.

mod cache;
mod template;
mod view_state;

pub use crate::cache::TemplateCache;
pub use crate::template::{
    possible_templates, PlaceholderEngine, TemplateEngine, TemplateViewBehaviour,
};
pub use crate::view_state::ViewStateBehaviour;
