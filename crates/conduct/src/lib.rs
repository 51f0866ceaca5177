//! # Conduct
//!
//! A synchronous, in-process behavioural event-dispatch engine: a context
//! owns shared state and an ordered set of behaviours, events are fired on
//! the context, and each behaviour independently decides whether an event
//! concerns it and acts on the shared state if so.
//!
//! ## Core Concepts
//!
//! - [`Event`] = a named message with parameters, bound to one context
//! - [`Behaviour`] = a (condition, action, rescue) triple
//! - [`Context`] = the owner of shared state and the behaviour registry;
//!   the scope of one unit of work
//! - [`Prototype`] = declarative, configuration-derived extra match criteria
//! - [`ViewSteps`] = the append-only render pipeline behaviours build up
//!
//! ## Architecture
//!
//! ```text
//! caller
//!   │
//!   ▼ fire(event)
//! Context ─ validates binding ──► Err(ContextMismatch)
//!   │
//!   ▼ registry snapshot, in registration order
//!   ├─► Behaviour A.condition() ─ false ─► skipped
//!   │
//!   ├─► Behaviour B.condition() ─ true ──► B.action()
//!   │                                        │ Err(e)
//!   │                                        ▼
//!   │                                     B.rescue() ─► state.errors
//!   │
//!   └─► Behaviour C.condition() ─ true ──► C.action()
//!                                            │ fire(nested) drained
//!                                            ▼ depth-first, same stack
//! return Ok(event) to caller
//! ```
//!
//! ## Key Invariants
//!
//! 1. **Behaviours run in registration order** - no priority, no dependency
//!    ordering, sequential on the caller's thread
//! 2. **Failure isolation** - an action error is routed to that behaviour's
//!    own rescue and never aborts siblings or the firing call
//! 3. **Events bind to one context** - firing on any other context fails
//!    before any behaviour is consulted
//! 4. **Payloads are write-once** - a second set fails, even with an equal
//!    value
//! 5. **Completion is terminal** - after `completed()` no further event may
//!    be fired
//!
//! ## Example
//!
//! ```
//! use conduct_core::{Behaviour, Context, ControlState, Event, ProcessState};
//!
//! struct Greet;
//!
//! impl Behaviour<ControlState> for Greet {
//!     fn responds_to(&self) -> &str {
//!         "greet"
//!     }
//!
//!     fn action(&self, ev: &Event, ctx: &Context<ControlState>) -> anyhow::Result<()> {
//!         let name = ev.param("name").unwrap_or("world");
//!         ctx.state().record_message(&format!("hello, {name}"));
//!         Ok(())
//!     }
//! }
//!
//! let ctx = Context::new(ControlState::new());
//! ctx.register(Greet);
//!
//! let mut ev = Event::new(&ctx, "greet");
//! ev.add_param("name", "conduct").unwrap();
//! ctx.fire(ev).unwrap();
//!
//! assert_eq!(ctx.state().messages(), vec!["hello, conduct"]);
//! ```
//!
//! ## What This Is Not
//!
//! Conduct is **not**:
//! - A distributed or persistent message bus
//! - A task scheduler; firing is synchronous and bounded to the caller's
//!   thread
//! - An actor framework
//!
//! Conduct **is**:
//! > A context, the behaviours registered on it, and chosen convention about
//! > how those behaviours use the shared state to talk to each other.

// Core modules
mod behaviour;
mod config;
mod context;
mod error;
mod event;
mod model;
mod prototype;
mod resources;
mod state;
mod sync;
mod view;



// Re-export behaviour types
pub use crate::behaviour::{
    Behaviour, Prototyped, RuntimeBehaviour, SequenceBehaviour, RESPONDS_TO_ANY,
};

// Re-export configuration types
pub use crate::config::{Configuration, ConfigurationElement};

// Re-export context types
pub use crate::context::{Context, ContextBuilder, Services};

// Re-export error types
pub use crate::error::{EngineError, ErrorMessage};

// Re-export event types
pub use crate::event::Event;

// Re-export model types
pub use crate::model::{model_of, Model};

// Re-export prototype types
pub use crate::prototype::{Criterion, CriterionFactory, CriteriaVocabulary, Prototype};

// Re-export resource types
pub use crate::resources::{FileResources, NullResources, ResourceAdapter};

// Re-export state types
pub use crate::state::{
    is_private_key, ControlState, ProcessState, ProcessTimer, TimerSet, PRIVATE_PREFIX,
};

// Re-export view pipeline types
pub use crate::view::{ViewStep, ViewSteps};
