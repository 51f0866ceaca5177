//! Behaviours: the (condition, action, rescue) triples a context dispatches to.
//!
//! One trait, parameterized by the shared-state type, covers the whole
//! family. Refinements are composition rather than inheritance: a prototyped
//! behaviour is any behaviour wrapped with (or holding) a [`Prototype`],
//! and a runtime behaviour is a closure-backed implementation of the same
//! trait.

use crate::config::Configuration;
use crate::context::Context;
use crate::error::ErrorMessage;
use crate::event::Event;
use crate::prototype::Prototype;
use crate::state::ProcessState;

/// The wildcard `responds_to` name that matches every event.
pub const RESPONDS_TO_ANY: &str = "*";

/// A reactive handler registered with a context.
///
/// Behaviours are stateless with respect to individual events: the same
/// instance is consulted for every event fired on its context, so any
/// per-event working data belongs on the event or the shared state, not on
/// the behaviour. Long-lived caches keyed by something stable are fine.
pub trait Behaviour<S: ProcessState>: Send + Sync {
    /// The literal event name this behaviour matches, or [`RESPONDS_TO_ANY`].
    fn responds_to(&self) -> &str;

    /// Whether the behaviour's action should run for this event.
    ///
    /// The default is the name check: the event's message equals
    /// `responds_to`, or `responds_to` is the wildcard. Override for
    /// bespoke conditions.
    fn condition(&self, ev: &Event, _ctx: &Context<S>) -> bool {
        self.responds_to() == RESPONDS_TO_ANY || ev.message() == self.responds_to()
    }

    /// The action performed when the condition is met.
    ///
    /// An error returned here is routed to this behaviour's [`rescue`] by
    /// the dispatch loop; it never aborts sibling behaviours or the firing
    /// call.
    ///
    /// [`rescue`]: Behaviour::rescue
    fn action(&self, ev: &Event, ctx: &Context<S>) -> anyhow::Result<()>;

    /// Recovery when the action fails.
    ///
    /// The default records an [`ErrorMessage`] on shared state and moves on;
    /// nothing is re-thrown or retried. A rescue that itself panics is not
    /// caught by the dispatch loop.
    fn rescue(&self, ev: &Event, err: &anyhow::Error, ctx: &Context<S>) {
        let _ = ev;
        ctx.state()
            .record_error(ErrorMessage::caused_by(err.to_string(), format!("{err:#}")));
    }
}

/// A behaviour whose condition and action are supplied at runtime as
/// closures rather than written as a type.
///
/// A runtime behaviour responds to the empty name: it is matched solely by
/// its predicate, never by name and never by the wildcard.
pub struct RuntimeBehaviour<S: ProcessState> {
    condition: Box<dyn Fn(&Event) -> bool + Send + Sync>,
    action: Box<dyn Fn(&Event, &Context<S>) -> anyhow::Result<()> + Send + Sync>,
    rescue: Option<Box<dyn Fn(&Event, &anyhow::Error, &Context<S>) + Send + Sync>>,
}

impl<S: ProcessState> RuntimeBehaviour<S> {
    /// Creates a runtime behaviour with a no-op rescue.
    pub fn new(
        condition: impl Fn(&Event) -> bool + Send + Sync + 'static,
        action: impl Fn(&Event, &Context<S>) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> Self {
        RuntimeBehaviour {
            condition: Box::new(condition),
            action: Box::new(action),
            rescue: None,
        }
    }

    /// Creates a runtime behaviour with an explicit rescue.
    pub fn with_rescue(
        condition: impl Fn(&Event) -> bool + Send + Sync + 'static,
        action: impl Fn(&Event, &Context<S>) -> anyhow::Result<()> + Send + Sync + 'static,
        rescue: impl Fn(&Event, &anyhow::Error, &Context<S>) + Send + Sync + 'static,
    ) -> Self {
        RuntimeBehaviour {
            condition: Box::new(condition),
            action: Box::new(action),
            rescue: Some(Box::new(rescue)),
        }
    }
}

impl<S: ProcessState> Behaviour<S> for RuntimeBehaviour<S> {
    fn responds_to(&self) -> &str {
        ""
    }

    fn condition(&self, ev: &Event, _ctx: &Context<S>) -> bool {
        (self.condition)(ev)
    }

    fn action(&self, ev: &Event, ctx: &Context<S>) -> anyhow::Result<()> {
        (self.action)(ev, ctx)
    }

    fn rescue(&self, ev: &Event, err: &anyhow::Error, ctx: &Context<S>) {
        if let Some(rescue) = &self.rescue {
            rescue(ev, err, ctx);
        }
    }
}

/// Refines any behaviour with a prototype's declarative criteria.
///
/// The wrapped behaviour's own condition (normally the name check) runs
/// first; only when it passes are the criteria consulted, each of which must
/// hold. Action and rescue are delegated untouched.
pub struct Prototyped<B> {
    inner: B,
    prototype: Prototype,
}

impl<B> Prototyped<B> {
    pub fn new(inner: B, prototype: Prototype) -> Self {
        Prototyped { inner, prototype }
    }

    /// The prototype refining this behaviour.
    pub fn prototype(&self) -> &Prototype {
        &self.prototype
    }

    /// The wrapped behaviour.
    pub fn inner(&self) -> &B {
        &self.inner
    }
}

impl<S: ProcessState, B: Behaviour<S>> Behaviour<S> for Prototyped<B> {
    fn responds_to(&self) -> &str {
        self.inner.responds_to()
    }

    fn condition(&self, ev: &Event, ctx: &Context<S>) -> bool {
        self.inner.condition(ev, ctx) && self.prototype.satisfied_by(ev, ctx.state())
    }

    fn action(&self, ev: &Event, ctx: &Context<S>) -> anyhow::Result<()> {
        self.inner.action(ev, ctx)
    }

    fn rescue(&self, ev: &Event, err: &anyhow::Error, ctx: &Context<S>) {
        self.inner.rescue(ev, err, ctx)
    }
}

/// Drives a configured sequence of messages.
///
/// The sequence is declared with `fire/sequence` elements, fired in ordinal
/// order; each fired event copies the context params named by `fire/with`
/// elements. Criteria compiled from the rest of the configuration gate the
/// whole sequence.
pub struct SequenceBehaviour {
    responds_to: String,
    prototype: Prototype,
}

impl SequenceBehaviour {
    pub fn new(responds_to: impl Into<String>, configuration: Configuration) -> Self {
        SequenceBehaviour {
            responds_to: responds_to.into(),
            prototype: Prototype::compile(configuration),
        }
    }

    /// Builds over an already-compiled prototype, e.g. one compiled with a
    /// custom vocabulary.
    pub fn from_prototype(responds_to: impl Into<String>, prototype: Prototype) -> Self {
        SequenceBehaviour {
            responds_to: responds_to.into(),
            prototype,
        }
    }
}

impl<S: ProcessState> Behaviour<S> for SequenceBehaviour {
    fn responds_to(&self) -> &str {
        &self.responds_to
    }

    fn condition(&self, ev: &Event, ctx: &Context<S>) -> bool {
        (self.responds_to == RESPONDS_TO_ANY || ev.message() == self.responds_to)
            && self.prototype.satisfied_by(ev, ctx.state())
    }

    fn action(&self, _ev: &Event, ctx: &Context<S>) -> anyhow::Result<()> {
        let config = self.prototype.configuration();
        let with: Vec<&str> = config.names("fire", "with").collect();
        for message in config.names("fire", "sequence") {
            ctx.fire_with(message, &with)?;
        }
        Ok(())
    }
}
