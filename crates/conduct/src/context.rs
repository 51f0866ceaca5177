//! The processing context: owner of shared state, the behaviour registry,
//! and the bus events are fired over.
//!
//! The context and the behaviours registered on it *are* the engine;
//! everything else is convention about how behaviours use the shared state
//! to talk to each other.
//!
//! Dispatch is a synchronous observer list: `fire` walks a snapshot of the
//! registry in registration order, consults each behaviour's condition, and
//! invokes the action of each that matches. Behaviours may fire further
//! events from their actions; those are drained depth-first on the caller's
//! stack before the outer loop moves to its next behaviour.

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::sync::RwLock;

use dashmap::DashMap;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::behaviour::{Behaviour, RuntimeBehaviour};
use crate::error::EngineError;
use crate::event::Event;
use crate::resources::{NullResources, ResourceAdapter};
use crate::state::ProcessState;
use crate::sync::{read_lock, write_lock};

/// Named external collaborators available to behaviours.
///
/// A plain name-to-service map; services are shared and downcast at the
/// point of use.
#[derive(Default)]
pub struct Services {
    entries: DashMap<String, Arc<dyn Any + Send + Sync>>,
}

impl Services {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a service under a name, replacing any previous one.
    pub fn register<T: Send + Sync + 'static>(&self, name: &str, service: Arc<T>) {
        self.entries.insert(name.to_string(), service);
    }

    /// Looks up a service by name and concrete type.
    pub fn get<T: Send + Sync + 'static>(&self, name: &str) -> Option<Arc<T>> {
        let entry = self.entries.get(name)?;
        entry.value().clone().downcast::<T>().ok()
    }

    pub fn has(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }
}

/// A self-contained channel of execution: one context per logical unit of
/// work.
///
/// Behaviours are registered during a setup phase, then a sequence of
/// events is fired, terminated by [`Context::completed`], after which firing
/// fails.
pub struct Context<S: ProcessState> {
    id: Uuid,
    state: S,
    services: Services,
    resources: Arc<dyn ResourceAdapter>,
    registry: RwLock<Vec<Arc<dyn Behaviour<S>>>>,
    completed: AtomicBool,
}

impl<S: ProcessState> Context<S> {
    /// Creates a context over the given state with no services and no
    /// resources.
    pub fn new(state: S) -> Self {
        Context {
            id: Uuid::new_v4(),
            state,
            services: Services::new(),
            resources: Arc::new(NullResources),
            registry: RwLock::new(Vec::new()),
            completed: AtomicBool::new(false),
        }
    }

    /// Starts building a context with explicit collaborators.
    pub fn builder(state: S) -> ContextBuilder<S> {
        ContextBuilder {
            state,
            services: Services::new(),
            resources: Arc::new(NullResources),
        }
    }

    /// The identity events are bound against.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The mutable state all behaviours coordinate through.
    pub fn state(&self) -> &S {
        &self.state
    }

    /// The context's service container.
    pub fn services(&self) -> &Services {
        &self.services
    }

    /// Resources external to the process.
    pub fn resources(&self) -> &Arc<dyn ResourceAdapter> {
        &self.resources
    }

    /// Registers a behaviour, ensuring it is consulted for every event
    /// subsequently fired on this context.
    pub fn register(&self, behaviour: impl Behaviour<S> + 'static) {
        self.register_arc(Arc::new(behaviour));
    }

    /// Registers an already-shared behaviour.
    pub fn register_arc(&self, behaviour: Arc<dyn Behaviour<S>>) {
        trace!(responds_to = %behaviour.responds_to(), "registering behaviour");
        write_lock(&self.registry).push(behaviour);
    }

    /// Registers each behaviour independently; there is no all-or-nothing
    /// semantics, and a failure part-way leaves earlier registrations in
    /// place.
    pub fn register_all(&self, behaviours: impl IntoIterator<Item = Arc<dyn Behaviour<S>>>) {
        for behaviour in behaviours {
            self.register_arc(behaviour);
        }
    }

    /// Registers an anonymous behaviour from a condition and an action.
    ///
    /// The behaviour responds to the empty name and is matched solely by
    /// its predicate. Its rescue is a no-op.
    pub fn register_runtime(
        &self,
        condition: impl Fn(&Event) -> bool + Send + Sync + 'static,
        action: impl Fn(&Event, &Context<S>) -> anyhow::Result<()> + Send + Sync + 'static,
    ) {
        self.register(RuntimeBehaviour::new(condition, action));
    }

    /// As [`register_runtime`], with an explicit rescue.
    ///
    /// [`register_runtime`]: Context::register_runtime
    pub fn register_runtime_with_rescue(
        &self,
        condition: impl Fn(&Event) -> bool + Send + Sync + 'static,
        action: impl Fn(&Event, &Context<S>) -> anyhow::Result<()> + Send + Sync + 'static,
        rescue: impl Fn(&Event, &anyhow::Error, &Context<S>) + Send + Sync + 'static,
    ) {
        self.register(RuntimeBehaviour::with_rescue(condition, action, rescue));
    }

    /// How many behaviours are registered.
    pub fn registered_count(&self) -> usize {
        read_lock(&self.registry).len()
    }

    /// Fires an event on this context.
    ///
    /// Every registered behaviour whose condition holds for the event has
    /// its action invoked, in registration order, on the caller's thread.
    /// An action error is routed to that behaviour's own rescue and never
    /// interrupts the remaining behaviours; a rescue that itself panics is
    /// not caught.
    ///
    /// Fails without consulting any behaviour when the event is bound to a
    /// different context, or when this context has completed.
    pub fn fire(&self, event: Event) -> Result<Event, EngineError> {
        if event.context_id() != self.id {
            return Err(EngineError::ContextMismatch {
                message: event.message().to_string(),
            });
        }
        if self.completed.load(Ordering::Acquire) {
            return Err(EngineError::Completed);
        }

        // Snapshot so re-entrant registration neither deadlocks nor lets a
        // behaviour see the event that was in flight when it was registered.
        let snapshot: Vec<Arc<dyn Behaviour<S>>> = read_lock(&self.registry).clone();
        debug!(message = %event.message(), consulted = snapshot.len(), "firing event");

        for behaviour in snapshot {
            if behaviour.condition(&event, self) {
                trace!(
                    message = %event.message(),
                    responds_to = %behaviour.responds_to(),
                    "behaviour matched"
                );
                if let Err(err) = behaviour.action(&event, self) {
                    warn!(
                        message = %event.message(),
                        responds_to = %behaviour.responds_to(),
                        error = %err,
                        "behaviour action failed, routing to its rescue"
                    );
                    behaviour.rescue(&event, &err, self);
                }
            }
        }
        Ok(event)
    }

    /// Constructs an event with the given message and fires it.
    pub fn fire_message(&self, message: &str) -> Result<Event, EngineError> {
        self.fire(Event::new(self, message))
    }

    /// Constructs an event with the given message and parameters and fires
    /// it.
    pub fn fire_with_params(
        &self,
        message: &str,
        params: BTreeMap<String, String>,
    ) -> Result<Event, EngineError> {
        self.fire(Event::with_params(self, message, params))
    }

    /// Constructs an event copying only the named parameters that currently
    /// exist in the context's state, then fires it. Used to narrow which
    /// ambient parameters propagate to a sub-event.
    pub fn fire_with(&self, message: &str, params: &[&str]) -> Result<Event, EngineError> {
        let mut copied = BTreeMap::new();
        for &name in params {
            if let Some(value) = self.state.param(name) {
                copied.insert(name.to_string(), value);
            }
        }
        self.fire(Event::with_params(self, message, copied))
    }

    /// Signals that operations have finished. The context may still be
    /// consulted, but any further `fire` fails with
    /// [`EngineError::Completed`].
    pub fn completed(&self) {
        debug!(context = %self.id, "context completed");
        self.completed.store(true, Ordering::Release);
    }

    /// Whether [`completed`] has been signalled.
    ///
    /// [`completed`]: Context::completed
    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }
}

/// Builds a [`Context`] with explicit services and resources.
pub struct ContextBuilder<S: ProcessState> {
    state: S,
    services: Services,
    resources: Arc<dyn ResourceAdapter>,
}

impl<S: ProcessState> ContextBuilder<S> {
    /// Replaces the context's service container.
    pub fn services(mut self, services: Services) -> Self {
        self.services = services;
        self
    }

    /// Registers one service on the context being built.
    pub fn service<T: Send + Sync + 'static>(self, name: &str, service: Arc<T>) -> Self {
        self.services.register(name, service);
        self
    }

    /// Sets the resource adapter.
    pub fn resources(mut self, resources: impl ResourceAdapter + 'static) -> Self {
        self.resources = Arc::new(resources);
        self
    }

    /// Sets an already-shared resource adapter.
    pub fn resources_arc(mut self, resources: Arc<dyn ResourceAdapter>) -> Self {
        self.resources = resources;
        self
    }

    pub fn build(self) -> Context<S> {
        Context {
            id: Uuid::new_v4(),
            state: self.state,
            services: self.services,
            resources: self.resources,
            registry: RwLock::new(Vec::new()),
            completed: AtomicBool::new(false),
        }
    }
}
