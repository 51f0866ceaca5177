//! Testing utilities for the conduct engine.
//!
//! [`TestBehaviour`] is a closure-backed, optionally prototyped behaviour
//! that counts its invocations; [`MemoryResources`] is an in-memory resource
//! adapter for exercising render behaviours without touching a filesystem.

use std::io::{self, Cursor, Read};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use conduct_core::{
    Behaviour, Configuration, Context, ControlState, Event, Prototype, ResourceAdapter,
};
use dashmap::DashMap;

type TestAction = Box<dyn Fn(&Event, &Context<ControlState>) -> anyhow::Result<()> + Send + Sync>;

/// A behaviour for exercising dispatch in tests: a responds-to name, an
/// optional prototype configuration, an optional action closure, and an
/// invocation counter.
pub struct TestBehaviour {
    responds_to: String,
    prototype: Prototype,
    perform: Option<TestAction>,
    invocations: Arc<AtomicUsize>,
}

impl TestBehaviour {
    /// A behaviour that only counts.
    pub fn new(responds_to: impl Into<String>) -> Self {
        TestBehaviour {
            responds_to: responds_to.into(),
            prototype: Prototype::blank(),
            perform: None,
            invocations: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Refines matching with criteria compiled from the configuration.
    pub fn with_config(mut self, config: Configuration) -> Self {
        self.prototype = Prototype::compile(config);
        self
    }

    /// Performs the closure when the behaviour acts.
    pub fn with_action(
        mut self,
        perform: impl Fn(&Event, &Context<ControlState>) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.perform = Some(Box::new(perform));
        self
    }

    /// A handle to the invocation counter, usable after registration.
    pub fn invocations(&self) -> Arc<AtomicUsize> {
        self.invocations.clone()
    }
}

impl Behaviour<ControlState> for TestBehaviour {
    fn responds_to(&self) -> &str {
        &self.responds_to
    }

    fn condition(&self, ev: &Event, ctx: &Context<ControlState>) -> bool {
        let name_matches =
            self.responds_to == conduct_core::RESPONDS_TO_ANY || ev.message() == self.responds_to;
        name_matches && self.prototype.satisfied_by(ev, ctx.state())
    }

    fn action(&self, ev: &Event, ctx: &Context<ControlState>) -> anyhow::Result<()> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        match &self.perform {
            Some(perform) => perform(ev, ctx),
            None => Ok(()),
        }
    }
}

/// An in-memory resource adapter.
#[derive(Default)]
pub struct MemoryResources {
    files: DashMap<String, Vec<u8>>,
}

impl MemoryResources {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a text resource, builder style.
    pub fn with_file(self, path: impl Into<String>, contents: impl Into<String>) -> Self {
        self.files.insert(path.into(), contents.into().into_bytes());
        self
    }

    /// Adds a resource after construction.
    pub fn add(&self, path: impl Into<String>, contents: impl Into<Vec<u8>>) {
        self.files.insert(path.into(), contents.into());
    }
}

impl ResourceAdapter for MemoryResources {
    fn exists(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    fn open(&self, path: &str) -> io::Result<Box<dyn Read + Send>> {
        match self.files.get(path) {
            Some(entry) => Ok(Box::new(Cursor::new(entry.value().clone()))),
            None => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no in-memory resource '{path}'"),
            )),
        }
    }
}

/// A context over fresh control state with no resources.
pub fn test_context() -> Context<ControlState> {
    Context::new(ControlState::new())
}

/// A context over fresh control state with the given resources.
pub fn test_context_with_resources(resources: impl ResourceAdapter + 'static) -> Context<ControlState> {
    Context::builder(ControlState::new())
        .resources(resources)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use conduct_core::{ConfigurationElement, ProcessState};

    #[test]
    fn test_behaviour_counts_invocations() {
        let ctx = test_context();
        let behaviour = TestBehaviour::new("ping");
        let invocations = behaviour.invocations();
        ctx.register(behaviour);

        ctx.fire_message("ping").unwrap();
        ctx.fire_message("pong").unwrap();
        ctx.fire_message("ping").unwrap();

        assert_eq!(invocations.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_behaviour_honours_its_configuration() {
        let ctx = test_context();
        let behaviour = TestBehaviour::new("view").with_config(Configuration::new(vec![
            ConfigurationElement::new(1, "event", "match", "role", "admin"),
        ]));
        let invocations = behaviour.invocations();
        ctx.register(behaviour);

        ctx.fire_message("view").unwrap();
        assert_eq!(invocations.load(Ordering::SeqCst), 0);

        let mut ev = Event::new(&ctx, "view");
        ev.add_param("role", "admin").unwrap();
        ctx.fire(ev).unwrap();
        assert_eq!(invocations.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_behaviour_runs_its_closure() {
        let ctx = test_context();
        ctx.register(TestBehaviour::new("note").with_action(|ev, ctx| {
            ctx.state()
                .record_message(ev.param("text").unwrap_or("(none)"));
            Ok(())
        }));

        let mut ev = Event::new(&ctx, "note");
        ev.add_param("text", "remembered").unwrap();
        ctx.fire(ev).unwrap();

        assert_eq!(ctx.state().messages(), vec!["remembered"]);
    }

    #[test]
    fn memory_resources_read_back() {
        let resources = MemoryResources::new().with_file("views/text/default.tpl", "hello");
        assert!(resources.exists("views/text/default.tpl"));
        assert!(!resources.exists("views/text/other.tpl"));
        assert_eq!(
            resources.read_all_text("views/text/default.tpl").unwrap(),
            "hello"
        );
    }
}
