//! Prototype criteria: declarative match predicates compiled from
//! configuration.
//!
//! A prototype lets a behaviour be configured, rather than coded, with
//! additional matching conditions. At construction it walks the
//! configuration once and compiles every element whose `(frame, slot)` pair
//! the vocabulary recognizes into a criterion; unrecognized elements compile
//! to nothing but remain available for querying through the configuration.

use std::collections::BTreeMap;
use std::sync::Arc;

use smallvec::SmallVec;

use crate::config::{Configuration, ConfigurationElement};
use crate::event::Event;
use crate::state::ProcessState;

/// One compiled match predicate: criteria see the behaviour's configuration,
/// the candidate event, and the context's shared state.
pub type Criterion = Arc<dyn Fn(&Configuration, &Event, &dyn ProcessState) -> bool + Send + Sync>;

/// Compiles one recognized configuration element into a criterion.
pub type CriterionFactory = fn(&ConfigurationElement) -> Criterion;

/// The vocabulary of `(frame, slot)` pairs a prototype recognizes.
///
/// The vocabulary is an extension point: callers may start from
/// [`CriteriaVocabulary::standard`] and add their own pairs, or build an
/// empty one and define a dialect of their own.
#[derive(Clone, Default)]
pub struct CriteriaVocabulary {
    factories: BTreeMap<(String, String), CriterionFactory>,
}

impl CriteriaVocabulary {
    /// An empty vocabulary recognizing nothing.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The stock vocabulary:
    ///
    /// - `event/has` — the event carries a param with the element's name
    /// - `event/match` — the event param equals the element's value
    /// - `context/has` — the context carries the named param
    /// - `context/match` — the context param equals the element's value
    /// - `context/flagged` — the named context flag is set
    /// - `context/excludes` — the named context param is absent
    pub fn standard() -> Self {
        let mut vocab = Self::empty();
        vocab.insert("event", "has", |el| {
            let name = el.name.clone();
            Arc::new(move |_config, ev, _state| ev.param(&name).is_some())
        });
        vocab.insert("event", "match", |el| {
            let name = el.name.clone();
            let value = el.value.clone();
            Arc::new(move |_config, ev, _state| ev.param(&name) == Some(value.as_str()))
        });
        vocab.insert("context", "has", |el| {
            let name = el.name.clone();
            Arc::new(move |_config, _ev, state| state.has_param(&name))
        });
        vocab.insert("context", "match", |el| {
            let name = el.name.clone();
            let value = el.value.clone();
            Arc::new(move |_config, _ev, state| state.param(&name).as_deref() == Some(&value))
        });
        vocab.insert("context", "flagged", |el| {
            let name = el.name.clone();
            Arc::new(move |_config, _ev, state| state.is_flagged(&name))
        });
        vocab.insert("context", "excludes", |el| {
            let name = el.name.clone();
            Arc::new(move |_config, _ev, state| !state.has_param(&name))
        });
        vocab
    }

    /// Registers a factory for a `(frame, slot)` pair, replacing any
    /// previous registration.
    pub fn insert(&mut self, frame: &str, slot: &str, factory: CriterionFactory) {
        self.factories
            .insert((frame.to_string(), slot.to_string()), factory);
    }

    fn lookup(&self, frame: &str, slot: &str) -> Option<&CriterionFactory> {
        self.factories
            .get(&(frame.to_string(), slot.to_string()))
    }
}

/// A behaviour's compiled selection criteria plus the configuration they
/// were compiled from.
#[derive(Clone)]
pub struct Prototype {
    configuration: Configuration,
    criteria: SmallVec<[Criterion; 4]>,
}

impl Prototype {
    /// Compiles a prototype with the standard vocabulary.
    pub fn compile(configuration: Configuration) -> Self {
        Self::compile_with(configuration, &CriteriaVocabulary::standard())
    }

    /// Compiles a prototype with a caller-supplied vocabulary.
    pub fn compile_with(configuration: Configuration, vocabulary: &CriteriaVocabulary) -> Self {
        let criteria = configuration
            .elements()
            .iter()
            .filter_map(|el| vocabulary.lookup(&el.frame, &el.slot).map(|f| f(el)))
            .collect();
        Prototype {
            configuration,
            criteria,
        }
    }

    /// A prototype with no configuration and no criteria; always satisfied.
    pub fn blank() -> Self {
        Self::compile(Configuration::default())
    }

    /// The raw configuration, recognized and unrecognized elements alike.
    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    /// How many criteria were compiled.
    pub fn criteria_count(&self) -> usize {
        self.criteria.len()
    }

    /// Whether every criterion holds for the event and state.
    ///
    /// An empty criteria set is trivially satisfied.
    pub fn satisfied_by(&self, ev: &Event, state: &dyn ProcessState) -> bool {
        self.criteria
            .iter()
            .all(|criterion| criterion(&self.configuration, ev, state))
    }
}

impl std::fmt::Debug for Prototype {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Prototype")
            .field("configuration", &self.configuration)
            .field("criteria", &self.criteria.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::state::ControlState;

    fn fixture() -> Context<ControlState> {
        Context::new(ControlState::new())
    }

    fn element(frame: &str, slot: &str, name: &str, value: &str) -> ConfigurationElement {
        ConfigurationElement::new(0, frame, slot, name, value)
    }

    #[test]
    fn unrecognized_elements_compile_no_criteria_but_stay_queryable() {
        let prototype = Prototype::compile(Configuration::new(vec![
            element("render", "template", "checkout", "shop/checkout"),
            element("event", "match", "role", "admin"),
        ]));

        assert_eq!(prototype.criteria_count(), 1);
        assert!(prototype
            .configuration()
            .has("render", "template", "checkout"));
    }

    #[test]
    fn event_match_criterion_compares_values() {
        let ctx = fixture();
        let prototype = Prototype::compile(Configuration::new(vec![element(
            "event", "match", "role", "admin",
        )]));

        let mut admin = Event::new(&ctx, "login");
        admin.add_param("role", "admin").unwrap();
        assert!(prototype.satisfied_by(&admin, ctx.state()));

        let mut guest = Event::new(&ctx, "login");
        guest.add_param("role", "guest").unwrap();
        assert!(!prototype.satisfied_by(&guest, ctx.state()));

        let bare = Event::new(&ctx, "login");
        assert!(!prototype.satisfied_by(&bare, ctx.state()));
    }

    #[test]
    fn context_criteria_consult_shared_state() {
        let ctx = fixture();
        let prototype = Prototype::compile(Configuration::new(vec![
            element("context", "flagged", "ready", ""),
            element("context", "match", "tier", "gold"),
            element("context", "excludes", "suspended", ""),
        ]));
        let ev = Event::new(&ctx, "anything");

        assert!(!prototype.satisfied_by(&ev, ctx.state()));

        ctx.state().set_flag("ready");
        ctx.state().set_param("tier", "gold");
        assert!(prototype.satisfied_by(&ev, ctx.state()));

        ctx.state().set_param("suspended", "true");
        assert!(!prototype.satisfied_by(&ev, ctx.state()));
    }

    #[test]
    fn all_criteria_must_hold() {
        let ctx = fixture();
        let prototype = Prototype::compile(Configuration::new(vec![
            element("event", "has", "area", ""),
            element("event", "match", "role", "admin"),
        ]));

        let mut ev = Event::new(&ctx, "view");
        ev.add_param("area", "shop").unwrap();
        // one criterion passes, the other fails
        assert!(!prototype.satisfied_by(&ev, ctx.state()));
    }

    #[test]
    fn blank_prototype_is_always_satisfied() {
        let ctx = fixture();
        let ev = Event::new(&ctx, "anything");
        assert!(Prototype::blank().satisfied_by(&ev, ctx.state()));
    }

    #[test]
    fn custom_vocabulary_extends_the_standard_one() {
        let ctx = fixture();
        let mut vocab = CriteriaVocabulary::standard();
        vocab.insert("event", "message-starts-with", |el| {
            let prefix = el.value.clone();
            Arc::new(move |_config, ev, _state| ev.message().starts_with(prefix.as_str()))
        });
        let prototype = Prototype::compile_with(
            Configuration::new(vec![element("event", "message-starts-with", "", "user:")]),
            &vocab,
        );

        assert!(prototype.satisfied_by(&Event::new(&ctx, "user:login"), ctx.state()));
        assert!(!prototype.satisfied_by(&Event::new(&ctx, "cart:add"), ctx.state()));
    }
}
