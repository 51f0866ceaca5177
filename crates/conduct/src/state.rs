//! Shared mutable state for a context.
//!
//! [`ProcessState`] is the seam between the engine and whatever state a
//! caller supplies: the dispatch loop and the criteria vocabulary only ever
//! reach state through it. [`ControlState`] is the stock implementation that
//! most behaviours coordinate through.
//!
//! Only `params` is guaranteed safe for access from concurrent callers (it
//! is backed by a concurrent map). The remaining fields use interior
//! mutability so behaviours can write through a shared context reference,
//! but they are intended to be mutated from the single dispatch thread.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::sync::RwLock;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde_json::json;

use crate::error::ErrorMessage;
use crate::model::Model;
use crate::sync::{read_lock, write_lock};
use crate::view::ViewSteps;

/// Keys with this prefix are private to behaviours and are excluded when
/// state is projected into a render-facing view model.
pub const PRIVATE_PREFIX: &str = "_";

/// Whether a state key is private to behaviours.
pub fn is_private_key(key: &str) -> bool {
    key.starts_with(PRIVATE_PREFIX)
}

/// The engine's view of caller-supplied shared state.
///
/// The dispatch loop needs `record_error` for the default rescue;
/// `fire_with` and the criteria vocabulary need parameter and flag lookups.
/// Everything else a concrete state offers is convention between behaviours.
pub trait ProcessState: Send + Sync + 'static {
    /// Records a message intended for user feedback.
    fn record_message(&self, text: &str);

    /// Records an error, normally from a behaviour's rescue.
    fn record_error(&self, error: ErrorMessage);

    /// Looks up an execution parameter.
    fn param(&self, key: &str) -> Option<String>;

    /// Sets an execution parameter, replacing any previous value.
    fn set_param(&self, key: &str, value: &str);

    /// Whether the parameter exists at all.
    fn has_param(&self, key: &str) -> bool {
        self.param(key).is_some()
    }

    /// A point-in-time copy of all execution parameters.
    fn params(&self) -> BTreeMap<String, String>;

    /// Whether the named flag is set.
    fn is_flagged(&self, flag: &str) -> bool;

    /// Sets the named flag.
    fn set_flag(&self, flag: &str);

    /// Clears the named flag, if set.
    fn drop_flag(&self, flag: &str);
}

/// A named informal timer.
///
/// Timers are for informal timings surfaced to a view, not for metrics.
#[derive(Debug, Clone)]
pub struct ProcessTimer {
    started: DateTime<Utc>,
    took: Option<Duration>,
}

impl ProcessTimer {
    fn begin() -> Self {
        ProcessTimer {
            started: Utc::now(),
            took: None,
        }
    }

    /// When the timer was started.
    pub fn started(&self) -> DateTime<Utc> {
        self.started
    }

    /// The measured duration, or the running elapsed time if still open.
    pub fn elapsed(&self) -> Duration {
        self.took.unwrap_or_else(|| Utc::now() - self.started)
    }

    /// Whether `end` has been called.
    pub fn is_stopped(&self) -> bool {
        self.took.is_some()
    }
}

/// The named timers of a context.
#[derive(Debug, Default)]
pub struct TimerSet {
    timers: DashMap<String, ProcessTimer>,
}

impl TimerSet {
    /// Starts (or restarts) the named timer.
    pub fn begin(&self, name: &str) {
        self.timers.insert(name.to_string(), ProcessTimer::begin());
    }

    /// Stops the named timer, returning what it measured.
    pub fn end(&self, name: &str) -> Option<Duration> {
        let mut entry = self.timers.get_mut(name)?;
        let took = Utc::now() - entry.started;
        entry.took = Some(took);
        Some(took)
    }

    /// Times a closure under the named timer.
    pub fn time<T>(&self, name: &str, work: impl FnOnce() -> T) -> T {
        self.begin(name);
        let out = work();
        self.end(name);
        out
    }

    /// A point-in-time copy of every timer.
    pub fn snapshot(&self) -> BTreeMap<String, ProcessTimer> {
        self.timers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }
}

/// The stock shared state behaviours coordinate through.
///
/// Beyond the well-known collections, `ControlState` is a bag: behaviours
/// may stash arbitrary named models for later behaviours (or the render
/// stage) to pick up.
#[derive(Debug, Default)]
pub struct ControlState {
    messages: RwLock<Vec<String>>,
    errors: RwLock<Vec<ErrorMessage>>,
    flags: RwLock<BTreeSet<String>>,
    timers: TimerSet,
    params: DashMap<String, String>,
    entries: DashMap<String, Arc<dyn Model>>,
    view_steps: ViewSteps,
}

impl ControlState {
    pub fn new() -> Self {
        Self::default()
    }

    /// A point-in-time copy of the recorded messages.
    pub fn messages(&self) -> Vec<String> {
        read_lock(&self.messages).clone()
    }

    /// A point-in-time copy of the recorded errors.
    pub fn errors(&self) -> Vec<ErrorMessage> {
        read_lock(&self.errors).clone()
    }

    /// A point-in-time copy of the set flags.
    pub fn flags(&self) -> BTreeSet<String> {
        read_lock(&self.flags).clone()
    }

    /// The named timers of this state.
    pub fn timers(&self) -> &TimerSet {
        &self.timers
    }

    /// The render pipeline for this state.
    pub fn view_steps(&self) -> &ViewSteps {
        &self.view_steps
    }

    /// Stores a named model in the bag, replacing any previous entry.
    pub fn set_entry(&self, key: &str, model: Arc<dyn Model>) {
        self.entries.insert(key.to_string(), model);
    }

    /// Looks up a named model in the bag.
    pub fn entry(&self, key: &str) -> Option<Arc<dyn Model>> {
        self.entries.get(key).map(|e| e.value().clone())
    }

    /// A point-in-time copy of the bag.
    pub fn entries(&self) -> BTreeMap<String, Arc<dyn Model>> {
        self.entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Projects the whole state as a JSON value.
    ///
    /// This is the diagnostic rendering and includes private keys; the
    /// render-facing projection lives with the view behaviours.
    pub fn to_value(&self) -> serde_json::Value {
        let timers: BTreeMap<String, i64> = self
            .timers
            .snapshot()
            .into_iter()
            .map(|(name, timer)| (name, timer.elapsed().num_milliseconds()))
            .collect();
        let entries: BTreeMap<String, serde_json::Value> = self
            .entries()
            .into_iter()
            .map(|(key, model)| (key, model.to_value()))
            .collect();
        json!({
            "messages": self.messages(),
            "errors": self.errors(),
            "flags": self.flags(),
            "timers": timers,
            "params": self.params(),
            "entries": entries,
        })
    }
}

impl ProcessState for ControlState {
    fn record_message(&self, text: &str) {
        write_lock(&self.messages).push(text.to_string());
    }

    fn record_error(&self, error: ErrorMessage) {
        write_lock(&self.errors).push(error);
    }

    fn param(&self, key: &str) -> Option<String> {
        self.params.get(key).map(|v| v.value().clone())
    }

    fn set_param(&self, key: &str, value: &str) {
        self.params.insert(key.to_string(), value.to_string());
    }

    fn params(&self) -> BTreeMap<String, String> {
        self.params
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    fn is_flagged(&self, flag: &str) -> bool {
        read_lock(&self.flags).contains(flag)
    }

    fn set_flag(&self, flag: &str) {
        write_lock(&self.flags).insert(flag.to_string());
    }

    fn drop_flag(&self, flag: &str) {
        write_lock(&self.flags).remove(flag);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_round_trip() {
        let state = ControlState::new();
        state.set_param("area", "shop");
        assert_eq!(state.param("area").as_deref(), Some("shop"));
        assert!(state.has_param("area"));
        assert!(!state.has_param("concern"));
    }

    #[test]
    fn flags_set_and_drop() {
        let state = ControlState::new();
        assert!(!state.is_flagged("nocache"));
        state.set_flag("nocache");
        assert!(state.is_flagged("nocache"));
        state.drop_flag("nocache");
        assert!(!state.is_flagged("nocache"));
    }

    #[test]
    fn timers_measure_something() {
        let state = ControlState::new();
        state.timers().begin("work");
        let took = state.timers().end("work").unwrap();
        assert!(took.num_milliseconds() >= 0);
        assert!(state.timers().snapshot()["work"].is_stopped());
    }

    #[test]
    fn time_runs_the_closure_under_a_stopped_timer() {
        let state = ControlState::new();
        let out = state.timers().time("span", || 6 * 7);
        assert_eq!(out, 42);

        let timers = state.timers().snapshot();
        assert!(timers["span"].is_stopped());
        assert!(timers["span"].elapsed().num_milliseconds() >= 0);
    }

    #[test]
    fn to_value_includes_the_bag() {
        let state = ControlState::new();
        state.record_message("hello");
        state.set_entry("cart", Arc::new(json!({ "items": 2 })));
        let value = state.to_value();
        assert_eq!(value["messages"][0], "hello");
        assert_eq!(value["entries"]["cart"]["items"], 2);
    }

    #[test]
    fn private_key_detection() {
        assert!(is_private_key("_scratch"));
        assert!(!is_private_key("cart"));
    }
}
