//! Projection of control state into the render-facing view state.

use std::collections::BTreeMap;
use std::sync::Arc;

use conduct_core::{is_private_key, Behaviour, Context, ControlState, Event, ProcessState};
use serde_json::json;

/// Constructs the initial model of the render pipeline from the context's
/// control state.
///
/// This is a filtering of the control state into the model that is going to
/// be rendered: the well-known collections are copied over, then every bag
/// entry, except that any key starting with `_` is private and is not
/// carried forward. Swap this behaviour out to present a different model to
/// the view layer.
pub struct ViewStateBehaviour {
    responds_to: String,
}

impl ViewStateBehaviour {
    pub fn new(responds_to: impl Into<String>) -> Self {
        ViewStateBehaviour {
            responds_to: responds_to.into(),
        }
    }
}

impl Behaviour<ControlState> for ViewStateBehaviour {
    fn responds_to(&self) -> &str {
        &self.responds_to
    }

    fn action(&self, _ev: &Event, ctx: &Context<ControlState>) -> anyhow::Result<()> {
        let state = ctx.state();

        let params: BTreeMap<String, String> = state
            .params()
            .into_iter()
            .filter(|(key, _)| !is_private_key(key))
            .collect();
        let timers: BTreeMap<String, i64> = state
            .timers()
            .snapshot()
            .into_iter()
            .map(|(name, timer)| (name, timer.elapsed().num_milliseconds()))
            .collect();

        let mut model = serde_json::Map::new();
        model.insert("messages".to_string(), json!(state.messages()));
        model.insert("errors".to_string(), serde_json::to_value(state.errors())?);
        model.insert("flags".to_string(), json!(state.flags()));
        model.insert("timers".to_string(), json!(timers));
        model.insert("params".to_string(), json!(params));

        for (key, entry) in state.entries() {
            if !is_private_key(&key) {
                model.insert(key, entry.to_value());
            }
        }

        // a model-item param narrows the view state to one named entry
        let selected = state
            .param("model-item")
            .and_then(|item| model.get(&item).cloned());
        let model = selected.unwrap_or(serde_json::Value::Object(model));

        state
            .view_steps()
            .create_model_step("view-state", Arc::new(model));
        Ok(())
    }
}
