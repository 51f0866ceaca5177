//! The opaque-but-projectable value type carried by events, view steps, and
//! the shared-state bag.
//!
//! Anything placed in one of those slots must be able to project itself as a
//! JSON value so a later rendering stage can consume it. The engine never
//! inspects a model beyond that projection.

use std::fmt;
use std::sync::Arc;

/// A value that can be carried opaquely and projected to JSON on demand.
pub trait Model: fmt::Debug + Send + Sync + 'static {
    /// Projects the model as a JSON value.
    fn to_value(&self) -> serde_json::Value;
}

impl Model for serde_json::Value {
    fn to_value(&self) -> serde_json::Value {
        self.clone()
    }
}

impl Model for String {
    fn to_value(&self) -> serde_json::Value {
        serde_json::Value::String(self.clone())
    }
}

/// Wraps any serializable value as a model.
///
/// The projection is computed once at construction, so a value that fails to
/// serialize is caught at the call site rather than mid-render.
pub fn model_of<T: serde::Serialize>(value: T) -> Result<Arc<dyn Model>, serde_json::Error> {
    Ok(Arc::new(serde_json::to_value(value)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_models_project_as_json_strings() {
        let model: Arc<dyn Model> = Arc::new("hello".to_string());
        assert_eq!(model.to_value(), serde_json::json!("hello"));
    }

    #[test]
    fn model_of_wraps_serializable_values() {
        #[derive(serde::Serialize)]
        struct Cart {
            items: u32,
        }
        let model = model_of(Cart { items: 3 }).unwrap();
        assert_eq!(model.to_value(), serde_json::json!({ "items": 3 }));
    }
}
