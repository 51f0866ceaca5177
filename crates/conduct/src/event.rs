//! Events: named messages fired against a context.
//!
//! An event is immutable in its `message` and context binding for its whole
//! life. Parameters may be added before firing (duplicate keys rejected),
//! and the payload slot may be written exactly once, which lets a behaviour
//! use it as a return channel during dispatch.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::OnceLock;

use serde_json::json;
use uuid::Uuid;

use crate::context::Context;
use crate::error::{EngineError, ErrorMessage};
use crate::model::Model;
use crate::state::ProcessState;

/// A named message with parameters, bound to the context it will be fired on.
///
/// The context binding is a non-owning id, not a reference: contexts define
/// the unit of lifetime, events merely point back for validation.
#[derive(Debug, Clone)]
pub struct Event {
    context_id: Uuid,
    message: String,
    params: BTreeMap<String, String>,
    payload: OnceLock<Arc<dyn Model>>,
}

impl Event {
    /// Creates an event bound to `context` with no parameters.
    pub fn new<S: ProcessState>(context: &Context<S>, message: impl Into<String>) -> Self {
        Event {
            context_id: context.id(),
            message: message.into(),
            params: BTreeMap::new(),
            payload: OnceLock::new(),
        }
    }

    /// Creates an event carrying the supplied parameters.
    ///
    /// The event takes ownership of the map, so the caller cannot alter the
    /// params after construction.
    pub fn with_params<S: ProcessState>(
        context: &Context<S>,
        message: impl Into<String>,
        params: BTreeMap<String, String>,
    ) -> Self {
        Event {
            context_id: context.id(),
            message: message.into(),
            params,
            payload: OnceLock::new(),
        }
    }

    /// Creates an event already carrying a payload.
    pub fn with_payload<S: ProcessState>(
        context: &Context<S>,
        message: impl Into<String>,
        params: BTreeMap<String, String>,
        payload: Arc<dyn Model>,
    ) -> Self {
        let ev = Event::with_params(context, message, params);
        let _ = ev.payload.set(payload);
        ev
    }

    /// The id of the context this event is bound to.
    pub fn context_id(&self) -> Uuid {
        self.context_id
    }

    /// The name of the event. What it means is application convention.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The event's parameters.
    pub fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    /// Looks up a single parameter.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Adds a parameter, rejecting duplicate keys.
    pub fn add_param(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), EngineError> {
        let key = key.into();
        if self.params.contains_key(&key) {
            return Err(EngineError::DuplicateParam { key });
        }
        self.params.insert(key, value.into());
        Ok(())
    }

    /// Whether every named parameter exists on the event.
    ///
    /// An empty list of names has nothing to assert and returns false, which
    /// keeps "requires these params" checks honest.
    pub fn has_params<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> bool {
        let mut any = false;
        for name in names {
            any = true;
            if !self.params.contains_key(name) {
                return false;
            }
        }
        any
    }

    /// As [`has_params`], recording one error on shared state for each
    /// missing parameter.
    ///
    /// [`has_params`]: Event::has_params
    pub fn has_required_params(&self, state: &dyn ProcessState, names: &[&str]) -> bool {
        let mut has = !names.is_empty();
        for name in names {
            if !self.params.contains_key(*name) {
                state.record_error(ErrorMessage::new(format!(
                    "event '{}' is missing the required param '{name}'",
                    self.message
                )));
                has = false;
            }
        }
        has
    }

    /// Whether every key/value pair exists on the event with that exact value.
    pub fn has_param_values<'a>(
        &self,
        expected: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> bool {
        expected
            .into_iter()
            .all(|(key, value)| self.param(key) == Some(value))
    }

    /// The payload carried by the event, if one has been set.
    pub fn payload(&self) -> Option<&Arc<dyn Model>> {
        self.payload.get()
    }

    /// Sets the payload. An event's payload may be written exactly once;
    /// a second set fails even when the value is the same.
    pub fn set_payload(&self, payload: Arc<dyn Model>) -> Result<(), EngineError> {
        self.payload
            .set(payload)
            .map_err(|_| EngineError::PayloadAlreadySet)
    }

    /// Projects the event as its JSON wire form.
    ///
    /// The payload is deliberately not part of the wire form.
    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "_type": "event",
            "message": self.message,
            "params": self.params,
        })
    }

    /// Serializes the event's JSON wire form to a string.
    pub fn to_json_string(&self) -> String {
        self.to_json().to_string()
    }

    /// Reads an event back from its JSON wire form, binding it to `context`.
    pub fn from_json<S: ProcessState>(
        context: &Context<S>,
        source: &str,
    ) -> Result<Event, EngineError> {
        let value: serde_json::Value = serde_json::from_str(source)
            .map_err(|err| EngineError::parse_caused_by("malformed json", err))?;
        if value.get("_type").and_then(|t| t.as_str()) != Some("event") {
            return Err(EngineError::parse(
                "the expressed type of the json provided is not an event",
            ));
        }
        let message = value
            .get("message")
            .and_then(|m| m.as_str())
            .ok_or_else(|| EngineError::parse("event json is missing its message"))?;
        let mut params = BTreeMap::new();
        if let Some(map) = value.get("params") {
            let map = map
                .as_object()
                .ok_or_else(|| EngineError::parse("event params must be an object"))?;
            for (key, value) in map {
                let value = value
                    .as_str()
                    .ok_or_else(|| EngineError::parse("event param values must be strings"))?;
                params.insert(key.clone(), value.to_string());
            }
        }
        Ok(Event::with_params(context, message, params))
    }

    /// Projects the event as its XML wire form.
    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "<event message=\"{}\"><params>",
            escape_attr(&self.message)
        ));
        for (key, value) in &self.params {
            out.push_str(&format!(
                "<item name=\"{}\" value=\"{}\"/>",
                escape_attr(key),
                escape_attr(value)
            ));
        }
        out.push_str("</params></event>");
        out
    }

    /// Reads an event back from its XML wire form, binding it to `context`.
    pub fn from_xml<S: ProcessState>(
        context: &Context<S>,
        source: &str,
    ) -> Result<Event, EngineError> {
        let doc = roxmltree::Document::parse(source)
            .map_err(|err| EngineError::parse_caused_by("malformed xml", err))?;
        let root = doc.root_element();
        if root.tag_name().name() != "event" {
            return Err(EngineError::parse(
                "the root element of the xml provided is not an event",
            ));
        }
        let message = root
            .attribute("message")
            .ok_or_else(|| EngineError::parse("event element is missing its message attribute"))?;
        let mut ev = Event::new(context, message);
        for item in root.descendants().filter(|n| n.has_tag_name("item")) {
            let name = item
                .attribute("name")
                .ok_or_else(|| EngineError::parse("param item is missing its name attribute"))?;
            let value = item
                .attribute("value")
                .ok_or_else(|| EngineError::parse("param item is missing its value attribute"))?;
            ev.add_param(name, value)
                .map_err(|err| EngineError::parse_caused_by("duplicate param in xml", err))?;
        }
        Ok(ev)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(event @message {}", self.message)?;
        for (key, value) in &self.params {
            write!(f, " ({key} {value})")?;
        }
        write!(f, ")")
    }
}

fn escape_attr(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::state::ControlState;

    fn context() -> Context<ControlState> {
        Context::new(ControlState::new())
    }

    #[test]
    fn params_are_isolated_from_the_callers_map() {
        let ctx = context();
        let mut source = BTreeMap::new();
        source.insert("who".to_string(), "admin".to_string());
        let ev = Event::with_params(&ctx, "login", source.clone());

        source.insert("who".to_string(), "intruder".to_string());
        assert_eq!(ev.param("who"), Some("admin"));
    }

    #[test]
    fn duplicate_params_are_rejected() {
        let ctx = context();
        let mut ev = Event::new(&ctx, "login");
        ev.add_param("who", "admin").unwrap();
        let err = ev.add_param("who", "admin").unwrap_err();
        assert!(matches!(err, EngineError::DuplicateParam { key } if key == "who"));
    }

    #[test]
    fn payload_may_only_be_set_once() {
        let ctx = context();
        let ev = Event::new(&ctx, "login");
        assert!(ev.payload().is_none());

        ev.set_payload(Arc::new("first".to_string())).unwrap();
        // even the very same value is rejected the second time
        let err = ev.set_payload(Arc::new("first".to_string())).unwrap_err();
        assert!(matches!(err, EngineError::PayloadAlreadySet));
        assert_eq!(ev.payload().unwrap().to_value(), json!("first"));
    }

    #[test]
    fn clone_copies_message_params_and_payload() {
        let ctx = context();
        let mut ev = Event::new(&ctx, "login");
        ev.add_param("who", "admin").unwrap();
        ev.set_payload(Arc::new("token".to_string())).unwrap();

        let copy = ev.clone();
        assert_eq!(copy.message(), "login");
        assert_eq!(copy.param("who"), Some("admin"));
        assert_eq!(copy.context_id(), ev.context_id());
        assert_eq!(copy.payload().unwrap().to_value(), json!("token"));
    }

    #[test]
    fn has_params_requires_every_name() {
        let ctx = context();
        let mut ev = Event::new(&ctx, "view");
        ev.add_param("area", "shop").unwrap();
        ev.add_param("action", "view").unwrap();

        assert!(ev.has_params(["area", "action"]));
        assert!(!ev.has_params(["area", "concern"]));
        assert!(!ev.has_params([]));
        assert!(ev.has_param_values([("area", "shop")]));
        assert!(!ev.has_param_values([("area", "warehouse")]));
    }

    #[test]
    fn required_params_record_an_error_per_missing() {
        let ctx = context();
        let mut ev = Event::new(&ctx, "checkout");
        ev.add_param("area", "shop").unwrap();

        assert!(ev.has_required_params(ctx.state(), &["area"]));
        assert!(ctx.state().errors().is_empty());

        assert!(!ev.has_required_params(ctx.state(), &["area", "concern", "action"]));
        let errors = ctx.state().errors();
        assert_eq!(errors.len(), 2);
        assert!(errors[0].text.contains("'concern'"));
        assert!(errors[1].text.contains("'action'"));

        // an empty requirement list asserts nothing and fails
        assert!(!ev.has_required_params(ctx.state(), &[]));
    }

    #[test]
    fn json_round_trip_preserves_message_and_params() {
        let ctx = context();
        let mut ev = Event::new(&ctx, "checkout");
        ev.add_param("area", "shop").unwrap();
        ev.add_param("note", "5 < 6 & \"quoted\"").unwrap();
        ev.add_param("who", "admin").unwrap();

        let parsed = Event::from_json(&ctx, &ev.to_json_string()).unwrap();
        assert_eq!(parsed.message(), "checkout");
        assert_eq!(parsed.params(), ev.params());
    }

    #[test]
    fn json_round_trip_with_no_params() {
        let ctx = context();
        let ev = Event::new(&ctx, "ping");
        let parsed = Event::from_json(&ctx, &ev.to_json_string()).unwrap();
        assert_eq!(parsed.message(), "ping");
        assert!(parsed.params().is_empty());
    }

    #[test]
    fn payload_is_not_part_of_the_wire_form() {
        let ctx = context();
        let ev = Event::new(&ctx, "ping");
        ev.set_payload(Arc::new("secret".to_string())).unwrap();
        assert!(!ev.to_json_string().contains("secret"));
        assert!(!ev.to_xml().contains("secret"));
    }

    #[test]
    fn xml_round_trip_preserves_message_and_params() {
        let ctx = context();
        let mut ev = Event::new(&ctx, "checkout");
        ev.add_param("note", "5 < 6 & \"quoted\"").unwrap();
        ev.add_param("who", "admin").unwrap();

        let xml = ev.to_xml();
        let parsed = Event::from_xml(&ctx, &xml).unwrap();
        assert_eq!(parsed.message(), "checkout");
        assert_eq!(parsed.params(), ev.params());
    }

    #[test]
    fn parsing_rejects_other_shapes() {
        let ctx = context();
        let err = Event::from_json(&ctx, r#"{"_type":"command","message":"x"}"#).unwrap_err();
        assert!(matches!(err, EngineError::Parse { .. }));

        let err = Event::from_xml(&ctx, "<command message=\"x\"/>").unwrap_err();
        assert!(matches!(err, EngineError::Parse { .. }));

        let err = Event::from_json(&ctx, "not json at all").unwrap_err();
        assert!(matches!(err, EngineError::Parse { source: Some(_), .. }));
    }
}
