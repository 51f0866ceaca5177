//! The view-step render pipeline.
//!
//! Rendering behaviours cooperate by appending named steps: one behaviour
//! projects shared state into a model step, the next transforms that model
//! into content, and so on. The pipeline is append-only; earlier steps are
//! retained for audit but later stages only ever read [`ViewSteps::last`].

use std::sync::Arc;
use std::sync::RwLock;

use crate::model::Model;
use crate::sync::read_lock;
use crate::sync::write_lock;

/// One named stage of a render pipeline.
///
/// A step carries a model, content, or both; which one is authoritative is a
/// convention between the behaviours layering the pipeline. A transform step
/// typically consumes the previous step's model-or-content and produces a
/// new content step.
#[derive(Debug, Clone)]
pub struct ViewStep {
    name: String,
    content_type: String,
    model: Option<Arc<dyn Model>>,
    content: Option<String>,
}

impl ViewStep {
    /// The name of the step, usually the template or stage that produced it.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The media type of the step's content, e.g. `text/html`.
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// The model carried by this step, if any.
    pub fn model(&self) -> Option<&Arc<dyn Model>> {
        self.model.as_ref()
    }

    /// The rendered content carried by this step, if any.
    pub fn content(&self) -> Option<&str> {
        self.content.as_deref()
    }

    pub fn has_model(&self) -> bool {
        self.model.is_some()
    }

    pub fn has_content(&self) -> bool {
        self.content.is_some()
    }
}

/// The ordered, append-only sequence of render steps for one context.
#[derive(Debug, Default)]
pub struct ViewSteps {
    steps: RwLock<Vec<ViewStep>>,
}

impl ViewSteps {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether any step has been created yet.
    pub fn has_steps(&self) -> bool {
        !read_lock(&self.steps).is_empty()
    }

    /// The number of steps created so far.
    pub fn len(&self) -> usize {
        read_lock(&self.steps).len()
    }

    pub fn is_empty(&self) -> bool {
        !self.has_steps()
    }

    /// The most recent step, or `None` when the pipeline is empty.
    pub fn last(&self) -> Option<ViewStep> {
        read_lock(&self.steps).last().cloned()
    }

    /// Appends a content-only step.
    pub fn create_step(
        &self,
        name: impl Into<String>,
        content_type: impl Into<String>,
        content: impl Into<String>,
    ) {
        self.push(ViewStep {
            name: name.into(),
            content_type: content_type.into(),
            model: None,
            content: Some(content.into()),
        });
    }

    /// Appends a model-only step with the default `application/json` type.
    pub fn create_model_step(&self, name: impl Into<String>, model: Arc<dyn Model>) {
        self.create_step_with(name, "application/json", model);
    }

    /// Appends a model step with an explicit content type.
    pub fn create_step_with(
        &self,
        name: impl Into<String>,
        content_type: impl Into<String>,
        model: Arc<dyn Model>,
    ) {
        self.push(ViewStep {
            name: name.into(),
            content_type: content_type.into(),
            model: Some(model),
            content: None,
        });
    }

    /// A snapshot of the whole pipeline, oldest step first.
    pub fn snapshot(&self) -> Vec<ViewStep> {
        read_lock(&self.steps).clone()
    }

    fn push(&self, step: ViewStep) {
        tracing::trace!(step = %step.name, content_type = %step.content_type, "appending view step");
        write_lock(&self.steps).push(step);
    }
}
