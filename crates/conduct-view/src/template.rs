//! The template view behaviour: multi-level fallback search, compile cache,
//! and the engine contract concrete templating backends implement.

use std::collections::BTreeMap;
use std::sync::Arc;

use conduct_core::{Behaviour, Context, ControlState, Event, ProcessState};
use smallvec::SmallVec;
use tracing::{debug, trace};

use crate::cache::TemplateCache;

/// The contract a concrete templating backend implements against the engine.
///
/// The behaviour owns the search and caching; the backend only compiles and
/// renders. `kind` doubles as the cache namespace and the directory the
/// backend's templates live under.
pub trait TemplateEngine: Send + Sync + 'static {
    /// The compiled form held in the shared cache.
    type Compiled: Send + Sync + 'static;

    /// The backend's name, e.g. `text` or `xslt`.
    fn kind(&self) -> &str;

    /// The file extension of this backend's templates, without the dot.
    fn extension(&self) -> &str;

    /// Compiles template source.
    fn compile(&self, source: &str) -> anyhow::Result<Self::Compiled>;

    /// Renders the previous step's model (or content, as a JSON string)
    /// with the context's params.
    fn render(
        &self,
        compiled: &Self::Compiled,
        model: &serde_json::Value,
        params: &BTreeMap<String, String>,
    ) -> anyhow::Result<String>;
}

/// The ordered, specificity-descending candidate template names for an
/// event, derived from its `area`/`concern`/`action` parameters.
///
/// Params are read from the event first, falling back to context state.
/// Tiers whose params are absent are skipped; the bare `default` candidate
/// is always present, so the list is never empty.
pub fn possible_templates(
    ev: &Event,
    state: &dyn ProcessState,
    extension: &str,
) -> SmallVec<[String; 8]> {
    let lookup = |key: &str| -> Option<String> {
        ev.param(key).map(str::to_string).or_else(|| state.param(key))
    };
    let area = lookup("area");
    let concern = lookup("concern");
    let action = lookup("action").map(|a| format!("{a}.{extension}"));
    let default = format!("default.{extension}");

    let mut candidates = SmallVec::new();
    if let (Some(area), Some(concern)) = (&area, &concern) {
        if let Some(action) = &action {
            candidates.push(format!("{area}/{concern}/{action}"));
        }
        candidates.push(format!("{area}/{concern}/{default}"));
    }
    if let Some(area) = &area {
        if let Some(action) = &action {
            candidates.push(format!("{area}/{action}"));
        }
        candidates.push(format!("{area}/{default}"));
    }
    if let Some(concern) = &concern {
        if let Some(action) = &action {
            candidates.push(format!("{concern}/{action}"));
        }
        candidates.push(format!("{concern}/{default}"));
    }
    if let Some(action) = action {
        candidates.push(action);
    }
    candidates.push(default);
    candidates
}

/// Transforms the last view step with the best-matching external template.
///
/// Walks the candidate names in specificity order; the first one that
/// resolves through the context's resources wins and the search stops.
/// Compiled templates are held in an injected [`TemplateCache`], which is
/// bypassed for lookups while the context's `nocache` flag is set.
pub struct TemplateViewBehaviour<E: TemplateEngine> {
    responds_to: String,
    content_type: String,
    engine: E,
    cache: Arc<TemplateCache>,
    enable_cache: bool,
}

impl<E: TemplateEngine> TemplateViewBehaviour<E> {
    /// Creates the behaviour with a private cache and a content type of
    /// `text/html`.
    pub fn new(responds_to: impl Into<String>, engine: E) -> Self {
        TemplateViewBehaviour {
            responds_to: responds_to.into(),
            content_type: "text/html".to_string(),
            engine,
            cache: Arc::new(TemplateCache::new()),
            enable_cache: true,
        }
    }

    /// Sets the content type of the steps this behaviour produces.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    /// Shares an externally owned cache, e.g. across concurrent contexts.
    pub fn with_cache(mut self, cache: Arc<TemplateCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Disables compiled-template caching entirely.
    pub fn without_cache(mut self) -> Self {
        self.enable_cache = false;
        self
    }

    fn template_path(&self, name: &str) -> String {
        format!("views/{}/{}", self.engine.kind(), name)
    }
}

impl<E: TemplateEngine> Behaviour<ControlState> for TemplateViewBehaviour<E> {
    fn responds_to(&self) -> &str {
        &self.responds_to
    }

    fn action(&self, ev: &Event, ctx: &Context<ControlState>) -> anyhow::Result<()> {
        let state = ctx.state();
        let steps = state.view_steps();
        let Some(last) = steps.last() else {
            return Ok(());
        };
        if !last.has_content() && !last.has_model() {
            return Ok(());
        }

        let lookups_enabled = self.enable_cache && !state.is_flagged("nocache");

        for name in possible_templates(ev, state, self.engine.extension()) {
            let cache_key = TemplateCache::key(self.engine.kind(), &name);
            let compiled = match lookups_enabled
                .then(|| self.cache.get::<E::Compiled>(&cache_key))
                .flatten()
            {
                Some(hit) => {
                    trace!(template = %name, "compiled template cache hit");
                    hit
                }
                None => {
                    let path = self.template_path(&name);
                    if !ctx.resources().exists(&path) {
                        continue;
                    }
                    debug!(template = %name, "compiling template");
                    let source = ctx.resources().read_all_text(&path)?;
                    let fresh = Arc::new(self.engine.compile(&source)?);
                    if self.enable_cache {
                        self.cache.insert(cache_key, fresh.clone());
                    }
                    fresh
                }
            };

            let model = match last.model() {
                Some(model) => model.to_value(),
                None => serde_json::Value::String(last.content().unwrap_or_default().to_string()),
            };
            let rendered = self.engine.render(&compiled, &model, &state.params())?;
            steps.create_step(&name, &self.content_type, rendered);
            // first match wins, the search stops here
            return Ok(());
        }
        Ok(())
    }
}

/// A minimal substitution backend: `{name}` placeholders are replaced from
/// the context's params and then from the model's top-level fields.
///
/// Stands in for a real templating engine and keeps the pipeline exercisable
/// end to end without one.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderEngine;

impl TemplateEngine for PlaceholderEngine {
    type Compiled = String;

    fn kind(&self) -> &str {
        "text"
    }

    fn extension(&self) -> &str {
        "tpl"
    }

    fn compile(&self, source: &str) -> anyhow::Result<Self::Compiled> {
        Ok(source.to_string())
    }

    fn render(
        &self,
        compiled: &Self::Compiled,
        model: &serde_json::Value,
        params: &BTreeMap<String, String>,
    ) -> anyhow::Result<String> {
        let mut out = compiled.clone();
        for (key, value) in params {
            out = out.replace(&format!("{{{key}}}"), value);
        }
        if let Some(fields) = model.as_object() {
            for (key, value) in fields {
                let rendered = match value {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                out = out.replace(&format!("{{{key}}}"), &rendered);
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conduct_testing::{test_context_with_resources, MemoryResources};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn shop_event(ctx: &Context<ControlState>) -> Event {
        ctx.state().set_param("area", "shop");
        ctx.state().set_param("concern", "cart");
        ctx.state().set_param("action", "view");
        Event::new(ctx, "render")
    }

    #[test]
    fn candidates_descend_in_specificity() {
        let ctx = test_context_with_resources(MemoryResources::new());
        let ev = shop_event(&ctx);

        let candidates = possible_templates(&ev, ctx.state(), "tpl");
        assert_eq!(
            candidates.as_slice(),
            [
                "shop/cart/view.tpl",
                "shop/cart/default.tpl",
                "shop/view.tpl",
                "shop/default.tpl",
                "cart/view.tpl",
                "cart/default.tpl",
                "view.tpl",
                "default.tpl",
            ]
        );
    }

    #[test]
    fn event_params_take_precedence_over_context_params() {
        let ctx = test_context_with_resources(MemoryResources::new());
        ctx.state().set_param("area", "shop");
        let mut ev = Event::new(&ctx, "render");
        ev.add_param("area", "admin").unwrap();

        let candidates = possible_templates(&ev, ctx.state(), "tpl");
        assert_eq!(candidates.as_slice(), ["admin/default.tpl", "default.tpl"]);
    }

    #[test]
    fn tiers_with_missing_params_are_skipped() {
        let ctx = test_context_with_resources(MemoryResources::new());
        ctx.state().set_param("action", "view");
        let ev = Event::new(&ctx, "render");

        let candidates = possible_templates(&ev, ctx.state(), "tpl");
        assert_eq!(candidates.as_slice(), ["view.tpl", "default.tpl"]);
    }

    #[test]
    fn first_existing_candidate_wins() {
        // only shop/default.tpl and default.tpl exist: the area/default tier
        // must win over the bare default
        let resources = MemoryResources::new()
            .with_file("views/text/shop/default.tpl", "shop fallback for {action}")
            .with_file("views/text/default.tpl", "bare default");
        let ctx = test_context_with_resources(resources);
        ctx.register(TemplateViewBehaviour::new("render", PlaceholderEngine));
        ctx.state()
            .view_steps()
            .create_model_step("view-state", Arc::new(serde_json::json!({})));

        ctx.fire(shop_event(&ctx)).unwrap();

        let step = ctx.state().view_steps().last().unwrap();
        assert_eq!(step.name(), "shop/default.tpl");
        assert_eq!(step.content(), Some("shop fallback for view"));
        assert_eq!(step.content_type(), "text/html");
    }

    #[test]
    fn no_step_is_produced_when_the_pipeline_is_empty() {
        let resources = MemoryResources::new().with_file("views/text/default.tpl", "x");
        let ctx = test_context_with_resources(resources);
        ctx.register(TemplateViewBehaviour::new("render", PlaceholderEngine));

        ctx.fire_message("render").unwrap();
        assert!(!ctx.state().view_steps().has_steps());
    }

    #[test]
    fn renders_model_fields_and_params() {
        let resources =
            MemoryResources::new().with_file("views/text/default.tpl", "{greeting} from {area}");
        let ctx = test_context_with_resources(resources);
        ctx.state().set_param("area", "shop");
        ctx.state().view_steps().create_model_step(
            "view-state",
            Arc::new(serde_json::json!({ "greeting": "hello" })),
        );
        ctx.register(TemplateViewBehaviour::new("render", PlaceholderEngine));

        ctx.fire_message("render").unwrap();

        let step = ctx.state().view_steps().last().unwrap();
        assert_eq!(step.content(), Some("hello from shop"));
    }

    /// Wraps the placeholder engine, counting compiles.
    struct CountingEngine {
        compiles: Arc<AtomicUsize>,
    }

    impl TemplateEngine for CountingEngine {
        type Compiled = String;

        fn kind(&self) -> &str {
            "text"
        }

        fn extension(&self) -> &str {
            "tpl"
        }

        fn compile(&self, source: &str) -> anyhow::Result<String> {
            self.compiles.fetch_add(1, Ordering::SeqCst);
            Ok(source.to_string())
        }

        fn render(
            &self,
            compiled: &String,
            _model: &serde_json::Value,
            _params: &BTreeMap<String, String>,
        ) -> anyhow::Result<String> {
            Ok(compiled.clone())
        }
    }

    #[test]
    fn compiled_templates_are_cached_unless_nocache_is_flagged() {
        let resources = MemoryResources::new().with_file("views/text/default.tpl", "cached");
        let ctx = test_context_with_resources(resources);
        let compiles = Arc::new(AtomicUsize::new(0));
        ctx.register(TemplateViewBehaviour::new(
            "render",
            CountingEngine {
                compiles: compiles.clone(),
            },
        ));
        ctx.state()
            .view_steps()
            .create_model_step("view-state", Arc::new(serde_json::json!({})));

        ctx.fire_message("render").unwrap();
        ctx.fire_message("render").unwrap();
        assert_eq!(compiles.load(Ordering::SeqCst), 1);

        // the nocache flag bypasses lookups, forcing a fresh compile
        ctx.state().set_flag("nocache");
        ctx.fire_message("render").unwrap();
        assert_eq!(compiles.load(Ordering::SeqCst), 2);
    }
}
