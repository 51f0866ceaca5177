//! # Request Pipeline Demo
//!
//! Wires a context end to end: process behaviours populate shared state,
//! the view-state behaviour projects it into a model, and the template view
//! behaviour renders it via the area/concern/action fallback search.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use conduct_core::{
    Behaviour, Context, Configuration, ConfigurationElement, ControlState, Event, FileResources,
    ProcessState, Prototype, Prototyped,
};
use conduct_view::{PlaceholderEngine, TemplateViewBehaviour, ViewStateBehaviour};

// ============================================================================
// Process behaviours
// ============================================================================

/// Loads the "cart" for the request into shared state.
struct LoadCart;

impl Behaviour<ControlState> for LoadCart {
    fn responds_to(&self) -> &str {
        "process-request"
    }

    fn action(&self, _ev: &Event, ctx: &Context<ControlState>) -> Result<()> {
        ctx.state().timers().begin("load-cart");
        ctx.state().set_entry(
            "cart",
            Arc::new(serde_json::json!({ "items": 3, "total": "17.25" })),
        );
        ctx.state().record_message("cart loaded");
        ctx.state().timers().end("load-cart");
        // hand off to the render phase, narrowing the ambient params
        ctx.fire_with("render-request", &["area", "concern", "action"])?;
        Ok(())
    }
}

/// Greets returning customers; only matches when the prototype criteria
/// recognize one.
struct GreetReturning;

impl Behaviour<ControlState> for GreetReturning {
    fn responds_to(&self) -> &str {
        "process-request"
    }

    fn action(&self, _ev: &Event, ctx: &Context<ControlState>) -> Result<()> {
        ctx.state().record_message("welcome back");
        Ok(())
    }
}

// ============================================================================
// Main
// ============================================================================

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let resources = FileResources::new(Path::new(env!("CARGO_MANIFEST_DIR")).join("resources"));
    let ctx = Context::builder(ControlState::new())
        .resources(resources)
        .build();

    // the params of this unit of work
    ctx.state().set_param("area", "shop");
    ctx.state().set_param("concern", "cart");
    ctx.state().set_param("action", "view");
    ctx.state().set_param("customer", "returning");

    // behaviours, consulted in registration order
    ctx.register(Prototyped::new(
        GreetReturning,
        Prototype::compile(Configuration::new(vec![ConfigurationElement::new(
            1,
            "context",
            "match",
            "customer",
            "returning",
        )])),
    ));
    ctx.register(LoadCart);
    ctx.register(ViewStateBehaviour::new("render-request"));
    ctx.register(TemplateViewBehaviour::new("render-request", PlaceholderEngine));

    ctx.fire_message("process-request")?;
    ctx.completed();
    tracing::info!(
        messages = ?ctx.state().messages(),
        steps = ctx.state().view_steps().len(),
        "pipeline finished"
    );

    match ctx.state().view_steps().last() {
        Some(step) => {
            println!("rendered by {} ({}):", step.name(), step.content_type());
            println!("{}", step.content().unwrap_or("(no content)"));
        }
        None => println!("nothing rendered"),
    }

    for error in ctx.state().errors() {
        eprintln!("error: {error}");
    }

    Ok(())
}
