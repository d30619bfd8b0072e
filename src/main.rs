//! the foghorn binary: load settings, parse the template, run the relay

use std::sync::Arc;

use anyhow::{Context, Result};
use foghorn::{
    log,
    metrics::Metrics,
    relay::Relay,
    renderer::Renderer,
    server::{self, AppState},
    settings::{version_string, Settings},
};

/// exit the complete program if one thread panics
fn setup_panic_handler() {
    let default_panic = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        default_panic(info);
        std::process::exit(1);
    }));
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_panic_handler();

    let settings = Settings::global();

    log::setup_logging().context("could not setup logging")?;

    // a template that does not parse must keep the process from starting
    let renderer = Renderer::from_file(&settings.template_path)
        .with_context(|| format!("could not load post template {:?}", settings.template_path))?;

    let relay = Relay::new(renderer, settings).context("could not construct relay client")?;
    let metrics = Metrics::new().context("could not register metrics")?;

    let state = Arc::new(AppState { relay, metrics });

    tracing::info!("{}", version_string());
    tracing::info!("listening on {}", settings.listen_address);

    server::run(state, settings.listen_address).await
}
