//! The `serve` subcommand: build the pipeline, start the webhook gateway and
//! run the dispatch loop until interrupted.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use crate::bus::EventQueue;
use crate::channels::OutboundSender;
use crate::channels::whatsapp::CloudApi;
use crate::commands::{CommandContext, CommandRegistry};
use crate::config::load_config;
use crate::directory::UserDirectory;
use crate::extract::TextExtractor;
use crate::providers::gemini::GeminiProvider;
use crate::router::{Router, RouterPolicy};
use crate::store::Store;

pub(super) async fn serve(config_path: Option<&Path>) -> Result<()> {
    info!("Loading configuration...");
    let config = load_config(config_path)?;
    config.validate_serve()?;

    let data_dir = config.data_dir()?;
    crate::utils::ensure_dir(&data_dir)?;
    let db_path = config.db_path()?;
    let store = Arc::new(Store::new(&db_path).context("unable to open store")?);
    info!("store opened at {}", db_path.display());

    let admin = config.admin_digits();
    if admin.is_empty() {
        warn!("bot.adminPhone is not set, admin commands will be unavailable");
    }
    let admin_numbers: Vec<String> = if admin.is_empty() { vec![] } else { vec![admin] };
    let directory = Arc::new(UserDirectory::new(store.clone(), &admin_numbers));

    let api = Arc::new(CloudApi::new(&config.whatsapp, config.limits.max_file_bytes));
    let ai = Arc::new(GeminiProvider::new(&config.gemini, &config.bot.name));
    let extractor = Arc::new(TextExtractor::new(config.limits.max_file_bytes as usize));

    let registry = CommandRegistry::with_builtins();
    info!("registered commands: {}", registry.names().join(", "));

    let context = CommandContext {
        store,
        directory,
        sender: api.clone(),
        bot_name: config.bot.name.clone(),
        command_prefix: config.bot.command_prefix.clone(),
    };
    let policy = RouterPolicy::from_config(&config);
    let router = Arc::new(Router::new(
        context,
        registry,
        ai,
        api.clone(),
        extractor,
        policy,
    ));

    let (queue, mut events) = EventQueue::with_default_capacity();
    let gateway_task = crate::gateway::start(
        &config.gateway.host,
        config.gateway.port,
        queue,
        &config.whatsapp,
    )
    .await?;

    println!("Starting {} gateway...", config.bot.name);
    println!(
        "Webhook listening on {}:{}",
        config.gateway.host, config.gateway.port
    );

    // One task per event so a slow AI call does not hold up the queue.
    let outbound: Arc<dyn OutboundSender> = api;
    let dispatch_task = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let router = router.clone();
            let outbound = outbound.clone();
            tokio::spawn(async move {
                let result = router.dispatch(&event).await;
                if let Some(reply) = router.render_reply(&result)
                    && let Err(e) = outbound.send_text(&event.sender, &reply).await
                {
                    error!("failed to deliver reply to {}: {}", event.sender, e);
                }
            });
        }
    });

    info!("{} v{} is running", config.bot.name, crate::VERSION);

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            println!("\nShutting down...");
        }
        _ = gateway_task => {
            error!("webhook gateway exited unexpectedly");
        }
        _ = dispatch_task => {
            error!("dispatch loop exited unexpectedly");
        }
    }

    Ok(())
}
