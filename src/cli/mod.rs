//! Command line interface: `init`, `serve` and `status`.

mod serve;

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::config::{Config, get_config_path, load_config, save_config};
use crate::store::Store;

#[derive(Parser)]
#[command(name = "warbler")]
#[command(about = "WhatsApp AI assistant", version)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Path to the config file (default: ~/.warbler/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config file and create the data directory
    Init,
    /// Run the webhook gateway and the dispatch loop
    Serve,
    /// Show configuration and store summary
    Status,
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Init => init(cli.config.as_deref()),
        Commands::Serve => serve::serve(cli.config.as_deref()).await,
        Commands::Status => status(cli.config.as_deref()),
    }
}

fn resolve_config_path(config_path: Option<&Path>) -> Result<PathBuf> {
    match config_path {
        Some(p) => Ok(p.to_path_buf()),
        None => get_config_path(),
    }
}

fn init(config_path: Option<&Path>) -> Result<()> {
    println!("{} Initializing warbler...", crate::LOGO);

    let path = resolve_config_path(config_path)?;
    if path.exists() {
        println!("\u{26a0}\u{fe0f}  Config already exists at {}", path.display());
        println!("Overwrite? (y/N): ");
        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;
        if !input.trim().eq_ignore_ascii_case("y") {
            return Ok(());
        }
    }

    let config = Config::default();
    save_config(&config, Some(&path))?;
    println!("\u{2713} Created config at {}", path.display());

    let data_dir = config.data_dir()?;
    crate::utils::ensure_dir(&data_dir)?;
    println!("\u{2713} Created data directory at {}", data_dir.display());

    println!("\n{} warbler is ready!", crate::LOGO);
    println!("\nNext steps:");
    println!(
        "  1. Add your Gemini API key and WhatsApp credentials to {}",
        path.display()
    );
    println!(
        "  2. Point the Meta webhook at http://<your-host>:{}/webhook",
        config.gateway.port
    );
    println!("  3. Run: warbler serve");

    Ok(())
}

fn status(config_path: Option<&Path>) -> Result<()> {
    let path = resolve_config_path(config_path)?;
    let config = load_config(config_path)?;

    println!("{} Warbler Status\n", crate::LOGO);

    println!(
        "Config: {} {}",
        path.display(),
        if path.exists() {
            "\u{2713}"
        } else {
            "\u{2717} (run: warbler init)"
        }
    );

    let data_dir = config.data_dir()?;
    println!(
        "Data dir: {} {}",
        data_dir.display(),
        if data_dir.exists() {
            "\u{2713}"
        } else {
            "\u{2717}"
        }
    );

    println!(
        "Gemini API: {}",
        if config.gemini.api_key.is_empty() {
            "not set"
        } else {
            "\u{2713}"
        }
    );
    println!(
        "WhatsApp credentials: {}",
        if config.whatsapp.access_token.is_empty() || config.whatsapp.phone_number_id.is_empty() {
            "not set"
        } else {
            "\u{2713}"
        }
    );
    println!(
        "Webhook signature: {}",
        if config.whatsapp.app_secret.trim().is_empty() {
            "disabled"
        } else {
            "enabled"
        }
    );
    let admin = config.admin_digits();
    println!(
        "Admin: {}",
        if admin.is_empty() {
            "not set"
        } else {
            admin.as_str()
        }
    );
    println!("Command prefix: {}", config.bot.command_prefix);
    println!(
        "Rate limit: {} messages / {}s",
        config.limits.rate_per_window, config.limits.window_secs
    );

    let db_path = config.db_path()?;
    if db_path.exists() {
        let store = Store::new(&db_path)?;
        let stats = store.stats()?;
        println!("\nStore ({}):", db_path.display());
        println!(
            "  Users: {} ({} admins, {} banned)",
            stats.total_users, stats.admin_users, stats.banned_users
        );
        println!(
            "  Messages: {} ({} today, {} commands)",
            stats.total_messages, stats.messages_today, stats.commands_used
        );
        println!("  AI requests: {}", stats.ai_requests);
        println!("  Files processed: {}", stats.files_processed);
    } else {
        println!("\nStore: not created yet (run: warbler serve)");
    }

    Ok(())
}
