use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::{info, warn};

use scan_overlay::client::BackgroundClient;
use scan_overlay::clock::SystemClock;
use scan_overlay::config::{SettingsStore, default_settings_path, load_settings};
use scan_overlay::content::resolver;
use scan_overlay::extract::PatternSet;
use scan_overlay::logging::init_logging;
use scan_overlay::native::{NativeHostClient, ProcessTransport};
use scan_overlay::state::AppState;
use scan_overlay::{native_channel, replay, server};

const DEFAULT_PORT: u16 = 58421;

#[derive(Parser)]
#[command(author, version, about = "Barcode scan overlay background service and tools")]
struct Cli {
    /// Settings file (defaults to ~/.scan-overlay/settings.toml).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Force debug logging regardless of debugMode.
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the background service.
    Serve {
        #[arg(long, default_value_t = DEFAULT_PORT)]
        port: u16,
        /// Also speak native messaging on stdin/stdout.
        #[arg(long)]
        native: bool,
    },
    /// Show which site configuration applies to a URL.
    Resolve {
        #[arg(long)]
        url: String,
    },
    /// Print the session scan history from a running service.
    History {
        #[arg(long, default_value_t = format!("http://127.0.0.1:{DEFAULT_PORT}"))]
        server: String,
    },
    /// Clear the session scan history of a running service.
    ClearHistory {
        #[arg(long, default_value_t = format!("http://127.0.0.1:{DEFAULT_PORT}"))]
        server: String,
    },
    /// Run a page script against an in-memory page and print what happened.
    Replay { script: PathBuf },
    /// Talk to the word-template native host.
    Native {
        /// Host executable.
        #[arg(long)]
        host: PathBuf,
        #[command(subcommand)]
        action: NativeCommand,
    },
}

#[derive(Subcommand)]
enum NativeCommand {
    Ping,
    Templates,
    Config,
    Diagnose,
    /// Extract patterns from a text file and fill a template with them.
    SendPage {
        #[arg(long)]
        template: String,
        #[arg(long)]
        text: PathBuf,
        /// Custom patterns, one `name: /regex/flags` per line.
        #[arg(long)]
        patterns: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings_path = match cli.settings {
        Some(path) => path,
        None => default_settings_path()?,
    };

    match cli.command {
        Command::Serve { port, native } => serve(settings_path, port, native, cli.debug).await,
        Command::Resolve { url } => {
            init_logging(cli.debug);
            let settings = load_settings(&settings_path)?;
            let sites = settings.effective_sites();
            let resolution = resolver::resolve(&url, &sites);
            for skipped in &resolution.skipped {
                warn!(site = %skipped.site_id, pattern = %skipped.pattern, error = %skipped.error, "invalid urlPattern skipped");
            }
            match resolution.matched {
                Some(site) => println!("{}", serde_json::to_string_pretty(site)?),
                None => println!("no site configuration matches {url}"),
            }
            Ok(())
        }
        Command::History { server } => {
            init_logging(cli.debug);
            let client = BackgroundClient::new(server)?;
            let history = client.history().await?;
            if history.is_empty() {
                println!("no scans this session");
            }
            for (i, entry) in history.iter().enumerate() {
                let at = DateTime::from_timestamp_millis(entry.timestamp)
                    .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| entry.timestamp.to_string());
                println!(
                    "#{}: Item {}, Status {}, {} @ {}",
                    i + 1,
                    entry.item_id,
                    entry.status_id,
                    entry.result,
                    at
                );
            }
            Ok(())
        }
        Command::ClearHistory { server } => {
            init_logging(cli.debug);
            BackgroundClient::new(server)?.clear_history().await?;
            println!("ok: history cleared");
            Ok(())
        }
        Command::Replay { script } => {
            init_logging(cli.debug);
            let script = replay::load_script(&script)
                .with_context(|| format!("loading {}", script.display()))?;
            let report = replay::run(script).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Command::Native { host, action } => {
            init_logging(cli.debug);
            run_native(host, action).await
        }
    }
}

async fn serve(settings_path: PathBuf, port: u16, native: bool, debug: bool) -> Result<()> {
    let store = Arc::new(SettingsStore::open(&settings_path)?);
    init_logging(debug || store.current().debug_mode);
    info!(path = %settings_path.display(), "settings loaded");

    // Dropping the watcher stops reloads.
    let _watcher = match store.watch() {
        Ok(watcher) => Some(watcher),
        Err(e) => {
            warn!(error = %e, "settings file not watched");
            None
        }
    };

    let state = Arc::new(AppState::new(store, Arc::new(SystemClock)));
    server::spawn_settings_follower(state.clone());

    let app = server::router(state.clone());
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
        .await
        .with_context(|| format!("binding 127.0.0.1:{port}"))?;
    info!(addr = %listener.local_addr()?, "background service listening");

    if !native {
        axum::serve(listener, app).await?;
        return Ok(());
    }

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            warn!(error = %e, "http server stopped");
        }
    });
    native_channel::serve_native(state, tokio::io::stdin(), tokio::io::stdout()).await?;
    Ok(())
}

async fn run_native(host: PathBuf, action: NativeCommand) -> Result<()> {
    let client = NativeHostClient::new(ProcessTransport::new(host));
    let response: Value = match action {
        NativeCommand::Ping => client.ping().await?,
        NativeCommand::Templates => client.list_templates().await?,
        NativeCommand::Config => client.get_config().await?,
        NativeCommand::Diagnose => serde_json::to_value(client.run_diagnostics().await)?,
        NativeCommand::SendPage {
            template,
            text,
            patterns,
        } => {
            let page_text = std::fs::read_to_string(&text)
                .with_context(|| format!("reading {}", text.display()))?;
            let custom = match patterns {
                Some(path) => Some(
                    std::fs::read_to_string(&path)
                        .with_context(|| format!("reading {}", path.display()))?,
                ),
                None => None,
            };
            let (set, errors) = PatternSet::from_custom_or_default(custom.as_deref());
            for e in &errors {
                warn!(error = %e, "pattern skipped");
            }
            let extracted = set.extract(&page_text);
            info!(fields = extracted.len(), "page data extracted");
            client
                .update_template(&template, serde_json::to_value(extracted)?)
                .await?
        }
    };
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}
