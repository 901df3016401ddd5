//! AlertRelay CLI
//!
//! Command-line interface for the AlertRelay notification dispatcher.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use alertrelay::alerting::{
    DispatchGateway, Dispatcher, HttpWebhookSender, Notifier, NotifierDeps, Outcome,
    TemplateRenderer,
};
use alertrelay::config::LogFormat;
use alertrelay::models::{AlertGroup, ChannelKind};
use alertrelay::Config;
use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// AlertRelay - Alert notifications for chat, paging and webhook channels
#[derive(Parser)]
#[command(name = "alertrelay")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, env = "ALERTRELAY_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format (for commands that support it)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, Default, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Build every configured channel and report rejected ones
    Validate,

    /// List supported channel types
    Channels,

    /// Send an alert group to the configured channels
    Send {
        /// JSON file holding the alert group
        #[arg(long)]
        alerts: PathBuf,

        /// Only notify the channel with this UID
        #[arg(long)]
        channel: Option<String>,
    },

    /// Render a template against an alert group
    Render {
        /// JSON file holding the alert group
        #[arg(long)]
        alerts: PathBuf,

        /// Template name
        #[arg(long, default_value = "default.message")]
        template: String,

        /// Receiver name exposed to the template
        #[arg(long, default_value = "alertrelay")]
        receiver: String,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    // Parse CLI arguments
    let cli = Cli::parse();

    if let Commands::Completions { shell } = cli.command {
        generate_completions(shell);
        return ExitCode::SUCCESS;
    }

    // Load configuration
    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    init_logging(&config, cli.verbose);

    // Execute command
    let result = match cli.command {
        Commands::Validate => run_validate(&config, cli.format),
        Commands::Channels => run_channels(cli.format),
        Commands::Send { alerts, channel } => {
            run_send(&config, &alerts, channel.as_deref(), cli.format).await
        }
        Commands::Render {
            alerts,
            template,
            receiver,
        } => run_render(&config, &alerts, &template, &receiver),
        Commands::Completions { .. } => Ok(true),
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(config: &Config, verbose: bool) {
    let log_level = if verbose {
        "debug"
    } else {
        config.logging.level.as_str()
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match config.logging.format {
        LogFormat::Pretty => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn renderer(config: &Config) -> anyhow::Result<TemplateRenderer> {
    let mut renderer = TemplateRenderer::new(&config.templates.external_url)?;
    for path in &config.templates.files {
        renderer
            .register_template_file(path)
            .with_context(|| format!("loading template {}", path.display()))?;
    }
    Ok(renderer)
}

fn deps(config: &Config) -> anyhow::Result<NotifierDeps> {
    let sender = HttpWebhookSender::new(&config.dispatch)?;
    Ok(NotifierDeps {
        renderer: Arc::new(renderer(config)?),
        gateway: DispatchGateway::new(Arc::new(sender)),
    })
}

fn read_group(path: &Path) -> anyhow::Result<AlertGroup> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading alert group {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing alert group {}", path.display()))
}

fn run_validate(config: &Config, format: OutputFormat) -> anyhow::Result<bool> {
    let channels = config.load_channels()?;
    let (dispatcher, rejections) = Dispatcher::from_configs(&channels, &deps(config)?);

    match format {
        OutputFormat::Json => {
            let report: Vec<_> = rejections
                .iter()
                .map(|r| {
                    serde_json::json!({
                        "channel_uid": r.channel_uid,
                        "channel_name": r.channel_name,
                        "reason": r.error.reason,
                    })
                })
                .collect();
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "valid": dispatcher.len(),
                    "rejected": report,
                }))?
            );
        }
        OutputFormat::Text => {
            for notifier in dispatcher.notifiers() {
                let base = notifier.base();
                println!("ok       {:<12} {} ({})", base.kind.as_str(), base.name, base.uid);
            }
            for rejection in &rejections {
                println!(
                    "rejected {} ({}): {}",
                    rejection.channel_name, rejection.channel_uid, rejection.error
                );
            }
        }
    }

    Ok(rejections.is_empty())
}

fn run_channels(format: OutputFormat) -> anyhow::Result<bool> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&ChannelKind::ALL)?);
        }
        OutputFormat::Text => {
            for kind in ChannelKind::ALL {
                println!("{kind}");
            }
        }
    }
    Ok(true)
}

async fn run_send(
    config: &Config,
    alerts: &Path,
    channel: Option<&str>,
    format: OutputFormat,
) -> anyhow::Result<bool> {
    let group = read_group(alerts)?;
    let channels = config.load_channels()?;
    let (mut dispatcher, rejections) = Dispatcher::from_configs(&channels, &deps(config)?);
    if let Some(uid) = channel {
        dispatcher.retain_uid(uid);
        if dispatcher.is_empty() {
            anyhow::bail!("no valid channel with UID {uid:?}");
        }
    }
    if !rejections.is_empty() {
        warn!(rejected = rejections.len(), "Some channels were rejected and will not be notified");
    }

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, cancelling in-flight notifications");
            ctrl_c.cancel();
        }
    });

    let results = dispatcher.dispatch_all(&cancel, &group).await;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&results)?),
        OutputFormat::Text => {
            for result in &results {
                let status = match &result.outcome {
                    Outcome::Delivered => "delivered".to_string(),
                    Outcome::Suppressed => "suppressed".to_string(),
                    Outcome::Failed(reason) => format!("failed: {reason}"),
                };
                println!("{:<12} {:<24} {status}", result.channel_type.as_str(), result.channel_uid);
            }
        }
    }

    Ok(results
        .iter()
        .all(|r| !matches!(r.outcome, Outcome::Failed(_))))
}

fn run_render(
    config: &Config,
    alerts: &Path,
    template: &str,
    receiver: &str,
) -> anyhow::Result<bool> {
    let group = read_group(alerts)?;
    let renderer = renderer(config)?;
    if !renderer.has_template(template) {
        anyhow::bail!("unknown template {template:?}");
    }

    let data = renderer.data(receiver, &group);
    let mut session = renderer.session(&data);
    let out = session.named(template);
    session.finish()?;

    print!("{out}");
    Ok(true)
}

fn generate_completions(shell: clap_complete::Shell) {
    use clap::CommandFactory;
    use clap_complete::generate;
    use std::io;

    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "alertrelay", &mut io::stdout());
}
