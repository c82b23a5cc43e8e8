//! LinkUp - group hangout planner
//!
//! CLI entry point.

use std::fs;

use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use linkup::cli::{Cli, Command, OutputFormat, get_log_path};
use linkup::config::Config;
use linkup::llm::BackboardClient;
use linkup::prompts::PromptLoader;
use linkup::state::{Session, SessionEvent, load_sessions};
use linkup::tools::{ToolExecutor, ToolProfile};
use linkup::transport::ChatDbTransport;
use linkup::{Engine, Poller};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    let log_path = get_log_path();
    if let Some(log_dir) = log_path.parent() {
        fs::create_dir_all(log_dir).context("Failed to create log directory")?;
    }

    // Priority: CLI --log-level > config file > INFO
    let level = match cli_log_level.or(config_log_level).map(|s| s.to_uppercase()) {
        Some(s) => match s.as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .context("Failed to open log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_log_level = Config::load_log_level(cli.config.as_ref());
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    info!("LinkUp loaded config: {} groups", config.groups.len());

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Run => cmd_run(&config).await,
        Command::Once => cmd_once(&config).await,
        Command::Status { format } => cmd_status(&config, format),
        Command::Chats { limit } => cmd_chats(&config, limit).await,
        Command::Agents => cmd_agents(&config).await,
    }
}

async fn cmd_run(config: &Config) -> Result<()> {
    debug!("cmd_run: called");
    config.validate()?;
    let engine = Engine::bootstrap(config)?;

    let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
    let poller = Poller::new(engine.clone(), config.polling.interval());
    let poller_handle = tokio::spawn(poller.run(shutdown_rx));

    println!(
        "{} watching {} group(s). Press Ctrl+C to stop.",
        "LinkUp".bold(),
        config.groups.len()
    );
    wait_for_shutdown().await?;
    let _ = shutdown_tx.send(()).await;

    match poller_handle.await {
        Ok(result) => result?,
        Err(e) => warn!(error = %e, "Poller task failed"),
    }
    engine.state().shutdown().await?;
    info!("LinkUp stopped");
    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            _ = sigint.recv() => warn!("SIGINT received"),
            _ = sigterm.recv() => warn!("SIGTERM received"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        warn!("Ctrl+C received");
    }

    Ok(())
}

async fn cmd_once(config: &Config) -> Result<()> {
    debug!("cmd_once: called");
    config.validate()?;
    let engine = Engine::bootstrap(config)?;
    engine.poll_cycle().await;
    engine.state().shutdown().await?;
    println!("Poll cycle complete");
    Ok(())
}

fn cmd_status(config: &Config, format: OutputFormat) -> Result<()> {
    debug!(?format, "cmd_status: called");
    let sessions = load_sessions(&config.state.path)
        .with_context(|| format!("Failed to read {}", config.state.path.display()))?;

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&sessions)?);
        return Ok(());
    }

    if sessions.is_empty() {
        println!("No sessions yet ({})", config.state.path.display());
        return Ok(());
    }

    for (group_id, session) in &sessions {
        let name = config.group(group_id).map(|g| g.name.as_str()).unwrap_or("(not configured)");
        println!("{} {}", name.bold(), group_id.dimmed());
        print_session(session);
        println!();
    }
    Ok(())
}

fn print_session(session: &Session) {
    let state = match &session.event {
        SessionEvent::Idle => "idle".green(),
        SessionEvent::Collecting { agents } => {
            let done = agents.values().filter(|a| a.is_done()).count();
            format!("collecting ({}/{} answered)", done, agents.len()).yellow()
        }
        SessionEvent::Ready { message_count, .. } => format!("ready ({} sent)", message_count).cyan(),
    };
    println!("  State:          {}", state);

    if let Some(agents) = session.event.agents() {
        for agent in agents.values() {
            let status = if agent.is_done() { "done".green() } else { "chatting".yellow() };
            println!("    {:<12} {}", agent.display_name, status);
        }
    }

    let fmt = |t: Option<chrono::DateTime<chrono::Utc>>| {
        t.map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
            .unwrap_or_else(|| "never".to_string())
    };
    match session.last_hangout() {
        Some(h) => println!(
            "  Last hangout:   {} ({})",
            h.description,
            h.timestamp.format("%Y-%m-%d")
        ),
        None => println!("  Last hangout:   none"),
    }
    println!("  Hangouts:       {}", session.hangouts.len());
    println!("  Plan delivered: {}", fmt(session.plan_delivered_at));
    println!("  Last nudge:     {}", fmt(session.last_nudge_at));
    println!(
        "  Group cursor:   {}",
        session
            .bookmarks
            .last_cursor
            .map(|c| c.to_string())
            .unwrap_or_else(|| "-".to_string())
    );
}

async fn cmd_chats(config: &Config, limit: usize) -> Result<()> {
    debug!(limit, "cmd_chats: called");
    let transport = ChatDbTransport::from_config(&config.transport);
    let chats = transport
        .list_chats()
        .await
        .with_context(|| format!("Failed to read {}", config.transport.chat_db.display()))?;

    for chat in chats.into_iter().take(limit) {
        let configured = if config.group(&chat.chat_id).is_some() {
            " (configured)".green().to_string()
        } else {
            String::new()
        };
        println!(
            "{:<40} {:<30} {} members{}",
            chat.chat_id, chat.display_name, chat.member_count, configured
        );
    }
    Ok(())
}

async fn cmd_agents(config: &Config) -> Result<()> {
    debug!("cmd_agents: called");
    let client = BackboardClient::from_config(&config.agents)?;
    let prompts = PromptLoader::new(config.prompts_dir.as_deref());

    let group_tools = ToolExecutor::with_profile(ToolProfile::Group).definitions();
    let group_id = client
        .sync_assistant("linkup-group", &prompts.group_system()?, &group_tools)
        .await
        .context("Failed to sync group assistant")?;

    let direct_tools = ToolExecutor::with_profile(ToolProfile::Direct).definitions();
    let direct_id = client
        .sync_assistant("linkup-direct", &prompts.direct_system()?, &direct_tools)
        .await
        .context("Failed to sync private chat assistant")?;

    println!("{} {}", "group-assistant-id:".bold(), group_id);
    println!("{} {}", "direct-assistant-id:".bold(), direct_id);
    println!("Add these under `agents:` in your config.");
    Ok(())
}
