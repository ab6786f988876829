use anyhow::Result;
use dotenvy::dotenv;
use std::sync::Arc;

use cdmix::cli::{Cli, Commands};
use cdmix::core::logging::log_startup_summary;
use cdmix::core::tools::{locate_tools, Tools};
use cdmix::core::validation::canonicalize_url;
use cdmix::core::{config, init_logger};
use cdmix::download::probe::{ProbeMode, Prober, YtDlpMetadataSource};
use cdmix::web::{serve, AppState, ServerSettings};

/// Entry point: parses the CLI and dispatches to the chosen subcommand.
///
/// # Errors
/// Returns an error if logging, tool discovery or the server fails to start.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();

    std::panic::set_hook(Box::new(|panic_info| {
        log::error!("Panic caught: {:?}", panic_info);
        if let Some(location) = panic_info.location() {
            log::error!("Panic at {}:{}:{}", location.file(), location.line(), location.column());
        }
    }));

    // .env must be loaded before any config static is touched
    let _ = dotenv();
    init_logger(&config::LOG_FILE_PATH)?;

    match cli.command.unwrap_or(Commands::Serve { port: None }) {
        Commands::Serve { port } => run_server(port.unwrap_or(*config::PORT)).await,
        Commands::Probe { url, fast, json } => run_probe(&url, fast, json).await,
        Commands::CheckTools => {
            let tools = locate_tools().await?;
            log_startup_summary(&tools);
            Ok(())
        }
    }
}

async fn run_server(port: u16) -> Result<()> {
    let tools = locate_tools().await?;
    log_startup_summary(&tools);

    let settings = ServerSettings::from_env();
    tokio::fs::create_dir_all(&settings.sessions.data_dir).await?;

    let state = AppState::from_tools(settings, &tools);
    let maintenance = state.spawn_maintenance();

    let result = serve(state, &config::HOST, port).await;
    maintenance.abort();
    result
}

async fn run_probe(raw_url: &str, fast: bool, json: bool) -> Result<()> {
    let tools: Tools = locate_tools().await?;
    let canonical = canonicalize_url(raw_url)?;
    let source = Arc::new(YtDlpMetadataSource::new(
        tools.ytdlp.command.clone(),
        config::YTDL_COOKIES_FILE.clone(),
    ));
    let prober = Prober::new(source, config::YTDL_PLAYER_CLIENT.clone());

    let result = match prober.probe(&canonical.url, ProbeMode::from_fast_flag(fast)).await {
        Ok(result) => result,
        Err(e) => {
            let kind = e.kind();
            println!("❌ {}", kind.message());
            println!("hint: {}", kind.operator_hint());
            return Err(e.into());
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!("Title:    {}", result.title);
    if let Some(duration) = result.duration {
        println!("Duration: {:.0}s", duration);
    }
    println!("Client:   {}", result.used_client);
    println!("Formats:  {} audio-only of {}", result.audio_formats.len(), result.total_formats);
    match &result.best_format {
        Some(best) => println!(
            "Best:     {} ({}, {} kbps)",
            best.format_id,
            best.acodec.as_deref().unwrap_or("?"),
            best.abr.map(|a| format!("{:.0}", a)).unwrap_or_else(|| "?".to_string())
        ),
        None => println!("Best:     none reaches CD quality"),
    }
    Ok(())
}
