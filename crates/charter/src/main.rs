//! Charter - headless live chart engine.
//!
//! Loads history for one instrument and timeframe, follows the live stream
//! and logs every series change. Reads commands from stdin.

mod cli;
mod log_sink;

use std::sync::Arc;

use anyhow::{Context, Result};
use chart_api::{ChartClient, RetryConfig, WsConfig};
use charter_config::Config;
use charter_data::{ApiSource, ConnectionSupervisor, HistoryLoader};
use charter_sync::{ChartSession, SessionHandle};
use tokio::io::{AsyncBufReadExt, BufReader};

use cli::{Args, Command, USAGE};
use log_sink::LogSink;

fn api_client(config: &Config) -> Result<ChartClient> {
    let retry = RetryConfig {
        max_retries: config.api.max_retries,
        initial_backoff: config.api.retry_backoff(),
        ..RetryConfig::default()
    };
    let api = chart_api::Config::default()
        .with_base_url(&config.api.base_url)
        .with_timeout(config.api.request_timeout())
        .with_retry(retry);

    ChartClient::new(api).with_context(|| format!("Invalid API URL {}", config.api.base_url))
}

fn ws_config(config: &Config) -> WsConfig {
    let stream = &config.stream;
    WsConfig::default()
        .with_url(&config.api.ws_url)
        .with_ping_interval(stream.ping_interval())
        .with_reconnect_backoff(
            stream.reconnect_delay(),
            stream.backoff_multiplier,
            stream.max_reconnect_delay(),
        )
        .with_max_reconnect_attempts(stream.max_reconnect_attempts)
        .with_buffer_size(stream.channel_buffer_size)
}

async fn handle_command(handle: &SessionHandle, command: Command, config: &Config) -> Result<bool> {
    match command {
        Command::Select { symbol, timeframe } => {
            if !config.general.symbols.contains(&symbol) {
                log::warn!("{} is not in the configured symbol list", symbol);
            }
            if let Err(e) = handle.select_key(&symbol, &timeframe).await {
                log::warn!("Cannot select {} {}: {}", symbol, timeframe, e);
            }
        }
        Command::Scroll(index) => handle.viewport_changed(index).await?,
        Command::Resync => handle.resync().await?,
        Command::Quit => return Ok(false),
    }
    Ok(true)
}

async fn drive(args: Args, config: Config) -> Result<()> {
    let client = api_client(&config)?;
    log::info!(
        "Using API {} and stream {}",
        client.config().base_url,
        config.api.ws_url
    );

    let loader = HistoryLoader::new(Arc::new(ApiSource::new(client)))
        .with_page_size(config.history.page_size)
        .with_backfill_threshold(config.history.backfill_threshold);
    let supervisor = Arc::new(ConnectionSupervisor::websocket(ws_config(&config)));

    let (session, handle) =
        ChartSession::new(Arc::clone(&supervisor), Arc::new(loader), LogSink::default());
    let session_task = tokio::spawn(session.run());

    let symbol = args
        .symbol
        .unwrap_or_else(|| config.general.default_symbol.clone());
    let timeframe = args
        .timeframe
        .unwrap_or_else(|| config.general.default_timeframe.clone());
    handle
        .select_key(&symbol, &timeframe)
        .await
        .with_context(|| format!("Cannot select {symbol} {timeframe}"))?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                log::info!("Interrupted");
                break;
            }
            line = lines.next_line(), if stdin_open => {
                match line.context("Failed to read stdin")? {
                    Some(line) => match Command::parse(&line) {
                        Ok(Some(command)) => {
                            if !handle_command(&handle, command, &config).await? {
                                break;
                            }
                        }
                        Ok(None) => {}
                        Err(e) => log::warn!("{e}"),
                    },
                    None => {
                        log::debug!("stdin closed, running until interrupted");
                        stdin_open = false;
                    }
                }
            }
        }
    }

    handle.shutdown().await.ok();
    let sink = session_task.await.context("Chart session panicked")?;
    supervisor.shutdown().await;
    log::info!("Stopped after {} series updates", sink.updates());

    Ok(())
}

fn run() -> Result<()> {
    env_logger::init();

    let args = Args::parse(std::env::args().skip(1)).context(USAGE)?;
    if args.help {
        println!("{USAGE}");
        return Ok(());
    }

    let config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::load_default(),
    }
    .with_env_overrides();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")?;

    runtime.block_on(drive(args, config))
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
