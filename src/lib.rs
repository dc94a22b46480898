pub mod agent_core;
pub mod commands;
pub mod config;
pub mod inference;
pub mod mcp_client;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Context;
use clap::Parser;

use agent_core::{AgentDatabase, ConversationManager, ConversationStore, McpGateway, PlanExecutor};
use commands::AppState;
use config::{GatewayConfig, HumanizerMode};
use inference::{
    HeuristicTitleGenerator, HttpTranscriber, InferenceClient, LlmHumanizer, LlmTitleGenerator,
    OutputHumanizer, PrettyJsonHumanizer, SpeechTranscriber, TitleGenerator,
};
use mcp_client::{HttpTransport, ServerRegistry, Transport};

/// Default `EnvFilter` directives when `RUST_LOG` is unset.
const DEFAULT_LOG_FILTER: &str = "mcp_gateway=info,tower_http=info,warn";

/// Rotated log files kept next to `gateway.log`.
const LOG_FILES_KEPT: u32 = 3;

// ─── CLI ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Parser)]
#[command(name = "mcp-gateway", version)]
#[command(about = "HTTP gateway that proxies clients to MCP servers over JSON-RPC")]
pub struct Args {
    /// Gateway configuration file (JSON or YAML).
    #[arg(long, env = "MCP_GATEWAY_CONFIG", default_value = "config.json")]
    pub config: PathBuf,

    /// Address to listen on.
    #[arg(long, env = "MCP_GATEWAY_ADDR", default_value = "0.0.0.0:4000")]
    pub addr: SocketAddr,

    /// SQLite conversation database. Defaults to the platform data directory.
    #[arg(long, env = "MCP_GATEWAY_DB")]
    pub database: Option<PathBuf>,

    /// Write rotated logs here instead of stderr.
    #[arg(long, env = "MCP_GATEWAY_LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    /// Delete conversations idle for more than this many days at startup.
    #[arg(long, env = "MCP_GATEWAY_RETENTION_DAYS")]
    pub retention_days: Option<u32>,
}

// ─── Paths ──────────────────────────────────────────────────────────────────

/// Platform data directory for the gateway, e.g.
/// `$XDG_DATA_HOME/mcp-gateway/` on Linux. Falls back to `~/.mcp-gateway/`.
pub(crate) fn data_dir() -> PathBuf {
    if let Some(dir) = dirs::data_dir() {
        return dir.join("mcp-gateway");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".mcp-gateway")
}

/// Resolve the conversation database path, creating its directory.
fn resolve_db_path(explicit: Option<&Path>) -> anyhow::Result<PathBuf> {
    let path = match explicit {
        Some(p) => p.to_path_buf(),
        None => data_dir().join("conversations.db"),
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    Ok(path)
}

// ─── Logging ────────────────────────────────────────────────────────────────

/// Install the global tracing subscriber.
///
/// With a log directory, rotates `gateway.log` (keeping the last 3) and
/// writes through a line-flushing writer. Otherwise logs go to stderr.
pub fn init_tracing(log_dir: Option<&Path>) -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = fmt::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false);

    let log_path = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create log dir {}", dir.display()))?;
            let log_path = dir.join("gateway.log");
            rotate_log_file(&log_path, LOG_FILES_KEPT);

            let log_file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&log_path)
                .with_context(|| format!("failed to open {}", log_path.display()))?;

            builder
                .with_writer(FlushingWriter::new(log_file))
                .with_ansi(false)
                .try_init()
                .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))?;
            Some(log_path)
        }
        None => {
            builder
                .with_writer(std::io::stderr)
                .try_init()
                .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))?;
            None
        }
    };

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        log_file = ?log_path,
        pid = std::process::id(),
        "=== MCP gateway starting ==="
    );
    Ok(())
}

/// Rotate `gateway.log` → `gateway.log.1` → … → `.{keep}`, dropping the
/// oldest. Missing files in the chain are skipped.
fn rotate_log_file(base_path: &Path, keep: u32) {
    let oldest = format!("{}.{keep}", base_path.display());
    let _ = std::fs::remove_file(&oldest);

    for i in (1..keep).rev() {
        let from = format!("{}.{i}", base_path.display());
        let to = format!("{}.{}", base_path.display(), i + 1);
        let _ = std::fs::rename(&from, &to);
    }

    if base_path.exists() {
        let to = format!("{}.1", base_path.display());
        let _ = std::fs::rename(base_path, &to);
    }
}

/// File writer that flushes after every write so each log line reaches disk
/// even if the process dies.
#[derive(Clone)]
struct FlushingWriter {
    file: Arc<Mutex<std::fs::File>>,
}

impl FlushingWriter {
    fn new(file: std::fs::File) -> Self {
        Self {
            file: Arc::new(Mutex::new(file)),
        }
    }
}

impl std::io::Write for FlushingWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut f = self
            .file
            .lock()
            .map_err(|e| std::io::Error::other(format!("lock poisoned: {e}")))?;
        let n = std::io::Write::write(&mut *f, buf)?;
        std::io::Write::flush(&mut *f)?;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        let mut f = self
            .file
            .lock()
            .map_err(|e| std::io::Error::other(format!("lock poisoned: {e}")))?;
        std::io::Write::flush(&mut *f)
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for FlushingWriter {
    type Writer = FlushingWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

// ─── Collaborators ──────────────────────────────────────────────────────────

/// Humanizer for the configured mode. `llm` without a usable endpoint
/// degrades to pretty JSON.
pub fn build_humanizer(config: &GatewayConfig) -> Option<Arc<dyn OutputHumanizer>> {
    match config.humanizer.mode {
        HumanizerMode::None => None,
        HumanizerMode::Pretty => Some(Arc::new(PrettyJsonHumanizer)),
        HumanizerMode::Llm => {
            let client = config
                .humanizer
                .llm
                .as_ref()
                .map(InferenceClient::from_config);
            match client {
                Some(Ok(client)) => Some(Arc::new(LlmHumanizer::new(client))),
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "humanizer model unavailable, using pretty JSON");
                    Some(Arc::new(PrettyJsonHumanizer))
                }
                None => {
                    tracing::warn!("humanizer mode is llm but no endpoint is configured, using pretty JSON");
                    Some(Arc::new(PrettyJsonHumanizer))
                }
            }
        }
    }
}

/// LLM title generator when `titles` is configured, heuristic otherwise.
pub fn build_title_generator(config: &GatewayConfig) -> Arc<dyn TitleGenerator> {
    match config.titles.as_ref().map(InferenceClient::from_config) {
        Some(Ok(client)) => Arc::new(LlmTitleGenerator::new(client)),
        Some(Err(e)) => {
            tracing::warn!(error = %e, "title model unavailable, using heuristic titles");
            Arc::new(HeuristicTitleGenerator)
        }
        None => Arc::new(HeuristicTitleGenerator),
    }
}

pub fn build_transcriber(config: &GatewayConfig) -> Option<Arc<dyn SpeechTranscriber>> {
    let settings = config.transcription.as_ref()?;
    match HttpTranscriber::from_config(settings) {
        Ok(transcriber) => Some(Arc::new(transcriber)),
        Err(e) => {
            tracing::warn!(error = %e, "speech transcription disabled");
            None
        }
    }
}

/// Assemble handler state around a transport and a conversation store.
pub fn build_state(
    config: &GatewayConfig,
    transport: Arc<dyn Transport>,
    store: impl ConversationStore + 'static,
) -> AppState {
    let registry = ServerRegistry::from_config(&config.mcp_servers);
    let gateway = Arc::new(McpGateway::new(registry, transport, build_humanizer(config)));
    let executor = Arc::new(PlanExecutor::new(
        Arc::clone(&gateway),
        config.plan_step_delay(),
    ));
    let conversations: Arc<Mutex<dyn ConversationStore>> = Arc::new(Mutex::new(store));

    AppState {
        gateway,
        executor,
        conversations,
        titles: build_title_generator(config),
        transcriber: build_transcriber(config),
    }
}

// ─── Server ─────────────────────────────────────────────────────────────────

/// Run the gateway until Ctrl-C.
pub async fn run(args: Args) -> anyhow::Result<()> {
    init_tracing(args.log_dir.as_deref())?;

    let config = config::load_or_default(&args.config);

    let db_path = resolve_db_path(args.database.as_deref())?;
    let db = AgentDatabase::open(&db_path.to_string_lossy())
        .with_context(|| format!("failed to open {}", db_path.display()))?;
    let mut conversations = ConversationManager::new(db);
    tracing::info!(db_path = %db_path.display(), "conversation database ready");

    if let Some(days) = args.retention_days {
        conversations
            .cleanup_older_than(days)
            .context("conversation cleanup failed")?;
    }

    let transport = HttpTransport::new().context("failed to build upstream HTTP client")?;
    let state = build_state(&config, Arc::new(transport), conversations);

    let listener = tokio::net::TcpListener::bind(args.addr)
        .await
        .with_context(|| format!("failed to bind {}", args.addr))?;
    tracing::info!(
        addr = %args.addr,
        servers = ?state.gateway.registry().names().collect::<Vec<_>>(),
        "MCP gateway listening"
    );

    axum::serve(listener, commands::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("MCP gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
