//! `hrsync`: load, watch, and mutate HR entity collections from a terminal.
//!
//! `watch` keeps a live list open: it loads the collection over REST, then
//! applies every delta other sessions broadcast and reprints the current
//! page. `create`/`update`/`delete` go through REST first and then announce
//! the change on the notification channel, exactly like a dashboard session.

#[cfg(test)]
#[path = "main_test.rs"]
mod main_test;

use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use livesync::{
    ApiError, Applicant, Broadcaster, ConfigError, ConnectionManager, ConnectionState, ConnectionStatus, Contract,
    DeltaFeed, Department, Employee, Entity, EntityApi, EntityKind, Job, LiveList, RestClient, SearchContext,
    SortDirection, SortSpec, SyncConfig, ViewPage, ViewState,
};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// How long a mutation waits for the relay to acknowledge its broadcast.
const ACK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("{}", .0.message())]
    Api(#[from] ApiError),
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("--data must be a JSON object")]
    DataNotObject,
    #[error("failed to listen for ctrl-c: {0}")]
    Signal(#[from] std::io::Error),
}

#[derive(Parser, Debug)]
#[command(name = "hrsync", about = "Live HR entity lists over REST and the notification relay")]
struct Cli {
    /// REST base URL, e.g. http://127.0.0.1:4000/api
    #[arg(long, env = "HRSYNC_API_URL", global = true)]
    api_url: Option<String>,

    /// Notification relay WebSocket URL, e.g. ws://127.0.0.1:4000/socket
    #[arg(long, env = "HRSYNC_SOCKET_URL", global = true)]
    socket_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print one page of a collection.
    List {
        kind: EntityKind,
        #[command(flatten)]
        view: ViewArgs,
        #[arg(long, default_value_t = 1)]
        page: usize,
    },
    /// Keep a collection open and reprint it on every change.
    Watch {
        kind: EntityKind,
        #[command(flatten)]
        view: ViewArgs,
    },
    /// Create an entity and broadcast `<kind>Created`.
    Create {
        kind: EntityKind,
        #[arg(long)]
        data: String,
    },
    /// Update an entity and broadcast `<kind>Updated`.
    Update {
        kind: EntityKind,
        id: String,
        #[arg(long)]
        data: String,
    },
    /// Delete an entity and broadcast `<kind>Deleted`.
    Delete { kind: EntityKind, id: String },
}

#[derive(Args, Debug, Clone)]
struct ViewArgs {
    /// Case-insensitive substring filter.
    #[arg(long, default_value = "")]
    search: String,
    /// Field to sort by, e.g. salary, title, startDate.
    #[arg(long)]
    sort: Option<String>,
    /// Sort descending.
    #[arg(long)]
    desc: bool,
    #[arg(long, default_value_t = livesync::state::view::DEFAULT_PAGE_SIZE)]
    page_size: usize,
}

impl ViewArgs {
    fn view_state(&self, page: usize) -> ViewState {
        let direction = if self.desc { SortDirection::Descending } else { SortDirection::Ascending };
        ViewState {
            search: self.search.clone(),
            sort: self.sort.clone().map(|key| SortSpec::new(key, direction)),
            page: page.max(1),
            page_size: self.page_size.max(1),
        }
    }
}

/// Run `$body` with `$E` bound to the entity type for `$kind`.
macro_rules! for_kind {
    ($kind:expr, $E:ident => $body:expr) => {
        match $kind {
            EntityKind::Contract => {
                type $E = Contract;
                $body
            }
            EntityKind::Job => {
                type $E = Job;
                $body
            }
            EntityKind::Applicant => {
                type $E = Applicant;
                $body
            }
            EntityKind::Employee => {
                type $E = Employee;
                $body
            }
            EntityKind::Department => {
                type $E = Department;
                $body
            }
        }
    };
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = build_config(SyncConfig::from_env()?, &cli)?;
    let api = RestClient::from_config(&config)?;

    match cli.command {
        Command::List { kind, view, page } => {
            for_kind!(kind, E => run_list::<E>(&api, view.view_state(page)).await)
        }
        Command::Watch { kind, view } => {
            for_kind!(kind, E => run_watch::<E>(&api, &config, view.view_state(1)).await)
        }
        Command::Create { kind, data } => {
            let data = parse_data(&data)?;
            for_kind!(kind, E => run_create::<E>(&api, &config, &data).await)
        }
        Command::Update { kind, id, data } => {
            let data = parse_data(&data)?;
            for_kind!(kind, E => run_update::<E>(&api, &config, &id, &data).await)
        }
        Command::Delete { kind, id } => {
            for_kind!(kind, E => run_delete::<E>(&api, &config, &id).await)
        }
    }
}

/// Apply command-line URL overrides on top of the environment config.
fn build_config(mut config: SyncConfig, cli: &Cli) -> Result<SyncConfig, CliError> {
    if let Some(url) = &cli.api_url {
        config.api_url.clone_from(url);
    }
    if let Some(url) = &cli.socket_url {
        config.socket_url.clone_from(url);
    }
    config.validate()?;
    Ok(config)
}

fn parse_data(raw: &str) -> Result<Value, CliError> {
    let value: Value = serde_json::from_str(raw)?;
    if value.is_object() { Ok(value) } else { Err(CliError::DataNotObject) }
}

// =============================================================================
// READ
// =============================================================================

/// Contracts search and sort by employee name, which needs the employee list.
async fn search_context<E: Entity>(api: &RestClient) -> SearchContext {
    if E::KIND != EntityKind::Contract {
        return SearchContext::default();
    }
    match EntityApi::<Employee>::list(api).await {
        Ok(employees) => SearchContext::from_employees(&employees),
        Err(error) => {
            warn!(error = %error, "employee names unavailable; contract search covers contract fields only");
            SearchContext::default()
        }
    }
}

async fn run_list<E: Entity>(api: &RestClient, view: ViewState) -> Result<(), CliError> {
    let mut list = LiveList::<E>::new();
    list.set_context(search_context::<E>(api).await);
    list.load(api).await?;
    let page = list.recompute_view(&view);
    print!("{}", render_page(&page, list.context()));
    Ok(())
}

async fn run_watch<E: Entity>(api: &RestClient, config: &SyncConfig, view: ViewState) -> Result<(), CliError> {
    let connection = ConnectionManager::from_config(config);
    let mut feed = DeltaFeed::<E>::subscribe(&connection);
    let mut status = connection.watch_status();

    let mut list = LiveList::<E>::with_view(view);
    list.set_context(search_context::<E>(api).await);
    if let Err(error) = list.load(api).await {
        eprintln!("load failed: {}", error.message());
    }
    feed.drain_into(&mut list);
    print!("{}", render_page(&list.current_view(), list.context()));

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            delta = feed.recv() => {
                let Some(delta) = delta else { break };
                info!(event = %delta.event_name(), id = delta.id(), "delta");
                list.apply(delta);
                feed.drain_into(&mut list);
                print!("{}", render_page(&list.current_view(), list.context()));
            }
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = status.borrow_and_update().clone();
                eprintln!("{}", render_status(&snapshot));
            }
            signal = &mut ctrl_c => {
                signal?;
                break;
            }
        }
    }

    connection.disconnect();
    Ok(())
}

// =============================================================================
// WRITE
// =============================================================================

/// Broadcasts through the connection and collects the relay's acks.
struct AckedBroadcast {
    connection: ConnectionManager,
    acks: mpsc::UnboundedSender<Value>,
}

impl Broadcaster for AckedBroadcast {
    fn broadcast(&self, event: &str, payload: Value) -> bool {
        let acks = self.acks.clone();
        self.connection.emit(
            event,
            payload,
            Some(Box::new(move |ack| {
                if acks.send(ack).is_err() {
                    warn!("ack arrived after the command finished");
                }
            })),
        )
    }
}

/// Connect to the relay so a mutation can be announced.
async fn open_broadcast(config: &SyncConfig) -> (AckedBroadcast, mpsc::UnboundedReceiver<Value>) {
    let connection = ConnectionManager::from_config(config);
    if !connection.wait_connected(config.connection_options().timeout).await {
        warn!("notification relay unreachable; other sessions will only see this change after reloading");
    }
    let (acks, ack_rx) = mpsc::unbounded_channel();
    (AckedBroadcast { connection, acks }, ack_rx)
}

/// Wait for the relay to acknowledge a successful mutation, then hang up.
async fn finish_broadcast(broadcaster: AckedBroadcast, mut ack_rx: mpsc::UnboundedReceiver<Value>, succeeded: bool) {
    if succeeded && broadcaster.connection.is_connected() {
        match tokio::time::timeout(ACK_TIMEOUT, ack_rx.recv()).await {
            Ok(Some(ack)) => eprintln!("{}", render_ack(&ack)),
            _ => warn!("relay did not acknowledge the broadcast"),
        }
    }
    broadcaster.connection.disconnect();
}

async fn run_create<E: Entity>(api: &RestClient, config: &SyncConfig, data: &Value) -> Result<(), CliError> {
    let (broadcaster, acks) = open_broadcast(config).await;
    let result = LiveList::<E>::new().create(api, &broadcaster, data).await;
    finish_broadcast(broadcaster, acks, result.is_ok()).await;
    println!("{}", serde_json::to_string_pretty(&result?)?);
    Ok(())
}

async fn run_update<E: Entity>(api: &RestClient, config: &SyncConfig, id: &str, data: &Value) -> Result<(), CliError> {
    let (broadcaster, acks) = open_broadcast(config).await;
    let result = LiveList::<E>::new().update(api, &broadcaster, id, data).await;
    finish_broadcast(broadcaster, acks, result.is_ok()).await;
    println!("{}", serde_json::to_string_pretty(&result?)?);
    Ok(())
}

async fn run_delete<E: Entity>(api: &RestClient, config: &SyncConfig, id: &str) -> Result<(), CliError> {
    let (broadcaster, acks) = open_broadcast(config).await;
    let result = LiveList::<E>::new().delete(api, &broadcaster, id).await;
    finish_broadcast(broadcaster, acks, result.is_ok()).await;
    result?;
    println!("deleted {} {id}", E::KIND);
    Ok(())
}

// =============================================================================
// RENDERING
// =============================================================================

fn render_page<E: Entity>(page: &ViewPage<E>, ctx: &SearchContext) -> String {
    let mut out = format!(
        "{} page {}/{} ({} matching)\n",
        E::KIND.collection(),
        page.page,
        page.total_pages,
        page.total_matches
    );
    for item in &page.items {
        let fields: Vec<String> = item.search_fields(ctx).into_iter().filter(|f| !f.is_empty()).collect();
        out.push_str(&format!("  {:<12} {}\n", item.id(), fields.join(" | ")));
    }
    out
}

fn render_status(status: &ConnectionStatus) -> String {
    let state = match status.state {
        ConnectionState::Connected => "connected",
        ConnectionState::Connecting => "connecting",
        ConnectionState::Reconnecting => "reconnecting",
        ConnectionState::Disconnected => "disconnected",
    };
    match (&status.last_error, status.attempt) {
        (Some(error), attempt) if status.state != ConnectionState::Connected => {
            format!("[relay] {state} (attempt {attempt}): {error}")
        }
        _ => format!("[relay] {state}"),
    }
}

fn render_ack(ack: &Value) -> String {
    match ack.get("delivered").and_then(Value::as_u64) {
        Some(1) => "broadcast to 1 other session".to_owned(),
        Some(n) => format!("broadcast to {n} other sessions"),
        None => format!("relay replied: {ack}"),
    }
}
