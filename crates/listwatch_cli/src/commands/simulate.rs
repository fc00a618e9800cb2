//! Simulate command implementation.

use listwatch_engine::{ListWatchConfig, ListWatcher, MemorySink, SyncError};
use listwatch_protocol::Vpc;
use listwatch_server::{ResourceServer, ServerConfig};
use listwatch_testkit::{churn_account, matches_server, wait_until, Churn, ChurnConfig, LoopbackApi};
use serde::Serialize;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{Instant, Interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// How long to wait for the cache to catch up once churn stops.
const SETTLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors from the simulate command.
#[derive(Debug, Error)]
pub enum CliError {
    /// Unsupported `--format` value.
    #[error("unknown output format: {0}")]
    UnknownFormat(String),

    /// The initial List never completed.
    #[error("cache never synced within {0:?}")]
    NeverSynced(Duration),

    /// The cache did not match the server after settling.
    #[error("cache diverged from server: {cached} cached, {expected} expected")]
    Diverged {
        /// Objects in the cache.
        cached: usize,
        /// Objects on the server.
        expected: usize,
    },

    /// The sync loop stopped with something other than cancellation.
    #[error("sync loop failed: {0}")]
    Loop(#[from] SyncError),

    /// A background task panicked.
    #[error("task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// The report could not be encoded.
    #[error("failed to encode report: {0}")]
    Report(#[from] serde_json::Error),
}

/// Report output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text.
    Text,
    /// Pretty-printed JSON.
    Json,
}

impl FromStr for OutputFormat {
    type Err = CliError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            other => Err(CliError::UnknownFormat(other.to_string())),
        }
    }
}

/// Options for one simulation run.
#[derive(Debug, Clone)]
pub struct SimulateOptions {
    /// VPCs seeded before the loop starts.
    pub vpcs: usize,
    /// Accounts the VPCs are spread across.
    pub accounts: usize,
    /// Restricts the cache to the account at this index.
    pub account: Option<usize>,
    /// How long churn runs.
    pub duration: Duration,
    /// Pause between changes.
    pub churn_interval: Duration,
    /// How often all watches are aborted.
    pub fault_interval: Option<Duration>,
    /// List timeout.
    pub list_timeout: Duration,
    /// Watch idle timeout.
    pub watch_idle_timeout: Option<Duration>,
    /// Server bookmark interval.
    pub bookmark_interval: Option<Duration>,
    /// Churn seed.
    pub seed: Option<u64>,
}

impl Default for SimulateOptions {
    fn default() -> Self {
        Self {
            vpcs: 100,
            accounts: 3,
            account: None,
            duration: Duration::from_secs(5),
            churn_interval: Duration::from_millis(5),
            fault_interval: Some(Duration::from_secs(1)),
            list_timeout: Duration::from_secs(60),
            watch_idle_timeout: None,
            bookmark_interval: None,
            seed: None,
        }
    }
}

/// Simulation result.
#[derive(Debug, Serialize)]
pub struct SimulateReport {
    /// Unique id of this run.
    pub run_id: String,
    /// Account the cache was restricted to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    /// Resources created by churn.
    pub created: u64,
    /// Resources updated by churn.
    pub updated: u64,
    /// Resources deleted by churn.
    pub deleted: u64,
    /// Time spent churning, in milliseconds.
    pub churn_ms: u64,
    /// Number of times all watches were aborted.
    pub watch_aborts: u64,
    /// Resources on the server at the end of the run.
    pub server_resources: usize,
    /// Resources in the cache at the end of the run.
    pub cached_resources: usize,
    /// Server version at the end of the run.
    pub server_version: String,
    /// Last version the loop knew about.
    pub cache_version: String,
    /// Successful Lists.
    pub lists_succeeded: u64,
    /// Failed Lists, timeouts included.
    pub list_failures: u64,
    /// Lists that timed out.
    pub list_timeouts: u64,
    /// Watches opened.
    pub watches_started: u64,
    /// Watches that ended with an error.
    pub watch_failures: u64,
    /// Deltas applied to the cache.
    pub deltas_applied: u64,
    /// Bookmarks received on watches.
    pub bookmarks_seen: u64,
    /// Relists after a watch ended.
    pub relists: u64,
    /// Most recent failure seen by the loop.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Whether the cache matched the server.
    pub converged: bool,
}

/// Runs the simulate command and prints its report.
pub async fn run(options: SimulateOptions, format: OutputFormat) -> Result<SimulateReport, CliError> {
    let report = simulate(options).await?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Text => {
            print_text_output(&report);
        }
    }

    if !report.converged {
        return Err(CliError::Diverged {
            cached: report.cached_resources,
            expected: report.server_resources,
        });
    }
    Ok(report)
}

/// Runs one simulation without printing anything.
pub async fn simulate(options: SimulateOptions) -> Result<SimulateReport, CliError> {
    let run_id = Uuid::new_v4();
    let accounts = options.accounts.max(1);
    let account_id = options.account.map(|index| churn_account(index % accounts));
    info!(%run_id, vpcs = options.vpcs, accounts, ?account_id, "starting simulation");

    let mut server_config = ServerConfig::new();
    if let Some(interval) = options.bookmark_interval {
        server_config = server_config.with_bookmark_interval(interval);
    }
    let server: Arc<ResourceServer<Vpc>> = Arc::new(ResourceServer::new(server_config));

    let churn = Churn::new(ChurnConfig {
        accounts,
        names: options.vpcs.div_ceil(accounts).max(1) * 2,
        interval: options.churn_interval,
        seed: options.seed,
    });
    churn.seed_server(&server, options.vpcs);

    let mut config = ListWatchConfig::new("vpcs").with_list_timeout(options.list_timeout);
    if let Some(timeout) = options.watch_idle_timeout {
        config = config.with_watch_idle_timeout(timeout);
    }
    if let Some(account_id) = &account_id {
        config = config.with_cloud_account_id(account_id.clone());
    }

    let api = Arc::new(LoopbackApi::new(Arc::clone(&server)));
    let sink: Arc<MemorySink<Vpc>> = Arc::new(MemorySink::new());
    let watcher = ListWatcher::new(config, api, Arc::clone(&sink));
    let status = watcher.status();
    let cancel = CancellationToken::new();
    let handle = watcher.spawn(cancel.clone());

    let sync_timeout = options.list_timeout + SETTLE_TIMEOUT;
    if tokio::time::timeout(sync_timeout, sink.wait_for_sync()).await.is_err() {
        cancel.cancel();
        return Err(CliError::NeverSynced(sync_timeout));
    }
    info!(items = sink.len(), "initial sync complete");

    let stop_churn = CancellationToken::new();
    let churn_task = {
        let server = Arc::clone(&server);
        let stop = stop_churn.clone();
        tokio::spawn(async move { churn.run(&server, stop).await })
    };

    let mut watch_aborts = 0;
    let mut faults = options
        .fault_interval
        .map(|period| tokio::time::interval_at(Instant::now() + period, period));
    let deadline = tokio::time::sleep(options.duration);
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            _ = &mut deadline => break,
            _ = next_tick(&mut faults) => {
                server.faults().abort_watches();
                watch_aborts += 1;
                debug!(watch_aborts, "aborted watches");
            }
        }
    }
    stop_churn.cancel();
    let churn_stats = churn_task.await?;
    info!(changes = churn_stats.total(), "churn stopped");

    let converged = wait_until(SETTLE_TIMEOUT, || {
        matches_server(&sink.list(), &server, account_id.as_deref())
    })
    .await;
    if !converged {
        warn!(%run_id, "cache did not converge");
    }

    let snapshot = status.borrow().clone();
    cancel.cancel();
    match handle.await? {
        Ok(()) | Err(SyncError::Cancelled) => {}
        Err(err) => return Err(err.into()),
    }

    let (expected, server_version) = server.snapshot(account_id.as_deref());
    Ok(SimulateReport {
        run_id: run_id.to_string(),
        account: account_id,
        created: churn_stats.created,
        updated: churn_stats.updated,
        deleted: churn_stats.deleted,
        churn_ms: u64::try_from(churn_stats.duration.as_millis()).unwrap_or(u64::MAX),
        watch_aborts,
        server_resources: expected.len(),
        cached_resources: sink.len(),
        server_version: server_version.to_string(),
        cache_version: snapshot.last_known_version.to_string(),
        lists_succeeded: snapshot.stats.lists_succeeded,
        list_failures: snapshot.stats.list_failures,
        list_timeouts: snapshot.stats.list_timeouts,
        watches_started: snapshot.stats.watches_started,
        watch_failures: snapshot.stats.watch_failures,
        deltas_applied: snapshot.stats.deltas_applied,
        bookmarks_seen: snapshot.stats.bookmarks_seen,
        relists: snapshot.stats.relists,
        last_error: snapshot.last_error,
        converged,
    })
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

fn print_text_output(report: &SimulateReport) {
    println!("Simulation {}", report.run_id);
    println!("=========");
    if let Some(account) = &report.account {
        println!("Account:          {account}");
    }
    println!();
    println!("Churn ({} ms):", report.churn_ms);
    println!("  Created:        {}", report.created);
    println!("  Updated:        {}", report.updated);
    println!("  Deleted:        {}", report.deleted);
    println!("  Watch aborts:   {}", report.watch_aborts);
    println!();
    println!("Sync loop:");
    println!(
        "  Lists:          {} ok, {} failed ({} timed out)",
        report.lists_succeeded, report.list_failures, report.list_timeouts
    );
    println!(
        "  Watches:        {} started, {} failed",
        report.watches_started, report.watch_failures
    );
    println!("  Deltas applied: {}", report.deltas_applied);
    println!("  Bookmarks:      {}", report.bookmarks_seen);
    println!("  Relists:        {}", report.relists);
    if let Some(error) = &report.last_error {
        println!("  Last error:     {error}");
    }
    println!();
    println!(
        "Server:           {} resources @ {}",
        report.server_resources, report.server_version
    );
    println!(
        "Cache:            {} resources @ {}",
        report.cached_resources, report.cache_version
    );
    println!();
    if report.converged {
        println!("Status: CONVERGED");
    } else {
        println!("Status: DIVERGED");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick() -> SimulateOptions {
        SimulateOptions {
            vpcs: 20,
            duration: Duration::from_millis(200),
            churn_interval: Duration::from_millis(1),
            fault_interval: Some(Duration::from_millis(50)),
            seed: Some(3),
            ..SimulateOptions::default()
        }
    }

    #[test]
    fn parses_output_format() {
        assert_eq!("text".parse::<OutputFormat>().unwrap(), OutputFormat::Text);
        assert_eq!("json".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert!(matches!(
            "yaml".parse::<OutputFormat>(),
            Err(CliError::UnknownFormat(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn simulation_converges() {
        let report = simulate(quick()).await.unwrap();

        assert!(report.converged);
        assert_eq!(report.cached_resources, report.server_resources);
        assert!(report.created + report.updated + report.deleted > 0);
        assert!(report.watch_aborts >= 1);
        assert!(report.relists >= 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn account_scoped_simulation_converges() {
        let options = SimulateOptions {
            account: Some(1),
            ..quick()
        };
        let report = simulate(options).await.unwrap();

        assert!(report.converged);
        assert_eq!(report.account.as_deref(), Some("000000000002"));
    }

    #[test]
    fn report_serializes() {
        let report = SimulateReport {
            run_id: "run".into(),
            account: None,
            created: 1,
            updated: 2,
            deleted: 3,
            churn_ms: 10,
            watch_aborts: 0,
            server_resources: 4,
            cached_resources: 4,
            server_version: "5".into(),
            cache_version: "5".into(),
            lists_succeeded: 1,
            list_failures: 0,
            list_timeouts: 0,
            watches_started: 1,
            watch_failures: 0,
            deltas_applied: 6,
            bookmarks_seen: 0,
            relists: 0,
            last_error: None,
            converged: true,
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["deltas_applied"], 6);
        assert!(json.get("account").is_none());
    }
}
