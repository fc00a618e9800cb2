//! Random churn against the in-memory server.
//!
//! Drives creates, updates and deletes over a bounded key space so that
//! caches can be checked for convergence under load.

use listwatch_protocol::{ResourceKey, Vpc, VpcPhase};
use listwatch_server::ResourceServer;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Configuration for a churn run.
#[derive(Debug, Clone)]
pub struct ChurnConfig {
    /// Number of accounts resources are spread across.
    pub accounts: usize,
    /// Number of distinct names per account.
    pub names: usize,
    /// Pause between changes.
    pub interval: Duration,
    /// Seed for reproducible runs. `None` seeds from entropy.
    pub seed: Option<u64>,
}

impl Default for ChurnConfig {
    fn default() -> Self {
        Self {
            accounts: 3,
            names: 20,
            interval: Duration::from_millis(5),
            seed: None,
        }
    }
}

/// Kind of change applied by one churn step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChurnOp {
    /// A new resource was created.
    Create,
    /// An existing resource was updated.
    Update,
    /// An existing resource was deleted.
    Delete,
}

/// Result of a churn run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChurnStats {
    /// Resources created.
    pub created: u64,
    /// Resources updated.
    pub updated: u64,
    /// Resources deleted.
    pub deleted: u64,
    /// Time spent churning.
    pub duration: Duration,
}

impl ChurnStats {
    /// Returns the total number of changes.
    pub fn total(&self) -> u64 {
        self.created + self.updated + self.deleted
    }

    fn count(&mut self, op: ChurnOp) {
        match op {
            ChurnOp::Create => self.created += 1,
            ChurnOp::Update => self.updated += 1,
            ChurnOp::Delete => self.deleted += 1,
        }
    }
}

/// Account id for the `index`th churn account.
pub fn churn_account(index: usize) -> String {
    format!("{:012}", index + 1)
}

/// Applies random changes to a server.
pub struct Churn {
    config: ChurnConfig,
    rng: StdRng,
}

impl Churn {
    /// Creates a churn driver.
    pub fn new(config: ChurnConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { config, rng }
    }

    /// Creates one resource per key of the key space.
    pub fn seed_server(&self, server: &ResourceServer<Vpc>, count: usize) {
        for i in 0..count {
            let account = churn_account(i % self.config.accounts.max(1));
            let name = format!("vpc-{}", i / self.config.accounts.max(1));
            server.put(Vpc::new(account, name).with_cidr_block(format!("10.{}.0.0/16", i % 256)));
        }
    }

    /// Applies one random change.
    ///
    /// Picks a key; a missing key is created, an existing one is updated
    /// or, one time in three, deleted.
    pub fn step(&mut self, server: &ResourceServer<Vpc>) -> ChurnOp {
        let account = churn_account(self.rng.gen_range(0..self.config.accounts.max(1)));
        let name = format!("vpc-{}", self.rng.gen_range(0..self.config.names.max(1)));
        let key = ResourceKey::new(account.clone(), name.clone());

        match server.get(&key) {
            None => {
                let octet: u8 = self.rng.gen();
                server.put(Vpc::new(account, name).with_cidr_block(format!("10.{octet}.0.0/16")));
                ChurnOp::Create
            }
            Some(_) if self.rng.gen_ratio(1, 3) => {
                // Losing a race with another writer is fine.
                let _ = server.delete(&key);
                ChurnOp::Delete
            }
            Some(mut vpc) => {
                vpc.status.phase = match vpc.status.phase {
                    VpcPhase::Provisioning => VpcPhase::Ready,
                    VpcPhase::Ready => VpcPhase::Provisioning,
                    other => other,
                };
                let label = format!("{}", self.rng.gen::<u32>());
                vpc.metadata.labels.insert("churn".into(), label);
                server.put(vpc);
                ChurnOp::Update
            }
        }
    }

    /// Applies changes until `cancel` fires.
    pub async fn run(mut self, server: &ResourceServer<Vpc>, cancel: CancellationToken) -> ChurnStats {
        let start = Instant::now();
        let mut stats = ChurnStats::default();
        while !cancel.is_cancelled() {
            let op = self.step(server);
            stats.count(op);
            debug!(?op, total = stats.total(), "churn step");

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.interval) => {}
            }
        }
        stats.duration = start.elapsed();
        stats
    }
}

/// Returns true if `cache` holds exactly the server's current resources.
pub fn matches_server(cache: &[Vpc], server: &ResourceServer<Vpc>, account_id: Option<&str>) -> bool {
    let (expected, _) = server.snapshot(account_id);
    cache == expected.as_slice()
}
