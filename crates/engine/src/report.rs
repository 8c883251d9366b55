//! What one sync cycle did, per server and per fetch.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FetchKind {
    Bootstrap,
    Status,
    Balances,
    Trades,
    DiffData,
    Contracts,
}

impl FetchKind {
    /// Stable name, also the prefix of `pollFailed` dedup keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchKind::Bootstrap => "bootstrap",
            FetchKind::Status => "status",
            FetchKind::Balances => "balances",
            FetchKind::Trades => "trades",
            FetchKind::DiffData => "diffdata",
            FetchKind::Contracts => "contracts",
        }
    }

    /// Wording used in failure messages.
    pub fn description(&self) -> &'static str {
        match self {
            FetchKind::Bootstrap => "full trade history",
            FetchKind::Status => "status",
            FetchKind::Balances => "balances",
            FetchKind::Trades => "trades",
            FetchKind::DiffData => "diffdata",
            FetchKind::Contracts => "contract transactions",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FetchOutcome {
    /// Rows newly written (or merged, for diff data).
    Stored { count: u64 },
    /// Upstream answered with something that is not the expected shape.
    Malformed,
    /// Nothing to fetch for this server.
    Skipped,
    Failed { class: String, error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FetchReport {
    pub fetch: FetchKind,
    #[serde(flatten)]
    pub outcome: FetchOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ServerReport {
    pub server_id: String,
    /// Present only on the cycle that attempted the full-history sync.
    pub bootstrap: Option<FetchOutcome>,
    pub fetches: Vec<FetchReport>,
}

impl ServerReport {
    pub fn new(server_id: impl Into<String>) -> Self {
        Self {
            server_id: server_id.into(),
            ..Default::default()
        }
    }

    pub fn outcome(&self, fetch: FetchKind) -> Option<&FetchOutcome> {
        if fetch == FetchKind::Bootstrap {
            return self.bootstrap.as_ref();
        }
        self.fetches
            .iter()
            .find(|r| r.fetch == fetch)
            .map(|r| &r.outcome)
    }

    fn outcomes(&self) -> impl Iterator<Item = &FetchOutcome> {
        self.bootstrap
            .iter()
            .chain(self.fetches.iter().map(|r| &r.outcome))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SweepReport {
    pub trades_evaluated: usize,
    pub snapshots_evaluated: usize,
    pub dispatched: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CycleReport {
    pub started_at: i64,
    pub finished_at: i64,
    pub servers: Vec<ServerReport>,
    pub sweep: SweepReport,
    /// Upstream payloads that were not the expected shape.
    pub malformed_payloads: usize,
    pub failed_fetches: usize,
}

impl CycleReport {
    /// Fill the summary counters from the per-server reports.
    pub fn finish(&mut self, finished_at: i64) {
        self.finished_at = finished_at;
        self.malformed_payloads = self
            .servers
            .iter()
            .flat_map(|s| s.outcomes())
            .filter(|o| matches!(o, FetchOutcome::Malformed))
            .count();
        self.failed_fetches = self
            .servers
            .iter()
            .flat_map(|s| s.outcomes())
            .filter(|o| matches!(o, FetchOutcome::Failed { .. }))
            .count();
    }

    pub fn server(&self, server_id: &str) -> Option<&ServerReport> {
        self.servers.iter().find(|s| s.server_id == server_id)
    }
}
