//! Prometheus-compatible metrics collection for MemForge
//!
//! Provides thread-safe metrics for monitoring allocation traffic.
//! Metrics are exported in Prometheus text format via the embedding
//! host's metrics endpoint.
//!
//! Uses the prometheus-client crate for lock-free metric updates.

use prometheus_client::{
    encoding::text::encode,
    metrics::counter::Counter,
    metrics::gauge::Gauge,
    registry::Registry,
};

/// Primary metrics collection structure
///
/// All metric updates use lock-free atomic operations, so recording from
/// the allocate/release hot path adds no lock beyond the pool's own.
#[derive(Debug)]
pub struct Metrics {
    /// Registry containing all metrics
    pub registry: Registry,

    /// Total grants served
    pub grants_total: Counter<u64>,

    /// Total releases served
    pub releases_total: Counter<u64>,

    /// Grants rejected for lack of capacity
    pub grant_failures_total: Counter<u64>,

    /// Releases rejected as caller bugs (double release, unknown handle)
    pub release_failures_total: Counter<u64>,

    /// Allocations force-released at teardown
    pub leaked_allocations_total: Counter<u64>,

    /// Bytes currently granted across all pools
    pub live_bytes: Gauge<i64>,

    /// Allocations currently live across all pools
    pub live_allocations: Gauge<i64>,
}

impl Metrics {
    /// Create a new metrics collection
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let grants_total = Counter::default();
        registry.register(
            "memforge_grants_total",
            "Total number of allocations granted",
            grants_total.clone(),
        );

        let releases_total = Counter::default();
        registry.register(
            "memforge_releases_total",
            "Total number of allocations released",
            releases_total.clone(),
        );

        let grant_failures_total = Counter::default();
        registry.register(
            "memforge_grant_failures_total",
            "Total number of allocations rejected for lack of capacity",
            grant_failures_total.clone(),
        );

        let release_failures_total = Counter::default();
        registry.register(
            "memforge_release_failures_total",
            "Total number of releases rejected as caller bugs",
            release_failures_total.clone(),
        );

        let leaked_allocations_total = Counter::default();
        registry.register(
            "memforge_leaked_allocations_total",
            "Total number of allocations force-released at teardown",
            leaked_allocations_total.clone(),
        );

        let live_bytes = Gauge::default();
        registry.register(
            "memforge_live_bytes",
            "Bytes currently granted across all pools",
            live_bytes.clone(),
        );

        let live_allocations = Gauge::default();
        registry.register(
            "memforge_live_allocations",
            "Allocations currently live across all pools",
            live_allocations.clone(),
        );

        Metrics {
            registry,
            grants_total,
            releases_total,
            grant_failures_total,
            release_failures_total,
            leaked_allocations_total,
            live_bytes,
            live_allocations,
        }
    }

    /// Record a successful grant
    pub fn record_grant(&self, size: usize) {
        self.grants_total.inc();
        self.live_bytes.inc_by(size as i64);
        self.live_allocations.inc();
    }

    /// Record a grant rejected for lack of capacity
    pub fn record_grant_failure(&self) {
        self.grant_failures_total.inc();
    }

    /// Record a successful release
    pub fn record_release(&self, size: usize) {
        self.releases_total.inc();
        self.live_bytes.dec_by(size as i64);
        self.live_allocations.dec();
    }

    /// Record a release rejected as a caller bug
    pub fn record_release_failure(&self) {
        self.release_failures_total.inc();
    }

    /// Record allocations force-released at teardown
    pub fn record_leaks(&self, count: u64) {
        self.leaked_allocations_total.inc_by(count);
        self.live_bytes.set(0);
        self.live_allocations.set(0);
    }

    /// Encode all metrics in Prometheus text format
    pub fn encode_text(&self) -> String {
        let mut buffer = String::new();
        // encode only fails on a formatter error, which String never produces
        encode(&mut buffer, &self.registry).unwrap_or_default();
        buffer
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
