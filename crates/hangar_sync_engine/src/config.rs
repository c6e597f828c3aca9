//! Configuration for the sync engine.

use hangar_sync_protocol::{EntityType, ErrorKind};
use rand::Rng;
use std::time::Duration;

/// Configuration for queue draining.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Maximum entries claimed per batch.
    pub batch_size: usize,
    /// Maximum simultaneous remote calls within a batch.
    pub push_concurrency: usize,
    /// Deadline for a single remote call.
    pub request_timeout: Duration,
    /// Whether repeated mutations of one entity are merged before sync.
    pub collapse_mutations: bool,
    /// Number of sync log records retained.
    pub log_capacity: usize,
    /// How often the connectivity probe is polled.
    pub poll_interval: Duration,
    /// Interval for background sync passes (None = only on reconnect).
    pub sync_interval: Option<Duration>,
    /// Retry configuration.
    pub retry: RetryConfig,
}

impl SyncConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self {
            batch_size: 25,
            push_concurrency: 4,
            request_timeout: Duration::from_secs(30),
            collapse_mutations: true,
            log_capacity: 200,
            poll_interval: Duration::from_secs(5),
            sync_interval: Some(Duration::from_secs(60)),
            retry: RetryConfig::default(),
        }
    }

    /// Sets the batch size.
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Sets the number of simultaneous remote calls per batch.
    pub fn with_push_concurrency(mut self, concurrency: usize) -> Self {
        self.push_concurrency = concurrency.max(1);
        self
    }

    /// Sets the per-call remote timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Enables or disables mutation collapsing.
    pub fn with_collapse_mutations(mut self, collapse: bool) -> Self {
        self.collapse_mutations = collapse;
        self
    }

    /// Sets the sync log capacity.
    pub fn with_log_capacity(mut self, capacity: usize) -> Self {
        self.log_capacity = capacity;
        self
    }

    /// Sets the connectivity polling interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the interval for background sync passes.
    pub fn with_sync_interval(mut self, interval: Option<Duration>) -> Self {
        self.sync_interval = interval;
        self
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Attempt ceiling for retryable failures.
    pub max_attempts: u32,
    /// Attempt ceiling for `Unknown` failures.
    pub unknown_max_attempts: u32,
    /// Base delay for exponential backoff.
    pub initial_delay: Duration,
    /// Upper bound for the delay before jitter.
    pub max_delay: Duration,
    /// Cap on the backoff exponent.
    pub max_exponent: u32,
    /// Whether to add up to 25% jitter.
    pub add_jitter: bool,
}

impl RetryConfig {
    /// Creates a retry configuration with the given ceiling.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            unknown_max_attempts: max_attempts.clamp(1, 3),
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(300),
            max_exponent: 6,
            add_jitter: true,
        }
    }

    /// Creates a configuration with no retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            unknown_max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            max_exponent: 0,
            add_jitter: false,
        }
    }

    /// Creates a configuration that retries without waiting.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            add_jitter: false,
            ..Self::new(max_attempts)
        }
    }

    /// Sets the base delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff exponent cap.
    pub fn with_max_exponent(mut self, cap: u32) -> Self {
        self.max_exponent = cap;
        self
    }

    /// Sets the ceiling for `Unknown` failures.
    pub fn with_unknown_max_attempts(mut self, attempts: u32) -> Self {
        self.unknown_max_attempts = attempts.max(1);
        self
    }

    /// Enables or disables jitter.
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.add_jitter = jitter;
        self
    }

    /// Returns the attempt ceiling that applies to a failure kind.
    pub fn ceiling_for(&self, kind: ErrorKind) -> u32 {
        match kind {
            ErrorKind::Unknown => self.unknown_max_attempts.min(self.max_attempts),
            _ => self.max_attempts,
        }
    }

    /// Calculates the wait after `attempts` failed attempts:
    /// `initial_delay * 2^min(attempts, max_exponent)`, bounded by
    /// `max_delay`, plus up to 25% jitter.
    pub fn delay_for_attempt(&self, attempts: u32) -> Duration {
        if self.initial_delay.is_zero() {
            return Duration::ZERO;
        }

        let exponent = attempts.min(self.max_exponent).min(30);
        let base_delay = self.initial_delay.as_secs_f64() * f64::from(1u32 << exponent);
        let delay_secs = base_delay.min(self.max_delay.as_secs_f64());

        if self.add_jitter {
            let jitter = delay_secs * rand::thread_rng().gen_range(0.0..=0.25);
            Duration::from_secs_f64(delay_secs + jitter)
        } else {
            Duration::from_secs_f64(delay_secs)
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(5)
    }
}

/// A legacy table to migrate and the entity type its records map to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationTable {
    /// Local table name.
    pub name: String,
    /// Remote entity type.
    pub entity_type: EntityType,
}

impl MigrationTable {
    /// Creates a table mapping.
    pub fn new(name: impl Into<String>, entity_type: EntityType) -> Self {
        Self {
            name: name.into(),
            entity_type,
        }
    }

    /// Maps an entity type onto its conventional table.
    pub fn for_entity(entity_type: EntityType) -> Self {
        let name = entity_type.table_name().to_string();
        Self::new(name, entity_type)
    }
}

/// Configuration for the one-shot migration.
#[derive(Debug, Clone)]
pub struct MigrationConfig {
    /// Tables in migration order.
    pub tables: Vec<MigrationTable>,
    /// Maximum failure descriptions kept in the result.
    pub max_reported_errors: usize,
    /// Deadline for a single remote call.
    pub request_timeout: Duration,
}

impl MigrationConfig {
    /// Creates the default configuration: aircraft, employees, tasks, flight sheets.
    pub fn new() -> Self {
        Self {
            tables: vec![
                MigrationTable::for_entity(EntityType::Aircraft),
                MigrationTable::for_entity(EntityType::Employee),
                MigrationTable::for_entity(EntityType::Task),
                MigrationTable::for_entity(EntityType::FlightSheet),
            ],
            max_reported_errors: 50,
            request_timeout: Duration::from_secs(30),
        }
    }

    /// Replaces the table list.
    pub fn with_tables(mut self, tables: Vec<MigrationTable>) -> Self {
        self.tables = tables;
        self
    }

    /// Sets the display cap for failure descriptions.
    pub fn with_max_reported_errors(mut self, max: usize) -> Self {
        self.max_reported_errors = max;
        self
    }

    /// Sets the per-call remote timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_config_builder() {
        let config = SyncConfig::new()
            .with_batch_size(10)
            .with_push_concurrency(0)
            .with_collapse_mutations(false)
            .with_request_timeout(Duration::from_secs(5));

        assert_eq!(config.batch_size, 10);
        assert_eq!(config.push_concurrency, 1);
        assert!(!config.collapse_mutations);
        assert_eq!(config.request_timeout, Duration::from_secs(5));
    }

    #[test]
    fn retry_config_no_retry() {
        let config = RetryConfig::no_retry();
        assert_eq!(config.max_attempts, 1);
        assert_eq!(config.delay_for_attempt(3), Duration::ZERO);
    }

    #[test]
    fn unknown_ceiling_is_lower() {
        let config = RetryConfig::new(8);
        assert_eq!(config.ceiling_for(ErrorKind::Network), 8);
        assert_eq!(config.ceiling_for(ErrorKind::Unknown), 3);

        let tight = RetryConfig::new(2);
        assert_eq!(tight.ceiling_for(ErrorKind::Unknown), 2);
    }

    #[test]
    fn retry_delay_calculation() {
        let config = RetryConfig::new(5)
            .with_initial_delay(Duration::from_millis(100))
            .with_jitter(false);

        assert_eq!(config.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(config.delay_for_attempt(3), Duration::from_millis(800));
    }

    #[test]
    fn retry_delay_jitter_bounds() {
        let config = RetryConfig::new(5).with_initial_delay(Duration::from_millis(100));

        let delay = config.delay_for_attempt(1);
        assert!(delay >= Duration::from_millis(200));
        assert!(delay <= Duration::from_millis(250));
    }

    #[test]
    fn retry_delay_respects_cap_and_max() {
        let config = RetryConfig::new(10)
            .with_initial_delay(Duration::from_secs(1))
            .with_max_exponent(2)
            .with_max_delay(Duration::from_secs(60))
            .with_jitter(false);
        assert_eq!(config.delay_for_attempt(9), Duration::from_secs(4));

        let bounded = RetryConfig::new(10)
            .with_initial_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(5))
            .with_jitter(false);
        assert_eq!(bounded.delay_for_attempt(6), Duration::from_secs(5));
    }

    #[test]
    fn default_migration_tables() {
        let config = MigrationConfig::default();
        let names: Vec<_> = config.tables.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["aircraft", "employees", "tasks", "flight_sheets"]);
    }
}
