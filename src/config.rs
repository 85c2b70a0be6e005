use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "dealtracker", about = "Deal and coupon ingestion pipeline")]
pub struct Config {
    /// Database connection URL
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,

    /// Run database migrations on startup
    #[arg(long, env = "RUN_MIGRATIONS", default_value = "true")]
    pub run_migrations: bool,

    /// Listen address
    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:8080")]
    pub listen_addr: String,

    /// Path to the source catalog (JSON)
    #[arg(long, env = "SOURCES_FILE", default_value = "sources.json")]
    pub sources_file: String,

    /// Register recurring ingestion schedules on startup
    #[arg(long, env = "SCHEDULER_ENABLED", default_value = "true")]
    pub scheduler_enabled: bool,

    /// Upper bound on a single fetch call, in seconds
    #[arg(long, env = "FETCH_TIMEOUT_SECS", default_value = "15")]
    pub fetch_timeout_secs: u64,

    /// Trailing window for near-duplicate detection, in days
    #[arg(long, env = "DEDUP_WINDOW_DAYS", default_value = "7")]
    pub dedup_window_days: i32,

    /// Similarity floor for logging close-call matches
    #[arg(long, env = "DEDUP_DISCOVERY_THRESHOLD", default_value = "0.55")]
    pub dedup_discovery_threshold: f64,

    /// Similarity at or above which a candidate is skipped as a duplicate
    #[arg(long, env = "DEDUP_ACCEPTANCE_THRESHOLD", default_value = "0.6")]
    pub dedup_acceptance_threshold: f64,
}
