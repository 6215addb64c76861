//! Command line arguments shared between every binary in this workspace.
use std::{num::ParseFloatError, time::Duration};
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
pub struct Arguments {
    #[structopt(
        long,
        env = "LOG_FILTER",
        default_value = "warn,orderbook=debug,indexer=debug,shared=debug"
    )]
    pub log_filter: String,

    /// Postgres connection string for the projection database.
    #[structopt(
        long,
        env = "DATABASE_URL",
        default_value = "postgresql://postgres@localhost/orders"
    )]
    pub db_url: String,

    /// Redis connection string for the job queue.
    #[structopt(long, env = "REDIS_URL", default_value = "redis://localhost:6379")]
    pub redis_url: String,

    /// Timeout for all outbound http requests (e.g. the relay sink).
    #[structopt(
        long,
        default_value = "10",
        parse(try_from_str = duration_from_seconds),
    )]
    pub http_timeout: Duration,

    /// How often periodic maintenance tasks (proxy registry refresh, stale
    /// order expiry sweep) run.
    #[structopt(
        long,
        env,
        default_value = "15",
        parse(try_from_str = duration_from_seconds),
    )]
    pub maintenance_interval_seconds: Duration,
}

pub fn duration_from_seconds(s: &str) -> Result<Duration, ParseFloatError> {
    Ok(Duration::from_secs_f32(s.parse()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fractional_seconds() {
        assert_eq!(
            duration_from_seconds("0.5").unwrap(),
            Duration::from_millis(500)
        );
    }
}
