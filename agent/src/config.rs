//! Command-line and environment configuration.
//!
//! This is deliberately thin glue: `clap`'s derive API gives us the
//! environment-overrides-flag-default precedence from the configuration
//! table for free via `#[arg(env = "...")]`, so there's no hand-rolled
//! parsing here.

use clap::Parser;

#[derive(Debug, Clone, Parser)]
#[command(name = "agent", about = "Samples and reports process/host metrics")]
pub struct Args {
    /// Address of the metrics server to report to.
    #[arg(long, env = "ADDRESS", default_value = ":8080")]
    pub address: String,

    /// Sampling period, in seconds.
    #[arg(long, env = "POLL_INTERVAL", default_value_t = 2)]
    pub poll_interval: u64,

    /// Report (dispatch) period, in seconds.
    #[arg(long, env = "REPORT_INTERVAL", default_value_t = 10)]
    pub report_interval: u64,

    /// Shared HMAC secret. Unset disables request signing.
    #[arg(long, env = "KEY")]
    pub key: Option<String>,

    /// Number of concurrent worker tasks sending batches.
    #[arg(long, env = "RATE_LIMIT", default_value_t = 1)]
    pub rate_limit: usize,

    /// Metric points per batch.
    #[arg(long, default_value_t = 10)]
    pub batch_size: usize,
}

impl Args {
    /// `ADDRESS=:8080` means "any interface, port 8080" by Go's net/http
    /// convention. As a dial target that's meaningless, so a bare `:port`
    /// is normalized to localhost.
    pub fn server_host(&self) -> String {
        if let Some(port) = self.address.strip_prefix(':') {
            format!("127.0.0.1:{port}")
        } else {
            self.address.clone()
        }
    }

    pub fn updates_url(&self) -> String {
        format!("http://{}/updates/", self.server_host())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_bare_port_address() {
        let args = Args::parse_from(["agent", "--address", ":8080"]);
        assert_eq!(args.server_host(), "127.0.0.1:8080");
        assert_eq!(args.updates_url(), "http://127.0.0.1:8080/updates/");
    }

    #[test]
    fn keeps_explicit_host() {
        let args = Args::parse_from(["agent", "--address", "metrics.internal:9000"]);
        assert_eq!(args.server_host(), "metrics.internal:9000");
    }

    #[test]
    fn defaults_match_spec() {
        let args = Args::parse_from(["agent"]);
        assert_eq!(args.poll_interval, 2);
        assert_eq!(args.report_interval, 10);
        assert_eq!(args.rate_limit, 1);
        assert_eq!(args.batch_size, 10);
        assert!(args.key.is_none());
    }
}
