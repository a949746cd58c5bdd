//! Command-line and environment configuration for the server binary.

use clap::Parser;

#[derive(Debug, Clone, Parser)]
#[command(name = "server", about = "Ingests, stores, and serves process/host metrics")]
pub struct Args {
    /// Listen address.
    #[arg(long, env = "ADDRESS", default_value = ":8080")]
    pub address: String,

    /// File-flush period, in seconds. `0` means write-through.
    #[arg(long, env = "STORE_INTERVAL", default_value_t = 300)]
    pub store_interval: u64,

    /// Path to the file storage backend's catalog.
    #[arg(long, env = "FILE_STORAGE_PATH", default_value = "metrics.json")]
    pub file_storage_path: String,

    /// Load previously persisted state on startup.
    #[arg(long, env = "RESTORE", default_value_t = true)]
    pub restore: bool,

    /// Postgres connection string. Selects the database backend when set.
    #[arg(long, env = "DATABASE_DSN")]
    pub database_dsn: Option<String>,

    /// Shared HMAC secret. Unset disables signature verification/signing.
    #[arg(long, env = "KEY")]
    pub key: Option<String>,

    /// Append-only file audit sink path.
    #[arg(long, env = "AUDIT_FILE")]
    pub audit_file: Option<String>,

    /// HTTP audit sink URL.
    #[arg(long, env = "AUDIT_URL")]
    pub audit_url: Option<String>,
}

impl Args {
    /// Normalizes the Go-style bare `:port` listen address into something
    /// `TcpListener::bind` accepts directly.
    pub fn bind_addr(&self) -> String {
        if let Some(port) = self.address.strip_prefix(':') {
            format!("0.0.0.0:{port}")
        } else {
            self.address.clone()
        }
    }
}
