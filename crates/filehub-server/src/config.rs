//! Server configuration from CLI flags and environment variables.

use clap::Parser;
use std::net::IpAddr;
use std::path::PathBuf;

/// File store with collaborative-editing integration
#[derive(Debug, Clone, Parser)]
#[command(name = "filehub", version)]
pub struct Config {
    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// Address to bind to
    #[arg(long, env = "BIND_ADDRESS", default_value = "0.0.0.0")]
    pub bind_address: IpAddr,

    /// Directory all stored files live under (created if missing)
    #[arg(long, env = "STORAGE_PATH", default_value = "./storage")]
    pub storage_path: PathBuf,

    /// Shared secret for direct upload authentication (X-API-Key header)
    #[arg(long, env = "API_KEY", hide_env_values = true)]
    pub api_key: String,

    /// Symmetric secret for editor-session token signing
    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: String,

    /// Externally reachable base URL the editor fetches documents from
    #[arg(long, env = "BASE_URL", default_value = "http://localhost:8080/d")]
    pub base_url: String,

    /// Public address of the external document-editing service
    #[arg(long, env = "DOC_SERVER_URL", default_value = "http://localhost:8000")]
    pub doc_server_url: String,

    /// Internal host (host or host:port) for document fetches, avoiding the
    /// public round-trip
    #[arg(long, env = "DOC_SERVER_URL_INTERNAL")]
    pub doc_server_url_internal: Option<String>,

    /// Locale passed to the editor
    #[arg(long, env = "EDITOR_LANG", default_value = "ru")]
    pub editor_lang: String,

    /// Timeout for the save-back document fetch, in seconds
    #[arg(long, env = "FETCH_TIMEOUT_SECS", default_value_t = 30)]
    pub fetch_timeout_secs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_flags() {
        let config = Config::try_parse_from([
            "filehub",
            "--api-key",
            "k",
            "--jwt-secret",
            "s",
        ])
        .unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.editor_lang, "ru");
        assert_eq!(config.fetch_timeout_secs, 30);
        assert!(config.doc_server_url_internal.is_none());
    }

    #[test]
    fn secrets_are_required() {
        assert!(Config::try_parse_from(["filehub"]).is_err());
    }
}
