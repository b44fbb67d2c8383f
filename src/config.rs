use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_PORT: u16 = 5433;
pub const DEFAULT_BIND: &str = "0.0.0.0";
pub const DEFAULT_DATA_DIR: &str = "./data";
pub const DEFAULT_PASSWORD: &str = "covers";
pub const DEFAULT_MAX_CONNECTIONS: usize = 256;
pub const DEFAULT_COMPACT_THRESHOLD: u64 = 1000;
pub const DEFAULT_NOTIFY_ATTEMPTS: u32 = 3;

/// Server settings, read once at startup from `COVERS_*` environment
/// variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub port: u16,
    pub bind: String,
    pub data_dir: PathBuf,
    pub password: String,
    pub max_connections: usize,
    pub compact_threshold: u64,
    pub notify_attempts: u32,
    pub tls_cert: Option<String>,
    pub tls_key: Option<String>,
    pub metrics_port: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Exactly one of the certificate and key paths was set.
    IncompleteTls,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::IncompleteTls => {
                write!(f, "COVERS_TLS_CERT and COVERS_TLS_KEY must be set together")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Numbers that don't parse fall back to
    /// their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let text = |key: &str| lookup(key).filter(|s| !s.is_empty());

        let tls_cert = text("COVERS_TLS_CERT");
        let tls_key = text("COVERS_TLS_KEY");
        if tls_cert.is_some() != tls_key.is_some() {
            return Err(ConfigError::IncompleteTls);
        }

        Ok(Self {
            port: parsed(&lookup, "COVERS_PORT").unwrap_or(DEFAULT_PORT),
            bind: text("COVERS_BIND").unwrap_or_else(|| DEFAULT_BIND.into()),
            data_dir: text("COVERS_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR)),
            password: text("COVERS_PASSWORD").unwrap_or_else(|| DEFAULT_PASSWORD.into()),
            max_connections: parsed(&lookup, "COVERS_MAX_CONNECTIONS")
                .filter(|n| *n > 0)
                .unwrap_or(DEFAULT_MAX_CONNECTIONS),
            compact_threshold: parsed(&lookup, "COVERS_COMPACT_THRESHOLD")
                .unwrap_or(DEFAULT_COMPACT_THRESHOLD),
            notify_attempts: parsed(&lookup, "COVERS_NOTIFY_ATTEMPTS")
                .filter(|n| *n > 0)
                .unwrap_or(DEFAULT_NOTIFY_ATTEMPTS),
            tls_cert,
            tls_key,
            metrics_port: parsed(&lookup, "COVERS_METRICS_PORT"),
        })
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("covers.wal")
    }
}

/// A number from the lookup, or `None` when unset or unparsable.
fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|s| s.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        let cfg = config_from(&[]).unwrap();
        assert_eq!(cfg.port, 5433);
        assert_eq!(cfg.listen_addr(), "0.0.0.0:5433");
        assert_eq!(cfg.data_dir, PathBuf::from("./data"));
        assert_eq!(cfg.password, "covers");
        assert_eq!(cfg.max_connections, 256);
        assert_eq!(cfg.compact_threshold, 1000);
        assert_eq!(cfg.notify_attempts, 3);
        assert_eq!(cfg.tls_cert, None);
        assert_eq!(cfg.metrics_port, None);
    }

    #[test]
    fn each_number_parses_at_its_own_width() {
        let cfg = config_from(&[
            ("COVERS_PORT", "6000"),
            ("COVERS_MAX_CONNECTIONS", "70000"),
            ("COVERS_COMPACT_THRESHOLD", "5000000000"),
            ("COVERS_NOTIFY_ATTEMPTS", "7"),
        ])
        .unwrap();
        assert_eq!(cfg.port, 6000u16);
        assert_eq!(cfg.max_connections, 70_000usize);
        assert_eq!(cfg.compact_threshold, 5_000_000_000u64);
        assert_eq!(cfg.notify_attempts, 7u32);
    }

    #[test]
    fn overrides_are_read() {
        let cfg = config_from(&[
            ("COVERS_PORT", "6543"),
            ("COVERS_BIND", "127.0.0.1"),
            ("COVERS_DATA_DIR", "/var/lib/covers"),
            ("COVERS_PASSWORD", "s3cret"),
            ("COVERS_MAX_CONNECTIONS", " 32 "),
            ("COVERS_METRICS_PORT", "9100"),
        ])
        .unwrap();
        assert_eq!(cfg.listen_addr(), "127.0.0.1:6543");
        assert_eq!(cfg.wal_path(), PathBuf::from("/var/lib/covers/covers.wal"));
        assert_eq!(cfg.password, "s3cret");
        assert_eq!(cfg.max_connections, 32);
        assert_eq!(cfg.metrics_port, Some(9100));
    }

    #[test]
    fn unparsable_numbers_fall_back() {
        let cfg = config_from(&[
            ("COVERS_PORT", "eighty"),
            ("COVERS_MAX_CONNECTIONS", "0"),
            ("COVERS_COMPACT_THRESHOLD", "-5"),
            ("COVERS_METRICS_PORT", "99999"),
        ])
        .unwrap();
        assert_eq!(cfg.port, DEFAULT_PORT);
        assert_eq!(cfg.max_connections, DEFAULT_MAX_CONNECTIONS);
        assert_eq!(cfg.compact_threshold, DEFAULT_COMPACT_THRESHOLD);
        assert_eq!(cfg.metrics_port, None);
    }

    #[test]
    fn tls_needs_both_paths() {
        assert_eq!(
            config_from(&[("COVERS_TLS_CERT", "cert.pem")]),
            Err(ConfigError::IncompleteTls)
        );
        let cfg = config_from(&[("COVERS_TLS_CERT", "cert.pem"), ("COVERS_TLS_KEY", "key.pem")]).unwrap();
        assert_eq!(cfg.tls_key.as_deref(), Some("key.pem"));
    }
}
