//! Server configuration.
//!
//! Every setting can be given as a command-line flag or an environment variable.

use std::time::Duration;

use clap::Parser;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("unsupported store '{0}': only memory:// is built in")]
    UnsupportedStore(String),

    #[error("invalid value for {name}: {reason}")]
    InvalidValue { name: &'static str, reason: String },
}

/// Backing store of conversations, messages and delivery records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Memory,
}

impl StoreKind {
    /// Parse a store connection string such as `memory://`.
    pub fn parse(url: &str) -> Result<Self, ConfigError> {
        match url.split_once("://") {
            Some(("memory", _)) => Ok(Self::Memory),
            _ => Err(ConfigError::UnsupportedStore(url.to_string())),
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(name = "chatter-server")]
#[command(about = "Real-time conversation synchronization server", long_about = None)]
pub struct ServerConfig {
    /// Host address to bind the server to
    #[arg(short = 'H', long, env = "CHATTER_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Port number to bind the server to
    #[arg(short = 'p', long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    /// Durable store connection string
    #[arg(long, env = "CHATTER_STORE_URL", default_value = "memory://")]
    pub store_url: String,

    /// Messages per resync batch
    #[arg(long, env = "CHATTER_RESYNC_PAGE_SIZE", default_value_t = 100)]
    pub resync_page_size: usize,

    /// Upper bound for any page of messages
    #[arg(long, env = "CHATTER_MAX_PAGE_SIZE", default_value_t = 500)]
    pub max_page_size: usize,

    /// How long a user stays online after their last connection closes
    #[arg(long, env = "CHATTER_PRESENCE_GRACE_MS", default_value_t = 5_000)]
    pub presence_grace_ms: u64,

    /// How long an append may wait for the store
    #[arg(long, env = "CHATTER_PERSIST_TIMEOUT_MS", default_value_t = 5_000)]
    pub persist_timeout_ms: u64,

    /// How long a push may wait for a connection's outbound buffer
    #[arg(long, env = "CHATTER_SEND_TIMEOUT_MS", default_value_t = 2_000)]
    pub send_timeout_ms: u64,

    /// Frames buffered per connection
    #[arg(long, env = "CHATTER_OUTBOUND_BUFFER", default_value_t = 256)]
    pub outbound_buffer: usize,

    /// Seconds of silence after which a connection counts as idle
    #[arg(long, env = "CHATTER_IDLE_AFTER_SECS", default_value_t = 60)]
    pub idle_after_secs: u64,

    /// Default log level when RUST_LOG is not set
    #[arg(long, env = "CHATTER_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl ServerConfig {
    pub fn engine_config(&self) -> Result<EngineConfig, ConfigError> {
        let config = EngineConfig {
            store: StoreKind::parse(&self.store_url)?,
            resync_page_size: self.resync_page_size,
            max_page_size: self.max_page_size,
            presence_grace: Duration::from_millis(self.presence_grace_ms),
            persist_timeout: Duration::from_millis(self.persist_timeout_ms),
            send_timeout: Duration::from_millis(self.send_timeout_ms),
            outbound_buffer: self.outbound_buffer,
            idle_after: Duration::from_secs(self.idle_after_secs),
        };
        config.validate()?;
        Ok(config)
    }
}

/// Settings consumed by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub store: StoreKind,
    pub resync_page_size: usize,
    pub max_page_size: usize,
    pub presence_grace: Duration,
    pub persist_timeout: Duration,
    pub send_timeout: Duration,
    pub outbound_buffer: usize,
    pub idle_after: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            store: StoreKind::Memory,
            resync_page_size: 100,
            max_page_size: 500,
            presence_grace: Duration::from_secs(5),
            persist_timeout: Duration::from_secs(5),
            send_timeout: Duration::from_secs(2),
            outbound_buffer: 256,
            idle_after: Duration::from_secs(60),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.resync_page_size == 0 {
            return Err(invalid("resync_page_size", "must be at least 1"));
        }
        if self.max_page_size < self.resync_page_size {
            return Err(invalid(
                "max_page_size",
                "must not be smaller than resync_page_size",
            ));
        }
        if self.outbound_buffer == 0 {
            return Err(invalid("outbound_buffer", "must be at least 1"));
        }
        if self.persist_timeout.is_zero() {
            return Err(invalid("persist_timeout", "must be positive"));
        }
        if self.send_timeout.is_zero() {
            return Err(invalid("send_timeout", "must be positive"));
        }
        Ok(())
    }
}

fn invalid(name: &'static str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        name,
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> ServerConfig {
        ServerConfig::try_parse_from(std::iter::once("chatter-server").chain(args.iter().copied()))
            .unwrap()
    }

    #[test]
    fn test_flags_override_defaults() {
        // テスト項目: コマンドライン引数で設定を上書きできる
        // given (前提条件):
        let config = parse(&["--port", "9000", "--presence-grace-ms", "250"]);

        // when (操作):
        let engine = config.engine_config().unwrap();

        // then (期待する結果):
        assert_eq!(config.port, 9000);
        assert_eq!(engine.presence_grace, Duration::from_millis(250));
        assert_eq!(engine.store, StoreKind::Memory);
    }

    #[test]
    fn test_unsupported_store_is_rejected() {
        // テスト項目: memory:// 以外のストアは設定エラーになる
        // given (前提条件):
        let config = parse(&["--store-url", "postgres://localhost/chatter"]);

        // when (操作):
        let result = config.engine_config();

        // then (期待する結果):
        assert_eq!(
            result,
            Err(ConfigError::UnsupportedStore(
                "postgres://localhost/chatter".to_string()
            ))
        );
    }

    #[test]
    fn test_page_sizes_are_validated() {
        // テスト項目: 最大ページサイズが再同期のページサイズより小さいとエラーになる
        // given (前提条件):
        let config = EngineConfig {
            resync_page_size: 100,
            max_page_size: 10,
            ..EngineConfig::default()
        };

        // when (操作):
        let result = config.validate();

        // then (期待する結果):
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue {
                name: "max_page_size",
                ..
            })
        ));
    }

    #[test]
    fn test_default_engine_config_is_valid() {
        // テスト項目: デフォルト設定は検証を通る
        // given (前提条件):
        let config = EngineConfig::default();

        // when (操作):
        let result = config.validate();

        // then (期待する結果):
        assert!(result.is_ok());
    }
}
