//! Sync configuration: optional TOML file plus environment overrides.
//!
//! Credentials are normally injected by CI as `FEISHU_APP_ID`,
//! `FEISHU_APP_SECRET`, `FEISHU_APP_TOKEN` (`FEISHU_BASE_TOKEN` is accepted
//! as a legacy alias) and `FEISHU_TABLE_ID`. Anything missing from both the
//! file and the environment is a fatal config error, raised before any
//! network activity.

use std::path::Path;
use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;

use crate::error::SyncError;

pub const ENV_APP_ID: &str = "FEISHU_APP_ID";
pub const ENV_APP_SECRET: &str = "FEISHU_APP_SECRET";
pub const ENV_APP_TOKEN: &str = "FEISHU_APP_TOKEN";
pub const ENV_BASE_TOKEN: &str = "FEISHU_BASE_TOKEN";
pub const ENV_TABLE_ID: &str = "FEISHU_TABLE_ID";

const DEFAULT_API_BASE: &str = "https://open.feishu.cn";
const DEFAULT_QUOTE_BASE: &str = "https://query1.finance.yahoo.com";

fn default_symbol_field() -> String {
    "symbol".to_string()
}

fn default_price_field() -> String {
    "price".to_string()
}

fn default_updated_field() -> String {
    "updated_at".to_string()
}

/// Names of the three table columns the sync reads and writes.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FieldNames {
    /// Column holding the instrument identifier (read).
    pub symbol: String,
    /// Column receiving the latest price (written).
    pub price: String,
    /// Column receiving the observation timestamp (written).
    pub updated_at: String,
}

impl Default for FieldNames {
    fn default() -> Self {
        Self {
            symbol: default_symbol_field(),
            price: default_price_field(),
            updated_at: default_updated_field(),
        }
    }
}

/// On-disk configuration file shape. Everything is optional here; required
/// values are enforced after environment overrides are applied.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    app_id: Option<String>,
    app_secret: Option<String>,
    app_token: Option<String>,
    table_id: Option<String>,
    api_base: Option<String>,
    quote_base: Option<String>,
    fields: FieldNames,
    page_size: Option<u32>,
    lookup_delay_ms: Option<u64>,
    lookup_concurrency: Option<usize>,
    write_concurrency: Option<usize>,
    request_timeout_secs: Option<u64>,
}

/// Fully resolved configuration for one sync pass.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub app_id: SecretString,
    pub app_secret: SecretString,
    /// Bitable app token (identifies the base).
    pub app_token: String,
    pub table_id: String,
    pub api_base: String,
    pub quote_base: String,
    pub fields: FieldNames,
    pub page_size: u32,
    /// Courtesy spacing between quote lookups, per worker.
    pub lookup_delay: Duration,
    pub lookup_concurrency: usize,
    pub write_concurrency: usize,
    /// Per-request deadline applied to every HTTP call when set.
    pub request_timeout: Option<Duration>,
}

impl SyncConfig {
    /// Load configuration from an optional TOML file, applying environment
    /// overrides. A missing file is fine; a malformed one is not.
    pub fn load(path: &Path) -> Result<Self, SyncError> {
        let file = if path.exists() {
            let raw = std::fs::read_to_string(path).map_err(|e| {
                SyncError::Config(format!("failed to read {}: {e}", path.display()))
            })?;
            toml::from_str(&raw).map_err(|e| {
                SyncError::Config(format!("failed to parse {}: {e}", path.display()))
            })?
        } else {
            ConfigFile::default()
        };

        Self::resolve(file, |key| std::env::var(key).ok())
    }

    fn resolve(
        file: ConfigFile,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, SyncError> {
        let app_id = env(ENV_APP_ID)
            .or(file.app_id)
            .ok_or_else(|| missing(ENV_APP_ID, "app_id"))?;
        let app_secret = env(ENV_APP_SECRET)
            .or(file.app_secret)
            .ok_or_else(|| missing(ENV_APP_SECRET, "app_secret"))?;
        let app_token = env(ENV_APP_TOKEN)
            .or_else(|| env(ENV_BASE_TOKEN))
            .or(file.app_token)
            .ok_or_else(|| missing(ENV_APP_TOKEN, "app_token"))?;
        let table_id = env(ENV_TABLE_ID)
            .or(file.table_id)
            .ok_or_else(|| missing(ENV_TABLE_ID, "table_id"))?;

        let page_size = file.page_size.unwrap_or(100);
        if page_size == 0 {
            return Err(SyncError::Config("page_size must be at least 1".to_string()));
        }

        Ok(Self {
            app_id: SecretString::from(app_id),
            app_secret: SecretString::from(app_secret),
            app_token,
            table_id,
            api_base: file.api_base.unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            quote_base: file
                .quote_base
                .unwrap_or_else(|| DEFAULT_QUOTE_BASE.to_string()),
            fields: file.fields,
            page_size,
            lookup_delay: Duration::from_millis(file.lookup_delay_ms.unwrap_or(200)),
            lookup_concurrency: file.lookup_concurrency.unwrap_or(4),
            write_concurrency: file.write_concurrency.unwrap_or(4),
            request_timeout: file.request_timeout_secs.map(Duration::from_secs),
        })
    }
}

fn missing(env_key: &str, file_key: &str) -> SyncError {
    SyncError::Config(format!(
        "missing {file_key}: set {env_key} or add {file_key} to the config file"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn full_file() -> ConfigFile {
        toml::from_str(
            r#"
            app_id = "cli_x"
            app_secret = "s3cret"
            app_token = "bascn_x"
            table_id = "tbl_x"
            "#,
        )
        .unwrap()
    }

    #[test]
    fn defaults_are_applied() {
        let config = SyncConfig::resolve(full_file(), no_env).unwrap();
        assert_eq!(config.fields.symbol, "symbol");
        assert_eq!(config.fields.price, "price");
        assert_eq!(config.fields.updated_at, "updated_at");
        assert_eq!(config.page_size, 100);
        assert_eq!(config.lookup_delay, Duration::from_millis(200));
        assert_eq!(config.lookup_concurrency, 4);
        assert_eq!(config.api_base, DEFAULT_API_BASE);
        assert!(config.request_timeout.is_none());
    }

    #[test]
    fn missing_app_id_is_config_error() {
        let mut file = full_file();
        file.app_id = None;
        let err = SyncConfig::resolve(file, no_env).unwrap_err();
        assert!(matches!(err, SyncError::Config(_)));
        assert!(err.to_string().contains("FEISHU_APP_ID"));
    }

    #[test]
    fn environment_overrides_file() {
        let config = SyncConfig::resolve(full_file(), |key| {
            (key == ENV_TABLE_ID).then(|| "tbl_from_env".to_string())
        })
        .unwrap();
        assert_eq!(config.table_id, "tbl_from_env");
    }

    #[test]
    fn base_token_alias_is_accepted() {
        let mut file = full_file();
        file.app_token = None;
        let config = SyncConfig::resolve(file, |key| {
            (key == ENV_BASE_TOKEN).then(|| "bascn_legacy".to_string())
        })
        .unwrap();
        assert_eq!(config.app_token, "bascn_legacy");
    }

    #[test]
    fn custom_field_names_parse() {
        let file: ConfigFile = toml::from_str(
            r#"
            app_id = "cli_x"
            app_secret = "s3cret"
            app_token = "bascn_x"
            table_id = "tbl_x"
            lookup_delay_ms = 50
            request_timeout_secs = 30

            [fields]
            symbol = "代码"
            price = "最新价"
            updated_at = "更新时间"
            "#,
        )
        .unwrap();
        let config = SyncConfig::resolve(file, no_env).unwrap();
        assert_eq!(config.fields.symbol, "代码");
        assert_eq!(config.fields.price, "最新价");
        assert_eq!(config.lookup_delay, Duration::from_millis(50));
        assert_eq!(config.request_timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn zero_page_size_rejected() {
        let mut file = full_file();
        file.page_size = Some(0);
        assert!(SyncConfig::resolve(file, no_env).is_err());
    }
}
