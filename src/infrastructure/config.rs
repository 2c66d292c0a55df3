use std::collections::HashMap;

use secrecy::SecretString;
use serde::Deserialize;

use crate::infrastructure::database::DatabaseConfig;
use crate::infrastructure::telemetry::LoggingConfig;

/// Config はアプリケーション全体の設定。
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub database: Option<DatabaseConfig>,
    #[serde(default)]
    pub erp_database: Option<ErpDatabaseConfig>,
    /// 会社 ID（小文字）から ERP データベース名への対応表。
    #[serde(default)]
    pub erp_db_mapping: HashMap<String, String>,
    pub signature: SignatureConfig,
    #[serde(default)]
    pub ingestion: IngestionConfig,
    #[serde(default)]
    pub definitions: DefinitionsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// CONFIG_PATH（既定: config/config.yaml）から設定を読み込む。
    pub fn load() -> anyhow::Result<Self> {
        let path =
            std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config/config.yaml".to_string());
        let content = std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("failed to read config {}: {}", path, e))?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }
}

/// AppConfig はアプリケーション設定。
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default = "default_environment")]
    pub environment: String,
}

fn default_version() -> String {
    "0.1.0".to_string()
}

fn default_environment() -> String {
    "dev".to_string()
}

/// ServerConfig はサーバー設定。
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

/// ErpDatabaseConfig は ERP 側データベースの接続設定。
#[derive(Debug, Clone, Deserialize)]
pub struct ErpDatabaseConfig {
    #[serde(flatten)]
    pub connection: DatabaseConfig,
    /// ジョブキューテーブル（EFJobQue）が置かれたスキーマ。
    #[serde(default = "default_queue_schema")]
    pub queue_schema: String,
}

fn default_queue_schema() -> String {
    "DSCSYS".to_string()
}

/// SignatureConfig は監査ログ署名の設定。
#[derive(Debug, Clone, Deserialize)]
pub struct SignatureConfig {
    pub secret: SecretString,
}

/// DefinitionsConfig は起動時に読み込む承認フロー定義の設定。
#[derive(Debug, Clone, Deserialize)]
pub struct DefinitionsConfig {
    #[serde(default = "default_definition_dir")]
    pub dir: String,
}

fn default_definition_dir() -> String {
    "config/definitions".to_string()
}

impl Default for DefinitionsConfig {
    fn default() -> Self {
        Self {
            dir: default_definition_dir(),
        }
    }
}

/// IngestionConfig は ERP 受信ブリッジの設定。
#[derive(Debug, Clone, Deserialize)]
pub struct IngestionConfig {
    /// ユーザーコードを解決できない場合に使う代替 ID。
    #[serde(default = "default_fallback_user_id")]
    pub fallback_user_id: String,
    #[serde(default = "default_fallback_id")]
    pub fallback_department_id: i64,
    #[serde(default = "default_fallback_id")]
    pub fallback_factory_id: i64,
    #[serde(default = "default_ack_queue_capacity")]
    pub ack_queue_capacity: usize,
    #[serde(default = "default_client_ip")]
    pub client_ip: String,
    #[serde(default = "default_device_info")]
    pub device_info: String,
    #[serde(default = "default_ack_message")]
    pub ack_message: String,
}

fn default_fallback_user_id() -> String {
    "1".to_string()
}

fn default_fallback_id() -> i64 {
    1
}

fn default_ack_queue_capacity() -> usize {
    256
}

fn default_client_ip() -> String {
    "ERP_SOAP".to_string()
}

fn default_device_info() -> String {
    "ERP_SYSTEM".to_string()
}

fn default_ack_message() -> String {
    "Received by k1s0-approval".to_string()
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            fallback_user_id: default_fallback_user_id(),
            fallback_department_id: default_fallback_id(),
            fallback_factory_id: default_fallback_id(),
            ack_queue_capacity: default_ack_queue_capacity(),
            client_ip: default_client_ip(),
            device_info: default_device_info(),
            ack_message: default_ack_message(),
        }
    }
}
