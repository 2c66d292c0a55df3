use serde::Deserialize;
use tracing_subscriber::{
    fmt, fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

/// LoggingConfig はログ出力の設定。
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
    /// "text" の場合はプレーンテキスト、それ以外は JSON。
    #[serde(default = "default_format")]
    pub format: String,
}

fn default_level() -> String {
    "info".to_string()
}

fn default_format() -> String {
    "json".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: default_format(),
        }
    }
}

/// init_telemetry は tracing-subscriber を初期化する。
/// RUST_LOG が設定されていれば設定ファイルのレベルより優先する。
pub fn init_telemetry(cfg: &LoggingConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.level));
    let registry = tracing_subscriber::registry().with(filter);

    if cfg.format == "text" {
        let fmt_layer = fmt::layer()
            .with_target(true)
            .with_span_events(FmtSpan::CLOSE);
        registry
            .with(fmt_layer)
            .try_init()
            .map_err(|e| anyhow::anyhow!("failed to init telemetry: {}", e))?;
    } else {
        let fmt_layer = fmt::layer()
            .json()
            .with_target(true)
            .with_span_events(FmtSpan::CLOSE);
        registry
            .with(fmt_layer)
            .try_init()
            .map_err(|e| anyhow::anyhow!("failed to init telemetry: {}", e))?;
    }

    Ok(())
}
