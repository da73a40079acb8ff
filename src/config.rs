use serde::Deserialize;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub data_source: DataSourceConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub anomaly_detection: AnomalyDetectionConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

// ============================================================
// Data Source Config
// ============================================================

#[derive(Debug, Deserialize, Clone)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DataSourceConfig {
    /// Hosted database reached through its `exec_sql` RPC function.
    Gateway(GatewayConfig),
    /// Direct PostgreSQL connection.
    Postgres(PostgresConfig),
}

impl Default for DataSourceConfig {
    fn default() -> Self {
        Self::Gateway(GatewayConfig::default())
    }
}

impl DataSourceConfig {
    pub fn url(&self) -> &str {
        match self {
            Self::Gateway(g) => &g.url,
            Self::Postgres(p) => &p.url,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GatewayConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_rpc_function")]
    pub rpc_function: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            api_key: String::new(),
            rpc_function: default_rpc_function(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_rpc_function() -> String {
    "exec_sql".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct PostgresConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

// ============================================================
// LLM Config
// ============================================================

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_llm_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            api_key: String::new(),
            model: default_llm_model(),
            max_tokens: default_llm_max_tokens(),
            temperature: 0.0,
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_llm_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_llm_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_llm_max_tokens() -> u32 {
    100
}

// ============================================================
// Anomaly Detection Config
// ============================================================

#[derive(Debug, Deserialize, Clone)]
pub struct AnomalyDetectionConfig {
    #[serde(default = "default_revenue_table")]
    pub revenue_table: String,
    #[serde(default = "default_expenses_table")]
    pub expenses_table: String,
    #[serde(default = "default_contamination")]
    pub contamination: f64,
    #[serde(default = "default_n_estimators")]
    pub n_estimators: usize,
    #[serde(default = "default_max_samples")]
    pub max_samples: usize,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for AnomalyDetectionConfig {
    fn default() -> Self {
        Self {
            revenue_table: default_revenue_table(),
            expenses_table: default_expenses_table(),
            contamination: default_contamination(),
            n_estimators: default_n_estimators(),
            max_samples: default_max_samples(),
            seed: default_seed(),
        }
    }
}

fn default_revenue_table() -> String {
    "Revenue".to_string()
}

fn default_expenses_table() -> String {
    "Expenses".to_string()
}

fn default_contamination() -> f64 {
    0.01
}

fn default_n_estimators() -> usize {
    100
}

fn default_max_samples() -> usize {
    256
}

fn default_seed() -> u64 {
    42
}

// ============================================================
// API & Logging Config
// ============================================================

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    #[serde(default = "default_api_port")]
    pub port: u16,
    #[serde(default = "default_api_host")]
    pub host: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: default_api_port(),
            host: default_api_host(),
        }
    }
}

fn default_api_port() -> u16 {
    8000
}

fn default_api_host() -> String {
    "0.0.0.0".to_string()
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
}

impl Config {
    pub fn load(path: &str) -> eyre::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| eyre::eyre!("Failed to read config file '{}': {}", path, e))?;
        let mut config: Config = toml::from_str(&content)
            .map_err(|e| eyre::eyre!("Failed to parse config file '{}': {}", path, e))?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Overlay secrets and endpoints from the environment.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        match &mut self.data_source {
            DataSourceConfig::Gateway(gateway) => {
                if let Some(url) = lookup("SUPABASE_URL") {
                    gateway.url = url;
                }
                if let Some(key) = lookup("SUPABASE_KEY") {
                    gateway.api_key = key;
                }
            }
            DataSourceConfig::Postgres(postgres) => {
                if let Some(url) = lookup("DATABASE_URL") {
                    postgres.url = url;
                }
            }
        }

        if let Some(key) = lookup("OPENAI_API_KEY") {
            self.llm.api_key = key;
        }
    }

    fn validate(&self) -> eyre::Result<()> {
        if self.data_source.url().trim().is_empty() {
            return Err(eyre::eyre!(
                "A data source URL must be configured (config file, SUPABASE_URL or DATABASE_URL)"
            ));
        }

        let anomaly = &self.anomaly_detection;
        if !(anomaly.contamination > 0.0 && anomaly.contamination <= 0.5) {
            return Err(eyre::eyre!(
                "anomaly_detection.contamination must be in (0, 0.5], got {}",
                anomaly.contamination
            ));
        }
        if anomaly.n_estimators == 0 {
            return Err(eyre::eyre!("anomaly_detection.n_estimators must be at least 1"));
        }
        if anomaly.max_samples < 2 {
            return Err(eyre::eyre!("anomaly_detection.max_samples must be at least 2"));
        }
        for table in [&anomaly.revenue_table, &anomaly.expenses_table] {
            if !is_sql_identifier(table) {
                return Err(eyre::eyre!("Invalid table name '{}'", table));
            }
        }
        Ok(())
    }
}

/// Plain (optionally schema-qualified) identifier, safe to splice into fixed SQL.
fn is_sql_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}
