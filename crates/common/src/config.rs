use crate::window::DEFAULT_MAX_PAGE_SIZE;
use crate::TradingMode;

const DEFAULT_UPBIT_BASE_URL: &str = "https://api.upbit.com";

/// All configuration loaded from environment variables at startup.
/// Missing required variables cause an immediate panic with a clear message.
#[derive(Debug, Clone)]
pub struct Config {
    // Trading
    pub trading_mode: TradingMode,
    pub cycle_interval_secs: u64,

    // Exchange
    pub upbit_base_url: String,
    pub max_page_size: u32,
    pub http_timeout_secs: u64,

    // Credentials. The key pair id is the handle passed on every exchange
    // call; the keys are only needed when trading live.
    pub key_pair_id: String,
    pub upbit_access_key: Option<String>,
    pub upbit_secret_key: Option<String>,

    // Paper trading
    pub paper_slippage_bps: f64,

    // Strategy config file path
    pub strategy_config_path: String,
}

impl Config {
    /// Load all configuration from environment variables.
    /// Loads `.env` if present. Panics on any missing required variable.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv(); // ignore error if .env not present

        let trading_mode = match required_env("TRADING_MODE").to_lowercase().as_str() {
            "paper" => TradingMode::Paper,
            "live" => TradingMode::Live,
            other => panic!("ERROR: TRADING_MODE must be 'paper' or 'live', got: '{other}'"),
        };

        let (upbit_access_key, upbit_secret_key) = match trading_mode {
            TradingMode::Live => (
                Some(required_env("UPBIT_ACCESS_KEY")),
                Some(required_env("UPBIT_SECRET_KEY")),
            ),
            TradingMode::Paper => (optional_env("UPBIT_ACCESS_KEY"), optional_env("UPBIT_SECRET_KEY")),
        };

        let max_page_size = parsed_env("MAX_PAGE_SIZE", DEFAULT_MAX_PAGE_SIZE);
        if max_page_size == 0 {
            panic!("MAX_PAGE_SIZE must be at least 1");
        }

        Config {
            trading_mode,
            cycle_interval_secs: parsed_env("CYCLE_INTERVAL_SECS", 60),
            upbit_base_url: optional_env("UPBIT_BASE_URL")
                .unwrap_or_else(|| DEFAULT_UPBIT_BASE_URL.to_string()),
            max_page_size,
            http_timeout_secs: parsed_env("HTTP_TIMEOUT_SECS", 10),
            key_pair_id: optional_env("KEY_PAIR_ID").unwrap_or_else(|| "default".to_string()),
            upbit_access_key,
            upbit_secret_key,
            paper_slippage_bps: parsed_env("PAPER_SLIPPAGE_BPS", 10.0),
            strategy_config_path: optional_env("STRATEGY_CONFIG_PATH")
                .unwrap_or_else(|| "config/strategies.toml".to_string()),
        }
    }
}

fn required_env(key: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| {
        panic!("Required environment variable '{key}' is not set. Check your .env file.")
    })
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn parsed_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    match optional_env(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .unwrap_or_else(|_| panic!("Environment variable '{key}' has an invalid value: '{raw}'")),
        None => default,
    }
}
