use dotenvy::dotenv;
use once_cell::sync::Lazy;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

pub static CONFIG: Lazy<Config> = Lazy::new(|| {
    dotenv().ok(); // Load .env file if present
    Config {
        mongo_uri: get_env_opt("MONGO_URI"),
        mongo_db_name: get_env_or_default("MONGO_DB_NAME", "mentions"),
        fetch_timeout_secs: get_env_parsed("FETCH_TIMEOUT_SECS", 10),
        user_agent: get_env_or_default(
            "USER_AGENT",
            "Mozilla/5.0 (compatible; MentionScope/0.1; +https://example.com)",
        ),
        search_endpoint: get_env_or_default(
            "SEARCH_ENDPOINT",
            "https://html.duckduckgo.com/html/",
        ),
        max_terms: get_env_parsed("MAX_TERMS", 5),
        min_word_len: get_env_parsed("MIN_WORD_LEN", 2),
        stop_words_path: get_env_opt("STOP_WORDS_PATH").map(PathBuf::from),
        bind_addr: get_env_or_default("BIND_ADDR", "0.0.0.0:3000"),
    }
});

pub struct Config {
    pub mongo_uri: Option<String>,
    pub mongo_db_name: String,
    pub fetch_timeout_secs: u64,
    pub user_agent: String,
    pub search_endpoint: String,
    pub max_terms: usize,
    pub min_word_len: usize,
    pub stop_words_path: Option<PathBuf>,
    pub bind_addr: String,
}

fn get_env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn get_env_or_default(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn get_env_parsed<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            log::warn!("ignoring unparsable value for {key}: {raw:?}");
            default
        }),
        Err(_) => default,
    }
}
