use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{errors::Error, security::DEFAULT_ESCALATION_THRESHOLD, Result};

/// Capacity / period pair for one rate limiter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LimitConfig {
    pub capacity: u32,
    pub period: Duration,
}

/// Typed configuration, read from the environment (and an optional `.env`).
#[derive(Clone, Debug)]
pub struct Config {
    pub discord_token: String,
    pub default_prefix: String,
    pub data_dir: PathBuf,

    // Rate limiting
    pub voice_limit: LimitConfig,
    pub command_limit: LimitConfig,
    pub escalation_threshold: u32,

    // Audit
    pub audit_log_path: PathBuf,
    pub audit_log_json: bool,
}

impl Config {
    /// `token` (from the command line) takes precedence over `DISCORD_TOKEN`.
    pub fn load(token: Option<String>) -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        let discord_token = resolve_token(token, env_str("DISCORD_TOKEN"))?;

        let default_prefix = env_str("DEFAULT_PREFIX")
            .and_then(non_empty)
            .unwrap_or_else(|| "!".to_string());
        let data_dir = env_path("DATA_DIR").unwrap_or_else(|| PathBuf::from("data"));

        let voice_limit = LimitConfig {
            capacity: env_u32("VOICE_RATE_LIMIT").unwrap_or(2),
            period: Duration::from_secs(env_u64("VOICE_RATE_WINDOW").unwrap_or(10)),
        };
        let command_limit = LimitConfig {
            capacity: env_u32("COMMAND_RATE_LIMIT").unwrap_or(8),
            period: Duration::from_secs(env_u64("COMMAND_RATE_WINDOW").unwrap_or(10)),
        };
        let escalation_threshold =
            env_u32("ESCALATION_THRESHOLD").unwrap_or(DEFAULT_ESCALATION_THRESHOLD);

        let audit_log_path =
            env_path("AUDIT_LOG_PATH").unwrap_or_else(|| data_dir.join("audit.log"));
        let audit_log_json = env_bool("AUDIT_LOG_JSON").unwrap_or(false);

        Ok(Self {
            discord_token,
            default_prefix,
            data_dir,
            voice_limit,
            command_limit,
            escalation_threshold,
            audit_log_path,
            audit_log_json,
        })
    }

    /// Move the data directory, keeping a default audit log next to it.
    pub fn with_data_dir(mut self, dir: PathBuf) -> Self {
        if self.audit_log_path == self.data_dir.join("audit.log") {
            self.audit_log_path = dir.join("audit.log");
        }
        self.data_dir = dir;
        self
    }
}

fn resolve_token(explicit: Option<String>, from_env: Option<String>) -> Result<String> {
    explicit
        .and_then(non_empty)
        .or_else(|| from_env.and_then(non_empty))
        .ok_or_else(|| Error::Config("DISCORD_TOKEN environment variable is required".to_string()))
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for (key, val) in parse_dotenv(&contents) {
        if env::var_os(&key).is_some() {
            continue; // do not override existing env
        }
        env::set_var(key, val);
    }
}

fn parse_dotenv(contents: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        out.push((key.to_string(), val));
    }
    out
}

fn env_bool(key: &str) -> Option<bool> {
    env_str(key).map(|s| parse_bool(&s))
}

fn parse_bool(s: &str) -> bool {
    matches!(
        s.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_u32(key: &str) -> Option<u32> {
    env_str(key).and_then(|s| s.trim().parse::<u32>().ok())
}

fn env_path(key: &str) -> Option<PathBuf> {
    env::var_os(key).map(PathBuf::from)
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
