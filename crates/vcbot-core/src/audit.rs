use std::{
    fs::OpenOptions,
    io::Write,
    path::PathBuf,
};

use chrono::Utc;
use serde::Serialize;

use crate::{
    domain::{ChannelId, GuildId, UserId},
    errors::Error,
    Result,
};

/// RFC3339 timestamp in UTC.
pub fn iso_timestamp_utc() -> String {
    Utc::now().to_rfc3339()
}

#[derive(Clone, Debug, Serialize)]
pub struct AuditEvent {
    pub timestamp: String,
    pub event: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guild_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<f64>,
}

impl AuditEvent {
    fn bare(event: &str) -> Self {
        Self {
            timestamp: iso_timestamp_utc(),
            event: event.to_string(),
            user_id: None,
            guild_id: None,
            channel_id: None,
            source: None,
            name: None,
            retry_after: None,
        }
    }

    pub fn rate_limit(user_id: UserId, source: &str, retry_after: f64) -> Self {
        Self {
            user_id: Some(user_id.0),
            source: Some(source.to_string()),
            retry_after: Some(retry_after),
            ..Self::bare("rate_limit")
        }
    }

    pub fn escalation(user_id: UserId, source: &str) -> Self {
        Self {
            user_id: Some(user_id.0),
            source: Some(source.to_string()),
            ..Self::bare("escalation")
        }
    }

    pub fn channel_created(
        guild_id: GuildId,
        user_id: UserId,
        channel_id: ChannelId,
        name: &str,
    ) -> Self {
        Self {
            user_id: Some(user_id.0),
            guild_id: Some(guild_id.0),
            channel_id: Some(channel_id.0),
            name: Some(name.to_string()),
            ..Self::bare("channel_created")
        }
    }

    pub fn channel_deleted(channel_id: ChannelId) -> Self {
        Self {
            channel_id: Some(channel_id.0),
            ..Self::bare("channel_deleted")
        }
    }
}

/// Append-only audit trail (JSON lines or a readable block format).
#[derive(Clone, Debug)]
pub struct AuditLogger {
    path: PathBuf,
    json: bool,
}

impl AuditLogger {
    pub fn new(path: impl Into<PathBuf>, json: bool) -> Self {
        Self {
            path: path.into(),
            json,
        }
    }

    pub fn write(&self, event: AuditEvent) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        if self.json {
            let line = serde_json::to_string(&event)?;
            writeln!(file, "{line}")?;
            return Ok(());
        }

        let mut out = String::new();
        out.push('\n');
        out.push_str(&"=".repeat(60));

        let value = serde_json::to_value(&event)?;
        let Some(obj) = value.as_object() else {
            return Err(Error::External(
                "audit event is not a JSON object".to_string(),
            ));
        };
        for (k, v) in obj {
            out.push('\n');
            out.push_str(k);
            out.push_str(": ");
            out.push_str(&json_value_to_display(v));
        }
        out.push('\n');

        file.write_all(out.as_bytes())?;
        Ok(())
    }

    /// Write, logging instead of failing.
    pub fn record(&self, event: AuditEvent) {
        if let Err(e) = self.write(event) {
            tracing::warn!("audit write failed: {e}");
        }
    }
}

fn json_value_to_display(v: &serde_json::Value) -> String {
    match v {
        serde_json::Value::Null => "null".to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::String(s) => s.to_string(),
        other => serde_json::to_string(other).unwrap_or_else(|_| "<unprintable>".to_string()),
    }
}
