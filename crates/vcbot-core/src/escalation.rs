//! What happens to users that keep hitting a rate limit.

use std::{fmt, time::Duration};

use tracing::{debug, info, warn};

use crate::{
    audit::AuditEvent,
    context::BotContext,
    domain::UserId,
    Result,
};

/// Which spam guard produced the violation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Source {
    Voice,
    Commands,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Voice => f.write_str("voice"),
            Source::Commands => f.write_str("commands"),
        }
    }
}

pub fn rate_limit_message(retry_after: Duration) -> String {
    format!(
        "You are being rate limited. Try again in `{:.2}` seconds.",
        retry_after.as_secs_f64()
    )
}

pub const BLOCKED_MESSAGE: &str =
    "You have been blocked from using this bot after repeatedly hitting its rate limits.";

impl BotContext {
    /// Blocklist `user_id` (idempotent), persist, then try to tell them.
    ///
    /// Returns whether the blocklist changed. Only the store save can fail.
    pub async fn escalate(&self, user_id: UserId, source: Source) -> Result<bool> {
        let added = {
            let mut blacklist = self.stores.blacklist.lock().await;
            let added = blacklist.append_unique(user_id.0);
            if added {
                blacklist.save().await?;
            }
            added
        };

        if added {
            info!(user = %user_id, %source, "user blocklisted after repeated rate limit violations");
            self.audit.record(AuditEvent::escalation(user_id, &source.to_string()));
            self.notify(user_id, BLOCKED_MESSAGE).await;
        }

        Ok(added)
    }

    /// Rate-limit hint for sources without a reply channel (voice joins).
    pub async fn notify_rate_limited(&self, user_id: UserId, source: Source, retry_after: Duration) {
        self.audit.record(AuditEvent::rate_limit(
            user_id,
            &source.to_string(),
            retry_after.as_secs_f64(),
        ));
        self.notify(user_id, &rate_limit_message(retry_after)).await;
    }

    /// Best-effort DM; failures never leave this function.
    pub async fn notify(&self, user_id: UserId, text: &str) {
        match self
            .platform
            .notifier
            .send_direct_message(user_id, text)
            .await
        {
            Ok(()) => {}
            Err(e) if e.is_forbidden() => {
                debug!(user = %user_id, "direct messages closed: {e}");
            }
            Err(e) => {
                warn!(user = %user_id, "direct message failed: {e}");
            }
        }
    }
}
