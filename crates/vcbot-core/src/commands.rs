//! Admission control for text commands.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use crate::{
    audit::AuditEvent,
    context::BotContext,
    domain::{GuildId, UserId},
    escalation::Source,
    security::Verdict,
    Result,
};

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Admission {
    /// Blocklisted author, or a channel the bot cannot reply in; drop
    /// without a reply.
    Ignore,
    Proceed,
    /// Reply with the retry hint and drop the command.
    Throttled { retry_after: Duration },
    /// Like `Throttled`, and the author has just been blocklisted.
    Escalated { retry_after: Duration },
}

/// A prefixed command split into name and the rest of the line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Invocation<'a> {
    /// Lowercased command name.
    pub name: String,
    pub args: &'a str,
}

/// Parse `content` if it starts with `prefix`. Names are case-insensitive.
pub fn parse_invocation<'a>(content: &'a str, prefix: &str) -> Option<Invocation<'a>> {
    let rest = content.strip_prefix(prefix)?;
    let rest = rest.trim_start();
    if rest.is_empty() {
        return None;
    }
    let (name, args) = match rest.split_once(char::is_whitespace) {
        Some((name, args)) => (name, args.trim()),
        None => (rest, ""),
    };
    Some(Invocation {
        name: name.to_lowercase(),
        args,
    })
}

#[derive(Clone)]
pub struct CommandGate {
    ctx: Arc<BotContext>,
}

impl CommandGate {
    pub fn new(ctx: Arc<BotContext>) -> Self {
        Self { ctx }
    }

    /// Stored prefix for `guild`, or the configured default.
    pub async fn prefix_for(&self, guild_id: GuildId) -> String {
        self.ctx
            .stores
            .prefixes
            .lock()
            .await
            .get(&guild_id)
            .cloned()
            .unwrap_or_else(|| self.ctx.default_prefix.clone())
    }

    pub async fn admit(&self, user_id: UserId, can_reply: bool) -> Result<Admission> {
        self.admit_at(user_id, can_reply, Instant::now()).await
    }

    /// `can_reply` is false when the bot may not post in the command's
    /// channel; such commands are dropped before they cost a token.
    pub async fn admit_at(
        &self,
        user_id: UserId,
        can_reply: bool,
        now: Instant,
    ) -> Result<Admission> {
        if self.ctx.stores.is_blocked(user_id.0).await || !can_reply {
            return Ok(Admission::Ignore);
        }

        let verdict = self.ctx.command_guard.lock().await.check_at(user_id, now);
        match verdict {
            Verdict::Allowed => Ok(Admission::Proceed),
            Verdict::Throttled { retry_after } => {
                self.ctx.audit.record(AuditEvent::rate_limit(
                    user_id,
                    &Source::Commands.to_string(),
                    retry_after.as_secs_f64(),
                ));
                Ok(Admission::Throttled { retry_after })
            }
            Verdict::Escalate { retry_after } => {
                self.ctx.escalate(user_id, Source::Commands).await?;
                Ok(Admission::Escalated { retry_after })
            }
        }
    }
}
