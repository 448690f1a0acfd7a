//! Gateway event handlers.
//!
//! Each handler pulls the shared [`AppState`] out of the client data, converts
//! serenity models into core types and hands off to `vcbot-core`.

use std::sync::Arc;

use serenity::async_trait;
use serenity::model::channel::{GuildChannel, Message};
use serenity::model::event::MessageUpdateEvent;
use serenity::model::gateway::Ready;
use serenity::model::guild::{Guild, UnavailableGuild};
use serenity::model::id::{ChannelId as DcChannelId, GuildId as DcGuildId};
use serenity::model::user::User;
use serenity::model::voice::VoiceState;
use serenity::prelude::*;
use tracing::{error, info, warn};

use vcbot_core::{
    commands::{parse_invocation, Admission},
    domain::{ChannelId, GuildId, UserId, VoiceTransition},
    escalation::rate_limit_message,
};

use crate::router::AppState;

mod commands;

pub struct Handler;

async fn app_state(ctx: &Context) -> Option<Arc<AppState>> {
    let data = ctx.data.read().await;
    let state = data.get::<AppState>().cloned();
    if state.is_none() {
        error!("AppState not found in context data");
    }
    state
}

/// Text of an edit worth running again: a real edit whose content changed.
///
/// `before` is only known when the old message was still cached.
fn edited_content<'a>(before: Option<&str>, after: Option<&'a str>, edited: bool) -> Option<&'a str> {
    let after = after?;
    if !edited || before == Some(after) {
        return None;
    }
    Some(after)
}

/// Shared by new and edited messages.
async fn run_command(
    ctx: &Context,
    guild_id: DcGuildId,
    channel_id: DcChannelId,
    author: &User,
    content: &str,
) {
    if author.bot {
        return;
    }
    let Some(state) = app_state(ctx).await else {
        return;
    };

    let guild = GuildId(guild_id.get());
    let prefix = state.gate.prefix_for(guild).await;
    let Some(inv) = parse_invocation(content, &prefix) else {
        return;
    };
    let Some(command) = commands::parse_command(&inv.name, inv.args) else {
        return;
    };

    let author_id = UserId(author.id.get());
    let can_reply = state.platform.can_send_in(guild, channel_id);
    let reply = match state.gate.admit(author_id, can_reply).await {
        Ok(Admission::Ignore) => return,
        Ok(Admission::Proceed) => {
            commands::execute(&state, guild, author_id, command, &prefix).await
        }
        Ok(Admission::Throttled { retry_after } | Admission::Escalated { retry_after }) => {
            rate_limit_message(retry_after)
        }
        Err(e) => {
            warn!(user = %author_id, "command admission failed: {e}");
            return;
        }
    };

    if let Err(e) = channel_id.say(&ctx.http, reply).await {
        warn!(channel = %channel_id, "failed to reply: {e}");
    }
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!(
            user = %ready.user.name,
            guilds = ready.guilds.len(),
            "connected to discord"
        );
    }

    async fn cache_ready(&self, ctx: Context, guilds: Vec<DcGuildId>) {
        let Some(state) = app_state(&ctx).await else {
            return;
        };
        info!(guilds = guilds.len(), "cache ready, sweeping leftover channels");
        state.housekeeping.sweep().await;
    }

    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let Some(guild_id) = new.guild_id else {
            return;
        };
        let ev = VoiceTransition {
            guild_id: GuildId(guild_id.get()),
            user_id: UserId(new.user_id.get()),
            old_channel: old
                .and_then(|s| s.channel_id)
                .map(|c| ChannelId(c.get())),
            new_channel: new.channel_id.map(|c| ChannelId(c.get())),
        };
        // Mute, deafen and stream toggles.
        if ev.old_channel == ev.new_channel {
            return;
        }

        let Some(state) = app_state(&ctx).await else {
            return;
        };
        let _guard = state.user_locks.lock_user(ev.user_id).await;
        state.voice.on_transition(ev).await;
    }

    async fn message(&self, ctx: Context, msg: Message) {
        let Some(guild_id) = msg.guild_id else {
            return;
        };
        run_command(&ctx, guild_id, msg.channel_id, &msg.author, &msg.content).await;
    }

    async fn message_update(
        &self,
        ctx: Context,
        old_if_available: Option<Message>,
        _new: Option<Message>,
        event: MessageUpdateEvent,
    ) {
        let (Some(guild_id), Some(author)) = (event.guild_id, event.author.as_ref()) else {
            return;
        };
        let Some(content) = edited_content(
            old_if_available.as_ref().map(|m| m.content.as_str()),
            event.content.as_deref(),
            event.edited_timestamp.is_some(),
        ) else {
            return;
        };
        run_command(&ctx, guild_id, event.channel_id, author, content).await;
    }

    async fn channel_delete(
        &self,
        ctx: Context,
        channel: GuildChannel,
        _messages: Option<Vec<Message>>,
    ) {
        let Some(state) = app_state(&ctx).await else {
            return;
        };
        if let Err(e) = state
            .housekeeping
            .channel_deleted(ChannelId(channel.id.get()))
            .await
        {
            warn!(channel = %channel.id, "failed to forget deleted channel: {e}");
        }
    }

    async fn guild_create(&self, ctx: Context, guild: Guild, is_new: Option<bool>) {
        // Only fresh invites; startup replays every guild with `is_new == Some(false)`.
        if is_new != Some(true) {
            return;
        }
        let Some(state) = app_state(&ctx).await else {
            return;
        };
        info!(guild = %guild.id, name = %guild.name, "joined guild");
        if let Err(e) = state
            .housekeeping
            .guild_joined(GuildId(guild.id.get()))
            .await
        {
            warn!(guild = %guild.id, "failed to leave blocklisted guild: {e}");
        }
    }

    async fn guild_delete(&self, ctx: Context, incomplete: UnavailableGuild, full: Option<Guild>) {
        // Outage, not a removal.
        if incomplete.unavailable {
            return;
        }
        let Some(state) = app_state(&ctx).await else {
            return;
        };

        let channels: Vec<ChannelId> = full
            .map(|g| g.channels.keys().map(|id| ChannelId(id.get())).collect())
            .unwrap_or_default();
        info!(guild = %incomplete.id, "removed from guild");
        if let Err(e) = state
            .housekeeping
            .guild_removed(GuildId(incomplete.id.get()), &channels)
            .await
        {
            warn!(guild = %incomplete.id, "failed to clean up removed guild: {e}");
        }
    }
}
