//! Keeping the stores in line with what actually exists on the platform.

use tracing::{info, warn};

use crate::{
    domain::{ChannelId, GuildId},
    voice::{LeaveOutcome, VoiceManager},
    Result,
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub deleted: usize,
    pub occupied: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct Housekeeping {
    voice: VoiceManager,
}

impl Housekeeping {
    pub fn new(voice: VoiceManager) -> Self {
        Self { voice }
    }

    /// Run the leave check on every tracked channel.
    ///
    /// Meant for startup: channels emptied while the bot was offline are
    /// deleted, and ids of channels that no longer exist are dropped.
    pub async fn sweep(&self) -> SweepReport {
        let tracked = self.voice.context().stores.channels.lock().await.clone();
        let mut report = SweepReport::default();

        for channel_id in tracked {
            match self.voice.leave(channel_id).await {
                Ok(LeaveOutcome::Deleted) => report.deleted += 1,
                Ok(LeaveOutcome::Occupied) => report.occupied += 1,
                Ok(LeaveOutcome::NotManaged) => {}
                Err(e) => {
                    report.failed += 1;
                    warn!(channel = %channel_id, "sweep could not delete channel: {e}");
                }
            }
        }

        info!(
            deleted = report.deleted,
            occupied = report.occupied,
            failed = report.failed,
            "startup sweep finished"
        );
        report
    }

    /// A channel was deleted on the platform (by anyone).
    pub async fn channel_deleted(&self, channel_id: ChannelId) -> Result<()> {
        let stores = &self.voice.context().stores;
        {
            let mut configs = stores.configs.lock().await;
            if configs.remove(&channel_id).is_some() {
                configs.save().await?;
                info!(channel = %channel_id, "lobby deleted, dropped its settings");
            }
        }
        {
            let mut channels = stores.channels.lock().await;
            if channels.remove_item(&channel_id) {
                channels.save().await?;
            }
        }
        Ok(())
    }

    /// The bot was removed from `guild_id`; forget everything about it.
    pub async fn guild_removed(
        &self,
        guild_id: GuildId,
        guild_channels: &[ChannelId],
    ) -> Result<()> {
        let stores = &self.voice.context().stores;

        {
            let mut prefixes = stores.prefixes.lock().await;
            if prefixes.remove(&guild_id).is_some() {
                prefixes.save().await?;
            }
        }
        {
            let mut words = stores.bad_words.lock().await;
            if words.remove(&guild_id).is_some() {
                words.save().await?;
            }
        }
        {
            let mut configs = stores.configs.lock().await;
            let mut changed = false;
            for id in guild_channels {
                changed |= configs.remove(id).is_some();
            }
            if changed {
                configs.save().await?;
            }
        }
        {
            let mut channels = stores.channels.lock().await;
            let mut changed = false;
            for id in guild_channels {
                changed |= channels.remove_item(id);
            }
            if changed {
                channels.save().await?;
            }
        }

        info!(guild = %guild_id, "cleaned up state of removed guild");
        Ok(())
    }

    /// Whether the bot must leave a guild it was just added to.
    pub async fn guild_joined(&self, guild_id: GuildId) -> Result<bool> {
        let ctx = self.voice.context();
        if !ctx.stores.is_blocked(guild_id.0).await {
            return Ok(false);
        }
        info!(guild = %guild_id, "leaving blocklisted guild");
        ctx.platform.guilds.leave_guild(guild_id).await?;
        Ok(true)
    }
}
