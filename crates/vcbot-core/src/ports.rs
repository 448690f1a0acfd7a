use async_trait::async_trait;

use crate::{
    domain::{BotPermissions, CategoryId, ChannelId, GuildId, MemberInfo, UserId},
    Result,
};

/// Parameters for a new voice channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreateVoiceChannel {
    pub guild_id: GuildId,
    pub category: Option<CategoryId>,
    pub name: String,
    /// `0` means unlimited.
    pub user_limit: u32,
    pub bitrate: u32,
    /// Member granted manage-channels + move-members on the new channel.
    pub owner_override: Option<UserId>,
}

/// Mutating calls against the remote platform.
///
/// `delete_channel` returns [`crate::Error::NotFound`] when the channel is
/// already gone; callers treat that as success.
#[async_trait]
pub trait ChannelOps: Send + Sync {
    async fn create_voice_channel(&self, req: CreateVoiceChannel) -> Result<ChannelId>;
    async fn delete_channel(&self, channel_id: ChannelId) -> Result<()>;
    async fn move_member(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        channel_id: ChannelId,
    ) -> Result<()>;
    async fn set_position(&self, channel_id: ChannelId, position: u16) -> Result<()>;
}

/// Read-only view of guild state, answered from the gateway cache.
pub trait GuildDirectory: Send + Sync {
    fn bot_permissions(&self, guild_id: GuildId) -> BotPermissions;
    /// Voice channel the member currently sits in.
    fn voice_channel_of(&self, guild_id: GuildId, user_id: UserId) -> Option<ChannelId>;
    fn member(&self, guild_id: GuildId, user_id: UserId) -> Option<MemberInfo>;
    /// `None` when the channel is unknown (deleted or never cached).
    fn voice_occupants(&self, channel_id: ChannelId) -> Option<usize>;
    fn channel_category(&self, channel_id: ChannelId) -> Option<CategoryId>;
    fn category_exists(&self, guild_id: GuildId, category: CategoryId) -> bool;
    /// Voice channels whose parent is `category` (`None`: channels without a category).
    fn voice_channels_in(&self, guild_id: GuildId, category: Option<CategoryId>)
        -> Vec<ChannelId>;
}

/// Direct messages to users.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Returns [`crate::Error::Forbidden`] when the user does not accept DMs.
    async fn send_direct_message(&self, user_id: UserId, text: &str) -> Result<()>;
}

/// Guild membership of the bot itself.
#[async_trait]
pub trait GuildControl: Send + Sync {
    async fn leave_guild(&self, guild_id: GuildId) -> Result<()>;
}
