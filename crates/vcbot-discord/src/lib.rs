//! Discord adapter (serenity).
//!
//! Implements the `vcbot-core` ports over the REST API and the gateway cache.

use std::sync::Arc;

use async_trait::async_trait;

use serenity::{
    builder::{CreateChannel, EditChannel},
    cache::Cache,
    http::{Http, HttpError},
    model::{
        channel::{ChannelType, PermissionOverwrite, PermissionOverwriteType},
        gateway::ActivityType,
        id::{
            ChannelId as DcChannelId, GuildId as DcGuildId, UserId as DcUserId,
        },
        permissions::Permissions,
    },
};

pub mod handlers;
pub mod router;

use vcbot_core::{
    domain::{Activity, BotPermissions, CategoryId, ChannelId, GuildId, MemberInfo, UserId},
    errors::Error,
    ports::{ChannelOps, CreateVoiceChannel, GuildControl, GuildDirectory, Notifier},
    Result,
};

/// Discord JSON error codes that mean "the target does not exist".
const UNKNOWN_CODES: &[i64] = &[10003, 10004, 10007, 10013];
/// Missing access, cannot DM user, missing permissions.
const FORBIDDEN_CODES: &[i64] = &[50001, 50007, 50013];

/// Map an unsuccessful REST response onto the core error kinds.
pub fn classify_response(status: u16, code: i64, message: &str) -> Error {
    if status == 404 || UNKNOWN_CODES.contains(&code) {
        Error::NotFound(format!("{message} (code {code})"))
    } else if status == 403 || FORBIDDEN_CODES.contains(&code) {
        Error::Forbidden(format!("{message} (code {code})"))
    } else {
        Error::External(format!("discord error {status}: {message} (code {code})"))
    }
}

fn map_err(op: &str, e: serenity::Error) -> Error {
    match &e {
        serenity::Error::Http(HttpError::UnsuccessfulRequest(resp)) => classify_response(
            resp.status_code.as_u16(),
            resp.error.code as i64,
            &format!("{op}: {}", resp.error.message),
        ),
        _ => Error::External(format!("{op}: {e}")),
    }
}

fn dc_guild(id: GuildId) -> DcGuildId {
    DcGuildId::new(id.0)
}

fn dc_channel(id: ChannelId) -> DcChannelId {
    DcChannelId::new(id.0)
}

fn dc_user(id: UserId) -> DcUserId {
    DcUserId::new(id.0)
}

#[derive(Clone)]
pub struct SerenityPlatform {
    http: Arc<Http>,
    cache: Arc<Cache>,
}

impl SerenityPlatform {
    pub fn new(http: Arc<Http>, cache: Arc<Cache>) -> Self {
        Self { http, cache }
    }

    fn member_permissions(&self, guild_id: GuildId, user_id: DcUserId) -> Option<Permissions> {
        let guild = self.cache.guild(dc_guild(guild_id))?;
        let member = guild.members.get(&user_id)?;
        #[allow(deprecated)]
        let perms = guild.member_permissions(member);
        Some(perms)
    }

    /// Whether `user_id` may change the bot's settings in `guild_id`.
    pub fn can_configure(&self, guild_id: GuildId, user_id: UserId) -> bool {
        self.member_permissions(guild_id, dc_user(user_id))
            .is_some_and(|p| p.contains(Permissions::MANAGE_CHANNELS))
    }

    /// Whether the bot may post in `channel_id`.
    ///
    /// Channels the cache does not know (threads, mostly) count as writable;
    /// a failed reply is only logged.
    pub fn can_send_in(&self, guild_id: GuildId, channel_id: DcChannelId) -> bool {
        let Some(guild) = self.cache.guild(dc_guild(guild_id)) else {
            return true;
        };
        let me = self.cache.current_user().id;
        let (Some(channel), Some(member)) = (guild.channels.get(&channel_id), guild.members.get(&me))
        else {
            return true;
        };
        #[allow(deprecated)]
        let perms = guild.user_permissions_in(channel, member);
        perms.contains(Permissions::SEND_MESSAGES)
    }
}

#[async_trait]
impl ChannelOps for SerenityPlatform {
    async fn create_voice_channel(&self, req: CreateVoiceChannel) -> Result<ChannelId> {
        let mut builder = CreateChannel::new(req.name.clone())
            .kind(ChannelType::Voice)
            .user_limit(req.user_limit)
            .bitrate(req.bitrate);
        if let Some(category) = req.category {
            builder = builder.category(DcChannelId::new(category.0));
        }
        if let Some(owner) = req.owner_override {
            builder = builder.permissions(vec![PermissionOverwrite {
                allow: Permissions::MANAGE_CHANNELS | Permissions::MOVE_MEMBERS,
                deny: Permissions::empty(),
                kind: PermissionOverwriteType::Member(dc_user(owner)),
            }]);
        }

        let channel = dc_guild(req.guild_id)
            .create_channel(&*self.http, builder)
            .await
            .map_err(|e| map_err("create channel", e))?;
        Ok(ChannelId(channel.id.get()))
    }

    async fn delete_channel(&self, channel_id: ChannelId) -> Result<()> {
        dc_channel(channel_id)
            .delete(&*self.http)
            .await
            .map_err(|e| map_err("delete channel", e))?;
        Ok(())
    }

    async fn move_member(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        channel_id: ChannelId,
    ) -> Result<()> {
        dc_guild(guild_id)
            .move_member(&*self.http, dc_user(user_id), dc_channel(channel_id))
            .await
            .map_err(|e| map_err("move member", e))?;
        Ok(())
    }

    async fn set_position(&self, channel_id: ChannelId, position: u16) -> Result<()> {
        dc_channel(channel_id)
            .edit(&*self.http, EditChannel::new().position(position))
            .await
            .map_err(|e| map_err("edit channel", e))?;
        Ok(())
    }
}

impl GuildDirectory for SerenityPlatform {
    fn bot_permissions(&self, guild_id: GuildId) -> BotPermissions {
        let me = self.cache.current_user().id;
        let Some(perms) = self.member_permissions(guild_id, me) else {
            return BotPermissions::default();
        };
        BotPermissions {
            manage_channels: perms.contains(Permissions::MANAGE_CHANNELS),
            manage_roles: perms.contains(Permissions::MANAGE_ROLES),
            move_members: perms.contains(Permissions::MOVE_MEMBERS),
        }
    }

    fn voice_channel_of(&self, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
        let guild = self.cache.guild(dc_guild(guild_id))?;
        let state = guild.voice_states.get(&dc_user(user_id))?;
        state.channel_id.map(|c| ChannelId(c.get()))
    }

    fn member(&self, guild_id: GuildId, user_id: UserId) -> Option<MemberInfo> {
        let guild = self.cache.guild(dc_guild(guild_id))?;
        let uid = dc_user(user_id);
        let member = guild.members.get(&uid)?;
        let activities = guild
            .presences
            .get(&uid)
            .map(|p| {
                p.activities
                    .iter()
                    .map(|a| match a.kind {
                        ActivityType::Playing => Activity::Playing(a.name.clone()),
                        _ => Activity::Other(a.name.clone()),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Some(MemberInfo {
            user_id,
            display_name: member.display_name().to_string(),
            activities,
        })
    }

    fn voice_occupants(&self, channel_id: ChannelId) -> Option<usize> {
        let id = dc_channel(channel_id);
        let guild_id = self.cache.channel(id)?.guild_id;
        let guild = self.cache.guild(guild_id)?;
        if !guild.channels.contains_key(&id) {
            return None;
        }
        Some(
            guild
                .voice_states
                .values()
                .filter(|vs| vs.channel_id == Some(id))
                .count(),
        )
    }

    fn channel_category(&self, channel_id: ChannelId) -> Option<CategoryId> {
        let channel = self.cache.channel(dc_channel(channel_id))?;
        channel.parent_id.map(|p| CategoryId(p.get()))
    }

    fn category_exists(&self, guild_id: GuildId, category: CategoryId) -> bool {
        self.cache
            .guild(dc_guild(guild_id))
            .and_then(|g| {
                g.channels
                    .get(&DcChannelId::new(category.0))
                    .map(|c| c.kind == ChannelType::Category)
            })
            .unwrap_or(false)
    }

    fn voice_channels_in(
        &self,
        guild_id: GuildId,
        category: Option<CategoryId>,
    ) -> Vec<ChannelId> {
        let Some(guild) = self.cache.guild(dc_guild(guild_id)) else {
            return Vec::new();
        };
        guild
            .channels
            .values()
            .filter(|c| c.kind == ChannelType::Voice)
            .filter(|c| c.parent_id.map(|p| p.get()) == category.map(|c| c.0))
            .map(|c| ChannelId(c.id.get()))
            .collect()
    }
}

#[async_trait]
impl Notifier for SerenityPlatform {
    async fn send_direct_message(&self, user_id: UserId, text: &str) -> Result<()> {
        let dm = dc_user(user_id)
            .create_dm_channel(&*self.http)
            .await
            .map_err(|e| map_err("open dm", e))?;
        dm.id
            .say(&*self.http, text)
            .await
            .map_err(|e| map_err("send dm", e))?;
        Ok(())
    }
}

#[async_trait]
impl GuildControl for SerenityPlatform {
    async fn leave_guild(&self, guild_id: GuildId) -> Result<()> {
        dc_guild(guild_id)
            .leave(&*self.http)
            .await
            .map_err(|e| map_err("leave guild", e))
    }
}
