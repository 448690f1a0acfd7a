use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! snowflake {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

snowflake!(
    /// Discord user id. Key for rate-limit buckets and blocklist membership.
    UserId
);
snowflake!(
    /// Discord guild (server) id.
    GuildId
);
snowflake!(
    /// Discord channel id (voice, text or category).
    ChannelId
);
snowflake!(
    /// Discord category channel id.
    CategoryId
);

/// Effective guild-level permissions of the bot that matter to the lifecycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BotPermissions {
    pub manage_channels: bool,
    pub manage_roles: bool,
    pub move_members: bool,
}

impl BotPermissions {
    pub fn can_manage_voice(&self) -> bool {
        self.manage_channels && self.move_members
    }
}

/// What the platform reports a member is doing right now.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Activity {
    Playing(String),
    Other(String),
}

/// Snapshot of a guild member taken from the gateway cache.
#[derive(Clone, Debug)]
pub struct MemberInfo {
    pub user_id: UserId,
    pub display_name: String,
    pub activities: Vec<Activity>,
}

impl MemberInfo {
    /// Name of the first "playing" activity, if any.
    pub fn playing(&self) -> Option<&str> {
        self.activities.iter().find_map(|a| match a {
            Activity::Playing(name) => Some(name.as_str()),
            Activity::Other(_) => None,
        })
    }
}

/// "Member's voice channel changed from A to B" (either side may be absent).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VoiceTransition {
    pub guild_id: GuildId,
    pub user_id: UserId,
    pub old_channel: Option<ChannelId>,
    pub new_channel: Option<ChannelId>,
}
