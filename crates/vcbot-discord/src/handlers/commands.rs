use tracing::warn;

use vcbot_core::{
    domain::{GuildId, UserId},
    ports::GuildDirectory,
    settings,
};

use crate::router::AppState;

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Command {
    /// `None` resets to the default prefix.
    Prefix(Option<String>),
    /// Turn the author's current voice channel into a lobby.
    Lobby(Option<String>),
    Unlobby,
    BadWordAdd(String),
    BadWordRemove(String),
    BadWords,
    Usage(&'static str),
}

/// `None` for names the bot does not know; those are ignored without
/// touching the rate limiter.
pub(crate) fn parse_command(name: &str, args: &str) -> Option<Command> {
    let arg = (!args.is_empty()).then(|| args.to_string());
    let cmd = match name {
        "prefix" => Command::Prefix(arg),
        "lobby" => Command::Lobby(arg),
        "unlobby" => Command::Unlobby,
        "badwords" => Command::BadWords,
        "badword" => {
            let (sub, word) = args
                .split_once(char::is_whitespace)
                .map(|(s, w)| (s, w.trim()))
                .unwrap_or((args, ""));
            match (sub.to_lowercase().as_str(), word) {
                (_, "") => Command::Usage("badword add|remove <word>"),
                ("add", w) => Command::BadWordAdd(w.to_string()),
                ("remove", w) => Command::BadWordRemove(w.to_string()),
                _ => Command::Usage("badword add|remove <word>"),
            }
        }
        _ => return None,
    };
    Some(cmd)
}

pub(crate) async fn execute(
    state: &AppState,
    guild_id: GuildId,
    author: UserId,
    command: Command,
    prefix: &str,
) -> String {
    if let Command::Usage(usage) = command {
        return format!("Usage: `{prefix}{usage}`");
    }
    if !state.platform.can_configure(guild_id, author) {
        return "You need the Manage Channels permission to do that.".to_string();
    }

    let stores = &state.ctx.stores;
    let result = match command {
        Command::Prefix(Some(new)) => settings::set_prefix(stores, guild_id, &new)
            .await
            .map(|()| format!("Prefix set to `{}`.", new.trim())),
        Command::Prefix(None) => settings::reset_prefix(stores, guild_id)
            .await
            .map(|_| format!("Prefix reset to `{}`.", state.ctx.default_prefix)),
        Command::Lobby(template) => {
            let Some(channel) = state.platform.voice_channel_of(guild_id, author) else {
                return "Join the voice channel you want to use as a lobby first.".to_string();
            };
            let mut config = stores.channel_config(channel).await.unwrap_or_default();
            if let Some(t) = template {
                config.name = t;
            }
            let name = config.name.clone();
            settings::configure_lobby(stores, channel, config)
                .await
                .map(|()| format!("<#{channel}> is now a lobby. New channels will be named `{name}`."))
        }
        Command::Unlobby => {
            let Some(channel) = state.platform.voice_channel_of(guild_id, author) else {
                return "Join the lobby you want to remove first.".to_string();
            };
            settings::remove_lobby(stores, channel).await.map(|removed| {
                if removed {
                    format!("<#{channel}> is no longer a lobby.")
                } else {
                    format!("<#{channel}> is not a lobby.")
                }
            })
        }
        Command::BadWordAdd(word) => {
            settings::add_bad_word(stores, guild_id, &word)
                .await
                .map(|added| {
                    if added {
                        "Word added to the filter.".to_string()
                    } else {
                        "That word is already filtered.".to_string()
                    }
                })
        }
        Command::BadWordRemove(word) => settings::remove_bad_word(stores, guild_id, &word)
            .await
            .map(|removed| {
                if removed {
                    "Word removed from the filter.".to_string()
                } else {
                    "That word was not filtered.".to_string()
                }
            }),
        Command::BadWords => {
            let words = settings::bad_words(stores, guild_id).await;
            Ok(if words.is_empty() {
                "No words are filtered.".to_string()
            } else {
                format!("Filtered words: ||{}||", words.join(", "))
            })
        }
        Command::Usage(usage) => return format!("Usage: `{prefix}{usage}`"),
    };

    match result {
        Ok(reply) => reply,
        Err(vcbot_core::Error::Config(reason)) => reason,
        Err(e) => {
            warn!(guild = %guild_id, user = %author, "settings command failed: {e}");
            "Something went wrong while saving the settings.".to_string()
        }
    }
}
