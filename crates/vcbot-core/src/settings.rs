//! Store mutations behind the configuration commands.

use crate::{
    domain::{ChannelId, GuildId},
    errors::Error,
    store::{ChannelConfig, Stores},
    Result,
};

pub const MAX_PREFIX_LEN: usize = 16;

pub async fn set_prefix(stores: &Stores, guild_id: GuildId, prefix: &str) -> Result<()> {
    let prefix = prefix.trim();
    if prefix.is_empty() || prefix.chars().count() > MAX_PREFIX_LEN {
        return Err(Error::Config(format!(
            "prefix must be 1-{MAX_PREFIX_LEN} characters"
        )));
    }

    let mut prefixes = stores.prefixes.lock().await;
    prefixes.insert(guild_id, prefix.to_string());
    prefixes.save().await
}

/// Back to the default prefix. Returns whether a custom one was set.
pub async fn reset_prefix(stores: &Stores, guild_id: GuildId) -> Result<bool> {
    let mut prefixes = stores.prefixes.lock().await;
    if prefixes.remove(&guild_id).is_none() {
        return Ok(false);
    }
    prefixes.save().await?;
    Ok(true)
}

/// Turn `lobby` into a trigger channel (replacing any previous settings).
pub async fn configure_lobby(
    stores: &Stores,
    lobby: ChannelId,
    config: ChannelConfig,
) -> Result<()> {
    if stores.is_managed(lobby).await {
        return Err(Error::Config(
            "a temporary channel cannot be used as a lobby".to_string(),
        ));
    }

    let mut configs = stores.configs.lock().await;
    configs.insert(lobby, config);
    configs.save().await
}

pub async fn remove_lobby(stores: &Stores, lobby: ChannelId) -> Result<bool> {
    let mut configs = stores.configs.lock().await;
    if configs.remove(&lobby).is_none() {
        return Ok(false);
    }
    configs.save().await?;
    Ok(true)
}

/// Words are stored lowercased; matching is case-insensitive anyway.
pub async fn add_bad_word(stores: &Stores, guild_id: GuildId, word: &str) -> Result<bool> {
    let word = word.trim().to_lowercase();
    if word.is_empty() {
        return Err(Error::Config("bad word cannot be empty".to_string()));
    }

    let mut table = stores.bad_words.lock().await;
    let words = table.entry(guild_id).or_default();
    if words.contains(&word) {
        return Ok(false);
    }
    words.push(word);
    table.save().await?;
    Ok(true)
}

pub async fn remove_bad_word(stores: &Stores, guild_id: GuildId, word: &str) -> Result<bool> {
    let word = word.trim().to_lowercase();

    let mut table = stores.bad_words.lock().await;
    let Some(words) = table.get_mut(&guild_id) else {
        return Ok(false);
    };
    let before = words.len();
    words.retain(|w| *w != word);
    if words.len() == before {
        return Ok(false);
    }
    if words.is_empty() {
        table.remove(&guild_id);
    }
    table.save().await?;
    Ok(true)
}

pub async fn bad_words(stores: &Stores, guild_id: GuildId) -> Vec<String> {
    stores.bad_words_for(guild_id).await
}
