//! JSON-file backed tables.
//!
//! Every table is one JSON document on disk, loaded fully into memory at
//! startup. Mutations happen through a [`StoreGuard`], which keeps the table
//! locked until it is dropped, so "modify then save" is never interleaved with
//! another task touching the same table.

use std::{
    collections::BTreeMap,
    ops::{Deref, DerefMut},
    path::{Path, PathBuf},
};

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::sync::{Mutex, MutexGuard};

use crate::{
    domain::{CategoryId, ChannelId, GuildId},
    errors::Error,
    Result,
};

pub const DEFAULT_TEMPLATE: &str = "@user's channel";
pub const DEFAULT_USER_LIMIT: u32 = 10;
pub const DEFAULT_BITRATE: u32 = 64_000;

/// Per-lobby settings for the channels it spawns.
///
/// Field names match the on-disk `configs.json` layout.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Name template, see [`crate::naming`].
    #[serde(default = "default_template")]
    pub name: String,
    /// Member cap of the spawned channel; `0` means unlimited.
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default = "default_bitrate")]
    pub bitrate: u32,
    /// Move the spawned channel to position 0.
    #[serde(default)]
    pub top: bool,
    /// Category for spawned channels; falls back to the lobby's own category.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<CategoryId>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            name: default_template(),
            limit: DEFAULT_USER_LIMIT,
            bitrate: DEFAULT_BITRATE,
            top: false,
            category: None,
        }
    }
}

fn default_template() -> String {
    DEFAULT_TEMPLATE.to_string()
}

fn default_limit() -> u32 {
    DEFAULT_USER_LIMIT
}

fn default_bitrate() -> u32 {
    DEFAULT_BITRATE
}

/// A single JSON document guarded by an async mutex.
pub struct JsonStore<T> {
    path: PathBuf,
    inner: Mutex<T>,
}

pub type JsonMap<K, V> = JsonStore<BTreeMap<K, V>>;
pub type JsonList<V> = JsonStore<Vec<V>>;

impl<T> JsonStore<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    /// Load `path`, or start empty if the file does not exist yet.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let data = match tokio::fs::read_to_string(&path).await {
            Ok(txt) if txt.trim().is_empty() => T::default(),
            Ok(txt) => serde_json::from_str(&txt).map_err(|e| Error::Store {
                path: path.clone(),
                reason: e.to_string(),
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => T::default(),
            Err(e) => return Err(Error::Io(e)),
        };

        Ok(Self {
            path,
            inner: Mutex::new(data),
        })
    }

    /// In-memory table with no backing file changes until the first save.
    #[cfg(test)]
    fn with_value(path: impl Into<PathBuf>, value: T) -> Self {
        Self {
            path: path.into(),
            inner: Mutex::new(value),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn lock(&self) -> StoreGuard<'_, T> {
        StoreGuard {
            path: &self.path,
            data: self.inner.lock().await,
        }
    }
}

/// Exclusive access to a table; call [`StoreGuard::save`] before dropping it.
pub struct StoreGuard<'a, T> {
    path: &'a Path,
    data: MutexGuard<'a, T>,
}

impl<T: Serialize> StoreGuard<'_, T> {
    /// Write the table to disk atomically (temp file + rename).
    pub async fn save(&self) -> Result<()> {
        let txt = serde_json::to_string(&*self.data)?;
        write_atomic(self.path, txt.as_bytes()).await
    }
}

impl<T> Deref for StoreGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.data
    }
}

impl<T> DerefMut for StoreGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.data
    }
}

impl<V: PartialEq> StoreGuard<'_, Vec<V>> {
    /// Append unless already present. Returns whether the list changed.
    pub fn append_unique(&mut self, value: V) -> bool {
        if self.data.contains(&value) {
            return false;
        }
        self.data.push(value);
        true
    }

    /// Remove every copy of `value`. Returns whether the list changed.
    pub fn remove_item(&mut self, value: &V) -> bool {
        let before = self.data.len();
        self.data.retain(|v| v != value);
        self.data.len() != before
    }
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

/// All durable tables the bot keeps.
pub struct Stores {
    /// guild → command prefix
    pub prefixes: JsonMap<GuildId, String>,
    /// guild → words masked out of channel names
    pub bad_words: JsonMap<GuildId, Vec<String>>,
    /// lobby channel → spawn settings
    pub configs: JsonMap<ChannelId, ChannelConfig>,
    /// channels created by the bot and not yet deleted
    pub channels: JsonList<ChannelId>,
    /// blocked user and guild ids
    pub blacklist: JsonList<u64>,
}

impl Stores {
    pub async fn open(dir: &Path) -> Result<Self> {
        tokio::fs::create_dir_all(dir).await?;

        Ok(Self {
            prefixes: JsonStore::open(dir.join("prefixes.json")).await?,
            bad_words: JsonStore::open(dir.join("bad_words.json")).await?,
            configs: JsonStore::open(dir.join("configs.json")).await?,
            channels: JsonStore::open(dir.join("channels.json")).await?,
            blacklist: JsonStore::open(dir.join("blacklist.json")).await?,
        })
    }

    pub async fn is_blocked(&self, id: u64) -> bool {
        self.blacklist.lock().await.contains(&id)
    }

    pub async fn channel_config(&self, lobby: ChannelId) -> Option<ChannelConfig> {
        self.configs.lock().await.get(&lobby).cloned()
    }

    pub async fn bad_words_for(&self, guild: GuildId) -> Vec<String> {
        self.bad_words
            .lock()
            .await
            .get(&guild)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn is_managed(&self, channel: ChannelId) -> bool {
        self.channels.lock().await.contains(&channel)
    }
}
