use std::{collections::HashMap, sync::Arc, time::Duration};

use serenity::{model::gateway::GatewayIntents, prelude::*};

use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use vcbot_core::{
    commands::CommandGate,
    config::Config,
    context::{BotContext, Platform},
    domain::UserId,
    housekeeping::Housekeeping,
    store::Stores,
    voice::VoiceManager,
};

use crate::handlers::Handler;
use crate::SerenityPlatform;

const PRUNE_INTERVAL: Duration = Duration::from_secs(60);

pub struct AppState {
    pub ctx: Arc<BotContext>,
    pub platform: Arc<SerenityPlatform>,
    pub voice: VoiceManager,
    pub gate: CommandGate,
    pub housekeeping: Housekeeping,
    pub user_locks: UserLocks,
}

impl TypeMapKey for AppState {
    type Value = Arc<AppState>;
}

/// Serializes voice transitions of a single member.
#[derive(Default)]
pub struct UserLocks {
    inner: Mutex<HashMap<UserId, Arc<Mutex<()>>>>,
}

impl UserLocks {
    pub async fn lock_user(&self, user_id: UserId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().await;
            map.entry(user_id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// Forget locks nobody holds or waits on.
    pub async fn prune(&self) -> usize {
        let mut map = self.inner.lock().await;
        let before = map.len();
        map.retain(|_, lock| Arc::strong_count(lock) > 1);
        before - map.len()
    }
}

pub fn intents() -> GatewayIntents {
    GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MEMBERS
        | GatewayIntents::GUILD_VOICE_STATES
        | GatewayIntents::GUILD_PRESENCES
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT
}

pub async fn run(cfg: Arc<Config>) -> anyhow::Result<()> {
    let stores = Arc::new(Stores::open(&cfg.data_dir).await?);
    info!(data_dir = %cfg.data_dir.display(), "stores loaded");

    let mut client = Client::builder(&cfg.discord_token, intents())
        .event_handler(Handler)
        .await
        .map_err(|e| anyhow::anyhow!("failed to create discord client: {e}"))?;

    let platform = Arc::new(SerenityPlatform::new(
        client.http.clone(),
        client.cache.clone(),
    ));
    let ctx = Arc::new(BotContext::new(
        &cfg,
        stores,
        Platform::from_single(platform.clone()),
    ));
    let voice = VoiceManager::new(ctx.clone());
    let state = Arc::new(AppState {
        ctx: ctx.clone(),
        platform,
        gate: CommandGate::new(ctx.clone()),
        housekeeping: Housekeeping::new(voice.clone()),
        voice,
        user_locks: UserLocks::default(),
    });

    {
        let mut data = client.data.write().await;
        data.insert::<AppState>(state.clone());
    }

    // Idle rate-limit buckets and member locks would otherwise accumulate forever.
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(PRUNE_INTERVAL);
        loop {
            tick.tick().await;
            let buckets = state.ctx.prune_buckets(std::time::Instant::now()).await;
            let locks = state.user_locks.prune().await;
            if buckets + locks > 0 {
                debug!(buckets, locks, "pruned idle state");
            }
        }
    });

    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        wait_for_shutdown().await;
        info!("shutdown signal received, closing shards");
        shard_manager.shutdown_all().await;
    });

    client
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("discord client failed: {e}"))?;

    info!("client stopped");
    Ok(())
}

async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
                return;
            }
            Err(e) => warn!("cannot listen for SIGTERM: {e}"),
        }
    }
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("cannot listen for ctrl-c: {e}");
        std::future::pending::<()>().await;
    }
}
