use std::{sync::Arc, time::Instant};

use tokio::sync::Mutex;

use crate::{
    audit::AuditLogger,
    config::{Config, LimitConfig},
    ports::{ChannelOps, GuildControl, GuildDirectory, Notifier},
    security::SpamGuard,
    store::Stores,
};

/// Adapter-provided collaborators.
#[derive(Clone)]
pub struct Platform {
    pub channels: Arc<dyn ChannelOps>,
    pub directory: Arc<dyn GuildDirectory>,
    pub notifier: Arc<dyn Notifier>,
    pub guilds: Arc<dyn GuildControl>,
}

impl Platform {
    /// One object implementing every port (the serenity adapter, test fakes).
    pub fn from_single<P>(p: Arc<P>) -> Self
    where
        P: ChannelOps + GuildDirectory + Notifier + GuildControl + 'static,
    {
        Self {
            channels: p.clone(),
            directory: p.clone(),
            notifier: p.clone(),
            guilds: p,
        }
    }
}

/// All mutable bot state, built once at startup and shared by every handler.
pub struct BotContext {
    pub stores: Arc<Stores>,
    pub platform: Platform,
    pub audit: AuditLogger,
    pub default_prefix: String,
    pub voice_guard: Mutex<SpamGuard>,
    pub command_guard: Mutex<SpamGuard>,
}

impl BotContext {
    pub fn new(cfg: &Config, stores: Arc<Stores>, platform: Platform) -> Self {
        let guard = |l: LimitConfig| SpamGuard::new(l.capacity, l.period, cfg.escalation_threshold);

        Self {
            stores,
            platform,
            audit: AuditLogger::new(cfg.audit_log_path.clone(), cfg.audit_log_json),
            default_prefix: cfg.default_prefix.clone(),
            voice_guard: Mutex::new(guard(cfg.voice_limit)),
            command_guard: Mutex::new(guard(cfg.command_limit)),
        }
    }

    /// Drop idle rate-limit buckets from both guards.
    pub async fn prune_buckets(&self, now: Instant) -> usize {
        let voice = self.voice_guard.lock().await.prune(now);
        let commands = self.command_guard.lock().await.prune(now);
        voice + commands
    }
}
