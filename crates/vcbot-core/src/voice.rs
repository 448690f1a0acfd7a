//! Ephemeral voice channel lifecycle.
//!
//! Joining a configured lobby spawns a channel for the member and moves them
//! into it; the channel is deleted again once its last occupant leaves.
//! `channels.json` is the only record of which channels belong to the bot.

use std::{
    collections::HashSet,
    sync::Arc,
    time::{Duration, Instant},
};

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{
    audit::AuditEvent,
    context::BotContext,
    domain::{CategoryId, ChannelId, GuildId, UserId, VoiceTransition},
    escalation::Source,
    naming::{synthesize, NameContext},
    ports::CreateVoiceChannel,
    security::Verdict,
    store::ChannelConfig,
    Result,
};

/// Why a join did or did not spawn a channel.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum JoinOutcome {
    Created { channel_id: ChannelId, moved: bool },
    Blocked,
    NotConfigured,
    MissingPermissions,
    /// The member is no longer in the lobby, e.g. a redelivered join.
    NotInLobby,
    RateLimited { retry_after: Duration },
    Escalated,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LeaveOutcome {
    NotManaged,
    Occupied,
    Deleted,
}

#[derive(Clone)]
pub struct VoiceManager {
    ctx: Arc<BotContext>,
    /// Managed channels with a delete request in flight.
    deleting: Arc<Mutex<HashSet<ChannelId>>>,
}

impl VoiceManager {
    pub fn new(ctx: Arc<BotContext>) -> Self {
        Self {
            ctx,
            deleting: Arc::default(),
        }
    }

    pub fn context(&self) -> &Arc<BotContext> {
        &self.ctx
    }

    pub async fn on_transition(&self, ev: VoiceTransition) {
        self.on_transition_at(ev, Instant::now()).await
    }

    /// Leave the old channel first, then join the new one.
    ///
    /// Errors are logged here; nobody is waiting on a voice event.
    pub async fn on_transition_at(&self, ev: VoiceTransition, now: Instant) {
        if ev.old_channel == ev.new_channel {
            return;
        }

        if let Some(old) = ev.old_channel {
            if let Err(e) = self.leave(old).await {
                warn!(channel = %old, "failed to clean up voice channel: {e}");
            }
        }

        if let Some(new) = ev.new_channel {
            match self.join_at(ev.guild_id, ev.user_id, new, now).await {
                Ok(outcome) => debug!(user = %ev.user_id, channel = %new, ?outcome, "voice join handled"),
                Err(e) => warn!(user = %ev.user_id, channel = %new, "failed to spawn voice channel: {e}"),
            }
        }
    }

    /// Delete `channel_id` if the bot owns it and nobody is left inside.
    ///
    /// The channel is marked as deleting under the managed-list lock, so
    /// concurrent leaves of one channel delete it once. The lock itself is not
    /// held during the remote call.
    pub async fn leave(&self, channel_id: ChannelId) -> Result<LeaveOutcome> {
        {
            let channels = self.ctx.stores.channels.lock().await;
            if !channels.contains(&channel_id) {
                return Ok(LeaveOutcome::NotManaged);
            }

            let occupants = self
                .ctx
                .platform
                .directory
                .voice_occupants(channel_id)
                .unwrap_or(0);
            if occupants > 0 {
                return Ok(LeaveOutcome::Occupied);
            }

            if !self.deleting.lock().await.insert(channel_id) {
                return Ok(LeaveOutcome::NotManaged);
            }
        }

        let removed = match self.ctx.platform.channels.delete_channel(channel_id).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => {
                debug!(channel = %channel_id, "managed channel already gone");
                Ok(())
            }
            Err(e) => Err(e),
        };

        let mut channels = self.ctx.stores.channels.lock().await;
        let saved = match removed {
            Ok(()) => {
                channels.remove_item(&channel_id);
                channels.save().await
            }
            Err(e) => Err(e),
        };
        self.deleting.lock().await.remove(&channel_id);
        drop(channels);
        saved?;

        info!(channel = %channel_id, "deleted empty voice channel");
        self.ctx.audit.record(AuditEvent::channel_deleted(channel_id));
        Ok(LeaveOutcome::Deleted)
    }

    pub async fn join_at(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        lobby: ChannelId,
        now: Instant,
    ) -> Result<JoinOutcome> {
        let ctx = &self.ctx;
        let platform = &ctx.platform;

        if ctx.stores.is_blocked(user_id.0).await {
            return Ok(JoinOutcome::Blocked);
        }
        let Some(config) = ctx.stores.channel_config(lobby).await else {
            return Ok(JoinOutcome::NotConfigured);
        };
        let perms = platform.directory.bot_permissions(guild_id);
        if !perms.can_manage_voice() {
            return Ok(JoinOutcome::MissingPermissions);
        }
        // Already moved on, usually into the channel spawned by the first
        // delivery of this join.
        if platform.directory.voice_channel_of(guild_id, user_id) != Some(lobby) {
            return Ok(JoinOutcome::NotInLobby);
        }

        let verdict = ctx.voice_guard.lock().await.check_at(user_id, now);
        match verdict {
            Verdict::Allowed => {}
            Verdict::Throttled { retry_after } => {
                ctx.notify_rate_limited(user_id, Source::Voice, retry_after)
                    .await;
                return Ok(JoinOutcome::RateLimited { retry_after });
            }
            Verdict::Escalate { .. } => {
                ctx.escalate(user_id, Source::Voice).await?;
                return Ok(JoinOutcome::Escalated);
            }
        }

        let category = self.resolve_category(guild_id, lobby, &config);
        let name = self.channel_name(guild_id, user_id, category, &config).await;

        let channel_id = platform
            .channels
            .create_voice_channel(CreateVoiceChannel {
                guild_id,
                category,
                name: name.clone(),
                user_limit: config.limit,
                bitrate: config.bitrate,
                owner_override: perms.manage_roles.then_some(user_id),
            })
            .await?;

        {
            let mut channels = ctx.stores.channels.lock().await;
            channels.append_unique(channel_id);
            channels.save().await?;
        }
        info!(guild = %guild_id, user = %user_id, channel = %channel_id, %name, "created voice channel");
        ctx.audit
            .record(AuditEvent::channel_created(guild_id, user_id, channel_id, &name));

        if config.top {
            // Detached; its outcome is only logged.
            let ops = platform.channels.clone();
            tokio::spawn(async move {
                if let Err(e) = ops.set_position(channel_id, 0).await {
                    debug!(channel = %channel_id, "failed to move channel to top: {e}");
                }
            });
        }

        let moved = match platform
            .channels
            .move_member(guild_id, user_id, channel_id)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                warn!(user = %user_id, channel = %channel_id, "failed to move member: {e}");
                false
            }
        };

        Ok(JoinOutcome::Created { channel_id, moved })
    }

    fn resolve_category(
        &self,
        guild_id: GuildId,
        lobby: ChannelId,
        config: &ChannelConfig,
    ) -> Option<CategoryId> {
        let directory = &self.ctx.platform.directory;
        config
            .category
            .filter(|c| directory.category_exists(guild_id, *c))
            .or_else(|| directory.channel_category(lobby))
    }

    async fn channel_name(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        category: Option<CategoryId>,
        config: &ChannelConfig,
    ) -> String {
        let directory = &self.ctx.platform.directory;
        let member = directory.member(guild_id, user_id);
        let display_name = member
            .as_ref()
            .map(|m| m.display_name.clone())
            .unwrap_or_else(|| user_id.to_string());

        let siblings = directory.voice_channels_in(guild_id, category);
        let managed_in_category = {
            let channels = self.ctx.stores.channels.lock().await;
            siblings.iter().filter(|id| channels.contains(id)).count()
        };
        let bad_words = self.ctx.stores.bad_words_for(guild_id).await;

        synthesize(
            &config.name,
            &NameContext {
                display_name: &display_name,
                playing: member.as_ref().and_then(|m| m.playing()),
                managed_in_category,
                bad_words: &bad_words,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::test_support::test_context;
    use crate::domain::{Activity, BotPermissions};
    use crate::escalation::rate_limit_message;
    use crate::ports::fakes::{Call, FakePlatform};
    use crate::ports::GuildDirectory;

    const GUILD: GuildId = GuildId(1);
    const LOBBY: ChannelId = ChannelId(100);
    const GAMES: CategoryId = CategoryId(50);

    async fn setup(name: &str, config: ChannelConfig) -> (VoiceManager, Arc<FakePlatform>) {
        let (ctx, fake) = test_context(name).await;
        fake.add_category(GAMES);
        fake.add_voice_channel(LOBBY, Some(GAMES));
        {
            let mut configs = ctx.stores.configs.lock().await;
            configs.insert(LOBBY, config);
            configs.save().await.unwrap();
        }
        (VoiceManager::new(ctx), fake)
    }

    fn transition(user: u64, old: Option<ChannelId>, new: Option<ChannelId>) -> VoiceTransition {
        VoiceTransition {
            guild_id: GUILD,
            user_id: UserId(user),
            old_channel: old,
            new_channel: new,
        }
    }

    /// Apply a gateway-style move: update the fake's occupancy, then dispatch.
    async fn step(vm: &VoiceManager, fake: &FakePlatform, ev: VoiceTransition, now: Instant) {
        fake.place(ev.user_id, ev.new_channel);
        vm.on_transition_at(ev, now).await;
    }

    /// Join `LOBBY` directly, with the member already sitting in it.
    async fn enter_lobby(
        vm: &VoiceManager,
        fake: &FakePlatform,
        user: u64,
        now: Instant,
    ) -> Result<JoinOutcome> {
        fake.place(UserId(user), Some(LOBBY));
        vm.join_at(GUILD, UserId(user), LOBBY, now).await
    }

    async fn managed(vm: &VoiceManager) -> Vec<ChannelId> {
        vm.context().stores.channels.lock().await.clone()
    }

    #[tokio::test]
    async fn join_creates_tracks_and_moves_member() {
        let (vm, fake) = setup("vcbot-voice-join", ChannelConfig::default()).await;
        fake.add_member(UserId(7), "Ann");

        let now = Instant::now();
        step(&vm, &fake, transition(7, None, Some(LOBBY)), now).await;

        let created = fake.created();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].name, "Ann's channel");
        assert_eq!(created[0].category, Some(GAMES));
        assert_eq!(created[0].user_limit, 10);
        assert_eq!(created[0].bitrate, 64_000);
        assert_eq!(created[0].owner_override, Some(UserId(7)));

        let ids = managed(&vm).await;
        assert_eq!(ids.len(), 1);
        assert_eq!(fake.voice_occupants(ids[0]), Some(1));
        assert!(fake.calls().contains(&Call::Move(UserId(7), ids[0])));

        // Durable before the join returned.
        let on_disk = std::fs::read_to_string(vm.context().stores.channels.path()).unwrap();
        assert_eq!(on_disk, format!("[{}]", ids[0]));
    }

    #[tokio::test]
    async fn leaving_last_member_deletes_channel() {
        let (vm, fake) = setup("vcbot-voice-leave", ChannelConfig::default()).await;
        let now = Instant::now();

        step(&vm, &fake, transition(7, None, Some(LOBBY)), now).await;
        let spawned = managed(&vm).await[0];

        step(&vm, &fake, transition(7, Some(spawned), None), now).await;

        assert_eq!(fake.deleted(), vec![spawned]);
        assert!(!fake.exists(spawned));
        assert!(managed(&vm).await.is_empty());
    }

    #[tokio::test]
    async fn occupied_channel_is_kept() {
        let (vm, fake) = setup("vcbot-voice-occupied", ChannelConfig::default()).await;
        let now = Instant::now();

        step(&vm, &fake, transition(7, None, Some(LOBBY)), now).await;
        let spawned = managed(&vm).await[0];
        // A friend joins, then the owner leaves.
        step(&vm, &fake, transition(8, None, Some(spawned)), now).await;
        step(&vm, &fake, transition(7, Some(spawned), None), now).await;

        assert!(fake.deleted().is_empty());
        assert_eq!(managed(&vm).await, vec![spawned]);

        step(&vm, &fake, transition(8, Some(spawned), None), now).await;
        assert_eq!(fake.deleted(), vec![spawned]);
    }

    #[tokio::test]
    async fn duplicate_leave_makes_no_remote_calls() {
        let (vm, fake) = setup("vcbot-voice-dup", ChannelConfig::default()).await;
        let now = Instant::now();

        step(&vm, &fake, transition(7, None, Some(LOBBY)), now).await;
        let spawned = managed(&vm).await[0];
        step(&vm, &fake, transition(7, Some(spawned), None), now).await;
        fake.clear_calls();

        // At-least-once delivery: same event again.
        vm.on_transition_at(transition(7, Some(spawned), None), now)
            .await;
        assert_eq!(vm.leave(spawned).await.unwrap(), LeaveOutcome::NotManaged);
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn redelivered_join_creates_once() {
        let (vm, fake) = setup("vcbot-voice-redeliver", ChannelConfig::default()).await;
        let now = Instant::now();
        let ev = transition(7, None, Some(LOBBY));

        step(&vm, &fake, ev, now).await;
        let spawned = managed(&vm).await;
        // At-least-once delivery: the member already sits in their new room.
        vm.on_transition_at(ev, now).await;

        assert_eq!(fake.created().len(), 1);
        assert_eq!(managed(&vm).await, spawned);
        assert!(fake.deleted().is_empty());
        assert_eq!(
            fake.calls()
                .iter()
                .filter(|c| matches!(c, Call::Move(..)))
                .count(),
            1
        );
        assert_eq!(
            vm.join_at(GUILD, UserId(7), LOBBY, now).await.unwrap(),
            JoinOutcome::NotInLobby
        );
    }

    #[tokio::test]
    async fn managed_set_matches_created_minus_deleted() {
        let (vm, fake) = setup("vcbot-voice-seq", ChannelConfig::default()).await;
        let t0 = Instant::now();
        let later = |s: u64| t0 + Duration::from_secs(s);

        step(&vm, &fake, transition(1, None, Some(LOBBY)), later(0)).await;
        step(&vm, &fake, transition(2, None, Some(LOBBY)), later(0)).await;
        let ids = managed(&vm).await;
        assert_eq!(ids.len(), 2);

        // Member 1 goes back to the lobby: their room empties, a new one spawns.
        step(&vm, &fake, transition(1, Some(ids[0]), Some(LOBBY)), later(1)).await;
        // Member 2 hops into member 1's new room, emptying their own.
        let ids_after = managed(&vm).await;
        let room_of_1 = *ids_after.last().unwrap();
        step(&vm, &fake, transition(2, Some(ids[1]), Some(room_of_1)), later(2)).await;

        let created: Vec<ChannelId> = (1001..=1003).map(ChannelId).collect();
        let deleted = fake.deleted();
        let expected: Vec<ChannelId> = created
            .iter()
            .copied()
            .filter(|id| !deleted.contains(id))
            .collect();
        assert_eq!(fake.created().len(), 3);
        assert_eq!(deleted, vec![ids[0], ids[1]]);
        assert_eq!(managed(&vm).await, expected);
        assert_eq!(expected, vec![room_of_1]);
    }

    #[tokio::test]
    async fn move_from_empty_room_to_lobby_deletes_first() {
        let config = ChannelConfig {
            name: "Room @position".to_string(),
            ..ChannelConfig::default()
        };
        let (vm, fake) = setup("vcbot-voice-order", config).await;
        let t0 = Instant::now();

        step(&vm, &fake, transition(1, None, Some(LOBBY)), t0).await;
        let first = managed(&vm).await[0];
        assert_eq!(fake.created()[0].name, "Room 1");

        // Straight from the (now empty) room back into the lobby.
        step(
            &vm,
            &fake,
            transition(1, Some(first), Some(LOBBY)),
            t0 + Duration::from_secs(1),
        )
        .await;

        let calls = fake.calls();
        let delete_at = calls.iter().position(|c| *c == Call::Delete(first));
        let create_at = calls
            .iter()
            .rposition(|c| matches!(c, Call::Create(_)));
        assert!(delete_at.unwrap() < create_at.unwrap());
        assert_eq!(fake.created()[1].name, "Room 1");
    }

    #[tokio::test]
    async fn position_counts_tracked_channels_in_category() {
        let config = ChannelConfig {
            name: "Room @position".to_string(),
            ..ChannelConfig::default()
        };
        let (vm, fake) = setup("vcbot-voice-position", config).await;
        // Two tracked rooms already in the category, one untracked.
        fake.add_voice_channel(ChannelId(201), Some(GAMES));
        fake.add_voice_channel(ChannelId(202), Some(GAMES));
        fake.add_voice_channel(ChannelId(203), Some(GAMES));
        fake.place(UserId(90), Some(ChannelId(201)));
        fake.place(UserId(91), Some(ChannelId(202)));
        {
            let mut channels = vm.context().stores.channels.lock().await;
            channels.append_unique(ChannelId(201));
            channels.append_unique(ChannelId(202));
        }

        enter_lobby(&vm, &fake, 7, Instant::now())
            .await
            .unwrap();
        assert_eq!(fake.created()[0].name, "Room 3");
    }

    #[tokio::test]
    async fn name_uses_game_and_masks_bad_words() {
        let config = ChannelConfig {
            name: "@user plays @game".to_string(),
            ..ChannelConfig::default()
        };
        let (vm, fake) = setup("vcbot-voice-badwords", config).await;
        {
            let mut words = vm.context().stores.bad_words.lock().await;
            words.insert(GUILD, vec!["foo".to_string()]);
        }
        fake.add_member(UserId(7), "FooBar");
        fake.set_activities(
            UserId(7),
            vec![
                Activity::Other("Spotify".to_string()),
                Activity::Playing("Food Fight".to_string()),
                Activity::Playing("Chess".to_string()),
            ],
        );

        enter_lobby(&vm, &fake, 7, Instant::now())
            .await
            .unwrap();
        assert_eq!(fake.created()[0].name, "***Bar plays ***d Fight");
    }

    #[tokio::test]
    async fn unknown_member_falls_back_to_id() {
        let (vm, fake) = setup("vcbot-voice-nomember", ChannelConfig::default()).await;

        enter_lobby(&vm, &fake, 7, Instant::now())
            .await
            .unwrap();
        assert_eq!(fake.created()[0].name, "7's channel");
    }

    #[tokio::test]
    async fn configured_category_used_when_it_exists() {
        let other = CategoryId(60);
        let config = ChannelConfig {
            category: Some(other),
            ..ChannelConfig::default()
        };
        let (vm, fake) = setup("vcbot-voice-category", config).await;

        // Missing category: fall back to the lobby's.
        enter_lobby(&vm, &fake, 7, Instant::now())
            .await
            .unwrap();
        assert_eq!(fake.created()[0].category, Some(GAMES));

        fake.add_category(other);
        enter_lobby(&vm, &fake, 8, Instant::now())
            .await
            .unwrap();
        assert_eq!(fake.created()[1].category, Some(other));
    }

    #[tokio::test]
    async fn silent_rejections() {
        let (vm, fake) = setup("vcbot-voice-reject", ChannelConfig::default()).await;
        let now = Instant::now();

        assert_eq!(
            vm.join_at(GUILD, UserId(7), ChannelId(999), now).await.unwrap(),
            JoinOutcome::NotConfigured
        );

        {
            let mut bl = vm.context().stores.blacklist.lock().await;
            bl.append_unique(66);
        }
        assert_eq!(
            enter_lobby(&vm, &fake, 66, now).await.unwrap(),
            JoinOutcome::Blocked
        );

        fake.set_perms(BotPermissions {
            manage_channels: true,
            manage_roles: true,
            move_members: false,
        });
        assert_eq!(
            enter_lobby(&vm, &fake, 7, now).await.unwrap(),
            JoinOutcome::MissingPermissions
        );

        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn no_owner_override_without_manage_roles() {
        let (vm, fake) = setup("vcbot-voice-roles", ChannelConfig::default()).await;
        fake.set_perms(BotPermissions {
            manage_channels: true,
            manage_roles: false,
            move_members: true,
        });

        enter_lobby(&vm, &fake, 7, Instant::now())
            .await
            .unwrap();
        assert_eq!(fake.created()[0].owner_override, None);
    }

    #[tokio::test]
    async fn third_trigger_in_a_second_is_rate_limited() {
        let (vm, fake) = setup("vcbot-voice-rate", ChannelConfig::default()).await;
        let t0 = Instant::now();
        let u = UserId(7);

        let mut outcomes = Vec::new();
        for ms in [0u64, 400, 800] {
            outcomes.push(
                enter_lobby(&vm, &fake, 7, t0 + Duration::from_millis(ms))
                    .await
                    .unwrap(),
            );
        }
        let denied: Vec<&JoinOutcome> = outcomes
            .iter()
            .filter(|o| matches!(o, JoinOutcome::RateLimited { .. }))
            .collect();
        assert_eq!(denied.len(), 1);
        assert_eq!(
            *denied[0],
            JoinOutcome::RateLimited {
                retry_after: Duration::from_millis(9_200)
            }
        );
        assert!(fake
            .calls()
            .contains(&Call::Dm(u, rate_limit_message(Duration::from_millis(9_200)))));

        let fourth = enter_lobby(&vm, &fake, 7, t0 + Duration::from_secs(11))
            .await
            .unwrap();
        assert!(matches!(fourth, JoinOutcome::Created { .. }));
        assert_eq!(fake.created().len(), 3);
    }

    #[tokio::test]
    async fn repeated_spam_blocklists_user() {
        let (vm, fake) = setup("vcbot-voice-escalate", ChannelConfig::default()).await;
        let now = Instant::now();
        let u = UserId(7);

        let mut outcomes = Vec::new();
        for _ in 0..7 {
            outcomes.push(enter_lobby(&vm, &fake, 7, now).await.unwrap());
        }
        assert_eq!(
            outcomes
                .iter()
                .filter(|o| matches!(o, JoinOutcome::Escalated))
                .count(),
            1
        );
        assert_eq!(outcomes[6], JoinOutcome::Escalated);
        assert_eq!(*vm.context().stores.blacklist.lock().await, vec![7]);
        assert_eq!(vm.context().voice_guard.lock().await.violations(u), 0);

        // From now on the user is ignored before the limiter is consulted.
        assert_eq!(
            enter_lobby(&vm, &fake, 7, now + Duration::from_secs(60))
                .await
                .unwrap(),
            JoinOutcome::Blocked
        );
        assert_eq!(fake.created().len(), 2);
    }

    #[tokio::test]
    async fn create_failure_leaves_no_trace() {
        let (vm, fake) = setup("vcbot-voice-createfail", ChannelConfig::default()).await;
        fake.set_fail_create(true);

        let res = enter_lobby(&vm, &fake, 7, Instant::now()).await;
        assert!(res.is_err());
        assert!(managed(&vm).await.is_empty());
        assert!(!vm.context().stores.channels.path().exists());
    }

    #[tokio::test]
    async fn move_failure_keeps_channel_tracked_for_cleanup() {
        let (vm, fake) = setup("vcbot-voice-movefail", ChannelConfig::default()).await;
        fake.set_fail_move(true);

        let out = enter_lobby(&vm, &fake, 7, Instant::now())
            .await
            .unwrap();
        let JoinOutcome::Created { channel_id, moved } = out else {
            panic!("expected a channel, got {out:?}");
        };
        assert!(!moved);
        assert_eq!(managed(&vm).await, vec![channel_id]);

        // Nobody ever arrived; a later leave check reclaims it.
        assert_eq!(vm.leave(channel_id).await.unwrap(), LeaveOutcome::Deleted);
    }

    #[tokio::test]
    async fn failed_delete_keeps_ownership() {
        let (vm, fake) = setup("vcbot-voice-delfail", ChannelConfig::default()).await;
        let now = Instant::now();
        step(&vm, &fake, transition(7, None, Some(LOBBY)), now).await;
        let spawned = managed(&vm).await[0];

        fake.set_fail_delete(true);
        fake.place(UserId(7), None);
        assert!(vm.leave(spawned).await.is_err());
        assert_eq!(managed(&vm).await, vec![spawned]);

        fake.set_fail_delete(false);
        assert_eq!(vm.leave(spawned).await.unwrap(), LeaveOutcome::Deleted);
    }

    #[tokio::test]
    async fn vanished_channel_counts_as_deleted() {
        let (vm, fake) = setup("vcbot-voice-vanished", ChannelConfig::default()).await;
        let now = Instant::now();
        step(&vm, &fake, transition(7, None, Some(LOBBY)), now).await;
        let spawned = managed(&vm).await[0];

        fake.remove_channel(spawned);
        assert_eq!(vm.leave(spawned).await.unwrap(), LeaveOutcome::Deleted);
        assert!(managed(&vm).await.is_empty());
    }

    #[tokio::test]
    async fn pin_to_top_schedules_reposition() {
        let config = ChannelConfig {
            top: true,
            ..ChannelConfig::default()
        };
        let (vm, fake) = setup("vcbot-voice-top", config).await;

        let out = enter_lobby(&vm, &fake, 7, Instant::now())
            .await
            .unwrap();
        let JoinOutcome::Created { channel_id, .. } = out else {
            panic!("expected a channel, got {out:?}");
        };

        for _ in 0..50 {
            if fake.calls().contains(&Call::Position(channel_id, 0)) {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("reposition was never issued");
    }

    #[tokio::test]
    async fn concurrent_leaves_delete_once() {
        let (vm, fake) = setup("vcbot-voice-race", ChannelConfig::default()).await;
        let now = Instant::now();
        step(&vm, &fake, transition(7, None, Some(LOBBY)), now).await;
        let spawned = managed(&vm).await[0];
        fake.place(UserId(7), None);

        let (a, b) = tokio::join!(vm.leave(spawned), vm.leave(spawned));
        let mut outcomes = vec![a.unwrap(), b.unwrap()];
        outcomes.sort_by_key(|o| *o == LeaveOutcome::Deleted);
        assert_eq!(outcomes, vec![LeaveOutcome::NotManaged, LeaveOutcome::Deleted]);
        assert_eq!(fake.deleted(), vec![spawned]);
    }

    #[tokio::test]
    async fn delete_in_flight_does_not_block_joins() {
        let (vm, fake) = setup("vcbot-voice-inflight", ChannelConfig::default()).await;
        let now = Instant::now();
        step(&vm, &fake, transition(7, None, Some(LOBBY)), now).await;
        let spawned = managed(&vm).await[0];
        fake.place(UserId(7), None);

        let gate = fake.delete_gate.lock().await;
        let pending = tokio::spawn({
            let vm = vm.clone();
            async move { vm.leave(spawned).await }
        });
        for _ in 0..100 {
            if fake.deleted().contains(&spawned) {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(fake.deleted(), vec![spawned]);

        // Someone else spawns a room while the delete is stuck.
        step(&vm, &fake, transition(8, None, Some(LOBBY)), now).await;
        assert_eq!(fake.created().len(), 2);
        // A second leave does not issue another delete.
        assert_eq!(vm.leave(spawned).await.unwrap(), LeaveOutcome::NotManaged);

        drop(gate);
        assert_eq!(pending.await.unwrap().unwrap(), LeaveOutcome::Deleted);
        assert_eq!(fake.deleted(), vec![spawned]);
        let left = managed(&vm).await;
        assert_eq!(left.len(), 1);
        assert!(!left.contains(&spawned));
    }

    #[tokio::test]
    async fn same_channel_update_is_ignored() {
        let (vm, fake) = setup("vcbot-voice-mute", ChannelConfig::default()).await;
        vm.on_transition_at(transition(7, Some(LOBBY), Some(LOBBY)), Instant::now())
            .await;
        assert!(fake.calls().is_empty());
    }
}
