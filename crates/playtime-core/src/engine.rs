//! Core playtime engine

use chrono::{DateTime, Local};
use playtime_api::{EngineState, HealthStatus, PlaytimeView};
use playtime_config::{RewardRule, RewardSettings, ServiceConfig};
use playtime_host_api::{GrantBackend, GrantTarget};
use playtime_store::{Store, StoreResult};
use playtime_util::{format_playtime, parse_timespec, whole_hours, PlaytimeError, Result, UserId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, error, info, warn};

use crate::{CoreEvent, Ledger, RewardDispatcher};

/// Engine tuning taken from the service configuration
#[derive(Debug, Clone, Copy)]
pub struct EngineOptions {
    /// Persist the ledger every N ticks
    pub flush_every_ticks: u64,
    /// Upper bound on one grant call
    pub grant_timeout: Duration,
}

impl EngineOptions {
    pub fn from_service(service: &ServiceConfig) -> Self {
        Self {
            flush_every_ticks: service.flush_every_ticks.max(1),
            grant_timeout: service.grant_timeout,
        }
    }
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self::from_service(&ServiceConfig::default())
    }
}

/// Result of the synchronous ledger half of a host event. Hand it to
/// [`PlaytimeEngine::settle`] to run the reward sweep and save it calls for.
#[derive(Debug, Clone)]
pub struct LedgerStep {
    pub user_id: UserId,
    /// Events produced by the ledger change itself
    pub events: Vec<CoreEvent>,
    /// Run a reward sweep for the user
    pub sweep: bool,
    /// Persist the ledger afterwards
    pub persist: bool,
}

impl LedgerStep {
    fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            events: Vec::new(),
            sweep: false,
            persist: false,
        }
    }
}

/// The playtime engine.
///
/// Shared behind an `Arc`; every method takes `&self`. The ledger lock is
/// only held for in-memory work, never across a grant call or a file write.
pub struct PlaytimeEngine {
    store: Arc<dyn Store>,
    dispatcher: RewardDispatcher,
    options: EngineOptions,
    rewards: RwLock<Arc<RewardSettings>>,
    ledger: Mutex<Ledger>,
    state: Mutex<EngineState>,
    /// Serializes reward sweeps per user
    sweep_locks: Mutex<HashMap<UserId, Arc<AsyncMutex<()>>>>,
    save_lock: Mutex<()>,
    ticks: AtomicU64,
}

impl PlaytimeEngine {
    /// Create a new engine in the `Stopped` state
    pub fn new(
        store: Arc<dyn Store>,
        grants: Arc<dyn GrantBackend>,
        rewards: RewardSettings,
        options: EngineOptions,
    ) -> Self {
        info!(
            rule_count = rewards.rules.rule_count(),
            rewards_enabled = rewards.enabled,
            flush_every_ticks = options.flush_every_ticks,
            "Playtime engine initialized"
        );

        Self {
            store,
            dispatcher: RewardDispatcher::new(grants, options.grant_timeout),
            options,
            rewards: RwLock::new(Arc::new(rewards)),
            ledger: Mutex::new(Ledger::new()),
            state: Mutex::new(EngineState::Stopped),
            sweep_locks: Mutex::new(HashMap::new()),
            save_lock: Mutex::new(()),
            ticks: AtomicU64::new(0),
        }
    }

    fn lock_ledger(&self) -> MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: EngineState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
        debug!(%state, "Engine state changed");
    }

    pub fn state(&self) -> EngineState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_running(&self) -> Result<()> {
        match self.state() {
            EngineState::Running => Ok(()),
            other => Err(PlaytimeError::not_running(other)),
        }
    }

    /// Current reward settings
    pub fn rewards(&self) -> Arc<RewardSettings> {
        self.rewards
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Load the ledger and start accepting events. A failed load starts from
    /// an empty ledger. Returns the number of users loaded.
    pub fn start(&self) -> Result<usize> {
        match self.state() {
            EngineState::Stopped => {}
            other => return Err(PlaytimeError::internal(format!("cannot start while {}", other))),
        }

        self.set_state(EngineState::Loading);

        let ledger = match self.store.load_snapshot() {
            Ok(Some(snapshot)) => Ledger::from_snapshot(snapshot),
            Ok(None) => {
                info!("No saved ledger, starting fresh");
                Ledger::new()
            }
            Err(e) => {
                error!(error = %e, "Failed to load ledger; starting with an empty one. Saved playtime will be overwritten on the next save");
                Ledger::new()
            }
        };

        let user_count = ledger.user_count();
        *self.lock_ledger() = ledger;
        self.ticks.store(0, Ordering::SeqCst);
        self.set_state(EngineState::Running);

        info!(user_count, "Playtime engine running");
        Ok(user_count)
    }

    // Host events: synchronous ledger steps

    /// Open a session for `user_id`
    pub fn record_login(
        &self,
        user_id: UserId,
        display_name: &str,
        now: DateTime<Local>,
    ) -> Result<LedgerStep> {
        self.ensure_running()?;

        let was_online = self.lock_ledger().login(user_id, display_name, now);
        if was_online {
            debug!(user_id = %user_id, "Login for an online user, session restarted");
        }
        info!(user_id = %user_id, display_name, "User logged in");

        let mut step = LedgerStep::new(user_id);
        step.events.push(CoreEvent::UserLoggedIn {
            user_id,
            display_name: display_name.to_string(),
        });
        step.sweep = true;
        Ok(step)
    }

    /// Close the session for `user_id`. A logout without a session changes
    /// nothing and asks for no follow-up.
    pub fn record_logout(&self, user_id: UserId, now: DateTime<Local>) -> Result<LedgerStep> {
        self.ensure_running()?;

        let mut step = LedgerStep::new(user_id);
        let (session_ms, total_ms) = {
            let mut ledger = self.lock_ledger();
            let Some(session_ms) = ledger.logout(&user_id, now) else {
                debug!(user_id = %user_id, "Logout without an open session ignored");
                return Ok(step);
            };
            (session_ms, ledger.current_total(&user_id, now))
        };

        info!(
            user_id = %user_id,
            session = %format_playtime(session_ms),
            total = %format_playtime(total_ms),
            "User logged out"
        );

        step.events.push(CoreEvent::UserLoggedOut {
            user_id,
            session_ms,
            total_ms,
        });
        step.sweep = true;
        step.persist = true;
        Ok(step)
    }

    /// Replace a user's accumulated time with a parsed duration string.
    /// An invalid string leaves the ledger unchanged.
    pub fn record_override(
        &self,
        user_id: UserId,
        duration: &str,
        now: DateTime<Local>,
    ) -> Result<LedgerStep> {
        self.ensure_running()?;

        let total_ms = parse_timespec(duration)?;
        let online = self.lock_ledger().set_absolute(user_id, total_ms, now);

        info!(
            user_id = %user_id,
            total = %format_playtime(total_ms),
            online,
            "Playtime overridden"
        );

        let mut step = LedgerStep::new(user_id);
        step.events.push(CoreEvent::PlaytimeSet { user_id, total_ms });
        step.sweep = online;
        step.persist = true;
        Ok(step)
    }

    /// Run the follow-up a ledger step asked for: reward sweep, then save.
    pub async fn settle(&self, step: LedgerStep, now: DateTime<Local>) -> Vec<CoreEvent> {
        let mut events = step.events;

        if step.sweep {
            events.extend(self.check_and_grant(step.user_id, now).await);
        }

        if step.persist {
            if let Some(event) = self.save_logged(now) {
                events.push(event);
            }
        }

        events
    }

    // Composite operations

    pub async fn login(
        &self,
        user_id: UserId,
        display_name: &str,
        now: DateTime<Local>,
    ) -> Result<Vec<CoreEvent>> {
        let step = self.record_login(user_id, display_name, now)?;
        Ok(self.settle(step, now).await)
    }

    pub async fn logout(&self, user_id: UserId, now: DateTime<Local>) -> Result<Vec<CoreEvent>> {
        let step = self.record_logout(user_id, now)?;
        Ok(self.settle(step, now).await)
    }

    pub async fn set_playtime(
        &self,
        user_id: UserId,
        duration: &str,
        now: DateTime<Local>,
    ) -> Result<Vec<CoreEvent>> {
        let step = self.record_override(user_id, duration, now)?;
        Ok(self.settle(step, now).await)
    }

    // Queries

    pub fn current_total(&self, user_id: &UserId, now: DateTime<Local>) -> u64 {
        self.lock_ledger().current_total(user_id, now)
    }

    /// Total playtime as `"<H>h <M>m <S>s"`
    pub fn formatted_playtime(&self, user_id: &UserId, now: DateTime<Local>) -> String {
        format_playtime(self.current_total(user_id, now))
    }

    pub fn playtime_view(&self, user_id: UserId, now: DateTime<Local>) -> PlaytimeView {
        self.lock_ledger().view(user_id, now)
    }

    pub fn health(&self) -> HealthStatus {
        let state = self.state();
        let (online_users, tracked_users) = {
            let ledger = self.lock_ledger();
            (ledger.online_count(), ledger.user_count())
        };

        HealthStatus {
            live: true,
            ready: state == EngineState::Running,
            engine_state: state,
            store_healthy: self.store.is_healthy(),
            grants_healthy: self.dispatcher.is_healthy(),
            online_users,
            tracked_users,
        }
    }

    // Rewards

    fn sweep_lock(&self, user_id: UserId) -> Arc<AsyncMutex<()>> {
        self.sweep_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(user_id)
            .or_default()
            .clone()
    }

    /// Grant every reached, not yet granted rule to `user_id`. Waits for any
    /// sweep already running for the same user. A no-op unless running.
    pub async fn check_and_grant(&self, user_id: UserId, now: DateTime<Local>) -> Vec<CoreEvent> {
        let rewards = self.rewards();
        if !rewards.enabled || self.ensure_running().is_err() {
            return Vec::new();
        }

        let lock = self.sweep_lock(user_id);
        let _guard = lock.lock().await;
        self.sweep(user_id, &rewards, now).await
    }

    async fn sweep(
        &self,
        user_id: UserId,
        rewards: &RewardSettings,
        now: DateTime<Local>,
    ) -> Vec<CoreEvent> {
        let (target, due): (GrantTarget, Vec<RewardRule>) = {
            let ledger = self.lock_ledger();
            let Some(account) = ledger.get(&user_id) else {
                return Vec::new();
            };

            let hours = whole_hours(account.total_at(now));
            let due = rewards
                .rules
                .reached(hours)
                .filter(|rule| !account.granted.contains(&rule.index))
                .cloned()
                .collect();
            let name = account
                .display_name
                .clone()
                .unwrap_or_else(|| user_id.to_string());

            (GrantTarget::new(user_id, name), due)
        };

        let mut events = Vec::new();

        for rule in due {
            // A grant started after shutdown began would never be saved
            if self.state() != EngineState::Running {
                debug!(user_id = %user_id, rule_index = rule.index, "Engine stopping, sweep abandoned");
                break;
            }

            let kind = match rule.reward_kind() {
                Ok(kind) => kind,
                Err(e) => {
                    warn!(user_id = %user_id, rule_index = rule.index, "{}", e);
                    events.push(CoreEvent::RewardSkipped {
                        user_id,
                        rule_index: rule.index,
                        kind: rule.kind.clone(),
                    });
                    continue;
                }
            };

            match self.dispatcher.grant(kind, &rule, &target).await {
                Ok(()) => {
                    self.lock_ledger().mark_granted(user_id, rule.index);
                    info!(
                        user_id = %user_id,
                        display_name = %target.display_name,
                        rule_index = rule.index,
                        %kind,
                        payload = %rule.payload,
                        "Reward granted"
                    );
                    events.push(CoreEvent::RewardGranted {
                        user_id,
                        rule_index: rule.index,
                        kind,
                        payload: rule.payload.clone(),
                    });
                }
                Err(e) => {
                    warn!(
                        user_id = %user_id,
                        rule_index = rule.index,
                        %kind,
                        error = %e,
                        "Reward grant failed, will retry"
                    );
                    events.push(CoreEvent::RewardFailed {
                        user_id,
                        rule_index: rule.index,
                        error: e.to_string(),
                    });
                }
            }
        }

        events
    }

    /// Swap reward settings. Already granted indices are kept as they are.
    pub fn reload_rewards(&self, rewards: RewardSettings) -> CoreEvent {
        let rule_count = rewards.rules.rule_count();
        let enabled = rewards.enabled;
        *self.rewards.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(rewards);

        info!(rule_count, enabled, "Reward rules reloaded");

        CoreEvent::RewardsReloaded {
            rule_count,
            enabled,
        }
    }

    // Persistence

    /// Fold every open session without disconnecting anyone
    pub fn flush_all(&self, now: DateTime<Local>) -> usize {
        self.lock_ledger().flush_all(now)
    }

    /// Fold every open session and write the ledger. Returns the number of
    /// users saved.
    pub fn save(&self, now: DateTime<Local>) -> StoreResult<usize> {
        let _save = self.save_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let snapshot = {
            let mut ledger = self.lock_ledger();
            ledger.flush_all(now);
            ledger.snapshot()
        };

        self.store.save_snapshot(&snapshot)?;
        Ok(snapshot.user_count())
    }

    /// Save, logging failures. In-memory state stays authoritative.
    fn save_logged(&self, now: DateTime<Local>) -> Option<CoreEvent> {
        match self.save(now) {
            Ok(user_count) => {
                debug!(user_count, "Ledger saved");
                Some(CoreEvent::LedgerSaved { user_count })
            }
            Err(e) => {
                error!(error = %e, "Failed to save ledger");
                None
            }
        }
    }

    // Periodic driver

    /// One periodic tick: sweep every online user, then save when the flush
    /// cadence comes round. Users whose previous sweep is still running are
    /// skipped this tick. A no-op unless running.
    pub async fn tick(&self, now: DateTime<Local>) -> Vec<CoreEvent> {
        if self.ensure_running().is_err() {
            return Vec::new();
        }

        let tick = self.ticks.fetch_add(1, Ordering::SeqCst) + 1;
        let mut events = Vec::new();

        let rewards = self.rewards();
        if rewards.enabled {
            let online = self.lock_ledger().online_users();
            for user_id in online {
                let lock = self.sweep_lock(user_id);
                let Ok(_guard) = lock.try_lock() else {
                    debug!(user_id = %user_id, "Sweep still in flight, skipping");
                    continue;
                };
                events.extend(self.sweep(user_id, &rewards, now).await);
            }
        }

        if tick % self.options.flush_every_ticks == 0 {
            if let Some(event) = self.save_logged(now) {
                events.push(event);
            }
        }

        events
    }

    /// Stop accepting events, wait for grants already in flight, then fold
    /// every session and write the ledger one last time.
    pub async fn shutdown(&self, now: DateTime<Local>) -> Result<usize> {
        self.ensure_running()?;
        self.set_state(EngineState::Stopping);

        // Sweeps re-check the state before each grant, so once a sweep lock
        // is free nothing more will be granted for that user.
        let locks: Vec<_> = self
            .sweep_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        for lock in locks {
            drop(lock.lock().await);
        }

        let result = self.save(now);
        self.set_state(EngineState::Stopped);

        let user_count = result.map_err(|e| PlaytimeError::store(e.to_string()))?;
        info!(user_count, "Final ledger save complete");
        Ok(user_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use playtime_api::RewardKind;
    use playtime_config::RuleTable;
    use playtime_host_api::{GrantCapabilities, MockGrants};
    use playtime_store::{JsonFileStore, LedgerSnapshot, MemoryStore};
    use playtime_util::{MILLIS_PER_HOUR, TimeSpecError};

    fn t0() -> DateTime<Local> {
        Local.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    fn after_ms(ms: u64) -> DateTime<Local> {
        t0() + chrono::Duration::milliseconds(ms as i64)
    }

    fn hours(h: u64) -> DateTime<Local> {
        after_ms(h * MILLIS_PER_HOUR)
    }

    fn settings(lines: &[&str]) -> RewardSettings {
        RewardSettings::new(true, RuleTable::parse(lines))
    }

    struct Harness {
        engine: PlaytimeEngine,
        store: Arc<MemoryStore>,
        grants: Arc<MockGrants>,
    }

    fn harness(lines: &[&str]) -> Harness {
        harness_with(lines, MockGrants::new(), EngineOptions::default())
    }

    fn harness_with(lines: &[&str], grants: MockGrants, options: EngineOptions) -> Harness {
        let store = Arc::new(MemoryStore::new());
        let grants = Arc::new(grants);
        let engine = PlaytimeEngine::new(store.clone(), grants.clone(), settings(lines), options);
        engine.start().unwrap();
        Harness {
            engine,
            store,
            grants,
        }
    }

    fn granted(engine: &PlaytimeEngine, user: UserId) -> Vec<usize> {
        engine.playtime_view(user, t0()).granted_rewards
    }

    #[tokio::test]
    async fn test_events_rejected_until_started() {
        let engine = PlaytimeEngine::new(
            Arc::new(MemoryStore::new()),
            Arc::new(MockGrants::new()),
            RewardSettings::default(),
            EngineOptions::default(),
        );

        let result = engine.login(UserId::new(), "Steve", t0()).await;
        assert!(matches!(result, Err(PlaytimeError::NotRunning(_))));
        assert!(engine.tick(t0()).await.is_empty());

        engine.start().unwrap();
        assert_eq!(engine.state(), EngineState::Running);
        assert!(engine.login(UserId::new(), "Steve", t0()).await.is_ok());
    }

    #[tokio::test]
    async fn test_session_fold_across_flush() {
        let h = harness(&[]);
        let user = UserId::new();

        h.engine.login(user, "Steve", t0()).await.unwrap();
        h.engine.flush_all(after_ms(1000));
        h.engine.logout(user, after_ms(2500)).await.unwrap();

        assert_eq!(h.engine.current_total(&user, after_ms(9000)), 2500);
    }

    #[tokio::test]
    async fn test_logout_sweeps_and_saves() {
        let h = harness(&["1:group:regular"]);
        let user = UserId::new();

        h.engine.login(user, "Steve", t0()).await.unwrap();
        let events = h.engine.logout(user, hours(1)).await.unwrap();

        assert!(matches!(events[0], CoreEvent::UserLoggedOut { session_ms, .. } if session_ms == MILLIS_PER_HOUR));
        assert!(events
            .iter()
            .any(|e| matches!(e, CoreEvent::RewardGranted { rule_index: 0, .. })));
        assert!(matches!(events.last(), Some(CoreEvent::LedgerSaved { user_count: 1 })));

        let saved = h.store.saved().unwrap();
        assert_eq!(saved.playtimes[&user], MILLIS_PER_HOUR);
        assert!(saved.given_rewards[&user].contains(&0));
    }

    #[tokio::test]
    async fn test_logout_without_login_does_nothing() {
        let h = harness(&["0:group:newcomer"]);
        let user = UserId::new();

        let events = h.engine.logout(user, t0()).await.unwrap();
        assert!(events.is_empty());
        assert_eq!(h.store.save_count(), 0);
        assert!(h.grants.calls().is_empty());
    }

    #[tokio::test]
    async fn test_sweep_grants_each_rule_once() {
        let h = harness(&["1:command:say %player% hi", "24:group:apprentice", "168:group:architect"]);
        let user = UserId::new();

        h.engine.set_playtime(user, "2d", t0()).await.unwrap();
        h.engine.login(user, "Steve", t0()).await.unwrap();
        assert_eq!(granted(&h.engine, user), vec![0, 1]);

        let again = h.engine.check_and_grant(user, t0()).await;
        assert!(again.is_empty());
        assert_eq!(granted(&h.engine, user), vec![0, 1]);
        assert_eq!(h.grants.calls().len(), 2);
        assert_eq!(h.grants.calls()[0].value, "say Steve hi");
    }

    #[tokio::test]
    async fn test_hours_truncate() {
        let h = harness(&["1:group:regular"]);
        let user = UserId::new();

        h.engine.login(user, "Steve", t0()).await.unwrap();
        let almost = after_ms(MILLIS_PER_HOUR - 1);
        assert!(h.engine.check_and_grant(user, almost).await.is_empty());
        assert_eq!(h.engine.check_and_grant(user, hours(1)).await.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_grant_is_retried() {
        let grants = MockGrants::new();
        grants.set_failing(RewardKind::Group, true);
        let h = harness_with(&["0:group:a", "0:permission:b"], grants, EngineOptions::default());
        let user = UserId::new();

        let events = h.engine.login(user, "Steve", t0()).await.unwrap();
        assert!(events
            .iter()
            .any(|e| matches!(e, CoreEvent::RewardFailed { rule_index: 0, .. })));
        assert_eq!(granted(&h.engine, user), vec![1]);

        h.grants.set_failing(RewardKind::Group, false);
        h.engine.check_and_grant(user, t0()).await;
        assert_eq!(granted(&h.engine, user), vec![0, 1]);
    }

    #[tokio::test]
    async fn test_unavailable_kind_stays_ungranted() {
        let grants =
            MockGrants::new().with_capabilities(GrantCapabilities::none().with_kind(RewardKind::Command));
        let h = harness_with(&["0:group:a", "0:command:say hi"], grants, EngineOptions::default());
        let user = UserId::new();

        h.engine.login(user, "Steve", t0()).await.unwrap();
        assert_eq!(granted(&h.engine, user), vec![1]);
    }

    #[tokio::test]
    async fn test_unknown_kind_is_skipped_and_keeps_index() {
        let h = harness(&["0:title:champion", "bad line", "0:group:a"]);
        let user = UserId::new();

        let events = h.engine.login(user, "Steve", t0()).await.unwrap();
        assert!(events
            .iter()
            .any(|e| matches!(e, CoreEvent::RewardSkipped { rule_index: 0, .. })));
        assert_eq!(granted(&h.engine, user), vec![2]);
    }

    #[tokio::test]
    async fn test_disabled_rewards_grant_nothing() {
        let h = harness(&["0:group:a"]);
        h.engine
            .reload_rewards(RewardSettings::new(false, RuleTable::parse(&["0:group:a"])));
        let user = UserId::new();

        h.engine.login(user, "Steve", t0()).await.unwrap();
        h.engine.tick(t0()).await;
        assert!(h.grants.calls().is_empty());
    }

    #[tokio::test]
    async fn test_override_for_online_user() {
        let h = harness(&["10:group:veteran"]);
        let user = UserId::new();

        h.engine.login(user, "Steve", t0()).await.unwrap();
        let now = after_ms(5000);
        let events = h.engine.set_playtime(user, "10h", now).await.unwrap();

        assert_eq!(h.engine.current_total(&user, now), 36_000_000);
        assert!(events
            .iter()
            .any(|e| matches!(e, CoreEvent::RewardGranted { rule_index: 0, .. })));
        assert_eq!(h.store.save_count(), 1);
    }

    #[tokio::test]
    async fn test_override_for_offline_user_saves_without_sweep() {
        let h = harness(&["0:group:a"]);
        let user = UserId::new();

        let events = h.engine.set_playtime(user, "3h", t0()).await.unwrap();
        assert!(h.grants.calls().is_empty());
        assert!(matches!(events.last(), Some(CoreEvent::LedgerSaved { .. })));
        assert_eq!(h.store.saved().unwrap().playtimes[&user], 3 * MILLIS_PER_HOUR);
    }

    #[tokio::test]
    async fn test_invalid_override_changes_nothing() {
        let h = harness(&[]);
        let user = UserId::new();
        h.engine.set_playtime(user, "1h", t0()).await.unwrap();

        let result = h.engine.set_playtime(user, "5x", t0()).await;
        assert!(matches!(
            result,
            Err(PlaytimeError::InvalidDuration(TimeSpecError::UnknownUnit('x')))
        ));
        assert_eq!(h.engine.current_total(&user, t0()), MILLIS_PER_HOUR);
        assert_eq!(h.store.save_count(), 1);
    }

    #[tokio::test]
    async fn test_override_keeps_granted_rewards() {
        let h = harness(&["1:group:a"]);
        let user = UserId::new();

        h.engine.login(user, "Steve", t0()).await.unwrap();
        h.engine.set_playtime(user, "2h", t0()).await.unwrap();
        h.engine.set_playtime(user, "0s", t0()).await.unwrap();

        assert_eq!(granted(&h.engine, user), vec![0]);
        assert_eq!(h.grants.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_tick_sweeps_online_users_and_saves_on_cadence() {
        let options = EngineOptions {
            flush_every_ticks: 3,
            grant_timeout: Duration::from_secs(1),
        };
        let h = harness_with(&["1:group:regular"], MockGrants::new(), options);
        let online = UserId::new();
        let offline = UserId::new();

        h.engine.set_playtime(offline, "5h", t0()).await.unwrap();
        h.engine.login(online, "Steve", t0()).await.unwrap();
        let saves_before = h.store.save_count();

        let first = h.engine.tick(hours(1)).await;
        assert!(first
            .iter()
            .any(|e| matches!(e, CoreEvent::RewardGranted { user_id, .. } if *user_id == online)));
        assert!(!granted(&h.engine, offline).contains(&0));

        h.engine.tick(hours(1)).await;
        assert_eq!(h.store.save_count(), saves_before);
        let third = h.engine.tick(hours(2)).await;
        assert!(third.iter().any(|e| matches!(e, CoreEvent::LedgerSaved { .. })));
        assert_eq!(h.store.saved().unwrap().playtimes[&online], 2 * MILLIS_PER_HOUR);
    }

    #[tokio::test]
    async fn test_tick_skips_user_with_sweep_in_flight() {
        let h = harness(&["0:group:a"]);
        let user = UserId::new();
        h.engine.record_login(user, "Steve", t0()).unwrap();

        let lock = h.engine.sweep_lock(user);
        let held = lock.lock().await;
        assert!(h.engine.tick(t0()).await.is_empty());
        drop(held);

        assert_eq!(h.engine.tick(t0()).await.len(), 1);
    }

    #[tokio::test]
    async fn test_slow_grant_does_not_block_other_users() {
        let grants = MockGrants::new();
        grants.set_delay(Some(Duration::from_millis(300)));
        let options = EngineOptions {
            flush_every_ticks: 1200,
            grant_timeout: Duration::from_secs(5),
        };
        let h = Arc::new(harness_with(&["0:group:a"], grants, options));
        let slow = UserId::new();
        let other = UserId::new();

        let step = h.engine.record_login(slow, "Slow", t0()).unwrap();
        let engine = h.clone();
        let pending = tokio::spawn(async move { engine.engine.settle(step, t0()).await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        let started = std::time::Instant::now();
        h.engine.record_login(other, "Other", t0()).unwrap();
        h.engine.record_logout(other, after_ms(10)).unwrap();
        assert!(started.elapsed() < Duration::from_millis(100));

        pending.await.unwrap();
        assert_eq!(granted(&h.engine, slow), vec![0]);
    }

    #[tokio::test]
    async fn test_save_failure_keeps_memory_state() {
        let h = harness(&[]);
        let user = UserId::new();
        h.store.set_fail_saves(true);

        h.engine.login(user, "Steve", t0()).await.unwrap();
        let events = h.engine.logout(user, after_ms(1000)).await.unwrap();

        assert!(!events.iter().any(|e| matches!(e, CoreEvent::LedgerSaved { .. })));
        assert_eq!(h.engine.current_total(&user, after_ms(1000)), 1000);
        assert!(!h.engine.health().store_healthy);
    }

    #[tokio::test]
    async fn test_start_restores_saved_ledger() {
        let user = UserId::new();
        let mut snapshot = LedgerSnapshot::default();
        snapshot.playtimes.insert(user, 25 * MILLIS_PER_HOUR);
        snapshot.given_rewards.insert(user, [0].into());

        let store = Arc::new(MemoryStore::with_snapshot(snapshot));
        let grants = Arc::new(MockGrants::new());
        let engine = PlaytimeEngine::new(
            store,
            grants.clone(),
            settings(&["1:group:a", "24:group:b"]),
            EngineOptions::default(),
        );
        assert_eq!(engine.start().unwrap(), 1);

        engine.login(user, "Steve", t0()).await.unwrap();
        assert_eq!(grants.calls().len(), 1);
        assert_eq!(grants.calls()[0].value, "b");
    }

    #[tokio::test]
    async fn test_corrupt_ledger_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("playtimes.json");
        std::fs::write(&path, "not json at all").unwrap();

        let engine = PlaytimeEngine::new(
            Arc::new(JsonFileStore::new(&path)),
            Arc::new(MockGrants::new()),
            RewardSettings::default(),
            EngineOptions::default(),
        );

        assert_eq!(engine.start().unwrap(), 0);
        assert_eq!(engine.state(), EngineState::Running);
    }

    #[tokio::test]
    async fn test_shutdown_folds_and_saves() {
        let h = harness(&[]);
        let user = UserId::new();
        h.engine.login(user, "Steve", t0()).await.unwrap();

        assert_eq!(h.engine.shutdown(after_ms(4000)).await.unwrap(), 1);
        assert_eq!(h.engine.state(), EngineState::Stopped);
        assert_eq!(h.store.saved().unwrap().playtimes[&user], 4000);

        let result = h.engine.record_login(user, "Steve", after_ms(5000));
        assert!(matches!(result, Err(PlaytimeError::NotRunning(_))));
    }

    #[tokio::test]
    async fn test_health_reports_counts() {
        let h = harness(&[]);
        h.engine.login(UserId::new(), "a", t0()).await.unwrap();
        h.engine.set_playtime(UserId::new(), "1h", t0()).await.unwrap();

        let health = h.engine.health();
        assert!(health.ready);
        assert_eq!(health.online_users, 1);
        assert_eq!(health.tracked_users, 2);
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_grant_in_flight() {
        let grants = MockGrants::new();
        grants.set_delay(Some(Duration::from_millis(200)));
        let options = EngineOptions {
            flush_every_ticks: 1200,
            grant_timeout: Duration::from_secs(5),
        };
        let h = Arc::new(harness_with(&["0:group:a", "0:group:b"], grants, options));
        let user = UserId::new();

        let step = h.engine.record_login(user, "Steve", t0()).unwrap();
        let engine = h.clone();
        let pending = tokio::spawn(async move { engine.engine.settle(step, t0()).await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        h.engine.shutdown(after_ms(1000)).await.unwrap();
        pending.await.unwrap();

        // The grant already running finished and was saved; the next rule
        // was never started
        assert_eq!(h.grants.calls().len(), 1);
        let saved = h.store.saved().unwrap();
        assert_eq!(saved.given_rewards[&user].iter().copied().collect::<Vec<_>>(), vec![0]);

        let grants = Arc::new(MockGrants::new());
        let restarted = PlaytimeEngine::new(
            Arc::new(MemoryStore::with_snapshot(saved)),
            grants.clone(),
            settings(&["0:group:a", "0:group:b"]),
            EngineOptions::default(),
        );
        restarted.start().unwrap();
        restarted.login(user, "Steve", after_ms(2000)).await.unwrap();

        let calls = grants.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].value, "b");
    }

    #[tokio::test]
    async fn test_no_grants_after_shutdown() {
        let h = harness(&["0:group:a"]);
        let user = UserId::new();
        h.engine.record_login(user, "Steve", t0()).unwrap();
        h.engine.shutdown(t0()).await.unwrap();

        assert!(h.engine.check_and_grant(user, t0()).await.is_empty());
        assert!(h.engine.tick(t0()).await.is_empty());
        assert!(h.grants.calls().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_sweeps_grant_each_rule_once() {
        let grants = MockGrants::new();
        grants.set_delay(Some(Duration::from_millis(100)));
        let options = EngineOptions {
            flush_every_ticks: 1200,
            grant_timeout: Duration::from_secs(5),
        };
        let h = Arc::new(harness_with(&["0:group:a", "0:permission:fly"], grants, options));
        let user = UserId::new();
        h.engine.record_login(user, "Steve", t0()).unwrap();

        let first = {
            let h = h.clone();
            tokio::spawn(async move { h.engine.check_and_grant(user, t0()).await })
        };
        let second = {
            let h = h.clone();
            tokio::spawn(async move { h.engine.check_and_grant(user, t0()).await })
        };
        let ticked = {
            let h = h.clone();
            tokio::spawn(async move { h.engine.tick(t0()).await })
        };

        first.await.unwrap();
        second.await.unwrap();
        ticked.await.unwrap();

        let calls = h.grants.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls.iter().filter(|c| c.value == "a").count(), 1);
        assert_eq!(calls.iter().filter(|c| c.value == "fly").count(), 1);
        assert_eq!(granted(&h.engine, user), vec![0, 1]);
    }
}
