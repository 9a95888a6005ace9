//! Session ledger

use chrono::{DateTime, Local};
use playtime_api::PlaytimeView;
use playtime_store::LedgerSnapshot;
use playtime_util::{elapsed_millis, format_playtime, UserId};
use std::collections::{BTreeSet, HashMap};

/// Per-user ledger entry
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Account {
    /// Folded playtime, excluding the in-progress session
    pub accumulated_ms: u64,

    /// Rule indices already granted
    pub granted: BTreeSet<usize>,

    /// Start of the in-progress session (or of its last flush)
    pub session_start: Option<DateTime<Local>>,

    /// Name supplied at the most recent login
    pub display_name: Option<String>,
}

impl Account {
    pub fn is_online(&self) -> bool {
        self.session_start.is_some()
    }

    /// Accumulated time plus the live part of the current session
    pub fn total_at(&self, now: DateTime<Local>) -> u64 {
        let live = self
            .session_start
            .map(|start| elapsed_millis(start, now))
            .unwrap_or(0);
        self.accumulated_ms.saturating_add(live)
    }

    /// Fold the live part of the session into `accumulated_ms` and restart
    /// the session at `now`. Returns the folded amount.
    ///
    /// The marker never moves backwards, so folding with a stale `now`
    /// cannot count the same interval twice.
    fn fold(&mut self, now: DateTime<Local>) -> u64 {
        let Some(start) = self.session_start else {
            return 0;
        };
        let elapsed = elapsed_millis(start, now);
        self.accumulated_ms = self.accumulated_ms.saturating_add(elapsed);
        self.session_start = Some(start.max(now));
        elapsed
    }
}

/// In-memory playtime ledger for every known user
#[derive(Debug, Default)]
pub struct Ledger {
    accounts: HashMap<UserId, Account>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from a persisted snapshot. Nobody is online afterwards.
    pub fn from_snapshot(snapshot: LedgerSnapshot) -> Self {
        let mut accounts: HashMap<UserId, Account> = HashMap::new();

        for (user_id, ms) in snapshot.playtimes {
            accounts.entry(user_id).or_default().accumulated_ms = ms;
        }
        for (user_id, granted) in snapshot.given_rewards {
            accounts.entry(user_id).or_default().granted = granted;
        }

        Self { accounts }
    }

    /// Persistable copy of the ledger. Live sessions are not folded here;
    /// call [`Ledger::flush_all`] first.
    pub fn snapshot(&self) -> LedgerSnapshot {
        let mut snapshot = LedgerSnapshot::default();
        for (user_id, account) in &self.accounts {
            snapshot.playtimes.insert(*user_id, account.accumulated_ms);
            snapshot
                .given_rewards
                .insert(*user_id, account.granted.clone());
        }
        snapshot
    }

    pub fn get(&self, user_id: &UserId) -> Option<&Account> {
        self.accounts.get(user_id)
    }

    pub fn contains(&self, user_id: &UserId) -> bool {
        self.accounts.contains_key(user_id)
    }

    /// Start a session. A login while already online folds the running
    /// session first, so a duplicate notification never loses time.
    /// Returns true if the user was already online.
    pub fn login(&mut self, user_id: UserId, display_name: &str, now: DateTime<Local>) -> bool {
        let account = self.accounts.entry(user_id).or_default();
        let was_online = account.is_online();
        account.fold(now);
        account.session_start = Some(now);
        account.display_name = Some(display_name.to_string());
        was_online
    }

    /// End a session and fold its time. Returns the session's elapsed time,
    /// or `None` if the user had no open session.
    pub fn logout(&mut self, user_id: &UserId, now: DateTime<Local>) -> Option<u64> {
        let account = self.accounts.get_mut(user_id)?;
        if !account.is_online() {
            return None;
        }
        let elapsed = account.fold(now);
        account.session_start = None;
        Some(elapsed)
    }

    /// Accumulated plus live time. Unknown users have zero.
    pub fn current_total(&self, user_id: &UserId, now: DateTime<Local>) -> u64 {
        self.accounts
            .get(user_id)
            .map(|account| account.total_at(now))
            .unwrap_or(0)
    }

    /// Replace a user's accumulated time. An online user's session restarts
    /// at `now`. Granted rewards are left untouched. Returns whether the
    /// user is online.
    pub fn set_absolute(&mut self, user_id: UserId, millis: u64, now: DateTime<Local>) -> bool {
        let account = self.accounts.entry(user_id).or_default();
        account.accumulated_ms = millis;
        if account.is_online() {
            account.session_start = Some(now);
            true
        } else {
            false
        }
    }

    /// Fold every open session without disconnecting anyone.
    /// Returns the number of sessions folded.
    pub fn flush_all(&mut self, now: DateTime<Local>) -> usize {
        let mut folded = 0;
        for account in self.accounts.values_mut().filter(|a| a.is_online()) {
            account.fold(now);
            folded += 1;
        }
        folded
    }

    pub fn is_granted(&self, user_id: &UserId, rule_index: usize) -> bool {
        self.accounts
            .get(user_id)
            .is_some_and(|account| account.granted.contains(&rule_index))
    }

    /// Record a successful grant. Returns false if it was already recorded.
    pub fn mark_granted(&mut self, user_id: UserId, rule_index: usize) -> bool {
        self.accounts
            .entry(user_id)
            .or_default()
            .granted
            .insert(rule_index)
    }

    pub fn online_users(&self) -> Vec<UserId> {
        self.accounts
            .iter()
            .filter(|(_, account)| account.is_online())
            .map(|(user_id, _)| *user_id)
            .collect()
    }

    pub fn online_count(&self) -> usize {
        self.accounts.values().filter(|a| a.is_online()).count()
    }

    pub fn user_count(&self) -> usize {
        self.accounts.len()
    }

    /// Client-facing view. Unknown users report zero time.
    pub fn view(&self, user_id: UserId, now: DateTime<Local>) -> PlaytimeView {
        let account = self.accounts.get(&user_id);
        let total_ms = self.current_total(&user_id, now);

        PlaytimeView {
            user_id,
            display_name: account.and_then(|a| a.display_name.clone()),
            total_ms,
            formatted: format_playtime(total_ms),
            online: account.is_some_and(Account::is_online),
            session_started_at: account.and_then(|a| a.session_start),
            granted_rewards: account
                .map(|a| a.granted.iter().copied().collect())
                .unwrap_or_default(),
        }
    }
}
