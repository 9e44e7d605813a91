use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::ids::{ChannelId, GuildId, RoleId, UserId};
use crate::domain::role::GuildRole;
use crate::emoji::EmojiRegistry;
use crate::wizard::draft::DraftConfig;
use crate::wizard::steps::{AwaitingInput, WizardStep};

pub const DEFAULT_SESSION_TIMEOUT_SECS: i64 = 300;

/// Select menus hold at most 25 options and one is the `none` sentinel.
pub const MAX_ROLE_OPTIONS: usize = 24;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    pub guild_id: GuildId,
    pub user_id: UserId,
}

impl SessionKey {
    pub fn new(guild_id: GuildId, user_id: UserId) -> Self {
        Self { guild_id, user_id }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleOption {
    pub id: RoleId,
    pub name: String,
}

/// Guild state captured when the session starts, so every step validates
/// against the same roles and emojis.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub roles: Vec<RoleOption>,
    /// Assignable roles left out because the menu was full.
    #[serde(default)]
    pub omitted_roles: usize,
    pub emojis: EmojiRegistry,
}

impl SessionSnapshot {
    pub fn new(roles: Vec<RoleOption>, emojis: EmojiRegistry) -> Self {
        Self { roles, omitted_roles: 0, emojis }
    }

    /// Keeps assignable roles only: no integration-managed roles and no @everyone.
    /// Roles past [`MAX_ROLE_OPTIONS`] are counted in `omitted_roles`.
    pub fn from_guild(guild_id: &GuildId, roles: &[GuildRole], emojis: EmojiRegistry) -> Self {
        let mut selectable = roles
            .iter()
            .filter(|role| role.is_selectable(guild_id))
            .map(|role| RoleOption { id: role.id.clone(), name: role.name.clone() })
            .collect::<Vec<_>>();
        let omitted_roles = selectable.len().saturating_sub(MAX_ROLE_OPTIONS);
        selectable.truncate(MAX_ROLE_OPTIONS);
        Self { roles: selectable, omitted_roles, emojis }
    }

    pub fn has_role(&self, id: &str) -> bool {
        self.roles.iter().any(|role| role.id.as_str() == id)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WizardSession {
    pub key: SessionKey,
    pub step: WizardStep,
    /// Channel the finished panel is posted to.
    pub target_channel: ChannelId,
    /// Channel where the wizard was started; free-text answers are read here.
    pub origin_channel: ChannelId,
    pub draft: DraftConfig,
    pub snapshot: SessionSnapshot,
    pub started_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl WizardSession {
    pub fn new(
        key: SessionKey,
        target_channel: ChannelId,
        origin_channel: ChannelId,
        draft: DraftConfig,
        snapshot: SessionSnapshot,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            key,
            step: WizardStep::first(),
            target_channel,
            origin_channel,
            draft,
            snapshot,
            started_at: now,
            last_activity: now,
        }
    }

    pub fn awaiting(&self) -> AwaitingInput {
        self.step.awaiting()
    }

    pub fn deadline(&self, timeout: Duration) -> DateTime<Utc> {
        self.last_activity + timeout
    }

    pub fn is_expired(&self, timeout: Duration, now: DateTime<Utc>) -> bool {
        now >= self.deadline(timeout)
    }
}

#[derive(Debug)]
pub enum SessionLookup<'a> {
    Active(&'a mut WizardSession),
    /// The session had timed out; it has been removed and is handed back once.
    Expired(WizardSession),
    Missing,
}

/// Live wizard sessions, at most one per (guild, user).
#[derive(Debug)]
pub struct SessionStore {
    sessions: HashMap<SessionKey, WizardSession>,
    timeout: Duration,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(Duration::seconds(DEFAULT_SESSION_TIMEOUT_SECS))
    }
}

impl SessionStore {
    pub fn new(timeout: Duration) -> Self {
        Self { sessions: HashMap::new(), timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Stores the session, returning whatever it replaced for the same key.
    pub fn begin(&mut self, session: WizardSession) -> Option<WizardSession> {
        self.sessions.insert(session.key.clone(), session)
    }

    /// Expired sessions read as absent but stay in place for the sweeper.
    pub fn get(&self, key: &SessionKey, now: DateTime<Utc>) -> Option<&WizardSession> {
        self.sessions.get(key).filter(|session| !session.is_expired(self.timeout, now))
    }

    pub fn get_mut(&mut self, key: &SessionKey, now: DateTime<Utc>) -> Option<&mut WizardSession> {
        let timeout = self.timeout;
        self.sessions.get_mut(key).filter(|session| !session.is_expired(timeout, now))
    }

    pub fn lookup(&mut self, key: &SessionKey, now: DateTime<Utc>) -> SessionLookup<'_> {
        let expired = match self.sessions.get(key) {
            None => return SessionLookup::Missing,
            Some(session) => session.is_expired(self.timeout, now),
        };

        if expired {
            return match self.sessions.remove(key) {
                Some(session) => SessionLookup::Expired(session),
                None => SessionLookup::Missing,
            };
        }

        match self.sessions.get_mut(key) {
            Some(session) => SessionLookup::Active(session),
            None => SessionLookup::Missing,
        }
    }

    pub fn remove(&mut self, key: &SessionKey) -> Option<WizardSession> {
        self.sessions.remove(key)
    }

    /// Resets the inactivity deadline. Returns false for missing or expired sessions.
    pub fn touch(&mut self, key: &SessionKey, now: DateTime<Utc>) -> bool {
        match self.get_mut(key, now) {
            Some(session) => {
                session.last_activity = now;
                true
            }
            None => false,
        }
    }

    pub fn take_expired(&mut self, now: DateTime<Utc>) -> Vec<WizardSession> {
        let timeout = self.timeout;
        let expired_keys = self
            .sessions
            .values()
            .filter(|session| session.is_expired(timeout, now))
            .map(|session| session.key.clone())
            .collect::<Vec<_>>();

        let mut expired = expired_keys
            .iter()
            .filter_map(|key| self.sessions.remove(key))
            .collect::<Vec<_>>();
        expired.sort_by_key(|session| session.last_activity);
        expired
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::{SessionKey, SessionLookup, SessionSnapshot, SessionStore, WizardSession};
    use crate::domain::guild_config::GuildConfig;
    use crate::domain::ids::{ChannelId, GuildId, UserId};
    use crate::domain::role::GuildRole;
    use crate::emoji::EmojiRegistry;
    use crate::wizard::draft::DraftConfig;
    use crate::wizard::steps::WizardStep;

    fn session(guild: &str, user: &str, now: chrono::DateTime<Utc>) -> WizardSession {
        let guild_id = GuildId::new(guild);
        WizardSession::new(
            SessionKey::new(guild_id.clone(), UserId::new(user)),
            ChannelId::new("500"),
            ChannelId::new("501"),
            DraftConfig::from_config(&GuildConfig::new(guild_id)),
            SessionSnapshot::default(),
            now,
        )
    }

    fn start() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).single().expect("valid time")
    }

    #[test]
    fn same_user_in_two_guilds_gets_two_sessions() {
        let mut store = SessionStore::default();
        store.begin(session("1", "42", start()));
        store.begin(session("2", "42", start()));

        assert_eq!(store.len(), 2);
    }

    #[test]
    fn begin_overwrites_the_existing_session_for_the_key() {
        let mut store = SessionStore::default();
        let mut first = session("1", "42", start());
        first.step = WizardStep::EmbedColor;
        store.begin(first);

        let replaced = store.begin(session("1", "42", start()));
        assert_eq!(replaced.map(|session| session.step), Some(WizardStep::EmbedColor));

        let key = SessionKey::new(GuildId::new("1"), UserId::new("42"));
        let current = store.get(&key, start()).map(|session| session.step);
        assert_eq!(current, Some(WizardStep::PanelType));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn expired_sessions_are_taken_exactly_once() {
        let mut store = SessionStore::new(Duration::minutes(5));
        store.begin(session("1", "42", start()));
        let key = SessionKey::new(GuildId::new("1"), UserId::new("42"));

        let later = start() + Duration::minutes(5);
        assert!(store.get(&key, later).is_none());
        assert_eq!(store.take_expired(later).len(), 1);
        assert!(store.take_expired(later).is_empty());
        assert!(store.is_empty());
    }

    #[test]
    fn touch_pushes_the_deadline_back() {
        let mut store = SessionStore::new(Duration::minutes(5));
        store.begin(session("1", "42", start()));
        let key = SessionKey::new(GuildId::new("1"), UserId::new("42"));

        assert!(store.touch(&key, start() + Duration::minutes(4)));
        assert!(store.take_expired(start() + Duration::minutes(6)).is_empty());
        assert_eq!(store.take_expired(start() + Duration::minutes(9)).len(), 1);
    }

    #[test]
    fn lookup_hands_back_an_expired_session_once() {
        let mut store = SessionStore::new(Duration::minutes(5));
        store.begin(session("1", "42", start()));
        let key = SessionKey::new(GuildId::new("1"), UserId::new("42"));

        assert!(matches!(store.lookup(&key, start()), SessionLookup::Active(_)));
        let later = start() + Duration::minutes(10);
        assert!(matches!(store.lookup(&key, later), SessionLookup::Expired(_)));
        assert!(matches!(store.lookup(&key, later), SessionLookup::Missing));
        assert!(store.take_expired(later).is_empty());
    }

    #[test]
    fn snapshot_skips_managed_and_everyone_roles() {
        let guild = GuildId::new("1");
        let roles = vec![
            GuildRole::new("1", "@everyone", false),
            GuildRole::new("2", "Support", false),
            GuildRole::new("3", "Music Bot", true),
        ];
        let snapshot = SessionSnapshot::from_guild(&guild, &roles, EmojiRegistry::default());

        assert_eq!(snapshot.roles.len(), 1);
        assert_eq!(snapshot.omitted_roles, 0);
        assert!(snapshot.has_role("2"));
        assert!(!snapshot.has_role("3"));
    }

    #[test]
    fn snapshot_counts_roles_that_do_not_fit_the_menu() {
        let guild = GuildId::new("1");
        let roles = (10..40)
            .map(|id| GuildRole::new(id.to_string(), format!("Role {id}"), false))
            .collect::<Vec<_>>();
        let snapshot = SessionSnapshot::from_guild(&guild, &roles, EmojiRegistry::default());

        assert_eq!(snapshot.roles.len(), super::MAX_ROLE_OPTIONS);
        assert_eq!(snapshot.omitted_roles, 6);
        assert!(snapshot.has_role("33"));
        assert!(!snapshot.has_role("34"));
    }
}
