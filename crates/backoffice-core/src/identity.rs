//! Caller roles and identity resolution.
//!
//! Every caller carries exactly one [`Role`]. Resolution checks credentials in
//! a fixed priority order: bot token, admin token, POS session, and finally
//! the anonymous `everyone` role.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use http::HeaderMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::BackofficeResult;

/// Header carrying the automation shared secret.
pub const BOT_TOKEN_HEADER: &str = "bottoken";

/// Header carrying the administrator shared secret.
pub const ADMIN_TOKEN_HEADER: &str = "admin-token";

/// Coarse caller category gating contract access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Any caller, authenticated or not.
    Everyone,
    /// An in-store terminal with a logged-in staff session.
    Pos,
    /// Scheduled automation.
    Bot,
    /// Platform administrator.
    Admin,
}

impl Role {
    /// Every role, in declaration order.
    pub const ALL: [Role; 4] = [Role::Everyone, Role::Pos, Role::Bot, Role::Admin];

    /// Lowercase wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Everyone => "everyone",
            Self::Pos => "pos",
            Self::Bot => "bot",
            Self::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| format!("unknown role '{s}'"))
    }
}

/// A logged-in POS staff session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PosSession {
    /// Staff account.
    pub account_id: i64,
    /// Corporation the account belongs to.
    pub corporation_id: i64,
    /// Stores the account is linked to.
    pub store_ids: BTreeSet<i64>,
    /// Permission flags granted through the account group.
    pub permissions: BTreeSet<String>,
}

impl PosSession {
    /// Creates a session with no stores or permissions.
    #[must_use]
    pub fn new(account_id: i64, corporation_id: i64) -> Self {
        Self {
            account_id,
            corporation_id,
            store_ids: BTreeSet::new(),
            permissions: BTreeSet::new(),
        }
    }

    /// Links the session to a store.
    #[must_use]
    pub fn with_store(mut self, store_id: i64) -> Self {
        self.store_ids.insert(store_id);
        self
    }

    /// Grants a permission flag.
    #[must_use]
    pub fn with_permission(mut self, flag: impl Into<String>) -> Self {
        self.permissions.insert(flag.into());
        self
    }
}

/// Who is calling.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CallerIdentity {
    /// No credentials.
    #[default]
    Anonymous,
    /// POS terminal session.
    Pos(PosSession),
    /// Automation presenting the bot token.
    Bot,
    /// Administrator presenting the admin token.
    Admin,
}

impl CallerIdentity {
    /// The single role this caller carries.
    #[must_use]
    pub const fn role(&self) -> Role {
        match self {
            Self::Anonymous => Role::Everyone,
            Self::Pos(_) => Role::Pos,
            Self::Bot => Role::Bot,
            Self::Admin => Role::Admin,
        }
    }

    /// The POS session, if any.
    #[must_use]
    pub fn session(&self) -> Option<&PosSession> {
        match self {
            Self::Pos(session) => Some(session),
            _ => None,
        }
    }

    /// Identifier safe to write to logs.
    #[must_use]
    pub fn log_id(&self) -> String {
        match self {
            Self::Anonymous => "anonymous".to_string(),
            Self::Pos(s) => format!("pos:{}", s.account_id),
            Self::Bot => "bot".to_string(),
            Self::Admin => "admin".to_string(),
        }
    }
}

/// Looks up POS sessions by bearer token.
#[async_trait]
pub trait SessionResolver: Send + Sync {
    /// Returns the session for `token`, or `None` if it is unknown or expired.
    async fn resolve(&self, token: &str) -> BackofficeResult<Option<PosSession>>;
}

/// In-memory session table.
#[derive(Debug, Default)]
pub struct StaticSessions {
    sessions: RwLock<HashMap<String, PosSession>>,
}

impl StaticSessions {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a session.
    pub fn insert(&self, token: impl Into<String>, session: PosSession) {
        self.sessions.write().insert(token.into(), session);
    }

    /// Drops a session.
    pub fn revoke(&self, token: &str) {
        self.sessions.write().remove(token);
    }
}

#[async_trait]
impl SessionResolver for StaticSessions {
    async fn resolve(&self, token: &str) -> BackofficeResult<Option<PosSession>> {
        Ok(self.sessions.read().get(token).cloned())
    }
}

/// Resolves the caller of a request from its headers.
#[derive(Clone)]
pub struct IdentityResolver {
    bot_token: Option<String>,
    admin_token: Option<String>,
    sessions: Arc<dyn SessionResolver>,
}

impl fmt::Debug for IdentityResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityResolver")
            .field("bot_token", &self.bot_token.as_ref().map(|_| "<redacted>"))
            .field("admin_token", &self.admin_token.as_ref().map(|_| "<redacted>"))
            .finish_non_exhaustive()
    }
}

impl IdentityResolver {
    /// Creates a resolver. Empty tokens disable the corresponding role.
    #[must_use]
    pub fn new(
        bot_token: Option<String>,
        admin_token: Option<String>,
        sessions: Arc<dyn SessionResolver>,
    ) -> Self {
        Self {
            bot_token: bot_token.filter(|t| !t.is_empty()),
            admin_token: admin_token.filter(|t| !t.is_empty()),
            sessions,
        }
    }

    /// Resolves the caller. Unknown credentials fall through to `Anonymous`.
    pub async fn resolve(&self, headers: &HeaderMap) -> BackofficeResult<CallerIdentity> {
        if header_matches(headers, BOT_TOKEN_HEADER, self.bot_token.as_deref()) {
            return Ok(CallerIdentity::Bot);
        }
        if header_matches(headers, ADMIN_TOKEN_HEADER, self.admin_token.as_deref()) {
            return Ok(CallerIdentity::Admin);
        }

        let bearer = headers
            .get(http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty());

        if let Some(token) = bearer {
            if let Some(session) = self.sessions.resolve(token).await? {
                return Ok(CallerIdentity::Pos(session));
            }
            tracing::debug!("bearer token did not match a session");
        }

        Ok(CallerIdentity::Anonymous)
    }
}

fn header_matches(headers: &HeaderMap, name: &str, expected: Option<&str>) -> bool {
    let Some(expected) = expected else {
        return false;
    };
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| constant_time_eq(v.as_bytes(), expected.as_bytes()))
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
