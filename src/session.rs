//! Authenticated session state, carried by `tower-sessions`.
//!
//! The session layer enforces the idle deadline: every request refreshes the
//! record's expiry and records past it are never loaded. The absolute
//! deadline is fixed at login and stored next to the claims, so a session
//! that stays busy still ends once it passes.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tower_sessions::cookie::SameSite;
use tower_sessions::{session, Expiry, Session, SessionManagerLayer, SessionStore};

use crate::models::{DbId, Role};

pub const SESSION_COOKIE: &str = "lms_session";

const CLAIMS_KEY: &str = "claims";

/// What an authenticated session asserts about its holder.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Claims {
    pub user_id: DbId,
    pub role: Role,
}

/// Claims plus the absolute deadline set when the session was started.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionClaims {
    pub claims: Claims,
    pub expires_at: DateTime<Utc>,
}

impl SessionClaims {
    pub fn new(claims: Claims, now: DateTime<Utc>, lifetime: Duration) -> Self {
        Self { claims, expires_at: now + lifetime }
    }

    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    pub lifetime: Duration,
    pub idle_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            lifetime: Duration::hours(24),
            idle_timeout: Duration::minutes(20),
        }
    }
}

/// Cookie-backed session layer over `store`, sliding on inactivity.
pub fn session_layer<S>(store: S, config: &SessionConfig, secure: bool) -> SessionManagerLayer<S>
where
    S: SessionStore + Clone,
{
    let idle = time::Duration::seconds(config.idle_timeout.num_seconds());
    SessionManagerLayer::new(store)
        .with_name(SESSION_COOKIE)
        .with_http_only(true)
        .with_same_site(SameSite::Lax)
        .with_secure(secure)
        .with_path("/")
        .with_expiry(Expiry::OnInactivity(idle))
        .with_always_save(true)
}

/// Binds `claims` to the session under a fresh id.
pub async fn start(session: &Session, claims: Claims, config: &SessionConfig) -> Result<(), session::Error> {
    start_at(session, claims, config, Utc::now()).await
}

pub async fn start_at(
    session: &Session,
    claims: Claims,
    config: &SessionConfig,
    now: DateTime<Utc>,
) -> Result<(), session::Error> {
    // never reuse an id that existed before authentication
    session.cycle_id().await?;
    session
        .insert(CLAIMS_KEY, SessionClaims::new(claims, now, config.lifetime))
        .await
}

/// Claims of a live session. A session past its absolute deadline is flushed.
pub async fn current(session: &Session) -> Result<Option<Claims>, session::Error> {
    current_at(session, Utc::now()).await
}

pub async fn current_at(session: &Session, now: DateTime<Utc>) -> Result<Option<Claims>, session::Error> {
    let Some(stored) = session.get::<SessionClaims>(CLAIMS_KEY).await? else {
        return Ok(None);
    };
    if !stored.is_live(now) {
        tracing::debug!(user_id = stored.claims.user_id, "session past absolute lifetime");
        session.flush().await?;
        return Ok(None);
    }
    Ok(Some(stored.claims))
}

/// Destroys the session; its id never resolves again.
pub async fn end(session: &Session) -> Result<(), session::Error> {
    session.flush().await
}
