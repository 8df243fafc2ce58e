//! Access control: maps a request's session to an authorization outcome.
//!
//! Claims are read fresh from the request's session on every request.
//! Missing or expired sessions on a protected route redirect to the login
//! page; a valid session with the wrong role is a hard 403.

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use http::request::Parts;
use tower_sessions::Session;

use crate::error::AppError;
use crate::models::DbId;
use crate::models::Role;
use crate::session::{self, Claims};
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Public,
    Authenticated,
    Admin,
}

/// Decides whether `claims` may reach a route guarded by `access`.
pub fn authorize(claims: Option<Claims>, access: Access) -> Result<Option<Claims>, AppError> {
    match access {
        Access::Public => Ok(claims),
        Access::Authenticated => require_authentication(claims).map(Some),
        Access::Admin => require_authentication(claims).and_then(require_admin).map(Some),
    }
}

fn require_authentication(claims: Option<Claims>) -> Result<Claims, AppError> {
    claims.ok_or(AppError::Unauthorized)
}

fn require_admin(claims: Claims) -> Result<Claims, AppError> {
    match claims.role {
        Role::Admin => Ok(claims),
        Role::Student => Err(AppError::Forbidden),
    }
}

/// Who is making the request. Never rejects on a missing session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visitor {
    Guest,
    Student(DbId),
    Admin(DbId),
}

impl Visitor {
    pub fn claims(self) -> Option<Claims> {
        match self {
            Visitor::Guest => None,
            Visitor::Student(user_id) => Some(Claims { user_id, role: Role::Student }),
            Visitor::Admin(user_id) => Some(Claims { user_id, role: Role::Admin }),
        }
    }

    pub fn user_id(self) -> Option<DbId> {
        self.claims().map(|c| c.user_id)
    }
}

impl From<Option<Claims>> for Visitor {
    fn from(claims: Option<Claims>) -> Self {
        match claims {
            None => Visitor::Guest,
            Some(Claims { user_id, role: Role::Student }) => Visitor::Student(user_id),
            Some(Claims { user_id, role: Role::Admin }) => Visitor::Admin(user_id),
        }
    }
}

async fn resolve_claims(parts: &mut Parts, state: &AppState) -> Result<Option<Claims>, AppError> {
    let session = Session::from_request_parts(parts, state)
        .await
        .map_err(|(_, msg)| AppError::Internal(msg.to_string()))?;
    Ok(session::current(&session).await?)
}

/// Runs the gate for `access` against the request's session.
async fn admit(parts: &mut Parts, state: &AppState, access: Access) -> Result<Option<Claims>, AppError> {
    let claims = resolve_claims(parts, state).await?;
    authorize(claims, access).map_err(|e| {
        if let (AppError::Forbidden, Some(c)) = (&e, claims) {
            tracing::warn!(user_id = c.user_id, path = %parts.uri.path(), "admin route refused");
        }
        e
    })
}

#[async_trait]
impl FromRequestParts<AppState> for Visitor {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        Ok(admit(parts, state, Access::Public).await?.into())
    }
}

/// Requires a live session. Rejects with a redirect to `/login`.
#[derive(Debug, Clone, Copy)]
pub struct RequireAuth(pub Claims);

#[async_trait]
impl FromRequestParts<AppState> for RequireAuth {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        admit(parts, state, Access::Authenticated)
            .await?
            .map(RequireAuth)
            .ok_or(AppError::Unauthorized)
    }
}

/// Requires a live admin session. Rejects with 403 for other roles.
#[derive(Debug, Clone, Copy)]
pub struct RequireAdmin(pub Claims);

#[async_trait]
impl FromRequestParts<AppState> for RequireAdmin {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        admit(parts, state, Access::Admin)
            .await?
            .map(RequireAdmin)
            .ok_or(AppError::Unauthorized)
    }
}
