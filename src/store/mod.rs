//! Storage capabilities consumed by the completion engine, the auth flow and
//! the HTTP handlers.
//!
//! Each capability is a trait so handlers and the engine receive exactly the
//! stores they need. [`PgStore`] backs production; [`MemoryStore`] enforces
//! the same uniqueness rules in process and backs tests and local demos.

use std::collections::HashSet;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::models::*;

mod memory;
mod pg;

pub use memory::MemoryStore;
pub use pg::PgStore;

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Fails with [`StoreError::Conflict`] when the username is taken.
    async fn create_user(&self, username: &str, password_hash: &str, role: Role) -> StoreResult<User>;
    async fn user_by_username(&self, username: &str) -> StoreResult<Option<User>>;
    async fn user_by_id(&self, id: DbId) -> StoreResult<Option<UserSummary>>;
    async fn list_users(&self) -> StoreResult<Vec<UserSummary>>;
}

#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn create_course(&self, title: &str, description: &str) -> StoreResult<Course>;
    async fn course(&self, id: DbId) -> StoreResult<Option<Course>>;
    async fn list_courses(&self) -> StoreResult<Vec<Course>>;

    /// The caller is responsible for checking that the course exists.
    async fn create_lesson(&self, course_id: DbId, title: &str, position: i32) -> StoreResult<Lesson>;
    async fn lesson(&self, id: DbId) -> StoreResult<Option<Lesson>>;
    /// Lessons ordered by position, ties broken by id.
    async fn lessons_for_course(&self, course_id: DbId) -> StoreResult<Vec<Lesson>>;
    async fn lesson_ids_for_course(&self, course_id: DbId) -> StoreResult<HashSet<DbId>>;

    async fn lesson_content(&self, lesson_id: DbId) -> StoreResult<LessonContent>;
    /// Replaces any existing content of the same kind on the lesson.
    async fn put_content(&self, lesson_id: DbId, content: &NewContent) -> StoreResult<()>;
    async fn mcq(&self, id: DbId) -> StoreResult<Option<Mcq>>;
}

#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// Returns `false` when the enrollment already existed.
    async fn enroll(&self, user_id: DbId, course_id: DbId) -> StoreResult<bool>;
    async fn enrolled_courses(&self, user_id: DbId) -> StoreResult<Vec<Course>>;

    /// Returns `false` when the completion was already recorded.
    async fn mark_lesson_complete(&self, user_id: DbId, lesson_id: DbId) -> StoreResult<bool>;
    /// Completed lesson ids restricted to lessons of `course_id`.
    async fn completed_lesson_ids(&self, user_id: DbId, course_id: DbId) -> StoreResult<HashSet<DbId>>;
    async fn is_lesson_complete(&self, user_id: DbId, lesson_id: DbId) -> StoreResult<bool>;

    /// Grades and records an answer in one step. `None` when the mcq is unknown.
    async fn submit_mcq(&self, user_id: DbId, mcq_id: DbId, selected: i32) -> StoreResult<Option<McqSubmission>>;
}

#[async_trait]
pub trait CertificateStore: Send + Sync {
    async fn certificate_for(&self, user_id: DbId, course_id: DbId) -> StoreResult<Option<Certificate>>;

    /// Inserts a certificate unless one already exists for `(user_id, course_id)`,
    /// in which case `Ok(None)` is returned. A token collision is a
    /// [`StoreError::Conflict`].
    async fn insert_certificate(&self, user_id: DbId, course_id: DbId, token: &str) -> StoreResult<Option<Certificate>>;
    async fn certificate_details(&self, token: &str) -> StoreResult<Option<CertificateDetails>>;
    async fn certificates_for_user(&self, user_id: DbId) -> StoreResult<Vec<Certificate>>;
}
