//! Course completion and certificate issuance.
//!
//! A course is complete for a user when it has at least one lesson and the
//! user holds a completion record for every one of them. Completion records
//! are never removed, so once a course is complete it stays complete, and the
//! certificate for `(user, course)` is minted at most once.

use std::sync::Arc;

use crate::error::{AppError, AppResult, StoreError};
use crate::models::{Certificate, CertificateDetails, DbId, Lesson};
use crate::store::{CertificateStore, ContentStore, ProgressStore};
use crate::token::TokenGenerator;

/// Fresh tokens tried before a run of collisions is reported as a conflict.
pub const TOKEN_ATTEMPTS: usize = 3;

const MAX_TOKEN_LEN: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Issuance {
    Issued(Certificate),
    AlreadyIssued(Certificate),
    NotComplete,
}

/// Result of a student marking a lesson complete.
#[derive(Debug, Clone)]
pub struct LessonOutcome {
    pub lesson: Lesson,
    pub newly_completed: bool,
    pub issuance: Issuance,
}

#[derive(Clone)]
pub struct CompletionEngine {
    content: Arc<dyn ContentStore>,
    progress: Arc<dyn ProgressStore>,
    certificates: Arc<dyn CertificateStore>,
    tokens: Arc<dyn TokenGenerator>,
}

impl CompletionEngine {
    pub fn new(
        content: Arc<dyn ContentStore>,
        progress: Arc<dyn ProgressStore>,
        certificates: Arc<dyn CertificateStore>,
        tokens: Arc<dyn TokenGenerator>,
    ) -> Self {
        Self { content, progress, certificates, tokens }
    }

    /// Records that `user_id` finished `lesson_id`. Repeating the call is a no-op.
    pub async fn record_lesson_completion(&self, user_id: DbId, lesson_id: DbId) -> AppResult<(Lesson, bool)> {
        let lesson = self
            .content
            .lesson(lesson_id)
            .await?
            .ok_or(AppError::NotFound("lesson"))?;
        let inserted = self.progress.mark_lesson_complete(user_id, lesson_id).await?;
        if !inserted {
            tracing::debug!(user_id, lesson_id, "lesson already completed");
        }
        Ok((lesson, inserted))
    }

    pub async fn is_course_complete(&self, user_id: DbId, course_id: DbId) -> AppResult<bool> {
        let all = self.content.lesson_ids_for_course(course_id).await?;
        if all.is_empty() {
            return Ok(false);
        }
        // already filtered to this course, so equal size means equal sets
        let done = self.progress.completed_lesson_ids(user_id, course_id).await?;
        Ok(done.len() == all.len())
    }

    pub async fn issue_certificate_if_complete(&self, user_id: DbId, course_id: DbId) -> AppResult<Issuance> {
        if !self.is_course_complete(user_id, course_id).await? {
            return Ok(Issuance::NotComplete);
        }
        self.issue_certificate(user_id, course_id).await
    }

    /// Issues the certificate for `(user_id, course_id)` without checking
    /// completion, unless one already exists.
    pub async fn issue_certificate(&self, user_id: DbId, course_id: DbId) -> AppResult<Issuance> {
        if let Some(existing) = self.certificates.certificate_for(user_id, course_id).await? {
            return Ok(Issuance::AlreadyIssued(existing));
        }

        for attempt in 1..=TOKEN_ATTEMPTS {
            let token = self.tokens.generate();
            match self.certificates.insert_certificate(user_id, course_id, &token).await {
                Ok(Some(cert)) => {
                    tracing::info!(user_id, course_id, cert_id = cert.id, "certificate issued");
                    return Ok(Issuance::Issued(cert));
                }
                // lost the race to a concurrent issuer
                Ok(None) => {
                    let existing = self
                        .certificates
                        .certificate_for(user_id, course_id)
                        .await?
                        .ok_or_else(|| AppError::Internal("certificate vanished after conflict".into()))?;
                    return Ok(Issuance::AlreadyIssued(existing));
                }
                Err(StoreError::Conflict(constraint)) => {
                    tracing::warn!(user_id, course_id, attempt, %constraint, "certificate token collision");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(AppError::Conflict("certificates_token_key".into()))
    }

    /// Records the completion and issues a certificate if that finished the course.
    pub async fn complete_lesson(&self, user_id: DbId, lesson_id: DbId) -> AppResult<LessonOutcome> {
        let (lesson, newly_completed) = self.record_lesson_completion(user_id, lesson_id).await?;
        let issuance = self.issue_certificate_if_complete(user_id, lesson.course_id).await?;
        Ok(LessonOutcome { lesson, newly_completed, issuance })
    }

    pub async fn certificate_for(&self, user_id: DbId, course_id: DbId) -> AppResult<Option<Certificate>> {
        Ok(self.certificates.certificate_for(user_id, course_id).await?)
    }

    pub async fn certificates_for_user(&self, user_id: DbId) -> AppResult<Vec<Certificate>> {
        Ok(self.certificates.certificates_for_user(user_id).await?)
    }

    /// Public lookup; the token is the only capability required.
    pub async fn certificate_by_token(&self, token: &str) -> AppResult<CertificateDetails> {
        if token.is_empty() || token.len() > MAX_TOKEN_LEN {
            return Err(AppError::InvalidInput("malformed certificate token".into()));
        }
        self.certificates
            .certificate_details(token)
            .await?
            .ok_or(AppError::NotFound("certificate"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use crate::store::{ContentStore, CredentialStore, MemoryStore, StoreResult};
    use crate::token::UuidTokens;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    fn engine_with(store: &Arc<MemoryStore>, tokens: Arc<dyn TokenGenerator>) -> CompletionEngine {
        CompletionEngine::new(store.clone(), store.clone(), store.clone(), tokens)
    }

    fn engine(store: &Arc<MemoryStore>) -> CompletionEngine {
        engine_with(store, Arc::new(UuidTokens))
    }

    /// Hands out a fixed sequence of tokens, repeating the last one.
    struct Scripted(Mutex<Vec<String>>);

    impl Scripted {
        fn new(tokens: &[&str]) -> Arc<Self> {
            let mut v: Vec<String> = tokens.iter().map(|s| s.to_string()).collect();
            v.reverse();
            Arc::new(Scripted(Mutex::new(v)))
        }
    }

    impl TokenGenerator for Scripted {
        fn generate(&self) -> String {
            let mut v = self.0.lock().unwrap();
            if v.len() > 1 {
                v.pop().unwrap()
            } else {
                v[0].clone()
            }
        }
    }

    /// Misses the first existence check, as a request racing a concurrent
    /// issuer would; everything else goes to the wrapped store.
    struct StaleFirstRead {
        inner: Arc<MemoryStore>,
        stale: AtomicBool,
    }

    #[async_trait]
    impl CertificateStore for StaleFirstRead {
        async fn certificate_for(&self, user_id: DbId, course_id: DbId) -> StoreResult<Option<Certificate>> {
            if self.stale.swap(false, Ordering::SeqCst) {
                return Ok(None);
            }
            self.inner.certificate_for(user_id, course_id).await
        }

        async fn insert_certificate(&self, user_id: DbId, course_id: DbId, token: &str) -> StoreResult<Option<Certificate>> {
            self.inner.insert_certificate(user_id, course_id, token).await
        }

        async fn certificate_details(&self, token: &str) -> StoreResult<Option<CertificateDetails>> {
            self.inner.certificate_details(token).await
        }

        async fn certificates_for_user(&self, user_id: DbId) -> StoreResult<Vec<Certificate>> {
            self.inner.certificates_for_user(user_id).await
        }
    }

    async fn intro(store: &MemoryStore) -> (DbId, DbId, DbId, DbId) {
        let user = store.create_user("u", "h", Role::Student).await.unwrap();
        let course = store.create_course("Intro", "").await.unwrap();
        let l1 = store.create_lesson(course.id, "L1", 1).await.unwrap();
        let l2 = store.create_lesson(course.id, "L2", 2).await.unwrap();
        (user.id, course.id, l1.id, l2.id)
    }

    #[tokio::test]
    async fn course_without_lessons_is_never_complete() {
        let store = Arc::new(MemoryStore::new());
        let course = store.create_course("Empty", "").await.unwrap();
        assert!(!engine(&store).is_course_complete(1, course.id).await.unwrap());
    }

    #[tokio::test]
    async fn intro_scenario_issues_exactly_one_certificate() {
        let store = Arc::new(MemoryStore::new());
        let (user, course, l1, l2) = intro(&store).await;
        let engine = engine(&store);

        let first = engine.complete_lesson(user, l1).await.unwrap();
        assert_eq!(first.issuance, Issuance::NotComplete);
        assert!(!engine.is_course_complete(user, course).await.unwrap());

        let second = engine.complete_lesson(user, l2).await.unwrap();
        assert!(engine.is_course_complete(user, course).await.unwrap());
        let cert = assert_matches!(second.issuance, Issuance::Issued(c) => c);
        assert_eq!(store.certificate_count(user, course).await, 1);

        let details = engine.certificate_by_token(&cert.token).await.unwrap();
        assert_eq!(details.user_id, user);
        assert_eq!(details.course_id, course);
        assert_eq!(details.student_name, "u");
        assert_eq!(details.course_title, "Intro");
    }

    #[tokio::test]
    async fn completion_requires_every_lesson() {
        let store = Arc::new(MemoryStore::new());
        let (user, course, _l1, l2) = intro(&store).await;
        let engine = engine(&store);
        engine.record_lesson_completion(user, l2).await.unwrap();
        assert!(!engine.is_course_complete(user, course).await.unwrap());
    }

    #[tokio::test]
    async fn completions_in_other_courses_do_not_count() {
        let store = Arc::new(MemoryStore::new());
        let (user, course, l1, _l2) = intro(&store).await;
        let other = store.create_course("Other", "").await.unwrap();
        let o1 = store.create_lesson(other.id, "O1", 1).await.unwrap();
        let engine = engine(&store);
        engine.record_lesson_completion(user, l1).await.unwrap();
        engine.record_lesson_completion(user, o1.id).await.unwrap();
        assert!(!engine.is_course_complete(user, course).await.unwrap());
        assert!(engine.is_course_complete(user, other.id).await.unwrap());
    }

    #[tokio::test]
    async fn recording_twice_keeps_one_row() {
        let store = Arc::new(MemoryStore::new());
        let (user, _course, l1, _l2) = intro(&store).await;
        let engine = engine(&store);
        let (_, first) = engine.record_lesson_completion(user, l1).await.unwrap();
        let (_, second) = engine.record_lesson_completion(user, l1).await.unwrap();
        assert!(first);
        assert!(!second);
        assert_eq!(store.completion_count(user).await, 1);
    }

    #[tokio::test]
    async fn unknown_lesson_is_not_found() {
        let store = Arc::new(MemoryStore::new());
        let err = engine(&store).record_lesson_completion(1, 42).await.unwrap_err();
        assert_matches!(err, AppError::NotFound("lesson"));
    }

    #[tokio::test]
    async fn issuing_twice_is_a_no_op() {
        let store = Arc::new(MemoryStore::new());
        let (user, course, l1, l2) = intro(&store).await;
        let engine = engine(&store);
        engine.record_lesson_completion(user, l1).await.unwrap();
        engine.record_lesson_completion(user, l2).await.unwrap();

        let a = engine.issue_certificate_if_complete(user, course).await.unwrap();
        let b = engine.issue_certificate_if_complete(user, course).await.unwrap();
        let issued = assert_matches!(a, Issuance::Issued(c) => c);
        let again = assert_matches!(b, Issuance::AlreadyIssued(c) => c);
        assert_eq!(issued, again);
        assert_eq!(store.certificate_count(user, course).await, 1);
    }

    #[tokio::test]
    async fn recompleting_a_lesson_in_a_finished_course_keeps_one_certificate() {
        let store = Arc::new(MemoryStore::new());
        let (user, course, l1, l2) = intro(&store).await;
        let engine = engine(&store);
        engine.complete_lesson(user, l1).await.unwrap();
        engine.complete_lesson(user, l2).await.unwrap();
        let retry = engine.complete_lesson(user, l1).await.unwrap();
        assert!(!retry.newly_completed);
        assert_matches!(retry.issuance, Issuance::AlreadyIssued(_));
        assert_eq!(store.certificate_count(user, course).await, 1);
    }

    #[tokio::test]
    async fn token_collision_retries_with_a_fresh_token() {
        let store = Arc::new(MemoryStore::new());
        store.insert_certificate(99, 99, "taken").await.unwrap();
        let (user, course, _, _) = intro(&store).await;
        let engine = engine_with(&store, Scripted::new(&["taken", "fresh"]));
        let cert = assert_matches!(
            engine.issue_certificate(user, course).await.unwrap(),
            Issuance::Issued(c) => c
        );
        assert_eq!(cert.token, "fresh");
    }

    #[tokio::test]
    async fn persistent_collisions_surface_as_conflict() {
        let store = Arc::new(MemoryStore::new());
        store.insert_certificate(99, 99, "taken").await.unwrap();
        let (user, course, _, _) = intro(&store).await;
        let engine = engine_with(&store, Scripted::new(&["taken"]));
        let err = engine.issue_certificate(user, course).await.unwrap_err();
        assert_matches!(err, AppError::Conflict(_));
        assert_eq!(store.certificate_count(user, course).await, 0);
    }

    #[tokio::test]
    async fn losing_the_insert_race_reports_already_issued() {
        let store = Arc::new(MemoryStore::new());
        let (user, course, _, _) = intro(&store).await;
        let winner = store.insert_certificate(user, course, "winner").await.unwrap().unwrap();

        let certificates = Arc::new(StaleFirstRead { inner: store.clone(), stale: AtomicBool::new(true) });
        let engine = CompletionEngine::new(store.clone(), store.clone(), certificates, Arc::new(UuidTokens));

        let issuance = engine.issue_certificate(user, course).await.unwrap();
        let cert = assert_matches!(issuance, Issuance::AlreadyIssued(c) => c);
        assert_eq!(cert, winner);
        assert_eq!(store.certificate_count(user, course).await, 1);
    }

    #[tokio::test]
    async fn unknown_token_is_not_found() {
        let store = Arc::new(MemoryStore::new());
        let err = engine(&store).certificate_by_token("never-issued").await.unwrap_err();
        assert_matches!(err, AppError::NotFound("certificate"));
        let err = engine(&store).certificate_by_token("").await.unwrap_err();
        assert_matches!(err, AppError::InvalidInput(_));
    }
}
