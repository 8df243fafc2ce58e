use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::*;

/// In-process store with the same uniqueness rules as the Postgres schema.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    next_id: DbId,
    users: BTreeMap<DbId, User>,
    courses: BTreeMap<DbId, Course>,
    lessons: BTreeMap<DbId, Lesson>,
    videos: HashMap<DbId, Video>,
    texts: HashMap<DbId, Text>,
    mcqs: HashMap<DbId, Mcq>,
    submissions: Vec<McqSubmission>,
    enrollments: HashSet<(DbId, DbId)>,
    completions: HashSet<(DbId, DbId)>,
    certificates: Vec<Certificate>,
}

impl Inner {
    fn next_id(&mut self) -> DbId {
        self.next_id += 1;
        self.next_id
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of completion rows for a user, across all courses.
    pub async fn completion_count(&self, user_id: DbId) -> usize {
        let g = self.inner.read().await;
        g.completions.iter().filter(|(u, _)| *u == user_id).count()
    }

    /// Number of certificate rows for `(user_id, course_id)`.
    pub async fn certificate_count(&self, user_id: DbId, course_id: DbId) -> usize {
        let g = self.inner.read().await;
        g.certificates
            .iter()
            .filter(|c| c.user_id == user_id && c.course_id == course_id)
            .count()
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn create_user(&self, username: &str, password_hash: &str, role: Role) -> StoreResult<User> {
        let mut g = self.inner.write().await;
        if g.users.values().any(|u| u.username == username) {
            return Err(StoreError::Conflict("users_username_key".into()));
        }
        let user = User {
            id: g.next_id(),
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            role,
        };
        g.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let g = self.inner.read().await;
        Ok(g.users.values().find(|u| u.username == username).cloned())
    }

    async fn user_by_id(&self, id: DbId) -> StoreResult<Option<UserSummary>> {
        let g = self.inner.read().await;
        Ok(g.users.get(&id).map(UserSummary::from))
    }

    async fn list_users(&self) -> StoreResult<Vec<UserSummary>> {
        let g = self.inner.read().await;
        Ok(g.users.values().map(UserSummary::from).collect())
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn create_course(&self, title: &str, description: &str) -> StoreResult<Course> {
        let mut g = self.inner.write().await;
        let course = Course {
            id: g.next_id(),
            title: title.to_string(),
            description: description.to_string(),
        };
        g.courses.insert(course.id, course.clone());
        Ok(course)
    }

    async fn course(&self, id: DbId) -> StoreResult<Option<Course>> {
        Ok(self.inner.read().await.courses.get(&id).cloned())
    }

    async fn list_courses(&self) -> StoreResult<Vec<Course>> {
        Ok(self.inner.read().await.courses.values().cloned().collect())
    }

    async fn create_lesson(&self, course_id: DbId, title: &str, position: i32) -> StoreResult<Lesson> {
        let mut g = self.inner.write().await;
        let lesson = Lesson {
            id: g.next_id(),
            course_id,
            title: title.to_string(),
            position,
        };
        g.lessons.insert(lesson.id, lesson.clone());
        Ok(lesson)
    }

    async fn lesson(&self, id: DbId) -> StoreResult<Option<Lesson>> {
        Ok(self.inner.read().await.lessons.get(&id).cloned())
    }

    async fn lessons_for_course(&self, course_id: DbId) -> StoreResult<Vec<Lesson>> {
        let g = self.inner.read().await;
        let mut lessons: Vec<Lesson> = g
            .lessons
            .values()
            .filter(|l| l.course_id == course_id)
            .cloned()
            .collect();
        lessons.sort_by_key(|l| (l.position, l.id));
        Ok(lessons)
    }

    async fn lesson_ids_for_course(&self, course_id: DbId) -> StoreResult<HashSet<DbId>> {
        let g = self.inner.read().await;
        Ok(g.lessons
            .values()
            .filter(|l| l.course_id == course_id)
            .map(|l| l.id)
            .collect())
    }

    async fn lesson_content(&self, lesson_id: DbId) -> StoreResult<LessonContent> {
        let g = self.inner.read().await;
        Ok(LessonContent {
            video: g.videos.get(&lesson_id).cloned(),
            text: g.texts.get(&lesson_id).cloned(),
            mcq: g.mcqs.get(&lesson_id).cloned(),
        })
    }

    async fn put_content(&self, lesson_id: DbId, content: &NewContent) -> StoreResult<()> {
        let mut g = self.inner.write().await;
        match content.clone() {
            NewContent::Video { title, url } => {
                let existing = g.videos.get(&lesson_id).map(|v| v.id);
                let id = match existing {
                    Some(id) => id,
                    None => g.next_id(),
                };
                g.videos.insert(lesson_id, Video { id, lesson_id, title, video_url: url });
            }
            NewContent::Text { title, content } => {
                let existing = g.texts.get(&lesson_id).map(|t| t.id);
                let id = match existing {
                    Some(id) => id,
                    None => g.next_id(),
                };
                g.texts.insert(lesson_id, Text { id, lesson_id, title, content });
            }
            NewContent::Mcq { question, options, correct_option_index } => {
                let existing = g.mcqs.get(&lesson_id).map(|m| m.id);
                let id = match existing {
                    Some(id) => id,
                    None => g.next_id(),
                };
                g.mcqs.insert(
                    lesson_id,
                    Mcq { id, lesson_id, question, options, correct_option_index },
                );
            }
        }
        Ok(())
    }

    async fn mcq(&self, id: DbId) -> StoreResult<Option<Mcq>> {
        let g = self.inner.read().await;
        Ok(g.mcqs.values().find(|m| m.id == id).cloned())
    }
}

#[async_trait]
impl ProgressStore for MemoryStore {
    async fn enroll(&self, user_id: DbId, course_id: DbId) -> StoreResult<bool> {
        Ok(self.inner.write().await.enrollments.insert((user_id, course_id)))
    }

    async fn enrolled_courses(&self, user_id: DbId) -> StoreResult<Vec<Course>> {
        let g = self.inner.read().await;
        Ok(g.courses
            .values()
            .filter(|c| g.enrollments.contains(&(user_id, c.id)))
            .cloned()
            .collect())
    }

    async fn mark_lesson_complete(&self, user_id: DbId, lesson_id: DbId) -> StoreResult<bool> {
        Ok(self.inner.write().await.completions.insert((user_id, lesson_id)))
    }

    async fn completed_lesson_ids(&self, user_id: DbId, course_id: DbId) -> StoreResult<HashSet<DbId>> {
        let g = self.inner.read().await;
        Ok(g.completions
            .iter()
            .filter(|(u, l)| {
                *u == user_id && g.lessons.get(l).is_some_and(|lesson| lesson.course_id == course_id)
            })
            .map(|(_, l)| *l)
            .collect())
    }

    async fn is_lesson_complete(&self, user_id: DbId, lesson_id: DbId) -> StoreResult<bool> {
        Ok(self.inner.read().await.completions.contains(&(user_id, lesson_id)))
    }

    async fn submit_mcq(&self, user_id: DbId, mcq_id: DbId, selected: i32) -> StoreResult<Option<McqSubmission>> {
        let mut g = self.inner.write().await;
        let Some(correct) = g
            .mcqs
            .values()
            .find(|m| m.id == mcq_id)
            .map(|m| m.correct_option_index)
        else {
            return Ok(None);
        };
        let sub = McqSubmission {
            id: g.next_id(),
            user_id,
            mcq_id,
            selected_option_index: selected,
            is_correct: selected == correct,
            submitted_at: Utc::now(),
        };
        g.submissions.push(sub.clone());
        Ok(Some(sub))
    }
}

#[async_trait]
impl CertificateStore for MemoryStore {
    async fn certificate_for(&self, user_id: DbId, course_id: DbId) -> StoreResult<Option<Certificate>> {
        let g = self.inner.read().await;
        Ok(g.certificates
            .iter()
            .find(|c| c.user_id == user_id && c.course_id == course_id)
            .cloned())
    }

    async fn insert_certificate(&self, user_id: DbId, course_id: DbId, token: &str) -> StoreResult<Option<Certificate>> {
        let mut g = self.inner.write().await;
        if g.certificates.iter().any(|c| c.user_id == user_id && c.course_id == course_id) {
            return Ok(None);
        }
        if g.certificates.iter().any(|c| c.token == token) {
            return Err(StoreError::Conflict("certificates_token_key".into()));
        }
        let cert = Certificate {
            id: g.next_id(),
            user_id,
            course_id,
            token: token.to_string(),
            issued_at: Utc::now(),
        };
        g.certificates.push(cert.clone());
        Ok(Some(cert))
    }

    async fn certificate_details(&self, token: &str) -> StoreResult<Option<CertificateDetails>> {
        let g = self.inner.read().await;
        let Some(cert) = g.certificates.iter().find(|c| c.token == token) else {
            return Ok(None);
        };
        let (Some(user), Some(course)) = (g.users.get(&cert.user_id), g.courses.get(&cert.course_id)) else {
            return Ok(None);
        };
        Ok(Some(CertificateDetails {
            token: cert.token.clone(),
            issued_at: cert.issued_at,
            user_id: cert.user_id,
            course_id: cert.course_id,
            student_name: user.username.clone(),
            course_title: course.title.clone(),
        }))
    }

    async fn certificates_for_user(&self, user_id: DbId) -> StoreResult<Vec<Certificate>> {
        let g = self.inner.read().await;
        Ok(g.certificates.iter().filter(|c| c.user_id == user_id).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn duplicate_username_is_a_conflict() {
        let store = MemoryStore::new();
        store.create_user("ada", "h", Role::Student).await.unwrap();
        let err = store.create_user("ada", "h2", Role::Admin).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn lessons_come_back_in_position_order() {
        let store = MemoryStore::new();
        let c = store.create_course("Intro", "").await.unwrap();
        store.create_lesson(c.id, "third", 3).await.unwrap();
        store.create_lesson(c.id, "first", 1).await.unwrap();
        store.create_lesson(c.id, "second", 2).await.unwrap();
        let titles: Vec<_> = store
            .lessons_for_course(c.id)
            .await
            .unwrap()
            .into_iter()
            .map(|l| l.title)
            .collect();
        assert_eq!(titles, ["first", "second", "third"]);
    }

    #[tokio::test]
    async fn completed_ids_are_filtered_to_the_course() {
        let store = MemoryStore::new();
        let a = store.create_course("A", "").await.unwrap();
        let b = store.create_course("B", "").await.unwrap();
        let la = store.create_lesson(a.id, "a1", 1).await.unwrap();
        let lb = store.create_lesson(b.id, "b1", 1).await.unwrap();
        store.mark_lesson_complete(7, la.id).await.unwrap();
        store.mark_lesson_complete(7, lb.id).await.unwrap();
        let done = store.completed_lesson_ids(7, a.id).await.unwrap();
        assert_eq!(done, HashSet::from([la.id]));
    }

    #[tokio::test]
    async fn put_content_replaces_same_kind() {
        let store = MemoryStore::new();
        let c = store.create_course("A", "").await.unwrap();
        let l = store.create_lesson(c.id, "a1", 1).await.unwrap();
        let first = NewContent::Text { title: "v1".into(), content: "old".into() };
        let second = NewContent::Text { title: "v2".into(), content: "new".into() };
        store.put_content(l.id, &first).await.unwrap();
        store.put_content(l.id, &second).await.unwrap();
        let content = store.lesson_content(l.id).await.unwrap();
        assert_eq!(content.text.unwrap().content, "new");
        assert!(content.video.is_none());
        assert!(content.mcq.is_none());
    }

    #[tokio::test]
    async fn mcq_submission_is_graded() {
        let store = MemoryStore::new();
        let c = store.create_course("A", "").await.unwrap();
        let l = store.create_lesson(c.id, "a1", 1).await.unwrap();
        let mcq = NewContent::Mcq {
            question: "2+2?".into(),
            options: vec!["3".into(), "4".into()],
            correct_option_index: 1,
        };
        store.put_content(l.id, &mcq).await.unwrap();
        let mcq_id = store.lesson_content(l.id).await.unwrap().mcq.unwrap().id;

        let right = store.submit_mcq(1, mcq_id, 1).await.unwrap().unwrap();
        let wrong = store.submit_mcq(1, mcq_id, 0).await.unwrap().unwrap();
        assert!(right.is_correct);
        assert!(!wrong.is_correct);
        assert!(store.submit_mcq(1, 9999, 0).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn token_collision_is_a_conflict_but_pair_duplicate_is_absorbed() {
        let store = MemoryStore::new();
        assert!(store.insert_certificate(1, 2, "tok").await.unwrap().is_some());
        assert!(store.insert_certificate(1, 2, "other").await.unwrap().is_none());
        let err = store.insert_certificate(1, 3, "tok").await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }
}
