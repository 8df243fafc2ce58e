use std::collections::HashSet;

use async_trait::async_trait;
use sqlx::{query, query_as, query_scalar};

use super::*;
use crate::db::Db;

const USER_COLUMNS: &str = "id, username, password_hash, role";
const CERT_COLUMNS: &str = "id, user_id, course_id, token, issued_at";

/// Postgres-backed implementation of every store capability.
#[derive(Clone)]
pub struct PgStore {
    db: Db,
}

impl PgStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

#[derive(sqlx::FromRow)]
struct McqRow {
    id: DbId,
    lesson_id: DbId,
    question: String,
    options: String,
    correct_option_index: i32,
}

impl TryFrom<McqRow> for Mcq {
    type Error = StoreError;

    fn try_from(r: McqRow) -> Result<Self, Self::Error> {
        let options: Vec<String> = serde_json::from_str(&r.options)
            .map_err(|e| StoreError::Corrupt(format!("mcq {} options: {e}", r.id)))?;
        Ok(Mcq {
            id: r.id,
            lesson_id: r.lesson_id,
            question: r.question,
            options,
            correct_option_index: r.correct_option_index,
        })
    }
}

#[async_trait]
impl CredentialStore for PgStore {
    async fn create_user(&self, username: &str, password_hash: &str, role: Role) -> StoreResult<User> {
        let sql = format!(
            "INSERT INTO users (username, password_hash, role) VALUES ($1, $2, $3) RETURNING {USER_COLUMNS}"
        );
        Ok(query_as::<_, User>(&sql)
            .bind(username)
            .bind(password_hash)
            .bind(role.as_str())
            .fetch_one(&self.db)
            .await?)
    }

    async fn user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE username = $1");
        Ok(query_as::<_, User>(&sql)
            .bind(username)
            .fetch_optional(&self.db)
            .await?)
    }

    async fn user_by_id(&self, id: DbId) -> StoreResult<Option<UserSummary>> {
        Ok(query_as::<_, UserSummary>("SELECT id, username, role FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?)
    }

    async fn list_users(&self) -> StoreResult<Vec<UserSummary>> {
        Ok(query_as::<_, UserSummary>("SELECT id, username, role FROM users ORDER BY id")
            .fetch_all(&self.db)
            .await?)
    }
}

#[async_trait]
impl ContentStore for PgStore {
    async fn create_course(&self, title: &str, description: &str) -> StoreResult<Course> {
        Ok(query_as::<_, Course>(
            "INSERT INTO courses (title, description) VALUES ($1, $2) RETURNING id, title, description",
        )
        .bind(title)
        .bind(description)
        .fetch_one(&self.db)
        .await?)
    }

    async fn course(&self, id: DbId) -> StoreResult<Option<Course>> {
        Ok(query_as::<_, Course>("SELECT id, title, description FROM courses WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?)
    }

    async fn list_courses(&self) -> StoreResult<Vec<Course>> {
        Ok(query_as::<_, Course>("SELECT id, title, description FROM courses ORDER BY id")
            .fetch_all(&self.db)
            .await?)
    }

    async fn create_lesson(&self, course_id: DbId, title: &str, position: i32) -> StoreResult<Lesson> {
        Ok(query_as::<_, Lesson>(
            "INSERT INTO lessons (course_id, title, position) VALUES ($1, $2, $3) \
             RETURNING id, course_id, title, position",
        )
        .bind(course_id)
        .bind(title)
        .bind(position)
        .fetch_one(&self.db)
        .await?)
    }

    async fn lesson(&self, id: DbId) -> StoreResult<Option<Lesson>> {
        Ok(query_as::<_, Lesson>("SELECT id, course_id, title, position FROM lessons WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?)
    }

    async fn lessons_for_course(&self, course_id: DbId) -> StoreResult<Vec<Lesson>> {
        Ok(query_as::<_, Lesson>(
            "SELECT id, course_id, title, position FROM lessons WHERE course_id = $1 ORDER BY position, id",
        )
        .bind(course_id)
        .fetch_all(&self.db)
        .await?)
    }

    async fn lesson_ids_for_course(&self, course_id: DbId) -> StoreResult<HashSet<DbId>> {
        let ids: Vec<DbId> = query_scalar("SELECT id FROM lessons WHERE course_id = $1")
            .bind(course_id)
            .fetch_all(&self.db)
            .await?;
        Ok(ids.into_iter().collect())
    }

    async fn lesson_content(&self, lesson_id: DbId) -> StoreResult<LessonContent> {
        let video = query_as::<_, Video>(
            "SELECT id, lesson_id, title, video_url FROM videos WHERE lesson_id = $1",
        )
        .bind(lesson_id)
        .fetch_optional(&self.db)
        .await?;
        let text = query_as::<_, Text>("SELECT id, lesson_id, title, content FROM texts WHERE lesson_id = $1")
            .bind(lesson_id)
            .fetch_optional(&self.db)
            .await?;
        let mcq = query_as::<_, McqRow>(
            "SELECT id, lesson_id, question, options, correct_option_index FROM mcqs WHERE lesson_id = $1",
        )
        .bind(lesson_id)
        .fetch_optional(&self.db)
        .await?
        .map(Mcq::try_from)
        .transpose()?;
        Ok(LessonContent { video, text, mcq })
    }

    async fn put_content(&self, lesson_id: DbId, content: &NewContent) -> StoreResult<()> {
        match content {
            NewContent::Video { title, url } => {
                query(
                    "INSERT INTO videos (lesson_id, title, video_url) VALUES ($1, $2, $3) \
                     ON CONFLICT (lesson_id) DO UPDATE SET title = EXCLUDED.title, video_url = EXCLUDED.video_url",
                )
                .bind(lesson_id)
                .bind(title)
                .bind(url)
                .execute(&self.db)
                .await?;
            }
            NewContent::Text { title, content } => {
                query(
                    "INSERT INTO texts (lesson_id, title, content) VALUES ($1, $2, $3) \
                     ON CONFLICT (lesson_id) DO UPDATE SET title = EXCLUDED.title, content = EXCLUDED.content",
                )
                .bind(lesson_id)
                .bind(title)
                .bind(content)
                .execute(&self.db)
                .await?;
            }
            NewContent::Mcq { question, options, correct_option_index } => {
                let options = serde_json::to_string(options)
                    .map_err(|e| StoreError::Corrupt(format!("mcq options: {e}")))?;
                query(
                    "INSERT INTO mcqs (lesson_id, question, options, correct_option_index) VALUES ($1, $2, $3, $4) \
                     ON CONFLICT (lesson_id) DO UPDATE SET question = EXCLUDED.question, \
                     options = EXCLUDED.options, correct_option_index = EXCLUDED.correct_option_index",
                )
                .bind(lesson_id)
                .bind(question)
                .bind(options)
                .bind(correct_option_index)
                .execute(&self.db)
                .await?;
            }
        }
        Ok(())
    }

    async fn mcq(&self, id: DbId) -> StoreResult<Option<Mcq>> {
        query_as::<_, McqRow>(
            "SELECT id, lesson_id, question, options, correct_option_index FROM mcqs WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .map(Mcq::try_from)
        .transpose()
    }
}

#[async_trait]
impl ProgressStore for PgStore {
    async fn enroll(&self, user_id: DbId, course_id: DbId) -> StoreResult<bool> {
        let res = query(
            "INSERT INTO enrollments (user_id, course_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(user_id)
        .bind(course_id)
        .execute(&self.db)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn enrolled_courses(&self, user_id: DbId) -> StoreResult<Vec<Course>> {
        Ok(query_as::<_, Course>(
            "SELECT c.id, c.title, c.description FROM courses c \
             JOIN enrollments e ON c.id = e.course_id \
             WHERE e.user_id = $1 ORDER BY c.id",
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?)
    }

    async fn mark_lesson_complete(&self, user_id: DbId, lesson_id: DbId) -> StoreResult<bool> {
        let res = query(
            "INSERT INTO lesson_completions (user_id, lesson_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(user_id)
        .bind(lesson_id)
        .execute(&self.db)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn completed_lesson_ids(&self, user_id: DbId, course_id: DbId) -> StoreResult<HashSet<DbId>> {
        let ids: Vec<DbId> = query_scalar(
            "SELECT lc.lesson_id FROM lesson_completions lc \
             JOIN lessons l ON lc.lesson_id = l.id \
             WHERE lc.user_id = $1 AND l.course_id = $2",
        )
        .bind(user_id)
        .bind(course_id)
        .fetch_all(&self.db)
        .await?;
        Ok(ids.into_iter().collect())
    }

    async fn is_lesson_complete(&self, user_id: DbId, lesson_id: DbId) -> StoreResult<bool> {
        Ok(query_scalar(
            "SELECT EXISTS(SELECT 1 FROM lesson_completions WHERE user_id = $1 AND lesson_id = $2)",
        )
        .bind(user_id)
        .bind(lesson_id)
        .fetch_one(&self.db)
        .await?)
    }

    async fn submit_mcq(&self, user_id: DbId, mcq_id: DbId, selected: i32) -> StoreResult<Option<McqSubmission>> {
        // Grading and insert happen in one statement so the answer key read
        // and the submission row are consistent.
        Ok(query_as::<_, McqSubmission>(
            "INSERT INTO mcq_submissions (user_id, mcq_id, selected_option_index, is_correct) \
             SELECT $1, m.id, $3, m.correct_option_index = $3 FROM mcqs m WHERE m.id = $2 \
             RETURNING id, user_id, mcq_id, selected_option_index, is_correct, submitted_at",
        )
        .bind(user_id)
        .bind(mcq_id)
        .bind(selected)
        .fetch_optional(&self.db)
        .await?)
    }
}

#[async_trait]
impl CertificateStore for PgStore {
    async fn certificate_for(&self, user_id: DbId, course_id: DbId) -> StoreResult<Option<Certificate>> {
        let sql = format!("SELECT {CERT_COLUMNS} FROM certificates WHERE user_id = $1 AND course_id = $2");
        Ok(query_as::<_, Certificate>(&sql)
            .bind(user_id)
            .bind(course_id)
            .fetch_optional(&self.db)
            .await?)
    }

    async fn insert_certificate(&self, user_id: DbId, course_id: DbId, token: &str) -> StoreResult<Option<Certificate>> {
        // Only the (user_id, course_id) key is absorbed; a token collision
        // still raises a unique violation.
        let sql = format!(
            "INSERT INTO certificates (user_id, course_id, token) VALUES ($1, $2, $3) \
             ON CONFLICT (user_id, course_id) DO NOTHING RETURNING {CERT_COLUMNS}"
        );
        Ok(query_as::<_, Certificate>(&sql)
            .bind(user_id)
            .bind(course_id)
            .bind(token)
            .fetch_optional(&self.db)
            .await?)
    }

    async fn certificate_details(&self, token: &str) -> StoreResult<Option<CertificateDetails>> {
        Ok(query_as::<_, CertificateDetails>(
            "SELECT c.token, c.issued_at, c.user_id, c.course_id, \
                    u.username AS student_name, co.title AS course_title \
             FROM certificates c \
             JOIN users u ON c.user_id = u.id \
             JOIN courses co ON c.course_id = co.id \
             WHERE c.token = $1",
        )
        .bind(token)
        .fetch_optional(&self.db)
        .await?)
    }

    async fn certificates_for_user(&self, user_id: DbId) -> StoreResult<Vec<Certificate>> {
        let sql = format!("SELECT {CERT_COLUMNS} FROM certificates WHERE user_id = $1 ORDER BY issued_at");
        Ok(query_as::<_, Certificate>(&sql)
            .bind(user_id)
            .fetch_all(&self.db)
            .await?)
    }
}
