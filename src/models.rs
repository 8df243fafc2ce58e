use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, NoneAsEmptyString};
use std::fmt;
use std::str::FromStr;

pub type DbId = i64;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown role {0:?}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "student" => Ok(Role::Student),
            "admin" => Ok(Role::Admin),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

impl TryFrom<String> for Role {
    type Error = UnknownRole;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

#[derive(sqlx::FromRow, Serialize, Debug, Clone)]
pub struct User {
    pub id: DbId,
    pub username: String,
    #[serde(skip)]
    pub password_hash: String,
    #[sqlx(try_from = "String")]
    pub role: Role,
}

/// User row without the credential hash, for listings.
#[derive(sqlx::FromRow, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct UserSummary {
    pub id: DbId,
    pub username: String,
    #[sqlx(try_from = "String")]
    pub role: Role,
}

impl From<&User> for UserSummary {
    fn from(u: &User) -> Self {
        UserSummary {
            id: u.id,
            username: u.username.clone(),
            role: u.role,
        }
    }
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Course {
    pub id: DbId,
    pub title: String,
    pub description: String,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Lesson {
    pub id: DbId,
    pub course_id: DbId,
    pub title: String,
    pub position: i32,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    pub id: DbId,
    pub user_id: DbId,
    pub course_id: DbId,
    pub token: String,
    pub issued_at: DateTime<Utc>,
}

/// Public view of a certificate, joined with the student and course names.
#[derive(sqlx::FromRow, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct CertificateDetails {
    pub token: String,
    pub issued_at: DateTime<Utc>,
    pub user_id: DbId,
    pub course_id: DbId,
    pub student_name: String,
    pub course_title: String,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Video {
    pub id: DbId,
    pub lesson_id: DbId,
    pub title: String,
    pub video_url: String,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Text {
    pub id: DbId,
    pub lesson_id: DbId,
    pub title: String,
    pub content: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Mcq {
    pub id: DbId,
    pub lesson_id: DbId,
    pub question: String,
    pub options: Vec<String>,
    pub correct_option_index: i32,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct McqSubmission {
    pub id: DbId,
    pub user_id: DbId,
    pub mcq_id: DbId,
    pub selected_option_index: i32,
    pub is_correct: bool,
    pub submitted_at: DateTime<Utc>,
}

/// Content attached to a lesson. Each kind is independently optional.
#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct LessonContent {
    pub video: Option<Video>,
    pub text: Option<Text>,
    pub mcq: Option<Mcq>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NewContent {
    Video { title: String, url: String },
    Text { title: String, content: String },
    Mcq { question: String, options: Vec<String>, correct_option_index: i32 },
}

// --- form bodies ---

#[derive(Deserialize, Debug, Clone)]
pub struct CredentialsForm {
    pub username: String,
    pub password: String,
}

#[serde_as]
#[derive(Deserialize, Debug, Clone)]
pub struct NewCourseForm {
    pub title: String,
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct NewLessonForm {
    pub title: String,
    pub position: i32,
}

#[derive(Deserialize, Debug, Clone)]
pub struct EnrollForm {
    pub course_id: DbId,
}

#[derive(Deserialize, Debug, Clone)]
pub struct McqAnswerForm {
    pub option: i32,
}

#[serde_as]
#[derive(Deserialize, Debug, Clone, Default)]
pub struct ContentForm {
    pub content_type: String,
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    pub video_title: Option<String>,
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    pub video_url: Option<String>,
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    pub text_title: Option<String>,
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    pub text_content: Option<String>,
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    pub mcq_question: Option<String>,
    #[serde(default)]
    pub mcq_option0: String,
    #[serde(default)]
    pub mcq_option1: String,
    #[serde(default)]
    pub mcq_option2: String,
    #[serde(default)]
    pub mcq_option3: String,
    #[serde(default)]
    pub correct_option: i32,
}

/// Outcome of the last mcq answer, carried on the redirect back to the lesson.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct LessonQuery {
    #[serde(default)]
    pub answer: Option<String>,
}

impl TryFrom<ContentForm> for NewContent {
    type Error = String;

    fn try_from(f: ContentForm) -> Result<Self, Self::Error> {
        match f.content_type.as_str() {
            "video" => match (f.video_title, f.video_url) {
                (Some(title), Some(url)) => Ok(NewContent::Video { title, url }),
                _ => Err("title and URL are required for video".into()),
            },
            "text" => match (f.text_title, f.text_content) {
                (Some(title), Some(content)) => Ok(NewContent::Text { title, content }),
                _ => Err("title and content are required for text".into()),
            },
            "mcq" => {
                let question = f.mcq_question.ok_or("question is required")?;
                let mut options: Vec<String> = [f.mcq_option0, f.mcq_option1, f.mcq_option2, f.mcq_option3]
                    .into_iter()
                    .map(|o| o.trim().to_string())
                    .collect();
                while options.last().is_some_and(|o| o.is_empty()) {
                    options.pop();
                }
                if options.len() < 2 || options.iter().any(|o| o.is_empty()) {
                    return Err("between 2 and 4 consecutive options are required".into());
                }
                let in_range = usize::try_from(f.correct_option).is_ok_and(|i| i < options.len());
                if !in_range {
                    return Err("correct option must point at one of the options".into());
                }
                Ok(NewContent::Mcq { question, options, correct_option_index: f.correct_option })
            }
            other => Err(format!("invalid content type {other:?}")),
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct LoginQuery {
    #[serde(default)]
    pub error: Option<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_parses_known_names_only() {
        assert_eq!("admin".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!("student".parse::<Role>().unwrap(), Role::Student);
        assert!("Admin".parse::<Role>().is_err());
        assert!("instructor".parse::<Role>().is_err());
    }

    fn mcq_form(options: [&str; 4], correct: i32) -> ContentForm {
        ContentForm {
            content_type: "mcq".into(),
            mcq_question: Some("Pick one".into()),
            mcq_option0: options[0].into(),
            mcq_option1: options[1].into(),
            mcq_option2: options[2].into(),
            mcq_option3: options[3].into(),
            correct_option: correct,
            ..Default::default()
        }
    }

    #[test]
    fn mcq_form_drops_trailing_blank_options() {
        let content = NewContent::try_from(mcq_form(["a", "b", "", ""], 1)).unwrap();
        assert_eq!(
            content,
            NewContent::Mcq {
                question: "Pick one".into(),
                options: vec!["a".into(), "b".into()],
                correct_option_index: 1,
            }
        );
    }

    #[test]
    fn mcq_form_rejects_bad_answer_key_and_gaps() {
        assert!(NewContent::try_from(mcq_form(["a", "b", "", ""], 2)).is_err());
        assert!(NewContent::try_from(mcq_form(["a", "b", "c", "d"], -1)).is_err());
        assert!(NewContent::try_from(mcq_form(["a", "", "c", ""], 0)).is_err());
        assert!(NewContent::try_from(mcq_form(["a", "", "", ""], 0)).is_err());
    }

    #[test]
    fn video_form_requires_title_and_url() {
        let form = ContentForm {
            content_type: "video".into(),
            video_title: Some("Welcome".into()),
            ..Default::default()
        };
        assert!(NewContent::try_from(form).is_err());
        let form = ContentForm { content_type: "slides".into(), ..Default::default() };
        assert!(NewContent::try_from(form).is_err());
    }

    #[test]
    fn role_display_matches_storage_name() {
        assert_eq!(Role::Admin.to_string(), "admin");
        assert_eq!(Role::Student.to_string(), "student");
    }
}
