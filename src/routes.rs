use std::collections::HashSet;

use axum::{
    extract::{Path, Query, State},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Router,
};
use axum_extra::extract::WithRejection;
use tower_sessions::{Session, SessionStore};

use crate::auth;
use crate::completion::Issuance;
use crate::error::{AppError, AppResult};
use crate::gate::{RequireAdmin, RequireAuth, Visitor};
use crate::models::*;
use crate::session::{self, Claims};
use crate::state::AppState;
use crate::views;

type IdPath = WithRejection<Path<DbId>, AppError>;

/// Full application router, with the session layer over `sessions`.
pub fn router<S>(state: AppState, sessions: S) -> Router
where
    S: SessionStore + Clone,
{
    let session_layer = session::session_layer(sessions, &state.config.session, state.config.cookie_secure);
    Router::new()
        // public
        .route("/", get(dashboard))
        .route("/courses/:course_id", get(show_course))
        .route("/lessons/:lesson_id", get(show_lesson))
        .route("/register", get(register_form).post(register))
        .route("/login", get(login_form).post(login))
        .route("/logout", post(logout))
        .route("/certificates/:token", get(view_certificate))
        // authenticated
        .route("/mcqs/:mcq_id/submit", post(submit_mcq))
        .route("/lessons/:lesson_id/complete", post(complete_lesson))
        // admin
        .nest("/admin", admin_router())
        .with_state(state)
        .layer(session_layer)
}

fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/", get(admin_dashboard))
        .route("/courses/new", get(admin_new_course_form).post(admin_create_course))
        .route("/courses/:course_id", get(admin_show_course))
        .route("/courses/:course_id/lessons", post(admin_create_lesson))
        .route("/lessons/:lesson_id", get(admin_show_lesson))
        .route("/lessons/:lesson_id/content", post(admin_add_content))
        .route("/users", get(admin_list_users))
        .route("/users/:user_id", get(admin_show_user))
        .route("/users/:user_id/enroll", post(admin_enroll_user))
        .route(
            "/users/:user_id/courses/:course_id/generate-certificate",
            post(admin_generate_certificate),
        )
}

// --- public ---

async fn dashboard(State(st): State<AppState>, visitor: Visitor) -> AppResult<Response> {
    let view = match visitor {
        Visitor::Admin(_) => return Ok(Redirect::to("/admin").into_response()),
        Visitor::Student(user_id) => views::DashboardView {
            courses: st.progress.enrolled_courses(user_id).await?,
            certificates: st.engine.certificates_for_user(user_id).await?,
        },
        Visitor::Guest => views::DashboardView {
            courses: st.content.list_courses().await?,
            certificates: Vec::new(),
        },
    };
    Ok(views::dashboard(visitor, &view).into_response())
}

async fn show_course(
    State(st): State<AppState>,
    visitor: Visitor,
    WithRejection(Path(course_id), _): IdPath,
) -> AppResult<Html<String>> {
    let course = st.content.course(course_id).await?.ok_or(AppError::NotFound("course"))?;
    let lessons = st.content.lessons_for_course(course_id).await?;
    let mut view = views::CourseView {
        course,
        lessons,
        completed: HashSet::new(),
        course_complete: false,
        certificate: None,
    };
    if let Some(user_id) = visitor.user_id() {
        view.completed = st.progress.completed_lesson_ids(user_id, course_id).await?;
        view.course_complete = st.engine.is_course_complete(user_id, course_id).await?;
        view.certificate = st.engine.certificate_for(user_id, course_id).await?;
    }
    Ok(views::course(visitor, &view))
}

async fn show_lesson(
    State(st): State<AppState>,
    visitor: Visitor,
    WithRejection(Path(lesson_id), _): IdPath,
    WithRejection(Query(q), _): WithRejection<Query<LessonQuery>, AppError>,
) -> AppResult<Html<String>> {
    let lesson = st.content.lesson(lesson_id).await?.ok_or(AppError::NotFound("lesson"))?;
    let mut view = views::LessonView {
        lesson,
        content: None,
        is_complete: false,
        answer: q.answer.as_deref().map(|a| a == "correct"),
    };
    if let Some(user_id) = visitor.user_id() {
        view.content = Some(st.content.lesson_content(lesson_id).await?);
        view.is_complete = st.progress.is_lesson_complete(user_id, lesson_id).await?;
    }
    Ok(views::lesson(visitor, &view))
}

async fn register_form(State(st): State<AppState>, visitor: Visitor) -> Html<String> {
    views::register(visitor, st.config.min_password_len)
}

async fn register(
    State(st): State<AppState>,
    WithRejection(Form(form), _): WithRejection<Form<CredentialsForm>, AppError>,
) -> AppResult<Redirect> {
    auth::register_user(
        st.users.as_ref(),
        st.verifier.as_ref(),
        &form.username,
        &form.password,
        st.config.min_password_len,
    )
    .await?;
    Ok(Redirect::to("/login"))
}

async fn login_form(
    visitor: Visitor,
    WithRejection(Query(q), _): WithRejection<Query<LoginQuery>, AppError>,
) -> Html<String> {
    views::login(visitor, q.error.is_some())
}

async fn login(
    State(st): State<AppState>,
    session: Session,
    WithRejection(Form(form), _): WithRejection<Form<CredentialsForm>, AppError>,
) -> AppResult<Redirect> {
    let user = match auth::authenticate_user(
        st.users.as_ref(),
        st.verifier.as_ref(),
        &form.username,
        &form.password,
    )
    .await
    {
        Ok(user) => user,
        Err(e) => {
            if matches!(e, AppError::InvalidCredentials) {
                tracing::warn!("rejected login attempt");
            }
            return Err(e);
        }
    };

    let claims = Claims { user_id: user.id, role: user.role };
    session::start(&session, claims, &st.config.session).await?;
    tracing::info!(user_id = user.id, role = %user.role, "login");

    let target = match user.role {
        Role::Admin => "/admin",
        Role::Student => "/",
    };
    Ok(Redirect::to(target))
}

async fn logout(session: Session) -> AppResult<Redirect> {
    session::end(&session).await?;
    Ok(Redirect::to("/login"))
}

async fn view_certificate(
    State(st): State<AppState>,
    visitor: Visitor,
    WithRejection(Path(token), _): WithRejection<Path<String>, AppError>,
) -> AppResult<Html<String>> {
    let details = st.engine.certificate_by_token(&token).await?;
    Ok(views::certificate(visitor, &details))
}

// --- authenticated ---

async fn submit_mcq(
    State(st): State<AppState>,
    RequireAuth(claims): RequireAuth,
    WithRejection(Path(mcq_id), _): IdPath,
    WithRejection(Form(form), _): WithRejection<Form<McqAnswerForm>, AppError>,
) -> AppResult<Redirect> {
    let mcq = st.content.mcq(mcq_id).await?.ok_or(AppError::NotFound("mcq"))?;
    let valid = usize::try_from(form.option).is_ok_and(|i| i < mcq.options.len());
    if !valid {
        return Err(AppError::InvalidInput("option out of range".into()));
    }
    let submission = st
        .progress
        .submit_mcq(claims.user_id, mcq_id, form.option)
        .await?
        .ok_or(AppError::NotFound("mcq"))?;
    let answer = if submission.is_correct { "correct" } else { "incorrect" };
    Ok(Redirect::to(&format!("/lessons/{}?answer={answer}", mcq.lesson_id)))
}

async fn complete_lesson(
    State(st): State<AppState>,
    RequireAuth(claims): RequireAuth,
    WithRejection(Path(lesson_id), _): IdPath,
) -> AppResult<Html<String>> {
    let outcome = st.engine.complete_lesson(claims.user_id, lesson_id).await?;
    Ok(views::completion_fragment(&outcome))
}

// --- admin ---

async fn admin_dashboard(State(st): State<AppState>, RequireAdmin(claims): RequireAdmin) -> AppResult<Html<String>> {
    let courses = st.content.list_courses().await?;
    Ok(views::admin_dashboard(Visitor::from(Some(claims)), &courses))
}

async fn admin_new_course_form(RequireAdmin(claims): RequireAdmin) -> Html<String> {
    views::admin_new_course(Visitor::from(Some(claims)))
}

async fn admin_create_course(
    State(st): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    WithRejection(Form(form), _): WithRejection<Form<NewCourseForm>, AppError>,
) -> AppResult<Redirect> {
    let title = form.title.trim();
    if title.is_empty() {
        return Err(AppError::InvalidInput("title is required".into()));
    }
    let course = st
        .content
        .create_course(title, form.description.as_deref().unwrap_or(""))
        .await?;
    tracing::info!(course_id = course.id, "course created");
    Ok(Redirect::to(&format!("/admin/courses/{}", course.id)))
}

async fn admin_show_course(
    State(st): State<AppState>,
    RequireAdmin(claims): RequireAdmin,
    WithRejection(Path(course_id), _): IdPath,
) -> AppResult<Html<String>> {
    let course = st.content.course(course_id).await?.ok_or(AppError::NotFound("course"))?;
    let lessons = st.content.lessons_for_course(course_id).await?;
    let view = views::AdminCourseView { course, lessons };
    Ok(views::admin_course(Visitor::from(Some(claims)), &view))
}

async fn admin_create_lesson(
    State(st): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    WithRejection(Path(course_id), _): IdPath,
    WithRejection(Form(form), _): WithRejection<Form<NewLessonForm>, AppError>,
) -> AppResult<Redirect> {
    let title = form.title.trim();
    if title.is_empty() {
        return Err(AppError::InvalidInput("title is required".into()));
    }
    st.content.course(course_id).await?.ok_or(AppError::NotFound("course"))?;
    let lesson = st.content.create_lesson(course_id, title, form.position).await?;
    tracing::info!(course_id, lesson_id = lesson.id, "lesson created");
    Ok(Redirect::to(&format!("/admin/courses/{course_id}")))
}

async fn admin_show_lesson(
    State(st): State<AppState>,
    RequireAdmin(claims): RequireAdmin,
    WithRejection(Path(lesson_id), _): IdPath,
) -> AppResult<Html<String>> {
    let lesson = st.content.lesson(lesson_id).await?.ok_or(AppError::NotFound("lesson"))?;
    let content = st.content.lesson_content(lesson_id).await?;
    let view = views::AdminLessonView { lesson, content };
    Ok(views::admin_lesson(Visitor::from(Some(claims)), &view))
}

async fn admin_add_content(
    State(st): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    WithRejection(Path(lesson_id), _): IdPath,
    WithRejection(Form(form), _): WithRejection<Form<ContentForm>, AppError>,
) -> AppResult<Redirect> {
    let content = NewContent::try_from(form).map_err(AppError::InvalidInput)?;
    st.content.lesson(lesson_id).await?.ok_or(AppError::NotFound("lesson"))?;
    st.content.put_content(lesson_id, &content).await?;
    Ok(Redirect::to(&format!("/admin/lessons/{lesson_id}")))
}

async fn admin_list_users(State(st): State<AppState>, RequireAdmin(claims): RequireAdmin) -> AppResult<Html<String>> {
    let users = st.users.list_users().await?;
    Ok(views::admin_users(Visitor::from(Some(claims)), &users))
}

async fn admin_show_user(
    State(st): State<AppState>,
    RequireAdmin(claims): RequireAdmin,
    WithRejection(Path(user_id), _): IdPath,
) -> AppResult<Html<String>> {
    let user = st.users.user_by_id(user_id).await?.ok_or(AppError::NotFound("user"))?;
    let enrolled = st.progress.enrolled_courses(user_id).await?;
    let enrolled_ids: HashSet<DbId> = enrolled.iter().map(|c| c.id).collect();
    let available = st
        .content
        .list_courses()
        .await?
        .into_iter()
        .filter(|c| !enrolled_ids.contains(&c.id))
        .collect();
    let certificates = st.engine.certificates_for_user(user_id).await?;
    let view = views::AdminUserView { user, enrolled, available, certificates };
    Ok(views::admin_user(Visitor::from(Some(claims)), &view))
}

async fn admin_enroll_user(
    State(st): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    WithRejection(Path(user_id), _): IdPath,
    WithRejection(Form(form), _): WithRejection<Form<EnrollForm>, AppError>,
) -> AppResult<Redirect> {
    st.users.user_by_id(user_id).await?.ok_or(AppError::NotFound("user"))?;
    st.content.course(form.course_id).await?.ok_or(AppError::NotFound("course"))?;
    if st.progress.enroll(user_id, form.course_id).await? {
        tracing::info!(user_id, course_id = form.course_id, "user enrolled");
    }
    Ok(Redirect::to(&format!("/admin/users/{user_id}")))
}

async fn admin_generate_certificate(
    State(st): State<AppState>,
    RequireAdmin(claims): RequireAdmin,
    WithRejection(Path((user_id, course_id)), _): WithRejection<Path<(DbId, DbId)>, AppError>,
) -> AppResult<Redirect> {
    st.users.user_by_id(user_id).await?.ok_or(AppError::NotFound("user"))?;
    st.content.course(course_id).await?.ok_or(AppError::NotFound("course"))?;
    match st.engine.issue_certificate(user_id, course_id).await? {
        Issuance::Issued(cert) => {
            tracing::info!(admin_id = claims.user_id, user_id, course_id, cert_id = cert.id, "certificate issued by admin");
        }
        Issuance::AlreadyIssued(cert) => {
            tracing::info!(admin_id = claims.user_id, user_id, course_id, cert_id = cert.id, "certificate already issued");
        }
        Issuance::NotComplete => {}
    }
    Ok(Redirect::to(&format!("/admin/users/{user_id}")))
}
