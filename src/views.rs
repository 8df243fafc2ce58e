//! Per-page view data and their HTML rendering.
//!
//! Pages are deliberately plain; every interpolated value goes through
//! [`esc`].

use std::collections::HashSet;
use std::fmt::Write;

use axum::response::Html;

use crate::completion::{Issuance, LessonOutcome};
use crate::gate::Visitor;
use crate::models::*;

pub struct DashboardView {
    pub courses: Vec<Course>,
    pub certificates: Vec<Certificate>,
}

pub struct CourseView {
    pub course: Course,
    pub lessons: Vec<Lesson>,
    pub completed: HashSet<DbId>,
    pub course_complete: bool,
    pub certificate: Option<Certificate>,
}

pub struct LessonView {
    pub lesson: Lesson,
    /// `None` for guests, who only see the lesson title.
    pub content: Option<LessonContent>,
    pub is_complete: bool,
    pub answer: Option<bool>,
}

pub struct AdminCourseView {
    pub course: Course,
    pub lessons: Vec<Lesson>,
}

pub struct AdminLessonView {
    pub lesson: Lesson,
    pub content: LessonContent,
}

pub struct AdminUserView {
    pub user: UserSummary,
    pub enrolled: Vec<Course>,
    pub available: Vec<Course>,
    pub certificates: Vec<Certificate>,
}

pub fn esc(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            c => out.push(c),
        }
    }
    out
}

fn page(title: &str, visitor: Visitor, body: &str) -> Html<String> {
    let nav = match visitor {
        Visitor::Guest => r#"<a href="/login">Log in</a> <a href="/register">Register</a>"#.to_string(),
        Visitor::Student(_) => logout_form(),
        Visitor::Admin(_) => format!(r#"<a href="/admin">Admin</a> {}"#, logout_form()),
    };
    Html(format!(
        r#"<!DOCTYPE html>
<html>
<head>
  <meta charset='utf-8'/>
  <title>{title}</title>
</head>
<body>
<nav><a href="/">Home</a> {nav}</nav>
<main>
{body}
</main>
</body>
</html>"#,
        title = esc(title),
    ))
}

fn logout_form() -> String {
    r#"<form method="post" action="/logout" style="display:inline"><button>Log out</button></form>"#.to_string()
}

fn course_list(courses: &[Course], href_prefix: &str) -> String {
    if courses.is_empty() {
        return "<p>No courses yet.</p>".into();
    }
    let mut out = String::from("<ul>");
    for c in courses {
        let _ = write!(
            out,
            r#"<li><a href="{href_prefix}/courses/{id}">{title}</a> {desc}</li>"#,
            id = c.id,
            title = esc(&c.title),
            desc = esc(&c.description),
        );
    }
    out.push_str("</ul>");
    out
}

fn certificate_link(cert: &Certificate) -> String {
    format!(
        r#"<a href="/certificates/{token}">View certificate</a>"#,
        token = esc(&cert.token)
    )
}

pub fn dashboard(visitor: Visitor, view: &DashboardView) -> Html<String> {
    let heading = match visitor {
        Visitor::Guest => "Available courses",
        _ => "My courses",
    };
    let mut body = format!("<h1>{heading}</h1>{}", course_list(&view.courses, ""));
    if !view.certificates.is_empty() {
        body.push_str("<h2>Certificates</h2><ul>");
        for cert in &view.certificates {
            let _ = write!(body, "<li>{}</li>", certificate_link(cert));
        }
        body.push_str("</ul>");
    }
    page("Dashboard", visitor, &body)
}

pub fn course(visitor: Visitor, view: &CourseView) -> Html<String> {
    let mut body = format!(
        "<h1>{}</h1><p>{}</p><ol>",
        esc(&view.course.title),
        esc(&view.course.description)
    );
    for l in &view.lessons {
        let mark = if view.completed.contains(&l.id) { " ✓" } else { "" };
        let _ = write!(
            body,
            r#"<li><a href="/lessons/{id}">{title}</a>{mark}</li>"#,
            id = l.id,
            title = esc(&l.title),
        );
    }
    body.push_str("</ol>");
    if view.course_complete {
        body.push_str("<p>Course complete.</p>");
    }
    if let Some(cert) = &view.certificate {
        body.push_str(&certificate_link(cert));
    }
    page(&view.course.title, visitor, &body)
}

pub fn lesson(visitor: Visitor, view: &LessonView) -> Html<String> {
    let l = &view.lesson;
    let mut body = format!(
        r#"<h1>{title}</h1><p><a href="/courses/{course_id}">Back to course</a></p>"#,
        title = esc(&l.title),
        course_id = l.course_id,
    );
    match &view.content {
        None => body.push_str(r#"<p><a href="/login">Log in</a> to view this lesson.</p>"#),
        Some(content) => {
            body.push_str(&content_blocks(content, true));
            match view.answer {
                Some(true) => body.push_str("<p>Correct!</p>"),
                Some(false) => body.push_str("<p>Incorrect. Try again!</p>"),
                None => {}
            }
            if view.is_complete {
                body.push_str(&completed_marker());
            } else {
                let _ = write!(
                    body,
                    r#"<form method="post" action="/lessons/{id}/complete"><button>Mark complete</button></form>"#,
                    id = l.id
                );
            }
        }
    }
    page(&l.title, visitor, &body)
}

fn content_blocks(content: &LessonContent, answerable: bool) -> String {
    let mut out = String::new();
    if let Some(v) = &content.video {
        let _ = write!(
            out,
            r#"<section><h2>{title}</h2><video controls src="{url}"></video></section>"#,
            title = esc(&v.title),
            url = esc(&v.video_url),
        );
    }
    if let Some(t) = &content.text {
        let _ = write!(
            out,
            "<section><h2>{}</h2><div>{}</div></section>",
            esc(&t.title),
            esc(&t.content)
        );
    }
    if let Some(m) = &content.mcq {
        let _ = write!(out, "<section><h2>{}</h2>", esc(&m.question));
        if answerable {
            let _ = write!(out, r#"<form method="post" action="/mcqs/{}/submit">"#, m.id);
            for (i, opt) in m.options.iter().enumerate() {
                let _ = write!(
                    out,
                    r#"<label><input type="radio" name="option" value="{i}"/> {}</label><br/>"#,
                    esc(opt)
                );
            }
            out.push_str("<button>Submit</button></form>");
        } else {
            out.push_str("<ol start=\"0\">");
            for (i, opt) in m.options.iter().enumerate() {
                let mark = if i as i32 == m.correct_option_index { " (correct)" } else { "" };
                let _ = write!(out, "<li>{}{mark}</li>", esc(opt));
            }
            out.push_str("</ol>");
        }
        out.push_str("</section>");
    }
    if out.is_empty() {
        out.push_str("<p>No content yet.</p>");
    }
    out
}

fn completed_marker() -> String {
    r#"<div class="completed">✓ Completed</div>"#.to_string()
}

/// Fragment swapped in after marking a lesson complete.
pub fn completion_fragment(outcome: &LessonOutcome) -> Html<String> {
    let mut out = completed_marker();
    match &outcome.issuance {
        Issuance::Issued(cert) => {
            let _ = write!(out, "<p>Course complete! {}</p>", certificate_link(cert));
        }
        Issuance::AlreadyIssued(cert) => {
            let _ = write!(out, "<p>{}</p>", certificate_link(cert));
        }
        Issuance::NotComplete => {}
    }
    Html(out)
}

pub fn certificate(visitor: Visitor, details: &CertificateDetails) -> Html<String> {
    let body = format!(
        r#"<h1>Certificate of Completion</h1>
<p>This certifies that <strong>{student}</strong> has completed <strong>{course}</strong>.</p>
<p>Issued {issued}</p>
<p>Certificate id: <code>{token}</code></p>"#,
        student = esc(&details.student_name),
        course = esc(&details.course_title),
        issued = details.issued_at.format("%Y-%m-%d"),
        token = esc(&details.token),
    );
    page("Certificate", visitor, &body)
}

pub fn login(visitor: Visitor, failed: bool) -> Html<String> {
    let notice = if failed { "<p>Invalid username or password.</p>" } else { "" };
    let body = format!(
        r#"<h1>Log in</h1>{notice}
<form method="post" action="/login">
<label>Username <input name="username"/></label>
<label>Password <input type="password" name="password"/></label>
<button>Log in</button>
</form>"#
    );
    page("Log in", visitor, &body)
}

pub fn register(visitor: Visitor, min_password_len: usize) -> Html<String> {
    let body = format!(
        r#"<h1>Register</h1>
<form method="post" action="/register">
<label>Username <input name="username"/></label>
<label>Password <input type="password" name="password" minlength="{min_password_len}"/></label>
<button>Register</button>
</form>"#
    );
    page("Register", visitor, &body)
}

// --- admin ---

pub fn admin_dashboard(visitor: Visitor, courses: &[Course]) -> Html<String> {
    let body = format!(
        r#"<h1>Admin</h1>
<p><a href="/admin/courses/new">New course</a> <a href="/admin/users">Users</a></p>
{}"#,
        course_list(courses, "/admin")
    );
    page("Admin", visitor, &body)
}

pub fn admin_new_course(visitor: Visitor) -> Html<String> {
    let body = r#"<h1>New course</h1>
<form method="post" action="/admin/courses/new">
<label>Title <input name="title"/></label>
<label>Description <textarea name="description"></textarea></label>
<button>Create</button>
</form>"#;
    page("New course", visitor, body)
}

pub fn admin_course(visitor: Visitor, view: &AdminCourseView) -> Html<String> {
    let mut body = format!("<h1>{}</h1><ol>", esc(&view.course.title));
    for l in &view.lessons {
        let _ = write!(
            body,
            r#"<li><a href="/admin/lessons/{id}">{title}</a> (position {pos})</li>"#,
            id = l.id,
            title = esc(&l.title),
            pos = l.position,
        );
    }
    let _ = write!(
        body,
        r#"</ol>
<h2>Add lesson</h2>
<form method="post" action="/admin/courses/{id}/lessons">
<label>Title <input name="title"/></label>
<label>Position <input type="number" name="position" value="{next}"/></label>
<button>Add</button>
</form>"#,
        id = view.course.id,
        next = view.lessons.len() + 1,
    );
    page(&view.course.title, visitor, &body)
}

pub fn admin_lesson(visitor: Visitor, view: &AdminLessonView) -> Html<String> {
    let mut body = format!(
        r#"<h1>{title}</h1><p><a href="/admin/courses/{course_id}">Back to course</a></p>"#,
        title = esc(&view.lesson.title),
        course_id = view.lesson.course_id,
    );
    body.push_str(&content_blocks(&view.content, false));
    let _ = write!(
        body,
        r#"<h2>Set content</h2>
<form method="post" action="/admin/lessons/{id}/content">
<input type="hidden" name="content_type" value="video"/>
<label>Video title <input name="video_title"/></label>
<label>Video URL <input name="video_url"/></label>
<button>Save video</button>
</form>
<form method="post" action="/admin/lessons/{id}/content">
<input type="hidden" name="content_type" value="text"/>
<label>Text title <input name="text_title"/></label>
<label>Content <textarea name="text_content"></textarea></label>
<button>Save text</button>
</form>
<form method="post" action="/admin/lessons/{id}/content">
<input type="hidden" name="content_type" value="mcq"/>
<label>Question <input name="mcq_question"/></label>
<input name="mcq_option0"/> <input name="mcq_option1"/> <input name="mcq_option2"/> <input name="mcq_option3"/>
<label>Correct option (0-3) <input type="number" name="correct_option" value="0"/></label>
<button>Save question</button>
</form>"#,
        id = view.lesson.id,
    );
    page(&view.lesson.title, visitor, &body)
}

pub fn admin_users(visitor: Visitor, users: &[UserSummary]) -> Html<String> {
    let mut body = String::from("<h1>Users</h1><ul>");
    for u in users {
        let _ = write!(
            body,
            r#"<li><a href="/admin/users/{id}">{name}</a> ({role})</li>"#,
            id = u.id,
            name = esc(&u.username),
            role = u.role,
        );
    }
    body.push_str("</ul>");
    page("Users", visitor, &body)
}

pub fn admin_user(visitor: Visitor, view: &AdminUserView) -> Html<String> {
    let u = &view.user;
    let mut body = format!("<h1>{} ({})</h1><h2>Enrolled</h2><ul>", esc(&u.username), u.role);
    for c in &view.enrolled {
        let issued = view.certificates.iter().find(|cert| cert.course_id == c.id);
        let _ = write!(body, "<li>{}", esc(&c.title));
        match issued {
            Some(cert) => {
                let _ = write!(body, " {}", certificate_link(cert));
            }
            None => {
                let _ = write!(
                    body,
                    r#" <form method="post" action="/admin/users/{uid}/courses/{cid}/generate-certificate" style="display:inline"><button>Issue certificate</button></form>"#,
                    uid = u.id,
                    cid = c.id,
                );
            }
        }
        body.push_str("</li>");
    }
    body.push_str("</ul>");
    if !view.available.is_empty() {
        let _ = write!(
            body,
            r#"<h2>Enroll</h2><form method="post" action="/admin/users/{}/enroll"><select name="course_id">"#,
            u.id
        );
        for c in &view.available {
            let _ = write!(body, r#"<option value="{}">{}</option>"#, c.id, esc(&c.title));
        }
        body.push_str("</select><button>Enroll</button></form>");
    }
    page(&u.username, visitor, &body)
}
