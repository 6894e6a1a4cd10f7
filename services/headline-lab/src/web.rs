//! HTTP shell: the two-column page plus a small JSON API over the same flows.

use crate::detection::VerdictLabel;
use crate::service::{FlowError, HeadlineService, Outcome};
use crate::session::{NoticeLevel, SessionHandle};
use axum::extract::{Form, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use html_escape::{encode_double_quoted_attribute, encode_text};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

pub const SESSION_COOKIE: &str = "newsdesk_session";
pub const PAGE_TITLE: &str = "Fake News Generator and Detector";

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<HeadlineService>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/generate", post(generate_form))
        .route("/analyze", post(analyze_form))
        .route("/api/generate", post(generate_api))
        .route("/api/detect", post(detect_api))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct PromptForm { #[serde(default)] pub prompt: String }

#[derive(Debug, Deserialize)]
pub struct HeadlineForm { #[serde(default)] pub headline: String }

#[derive(Debug, Serialize)]
struct GenerateResponse { headline: String }

#[derive(Debug, Serialize)]
struct DetectResponse { label: VerdictLabel, confidence: f32, display: String }

fn session_id(headers: &HeaderMap) -> Option<Uuid> {
    headers.get_all(header::COOKIE).iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .and_then(|(_, value)| Uuid::parse_str(value.trim()).ok())
}

/// Resolves the caller's session; the cookie is (re)issued when it did not match.
fn resolve(state: &AppState, headers: &HeaderMap) -> (SessionHandle, Option<HeaderValue>) {
    let requested = session_id(headers);
    let session = state.service.sessions().get_or_create(requested);
    let id = session.lock().id;
    let cookie = (requested != Some(id))
        .then(|| HeaderValue::from_str(&format!("{SESSION_COOKIE}={id}; Path=/; HttpOnly; SameSite=Lax")).ok())
        .flatten();
    (session, cookie)
}

fn with_cookie(mut resp: Response, cookie: Option<HeaderValue>) -> Response {
    if let Some(c) = cookie { resp.headers_mut().insert(header::SET_COOKIE, c); }
    resp
}

async fn index(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let (session, cookie) = resolve(&state, &headers);
    with_cookie(render(&session, Panels::NONE).into_response(), cookie)
}

async fn generate_form(State(state): State<AppState>, headers: HeaderMap, Form(form): Form<PromptForm>) -> Response {
    let (session, cookie) = resolve(&state, &headers);
    let status = match state.service.generate(&session, &form.prompt).await {
        Ok(Outcome::Completed(_)) => return with_cookie(render(&session, Panels::GENERATED).into_response(), cookie),
        Err(FlowError::Busy) => StatusCode::CONFLICT,
        Ok(Outcome::Warning(_)) | Err(FlowError::Inference(_)) | Err(FlowError::Model(_)) => StatusCode::OK,
    };
    with_cookie((status, render(&session, Panels::NONE)).into_response(), cookie)
}

async fn analyze_form(State(state): State<AppState>, headers: HeaderMap, Form(form): Form<HeadlineForm>) -> Response {
    let (session, cookie) = resolve(&state, &headers);
    let status = match state.service.analyze(&session, &form.headline).await {
        Ok(Outcome::Completed(_)) => return with_cookie(render(&session, Panels::VERDICT).into_response(), cookie),
        Err(FlowError::Busy) => StatusCode::CONFLICT,
        Ok(Outcome::Warning(_)) | Err(FlowError::Inference(_)) | Err(FlowError::Model(_)) => StatusCode::OK,
    };
    with_cookie((status, render(&session, Panels::NONE)).into_response(), cookie)
}

async fn generate_api(State(state): State<AppState>, headers: HeaderMap, Json(body): Json<PromptBody>) -> Response {
    let (session, cookie) = resolve(&state, &headers);
    let resp = match state.service.generate(&session, &body.prompt).await {
        Ok(Outcome::Completed(headline)) => Json(GenerateResponse { headline }).into_response(),
        Ok(Outcome::Warning(warning)) => api_error(StatusCode::UNPROCESSABLE_ENTITY, warning),
        Err(e) => flow_error(e),
    };
    drain_notices(&session);
    with_cookie(resp, cookie)
}

async fn detect_api(State(state): State<AppState>, headers: HeaderMap, Json(body): Json<HeadlineBody>) -> Response {
    let (session, cookie) = resolve(&state, &headers);
    let resp = match state.service.analyze(&session, &body.headline).await {
        Ok(Outcome::Completed(v)) => {
            let display = v.display();
            Json(DetectResponse { label: v.label, confidence: v.confidence, display }).into_response()
        }
        Ok(Outcome::Warning(warning)) => api_error(StatusCode::UNPROCESSABLE_ENTITY, warning),
        Err(e) => flow_error(e),
    };
    drain_notices(&session);
    with_cookie(resp, cookie)
}

#[derive(Debug, Deserialize)]
pub struct PromptBody { #[serde(default)] pub prompt: String }

#[derive(Debug, Deserialize)]
pub struct HeadlineBody { #[serde(default)] pub headline: String }

// API callers get the outcome in the response body, not on the next page view.
fn drain_notices(session: &SessionHandle) { session.lock().take_notices(); }

fn api_error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}

fn flow_error(e: FlowError) -> Response {
    let status = match e {
        FlowError::Busy => StatusCode::CONFLICT,
        FlowError::Inference(_) | FlowError::Model(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    api_error(status, e.to_string())
}

/// Result panels shown below each form; only the flow that just completed shows one.
#[derive(Debug, Clone, Copy)]
struct Panels { generated: bool, verdict: bool }

impl Panels {
    const NONE: Self = Self { generated: false, verdict: false };
    const GENERATED: Self = Self { generated: true, verdict: false };
    const VERDICT: Self = Self { generated: false, verdict: true };
}

fn render(session: &SessionHandle, panels: Panels) -> Html<String> {
    let (notices, prompt, headline, generated, verdict) = {
        let mut s = session.lock();
        let generated = s.last_generated.clone().filter(|_| panels.generated);
        let verdict = s.last_verdict.clone().filter(|_| panels.verdict);
        (s.take_notices(), s.last_prompt.clone(), s.current_headline.clone(), generated, verdict)
    };
    let mut notice_html = String::new();
    for n in &notices {
        let class = match n.level {
            NoticeLevel::Info => "info",
            NoticeLevel::Success => "success",
            NoticeLevel::Warning => "warning",
            NoticeLevel::Error => "error",
        };
        notice_html.push_str(&format!("<div class=\"notice {class}\">{}</div>\n", encode_text(&n.message)));
    }
    let generated_html = generated
        .map(|h| format!("<h3>Generated Headline:</h3>\n<p class=\"headline\">{}</p>\n", encode_text(&h)))
        .unwrap_or_default();
    let verdict_html = verdict
        .map(|v| {
            let mark = match v.label { VerdictLabel::Real => "✅", VerdictLabel::Fake => "❌" };
            format!("<h3>Analysis Result:</h3>\n<p class=\"verdict\">{mark} Verdict: {}</p>\n", encode_text(&v.display()))
        })
        .unwrap_or_default();
    Html(format!(
        r#"<!doctype html>
<html>
<head><meta charset="utf-8"><title>{title}</title>
<style>
body {{ font-family: sans-serif; margin: 2rem; }}
.columns {{ display: flex; gap: 2rem; }}
.columns > section {{ flex: 1; }}
textarea, input[type=text] {{ width: 100%; }}
.notice {{ padding: .5rem; margin: .5rem 0; border-radius: 4px; }}
.info {{ background: #e7f1ff; }} .success {{ background: #e6f6ea; }}
.warning {{ background: #fff6db; }} .error {{ background: #fde8e8; }}
</style>
</head>
<body>
<h1>{title}</h1>
{notice_html}<div class="columns">
<section>
<h2>1. Fake News Generator</h2>
<form method="post" action="/generate">
<label for="prompt">Enter a prompt to generate a fake headline:</label>
<input type="text" id="prompt" name="prompt" value="{prompt}">
<button type="submit">Generate Headline</button>
</form>
{generated_html}</section>
<section>
<h2>2. Fake News Detector</h2>
<form method="post" action="/analyze">
<label for="headline">Enter a headline to analyze:</label>
<textarea id="headline" name="headline" rows="4">{headline}</textarea>
<button type="submit">Analyze Headline</button>
</form>
{verdict_html}</section>
</div>
</body>
</html>
"#,
        title = PAGE_TITLE,
        prompt = encode_double_quoted_attribute(&prompt),
        headline = encode_text(&headline),
    ))
}
