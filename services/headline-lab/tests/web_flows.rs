use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use headline_lab::error::{InferenceError, ModelLoadError};
use headline_lab::models::{
    ClassifierHandle, GeneratorHandle, HeadlineClassifier, HeadlineGenerator, ModelRegistry, ModelSource, Prediction,
    SamplingParams,
};
use headline_lab::service::{FlowError, HeadlineService, Outcome, BUSY_WARNING};
use headline_lab::session::{begin, Notice, NoticeLevel, SessionState, SessionStore};
use headline_lab::web::{router, AppState, SESSION_COOKIE};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

const DEFAULT_HEADLINE: &str = "The stock market closed with a 2% gain today.";
const DEFAULT_PROMPT: &str = "In a surprising turn of events,";

struct Echo { continuation: Option<String>, calls: Arc<AtomicUsize> }

impl HeadlineGenerator for Echo {
    fn encode(&self, text: &str) -> Result<Vec<u32>, InferenceError> { Ok(text.bytes().map(u32::from).collect()) }
    fn generate(&self, ids: &[u32], _: &SamplingParams) -> Result<Vec<Vec<u32>>, InferenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let Some(tail) = &self.continuation else { return Err(InferenceError::Sampling("logits contain NaN".into())) };
        let mut out = ids.to_vec();
        out.extend(tail.bytes().map(u32::from));
        Ok(vec![out])
    }
    fn decode(&self, ids: &[u32], _: bool) -> Result<String, InferenceError> {
        Ok(ids.iter().map(|&b| b as u8 as char).collect())
    }
}

struct Fixed { predictions: Vec<Prediction>, calls: Arc<AtomicUsize> }

impl HeadlineClassifier for Fixed {
    fn classify(&self, _: &str) -> Result<Vec<Prediction>, InferenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.predictions.clone())
    }
}

struct Scripted { continuation: Option<String>, predictions: Vec<Prediction>, gen_calls: Arc<AtomicUsize>, cls_calls: Arc<AtomicUsize> }

impl ModelSource for Scripted {
    fn load_classifier(&self) -> Result<ClassifierHandle, ModelLoadError> {
        Ok(Arc::new(Fixed { predictions: self.predictions.clone(), calls: self.cls_calls.clone() }))
    }
    fn load_generator(&self) -> Result<GeneratorHandle, ModelLoadError> {
        Ok(Arc::new(Echo { continuation: self.continuation.clone(), calls: self.gen_calls.clone() }))
    }
}

struct Harness { app: Router, service: Arc<HeadlineService>, gen_calls: Arc<AtomicUsize>, cls_calls: Arc<AtomicUsize> }

fn p(label: &str, score: f32) -> Prediction { Prediction { label: label.into(), score } }

fn harness(continuation: Option<&str>, predictions: Vec<Prediction>) -> Harness {
    let gen_calls = Arc::new(AtomicUsize::new(0));
    let cls_calls = Arc::new(AtomicUsize::new(0));
    let source = Scripted { continuation: continuation.map(str::to_string), predictions, gen_calls: gen_calls.clone(), cls_calls: cls_calls.clone() };
    let registry = Arc::new(ModelRegistry::new(Box::new(source)));
    let store = SessionStore::new(Duration::from_secs(60), DEFAULT_HEADLINE, DEFAULT_PROMPT)
        .with_greeting(Notice::new(NoticeLevel::Success, "Successfully fixed the configuration file!"));
    let service = Arc::new(HeadlineService::new(registry, store, SamplingParams::headline().with_seed(Some(7))));
    Harness { app: router(AppState { service: service.clone() }), service, gen_calls, cls_calls }
}

fn real_harness() -> Harness { harness(Some(" Local cat elected mayor.\nMore at eleven."), vec![p("LABEL_0", 0.87), p("LABEL_1", 0.13)]) }

async fn body_string(resp: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn session_cookie(resp: &axum::response::Response) -> String {
    let raw = resp.headers().get(header::SET_COOKIE).expect("set-cookie").to_str().unwrap();
    raw.split(';').next().unwrap().to_string()
}

fn cookie_session(h: &Harness, cookie: &str) -> headline_lab::session::SessionHandle {
    let id = cookie.split_once('=').and_then(|(_, v)| uuid::Uuid::parse_str(v).ok()).expect("session id");
    let session = h.service.sessions().get_or_create(Some(id));
    assert_eq!(session.lock().id, id);
    session
}

fn form(uri: &str, body: &str, cookie: Option<&str>) -> Request<Body> {
    let mut b = Request::builder().method("POST").uri(uri).header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(c) = cookie { b = b.header(header::COOKIE, c); }
    b.body(Body::from(body.to_string())).unwrap()
}

fn json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder().method("POST").uri(uri).header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string())).unwrap()
}

#[tokio::test]
async fn index_issues_cookie_and_renders_both_columns() {
    let h = real_harness();
    let resp = h.app.clone().oneshot(Request::builder().uri("/").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let cookie = session_cookie(&resp);
    assert!(cookie.starts_with(&format!("{SESSION_COOKIE}=")));
    let page = body_string(resp).await;
    assert!(page.contains("Fake News Generator and Detector"));
    assert!(page.contains("1. Fake News Generator"));
    assert!(page.contains("2. Fake News Detector"));
    assert!(page.contains("The stock market closed with a 2% gain today."));
    assert!(page.contains("Successfully fixed the configuration file!"));

    let again = h.app.clone().oneshot(Request::builder().uri("/").header(header::COOKIE, &cookie).body(Body::empty()).unwrap()).await.unwrap();
    assert!(again.headers().get(header::SET_COOKIE).is_none());
    assert!(!body_string(again).await.contains("Successfully fixed the configuration file!"));
    assert_eq!(h.service.sessions().len(), 1);
}

#[tokio::test]
async fn empty_prompt_warns_without_invoking_the_generator() {
    let h = real_harness();
    let page = body_string(h.app.clone().oneshot(form("/generate", "prompt=", None)).await.unwrap()).await;
    assert!(page.contains("Please enter a prompt first."));
    assert!(!page.contains("Generated Headline:"));

    let resp = h.app.clone().oneshot(json("/api/generate", serde_json::json!({"prompt": ""}))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let v: serde_json::Value = serde_json::from_str(&body_string(resp).await).unwrap();
    assert_eq!(v["error"], "Please enter a prompt first.");
    assert_eq!(h.gen_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn empty_headline_warns_without_invoking_the_classifier() {
    let h = real_harness();
    let page = body_string(h.app.clone().oneshot(form("/analyze", "headline=", None)).await.unwrap()).await;
    assert!(page.contains("Please enter a headline to analyze."));
    assert!(!page.contains("Analysis Result:"));
    let resp = h.app.clone().oneshot(json("/api/detect", serde_json::json!({"headline": ""}))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(h.cls_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn empty_submissions_leave_session_state_unchanged() {
    let h = real_harness();
    let first = h.app.clone().oneshot(Request::builder().uri("/").body(Body::empty()).unwrap()).await.unwrap();
    let cookie = session_cookie(&first);
    let resp = h.app.clone().oneshot(form("/analyze", "headline=Mayor+resigns", Some(&cookie))).await.unwrap();
    assert!(body_string(resp).await.contains("Analysis Result:"));
    let (headline, verdict) = {
        let s = cookie_session(&h, &cookie);
        let s = s.lock();
        (s.current_headline.clone(), s.last_verdict.clone())
    };
    assert_eq!(headline, "Mayor resigns");
    assert!(verdict.is_some());

    let page = body_string(h.app.clone().oneshot(form("/generate", "prompt=", Some(&cookie))).await.unwrap()).await;
    assert!(page.contains("Please enter a prompt first."));
    let page = body_string(h.app.clone().oneshot(form("/analyze", "headline=", Some(&cookie))).await.unwrap()).await;
    assert!(page.contains("Please enter a headline to analyze."));
    assert!(page.contains(">Mayor resigns</textarea>"));

    let session = cookie_session(&h, &cookie);
    let s = session.lock();
    assert_eq!(s.current_headline, headline);
    assert_eq!(s.last_verdict, verdict);
    assert_eq!(s.last_generated, None);
    assert_eq!(h.cls_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.gen_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn generated_headline_becomes_the_detector_input() {
    let h = real_harness();
    let first = h.app.clone().oneshot(Request::builder().uri("/").body(Body::empty()).unwrap()).await.unwrap();
    let cookie = session_cookie(&first);

    let resp = h.app.clone().oneshot(form("/generate", "prompt=In+a+surprising+turn+of+events%2C", Some(&cookie))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let page = body_string(resp).await;
    assert!(page.contains("Generated Headline:"));
    assert!(page.contains("<p class=\"headline\">Local cat elected mayor.</p>"));
    assert!(page.contains("<textarea id=\"headline\" name=\"headline\" rows=\"4\">Local cat elected mayor.</textarea>"));
    assert!(!page.contains("More at eleven"));

    let page = body_string(h.app.clone().oneshot(Request::builder().uri("/").header(header::COOKIE, &cookie).body(Body::empty()).unwrap()).await.unwrap()).await;
    assert!(page.contains(">Local cat elected mayor.</textarea>"));
    assert!(!page.contains("Generated Headline:"));
    assert_eq!(h.gen_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn analyze_renders_verdict_with_two_decimals() {
    let h = real_harness();
    let page = body_string(h.app.clone().oneshot(form("/analyze", "headline=The+stock+market+closed+with+a+2%25+gain+today.", None)).await.unwrap()).await;
    assert!(page.contains("Analysis Result:"));
    assert!(page.contains("✅ Verdict: REAL News (Confidence: 0.87)"));

    let resp = h.app.clone().oneshot(json("/api/detect", serde_json::json!({"headline": DEFAULT_HEADLINE}))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let v: serde_json::Value = serde_json::from_str(&body_string(resp).await).unwrap();
    assert_eq!(v["label"], "REAL");
    assert_eq!(v["display"], "REAL News (Confidence: 0.87)");
}

#[tokio::test]
async fn fake_verdict_uses_cross_mark() {
    let h = harness(Some(" x"), vec![p("LABEL_0", 0.004), p("LABEL_1", 0.996)]);
    let page = body_string(h.app.clone().oneshot(form("/analyze", "headline=Aliens+endorse+candidate", None)).await.unwrap()).await;
    assert!(page.contains("❌ Verdict: FAKE News (Confidence: 1.00)"));
}

#[tokio::test]
async fn unrecognized_label_is_a_server_error() {
    let h = harness(Some(" x"), vec![p("LABEL_2", 0.9)]);
    let resp = h.app.clone().oneshot(json("/api/detect", serde_json::json!({"headline": "Something"}))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let v: serde_json::Value = serde_json::from_str(&body_string(resp).await).unwrap();
    assert!(v["error"].as_str().unwrap().contains("LABEL_2"));
}

#[tokio::test]
async fn generation_failure_keeps_current_headline() {
    let h = harness(None, vec![p("LABEL_0", 0.9)]);
    let first = h.app.clone().oneshot(Request::builder().uri("/").body(Body::empty()).unwrap()).await.unwrap();
    let cookie = session_cookie(&first);
    let page = body_string(h.app.clone().oneshot(form("/generate", "prompt=Breaking%3A", Some(&cookie))).await.unwrap()).await;
    assert!(page.contains("Generation failed:"));
    assert!(page.contains(&format!(">{DEFAULT_HEADLINE}</textarea>")));

    let resp = h.app.clone().oneshot(json("/api/generate", serde_json::json!({"prompt": "Breaking:"}))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn second_request_on_a_busy_session_is_rejected() {
    let h = real_harness();
    let session = h.service.sessions().get_or_create(None);
    let guard = begin(&session, SessionState::Detecting).unwrap();
    assert!(matches!(h.service.generate(&session, "Prompt").await, Err(FlowError::Busy)));
    assert_eq!(h.gen_calls.load(Ordering::SeqCst), 0);
    drop(guard);
    let out = h.service.generate(&session, "Prompt").await.unwrap();
    assert_eq!(out, Outcome::Completed("Local cat elected mayor.".to_string()));
    assert_eq!(session.lock().state(), SessionState::Idle);
}

#[tokio::test]
async fn busy_form_submission_shows_a_warning() {
    let h = real_harness();
    let first = h.app.clone().oneshot(Request::builder().uri("/").body(Body::empty()).unwrap()).await.unwrap();
    let cookie = session_cookie(&first);
    let session = cookie_session(&h, &cookie);
    let guard = begin(&session, SessionState::Detecting).unwrap();

    let resp = h.app.clone().oneshot(form("/generate", "prompt=Breaking%3A", Some(&cookie))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    let page = body_string(resp).await;
    assert!(page.contains(&format!("<div class=\"notice warning\">{BUSY_WARNING}</div>")));
    assert!(!page.contains("Generated Headline:"));
    assert_eq!(h.gen_calls.load(Ordering::SeqCst), 0);

    let resp = h.app.clone().oneshot(form("/analyze", "headline=Breaking", Some(&cookie))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    assert!(body_string(resp).await.contains(BUSY_WARNING));
    drop(guard);
    assert_eq!(h.cls_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn api_generate_returns_json_headline_each_call() {
    let h = real_harness();
    for _ in 0..3 {
        let resp = h.app.clone().oneshot(json("/api/generate", serde_json::json!({"prompt": "Prompt"}))).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let v: serde_json::Value = serde_json::from_str(&body_string(resp).await).unwrap();
        assert_eq!(v["headline"], "Local cat elected mayor.");
    }
    assert_eq!(h.gen_calls.load(Ordering::SeqCst), 3);
}

/// Downloads GPT-2 from the hub; needs network and a classifier directory.
#[tokio::test]
#[ignore]
async fn real_gpt2_generates_a_single_line() {
    use headline_lab::models::CandleModelSource;
    use headline_lab::settings::ModelSettings;
    let dir = tempfile::tempdir().unwrap();
    let source = CandleModelSource::new(ModelSettings {
        classifier_dir: dir.path().to_path_buf(),
        architecture_tag: "distilbert".into(),
        repair_config: true,
        generator_repo: "gpt2".into(),
        generator_revision: "main".into(),
        device: "cpu".into(),
    }).unwrap();
    let registry = Arc::new(ModelRegistry::new(Box::new(source)));
    let service = HeadlineService::new(registry, SessionStore::new(Duration::from_secs(60), DEFAULT_HEADLINE, DEFAULT_PROMPT), SamplingParams::headline().with_seed(Some(1)));
    let session = service.sessions().get_or_create(None);
    match service.generate(&session, DEFAULT_PROMPT).await.unwrap() {
        Outcome::Completed(h) => {
            assert!(!h.contains('\n'));
            assert!(!h.starts_with(DEFAULT_PROMPT));
        }
        other => panic!("unexpected {other:?}"),
    }
}
