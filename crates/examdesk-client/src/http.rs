//! HTTP implementation of the exam service.

use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, CONTENT_DISPOSITION};
use reqwest::{Method, RequestBuilder, Response};
use serde::Deserialize;
use tracing::instrument;

use examdesk_core::auth::{AuthContext, Credentials, CurrentUser};
use examdesk_core::error::SessionError;
use examdesk_core::traits::{
    GradingService, SessionSnapshot, StartSessionResponse, SubmissionResult, SubmitRequest,
};

/// Which call is being made, for status-code mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Call {
    Start,
    Fetch,
    Submit,
    Other,
}

/// Binary artifacts the service can hand out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// A candidate's certificate PDF, by certificate id.
    Certificate,
    /// An exam's results spreadsheet, by exam id.
    Results,
    /// A database backup, by backup id (admin only).
    Backup,
}

impl ArtifactKind {
    fn path(&self, id: &str) -> String {
        match self {
            ArtifactKind::Certificate => format!("/certificates/{id}/download"),
            ArtifactKind::Results => format!("/exams/{id}/results/export"),
            ArtifactKind::Backup => format!("/admin/backups/{id}/download"),
        }
    }

    fn default_file_name(&self, id: &str) -> String {
        match self {
            ArtifactKind::Certificate => format!("certificate-{id}.pdf"),
            ArtifactKind::Results => format!("results-{id}.xlsx"),
            ArtifactKind::Backup => format!("backup-{id}.sql"),
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactKind::Certificate => write!(f, "certificate"),
            ArtifactKind::Results => write!(f, "results"),
            ArtifactKind::Backup => write!(f, "backup"),
        }
    }
}

impl FromStr for ArtifactKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "certificate" | "cert" => Ok(ArtifactKind::Certificate),
            "results" | "result" => Ok(ArtifactKind::Results),
            "backup" => Ok(ArtifactKind::Backup),
            other => Err(format!("unknown artifact kind: {other}")),
        }
    }
}

/// Result of a public certificate lookup.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CertificateVerification {
    pub valid: bool,
    #[serde(default)]
    pub certificate_number: Option<String>,
    #[serde(default)]
    pub candidate_name: Option<String>,
    #[serde(default)]
    pub exam_title: Option<String>,
    #[serde(default)]
    pub issued_at: Option<DateTime<Utc>>,
}

/// Exam service client over HTTP with bearer authentication.
pub struct HttpGradingService {
    base_url: String,
    auth: Arc<AuthContext>,
    timeout: Duration,
    client: reqwest::Client,
}

impl HttpGradingService {
    pub fn new(base_url: &str, auth: Arc<AuthContext>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            auth,
            timeout,
            client,
        })
    }

    /// The auth context this client reads its token from.
    pub fn auth(&self) -> &Arc<AuthContext> {
        &self.auth
    }

    /// Fetch the signed-in user and record it in the auth context.
    #[instrument(skip(self))]
    pub async fn fetch_current_user(&self) -> anyhow::Result<CurrentUser> {
        let token = self
            .auth
            .bearer_token()
            .ok_or(SessionError::AuthenticationExpired)?;
        let response = self
            .send(self.request(Method::GET, "/auth/me"), Call::Other)
            .await?;
        let user: CurrentUser = parse_json(response).await?;
        self.auth
            .init(Credentials::new(token).with_user(user.clone()));
        Ok(user)
    }

    /// Look up a certificate by its public verification code.
    #[instrument(skip(self))]
    pub async fn verify_certificate(&self, code: &str) -> anyhow::Result<CertificateVerification> {
        let response = self
            .send(
                self.request(Method::GET, &format!("/certificates/verify/{code}")),
                Call::Other,
            )
            .await;
        match response {
            Ok(response) => parse_json(response).await,
            // An unknown code is a valid answer, not a failure.
            Err(SessionError::ApiError { status: 404, .. }) => Ok(CertificateVerification {
                valid: false,
                certificate_number: None,
                candidate_name: None,
                exam_title: None,
                issued_at: None,
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Download a binary artifact into `dest_dir` and return its path.
    ///
    /// The file is written to a temporary file first and moved into place,
    /// so a failed download never leaves a truncated file behind.
    #[instrument(skip(self, kind, dest_dir), fields(kind = %kind))]
    pub async fn download(
        &self,
        kind: ArtifactKind,
        id: &str,
        dest_dir: &Path,
    ) -> anyhow::Result<PathBuf> {
        let response = self
            .send(self.request(Method::GET, &kind.path(id)), Call::Other)
            .await?;

        let file_name = file_name_from_headers(response.headers())
            .unwrap_or_else(|| kind.default_file_name(id));
        let bytes = response
            .bytes()
            .await
            .map_err(|e| self.transport_error(e))?;

        std::fs::create_dir_all(dest_dir)
            .with_context(|| format!("failed to create {}", dest_dir.display()))?;
        let mut tmp = tempfile::NamedTempFile::new_in(dest_dir)?;
        tmp.write_all(&bytes)?;
        let path = dest_dir.join(file_name);
        tmp.persist(&path)
            .with_context(|| format!("failed to save {}", path.display()))?;

        tracing::info!(path = %path.display(), bytes = bytes.len(), "artifact downloaded");
        Ok(path)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        match self.auth.bearer_token() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder, call: Call) -> Result<Response, SessionError> {
        let response = builder.send().await.map_err(|e| self.transport_error(e))?;

        let status = response.status().as_u16();
        tracing::debug!(status, ?call, "response received");
        if status == 401 {
            self.auth.teardown();
            return Err(SessionError::AuthenticationExpired);
        }
        if status >= 400 {
            let body = response.text().await.unwrap_or_default();
            let message = error_message(&body, status);
            return Err(match (call, status) {
                (Call::Start, 400 | 403 | 404 | 409 | 410 | 422) | (Call::Fetch, 403 | 404 | 410) => {
                    SessionError::SessionUnavailable(message)
                }
                _ => SessionError::ApiError { status, message },
            });
        }
        Ok(response)
    }

    fn transport_error(&self, e: reqwest::Error) -> SessionError {
        if e.is_timeout() {
            SessionError::Timeout(self.timeout.as_secs())
        } else {
            SessionError::NetworkError(e.to_string())
        }
    }
}

#[async_trait]
impl GradingService for HttpGradingService {
    fn name(&self) -> &str {
        "http"
    }

    #[instrument(skip(self))]
    async fn start_session(&self, exam_id: &str) -> anyhow::Result<StartSessionResponse> {
        let response = self
            .send(
                self.request(Method::POST, &format!("/exams/{exam_id}/sessions")),
                Call::Start,
            )
            .await?;
        parse_json(response).await
    }

    #[instrument(skip(self))]
    async fn get_session(&self, session_id: &str) -> anyhow::Result<SessionSnapshot> {
        let response = self
            .send(
                self.request(Method::GET, &format!("/sessions/{session_id}")),
                Call::Fetch,
            )
            .await?;
        parse_json(response).await
    }

    #[instrument(skip(self, request), fields(answers = request.answers.len(), manual = request.manual))]
    async fn submit_session(
        &self,
        session_id: &str,
        request: &SubmitRequest,
    ) -> anyhow::Result<SubmissionResult> {
        let builder = self
            .request(Method::POST, &format!("/sessions/{session_id}/submit"))
            .header("Idempotency-Key", &request.idempotency_key)
            .json(request);
        let response = self.send(builder, Call::Submit).await?;
        parse_json(response).await
    }
}

async fn parse_json<T: serde::de::DeserializeOwned>(response: Response) -> anyhow::Result<T> {
    response.json::<T>().await.map_err(|e| {
        SessionError::ApiError {
            status: 0,
            message: format!("failed to parse response: {e}"),
        }
        .into()
    })
}

/// Pull a human-readable message out of an error body.
///
/// Understands `{"detail": ".."}`, `{"message": ".."}` and
/// `{"error": {"message": ".."}}`; anything else is returned as-is.
fn error_message(body: &str, status: u16) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        let found = value
            .get("detail")
            .or_else(|| value.get("message"))
            .or_else(|| value.get("error").and_then(|e| e.get("message")))
            .and_then(|v| v.as_str());
        if let Some(msg) = found {
            return msg.to_string();
        }
    }
    if body.trim().is_empty() {
        format!("HTTP {status}")
    } else {
        body.trim().to_string()
    }
}

/// File name from `Content-Disposition: attachment; filename="x.pdf"`,
/// reduced to its last path component.
fn file_name_from_headers(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(CONTENT_DISPOSITION)?.to_str().ok()?;
    let raw = value
        .split(';')
        .map(str::trim)
        .find_map(|part| part.strip_prefix("filename="))?
        .trim_matches('"');
    let name = Path::new(raw).file_name()?.to_str()?;
    (!name.is_empty()).then(|| name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use examdesk_core::traits::SubmittedAnswer;
    use reqwest::header::HeaderValue;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn session_body() -> serde_json::Value {
        json!({
            "session": {
                "id": "sess-9",
                "exam_id": "exam-3",
                "title": "Electrical Safety",
                "started_at": "2026-05-04T10:00:00Z",
                "duration_minutes": 30,
                "questions": [
                    {"id": "q1", "prompt": "Pick one", "type": "single_choice",
                     "options": [{"id": "o1", "text": "A"}, {"id": "o2", "text": "B"}], "points": 2},
                    {"id": "q2", "prompt": "Explain", "type": "free_text", "points": 5}
                ]
            },
            "remaining_seconds": 1200
        })
    }

    fn client(server: &MockServer, token: Option<&str>) -> HttpGradingService {
        let auth = match token {
            Some(t) => AuthContext::with_credentials(Credentials::new(t)),
            None => AuthContext::new(),
        };
        HttpGradingService::new(&server.uri(), Arc::new(auth), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn start_session_sends_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/exams/exam-3/sessions"))
            .and(header("authorization", "Bearer tok-1"))
            .respond_with(ResponseTemplate::new(201).set_body_json(session_body()))
            .mount(&server)
            .await;

        let svc = client(&server, Some("tok-1"));
        let started = svc.start_session("exam-3").await.unwrap();
        assert_eq!(started.session.id, "sess-9");
        assert_eq!(started.session.questions.len(), 2);
        assert_eq!(started.remaining_seconds, Some(1200));
    }

    #[tokio::test]
    async fn start_rejection_is_session_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/exams/exam-3/sessions"))
            .respond_with(
                ResponseTemplate::new(409).set_body_json(json!({"detail": "Exam already completed"})),
            )
            .mount(&server)
            .await;

        let svc = client(&server, Some("tok-1"));
        let err = svc.start_session("exam-3").await.unwrap_err();
        match err.downcast::<SessionError>().unwrap() {
            SessionError::SessionUnavailable(msg) => assert_eq!(msg, "Exam already completed"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unauthorized_clears_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sessions/sess-9"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let svc = client(&server, Some("expired"));
        assert!(svc.auth().is_authenticated());
        let err = svc.get_session("sess-9").await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SessionError>(),
            Some(SessionError::AuthenticationExpired)
        ));
        assert!(!svc.auth().is_authenticated());
    }

    #[tokio::test]
    async fn submit_posts_canonical_payload() {
        let server = MockServer::start().await;
        let request = SubmitRequest {
            answers: vec![
                SubmittedAnswer {
                    question_id: "q1".into(),
                    selected_option_id: Some("o2".into()),
                    text_answer: None,
                },
                SubmittedAnswer {
                    question_id: "q2".into(),
                    selected_option_id: None,
                    text_answer: Some("Isolate first".into()),
                },
            ],
            idempotency_key: "key-123".into(),
            manual: true,
        };

        Mock::given(method("POST"))
            .and(path("/sessions/sess-9/submit"))
            .and(header("idempotency-key", "key-123"))
            .and(body_json(json!({
                "answers": [
                    {"question_id": "q1", "selected_option_id": "o2"},
                    {"question_id": "q2", "text_answer": "Isolate first"}
                ],
                "idempotency_key": "key-123",
                "manual": true
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "session_id": "sess-9",
                "status": "submitted",
                "max_score": 7.0,
                "pending_review": true
            })))
            .expect(1)
            .mount(&server)
            .await;

        let svc = client(&server, Some("tok-1"));
        let result = svc.submit_session("sess-9", &request).await.unwrap();
        assert!(result.pending_review);
        assert!(result.score.is_none());
    }

    #[tokio::test]
    async fn server_error_on_submit_is_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sessions/sess-9/submit"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let svc = client(&server, Some("tok-1"));
        let request = SubmitRequest {
            answers: vec![],
            idempotency_key: "k".into(),
            manual: false,
        };
        let err = SessionError::from_service(svc.submit_session("sess-9", &request).await.unwrap_err());
        assert!(err.is_retryable());
        assert!(err.to_string().contains("maintenance"));
    }

    #[tokio::test]
    async fn slow_server_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sessions/sess-9"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(session_body())
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let auth = Arc::new(AuthContext::new());
        let svc = HttpGradingService::new(&server.uri(), auth, Duration::from_secs(1)).unwrap();
        let err = svc.get_session("sess-9").await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SessionError>(),
            Some(SessionError::Timeout(1))
        ));
    }

    #[tokio::test]
    async fn download_uses_content_disposition() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/certificates/cert-1/download"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-disposition", "attachment; filename=\"ada-cert.pdf\"")
                    .set_body_bytes(b"%PDF-1.7 fake".to_vec()),
            )
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let svc = client(&server, Some("tok-1"));
        let saved = svc
            .download(ArtifactKind::Certificate, "cert-1", dir.path())
            .await
            .unwrap();
        assert_eq!(saved, dir.path().join("ada-cert.pdf"));
        assert_eq!(std::fs::read(&saved).unwrap(), b"%PDF-1.7 fake");
    }

    #[tokio::test]
    async fn download_falls_back_to_default_name() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/exams/exam-3/results/export"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0x50, 0x4b, 0x03, 0x04]))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let svc = client(&server, Some("tok-1"));
        let saved = svc
            .download(ArtifactKind::Results, "exam-3", &dir.path().join("nested"))
            .await
            .unwrap();
        assert_eq!(saved.file_name().unwrap(), "results-exam-3.xlsx");
        assert_eq!(std::fs::read(&saved).unwrap().len(), 4);
    }

    #[tokio::test]
    async fn failed_download_leaves_no_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/admin/backups/b-1/download"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({"message": "admins only"})))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let svc = client(&server, Some("tok-1"));
        let err = svc
            .download(ArtifactKind::Backup, "b-1", dir.path())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("admins only"));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn verify_certificate_valid_and_unknown() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/certificates/verify/CERT-2026-000123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "valid": true,
                "certificate_number": "CERT-2026-000123",
                "candidate_name": "Ada Lovelace",
                "exam_title": "Electrical Safety",
                "issued_at": "2026-05-05T08:00:00Z"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/certificates/verify/CERT-0000-000000"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let svc = client(&server, None);
        let found = svc.verify_certificate("CERT-2026-000123").await.unwrap();
        assert!(found.valid);
        assert_eq!(found.candidate_name.as_deref(), Some("Ada Lovelace"));

        let missing = svc.verify_certificate("CERT-0000-000000").await.unwrap();
        assert!(!missing.valid);
    }

    #[tokio::test]
    async fn fetch_current_user_initialises_context() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/me"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "u-1", "name": "Ada", "role": "candidate"
            })))
            .mount(&server)
            .await;

        let svc = client(&server, Some("tok-1"));
        let user = svc.fetch_current_user().await.unwrap();
        assert_eq!(user.role, "candidate");
        assert_eq!(svc.auth().current_user(), Some(user));
        assert_eq!(svc.auth().bearer_token().as_deref(), Some("tok-1"));
    }

    #[test]
    fn error_message_shapes() {
        assert_eq!(error_message(r#"{"detail":"inactive"}"#, 400), "inactive");
        assert_eq!(error_message(r#"{"error":{"message":"nope"}}"#, 400), "nope");
        assert_eq!(error_message("plain text", 500), "plain text");
        assert_eq!(error_message("", 502), "HTTP 502");
    }

    #[test]
    fn content_disposition_is_sanitised() {
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_DISPOSITION,
            HeaderValue::from_static("attachment; filename=\"../../etc/passwd\""),
        );
        assert_eq!(file_name_from_headers(&headers).as_deref(), Some("passwd"));
        assert!(file_name_from_headers(&HeaderMap::new()).is_none());
    }

    #[test]
    fn artifact_kind_parse() {
        assert_eq!("cert".parse::<ArtifactKind>().unwrap(), ArtifactKind::Certificate);
        assert_eq!("Results".parse::<ArtifactKind>().unwrap(), ArtifactKind::Results);
        assert!("invoice".parse::<ArtifactKind>().is_err());
        assert_eq!(ArtifactKind::Backup.to_string(), "backup");
    }
}
