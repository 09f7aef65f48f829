//! Client for the Black Forest Labs Flux image API.
//!
//! Generation is asynchronous: `submit` returns a job handle, and the result is
//! fetched from one of several regional mirrors that serve the same job ids.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::error::{ImageError, ProviderError};
use crate::models::{GenerationJob, JobState, JobStatus, PollResult};

const PROVIDER: &str = "bfl";
pub const DEMO_KEY: &str = "DEMO_KEY";

/// Remote image generation as seen by the workflow.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    /// Starts a job. Fails with `Timeout` when no response arrives within `timeout`.
    async fn submit(
        &self,
        prompt: &str,
        width: u32,
        height: u32,
        timeout: Duration,
    ) -> Result<GenerationJob, ImageError>;

    /// Fetches job status. `timeout` applies to each endpoint attempt.
    async fn poll(&self, request_id: &str, timeout: Duration) -> Result<PollResult, ImageError>;
}

#[derive(Debug, Clone)]
pub struct BflConfig {
    pub api_key: String,
    pub submit_url: String,
    /// Regional API roots in priority order, e.g. `https://api.eu1.bfl.ai/v1`.
    pub poll_hosts: Vec<String>,
}

impl Default for BflConfig {
    fn default() -> Self {
        Self {
            api_key: DEMO_KEY.to_string(),
            submit_url: "https://api.bfl.ai/v1/flux-pro-1.1".to_string(),
            poll_hosts: vec![
                "https://api.bfl.ai/v1".to_string(),
                "https://api.us1.bfl.ai/v1".to_string(),
                "https://api.eu1.bfl.ai/v1".to_string(),
            ],
        }
    }
}

pub struct BflClient {
    client: Client,
    config: BflConfig,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    #[serde(alias = "request_id")]
    id: String,
    #[serde(default)]
    polling_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResultResponse {
    status: String,
    #[serde(default)]
    result: Option<ResultPayload>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResultPayload {
    #[serde(default)]
    sample: Option<String>,
}

impl BflClient {
    pub fn new(config: BflConfig) -> Self {
        Self { client: Client::new(), config }
    }

    async fn poll_endpoint(
        &self,
        host: &str,
        request_id: &str,
        timeout: Duration,
    ) -> Result<ResultResponse, ProviderError> {
        let url = format!("{}/get_result", host.trim_end_matches('/'));
        let response = self
            .client
            .get(&url)
            .header("x-key", &self.config.api_key)
            .query(&[("id", request_id)])
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(PROVIDER, e, timeout))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status { provider: PROVIDER, status: status.as_u16(), body });
        }

        response
            .json::<ResultResponse>()
            .await
            .map_err(|e| ProviderError::Decode { provider: PROVIDER, message: e.to_string() })
    }
}

#[async_trait]
impl ImageGenerator for BflClient {
    async fn submit(
        &self,
        prompt: &str,
        width: u32,
        height: u32,
        timeout: Duration,
    ) -> Result<GenerationJob, ImageError> {
        if self.config.api_key == DEMO_KEY {
            warn!("BFL_API_KEY not configured, skipping image generation");
            return Err(ProviderError::Transport {
                provider: PROVIDER,
                message: "image provider not configured".to_string(),
            }
            .into());
        }

        info!("🔗 Submitting image job to {}", self.config.submit_url);
        let body = json!({ "prompt": prompt, "width": width, "height": height });
        debug!("📤 Request body: {}", body);

        let response = self
            .client
            .post(&self.config.submit_url)
            .header("x-key", &self.config.api_key)
            .header("accept", "application/json")
            .json(&body)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(PROVIDER, e, timeout))?;

        let status = response.status();
        info!("📥 Response status: {}", status);

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("❌ Image submit rejected: {}", body);
            return Err(
                ProviderError::Status { provider: PROVIDER, status: status.as_u16(), body }.into()
            );
        }

        let parsed: SubmitResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Decode { provider: PROVIDER, message: e.to_string() })?;

        info!(request_id = %parsed.id, "✅ Image job accepted");
        Ok(GenerationJob {
            request_id: parsed.id,
            polling_url: parsed.polling_url,
            state: JobState::Submitted,
        })
    }

    async fn poll(&self, request_id: &str, timeout: Duration) -> Result<PollResult, ImageError> {
        let mut last_error = None;

        for host in &self.config.poll_hosts {
            match self.poll_endpoint(host, request_id, timeout).await {
                Ok(payload) => {
                    let status = normalize_status(&payload.status);
                    debug!(%host, provider_status = %payload.status, ?status, "poll answered");
                    let error = match status {
                        JobStatus::Error => payload.error.or(Some(payload.status)),
                        _ => payload.error,
                    };
                    return Ok(PollResult {
                        request_id: request_id.to_string(),
                        status,
                        image_url: payload.result.and_then(|r| r.sample),
                        error,
                    });
                }
                Err(e) => {
                    warn!(%host, "⚠️ Polling endpoint failed: {}", e);
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(last) => Err(ImageError::AllEndpointsUnavailable {
                attempted: self.config.poll_hosts.len(),
                last: Box::new(last),
            }),
            None => Err(ProviderError::Transport {
                provider: PROVIDER,
                message: "no polling endpoints configured".to_string(),
            }
            .into()),
        }
    }
}

/// Maps provider status spellings ("Ready", "Pending", "Content Moderated", ...) onto `JobStatus`.
pub fn normalize_status(raw: &str) -> JobStatus {
    match raw.trim().to_ascii_lowercase().as_str() {
        "ready" | "succeeded" | "completed" => JobStatus::Ready,
        "queued" | "submitted" => JobStatus::Queued,
        "pending" | "processing" | "running" => JobStatus::Processing,
        _ => JobStatus::Error,
    }
}

/// Bounds for blocking until an image job finishes.
#[derive(Debug, Clone, Copy)]
pub struct WaitPolicy {
    pub max_wait: Duration,
    pub interval: Duration,
    pub poll_timeout: Duration,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            max_wait: Duration::from_secs(120),
            interval: Duration::from_millis(1500),
            poll_timeout: Duration::from_secs(10),
        }
    }
}

impl WaitPolicy {
    pub fn max_attempts(&self) -> u32 {
        let interval = self.interval.as_millis().max(1);
        ((self.max_wait.as_millis() / interval) as u32).max(1)
    }
}

/// Polls until the job is ready, failed, or the wall-clock cap passes.
///
/// Updates `job.state` along the way and returns the asset URL on success.
pub async fn wait_for_result(
    images: &dyn ImageGenerator,
    job: &mut GenerationJob,
    policy: WaitPolicy,
) -> Result<String, ImageError> {
    let started = Instant::now();
    job.state = JobState::Polling;

    for attempt in 1..=policy.max_attempts() {
        let result = match images.poll(&job.request_id, policy.poll_timeout).await {
            Ok(result) => result,
            Err(e) => {
                job.state = JobState::Failed;
                return Err(e);
            }
        };
        debug!(request_id = %job.request_id, attempt, status = ?result.status, "poll attempt");

        match (result.status, result.image_url) {
            (JobStatus::Ready, Some(url)) => {
                job.state = JobState::Succeeded;
                info!(request_id = %job.request_id, attempt, "🖼️ Image ready");
                return Ok(url);
            }
            (JobStatus::Ready, None) => {
                job.state = JobState::Failed;
                return Err(ImageError::JobFailed {
                    request_id: job.request_id.clone(),
                    reason: "job ready without an image".to_string(),
                });
            }
            (JobStatus::Error, _) => {
                job.state = JobState::Failed;
                return Err(ImageError::JobFailed {
                    request_id: job.request_id.clone(),
                    reason: result.error.unwrap_or_else(|| "unknown error".to_string()),
                });
            }
            (JobStatus::Queued | JobStatus::Processing, _) => {}
        }

        if started.elapsed() + policy.interval >= policy.max_wait {
            break;
        }
        tokio::time::sleep(policy.interval).await;
    }

    job.state = JobState::TimedOut;
    warn!(request_id = %job.request_id, "⏰ Image job not ready within {:?}", policy.max_wait);
    Err(ProviderError::Timeout { provider: PROVIDER, after: policy.max_wait }.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::{Query, State},
        http::StatusCode,
        response::IntoResponse,
        routing::{get, post},
        Json, Router,
    };
    use pretty_assertions::assert_eq;
    use serde_json::Value;
    use std::collections::HashMap;
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct Hits {
        r1: Arc<AtomicUsize>,
        r2: Arc<AtomicUsize>,
        r3: Arc<AtomicUsize>,
    }

    async fn serve(app: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    fn client(addr: SocketAddr) -> BflClient {
        BflClient::new(BflConfig {
            api_key: "test-key".into(),
            submit_url: format!("http://{addr}/v1/flux-pro-1.1"),
            poll_hosts: ["r1", "r2", "r3"].iter().map(|r| format!("http://{addr}/{r}/v1")).collect(),
        })
    }

    fn ready(id: &str) -> Json<Value> {
        Json(json!({ "id": id, "status": "Ready", "result": { "sample": format!("https://cdn/{id}.png") } }))
    }

    #[tokio::test]
    async fn submit_returns_job_handle() {
        let app = Router::new().route(
            "/v1/flux-pro-1.1",
            post(|headers: axum::http::HeaderMap, Json(body): Json<Value>| async move {
                assert_eq!(headers.get("x-key").unwrap(), "test-key");
                assert_eq!(body["width"], 896);
                Json(json!({ "id": "job-1", "polling_url": "https://api.us1.bfl.ai/v1/get_result?id=job-1" }))
            }),
        );
        let addr = serve(app).await;

        let job = client(addr).submit("a hoodie", 896, 1120, Duration::from_secs(5)).await.unwrap();
        assert_eq!(job.request_id, "job-1");
        assert_eq!(job.state, JobState::Submitted);
        assert!(job.polling_url.unwrap().contains("us1"));
    }

    #[tokio::test]
    async fn submit_surfaces_status_and_body() {
        let app = Router::new().route(
            "/v1/flux-pro-1.1",
            post(|| async { (StatusCode::PAYMENT_REQUIRED, "insufficient credits") }),
        );
        let addr = serve(app).await;

        let err = client(addr).submit("p", 1024, 1024, Duration::from_secs(5)).await.unwrap_err();
        assert_eq!(
            err,
            ImageError::Provider(ProviderError::Status {
                provider: PROVIDER,
                status: 402,
                body: "insufficient credits".into(),
            })
        );
    }

    #[tokio::test]
    async fn submit_times_out_past_deadline() {
        let app = Router::new().route(
            "/v1/flux-pro-1.1",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(2)).await;
                Json(json!({ "id": "late" }))
            }),
        );
        let addr = serve(app).await;

        let err = client(addr).submit("p", 1024, 1024, Duration::from_millis(100)).await.unwrap_err();
        assert!(matches!(err, ImageError::Provider(ProviderError::Timeout { .. })));
    }

    #[tokio::test]
    async fn demo_key_never_reaches_the_network() {
        let client = BflClient::new(BflConfig::default());
        let err = client.submit("p", 1024, 1024, Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, ImageError::Provider(ProviderError::Transport { .. })));
    }

    #[tokio::test]
    async fn first_healthy_mirror_wins() {
        let hits = Hits::default();
        let app = Router::new()
            .route(
                "/r1/v1/get_result",
                get(|State(h): State<Hits>| async move {
                    h.r1.fetch_add(1, Ordering::SeqCst);
                    StatusCode::SERVICE_UNAVAILABLE
                }),
            )
            .route(
                "/r2/v1/get_result",
                get(|State(h): State<Hits>, Query(q): Query<HashMap<String, String>>| async move {
                    h.r2.fetch_add(1, Ordering::SeqCst);
                    ready(&q["id"])
                }),
            )
            .route(
                "/r3/v1/get_result",
                get(|State(h): State<Hits>| async move {
                    h.r3.fetch_add(1, Ordering::SeqCst);
                    StatusCode::OK
                }),
            )
            .with_state(hits.clone());
        let addr = serve(app).await;

        let result = client(addr).poll("job-9", Duration::from_secs(5)).await.unwrap();
        assert_eq!(result.status, JobStatus::Ready);
        assert_eq!(result.image_url.as_deref(), Some("https://cdn/job-9.png"));
        assert_eq!(hits.r1.load(Ordering::SeqCst), 1);
        assert_eq!(hits.r2.load(Ordering::SeqCst), 1);
        assert_eq!(hits.r3.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn undecodable_mirror_body_falls_through_to_next() {
        let hits = Hits::default();
        let app = Router::new()
            .route(
                "/r1/v1/get_result",
                get(|State(h): State<Hits>| async move {
                    h.r1.fetch_add(1, Ordering::SeqCst);
                    (StatusCode::OK, "<html>maintenance</html>")
                }),
            )
            .route(
                "/r2/v1/get_result",
                get(|State(h): State<Hits>, Query(q): Query<HashMap<String, String>>| async move {
                    h.r2.fetch_add(1, Ordering::SeqCst);
                    ready(&q["id"])
                }),
            )
            .with_state(hits.clone());
        let addr = serve(app).await;

        let result = client(addr).poll("job-3", Duration::from_secs(5)).await.unwrap();
        assert_eq!(result.status, JobStatus::Ready);
        assert_eq!(result.image_url.as_deref(), Some("https://cdn/job-3.png"));
        assert_eq!(hits.r1.load(Ordering::SeqCst), 1);
        assert_eq!(hits.r2.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn refused_mirror_falls_through_to_next() {
        // Bind then drop a listener so the port refuses connections.
        let closed = {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };
        let app = Router::new().route(
            "/r2/v1/get_result",
            get(|Query(q): Query<HashMap<String, String>>| async move { ready(&q["id"]) }),
        );
        let addr = serve(app).await;
        let client = BflClient::new(BflConfig {
            api_key: "test-key".into(),
            submit_url: format!("http://{addr}/v1/flux-pro-1.1"),
            poll_hosts: vec![format!("http://{closed}/r1/v1"), format!("http://{addr}/r2/v1")],
        });

        let result = client.poll("job-4", Duration::from_secs(5)).await.unwrap();
        assert_eq!(result.image_url.as_deref(), Some("https://cdn/job-4.png"));
    }

    #[tokio::test]
    async fn slow_mirror_times_out_then_next_answers() {
        let app = Router::new()
            .route(
                "/r1/v1/get_result",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(2)).await;
                    StatusCode::OK
                }),
            )
            .route(
                "/r2/v1/get_result",
                get(|Query(q): Query<HashMap<String, String>>| async move { ready(&q["id"]) }),
            );
        let addr = serve(app).await;

        let result = client(addr).poll("job-5", Duration::from_millis(100)).await.unwrap();
        assert_eq!(result.image_url.as_deref(), Some("https://cdn/job-5.png"));
    }

    #[tokio::test]
    async fn all_mirrors_down_reports_last_error() {
        let app = Router::new()
            .route("/r1/v1/get_result", get(|| async { StatusCode::INTERNAL_SERVER_ERROR }))
            .route("/r2/v1/get_result", get(|| async { StatusCode::INTERNAL_SERVER_ERROR }))
            .route(
                "/r3/v1/get_result",
                get(|| async { (StatusCode::BAD_GATEWAY, "eu1 down").into_response() }),
            );
        let addr = serve(app).await;

        let err = client(addr).poll("job-1", Duration::from_secs(5)).await.unwrap_err();
        match err {
            ImageError::AllEndpointsUnavailable { attempted, last } => {
                assert_eq!(attempted, 3);
                assert_eq!(
                    *last,
                    ProviderError::Status { provider: PROVIDER, status: 502, body: "eu1 down".into() }
                );
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn provider_statuses_normalize() {
        assert_eq!(normalize_status("Ready"), JobStatus::Ready);
        assert_eq!(normalize_status("Pending"), JobStatus::Processing);
        assert_eq!(normalize_status("queued"), JobStatus::Queued);
        assert_eq!(normalize_status("Content Moderated"), JobStatus::Error);
        assert_eq!(normalize_status("Task not found"), JobStatus::Error);
    }

    /// Replays poll results in order, then reports the job as still processing.
    struct Scripted(std::sync::Mutex<Vec<PollResult>>);

    impl Scripted {
        fn new(mut results: Vec<PollResult>) -> Self {
            results.reverse();
            Scripted(std::sync::Mutex::new(results))
        }
    }

    #[async_trait]
    impl ImageGenerator for Scripted {
        async fn submit(&self, _: &str, _: u32, _: u32, _: Duration) -> Result<GenerationJob, ImageError> {
            unreachable!()
        }

        async fn poll(&self, request_id: &str, _: Duration) -> Result<PollResult, ImageError> {
            Ok(self.0.lock().unwrap().pop().unwrap_or(PollResult {
                request_id: request_id.to_string(),
                status: JobStatus::Processing,
                image_url: None,
                error: None,
            }))
        }
    }

    fn poll_result(status: JobStatus, url: Option<&str>) -> PollResult {
        PollResult { request_id: "job".into(), status, image_url: url.map(String::from), error: None }
    }

    fn job() -> GenerationJob {
        GenerationJob { request_id: "job".into(), polling_url: None, state: JobState::Submitted }
    }

    fn fast_policy(max_wait_ms: u64) -> WaitPolicy {
        WaitPolicy {
            max_wait: Duration::from_millis(max_wait_ms),
            interval: Duration::from_millis(10),
            poll_timeout: Duration::from_secs(1),
        }
    }

    #[tokio::test]
    async fn wait_returns_url_once_ready() {
        let images = Scripted::new(vec![
            poll_result(JobStatus::Queued, None),
            poll_result(JobStatus::Processing, None),
            poll_result(JobStatus::Ready, Some("https://cdn/final.png")),
        ]);
        let mut job = job();
        let url = wait_for_result(&images, &mut job, fast_policy(1_000)).await.unwrap();
        assert_eq!(url, "https://cdn/final.png");
        assert_eq!(job.state, JobState::Succeeded);
    }

    #[tokio::test]
    async fn wait_gives_up_after_cap() {
        let images = Scripted::new(vec![]);
        let mut job = job();
        let err = wait_for_result(&images, &mut job, fast_policy(50)).await.unwrap_err();
        assert!(matches!(err, ImageError::Provider(ProviderError::Timeout { .. })));
        assert_eq!(job.state, JobState::TimedOut);
    }

    #[tokio::test]
    async fn wait_stops_on_job_error() {
        let mut failed = poll_result(JobStatus::Error, None);
        failed.error = Some("Content Moderated".into());
        let images = Scripted::new(vec![failed]);
        let mut job = job();
        let err = wait_for_result(&images, &mut job, fast_policy(1_000)).await.unwrap_err();
        assert_eq!(
            err,
            ImageError::JobFailed { request_id: "job".into(), reason: "Content Moderated".into() }
        );
        assert_eq!(job.state, JobState::Failed);
    }

    #[test]
    fn attempts_are_bounded_by_wall_clock() {
        assert_eq!(WaitPolicy::default().max_attempts(), 80);
        let tiny = WaitPolicy { max_wait: Duration::ZERO, ..WaitPolicy::default() };
        assert_eq!(tiny.max_attempts(), 1);
    }
}
