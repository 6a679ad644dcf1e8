//! Retry-loop behavior against a scripted mock model.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use qgen_core::client::{BlockSignal, GenerativeModel, ModelError, ModelResponse};
use qgen_core::config::{QgenConfig, RetryPolicy};
use qgen_core::error::QgenError;
use qgen_core::orchestrator::{ModelSource, Orchestrator};
use serde_json::json;

#[derive(Clone)]
enum Step {
    Text(&'static str),
    Blocked(&'static str),
    RateLimited,
    Server(u16)
}

/// Model that replays a fixed script, repeating the last step when the
/// script runs out.
struct ScriptedModel {
    script: Mutex<VecDeque<Step>>,
    calls: AtomicUsize
}

impl ScriptedModel {
    fn new(steps: Vec<Step>) -> Self {
        Self {
            script: Mutex::new(steps.into_iter().collect()),
            calls: AtomicUsize::new(0)
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerativeModel for ScriptedModel {
    async fn generate(&self, _prompt: &str) -> Result<ModelResponse, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let step = {
            let mut script = self.script.lock().unwrap();
            if script.len() > 1 {
                script.pop_front().unwrap()
            } else {
                script.front().cloned().expect("script must not be empty")
            }
        };
        match step {
            Step::Text(text) => Ok(ModelResponse {
                text: text.to_string(),
                block: None
            }),
            Step::Blocked(reason) => Ok(ModelResponse {
                text: String::new(),
                block: Some(BlockSignal {
                    reason: reason.to_string(),
                    ratings: Vec::new()
                })
            }),
            Step::RateLimited => Err(ModelError::RateLimited),
            Step::Server(status) => Err(ModelError::ServerUnavailable { status })
        }
    }
}

struct MockSource {
    model: Arc<ScriptedModel>,
    rotations: AtomicUsize,
    available: bool
}

impl MockSource {
    fn new(model: Arc<ScriptedModel>) -> Self {
        Self {
            model,
            rotations: AtomicUsize::new(0),
            available: true
        }
    }

    fn unavailable() -> Self {
        Self {
            model: Arc::new(ScriptedModel::new(vec![Step::Text("unused")])),
            rotations: AtomicUsize::new(0),
            available: false
        }
    }

    fn rotations(&self) -> usize {
        self.rotations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelSource for MockSource {
    async fn get(&self) -> Option<Arc<dyn GenerativeModel>> {
        self.available
            .then(|| self.model.clone() as Arc<dyn GenerativeModel>)
    }

    async fn rotate(&self) {
        self.rotations.fetch_add(1, Ordering::SeqCst);
    }
}

fn fast_config() -> QgenConfig {
    QgenConfig::builder()
        .key("test-key")
        .model_name("mock-flash")
        .retry(RetryPolicy {
            max_attempts: 3,
            transient_backoff: Duration::ZERO,
            unknown_backoff: Duration::ZERO,
            blocked_delay: Duration::ZERO,
            rotate_on_any_block: false
        })
        .build()
        .unwrap()
}

fn orchestrator_with(steps: Vec<Step>) -> (Orchestrator, Arc<ScriptedModel>, Arc<MockSource>) {
    let model = Arc::new(ScriptedModel::new(steps));
    let source = Arc::new(MockSource::new(model.clone()));
    let orchestrator = Orchestrator::new(source.clone(), fast_config());
    (orchestrator, model, source)
}

const TAGGED_RESPONSE: &str = concat!(
    "[C++ START]\nint main(){return 0;}\n[C++ END]\n",
    "[JSON START]\n{\"contract_id\":\"QSC-0001\"}\n[JSON END]"
);

#[tokio::test]
async fn test_generation_succeeds_first_attempt() {
    let (orchestrator, model, source) = orchestrator_with(vec![Step::Text(TAGGED_RESPONSE)]);

    let artifact = orchestrator.generate("make a voting contract").await.unwrap();

    assert_eq!(artifact.code, "int main(){return 0;}");
    assert_eq!(artifact.audit.0["contract_id"], json!("QSC-0001"));
    assert_eq!(
        artifact.audit.0["compliance"]["ai_governance"]["model_name"],
        json!("mock-flash")
    );
    assert_eq!(model.calls(), 1);
    assert_eq!(source.rotations(), 0);
}

#[tokio::test]
async fn test_always_rate_limited_exhausts_budget_with_rotations() {
    // Three consecutive 429s on a budget of 3: three attempts, two
    // rotations (the final attempt gives up without rotating).
    let (orchestrator, model, source) = orchestrator_with(vec![Step::RateLimited]);

    let artifact = orchestrator.generate("prompt").await.unwrap();

    assert_eq!(model.calls(), 3);
    assert_eq!(source.rotations(), 2);
    assert_eq!(artifact.audit.0["contract_id"], json!("ERR-NO-RESPONSE"));
    assert!(artifact.code.contains("rate limited"));
}

#[tokio::test]
async fn test_rate_limit_cursor_wraps_on_two_key_pool() {
    // Same scenario against the real factory seam: a two-key pool rotated
    // twice lands back on index 0.
    use qgen_core::keys::KeyPool;
    let pool = KeyPool::new(vec!["k0".into(), "k1".into()]).unwrap();
    pool.rotate();
    pool.rotate();
    assert_eq!(pool.current(), "k0");
}

#[tokio::test]
async fn test_safety_block_retries_without_rotation() {
    // A plain safety block sleeps and retries; the degraded result embeds
    // the recorded block reason.
    let (orchestrator, model, source) = orchestrator_with(vec![Step::Blocked("SAFETY")]);

    let artifact = orchestrator.generate("prompt").await.unwrap();

    assert_eq!(model.calls(), 3);
    assert_eq!(source.rotations(), 0);
    assert!(artifact.code.contains("SAFETY"));
    assert!(
        artifact.audit.0["agent_note"]
            .as_str()
            .unwrap()
            .contains("SAFETY")
    );
}

#[tokio::test]
async fn test_quota_block_rotates_like_rate_limit() {
    let (orchestrator, _model, source) =
        orchestrator_with(vec![Step::Blocked("quota exceeded for project"),
                               Step::Text(TAGGED_RESPONSE)]);

    let artifact = orchestrator.generate("prompt").await.unwrap();

    assert_eq!(source.rotations(), 1);
    assert_eq!(artifact.audit.0["contract_id"], json!("QSC-0001"));
}

#[tokio::test]
async fn test_rotate_on_any_block_knob() {
    let model = Arc::new(ScriptedModel::new(vec![
        Step::Blocked("SAFETY"),
        Step::Text(TAGGED_RESPONSE),
    ]));
    let source = Arc::new(MockSource::new(model.clone()));
    let mut config = fast_config();
    config.retry.rotate_on_any_block = true;
    let orchestrator = Orchestrator::new(source.clone(), config);

    orchestrator.generate("prompt").await.unwrap();

    assert_eq!(source.rotations(), 1);
}

#[tokio::test]
async fn test_transient_error_then_success() {
    let (orchestrator, model, source) =
        orchestrator_with(vec![Step::Server(503), Step::Text(TAGGED_RESPONSE)]);

    let artifact = orchestrator.generate("prompt").await.unwrap();

    assert_eq!(model.calls(), 2);
    assert_eq!(source.rotations(), 0);
    assert_eq!(artifact.code, "int main(){return 0;}");
}

#[tokio::test]
async fn test_unavailable_client_short_circuits() {
    let source = Arc::new(MockSource::unavailable());
    let orchestrator = Orchestrator::new(source, fast_config());

    let result = orchestrator.generate("prompt").await;
    assert!(matches!(result, Err(QgenError::ClientUnavailable)));
}

#[tokio::test]
async fn test_scan_success_with_tagged_json() {
    let (orchestrator, _model, _source) = orchestrator_with(vec![Step::Text(
        "[JSON START]{\"contract_id\":\"QSC-SCAN-0002\",\"report_language\":\"fr\"}[JSON END]"
    )]);

    let audit = orchestrator.scan("void main() {}", "fr").await.unwrap();

    assert_eq!(audit.0["contract_id"], json!("QSC-SCAN-0002"));
    assert_eq!(audit.0["report_language"], json!("fr"));
    assert!(audit.0["security_audit"].is_object());
}

#[tokio::test]
async fn test_scan_exhaustion_returns_placeholder() {
    let (orchestrator, model, _source) = orchestrator_with(vec![Step::Server(500)]);

    let audit = orchestrator.scan("void main() {}", "en").await.unwrap();

    assert_eq!(model.calls(), 3);
    assert_eq!(audit.0["contract_id"], json!("ERR-SCAN-FAILED"));
    assert!(
        audit.0["agent_note"]
            .as_str()
            .unwrap()
            .contains("status 500")
    );
}

#[tokio::test]
async fn test_unparsable_success_still_returns_artifact() {
    // Non-empty text always transitions to success, even when nothing in
    // it parses.
    let (orchestrator, model, _source) =
        orchestrator_with(vec![Step::Text("no tags, no json, just prose")]);

    let artifact = orchestrator.generate("prompt").await.unwrap();

    assert_eq!(model.calls(), 1);
    assert!(artifact.code.contains("no tags, no json, just prose"));
    assert_eq!(artifact.audit.0["contract_id"], json!("DEBUG-RAW"));
}
