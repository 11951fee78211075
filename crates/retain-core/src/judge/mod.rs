//! Answer Judge
//!
//! Opaque scoring collaborator for the review flow: given a card's prompt,
//! its expected answer, and what the learner actually typed, produce a
//! correctness verdict, a *suggested* rating, and a short explanation.
//!
//! The judge never schedules anything and never overrides the learner; the
//! review front-end shows the suggestion and the learner confirms or picks
//! a different rating. Judge failure therefore degrades to manual rating,
//! not to a failed review.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::warn;

use crate::scheduler::Rating;

const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_API_ENDPOINT: &str = "https://api.openai.com/v1";
const DEFAULT_TIMEOUT_MS: u64 = 30_000;
const MAX_RETRIES: usize = 3;
const BASE_BACKOFF_MS: u64 = 200;

const SYSTEM_PROMPT: &str = "You grade flashcard answers. Compare the learner's answer to the \
expected answer for meaning, not exact wording. Respond with ONLY a JSON object: \
{\"correct\": bool, \"rating\": 0-3, \"explanation\": string}. \
Rating scale: 0 = wrong, 1 = barely right, 2 = right, 3 = right and effortless. \
Keep the explanation to one or two sentences.";

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Judge error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum JudgeError {
    /// Required configuration is missing
    #[error("judge not configured: {0}")]
    NotConfigured(&'static str),
    /// Transport-level request failure
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// Non-success HTTP response
    #[error("HTTP {status}: {body}")]
    HttpStatus {
        /// Response status code
        status: reqwest::StatusCode,
        /// Response body, for diagnostics
        body: String,
    },
    /// Response body was not valid JSON
    #[error("JSON decode failed: {0}")]
    Json(#[from] serde_json::Error),
    /// The model returned no choices
    #[error("empty response")]
    EmptyResponse,
    /// The model's text could not be read as a judgment
    #[error("unparseable judgment: {0}")]
    Unparseable(String),
}

// ============================================================================
// JUDGMENT
// ============================================================================

/// Verdict on a learner's answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Judgment {
    /// Whether the answer matched the expected answer in meaning
    pub correct: bool,
    /// Rating the judge proposes; the learner has the final say
    pub suggested_rating: Rating,
    /// One or two sentences of reasoning, shown to the learner
    pub explanation: String,
}

/// Scoring collaborator consumed by the review flow
pub trait Judge {
    /// Grade `answer` against the card's expected answer
    fn judge(
        &self,
        front: &str,
        expected: &str,
        answer: &str,
    ) -> impl Future<Output = Result<Judgment, JudgeError>> + Send;
}

// ============================================================================
// REMOTE JUDGE
// ============================================================================

/// Judge configuration, usually read from the environment
#[derive(Debug, Clone)]
pub struct JudgeConfig {
    /// Bearer token for the chat-completions API
    pub api_key: Option<String>,
    /// Model identifier
    pub model: String,
    /// API base URL (an OpenAI-compatible `/v1` endpoint)
    pub api_endpoint: String,
    /// Per-request timeout
    pub timeout: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// What the model is asked to emit
#[derive(Debug, Deserialize)]
struct RawJudgment {
    correct: bool,
    rating: Option<i64>,
    explanation: Option<String>,
}

/// Chat-completions-backed judge
#[derive(Clone)]
pub struct RemoteJudge {
    config: JudgeConfig,
    client: reqwest::Client,
}

impl RemoteJudge {
    /// Build a judge from explicit configuration
    pub fn new(config: JudgeConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { config, client }
    }

    /// Build a judge from `RETAIN_LLM_*` environment variables
    pub fn from_env() -> Self {
        let api_key = env_string("RETAIN_LLM_API_KEY");
        let model = env_string("RETAIN_LLM_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let api_endpoint = normalize_endpoint(
            env_string("RETAIN_LLM_ENDPOINT").unwrap_or_else(|| DEFAULT_API_ENDPOINT.to_string()),
        );
        let timeout =
            Duration::from_millis(env_u64("RETAIN_LLM_TIMEOUT_MS").unwrap_or(DEFAULT_TIMEOUT_MS));

        Self::new(JudgeConfig {
            api_key,
            model,
            api_endpoint,
            timeout,
        })
    }

    /// Whether the judge has everything it needs to make calls
    pub fn is_available(&self) -> bool {
        self.config
            .api_key
            .as_deref()
            .is_some_and(|v| !v.trim().is_empty())
            && !self.config.model.trim().is_empty()
            && !self.config.api_endpoint.trim().is_empty()
    }

    async fn post_with_retry(
        &self,
        url: &str,
        api_key: &str,
        payload: &serde_json::Value,
    ) -> Result<ChatResponse, JudgeError> {
        let mut last_error: Option<JudgeError> = None;

        for retry in 0..=MAX_RETRIES {
            match self
                .client
                .post(url)
                .bearer_auth(api_key)
                .json(payload)
                .send()
                .await
            {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        let bytes = resp.bytes().await?;
                        return serde_json::from_slice(&bytes).map_err(JudgeError::Json);
                    }
                    let body = resp.text().await.unwrap_or_default();
                    let err = JudgeError::HttpStatus { status, body };
                    if retry < MAX_RETRIES && is_retryable(status) {
                        let backoff = Duration::from_millis(BASE_BACKOFF_MS * (1 << retry));
                        warn!(retry, ?status, "judge request failed, retrying");
                        sleep(backoff).await;
                        last_error = Some(err);
                        continue;
                    }
                    return Err(err);
                }
                Err(e) => {
                    let err = JudgeError::Request(e);
                    if retry < MAX_RETRIES {
                        let backoff = Duration::from_millis(BASE_BACKOFF_MS * (1 << retry));
                        warn!(retry, "judge request error, retrying");
                        sleep(backoff).await;
                        last_error = Some(err);
                        continue;
                    }
                    return Err(err);
                }
            }
        }
        Err(last_error.unwrap_or(JudgeError::NotConfigured("unknown")))
    }
}

impl Judge for RemoteJudge {
    async fn judge(
        &self,
        front: &str,
        expected: &str,
        answer: &str,
    ) -> Result<Judgment, JudgeError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .filter(|v| !v.trim().is_empty())
            .ok_or(JudgeError::NotConfigured("RETAIN_LLM_API_KEY"))?;

        let url = format!(
            "{}/chat/completions",
            self.config.api_endpoint.trim_end_matches('/')
        );
        let user = format!(
            "Prompt: {front}\nExpected answer: {expected}\nLearner's answer: {answer}"
        );
        let payload = serde_json::json!({
            "model": self.config.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": user },
            ],
            "stream": false,
        });

        let response = self.post_with_retry(&url, api_key, &payload).await?;
        let content = response
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .ok_or(JudgeError::EmptyResponse)?;

        parse_judgment(content)
    }
}

// ============================================================================
// SCRIPTED JUDGE
// ============================================================================

/// Deterministic judge for tests and offline use
#[derive(Debug, Clone)]
pub struct ScriptedJudge {
    judgment: Judgment,
}

impl ScriptedJudge {
    /// A judge that always returns the given judgment
    pub fn always(judgment: Judgment) -> Self {
        Self { judgment }
    }
}

impl Judge for ScriptedJudge {
    async fn judge(&self, _: &str, _: &str, _: &str) -> Result<Judgment, JudgeError> {
        Ok(self.judgment.clone())
    }
}

// ============================================================================
// PARSING
// ============================================================================

/// Read a judgment out of model output
///
/// Accepts a bare JSON object, a fenced block, or JSON embedded in prose;
/// out-of-range ratings are clamped to the 0-3 scale rather than rejected.
pub fn parse_judgment(text: &str) -> Result<Judgment, JudgeError> {
    let candidate = extract_json_object(text)
        .ok_or_else(|| JudgeError::Unparseable(truncate_for_error(text)))?;

    let raw: RawJudgment = serde_json::from_str(candidate)
        .map_err(|_| JudgeError::Unparseable(truncate_for_error(text)))?;

    let rating_value = match raw.rating {
        Some(value) => value.clamp(0, 3),
        // No rating from the model: map the verdict the conservative way
        None if raw.correct => Rating::Good.as_i64(),
        None => Rating::Again.as_i64(),
    };
    // Clamped into range, so this cannot fail
    let suggested_rating = Rating::try_from(rating_value).expect("clamped rating is valid");

    Ok(Judgment {
        correct: raw.correct,
        suggested_rating,
        explanation: raw.explanation.unwrap_or_default(),
    })
}

/// Locate the outermost JSON object in possibly-fenced, possibly-prosy text
fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn truncate_for_error(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= 120 {
        trimmed.to_string()
    } else {
        let cut: String = trimmed.chars().take(120).collect();
        format!("{cut}...")
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_u64(key: &str) -> Option<u64> {
    env_string(key)?.parse().ok()
}

fn normalize_endpoint(endpoint: String) -> String {
    let trimmed = endpoint.trim().trim_end_matches('/');
    if trimmed.ends_with("/v1") || trimmed.contains("/v1/") {
        trimmed.to_string()
    } else {
        format!("{trimmed}/v1")
    }
}

fn is_retryable(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::TOO_MANY_REQUESTS
        || status == reqwest::StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_strict_json() {
        let judgment =
            parse_judgment(r#"{"correct": true, "rating": 2, "explanation": "Close enough."}"#)
                .unwrap();
        assert!(judgment.correct);
        assert_eq!(judgment.suggested_rating, Rating::Good);
        assert_eq!(judgment.explanation, "Close enough.");
    }

    #[test]
    fn test_parse_fenced_json() {
        let text = "Here is my grading:\n```json\n{\"correct\": false, \"rating\": 0, \"explanation\": \"Wrong city.\"}\n```";
        let judgment = parse_judgment(text).unwrap();
        assert!(!judgment.correct);
        assert_eq!(judgment.suggested_rating, Rating::Again);
    }

    #[test]
    fn test_parse_clamps_out_of_range_rating() {
        let judgment = parse_judgment(r#"{"correct": true, "rating": 9}"#).unwrap();
        assert_eq!(judgment.suggested_rating, Rating::Easy);

        let judgment = parse_judgment(r#"{"correct": false, "rating": -4}"#).unwrap();
        assert_eq!(judgment.suggested_rating, Rating::Again);
    }

    #[test]
    fn test_parse_maps_missing_rating_from_verdict() {
        let judgment = parse_judgment(r#"{"correct": true}"#).unwrap();
        assert_eq!(judgment.suggested_rating, Rating::Good);

        let judgment = parse_judgment(r#"{"correct": false}"#).unwrap();
        assert_eq!(judgment.suggested_rating, Rating::Again);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            parse_judgment("I think that was pretty good!"),
            Err(JudgeError::Unparseable(_))
        ));
    }

    #[test]
    fn test_normalize_endpoint_appends_v1() {
        assert_eq!(
            normalize_endpoint("https://api.example.com".into()),
            "https://api.example.com/v1"
        );
        assert_eq!(
            normalize_endpoint("https://api.example.com/v1/".into()),
            "https://api.example.com/v1"
        );
    }

    #[test]
    fn test_remote_judge_without_key_is_unavailable() {
        let judge = RemoteJudge::new(JudgeConfig {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            api_endpoint: DEFAULT_API_ENDPOINT.to_string(),
            timeout: Duration::from_secs(5),
        });
        assert!(!judge.is_available());
    }

    #[tokio::test]
    async fn test_unconfigured_judge_fails_fast() {
        let judge = RemoteJudge::new(JudgeConfig {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            api_endpoint: DEFAULT_API_ENDPOINT.to_string(),
            timeout: Duration::from_secs(5),
        });
        let err = judge.judge("q", "a", "b").await.unwrap_err();
        assert!(matches!(err, JudgeError::NotConfigured(_)));
    }

    #[tokio::test]
    async fn test_scripted_judge_returns_script() {
        let judge = ScriptedJudge::always(Judgment {
            correct: true,
            suggested_rating: Rating::Easy,
            explanation: "Exact match.".to_string(),
        });
        let judgment = judge.judge("q", "a", "a").await.unwrap();
        assert_eq!(judgment.suggested_rating, Rating::Easy);
    }
}
