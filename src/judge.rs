//! Client for the code-execution service.
//!
//! Candidates run their solution against a Judge0-compatible service. Two
//! flows are supported: a synchronous `POST /submit` proxy, and the native
//! submit-then-poll flow on `/submissions`.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Statuses that mean the submission has not finished yet.
const PENDING_STATUSES: [&str; 2] = ["In Queue", "Processing"];

/// Code-execution service configuration.
#[derive(Debug, Clone)]
pub struct JudgeConfig {
    /// Base URL, e.g. `http://127.0.0.1:2358`
    pub base_url: String,
    /// Delay between result polls
    pub poll_interval: Duration,
    /// Give up polling after this many attempts
    pub max_polls: u32,
    /// Per-request timeout
    pub timeout: Duration,
}

impl JudgeConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            poll_interval: Duration::from_secs(1),
            max_polls: 30,
            timeout: Duration::from_secs(10),
        }
    }

    pub fn submit_url(&self) -> String {
        format!("{}/submit", self.base_url)
    }

    pub fn submissions_url(&self) -> String {
        format!("{}/submissions?base64_encoded=false", self.base_url)
    }

    pub fn submission_url(&self, token: &str) -> String {
        format!("{}/submissions/{token}?base64_encoded=false", self.base_url)
    }
}

/// Code-execution client errors.
#[derive(Debug)]
pub enum JudgeError {
    /// Client or runtime setup failed
    Config(String),
    /// Network/HTTP error
    Network(String),
    /// Service returned an error response
    Server { status: u16, message: String },
    /// Response body did not parse
    Serialization(String),
    /// Submission was accepted without a token
    MissingToken,
    /// Result still pending after the poll budget
    Timeout { token: String },
}

impl std::fmt::Display for JudgeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JudgeError::Config(msg) => write!(f, "Judge config error: {msg}"),
            JudgeError::Network(msg) => write!(f, "Judge network error: {msg}"),
            JudgeError::Server { status, message } => {
                write!(f, "Judge server error ({status}): {message}")
            }
            JudgeError::Serialization(msg) => write!(f, "Judge response error: {msg}"),
            JudgeError::MissingToken => write!(f, "Failed to submit code: No token received."),
            JudgeError::Timeout { token } => {
                write!(f, "Submission {token} did not finish in time")
            }
        }
    }
}

impl std::error::Error for JudgeError {}

/// Source code to run.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionRequest {
    pub source_code: String,
    pub language_id: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_line_arguments: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stdin: Option<String>,
}

impl ExecutionRequest {
    pub fn new(source_code: impl Into<String>, language_id: u32) -> Self {
        Self {
            source_code: source_code.into(),
            language_id,
            command_line_arguments: None,
            stdin: None,
        }
    }

    pub fn with_arguments(mut self, arguments: impl Into<String>) -> Self {
        self.command_line_arguments = Some(arguments.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionStatus {
    #[serde(default)]
    pub id: Option<u32>,
    #[serde(default)]
    pub description: String,
}

/// Result of one execution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    #[serde(default)]
    pub stdout: Option<String>,
    #[serde(default)]
    pub stderr: Option<String>,
    #[serde(default)]
    pub compile_output: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub status: Option<ExecutionStatus>,
}

fn present(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|s| !s.is_empty())
}

impl ExecutionResult {
    pub fn status_description(&self) -> &str {
        self.status
            .as_ref()
            .map(|s| s.description.as_str())
            .unwrap_or("")
    }

    pub fn is_pending(&self) -> bool {
        PENDING_STATUSES.contains(&self.status_description())
    }

    /// What the candidate sees: stdout, else the first error channel.
    pub fn display_output(&self) -> String {
        if let Some(stdout) = present(&self.stdout) {
            return stdout.trim().to_string();
        }
        if let Some(stderr) = present(&self.stderr) {
            return format!("Error: {stderr}");
        }
        if let Some(compile) = present(&self.compile_output) {
            return format!("Compilation Error: {compile}");
        }
        let status = match self.status_description() {
            "" => "Unknown error",
            s => s,
        };
        format!("Execution Error: {status}")
    }
}

/// A problem test case run through command-line arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    pub arguments: String,
    pub expected_output: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestOutcome {
    pub passed: bool,
    pub output: String,
}

impl TestCase {
    /// Compare a result's displayed output against the expected output.
    pub fn check(&self, result: &ExecutionResult) -> TestOutcome {
        let output = result.display_output();
        TestOutcome {
            passed: output == self.expected_output.trim(),
            output,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
}

/// Async client for the code-execution service.
pub struct JudgeClient {
    config: JudgeConfig,
    client: reqwest::Client,
}

impl JudgeClient {
    pub fn new(config: JudgeConfig) -> Result<Self, JudgeError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| JudgeError::Config(e.to_string()))?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &JudgeConfig {
        &self.config
    }

    async fn read_json<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, JudgeError> {
        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(JudgeError::Server {
                status: status.as_u16(),
                message,
            });
        }
        response
            .json()
            .await
            .map_err(|e| JudgeError::Serialization(e.to_string()))
    }

    /// Run code through the synchronous `/submit` proxy.
    pub async fn submit(&self, request: &ExecutionRequest) -> Result<ExecutionResult, JudgeError> {
        let response = self
            .client
            .post(self.config.submit_url())
            .json(request)
            .send()
            .await
            .map_err(|e| JudgeError::Network(e.to_string()))?;
        Self::read_json(response).await
    }

    /// Create a submission and return its token.
    pub async fn create_submission(&self, request: &ExecutionRequest) -> Result<String, JudgeError> {
        let response = self
            .client
            .post(self.config.submissions_url())
            .json(request)
            .send()
            .await
            .map_err(|e| JudgeError::Network(e.to_string()))?;
        let body: TokenResponse = Self::read_json(response).await?;
        body.token
            .filter(|t| !t.is_empty())
            .ok_or(JudgeError::MissingToken)
    }

    /// Fetch a submission until it leaves the queue.
    pub async fn poll_submission(&self, token: &str) -> Result<ExecutionResult, JudgeError> {
        for attempt in 1..=self.config.max_polls {
            let response = self
                .client
                .get(self.config.submission_url(token))
                .send()
                .await
                .map_err(|e| JudgeError::Network(e.to_string()))?;
            let result: ExecutionResult = Self::read_json(response).await?;
            if !result.is_pending() {
                return Ok(result);
            }
            debug!(token, attempt, status = result.status_description(), "submission pending");
            tokio::time::sleep(self.config.poll_interval).await;
        }
        Err(JudgeError::Timeout {
            token: token.to_string(),
        })
    }

    /// Create a submission and wait for its result.
    pub async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionResult, JudgeError> {
        let token = self.create_submission(request).await?;
        self.poll_submission(&token).await
    }

    /// Run one test case through `/submit`.
    pub async fn run_test_case(
        &self,
        source_code: &str,
        language_id: u32,
        case: &TestCase,
    ) -> Result<TestOutcome, JudgeError> {
        let request =
            ExecutionRequest::new(source_code, language_id).with_arguments(case.arguments.clone());
        let result = self.submit(&request).await?;
        Ok(case.check(&result))
    }
}

/// Blocking client for use in synchronous contexts.
pub struct BlockingJudgeClient {
    inner: JudgeClient,
    runtime: tokio::runtime::Runtime,
}

impl BlockingJudgeClient {
    pub fn new(config: JudgeConfig) -> Result<Self, JudgeError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| JudgeError::Config(format!("Failed to create runtime: {e}")))?;

        Ok(Self {
            inner: JudgeClient::new(config)?,
            runtime,
        })
    }

    pub fn submit(&self, request: &ExecutionRequest) -> Result<ExecutionResult, JudgeError> {
        self.runtime.block_on(self.inner.submit(request))
    }

    pub fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionResult, JudgeError> {
        self.runtime.block_on(self.inner.execute(request))
    }

    pub fn run_test_case(
        &self,
        source_code: &str,
        language_id: u32,
        case: &TestCase,
    ) -> Result<TestOutcome, JudgeError> {
        self.runtime
            .block_on(self.inner.run_test_case(source_code, language_id, case))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(description: &str) -> Option<ExecutionStatus> {
        Some(ExecutionStatus {
            id: None,
            description: description.to_string(),
        })
    }

    #[test]
    fn test_urls() {
        let config = JudgeConfig::new("http://127.0.0.1:2358/");
        assert_eq!(config.submit_url(), "http://127.0.0.1:2358/submit");
        assert_eq!(
            config.submissions_url(),
            "http://127.0.0.1:2358/submissions?base64_encoded=false"
        );
        assert_eq!(
            config.submission_url("abc"),
            "http://127.0.0.1:2358/submissions/abc?base64_encoded=false"
        );
    }

    #[test]
    fn test_display_output_precedence() {
        let result = ExecutionResult {
            stdout: Some("[0, 1]\n".into()),
            stderr: Some("warning".into()),
            ..Default::default()
        };
        assert_eq!(result.display_output(), "[0, 1]");

        let result = ExecutionResult {
            stdout: Some(String::new()),
            compile_output: Some("main.c:1: error".into()),
            ..Default::default()
        };
        assert_eq!(result.display_output(), "Compilation Error: main.c:1: error");

        let result = ExecutionResult {
            status: status("Time Limit Exceeded"),
            ..Default::default()
        };
        assert_eq!(result.display_output(), "Execution Error: Time Limit Exceeded");
        assert_eq!(
            ExecutionResult::default().display_output(),
            "Execution Error: Unknown error"
        );
    }

    #[test]
    fn test_pending_statuses() {
        let mut result = ExecutionResult {
            status: status("In Queue"),
            ..Default::default()
        };
        assert!(result.is_pending());
        result.status = status("Accepted");
        assert!(!result.is_pending());
    }

    #[test]
    fn test_case_comparison_trims() {
        let case = TestCase {
            arguments: "2 7 11 15 9".into(),
            expected_output: "[0, 1]\n".into(),
        };
        let result = ExecutionResult {
            stdout: Some("[0, 1]".into()),
            ..Default::default()
        };
        assert!(case.check(&result).passed);
    }

    #[test]
    fn test_request_omits_absent_fields() {
        let json = serde_json::to_value(ExecutionRequest::new("print(1)", 71)).unwrap();
        assert_eq!(json["language_id"], 71);
        assert!(json.get("stdin").is_none());
        assert!(json.get("command_line_arguments").is_none());
    }
}
