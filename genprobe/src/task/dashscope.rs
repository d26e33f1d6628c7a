use log::debug;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;

use crate::{
    error::{ApiError, read_success_body},
    task::{GenerationRequest, StatusReport, TaskApi, TaskFuture, TaskHandle},
};

pub const WANX_ENDPOINT: &str =
    "https://dashscope.aliyuncs.com/api/v1/services/aigc/text2image/image-synthesis";
pub const WANX_MODEL: &str = "wanx-v1";

/// Aliyun DashScope asynchronous text-to-image API
#[derive(Debug, Clone, Default)]
pub struct DashScope {
    client: Client,
    task_base_url: Option<String>,
}

impl DashScope {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            task_base_url: None,
        }
    }

    /// Polls `{url}/{task_id}` instead of `{endpoint}/tasks/{task_id}`
    pub fn with_task_base_url(self, url: impl Into<String>) -> Self {
        Self {
            task_base_url: Some(url.into()),
            ..self
        }
    }

    pub fn task_url(&self, request: &GenerationRequest, handle: &TaskHandle) -> String {
        let base = match &self.task_base_url {
            Some(base) => base.trim_end_matches('/').to_string(),
            None => format!("{}/tasks", request.endpoint.trim_end_matches('/')),
        };
        format!("{base}/{handle}")
    }
}

#[derive(Debug, Serialize)]
struct SubmitBody<'a> {
    model: &'a str,
    input: Input<'a>,
    parameters: Parameters<'a>,
}

#[derive(Debug, Serialize)]
struct Input<'a> {
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    negative_prompt: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct Parameters<'a> {
    style: &'a str,
    size: &'a str,
    n: u32,
}

impl<'a> From<&'a GenerationRequest> for SubmitBody<'a> {
    fn from(req: &'a GenerationRequest) -> Self {
        Self {
            model: &req.model,
            input: Input {
                prompt: &req.prompt,
                negative_prompt: req.negative_prompt.as_deref(),
            },
            parameters: Parameters {
                style: &req.style,
                size: &req.size,
                n: req.count,
            },
        }
    }
}

impl TaskApi for DashScope {
    fn submit<'a>(&'a self, request: &'a GenerationRequest) -> TaskFuture<'a, TaskHandle> {
        Box::pin(async move {
            let resp = self
                .client
                .post(&request.endpoint)
                .bearer_auth(request.api_key.expose())
                .header("X-DashScope-Async", "enable")
                .json(&SubmitBody::from(request))
                .send()
                .await?;

            let body = read_success_body(resp).await?;
            let data = serde_json::from_str::<Value>(&body)?;
            debug!("Submit response:\n{data:#}");

            let task_id = data["output"]["task_id"]
                .as_str()
                .ok_or_else(|| ApiError::missing("output.task_id", &data))?;

            Ok(TaskHandle::new(task_id))
        })
    }

    fn check<'a>(
        &'a self,
        request: &'a GenerationRequest,
        handle: &'a TaskHandle,
    ) -> TaskFuture<'a, StatusReport> {
        Box::pin(async move {
            let text = self
                .client
                .get(self.task_url(request, handle))
                .bearer_auth(request.api_key.expose())
                .send()
                .await?
                .error_for_status()?
                .text()
                .await?;

            let data = serde_json::from_str::<Value>(&text)?;
            let output = &data["output"];

            let urls = output["results"]
                .as_array()
                .into_iter()
                .flatten()
                .filter_map(|r| r["url"].as_str().map(str::to_owned))
                .collect();

            Ok(StatusReport {
                status: output["task_status"].as_str().map(str::to_owned),
                urls,
                message: output["message"].as_str().map(str::to_owned),
                raw: data,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use expect_test::expect;
    use httpmock::prelude::*;
    use nonempty::nonempty;
    use serde_json::json;

    use super::*;
    use crate::{
        config::ApiKey,
        task::{AsyncTaskClient, TaskResult},
    };

    const SUBMIT_PATH: &str = "/api/v1/services/aigc/text2image/image-synthesis";

    fn request(server: &MockServer) -> GenerationRequest {
        GenerationRequest::new(
            server.url(SUBMIT_PATH),
            ApiKey::new("sk-test"),
            WANX_MODEL,
            "A beautiful sunset over a cyberpunk city",
        )
        .negative_prompt("low quality")
    }

    #[test]
    fn submit_body_shape() {
        let req = GenerationRequest::new(WANX_ENDPOINT, ApiKey::new("k"), WANX_MODEL, "a cat")
            .size("1024*1024")
            .count(2);

        let expect = expect![[
            r#"{"model":"wanx-v1","input":{"prompt":"a cat"},"parameters":{"style":"<auto>","size":"1024*1024","n":2}}"#
        ]];
        expect.assert_eq(&serde_json::to_string(&SubmitBody::from(&req)).unwrap());
    }

    #[test]
    fn task_url_defaults_to_endpoint_tasks() {
        let req = GenerationRequest::new(WANX_ENDPOINT, ApiKey::new("k"), WANX_MODEL, "a cat");
        let handle = TaskHandle::new("abc");

        assert_eq!(
            DashScope::default().task_url(&req, &handle),
            format!("{WANX_ENDPOINT}/tasks/abc")
        );
        assert_eq!(
            DashScope::default()
                .with_task_base_url("https://dashscope.aliyuncs.com/api/v1/tasks/")
                .task_url(&req, &handle),
            "https://dashscope.aliyuncs.com/api/v1/tasks/abc"
        );
    }

    #[tokio::test]
    async fn submit_sends_async_headers_and_reads_task_id() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path(SUBMIT_PATH)
                    .header("authorization", "Bearer sk-test")
                    .header("content-type", "application/json")
                    .header("x-dashscope-async", "enable")
                    .body_includes("\"negative_prompt\":\"low quality\"");
                then.status(200).json_body(json!({
                    "output": { "task_id": "task-123", "task_status": "PENDING" },
                    "request_id": "req-1"
                }));
            })
            .await;

        let handle = DashScope::default().submit(&request(&server)).await.unwrap();
        mock.assert_async().await;
        assert_eq!(handle.as_str(), "task-123");
    }

    #[tokio::test]
    async fn non_success_submission_keeps_status_and_body() {
        let server = MockServer::start_async().await;
        for (status, body) in [(400, "bad prompt"), (401, "invalid key"), (500, "boom")] {
            let mock = server
                .mock_async(|when, then| {
                    when.method(POST).path(SUBMIT_PATH);
                    then.status(status).body(body);
                })
                .await;

            let err = DashScope::default()
                .submit(&request(&server))
                .await
                .unwrap_err();
            match err {
                ApiError::Submission { status: got, body: got_body } => {
                    assert_eq!(got.as_u16(), status);
                    assert_eq!(got_body, body);
                }
                other => panic!("unexpected error: {other:?}"),
            }
            mock.delete_async().await;
        }
    }

    #[tokio::test]
    async fn submission_without_task_id_is_malformed() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path(SUBMIT_PATH);
                then.status(200)
                    .json_body(json!({ "output": {}, "request_id": "req-1" }));
            })
            .await;

        let err = DashScope::default()
            .submit(&request(&server))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ApiError::MalformedResponse {
                field: "output.task_id",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn failed_task_returns_after_one_get() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path(format!("{SUBMIT_PATH}/tasks/task-9"))
                    .header("authorization", "Bearer sk-test");
                then.status(200).json_body(json!({
                    "output": {
                        "task_id": "task-9",
                        "task_status": "FAILED",
                        "code": "DataInspectionFailed",
                        "message": "Input data may contain inappropriate content."
                    }
                }));
            })
            .await;

        let client = AsyncTaskClient::new(DashScope::default());
        let result = client
            .poll(
                &request(&server),
                &TaskHandle::new("task-9"),
                Duration::from_millis(10),
                10,
            )
            .await
            .unwrap();

        mock.assert_calls_async(1).await;
        assert_eq!(
            result,
            TaskResult::Failed {
                message: "Input data may contain inappropriate content.".into()
            }
        );
    }

    #[tokio::test]
    async fn submit_and_poll_to_success() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path(SUBMIT_PATH);
                then.status(200)
                    .json_body(json!({ "output": { "task_id": "task-1" } }));
            })
            .await;
        let poll = server
            .mock_async(|when, then| {
                when.method(GET).path(format!("{SUBMIT_PATH}/tasks/task-1"));
                then.status(200).json_body(json!({
                    "output": {
                        "task_status": "SUCCEEDED",
                        "results": [
                            { "url": "https://cdn.example/1.png" },
                            { "code": "Filtered" },
                            { "url": "https://cdn.example/2.png" }
                        ]
                    }
                }));
            })
            .await;

        let client = AsyncTaskClient::new(DashScope::default());
        let result = client
            .run(
                &request(&server),
                crate::config::PollSettings {
                    interval: Duration::from_millis(10),
                    max_attempts: 3,
                },
            )
            .await
            .unwrap();

        poll.assert_calls_async(1).await;
        assert_eq!(
            result,
            TaskResult::Succeeded {
                urls: nonempty![
                    "https://cdn.example/1.png".to_string(),
                    "https://cdn.example/2.png".to_string()
                ]
            }
        );
    }

    #[tokio::test]
    async fn garbage_poll_body_is_a_transport_error() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path(format!("{SUBMIT_PATH}/tasks/task-2"));
                then.status(200).body("<html>gateway timeout</html>");
            })
            .await;

        let client = AsyncTaskClient::new(DashScope::default());
        let err = client
            .poll(
                &request(&server),
                &TaskHandle::new("task-2"),
                Duration::from_millis(10),
                5,
            )
            .await
            .unwrap_err();

        mock.assert_calls_async(1).await;
        assert!(matches!(err, ApiError::Transport(_)));
    }

    async fn poll_once(body: serde_json::Value) -> ApiError {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path(format!("{SUBMIT_PATH}/tasks/task-4"));
                then.status(200).json_body(body);
            })
            .await;

        let err = AsyncTaskClient::new(DashScope::default())
            .poll(
                &request(&server),
                &TaskHandle::new("task-4"),
                Duration::from_millis(10),
                5,
            )
            .await
            .unwrap_err();
        mock.assert_calls_async(1).await;
        err
    }

    #[tokio::test]
    async fn missing_status_is_malformed() {
        let err = poll_once(json!({ "output": {} })).await;
        assert!(matches!(
            err,
            ApiError::MalformedResponse {
                field: "task_status",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn success_without_results_is_malformed() {
        let err = poll_once(json!({
            "output": { "task_status": "SUCCEEDED", "results": [] }
        }))
        .await;
        assert!(matches!(
            err,
            ApiError::MalformedResponse {
                field: "results",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn failure_without_message_is_malformed() {
        let err = poll_once(json!({ "output": { "task_status": "FAILED" } })).await;
        assert!(matches!(
            err,
            ApiError::MalformedResponse {
                field: "message",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn poll_http_error_aborts_without_retry() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path(format!("{SUBMIT_PATH}/tasks/task-3"));
                then.status(503);
            })
            .await;

        let client = AsyncTaskClient::new(DashScope::default());
        let err = client
            .poll(
                &request(&server),
                &TaskHandle::new("task-3"),
                Duration::from_millis(10),
                5,
            )
            .await
            .unwrap_err();

        mock.assert_calls_async(1).await;
        assert!(matches!(err, ApiError::Transport(_)));
    }
}
