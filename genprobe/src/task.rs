//! Submit-then-poll generation jobs.
//!
//! A vendor implements [`TaskApi`]; [`AsyncTaskClient`] drives the polling
//! loop on top of it and maps every way the loop can end to either a
//! [`TaskResult`] or a distinct [`ApiError`].

use std::{fmt, pin::Pin, time::Duration};

use log::{debug, info};
use nonempty::NonEmpty;
use serde_json::Value;
use strum::{Display, EnumString};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::{
    config::{ApiKey, PollSettings},
    error::{ApiError, Result},
};

pub mod dashscope;
pub use dashscope::DashScope;

pub type TaskFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// One generation job, as submitted
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub endpoint: String,
    pub api_key: ApiKey,
    pub model: String,
    pub prompt: String,
    pub negative_prompt: Option<String>,
    pub size: String,
    pub style: String,
    pub count: u32,
}

impl GenerationRequest {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: ApiKey,
        model: impl Into<String>,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key,
            model: model.into(),
            prompt: prompt.into(),
            negative_prompt: None,
            size: "1280*720".into(),
            style: "<auto>".into(),
            count: 1,
        }
    }

    pub fn negative_prompt(self, negative_prompt: impl Into<String>) -> Self {
        Self {
            negative_prompt: Some(negative_prompt.into()),
            ..self
        }
    }

    pub fn size(self, size: impl Into<String>) -> Self {
        Self {
            size: size.into(),
            ..self
        }
    }

    pub fn style(self, style: impl Into<String>) -> Self {
        Self {
            style: style.into(),
            ..self
        }
    }

    pub fn count(self, count: u32) -> Self {
        Self { count, ..self }
    }
}

/// Vendor-side id of a submitted job
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskHandle(String);

impl TaskHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskResult {
    Succeeded { urls: NonEmpty<String> },
    Failed { message: String },
}

/// What a single status check saw, before any interpretation
#[derive(Debug, Clone, Default)]
pub struct StatusReport {
    pub status: Option<String>,
    pub urls: Vec<String>,
    pub message: Option<String>,
    pub raw: Value,
}

pub trait TaskApi {
    /// Sends the job once. Never retried.
    fn submit<'a>(&'a self, request: &'a GenerationRequest) -> TaskFuture<'a, TaskHandle>;

    /// Issues exactly one status request for `handle`, authorized the same
    /// way `request` was submitted
    fn check<'a>(
        &'a self,
        request: &'a GenerationRequest,
        handle: &'a TaskHandle,
    ) -> TaskFuture<'a, StatusReport>;
}

pub struct AsyncTaskClient<A> {
    api: A,
}

impl<A: TaskApi + Sync> AsyncTaskClient<A> {
    pub fn new(api: A) -> Self {
        Self { api }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub async fn submit(&self, request: &GenerationRequest) -> Result<TaskHandle> {
        let handle = self.api.submit(request).await?;
        info!("Submitted task {handle}");
        Ok(handle)
    }

    pub async fn poll(
        &self,
        request: &GenerationRequest,
        handle: &TaskHandle,
        interval: Duration,
        max_attempts: u32,
    ) -> Result<TaskResult> {
        self.poll_until_cancelled(
            request,
            handle,
            interval,
            max_attempts,
            &CancellationToken::new(),
            |_, _| {},
        )
        .await
    }

    /// Like [`Self::poll`], but gives up with [`ApiError::Cancelled`] as
    /// soon as `cancel` fires. `on_check` sees every report, numbered from 1,
    /// before it is interpreted.
    pub async fn poll_until_cancelled(
        &self,
        request: &GenerationRequest,
        handle: &TaskHandle,
        interval: Duration,
        max_attempts: u32,
        cancel: &CancellationToken,
        mut on_check: impl FnMut(u32, &StatusReport),
    ) -> Result<TaskResult> {
        for attempt in 0..max_attempts {
            let cancelled = tokio::select! {
                biased;
                _ = cancel.cancelled() => true,
                _ = sleep(interval) => false,
            };
            if cancelled {
                return Err(ApiError::Cancelled {
                    task_id: handle.to_string(),
                    attempts: attempt,
                });
            }

            let report = self.api.check(request, handle).await?;
            debug!(
                "Task {handle} attempt {}/{max_attempts}: {}",
                attempt + 1,
                report.status.as_deref().unwrap_or("<missing>")
            );
            on_check(attempt + 1, &report);

            if let Some(result) = interpret(handle, report)? {
                info!("Task {handle} finished after {} attempts", attempt + 1);
                return Ok(result);
            }
        }

        Err(ApiError::Timeout {
            task_id: handle.to_string(),
            attempts: max_attempts,
        })
    }

    /// Submits `request` and polls it to a terminal state
    pub async fn run(
        &self,
        request: &GenerationRequest,
        settings: PollSettings,
    ) -> Result<TaskResult> {
        let handle = self.submit(request).await?;
        self.poll(request, &handle, settings.interval, settings.max_attempts)
            .await
    }
}

/// `Ok(None)` means keep polling
fn interpret(handle: &TaskHandle, report: StatusReport) -> Result<Option<TaskResult>> {
    let Some(raw_status) = report.status else {
        return Err(ApiError::missing("task_status", report.raw));
    };

    let status = raw_status
        .parse::<TaskStatus>()
        .map_err(|_| ApiError::UnknownStatus {
            task_id: handle.to_string(),
            status: raw_status.clone(),
        })?;

    match status {
        TaskStatus::Pending | TaskStatus::Running => Ok(None),
        TaskStatus::Succeeded => {
            let urls = NonEmpty::from_vec(report.urls)
                .ok_or_else(|| ApiError::missing("results", &report.raw))?;
            Ok(Some(TaskResult::Succeeded { urls }))
        }
        TaskStatus::Failed => {
            let message = report
                .message
                .ok_or_else(|| ApiError::missing("message", &report.raw))?;
            Ok(Some(TaskResult::Failed { message }))
        }
    }
}
