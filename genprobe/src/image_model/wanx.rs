use std::pin::Pin;

use nonempty::NonEmpty;

use crate::{
    config::{ApiKey, PollSettings},
    error::{ApiError, Result},
    image_model::{ImageModel, ImageProvider},
    prompt::ImagePrompt,
    task::{
        AsyncTaskClient, DashScope, GenerationRequest, TaskResult,
        dashscope::{WANX_ENDPOINT, WANX_MODEL},
    },
};

/// DashScope wanx-v1 behind the [`ImageModel`] interface. A failed task is
/// reported as [`ApiError::TaskFailed`].
pub struct Wanx {
    tasks: AsyncTaskClient<DashScope>,
    api_key: ApiKey,
    endpoint: String,
    poll: PollSettings,
}

impl Wanx {
    pub fn new(api_key: ApiKey, poll: PollSettings) -> Self {
        Self {
            tasks: AsyncTaskClient::new(DashScope::default()),
            api_key,
            endpoint: WANX_ENDPOINT.into(),
            poll,
        }
    }

    pub fn with_endpoint(self, endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..self
        }
    }

    pub fn request(&self, prompt: &ImagePrompt) -> GenerationRequest {
        let req = GenerationRequest::new(
            self.endpoint.clone(),
            self.api_key.clone(),
            WANX_MODEL,
            prompt.prompt.clone(),
        );
        match &prompt.negative {
            Some(negative) => req.negative_prompt(negative.clone()),
            None => req,
        }
    }

    async fn generate_urls(&self, prompt: &ImagePrompt) -> Result<NonEmpty<String>> {
        let request = self.request(prompt);
        let handle = self.tasks.submit(&request).await?;
        let result = self
            .tasks
            .poll(&request, &handle, self.poll.interval, self.poll.max_attempts)
            .await?;

        match result {
            TaskResult::Succeeded { urls } => Ok(urls),
            TaskResult::Failed { message } => Err(ApiError::TaskFailed {
                task_id: handle.to_string(),
                message,
            }),
        }
    }
}

impl ImageModel for Wanx {
    fn generate<'a>(
        &'a self,
        prompt: &'a ImagePrompt,
    ) -> Pin<Box<dyn Future<Output = Result<NonEmpty<String>>> + Send + 'a>> {
        Box::pin(self.generate_urls(prompt))
    }

    fn provider(&self) -> ImageProvider {
        ImageProvider::Wanx
    }
}
