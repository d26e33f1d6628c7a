use std::pin::Pin;

use log::debug;
use nonempty::NonEmpty;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::{
    config::ApiKey,
    error::{ApiError, Result, read_success_body},
    image_model::{ImageModel, ImageProvider},
    prompt::ImagePrompt,
};

pub const MINIMAX_ENDPOINT: &str = "https://api.minimaxi.com/v1/image_generation";
pub const MINIMAX_MODEL: &str = "image-01";

/// MiniMax synchronous image generation: one POST, one answer
#[derive(Debug, Clone)]
pub struct Minimax {
    client: Client,
    api_key: ApiKey,
    endpoint: String,
    count: u32,
}

impl Minimax {
    pub fn new(api_key: ApiKey) -> Self {
        Self {
            client: Client::new(),
            api_key,
            endpoint: MINIMAX_ENDPOINT.into(),
            count: 1,
        }
    }

    pub fn with_endpoint(self, endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..self
        }
    }

    pub fn with_count(self, count: u32) -> Self {
        Self { count, ..self }
    }

    /// Sends the request and reads the body once. No polling, no retry.
    pub async fn generate_urls(&self, prompt: &str) -> Result<NonEmpty<String>> {
        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.api_key.expose())
            .json(&GenerateBody {
                prompt,
                model: MINIMAX_MODEL,
                n: self.count,
            })
            .send()
            .await?;

        let body = read_success_body(resp).await?;
        debug!("Minimax response: {}", body.chars().take(200).collect::<String>());
        let parsed: GenerateResponse = serde_json::from_str(&body)?;
        parsed.into_urls(body)
    }
}

#[derive(Debug, Serialize)]
struct GenerateBody<'a> {
    prompt: &'a str,
    model: &'a str,
    n: u32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GenerateResponse {
    data: Option<ImageData>,
    files: Vec<FileEntry>,
    base_resp: Option<BaseResp>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ImageData {
    image_urls: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct FileEntry {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BaseResp {
    status_code: i64,
    #[serde(default)]
    status_msg: String,
}

impl GenerateResponse {
    fn into_urls(self, body: String) -> Result<NonEmpty<String>> {
        let urls = self.data.map(|d| d.image_urls).unwrap_or_default();
        if let Some(urls) = NonEmpty::from_vec(urls) {
            return Ok(urls);
        }

        let legacy = self.files.into_iter().filter_map(|f| f.url).collect();
        if let Some(urls) = NonEmpty::from_vec(legacy) {
            return Ok(urls);
        }

        match self.base_resp {
            Some(BaseResp {
                status_code,
                status_msg,
            }) if status_code != 0 => Err(ApiError::VendorRejected {
                code: status_code,
                message: status_msg,
            }),
            _ => Err(ApiError::missing("data.image_urls", body)),
        }
    }
}

impl ImageModel for Minimax {
    fn generate<'a>(
        &'a self,
        prompt: &'a ImagePrompt,
    ) -> Pin<Box<dyn Future<Output = Result<NonEmpty<String>>> + Send + 'a>> {
        // negative prompts have no field in this API
        Box::pin(self.generate_urls(&prompt.prompt))
    }

    fn provider(&self) -> ImageProvider {
        ImageProvider::Minimax
    }
}
