use std::pin::Pin;

use bytes::Bytes;
use nonempty::NonEmpty;
use reqwest::Client;
use strum::{Display, EnumIter};

use crate::{
    config::{ApiKey, DASHSCOPE_KEY_VAR, MINIMAX_KEY_VAR, PollSettings},
    error::Result,
    prompt::ImagePrompt,
};

pub mod minimax;
pub use minimax::Minimax;

pub mod wanx;
pub use wanx::Wanx;

pub type ImgModBox = Box<dyn ImageModel + Send + Sync>;

#[derive(Debug, Clone, Copy, Display, clap::ValueEnum, Hash, PartialEq, Eq, EnumIter, Default)]
pub enum ImageProvider {
    /// Aliyun DashScope wanx-v1, submitted as an async task
    #[strum(to_string = "Aliyun WanX")]
    Wanx,
    /// MiniMax image-01, answered in a single response
    #[default]
    #[strum(to_string = "MiniMax")]
    Minimax,
}

impl ImageProvider {
    pub fn make(&self, key: ApiKey, poll: PollSettings) -> ImgModBox {
        match self {
            ImageProvider::Wanx => Box::new(Wanx::new(key, poll)),
            ImageProvider::Minimax => Box::new(Minimax::new(key)),
        }
    }

    pub fn key_var(&self) -> &'static str {
        match self {
            ImageProvider::Wanx => DASHSCOPE_KEY_VAR,
            ImageProvider::Minimax => MINIMAX_KEY_VAR,
        }
    }
}

pub trait ImageModel {
    /// Generates images for `prompt` and returns their URLs in vendor order
    fn generate<'a>(
        &'a self,
        prompt: &'a ImagePrompt,
    ) -> Pin<Box<dyn Future<Output = Result<NonEmpty<String>>> + Send + 'a>>;

    fn provider(&self) -> ImageProvider;
}

/// Fetches a generated artifact
pub async fn download(client: &Client, url: &str) -> Result<Bytes> {
    Ok(client.get(url).send().await?.error_for_status()?.bytes().await?)
}

#[cfg(test)]
mod tests {
    use httpmock::prelude::*;
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn every_provider_names_its_key() {
        let vars: Vec<_> = ImageProvider::iter().map(|p| p.key_var()).collect();
        assert_eq!(vars, [DASHSCOPE_KEY_VAR, MINIMAX_KEY_VAR]);
    }

    #[test]
    fn made_models_report_their_provider() {
        for provider in ImageProvider::iter() {
            let model = provider.make(ApiKey::new("sk-test"), PollSettings::default());
            assert_eq!(model.provider(), provider);
        }
    }

    #[tokio::test]
    async fn download_returns_body_bytes() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/img/1.png");
                then.status(200).body([0x89, b'P', b'N', b'G']);
            })
            .await;

        let bytes = download(&Client::new(), &server.url("/img/1.png"))
            .await
            .unwrap();
        assert_eq!(&bytes[..], &[0x89, b'P', b'N', b'G']);
    }

    #[tokio::test]
    async fn download_rejects_error_status() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/img/gone.png");
                then.status(404);
            })
            .await;

        let err = download(&Client::new(), &server.url("/img/gone.png"))
            .await
            .unwrap_err();
        assert!(matches!(err, crate::error::ApiError::Transport(_)));
    }
}
