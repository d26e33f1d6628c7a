use std::pin::Pin;

use serde::{Deserialize, Serialize};
use strum::Display;
use tokio_stream::Stream;

use crate::{
    config::{ApiKey, DASHSCOPE_KEY_VAR, MODELSCOPE_KEY_VAR},
    error::Result,
};

pub mod open_ai_chat;
pub use open_ai_chat::OpenAIChat;

mod sse_lines;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";

pub type ChatModelBox = Box<dyn ChatModel + Send + Sync>;

pub trait ChatModel {
    /// Yields text deltas as they arrive, then exactly one
    /// [`ResponseFragment::MessageComplete`]
    fn send_request_stream(&self, req: Request) -> ChatStream<'_>;

    /// Asks for the whole answer in one response
    fn complete(&self, req: Request) -> ChatFuture<'_>;
}

pub type ChatStream<'a> = Pin<Box<dyn Stream<Item = Result<ResponseFragment>> + Send + 'a>>;
pub type ChatFuture<'a> = Pin<Box<dyn Future<Output = Result<OutputMessage>> + Send + 'a>>;

#[derive(Debug)]
pub enum ResponseFragment {
    TextDelta(String),
    MessageComplete(OutputMessage),
}

#[derive(Debug, Clone)]
pub struct Request {
    pub system: Option<String>,
    pub messages: Vec<InputMessage>,
    pub temperature: f32,
    pub max_tokens: usize,
}

impl Request {
    pub fn ask(user_message: impl Into<String>) -> Self {
        Self {
            system: Some(DEFAULT_SYSTEM_PROMPT.into()),
            messages: vec![InputMessage::user(user_message)],
            temperature: 0.7,
            max_tokens: 2048,
        }
    }

    pub fn with_system(self, system: impl Into<String>) -> Self {
        Self {
            system: Some(system.into()),
            ..self
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InputMessage {
    pub role: Role,
    pub content: String,
}

impl InputMessage {
    pub fn user(content: impl Into<String>) -> InputMessage {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> InputMessage {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputMessage {
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub text: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Copy, Display, clap::ValueEnum, PartialEq, Eq)]
pub enum ChatProvider {
    /// GLM-4.7 on ModelScope inference
    #[strum(to_string = "ModelScope")]
    ModelScope,
    /// qwen-plus on DashScope compatible mode
    #[strum(to_string = "Aliyun DashScope")]
    DashScope,
}

impl ChatProvider {
    pub fn base_url(&self) -> &'static str {
        match self {
            ChatProvider::ModelScope => "https://api-inference.modelscope.cn/v1",
            ChatProvider::DashScope => "https://dashscope.aliyuncs.com/compatible-mode/v1",
        }
    }

    pub fn model(&self) -> &'static str {
        match self {
            ChatProvider::ModelScope => "ZhipuAI/GLM-4.7",
            ChatProvider::DashScope => "qwen-plus",
        }
    }

    pub fn key_var(&self) -> &'static str {
        match self {
            ChatProvider::ModelScope => MODELSCOPE_KEY_VAR,
            ChatProvider::DashScope => DASHSCOPE_KEY_VAR,
        }
    }

    pub fn make(&self, key: ApiKey) -> ChatModelBox {
        Box::new(OpenAIChat::new(key, self.base_url(), self.model()))
    }
}
