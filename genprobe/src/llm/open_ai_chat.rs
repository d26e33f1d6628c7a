use async_stream::try_stream;
use log::debug;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio_stream::StreamExt;

use super::{
    ChatFuture, ChatModel, ChatStream, OutputMessage, Request, ResponseFragment, Role,
    sse_lines::{LineBuffer, data_payload},
};
use crate::{
    config::ApiKey,
    error::{ApiError, read_success_body},
};

/// Client for any OpenAI-compatible `/chat/completions` endpoint
#[derive(Debug, Clone)]
pub struct OpenAIChat {
    client: Client,
    api_key: ApiKey,
    base_url: String,
    model: String,
}

impl OpenAIChat {
    pub fn new(api_key: ApiKey, base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: base_url.into(),
            model: model.into(),
        }
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    fn body(&self, req: Request, stream: bool) -> OpenAIChatRequest {
        let mut messages = Vec::with_capacity(req.messages.len() + 1);

        if let Some(system) = req.system {
            messages.push(OpenAIMessage {
                role: "system",
                content: system,
            });
        }

        for msg in req.messages {
            messages.push(OpenAIMessage {
                role: match msg.role {
                    Role::User => "user",
                    Role::Assistant => "assistant",
                },
                content: msg.content,
            });
        }

        OpenAIChatRequest {
            model: self.model.clone(),
            messages,
            temperature: req.temperature,
            max_tokens: req.max_tokens,
            stream,
        }
    }
}

impl ChatModel for OpenAIChat {
    fn send_request_stream(&self, req: Request) -> ChatStream<'_> {
        let body = self.body(req, true);

        Box::pin(try_stream! {
            let res = self
                .client
                .post(self.completions_url())
                .bearer_auth(self.api_key.expose())
                .json(&body)
                .send()
                .await?;

            let status = res.status();
            if !status.is_success() {
                let body = res.text().await.unwrap_or_default();
                Err(ApiError::Submission { status, body })?;
                return;
            }

            let mut stream = res.bytes_stream();
            let mut lines = LineBuffer::default();
            let mut full_text = String::new();
            let mut input_tokens = 0usize;
            let mut output_tokens = 0usize;
            let mut done = false;

            while !done {
                let complete = match stream.next().await {
                    Some(chunk) => lines.process(chunk?)?,
                    None => {
                        done = true;
                        lines.parse_remaining().into_iter().collect()
                    }
                };

                for line in complete {
                    let Some(data) = data_payload(&line) else {
                        continue;
                    };

                    if data == "[DONE]" {
                        done = true;
                        break;
                    }

                    let event: OpenAIStreamChunk = serde_json::from_str(data)?;

                    if let Some(content) = event
                        .choices
                        .first()
                        .and_then(|c| c.delta.content.as_ref())
                        .filter(|c| !c.is_empty())
                    {
                        output_tokens += 1; // estimate until usage arrives
                        full_text.push_str(content);
                        yield ResponseFragment::TextDelta(content.clone());
                    }

                    if let Some(usage) = event.usage {
                        input_tokens = usage.prompt_tokens;
                        output_tokens = usage.completion_tokens;
                    }
                }
            }

            debug!("Chat stream finished after {output_tokens} output tokens");
            yield ResponseFragment::MessageComplete(OutputMessage {
                input_tokens,
                output_tokens,
                text: full_text,
            });
        })
    }

    fn complete(&self, req: Request) -> ChatFuture<'_> {
        let body = self.body(req, false);

        Box::pin(async move {
            let res = self
                .client
                .post(self.completions_url())
                .bearer_auth(self.api_key.expose())
                .json(&body)
                .send()
                .await?;

            let text = read_success_body(res).await?;
            let parsed: OpenAIChatResponse = serde_json::from_str(&text)?;
            debug!("Chat response: {parsed:#?}");

            let content = parsed
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.message.content)
                .filter(|c| !c.is_empty())
                .ok_or_else(|| ApiError::missing("choices[0].message.content", &text))?;

            let usage = parsed.usage.unwrap_or_default();
            Ok(OutputMessage {
                input_tokens: usage.prompt_tokens,
                output_tokens: usage.completion_tokens,
                text: content,
            })
        })
    }
}

//
// ===== OpenAI wire types =====
//

#[derive(Serialize)]
struct OpenAIChatRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    temperature: f32,
    max_tokens: usize,
    stream: bool,
}

#[derive(Serialize)]
struct OpenAIMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct OpenAIStreamChunk {
    #[serde(default)]
    choices: Vec<OpenAIStreamChoice>,
    #[serde(default)]
    usage: Option<OpenAIUsage>,
}

#[derive(Deserialize, Debug)]
struct OpenAIStreamChoice {
    delta: OpenAIDelta,
}

#[derive(Deserialize, Debug)]
struct OpenAIDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize, Debug)]
struct OpenAIChatResponse {
    #[serde(default)]
    choices: Vec<OpenAIChoice>,
    #[serde(default)]
    usage: Option<OpenAIUsage>,
}

#[derive(Deserialize, Debug)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
}

#[derive(Deserialize, Debug)]
struct OpenAIResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
struct OpenAIUsage {
    prompt_tokens: usize,
    completion_tokens: usize,
}
