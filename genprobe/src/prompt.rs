use serde_json::Value;

const PROMPT_FIELDS: [&str; 9] = [
    "style", "scene", "shot", "lighting", "mood", "colors", "textures", "props", "effects",
];

/// An image prompt, possibly flattened from a structured JSON description
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePrompt {
    pub prompt: String,
    pub negative: Option<String>,
}

impl ImagePrompt {
    /// Accepts either plain text or a JSON object such as
    /// `{"style": "anime", "mood": ["calm", "warm"], "negative": "blur"}`
    pub fn parse(text: &str) -> Self {
        let literal = || Self {
            prompt: text.to_string(),
            negative: None,
        };

        if !text.trim_start().starts_with('{') {
            return literal();
        }
        let Ok(Value::Object(fields)) = serde_json::from_str::<Value>(text) else {
            return literal();
        };

        let prompt = PROMPT_FIELDS
            .iter()
            .filter_map(|f| fields.get(*f).and_then(join_value))
            .collect::<Vec<_>>()
            .join(", ");

        if prompt.is_empty() {
            return literal();
        }

        Self {
            prompt,
            negative: fields.get("negative").and_then(join_value),
        }
    }
}

fn join_value(value: &Value) -> Option<String> {
    let joined = match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(", "),
        _ => return None,
    };
    (!joined.is_empty()).then_some(joined)
}
