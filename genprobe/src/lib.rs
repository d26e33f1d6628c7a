pub mod config;
pub mod error;
pub mod image_model;
pub mod llm;
pub mod prompt;
pub mod task;

pub use error::{ApiError, Result};
pub use image_model::{ImageModel, ImageProvider, ImgModBox};
pub use llm::{ChatModel, ChatModelBox, ChatProvider};
pub use task::{AsyncTaskClient, GenerationRequest, TaskHandle, TaskResult, TaskStatus};
