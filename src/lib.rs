pub mod core;
pub mod services;

pub use crate::core::config::Config;
pub use crate::core::state::{ChapterRecord, DocumentMeta, GenerationState, Phase};
pub use crate::services::driver::NovelDriver;
pub use crate::services::generator::{GenerationSettings, ProgressEvent, ProgressUpdate};
pub use crate::services::llm::{create_client, GenerationClient};
