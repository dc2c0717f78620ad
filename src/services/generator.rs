use crate::core::config::TokenLimits;
use crate::core::state::{GenerationState, Phase};
use crate::services::llm::GenerationClient;
use crate::services::prompt;
use anyhow::{bail, Result};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Result of one `advance()` call, relayed verbatim to the polling client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProgressEvent {
    Error { error: String },
    Update(ProgressUpdate),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    pub status: String,
    pub percentage: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chapter_number: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chapter_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub part_number: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub part_content: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_complete: bool,
}

impl ProgressEvent {
    pub fn error(message: impl Into<String>) -> Self {
        ProgressEvent::Error {
            error: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ProgressEvent::Error { .. })
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, ProgressEvent::Update(u) if u.is_complete)
    }

    /// True when the step stored new content, i.e. the state needs persisting.
    pub fn produced_content(&self) -> bool {
        matches!(self, ProgressEvent::Update(u) if !u.is_complete)
    }

    pub fn percentage(&self) -> Option<f64> {
        match self {
            ProgressEvent::Update(u) => Some(u.percentage),
            ProgressEvent::Error { .. } => None,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[derive(Debug, Clone)]
pub struct GenerationSettings {
    pub language: String,
    pub max_tokens: TokenLimits,
    pub call_timeout: Duration,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            language: "French".to_string(),
            max_tokens: TokenLimits::default(),
            call_timeout: Duration::from_secs(120),
        }
    }
}

async fn call(
    client: &dyn GenerationClient,
    prompt: &str,
    max_tokens: u32,
    timeout: Duration,
) -> Result<String> {
    let text = match tokio::time::timeout(timeout, client.generate(prompt, max_tokens)).await {
        Ok(result) => result?,
        Err(_) => bail!("Generation timed out after {}s", timeout.as_secs_f64()),
    };
    if text.trim().is_empty() {
        bail!("Generation returned empty text");
    }
    Ok(text)
}

fn failure(message: String, cause: anyhow::Error) -> ProgressEvent {
    warn!("{} Cause: {:#}", message, cause);
    ProgressEvent::error(message)
}

impl GenerationState {
    /// Performs exactly one unit of work: the summary, one chapter title or one part.
    ///
    /// A failed generation call leaves the state untouched, so calling again
    /// retries the same unit.
    pub async fn advance(
        &mut self,
        client: &dyn GenerationClient,
        settings: &GenerationSettings,
    ) -> ProgressEvent {
        let phase = self.phase();
        debug!("Advancing novel '{}' from {:?}", self.meta().title, phase);

        match phase {
            Phase::AwaitingSummary => {
                let prompt = prompt::summary_prompt(self, &settings.language);
                let limit = settings.max_tokens.summary;
                match call(client, &prompt, limit, settings.call_timeout).await {
                    Ok(summary) => {
                        self.record_summary(summary);
                        info!("Summary generated for '{}'", self.meta().title);
                        ProgressEvent::Update(ProgressUpdate {
                            status: "Generating novel summary...".to_string(),
                            percentage: 0.0,
                            ..Default::default()
                        })
                    }
                    Err(e) => failure("Error generating summary.".to_string(), e),
                }
            }
            Phase::Complete => ProgressEvent::Update(ProgressUpdate {
                status: "Novel generation complete!".to_string(),
                percentage: 100.0,
                is_complete: true,
                ..Default::default()
            }),
            Phase::AwaitingChapterTitle(chapter) => {
                let prompt = prompt::chapter_title_prompt(self, chapter, &settings.language);
                let limit = settings.max_tokens.chapter_title;
                match call(client, &prompt, limit, settings.call_timeout).await {
                    Ok(title) => {
                        self.record_chapter_title(title.clone());
                        info!("Chapter {} titled '{}'", chapter, title);
                        ProgressEvent::Update(ProgressUpdate {
                            status: format!("Generating title for chapter {}...", chapter),
                            percentage: self.percentage_before_chapter(chapter),
                            chapter_number: Some(chapter),
                            chapter_title: Some(title),
                            ..Default::default()
                        })
                    }
                    Err(e) => {
                        let message = format!("Error generating title for chapter {}.", chapter);
                        failure(message, e)
                    }
                }
            }
            Phase::AwaitingPart(chapter, part) => {
                let prompt = prompt::part_prompt(self, chapter, part, &settings.language);
                let limit = settings.max_tokens.part;
                match call(client, &prompt, limit, settings.call_timeout).await {
                    Ok(content) => {
                        let percentage = self.percentage_after_part(chapter, part);
                        self.record_part(content.clone());
                        info!("Chapter {}, part {} written ({:.1}%)", chapter, part, percentage);
                        ProgressEvent::Update(ProgressUpdate {
                            status: format!("Generating chapter {}, part {}...", chapter, part),
                            percentage,
                            chapter_number: Some(chapter),
                            part_number: Some(part),
                            part_content: Some(content),
                            ..Default::default()
                        })
                    }
                    Err(e) => failure(
                        format!("Error generating part {} of chapter {}.", part, chapter),
                        e,
                    ),
                }
            }
        }
    }
}
