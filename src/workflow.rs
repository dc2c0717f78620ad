use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use log::warn;
use novelgen::{Config, NovelDriver, ProgressEvent};
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub enum RetryPolicy {
    /// Retry a failed step up to `max_retries` times, waiting `delay` in between.
    Unattended { max_retries: usize, delay: Duration },
    /// Ask before retrying.
    Interactive,
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        if config.unattended {
            RetryPolicy::Unattended {
                max_retries: config.llm.retry_count,
                delay: Duration::from_secs(config.llm.retry_delay_seconds),
            }
        } else {
            RetryPolicy::Interactive
        }
    }
}

#[derive(Debug, PartialEq)]
pub enum Outcome {
    Completed,
    Stopped { error: String },
}

/// Polls the driver one step at a time until the novel is complete or a failure is not retried.
pub struct Poller<'a> {
    driver: &'a NovelDriver,
    poll_delay: Duration,
    retry: RetryPolicy,
    progress: ProgressBar,
}

impl<'a> Poller<'a> {
    pub fn new(driver: &'a NovelDriver, config: &Config) -> Result<Self> {
        let progress = ProgressBar::new(100);
        progress.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}% {msg}")?
                .progress_chars("#>-"),
        );
        Ok(Self {
            driver,
            poll_delay: config.poll_delay(),
            retry: RetryPolicy::from_config(config),
            progress,
        })
    }

    pub async fn run(&self, id: &str) -> Result<Outcome> {
        let mut failures = 0usize;

        loop {
            match self.driver.step(id).await? {
                ProgressEvent::Error { error } => {
                    failures += 1;
                    self.progress.println(format!("Error: {}", error));
                    if !self.should_retry(failures)? {
                        self.progress.abandon_with_message(error.clone());
                        return Ok(Outcome::Stopped { error });
                    }
                    if let RetryPolicy::Unattended { delay, .. } = self.retry {
                        warn!("Retrying in {}s (attempt {})", delay.as_secs(), failures);
                        tokio::time::sleep(delay).await;
                    }
                    continue;
                }
                ProgressEvent::Update(update) => {
                    failures = 0;
                    self.progress.set_position(update.percentage.round().clamp(0.0, 100.0) as u64);
                    self.progress.set_message(update.status.clone());

                    if let (Some(number), Some(title)) =
                        (update.chapter_number, &update.chapter_title)
                    {
                        self.progress.println(format!("Chapter {}: {}", number, title));
                    }
                    if update.is_complete {
                        self.progress.finish_with_message(update.status);
                        return Ok(Outcome::Completed);
                    }
                }
            }

            tokio::time::sleep(self.poll_delay).await;
        }
    }

    fn should_retry(&self, failures: usize) -> Result<bool> {
        match self.retry {
            RetryPolicy::Unattended { max_retries, .. } => Ok(failures <= max_retries),
            RetryPolicy::Interactive => {
                let answer = self.progress.suspend(|| {
                    inquire::Confirm::new("Generation failed. Retry this step?")
                        .with_default(true)
                        .prompt()
                })?;
                Ok(answer)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use novelgen::core::io::NativeStorage;
    use novelgen::{DocumentMeta, GenerationClient};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    // Fails the calls listed in `fail_on` (1-based).
    #[derive(Debug)]
    struct FlakyClient {
        calls: Arc<AtomicUsize>,
        fail_on: Vec<usize>,
    }

    #[async_trait]
    impl GenerationClient for FlakyClient {
        async fn generate(&self, _prompt: &str, _max_tokens: u32) -> Result<String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_on.contains(&n) {
                Err(anyhow!("Mock API error"))
            } else {
                Ok(format!("text {}", n))
            }
        }
    }

    fn config(root: &std::path::Path, retry_count: usize) -> Result<Config> {
        let yaml = format!(
            "novels_folder: {}\nsessions_folder: {}\npoll_delay_seconds: 0\nunattended: true\n\
            novel:\n  total_chapters: 1\n  parts_per_chapter: 2\n\
            llm:\n  provider: mock\n  retry_count: {}\n  retry_delay_seconds: 0\n",
            root.join("novels").display(),
            root.join("sessions").display(),
            retry_count
        );
        Config::from_yaml(&yaml)
    }

    async fn poll(fail_on: Vec<usize>, retry_count: usize) -> Result<(Outcome, usize)> {
        let temp_dir = tempfile::tempdir()?;
        let config = config(temp_dir.path(), retry_count)?;
        let calls = Arc::new(AtomicUsize::new(0));
        let client = FlakyClient {
            calls: calls.clone(),
            fail_on,
        };
        let driver = NovelDriver::new(&config, Box::new(client), Arc::new(NativeStorage::new()));
        driver
            .create("doc", DocumentMeta::new("T", "G", "A", "B", "D"))
            .await?;

        let mut poller = Poller::new(&driver, &config)?;
        poller.progress = ProgressBar::hidden();
        let outcome = poller.run("doc").await?;
        Ok((outcome, calls.load(Ordering::SeqCst)))
    }

    #[tokio::test]
    async fn test_polls_until_complete() -> Result<()> {
        let (outcome, calls) = poll(vec![], 0).await?;
        assert_eq!(outcome, Outcome::Completed);
        assert_eq!(calls, 4);
        Ok(())
    }

    #[tokio::test]
    async fn test_unattended_retry_recovers() -> Result<()> {
        let (outcome, calls) = poll(vec![2, 3], 2).await?;
        assert_eq!(outcome, Outcome::Completed);
        assert_eq!(calls, 6);
        Ok(())
    }

    #[tokio::test]
    async fn test_stops_after_retries_are_exhausted() -> Result<()> {
        let (outcome, calls) = poll(vec![3, 4], 1).await?;
        assert_eq!(
            outcome,
            Outcome::Stopped {
                error: "Error generating part 1 of chapter 1.".to_string()
            }
        );
        assert_eq!(calls, 4);
        Ok(())
    }
}
