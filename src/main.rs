mod setup;
mod workflow;

use anyhow::Result;
use novelgen::core::io::NativeStorage;
use novelgen::{create_client, Config, NovelDriver};
use setup::Session;
use std::sync::Arc;
use workflow::{Outcome, Poller};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let config = match Config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Error loading config: {:#}", e);
            eprintln!("Please create 'config.yml' with valid LLM settings.");
            eprintln!("See config.example.yml for a starting point.");
            return Err(e);
        }
    };

    config.ensure_directories()?;

    let client = create_client(&config.llm)?;
    let driver = NovelDriver::new(&config, client, Arc::new(NativeStorage::new()));

    let id = match setup::choose_session(&driver).await? {
        Session::Resume(id) => {
            println!("Resuming '{}'", id);
            id
        }
        Session::New { id, meta } => {
            driver.create(&id, meta).await?;
            id
        }
    };

    match Poller::new(&driver, &config)?.run(&id).await? {
        Outcome::Completed => {
            println!("Novel generation complete!");
            println!("  {}", driver.artifact_path(&id));
            println!("  {}", driver.markdown_path(&id));
        }
        Outcome::Stopped { error } => {
            eprintln!("Stopped: {}", error);
            println!("Progress is saved. Run again and pick '{}' to resume.", id);
        }
    }

    Ok(())
}
