use anyhow::Result;
use inquire::{Confirm, Select, Text};
use novelgen::services::driver::{slugify, validate_id};
use novelgen::{DocumentMeta, NovelDriver};

const GENRES: &[&str] = &[
    "Science Fiction",
    "Biographie",
    "Roman classique",
    "Grand roman de la pléiade",
    "Roman moderne",
    "Roman punk underground",
];
const FIRST_AUTHORS: &[&str] = &["Louis-Ferdinand Céline", "Isaac Asimov", "Alexandre Dumas"];
const SECOND_AUTHORS: &[&str] = &["John Steinbeck", "Fiodor Dostoïevski", "Vladimir Nabokov"];

const NEW_NOVEL: &str = "Start a new novel";
const OTHER: &str = "Other...";

pub enum Session {
    New { id: String, meta: DocumentMeta },
    Resume(String),
}

pub async fn choose_session(driver: &NovelDriver) -> Result<Session> {
    let existing = driver.list().await?;
    if !existing.is_empty() {
        let mut options = vec![NEW_NOVEL.to_string()];
        options.extend(existing);
        let choice = Select::new("Resume a novel or start a new one?", options).prompt()?;
        if choice != NEW_NOVEL {
            return Ok(Session::Resume(choice));
        }
    }

    let meta = ask_document_meta()?;
    let id = ask_document_id(driver, &meta.title).await?;
    Ok(Session::New { id, meta })
}

fn ask_document_meta() -> Result<DocumentMeta> {
    let title = Text::new("Title of your novel:")
        .with_validator(inquire::required!())
        .prompt()?;
    let description = Text::new("What's your novel about?")
        .with_validator(inquire::required!())
        .prompt()?;
    let genre = select_or_type("Literary style:", GENRES)?;
    let author1 = select_or_type("Favorite author 1:", FIRST_AUTHORS)?;
    let author2 = select_or_type("Favorite author 2:", SECOND_AUTHORS)?;

    Ok(DocumentMeta::new(title, genre, author1, author2, description))
}

fn select_or_type(message: &str, choices: &[&str]) -> Result<String> {
    let mut options: Vec<String> = choices.iter().map(|c| c.to_string()).collect();
    options.push(OTHER.to_string());

    let choice = Select::new(message, options).prompt()?;
    if choice == OTHER {
        Ok(Text::new(message)
            .with_validator(inquire::required!())
            .prompt()?)
    } else {
        Ok(choice)
    }
}

async fn ask_document_id(driver: &NovelDriver, title: &str) -> Result<String> {
    let suggested = slugify(title);
    loop {
        let id = Text::new("Document id:").with_default(&suggested).prompt()?;
        if let Err(e) = validate_id(&id) {
            println!("{}", e);
            continue;
        }
        if driver.exists(&id).await? {
            let question = format!("A novel named '{}' already exists. Replace it?", id);
            let replace = Confirm::new(&question)
                .with_default(false)
                .prompt()?;
            if !replace {
                continue;
            }
        }
        return Ok(id);
    }
}
