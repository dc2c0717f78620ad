pub mod driver;
pub mod export;
pub mod generator;
pub mod llm;
pub mod prompt;
