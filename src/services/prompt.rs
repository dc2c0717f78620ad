//! Prompt templates for each unit of work.
//!
//! Every builder is a pure function of the state: same state, same prompt.

use crate::core::state::{DocumentMeta, GenerationState};

fn style_instruction(meta: &DocumentMeta) -> String {
    format!(
        "Write in a style inspired by {} and {}.",
        meta.author1, meta.author2
    )
}

fn language_instruction(language: &str) -> String {
    format!("You must always answer in {}.", language)
}

pub fn summary_prompt(state: &GenerationState, language: &str) -> String {
    let meta = state.meta();
    format!(
        "Write a complete and precise summary for a novel titled '{}' in the {} genre. \
        The story is about {}. {} {}",
        meta.title,
        meta.genre,
        meta.description,
        style_instruction(meta),
        language_instruction(language),
    )
}

pub fn chapter_title_prompt(state: &GenerationState, chapter: u32, language: &str) -> String {
    let meta = state.meta();
    format!(
        "Suggest a title for chapter {} of a {} novel titled '{}'. \
        Here is a summary of the story: {} \
        Answer with the chapter title only. {}",
        chapter,
        meta.genre,
        meta.title,
        state.summary(),
        language_instruction(language),
    )
}

/// Part prompt. From part 2 on, the preceding part is appended as continuation context.
pub fn part_prompt(state: &GenerationState, chapter: u32, part: u32, language: &str) -> String {
    let meta = state.meta();
    let chapter_title = state
        .chapter(chapter)
        .map(|c| c.title.as_str())
        .unwrap_or_default();

    let mut prompt = format!(
        "Write part {} of chapter {} titled '{}' in a novel titled '{}'. \
        The genre of the novel is {}. The story is about {}. \
        Here is the summary: {}. {} {}",
        part,
        chapter,
        chapter_title,
        meta.title,
        meta.genre,
        meta.description,
        state.summary(),
        style_instruction(meta),
        language_instruction(language),
    );

    if part > 1 {
        if let Some(previous) = state
            .chapter(chapter)
            .and_then(|c| c.parts.get(&(part - 1)))
        {
            prompt.push_str(&format!(" The previous part ended with: {}.", previous));
        }
    }

    prompt
}
