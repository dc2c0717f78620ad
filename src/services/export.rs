use crate::core::state::GenerationState;

/// Readable view of the document so far: header, summary, then chapters and parts in order.
pub fn render_markdown(state: &GenerationState) -> String {
    let meta = state.meta();
    let mut out = format!("# {}\n\n", meta.title);
    out.push_str(&format!(
        "*{}* · inspired by {} and {}\n\n",
        meta.genre, meta.author1, meta.author2
    ));

    if !state.summary().is_empty() {
        out.push_str("## Summary\n\n");
        out.push_str(state.summary().trim());
        out.push_str("\n\n");
    }

    for (number, chapter) in state.chapters() {
        out.push_str(&format!("## Chapter {}: {}\n\n", number, chapter.title.trim()));
        for content in chapter.parts.values() {
            out.push_str(content.trim());
            out.push_str("\n\n");
        }
    }

    if !state.is_complete() {
        let (chapter, part) = state.cursor();
        out.push_str(&format!(
            "---\n\n_In progress: chapter {} of {}, part {} of {}._\n",
            chapter.min(state.total_chapters()),
            state.total_chapters(),
            part,
            state.total_parts_per_chapter()
        ));
    }

    out
}
