use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const DEFAULT_TOTAL_CHAPTERS: u32 = 12;
pub const DEFAULT_PARTS_PER_CHAPTER: u32 = 8;

/// What the user supplied on the creation form. `summary` is attached once generated.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct DocumentMeta {
    pub title: String,
    pub genre: String,
    pub author1: String,
    pub author2: String,
    pub description: String,
    #[serde(default)]
    pub summary: String,
}

impl DocumentMeta {
    pub fn new(
        title: impl Into<String>,
        genre: impl Into<String>,
        author1: impl Into<String>,
        author2: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            genre: genre.into(),
            author1: author1.into(),
            author2: author2.into(),
            description: description.into(),
            summary: String::new(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
pub struct ChapterRecord {
    pub title: String,
    #[serde(default)]
    pub parts: BTreeMap<u32, String>,
}

/// The next unit of work, derived from the stored cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    AwaitingSummary,
    AwaitingChapterTitle(u32),
    AwaitingPart(u32, u32),
    Complete,
}

/// A novel in progress. Serialized as-is for both the session store and the artifact.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenerationState {
    meta: DocumentMeta,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    chapters: BTreeMap<u32, ChapterRecord>,
    current_chapter: u32,
    current_part: u32,
    total_chapters: u32,
    total_parts_per_chapter: u32,
}

impl GenerationState {
    pub fn new(meta: DocumentMeta) -> Self {
        Self::with_totals(meta, DEFAULT_TOTAL_CHAPTERS, DEFAULT_PARTS_PER_CHAPTER)
    }

    /// Totals are stored as given; `validate` rejects a zero total.
    pub fn with_totals(
        mut meta: DocumentMeta,
        total_chapters: u32,
        parts_per_chapter: u32,
    ) -> Self {
        meta.summary.clear();
        Self {
            meta,
            summary: String::new(),
            chapters: BTreeMap::new(),
            current_chapter: 1,
            current_part: 1,
            total_chapters,
            total_parts_per_chapter: parts_per_chapter,
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let state: Self =
            serde_json::from_str(json).context("Failed to parse generation state")?;
        state.validate()?;
        Ok(state)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn meta(&self) -> &DocumentMeta {
        &self.meta
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    pub fn chapters(&self) -> &BTreeMap<u32, ChapterRecord> {
        &self.chapters
    }

    pub fn chapter(&self, number: u32) -> Option<&ChapterRecord> {
        self.chapters.get(&number)
    }

    pub fn cursor(&self) -> (u32, u32) {
        (self.current_chapter, self.current_part)
    }

    pub fn total_chapters(&self) -> u32 {
        self.total_chapters
    }

    pub fn total_parts_per_chapter(&self) -> u32 {
        self.total_parts_per_chapter
    }

    pub fn phase(&self) -> Phase {
        if self.summary.is_empty() {
            Phase::AwaitingSummary
        } else if self.current_chapter > self.total_chapters {
            Phase::Complete
        } else if !self.chapters.contains_key(&self.current_chapter) {
            Phase::AwaitingChapterTitle(self.current_chapter)
        } else {
            Phase::AwaitingPart(self.current_chapter, self.current_part)
        }
    }

    pub fn is_complete(&self) -> bool {
        self.phase() == Phase::Complete
    }

    /// Progress reached once every part before `chapter` is written.
    pub fn percentage_before_chapter(&self, chapter: u32) -> f64 {
        let done = f64::from(chapter.saturating_sub(1)) * f64::from(self.total_parts_per_chapter);
        done / self.total_units() * 100.0
    }

    /// Progress reached once `part` of `chapter` is written.
    pub fn percentage_after_part(&self, chapter: u32, part: u32) -> f64 {
        let done = f64::from(chapter.saturating_sub(1)) * f64::from(self.total_parts_per_chapter)
            + f64::from(part);
        done / self.total_units() * 100.0
    }

    fn total_units(&self) -> f64 {
        f64::from(self.total_chapters) * f64::from(self.total_parts_per_chapter)
    }

    /// Text of the part preceding the cursor within the current chapter, if any.
    pub fn previous_part(&self) -> Option<&str> {
        if self.current_part <= 1 {
            return None;
        }
        self.chapters
            .get(&self.current_chapter)
            .and_then(|c| c.parts.get(&(self.current_part - 1)))
            .map(String::as_str)
    }

    pub(crate) fn record_summary(&mut self, summary: String) {
        debug_assert!(self.summary.is_empty());
        self.meta.summary = summary.clone();
        self.summary = summary;
    }

    pub(crate) fn record_chapter_title(&mut self, title: String) {
        self.chapters
            .entry(self.current_chapter)
            .or_insert_with(|| ChapterRecord {
                title,
                parts: BTreeMap::new(),
            });
    }

    /// Stores the part under the cursor, then moves the cursor forward.
    pub(crate) fn record_part(&mut self, content: String) {
        let (chapter, part) = self.cursor();
        if let Some(record) = self.chapters.get_mut(&chapter) {
            record.parts.entry(part).or_insert(content);
        }

        self.current_part += 1;
        if self.current_part > self.total_parts_per_chapter {
            self.current_chapter += 1;
            self.current_part = 1;
        }
    }

    /// Checks that the cursor agrees with the chapters and parts actually stored.
    pub fn validate(&self) -> Result<()> {
        let total = self.total_chapters;
        let parts = self.total_parts_per_chapter;

        if total == 0 || parts == 0 {
            bail!(
                "Inconsistent state: totals must be at least 1 (chapters {}, parts {})",
                total,
                parts
            );
        }
        if self.current_chapter == 0 || self.current_chapter > total + 1 {
            bail!(
                "Inconsistent state: current chapter {} out of range 1..={}",
                self.current_chapter,
                total + 1
            );
        }
        if self.current_part == 0 || self.current_part > parts {
            bail!(
                "Inconsistent state: current part {} out of range 1..={}",
                self.current_part,
                parts
            );
        }
        if self.meta.summary != self.summary {
            bail!("Inconsistent state: meta summary differs from running summary");
        }
        if self.summary.is_empty() {
            if !self.chapters.is_empty() || self.cursor() != (1, 1) {
                bail!("Inconsistent state: chapters started before the summary was generated");
            }
            return Ok(());
        }
        if self.current_chapter == total + 1 && self.current_part != 1 {
            bail!(
                "Inconsistent state: finished novel with part cursor at {}",
                self.current_part
            );
        }

        for chapter in 1..self.current_chapter {
            let record = self.chapters.get(&chapter).with_context(|| {
                format!("Inconsistent state: chapter {} is behind the cursor but missing", chapter)
            })?;
            if !record.parts.keys().copied().eq(1..=parts) {
                bail!(
                    "Inconsistent state: chapter {} is behind the cursor but incomplete",
                    chapter
                );
            }
        }

        if self.current_chapter <= total {
            match self.chapters.get(&self.current_chapter) {
                Some(record) => {
                    if !record.parts.keys().copied().eq(1..self.current_part) {
                        bail!(
                            "Inconsistent state: chapter {} parts do not match part cursor {}",
                            self.current_chapter,
                            self.current_part
                        );
                    }
                }
                None if self.current_part != 1 => {
                    bail!(
                        "Inconsistent state: chapter {} has no title but part cursor is {}",
                        self.current_chapter,
                        self.current_part
                    );
                }
                None => {}
            }
        }

        if let Some(&last) = self.chapters.keys().next_back() {
            if last > self.current_chapter {
                bail!("Inconsistent state: chapter {} is ahead of the cursor", last);
            }
        }
        if self.chapters.contains_key(&0) {
            bail!("Inconsistent state: chapter numbers start at 1");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> DocumentMeta {
        DocumentMeta::new("Le Phare", "science_fiction", "asimov", "orwell", "a lighthouse keeper")
    }

    fn finish_chapter(state: &mut GenerationState) {
        state.record_chapter_title("Title".to_string());
        for _ in 0..state.total_parts_per_chapter() {
            state.record_part("text".to_string());
        }
    }

    #[test]
    fn test_defaults() {
        let state = GenerationState::new(meta());
        assert_eq!(state.total_chapters(), 12);
        assert_eq!(state.total_parts_per_chapter(), 8);
        assert_eq!(state.cursor(), (1, 1));
        assert_eq!(state.phase(), Phase::AwaitingSummary);
        assert!(state.validate().is_ok());
    }

    #[test]
    fn test_phase_follows_cursor() {
        let mut state = GenerationState::with_totals(meta(), 2, 2);
        state.record_summary("summary".to_string());
        assert_eq!(state.phase(), Phase::AwaitingChapterTitle(1));

        state.record_chapter_title("One".to_string());
        assert_eq!(state.phase(), Phase::AwaitingPart(1, 1));

        state.record_part("first".to_string());
        assert_eq!(state.phase(), Phase::AwaitingPart(1, 2));
        assert_eq!(state.previous_part(), Some("first"));

        state.record_part("second".to_string());
        assert_eq!(state.cursor(), (2, 1));
        assert_eq!(state.phase(), Phase::AwaitingChapterTitle(2));
        assert_eq!(state.previous_part(), None);

        finish_chapter(&mut state);
        assert_eq!(state.phase(), Phase::Complete);
        assert!(state.validate().is_ok());
    }

    #[test]
    fn test_summary_is_mirrored_into_meta() {
        let mut state = GenerationState::new(meta());
        state.record_summary("Il était une fois".to_string());
        assert_eq!(state.summary(), "Il était une fois");
        assert_eq!(state.meta().summary, "Il était une fois");
    }

    #[test]
    fn test_existing_title_is_not_overwritten() {
        let mut state = GenerationState::with_totals(meta(), 2, 2);
        state.record_summary("s".to_string());
        state.record_chapter_title("First".to_string());
        state.record_chapter_title("Second".to_string());
        assert_eq!(state.chapter(1).unwrap().title, "First");
    }

    #[test]
    fn test_percentages() {
        let state = GenerationState::with_totals(meta(), 2, 2);
        assert_eq!(state.percentage_before_chapter(1), 0.0);
        assert_eq!(state.percentage_after_part(1, 1), 25.0);
        assert_eq!(state.percentage_before_chapter(2), 50.0);
        assert_eq!(state.percentage_after_part(2, 2), 100.0);
    }

    #[test]
    fn test_snapshot_field_names() -> Result<()> {
        let mut state = GenerationState::with_totals(meta(), 2, 2);
        state.record_summary("s".to_string());
        state.record_chapter_title("One".to_string());
        state.record_part("p1".to_string());

        let value: serde_json::Value = serde_json::from_str(&state.to_json()?)?;
        assert_eq!(value["currentChapter"], 1);
        assert_eq!(value["currentPart"], 2);
        assert_eq!(value["totalChapters"], 2);
        assert_eq!(value["totalPartsPerChapter"], 2);
        assert_eq!(value["meta"]["summary"], "s");
        assert_eq!(value["chapters"]["1"]["title"], "One");
        assert_eq!(value["chapters"]["1"]["parts"]["1"], "p1");
        Ok(())
    }

    #[test]
    fn test_json_round_trip_is_stable() -> Result<()> {
        let mut state = GenerationState::with_totals(meta(), 3, 2);
        state.record_summary("s".to_string());
        finish_chapter(&mut state);
        state.record_chapter_title("Two".to_string());
        state.record_part("p".to_string());

        let first = state.to_json()?;
        let restored = GenerationState::from_json(&first)?;
        assert_eq!(restored, state);
        assert_eq!(restored.to_json()?, first);
        Ok(())
    }

    #[test]
    fn test_validate_rejects_stale_part_cursor_at_chapter_boundary() -> Result<()> {
        let mut state = GenerationState::with_totals(meta(), 2, 2);
        state.record_summary("s".to_string());
        finish_chapter(&mut state);

        let mut value: serde_json::Value = serde_json::from_str(&state.to_json()?)?;
        value["currentPart"] = serde_json::json!(2);
        let err = GenerationState::from_json(&value.to_string()).unwrap_err();
        assert!(err.to_string().contains("has no title"));
        Ok(())
    }

    #[test]
    fn test_validate_rejects_missing_past_chapter() -> Result<()> {
        let mut state = GenerationState::with_totals(meta(), 2, 2);
        state.record_summary("s".to_string());
        finish_chapter(&mut state);

        let mut value: serde_json::Value = serde_json::from_str(&state.to_json()?)?;
        value["chapters"] = serde_json::json!({});
        assert!(GenerationState::from_json(&value.to_string()).is_err());
        Ok(())
    }

    #[test]
    fn test_validate_rejects_parts_ahead_of_cursor() -> Result<()> {
        let mut state = GenerationState::with_totals(meta(), 2, 3);
        state.record_summary("s".to_string());
        state.record_chapter_title("One".to_string());
        state.record_part("p1".to_string());

        let mut value: serde_json::Value = serde_json::from_str(&state.to_json()?)?;
        value["chapters"]["1"]["parts"]["3"] = serde_json::json!("too early");
        assert!(GenerationState::from_json(&value.to_string()).is_err());
        Ok(())
    }

    #[test]
    fn test_validate_rejects_chapters_without_summary() {
        let json = r#"{
            "meta": {
                "title": "t", "genre": "g", "author1": "a", "author2": "b", "description": "d"
            },
            "summary": "",
            "chapters": {"1": {"title": "One", "parts": {}}},
            "currentChapter": 1,
            "currentPart": 1,
            "totalChapters": 2,
            "totalPartsPerChapter": 2
        }"#;
        assert!(GenerationState::from_json(json).is_err());
    }

    #[test]
    fn test_zero_totals_are_kept_and_rejected() {
        let state = GenerationState::with_totals(meta(), 0, 2);
        assert_eq!(state.total_chapters(), 0);
        let err = state.validate().unwrap_err();
        assert!(err.to_string().contains("totals must be at least 1"));

        let state = GenerationState::with_totals(meta(), 2, 0);
        assert_eq!(state.total_parts_per_chapter(), 0);
        assert!(state.validate().is_err());
    }

    #[test]
    fn test_creation_requires_every_field() {
        let json = r#"{"title": "t", "genre": "g", "author1": "a", "description": "d"}"#;
        assert!(serde_json::from_str::<DocumentMeta>(json).is_err());
    }
}
