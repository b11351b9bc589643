//! Prompt and context assembly for the query flows.

use crate::index::IndexMatch;

/// Answer returned when a question retrieves nothing.
pub const ASK_FALLBACK: &str = "I couldn’t find this in your notes.";
/// Summary returned when a topic retrieves nothing.
pub const SUMMARY_FALLBACK: &str = "No relevant notes found to summarize.";

/// Sampling temperature for answers and summaries.
pub const ANSWER_TEMPERATURE: f64 = 0.2;
/// Sampling temperature for flashcards.
pub const FLASHCARD_TEMPERATURE: f64 = 0.3;

/// Tagged context block: one `[chunk N from FILE] text` entry per match, in match order.
pub fn cited_context(matches: &[IndexMatch]) -> String {
    matches
        .iter()
        .map(|hit| {
            format!(
                "[chunk {} from {}] {}",
                hit.metadata.chunk_id, hit.metadata.filename, hit.metadata.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Untagged context used for flashcards, with a placeholder when nothing matched.
pub fn flashcard_context(matches: &[IndexMatch], topic: &str) -> String {
    if matches.is_empty() {
        return format!("General notes about {topic}");
    }
    matches
        .iter()
        .map(|hit| hit.metadata.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn summary_prompt(topic: &str) -> String {
    format!(
        "Summarize the topic: {topic} using ONLY the context below. \
         Produce a concise, exam-oriented summary with bullet points and key definitions."
    )
}

pub fn flashcard_prompt(topic: &str) -> String {
    format!(
        "Generate 6-8 flashcards for exam preparation about **{topic}**. \
         If context is available, use ONLY that. If not, use general knowledge. \
         Each flashcard must be a JSON object with 'question' and 'answer'. \
         Return ONLY a valid JSON list. Example:\n\
         [{{\"question\": \"What is X?\", \"answer\": \"Y\"}}]"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::ChunkMetadata;

    fn hit(chunk_id: usize, filename: &str, text: &str) -> IndexMatch {
        IndexMatch {
            id: format!("doc-{chunk_id}"),
            score: 0.5,
            metadata: ChunkMetadata {
                doc_id: "doc".into(),
                filename: filename.into(),
                chunk_id,
                text: text.into(),
            },
        }
    }

    #[test]
    fn cited_context_tags_each_match() {
        let matches = vec![
            hit(3, "cardio.pdf", "Preload is end-diastolic volume."),
            hit(0, "renal.md", "GFR is about 125 mL/min."),
        ];
        assert_eq!(
            cited_context(&matches),
            "[chunk 3 from cardio.pdf] Preload is end-diastolic volume.\n\n\
             [chunk 0 from renal.md] GFR is about 125 mL/min."
        );
    }

    #[test]
    fn flashcard_context_falls_back_to_topic() {
        assert_eq!(flashcard_context(&[], "Krebs cycle"), "General notes about Krebs cycle");
        let matches = vec![hit(1, "a.txt", "first"), hit(2, "b.txt", "second")];
        assert_eq!(flashcard_context(&matches, "ignored"), "first\n\nsecond");
    }

    #[test]
    fn prompts_mention_topic() {
        assert!(summary_prompt("RAAS").starts_with("Summarize the topic: RAAS using ONLY"));
        let prompt = flashcard_prompt("RAAS");
        assert!(prompt.contains("**RAAS**"));
        assert!(prompt.contains(r#"[{"question": "What is X?", "answer": "Y"}]"#));
    }
}
