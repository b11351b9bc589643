//! Flashcard extraction from free-form model output.

use super::types::Flashcard;
use serde_json::{Map, Value};

/// How a model response was turned into flashcards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlashcardParse {
    /// Response was valid JSON, normalized into `{question, answer}` cards.
    Parsed(Vec<Flashcard>),
    /// Response was not valid JSON; every line containing `?` became a question.
    RawLines(Vec<Flashcard>),
}

impl FlashcardParse {
    /// Interpret `response`, preferring JSON and falling back to a line scan.
    ///
    /// Any valid JSON is accepted: a list of cards, a `{"flashcards": [...]}` wrapper, or a
    /// single card object. List items may be objects, plain strings, or strings holding a
    /// JSON object.
    pub fn from_response(response: &str) -> Self {
        let candidate = strip_code_fence(response);
        match serde_json::from_str::<Value>(candidate) {
            Ok(value) => Self::Parsed(cards_from_value(value)),
            Err(error) => {
                tracing::debug!(error = %error, "Flashcard response is not JSON; scanning lines");
                Self::RawLines(
                    response
                        .lines()
                        .filter(|line| line.contains('?'))
                        .map(|line| Flashcard {
                            question: line.trim().to_string(),
                            answer: String::new(),
                        })
                        .collect(),
                )
            }
        }
    }

    /// Whether the line-scan fallback was used.
    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::RawLines(_))
    }

    /// Consume the parse result, returning the cards.
    pub fn into_cards(self) -> Vec<Flashcard> {
        match self {
            Self::Parsed(cards) | Self::RawLines(cards) => cards,
        }
    }
}

fn cards_from_value(value: Value) -> Vec<Flashcard> {
    match value {
        Value::Array(items) => items.into_iter().map(card_from_item).collect(),
        Value::Object(mut map) => match map.remove("flashcards") {
            Some(inner) => cards_from_value(inner),
            None => vec![card_from_object(&map)],
        },
        Value::Null => Vec::new(),
        other => vec![card_from_item(other)],
    }
}

fn card_from_item(item: Value) -> Flashcard {
    match item {
        Value::Object(map) => card_from_object(&map),
        Value::String(text) => match serde_json::from_str::<Value>(&text) {
            Ok(Value::Object(map)) => card_from_object(&map),
            _ => Flashcard {
                question: text,
                answer: String::new(),
            },
        },
        other => Flashcard {
            question: other.to_string(),
            answer: String::new(),
        },
    }
}

fn card_from_object(map: &Map<String, Value>) -> Flashcard {
    Flashcard {
        question: field_text(map.get("question")),
        answer: field_text(map.get("answer")),
    }
}

/// Strings pass through, null or absent becomes empty, anything else its JSON text.
fn field_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
    }
}

/// Unwrap a Markdown code fence (optionally tagged `json`) around the payload.
fn strip_code_fence(response: &str) -> &str {
    let trimmed = response.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(body) = rest.strip_suffix("```") else {
        return trimmed;
    };
    let body = body.strip_prefix("json").unwrap_or(body);
    body.trim()
}
