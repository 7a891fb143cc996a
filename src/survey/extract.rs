//! Recover the user-facing message from a collaborator reply.
//!
//! Replies are free text. The directive asks for the message inside
//! `<question>…</question>`; older-style replies put it in double quotes.
//! When neither is present the whole reply is used.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

static TAGGED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<question>\s*(.*?)\s*</question>").expect("regex for question tags")
});

static QUOTED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""([^"]+)"|“([^”]+)”"#).expect("regex for quoted text"));

/// Where the extracted text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionSource {
    Tagged,
    Quoted,
    Raw,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    pub text: String,
    pub source: ExtractionSource,
}

/// Pull the next question (or final summary) out of `raw`.
pub fn extract_question(raw: &str) -> Extraction {
    if let Some(text) = TAGGED
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .filter(|s| !s.is_empty())
    {
        return Extraction {
            text: text.to_string(),
            source: ExtractionSource::Tagged,
        };
    }

    if let Some(text) = QUOTED
        .captures(raw)
        .and_then(|caps| caps.get(1).or_else(|| caps.get(2)))
    {
        tracing::warn!(
            reply_len = raw.len(),
            "No question tags in collaborator reply, using the first quoted text"
        );
        return Extraction {
            text: text.as_str().to_string(),
            source: ExtractionSource::Quoted,
        };
    }

    tracing::warn!(
        reply_len = raw.len(),
        "No question marker in collaborator reply, using it verbatim"
    );
    Extraction {
        text: raw.to_string(),
        source: ExtractionSource::Raw,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_quoted_substring_is_extracted() {
        let got = extract_question(r#"Sure — here is your question: "What is your business name?""#);
        assert_eq!(got.text, "What is your business name?");
        assert_eq!(got.source, ExtractionSource::Quoted);
    }

    #[test]
    fn reply_without_quotes_is_returned_unchanged() {
        let raw = "What is your business name?";
        let got = extract_question(raw);
        assert_eq!(got.text, raw);
        assert_eq!(got.source, ExtractionSource::Raw);
    }

    #[test]
    fn only_first_quote_counts() {
        let got = extract_question(r#"Ask "one" then "two""#);
        assert_eq!(got.text, "one");
    }

    #[test]
    fn tags_win_over_quotes() {
        let raw = "Thanks!\n<question>\nWhat type of business do you own? (Options: \"LLC\", \"Corporation\")\n</question>";
        let got = extract_question(raw);
        assert_eq!(
            got.text,
            "What type of business do you own? (Options: \"LLC\", \"Corporation\")"
        );
        assert_eq!(got.source, ExtractionSource::Tagged);
    }

    #[test]
    fn tagged_summary_keeps_line_breaks() {
        let raw = "<question>Summary:\n- Name: Acme\n- Type: LLC</question>";
        assert_eq!(extract_question(raw).text, "Summary:\n- Name: Acme\n- Type: LLC");
    }

    #[test]
    fn empty_tags_fall_through() {
        let got = extract_question(r#"<question></question> "Do you have employees?""#);
        assert_eq!(got.text, "Do you have employees?");
        assert_eq!(got.source, ExtractionSource::Quoted);
    }

    #[test]
    fn curly_quotes_are_recognized() {
        let got = extract_question("Next: “How many employees do you have?”");
        assert_eq!(got.text, "How many employees do you have?");
    }

    #[test]
    fn empty_reply_is_raw() {
        assert_eq!(extract_question("").source, ExtractionSource::Raw);
    }
}
