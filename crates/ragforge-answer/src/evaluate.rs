//! LLM-judge scoring for answer faithfulness and relevance.

use once_cell::sync::Lazy;
use ragforge_backend::retry::with_retry;
use ragforge_backend::LanguageBackend;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

static FIRST_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+(?:\.\d+)?|\.\d+").unwrap());

/// One evaluation input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalExample {
    pub question: String,
    pub expected_ground_truth: String,
}

/// Scores for one example, both in [0, 1].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalScore {
    pub question: String,
    pub expected_ground_truth: String,
    pub faithfulness: f64,
    pub relevance: f64,
}

/// How much of the answer is derivable from the source summaries.
pub async fn score_faithfulness(
    backend: &dyn LanguageBackend,
    answer: &str,
    source_summaries: &str,
) -> f64 {
    let prompt = format!(
        "Rate how faithful the answer is to the source summaries: 1 means every claim \
         is supported, 0 means none are. Respond with a single number between 0 and 1.\n\n\
         Summaries:\n{}\n\nAnswer:\n{}",
        source_summaries, answer
    );
    judge(backend, &prompt).await
}

/// How well the answer addresses the question.
pub async fn score_relevance(backend: &dyn LanguageBackend, question: &str, answer: &str) -> f64 {
    let prompt = format!(
        "Rate how well the answer addresses the question, from 0 to 1. Respond with a \
         single number between 0 and 1.\n\nQuestion: {}\n\nAnswer:\n{}",
        question, answer
    );
    judge(backend, &prompt).await
}

/// Ask the backend, parse a single number, clamp to [0, 1]. Any
/// failure scores 0.
async fn judge(backend: &dyn LanguageBackend, prompt: &str) -> f64 {
    match with_retry(|| backend.generate(prompt, None)).await {
        Ok(raw) => parse_unit_score(&raw),
        Err(e) => {
            debug!("judge call failed, scoring 0: {}", e);
            0.0
        }
    }
}

fn parse_unit_score(raw: &str) -> f64 {
    FIRST_NUMBER
        .find(raw)
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .map(|v| v.clamp(0.0, 1.0))
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragforge_backend::MockBackend;

    #[test]
    fn test_parse_unit_score() {
        assert_eq!(parse_unit_score("0.8"), 0.8);
        assert_eq!(parse_unit_score("Score: 0.35 overall"), 0.35);
        assert_eq!(parse_unit_score(".5"), 0.5);
        // Out-of-range values clamp.
        assert_eq!(parse_unit_score("7"), 1.0);
        // Unparseable defaults to 0.
        assert_eq!(parse_unit_score("excellent"), 0.0);
        assert_eq!(parse_unit_score(""), 0.0);
    }

    #[tokio::test]
    async fn test_faithfulness_uses_summaries() {
        let backend = MockBackend::new(4).with_responses(["0.9"]);
        let score = score_faithfulness(&backend, "the answer", "summary one\nsummary two").await;
        assert_eq!(score, 0.9);
        let prompt = &backend.generate_prompts()[0];
        assert!(prompt.contains("summary one"));
        assert!(prompt.contains("the answer"));
    }

    #[tokio::test]
    async fn test_relevance_prompt_carries_question_and_answer() {
        let backend = MockBackend::new(4).with_responses(["1.0"]);
        let score = score_relevance(&backend, "why?", "because").await;
        assert_eq!(score, 1.0);
        let prompt = &backend.generate_prompts()[0];
        assert!(prompt.contains("why?"));
        assert!(prompt.contains("because"));
    }
}
