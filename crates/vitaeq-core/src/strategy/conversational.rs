//! Conversational synthesis strategy
//!
//! Filters the ranked chunks through the per-query adaptive threshold,
//! prompts the generation service with the surviving context, and runs the
//! result through the response validator. Degrades to canned answers on
//! empty retrieval or transport failure; never returns an error outward.

use crate::config::RouterConfig;
use crate::knowledge::AnswerMethod;
use crate::preprocess::{adaptive_threshold, ConversationTurn};
use crate::retrieval::{apply_threshold, ScoredChunk};
use crate::strategy::{
    QueryOptions, ResponseStyle, StrategyOutcome, NO_CONTEXT_ANSWER, TRANSPORT_ERROR_ANSWER,
};
use crate::validate;
use crate::worker::channel::RequestChannel;
use crate::worker::protocol::{RequestPayload, ResponsePayload};

/// Token budget for one synthesized answer
const MAX_TOKENS: usize = 160;

/// Low temperature to keep synthesis factual
const TEMPERATURE: f32 = 0.3;

/// Confidence assumed when the generation service reports none
const DEFAULT_GENERATION_CONFIDENCE: f32 = 0.8;

/// How many recent turns are included in the prompt
const PROMPT_TURNS: usize = 2;

/// Synthesize an answer from the chunks surviving the adaptive threshold
pub async fn answer_conversational(
    question: &str,
    ranked: &[ScoredChunk],
    options: &QueryOptions,
    generation: &RequestChannel,
    config: &RouterConfig,
) -> StrategyOutcome {
    let threshold = adaptive_threshold(question, config.similarity_threshold);
    let surviving = apply_threshold(ranked, threshold, config.max_context_chunks);

    if surviving.is_empty() {
        tracing::debug!(
            "no chunks above adaptive threshold {:.2}, returning fallback",
            threshold
        );
        return StrategyOutcome {
            answer: NO_CONTEXT_ANSWER.to_string(),
            confidence: 0.0,
            method: AnswerMethod::Fallback,
            matched_chunks: Vec::new(),
            fallbacks: 1,
            quality_score: None,
        };
    }

    let prompt = build_prompt(question, &surviving, options.style, &options.recent_turns);
    let response = generation
        .send(RequestPayload::Generate {
            prompt,
            max_tokens: MAX_TOKENS,
            temperature: TEMPERATURE,
        })
        .await;

    match response {
        Ok(ResponsePayload::Generated { text, confidence }) => {
            let Some(accepted) = validate::accept_generated(&text) else {
                tracing::debug!("generated text rejected by hallucination filter");
                return StrategyOutcome {
                    answer: NO_CONTEXT_ANSWER.to_string(),
                    confidence: 0.0,
                    method: AnswerMethod::Fallback,
                    matched_chunks: Vec::new(),
                    fallbacks: 1,
                    quality_score: None,
                };
            };

            let confidence = confidence.unwrap_or(DEFAULT_GENERATION_CONFIDENCE);
            let validation =
                validate::validate(question, accepted, confidence, surviving.len());

            let (matched_chunks, fallbacks) = if validation.clear_matched {
                (Vec::new(), 1)
            } else {
                (
                    surviving.iter().map(|c| c.chunk_id.clone()).collect(),
                    0,
                )
            };

            StrategyOutcome {
                answer: validation.answer,
                confidence: validation.confidence.clamp(0.0, 1.0),
                method: AnswerMethod::Generation,
                matched_chunks,
                fallbacks,
                quality_score: Some(validation.quality_score),
            }
        }
        Ok(other) => {
            tracing::warn!("generation returned unexpected payload: {:?}", other);
            transport_error_outcome()
        }
        Err(e) => {
            tracing::warn!("generation request failed: {}", e);
            transport_error_outcome()
        }
    }
}

fn transport_error_outcome() -> StrategyOutcome {
    StrategyOutcome {
        answer: TRANSPORT_ERROR_ANSWER.to_string(),
        confidence: 0.0,
        method: AnswerMethod::Error,
        matched_chunks: Vec::new(),
        fallbacks: 1,
        quality_score: None,
    }
}

/// Build the generation prompt: persona, style tag, context, recent turns
fn build_prompt(
    question: &str,
    chunks: &[ScoredChunk],
    style: ResponseStyle,
    recent_turns: &[ConversationTurn],
) -> String {
    let context = style_context(chunks, style);

    let mut history = String::new();
    for turn in recent_turns.iter().rev().take(PROMPT_TURNS).rev() {
        history.push_str(&format!("Q: {}\nA: {}\n", turn.question, turn.answer));
    }
    let history_section = if history.is_empty() {
        String::new()
    } else {
        format!("\nRecent conversation:\n{}", history)
    };

    let tone = match style {
        ResponseStyle::Developer => "Answer precisely and technically, as one developer to another.",
        ResponseStyle::Hr => "Answer professionally, highlighting achievements and soft skills.",
        ResponseStyle::Friend => "Answer casually and warmly, like chatting with a friend.",
    };

    format!(
        "You are answering questions about a resume in first person. \
         Use only the facts below; do not invent details.\n\
         Style: {}\n{}\n\nFacts:\n{}\n{}\nQuestion: {}\nAnswer:",
        style.tag(),
        tone,
        context,
        history_section,
        question
    )
}

/// Format the surviving chunks per response style
fn style_context(chunks: &[ScoredChunk], style: ResponseStyle) -> String {
    chunks
        .iter()
        .map(|c| match style {
            ResponseStyle::Developer => format!("- [{}] {}", c.chunk_id, c.text),
            ResponseStyle::Hr | ResponseStyle::Friend => format!("- {}", c.text),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Result, VitaeqError};
    use crate::worker::service::InferenceBackend;
    use std::time::Duration;

    struct FixedGeneration {
        text: String,
    }

    impl InferenceBackend for FixedGeneration {
        fn handle(&mut self, request: RequestPayload) -> Result<ResponsePayload> {
            match request {
                RequestPayload::Generate { .. } => Ok(ResponsePayload::Generated {
                    text: self.text.clone(),
                    confidence: None,
                }),
                other => Err(VitaeqError::WorkerRuntime(format!(
                    "unexpected request {:?}",
                    other
                ))),
            }
        }
    }

    async fn spawn(backend: impl InferenceBackend) -> RequestChannel {
        let channel = RequestChannel::spawn(
            "generation",
            Box::new(backend),
            Duration::from_secs(2),
            None,
        )
        .unwrap();
        channel.wait_ready(Duration::from_secs(2)).await.unwrap();
        channel
    }

    fn scored(id: &str, text: &str, similarity: f32) -> ScoredChunk {
        ScoredChunk {
            chunk_id: id.to_string(),
            text: text.to_string(),
            similarity,
        }
    }

    #[tokio::test]
    async fn test_empty_retrieval_returns_fallback() {
        let generation = spawn(FixedGeneration {
            text: "unused".to_string(),
        })
        .await;
        let config = RouterConfig::default();

        // Every chunk sits below the adaptive threshold
        let ranked = vec![scored("c1", "irrelevant", 0.01)];
        let outcome = answer_conversational(
            "What is your deployment architecture experience level?",
            &ranked,
            &QueryOptions::default(),
            &generation,
            &config,
        )
        .await;

        assert_eq!(outcome.answer, NO_CONTEXT_ANSWER);
        assert_eq!(outcome.confidence, 0.0);
        assert_eq!(outcome.method, AnswerMethod::Fallback);
        assert!(outcome.matched_chunks.is_empty());
    }

    #[tokio::test]
    async fn test_successful_synthesis() {
        let generation = spawn(FixedGeneration {
            text: "I have five years of React experience building production apps.".to_string(),
        })
        .await;
        let config = RouterConfig::default();

        let ranked = vec![scored("c1", "Has 5 years of React experience.", 0.9)];
        let outcome = answer_conversational(
            "Describe your React experience",
            &ranked,
            &QueryOptions::default(),
            &generation,
            &config,
        )
        .await;

        assert_eq!(outcome.method, AnswerMethod::Generation);
        assert!((outcome.confidence - 0.8).abs() < 1e-6);
        assert_eq!(outcome.matched_chunks, vec!["c1".to_string()]);
        assert!(outcome.quality_score.is_some());
    }

    #[tokio::test]
    async fn test_denylisted_generation_falls_back() {
        let generation = spawn(FixedGeneration {
            text: "I pivoted the resume into a blockchain whitepaper.".to_string(),
        })
        .await;
        let config = RouterConfig::default();

        let ranked = vec![scored("c1", "Has 5 years of React experience.", 0.9)];
        let outcome = answer_conversational(
            "Tell me about your React experience",
            &ranked,
            &QueryOptions::default(),
            &generation,
            &config,
        )
        .await;

        assert_eq!(outcome.method, AnswerMethod::Fallback);
        assert_eq!(outcome.answer, NO_CONTEXT_ANSWER);
    }

    #[tokio::test]
    async fn test_transport_error_never_raises() {
        struct BrokenGeneration;
        impl InferenceBackend for BrokenGeneration {
            fn handle(&mut self, _request: RequestPayload) -> Result<ResponsePayload> {
                Err(VitaeqError::WorkerRuntime("cuda out of memory".to_string()))
            }
        }

        let generation = spawn(BrokenGeneration).await;
        let config = RouterConfig::default();

        let ranked = vec![scored("c1", "Has 5 years of React experience.", 0.9)];
        let outcome = answer_conversational(
            "Tell me about your React experience",
            &ranked,
            &QueryOptions::default(),
            &generation,
            &config,
        )
        .await;

        assert_eq!(outcome.method, AnswerMethod::Error);
        assert_eq!(outcome.confidence, 0.0);
        assert_eq!(outcome.answer, TRANSPORT_ERROR_ANSWER);
    }

    #[test]
    fn test_prompt_carries_style_and_history() {
        let chunks = vec![scored("skills_db", "Knows PostgreSQL.", 0.8)];
        let turns = vec![ConversationTurn {
            question: "What do you do?".to_string(),
            answer: "I build web apps.".to_string(),
            matched_chunks: vec![],
        }];
        let prompt = build_prompt("What databases?", &chunks, ResponseStyle::Hr, &turns);
        assert!(prompt.contains("Style: hr"));
        assert!(prompt.contains("Knows PostgreSQL."));
        assert!(prompt.contains("Q: What do you do?"));
        assert!(prompt.contains("Question: What databases?"));
        // HR context omits internal chunk ids
        assert!(!prompt.contains("[skills_db]"));
    }
}
