//! Extractive fact-retrieval strategy
//!
//! One EQA request over the concatenated context of the supplied chunks.
//! The extractive answer is accepted as-is, with no validator pass, only
//! when it is non-empty, at least two characters after trimming, and at or
//! above the configured confidence threshold. Anything else, including a
//! transport error, delegates unconditionally to the conversational
//! strategy with the same chunks; a fallback, not a retry.

use crate::config::RouterConfig;
use crate::knowledge::AnswerMethod;
use crate::retrieval::ScoredChunk;
use crate::strategy::{answer_conversational, QueryOptions, StrategyOutcome};
use crate::worker::channel::RequestChannel;
use crate::worker::protocol::{RequestPayload, ResponsePayload};

/// Minimum trimmed length of an acceptable extractive answer
const MIN_ANSWER_LEN: usize = 2;

/// Answer `question` extractively, falling back to synthesis on any
/// unacceptable EQA output
pub async fn answer_fact(
    question: &str,
    ranked: &[ScoredChunk],
    options: &QueryOptions,
    eqa: &RequestChannel,
    generation: &RequestChannel,
    config: &RouterConfig,
) -> StrategyOutcome {
    let context: String = ranked
        .iter()
        .map(|c| c.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    let response = eqa
        .send(RequestPayload::ExtractAnswer {
            question: question.to_string(),
            context,
        })
        .await;

    match response {
        Ok(ResponsePayload::ExtractedAnswer { answer, confidence }) => {
            let trimmed = answer.trim();
            if trimmed.len() >= MIN_ANSWER_LEN && confidence >= config.eqa_confidence_threshold {
                tracing::debug!(
                    "eqa accepted answer with confidence {:.2}",
                    confidence
                );
                return StrategyOutcome {
                    answer: trimmed.to_string(),
                    confidence: confidence.clamp(0.0, 1.0),
                    method: AnswerMethod::Eqa,
                    matched_chunks: ranked.iter().map(|c| c.chunk_id.clone()).collect(),
                    fallbacks: 0,
                    quality_score: None,
                };
            }
            tracing::debug!(
                "eqa answer rejected (len {}, confidence {:.2}), delegating to synthesis",
                trimmed.len(),
                confidence
            );
        }
        Ok(other) => {
            tracing::warn!("eqa returned unexpected payload: {:?}", other);
        }
        Err(e) => {
            tracing::warn!("eqa request failed, delegating to synthesis: {}", e);
        }
    }

    let mut outcome = answer_conversational(question, ranked, options, generation, config).await;
    outcome.fallbacks += 1;
    outcome
}
