//! InstrumentDescription → ValuationResult
//!
//! Steps (phase `rag`):
//! 0. query construction
//! 1. retrieval of the top-K reference records
//! 2. context assembly under a character budget
//! 3. reasoning-model inference, extraction and validation

use ivs_common::events::{log_codes, MetaValue, Phase};
use ivs_common::extract::extract_and_validate;
use ivs_common::{InstrumentDescription, RetrievedDocument, ValuationResult};
use std::sync::Arc;
use tracing::info;

use super::{meta, EventSink, PipelineError};
use crate::model::ReasoningModel;
use crate::retrieval::RetrievalStore;

/// Query text: one `field: value` line per non-empty field, in fixed order
pub fn build_query(description: &InstrumentDescription) -> String {
    let year = description.year.clone().unwrap_or_default();
    let fields = [
        ("category", description.category.clone()),
        ("brand", description.brand.clone()),
        ("model", description.model.clone()),
        ("year", year),
        ("condition", description.condition.clone()),
        ("materials", description.materials.join(", ")),
        ("features", description.features.join(", ")),
        ("notes", description.notes.clone()),
    ];

    fields
        .iter()
        .filter(|(_, value)| !value.is_empty())
        .map(|(name, value)| format!("{name}: {value}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_reference(doc: &RetrievedDocument) -> String {
    let field = |key: &str| doc.metadata_text(key).unwrap_or_else(|| "unknown".to_string());
    format!(
        "- {} | price_jpy: {} | source: {}\n  {}",
        field("title"),
        field("price_jpy"),
        field("source"),
        doc.content
    )
}

/// Reference blocks in retrieval order, newline-separated, at most
/// `max_chars` characters. The block that crosses the budget is cut on a
/// char boundary and nothing after it is added.
pub fn build_context(docs: &[RetrievedDocument], max_chars: usize) -> String {
    let mut context = String::new();
    let mut used = 0usize;

    for doc in docs {
        let block = format_reference(doc);
        let separator = usize::from(!context.is_empty());
        let block_chars = block.chars().count();

        if used + separator + block_chars <= max_chars {
            if separator == 1 {
                context.push('\n');
            }
            context.push_str(&block);
            used += separator + block_chars;
            continue;
        }

        let remaining = max_chars.saturating_sub(used + separator);
        if remaining > 0 {
            if separator == 1 {
                context.push('\n');
            }
            context.extend(block.chars().take(remaining));
        }
        break;
    }

    context
}

pub struct ValuationPipeline {
    store: Arc<dyn RetrievalStore>,
    model: Arc<dyn ReasoningModel>,
    top_k: usize,
    context_max_chars: usize,
}

impl ValuationPipeline {
    pub fn new(
        store: Arc<dyn RetrievalStore>,
        model: Arc<dyn ReasoningModel>,
        top_k: usize,
        context_max_chars: usize,
    ) -> Self {
        Self {
            store,
            model,
            top_k,
            context_max_chars,
        }
    }

    pub async fn run(
        &self,
        description: &InstrumentDescription,
        sink: &EventSink,
    ) -> Result<ValuationResult, PipelineError> {
        sink.start(0).await?;
        sink.log(log_codes::RAG_QUERY_BUILD).await?;
        let query = build_query(description);
        if query.is_empty() {
            return Err(PipelineError::InvalidInput(
                "Instrument description is empty".to_string(),
            ));
        }
        sink.done(0).await?;

        sink.start(1).await?;
        sink.log(log_codes::RAG_RETRIEVE_START).await?;
        let docs = sink.guard(self.store.query(&query, self.top_k)).await??;
        sink.log_with(
            log_codes::RAG_RETRIEVE_DONE,
            meta([("count", MetaValue::from(docs.len()))]),
        )
        .await?;
        sink.done(1).await?;

        sink.start(2).await?;
        let context = build_context(&docs, self.context_max_chars);
        sink.log_with(
            log_codes::RAG_CONTEXT_BUILD,
            meta([("chars", MetaValue::from(context.chars().count()))]),
        )
        .await?;
        sink.done(2).await?;

        sink.start(3).await?;
        sink.log(log_codes::RAG_REQUEST_SENT).await?;
        let reply = sink.guard(self.model.estimate(&query, &context)).await??;
        sink.report_reply(log_codes::RAG_REASONING, log_codes::RAG_USAGE, &reply)
            .await?;
        let valuation: ValuationResult = extract_and_validate(&reply.text)?;
        sink.log(log_codes::RAG_RESPONSE_PARSED).await?;
        sink.done(3).await?;

        info!(
            price_jpy = valuation.price_jpy,
            low = valuation.range_jpy.0,
            high = valuation.range_jpy.1,
            confidence = valuation.confidence,
            references = docs.len(),
            "Valuation estimated"
        );
        Ok(valuation)
    }

    /// Synchronous variant: same steps, no events
    pub async fn estimate(
        &self,
        description: &InstrumentDescription,
    ) -> Result<ValuationResult, PipelineError> {
        self.run(description, &EventSink::detached(Phase::Rag)).await
    }
}
