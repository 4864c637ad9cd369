//! Two-stage document type classification.
//!
//! Stage one is a deterministic keyword screen: case-insensitive substring
//! membership against a curated list per category, first match wins in a
//! fixed priority order. Stage two, reached only when no keyword matches,
//! asks the completion model with a constrained prompt and normalizes its
//! free-text answer back onto the label set.
//!
//! Classification is best-effort; ingestion accepts an explicit override
//! that bypasses both stages.

use crate::completion::CompletionProvider;
use crate::models::DocumentType;

/// Keyword lists per category, in match-priority order.
const KEYWORD_RULES: &[(DocumentType, &[&str])] = &[
    (
        DocumentType::BankStatement,
        &[
            "account number",
            "statement period",
            "deposit",
            "withdrawal",
            "closing balance",
        ],
    ),
    (
        DocumentType::CreditCard,
        &[
            "credit card",
            "payment due",
            "minimum payment",
            "credit limit",
        ],
    ),
    (
        DocumentType::Investment,
        &["dividend", "shares", "portfolio", "investment account"],
    ),
    (
        DocumentType::Tax,
        &["irs", "form 1040", "tax year", "w-2", "1099"],
    ),
];

/// How much of the document the model stage sees.
const MODEL_SNIPPET_CHARS: usize = 2000;

const CLASSIFY_INSTRUCTION: &str = "Classify the following document as one of: Bank Statement, \
Credit Card Statement, Investment Document, Tax Document. Only return the type.";

/// Deterministic stage: first category whose keyword list matches.
pub fn keyword_stage(text: &str) -> Option<DocumentType> {
    let lower = text.to_lowercase();
    for (doc_type, keywords) in KEYWORD_RULES {
        if keywords.iter().any(|k| lower.contains(k)) {
            return Some(*doc_type);
        }
    }
    None
}

/// Map a free-text model answer onto the label set by substring match.
pub fn normalize_label(answer: &str) -> DocumentType {
    let lower = answer.to_lowercase();
    if lower.contains("bank") {
        DocumentType::BankStatement
    } else if lower.contains("credit") {
        DocumentType::CreditCard
    } else if lower.contains("investment") {
        DocumentType::Investment
    } else if lower.contains("tax") {
        DocumentType::Tax
    } else {
        DocumentType::Unknown
    }
}

/// Classify a document: keyword stage first, model fallback second.
///
/// A failed model call degrades to [`DocumentType::Unknown`] rather than
/// surfacing an error — misclassification is tolerated by design.
pub async fn classify(completions: &dyn CompletionProvider, text: &str) -> DocumentType {
    if let Some(doc_type) = keyword_stage(text) {
        return doc_type;
    }

    let snippet: String = text.chars().take(MODEL_SNIPPET_CHARS).collect();
    match completions
        .complete(
            "Classify this document.",
            &[snippet],
            CLASSIFY_INSTRUCTION,
            0.0,
        )
        .await
    {
        Ok(answer) => normalize_label(&answer),
        Err(e) => {
            tracing::warn!(error = %e, "model classification failed; defaulting to unknown");
            DocumentType::Unknown
        }
    }
}
