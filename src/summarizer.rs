//! Summarizer collaborator contract and prompt construction.
//!
//! The orchestration core never talks to a concrete language model; it hands
//! a structured context to whatever implements [`Summarizer`]. Synthesis is
//! fallible and always wrapped in a caller-supplied timeout.

use async_trait::async_trait;

use crate::dispatch::ProviderResult;
use crate::errors::AppError;

/// External text-generation service that phrases the final answer.
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Produces the final response string for a query from the structured
    /// provider context.
    async fn synthesize(
        &self,
        query: &str,
        structured_context: &str,
        language: &str,
        style: &str,
    ) -> Result<String, AppError>;
}

/// System prompt shared by every synthesis call.
pub fn system_prompt(language: &str, style: &str) -> String {
    let style_instruction = match style {
        "casual" => "Use friendly and conversational language.",
        "technical" => "Use precise technical terminology with explanations.",
        "simple" => "Use simple language suitable for beginners.",
        _ => "Use professional, clear, and concise language.",
    };

    format!(
        "You are a financial assistant providing clear, accurate answers using \
         information from multiple sources.\n\n\
         **Language:** {language}\n\
         **Style:** {style_instruction}\n\n\
         **SOURCE HANDLING:**\n\
         - Use only the sources provided in the context blocks.\n\
         - Mention sources inline naturally.\n\
         - If information conflicts, present it neutrally and cite all relevant sources.\n\n\
         **RESPONSE STRUCTURE:**\n\
         1. Provide a clear, direct answer to the main question.\n\
         2. Give additional details if needed, but keep it readable.\n\
         3. At the end, list all sources clearly.\n"
    )
}

/// Converts provider results into the structured context block the
/// summarizer synthesizes from.
pub fn build_provider_summary(query: &str, results: &[ProviderResult]) -> String {
    let mut summary = String::new();
    let divider = "=".repeat(60);

    for result in results {
        let sources_text = if result.sources.is_empty() {
            "No sources available.".to_string()
        } else {
            result
                .sources
                .iter()
                .enumerate()
                .map(|(i, s)| format!("[Source {}] {} (score {})", i + 1, s.label, s.score))
                .collect::<Vec<_>>()
                .join("\n")
        };

        summary.push_str(&format!(
            "{divider}\nPROVIDER: {}\nQUERY: {query}\n{divider}\n\nRESPONSE:\n{}\n{sources_text}\n\n",
            result.provider.as_str().to_uppercase(),
            result.content.as_text(),
        ));
    }

    summary
}

/// Full prompt for the normal synthesis path.
pub fn build_synthesis_prompt(
    query: &str,
    structured_context: &str,
    language: &str,
    style: &str,
) -> String {
    format!(
        "{}\n\nUSER QUERY:\n{query}\n\n{structured_context}\n\nTASK:\n\
         - Answer the user query using ONLY the information above.\n\
         - Follow all system rules strictly.\n\
         - Output a clean, well-structured response.\n",
        system_prompt(language, style)
    )
}

/// Short prompt used when no provider was routed: greetings and off-topic
/// questions get a brief conversational reply instead of provider context.
pub fn build_small_talk_prompt(query: &str, language: &str, style: &str) -> String {
    format!(
        "{}\n\nUser Query: {query}\n\nTASK: Respond to the user's query in a concise, friendly way:\n\
         - If it's a greeting, respond simply (1-2 sentences max)\n\
         - If it's a non-financial question, politely explain you specialize in financial topics\n\
         - Keep it SHORT and natural\n\
         - Do NOT mention providers, tools, or technical details\n\
         - Respond in {language} using {style} style\n",
        system_prompt(language, style)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::ResultStatus;
    use crate::providers::{ProviderContent, ProviderId, SourceAttribution};

    #[test]
    fn summary_includes_content_and_sources() {
        let results = vec![ProviderResult {
            provider: ProviderId::News,
            status: ResultStatus::Success,
            content: ProviderContent::Text("Markets rallied today.".into()),
            sources: vec![SourceAttribution::new("reuters.com", 0.9)],
            raw: None,
        }];

        let summary = build_provider_summary("market news", &results);
        assert!(summary.contains("PROVIDER: NEWS"));
        assert!(summary.contains("Markets rallied today."));
        assert!(summary.contains("reuters.com"));
    }

    #[test]
    fn system_prompt_reflects_style() {
        assert!(system_prompt("English", "casual").contains("conversational"));
        assert!(system_prompt("English", "unknown").contains("professional"));
    }
}
