//! Grounded prompt assembly for the generation call.

use crate::llm::{ChatMessage, Role};
use crate::types::PassageRecord;

/// Answer strictly from context; the refusal sentence is what the evaluator's
/// refusal check is tuned to recognise.
pub const SYSTEM_PROMPT: &str = r#"You are a Clearpath customer support assistant.
Answer ONLY using the provided context from Clearpath documentation.
If the answer is not in the context, say:
"I don't have enough information from the documentation to answer that."
Do NOT make up information. Do NOT hallucinate.
Be helpful, clear, and concise. Format your answers with proper structure when appropriate."#;

pub const NO_CONTEXT_PLACEHOLDER: &str = "No relevant documentation found.";

/// One block per passage with a source header, separated by blank lines.
pub fn build_context(passages: &[PassageRecord]) -> String {
    if passages.is_empty() {
        return NO_CONTEXT_PLACEHOLDER.to_string();
    }
    passages
        .iter()
        .map(|p| {
            format!(
                "[Source: {}, Chunk #{}, Similarity: {}]\n{}",
                p.document_name, p.id, p.similarity_score, p.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// System prompt, prior turns, then the context-bearing user turn.
pub fn build_messages(
    system_prompt: &str,
    history: &[ChatMessage],
    context: &str,
    query: &str,
) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::new(Role::System, system_prompt));
    messages.extend(history.iter().cloned());
    messages.push(ChatMessage::new(
        Role::User,
        format!(
            "Context from Clearpath documentation:\n---\n{}\n---\n\nUser question: {}",
            context, query
        ),
    ));
    messages
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passage(id: u64, doc: &str, text: &str, score: f32) -> PassageRecord {
        PassageRecord {
            id,
            document_name: doc.to_string(),
            text: text.to_string(),
            similarity_score: score,
        }
    }

    #[test]
    fn test_context_blocks() {
        let context = build_context(&[
            passage(3, "14_Pricing_Sheet.pdf", "Pro is $49/month.", 0.8123),
            passage(9, "09_Integrations_Catalog.pdf", "Slack, Jira.", 0.41),
        ]);
        assert_eq!(
            context,
            "[Source: 14_Pricing_Sheet.pdf, Chunk #3, Similarity: 0.8123]\nPro is $49/month.\n\n\
             [Source: 09_Integrations_Catalog.pdf, Chunk #9, Similarity: 0.41]\nSlack, Jira."
        );
    }

    #[test]
    fn test_empty_context_placeholder() {
        assert_eq!(build_context(&[]), NO_CONTEXT_PLACEHOLDER);
    }

    #[test]
    fn test_messages_order() {
        let history = vec![
            ChatMessage::new(Role::User, "hi"),
            ChatMessage::new(Role::Assistant, "hello"),
        ];
        let messages = build_messages(SYSTEM_PROMPT, &history, "ctx", "what now?");
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[1].content, "hi");
        assert_eq!(messages[3].role, Role::User);
        assert!(messages[3].content.contains("---\nctx\n---"));
        assert!(messages[3].content.ends_with("User question: what now?"));
    }
}
