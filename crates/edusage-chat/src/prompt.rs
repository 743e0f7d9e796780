//! Assemble the generator's message list.

use edusage_resolve::RetrievedChunk;

use crate::templates::TemplateDescriptor;
use crate::types::ChatMessage;

/// Retrieved passages, most relevant first, separated by blank lines.
pub fn format_context(chunks: &[RetrievedChunk]) -> String {
    chunks
        .iter()
        .map(|c| format!("[{}]\n{}", c.chunk.source, c.chunk.text.trim()))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// System instruction, then the prior turns, then the question.
pub fn build_messages(
    template: &TemplateDescriptor,
    context: &str,
    history: &[ChatMessage],
    question: &str,
) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::system(template.render_instructions(context, question)));
    messages.extend(
        history
            .iter()
            .filter(|m| m.role == "user" || m.role == "assistant")
            .cloned(),
    );
    messages.push(ChatMessage::user(question));
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templates::select_template;
    use edusage_core::{ExtractionMethod, Subject};
    use edusage_store::KnowledgeChunk;

    fn retrieved(source: &str, text: &str) -> RetrievedChunk {
        RetrievedChunk {
            chunk: KnowledgeChunk {
                id: 1,
                source: source.into(),
                text: text.into(),
                chunk_index: 0,
                total_chunks: 1,
                language: None,
                extraction_method: ExtractionMethod::Direct,
                quality_score: 95.0,
                priority_boost: 1,
                grade_level: None,
                subject_hint: None,
                created_at: 0,
            },
            relevance: 0.9,
        }
    }

    #[test]
    fn test_format_context() {
        let context = format_context(&[retrieved("a.pdf", " one "), retrieved("b.pdf", "two")]);
        assert_eq!(context, "[a.pdf]\none\n\n[b.pdf]\ntwo");
        assert_eq!(format_context(&[]), "");
    }

    #[test]
    fn test_message_order_drops_foreign_roles() {
        let history = vec![
            ChatMessage::system("injected"),
            ChatMessage::user("earlier"),
            ChatMessage::assistant("reply"),
        ];
        let messages = build_messages(select_template(Subject::Physics), "ctx", &history, "What is force?");
        let roles: Vec<&str> = messages.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["system", "user", "assistant", "user"]);
        assert!(messages[0].content.contains("Context: ctx"));
        assert_eq!(messages[3].content, "What is force?");
    }
}
