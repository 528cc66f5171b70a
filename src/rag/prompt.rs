use crate::domain::conversation::{Message, MessageRole};
use crate::vectorstore::ScoredMatch;

/// Grounding instruction prefixed to every generated prompt (spec.md §4.7
/// step 5: "system instruction enforcing grounded answering").
const SYSTEM_INSTRUCTION: &str = "You are a support assistant. Answer only using the passages below. \
If the passages do not contain the answer, say you don't know rather than guessing.";

/// Orders retrieved passages by score descending, tie-breaking by
/// `(document_id, chunk_index)` so prompt composition is deterministic for
/// otherwise-tied matches (spec.md §4.7 step 5).
pub fn order_passages(mut passages: Vec<ScoredMatch>) -> Vec<ScoredMatch> {
    passages.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.metadata.document_id.cmp(&b.metadata.document_id))
            .then_with(|| a.metadata.chunk_index.cmp(&b.metadata.chunk_index))
    });
    passages
}

/// Composes the grounded prompt sent to the generation endpoint: the
/// system instruction, the ordered retrieved passages, then the last
/// `recent_messages` conversation turns (already in chronological order),
/// and finally the new user query (spec.md §4.7 step 5).
pub fn compose(query: &str, passages: &[ScoredMatch], recent_messages: &[Message]) -> String {
    let mut prompt = String::new();
    prompt.push_str(SYSTEM_INSTRUCTION);
    prompt.push_str("\n\n");

    if passages.is_empty() {
        prompt.push_str("No relevant passages were found for this query.\n\n");
    } else {
        prompt.push_str("Passages:\n");
        for (i, passage) in passages.iter().enumerate() {
            prompt.push_str(&format!(
                "[{}] (source: {}, score: {:.3})\n{}\n\n",
                i + 1,
                passage.metadata.filename,
                passage.score,
                passage.metadata.text,
            ));
        }
    }

    if !recent_messages.is_empty() {
        prompt.push_str("Conversation so far:\n");
        for message in recent_messages {
            let speaker = match message.role {
                MessageRole::User => "User",
                MessageRole::Assistant => "Assistant",
            };
            prompt.push_str(&format!("{speaker}: {}\n", message.content));
        }
        prompt.push('\n');
    }

    prompt.push_str(&format!("User: {query}\nAssistant:"));
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::document::ChunkMetadata;
    use uuid::Uuid;

    fn passage(document_id: Uuid, chunk_index: usize, score: f32) -> ScoredMatch {
        ScoredMatch {
            id: format!("{document_id}_{chunk_index}"),
            score,
            metadata: ChunkMetadata {
                org_id: Uuid::new_v4(),
                document_id,
                chunk_index,
                total_chunks: 1,
                text: "some passage text".to_string(),
                filename: "doc.pdf".to_string(),
                uploaded_at: "2026-01-01T00:00:00Z".to_string(),
            },
        }
    }

    #[test]
    fn orders_by_score_descending() {
        let doc = Uuid::new_v4();
        let passages = vec![passage(doc, 0, 0.2), passage(doc, 1, 0.9)];
        let ordered = order_passages(passages);
        assert_eq!(ordered[0].score, 0.9);
        assert_eq!(ordered[1].score, 0.2);
    }

    #[test]
    fn ties_break_by_document_then_chunk_index() {
        let doc_a = Uuid::nil();
        let doc_b = Uuid::max();
        let passages = vec![
            passage(doc_b, 0, 0.5),
            passage(doc_a, 1, 0.5),
            passage(doc_a, 0, 0.5),
        ];
        let ordered = order_passages(passages);
        assert_eq!(ordered[0].metadata.document_id, doc_a);
        assert_eq!(ordered[0].metadata.chunk_index, 0);
        assert_eq!(ordered[1].metadata.document_id, doc_a);
        assert_eq!(ordered[1].metadata.chunk_index, 1);
        assert_eq!(ordered[2].metadata.document_id, doc_b);
    }

    #[test]
    fn empty_passages_use_the_no_sources_template() {
        let prompt = compose("what is the refund policy?", &[], &[]);
        assert!(prompt.contains("No relevant passages were found"));
        assert!(prompt.contains("refund policy"));
    }
}
