//! Question answering over the knowledge store.

use std::sync::Arc;
use std::time::Instant;

use edusage_infer::EmbedderBackend;
use edusage_ingest::{classify, TopicClassification};
use edusage_resolve::{MmrOptions, MmrRetriever};
use edusage_store::SqliteStore;
use tracing::{debug, info, warn};

use crate::prompt::{build_messages, format_context};
use crate::providers::{collect_text, BoxedStream, TextGenerator};
use crate::templates::{select_template, TemplateDescriptor};
use crate::types::{ChatContext, ChatError, ChatMessage, ChatRequest, CompletionResponse};
use crate::validate::{validate_response, ValidationReport};

const EXCERPT_CHARS: usize = 200;

/// Everything decided before generation starts.
pub struct PreparedChat {
    pub topic: TopicClassification,
    pub template: &'static TemplateDescriptor,
    pub context: Vec<ChatContext>,
    pub messages: Vec<ChatMessage>,
}

impl PreparedChat {
    pub fn validate(&self, answer: &str) -> ValidationReport {
        validate_response(answer, self.template)
    }
}

#[derive(Clone)]
pub struct ChatService {
    store: Arc<SqliteStore>,
    embedder: Arc<dyn EmbedderBackend>,
    generator: Option<Arc<dyn TextGenerator>>,
    options: MmrOptions,
}

impl ChatService {
    pub fn new(
        store: Arc<SqliteStore>,
        embedder: Arc<dyn EmbedderBackend>,
        generator: Option<Arc<dyn TextGenerator>>,
        options: MmrOptions,
    ) -> Self {
        Self {
            store,
            embedder,
            generator,
            options,
        }
    }

    pub fn has_provider(&self) -> bool {
        self.generator.is_some()
    }

    fn generator(&self) -> Result<&Arc<dyn TextGenerator>, ChatError> {
        self.generator.as_ref().ok_or(ChatError::NoProvider)
    }

    /// Classify, pick a template, retrieve context and build the messages.
    pub async fn prepare(&self, request: &ChatRequest) -> Result<PreparedChat, ChatError> {
        let question = request.question().ok_or(ChatError::MissingQuestion)?;
        self.generator()?;

        let topic = classify(question);
        let template = select_template(topic.subject);
        debug!(
            "Question classified as {} ({:.2}), template {:?}",
            topic.subject, topic.confidence, template.kind
        );

        let query = self.embedder.embed(question).await?;
        let retrieved = MmrRetriever::search(&self.store, &query, self.options)?;

        let context = retrieved
            .iter()
            .map(|r| ChatContext {
                id: r.chunk.id,
                source: r.chunk.source.clone(),
                excerpt: r.chunk.text.chars().take(EXCERPT_CHARS).collect(),
                score: r.relevance as f64,
            })
            .collect();
        let messages = build_messages(template, &format_context(&retrieved), request.history(), question);

        Ok(PreparedChat {
            topic,
            template,
            context,
            messages,
        })
    }

    /// Token stream for a prepared chat.
    pub fn stream(&self, prepared: &PreparedChat) -> Result<BoxedStream, ChatError> {
        Ok(self.generator()?.generate(prepared.messages.clone()))
    }

    /// Generate a whole answer, regenerating once if it fails validation.
    pub async fn complete(&self, request: &ChatRequest) -> Result<CompletionResponse, ChatError> {
        let start = Instant::now();
        let prepared = self.prepare(request).await?;
        let generator = self.generator()?;

        let mut message = collect_text(generator.generate(prepared.messages.clone())).await?;
        let mut validation = prepared.validate(&message);
        let mut regenerated = false;

        if !validation.passed {
            warn!(
                "Answer had {}/{} practice items, regenerating",
                validation.items_found, validation.required
            );
            let retry = collect_text(generator.generate(prepared.messages.clone())).await?;
            let retry_validation = prepared.validate(&retry);
            regenerated = true;
            if retry_validation.items_found >= validation.items_found {
                message = retry;
                validation = retry_validation;
            }
        }

        let duration = start.elapsed().as_millis() as u64;
        info!(
            "Chat completion: template={:?}, items={}/{}, regenerated={}, {}ms",
            prepared.template.kind, validation.items_found, validation.required, regenerated, duration
        );

        Ok(CompletionResponse {
            message,
            model: generator.model().to_string(),
            topic: prepared.topic,
            template: prepared.template.kind,
            validation,
            regenerated,
            context: prepared.context,
            duration,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::StreamChunk;
    use crate::templates::TemplateKind;
    use edusage_core::{DocumentType, ExtractionMethod, Priority, Subject};
    use edusage_infer::HashEmbedder;
    use edusage_store::{NewChunk, NewUpload, TransitionFields, UploadLedger, UploadStatus};
    use parking_lot::Mutex;

    const DIM: usize = 256;

    /// Replies with queued answers, one per call.
    struct FakeGenerator {
        replies: Mutex<Vec<String>>,
        seen: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl FakeGenerator {
        fn new(replies: &[String]) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.iter().rev().cloned().collect()),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    impl TextGenerator for FakeGenerator {
        fn generate(&self, messages: Vec<ChatMessage>) -> BoxedStream {
            self.seen.lock().push(messages);
            let reply = self.replies.lock().pop().unwrap_or_default();
            Box::pin(futures::stream::iter(vec![
                StreamChunk::Token(reply),
                StreamChunk::Done { tokens_used: 1 },
            ]))
        }

        fn model(&self) -> &str {
            "fake-model"
        }
    }

    fn answer(items: u32) -> String {
        let mut text = String::from("**Concept Overview:** x\n");
        for n in 1..=items {
            text.push_str(&format!("**Question {}:** q\n", n));
        }
        text.push_str("**Assessment Rubric:** r\n");
        text
    }

    fn seeded_store(dir: &tempfile::TempDir) -> Arc<SqliteStore> {
        let store = SqliteStore::open(dir.path(), DIM).unwrap();
        let embedder = HashEmbedder::new(DIM);
        let ledger = UploadLedger::new(&store, 2);
        let file = "Math G5.pdf";
        ledger
            .upsert_pending(&NewUpload {
                file_name: file.into(),
                file_path: file.into(),
                priority: Priority::Regular,
                document_type: DocumentType::Textbook,
                content_hash: None,
            })
            .unwrap();
        ledger
            .transition(file, UploadStatus::Processing, TransitionFields::default())
            .unwrap();
        let texts = [
            "Multiplication rules for whole numbers and fractions",
            "Evaporation turns water into vapour",
        ];
        let chunks: Vec<NewChunk> = texts
            .iter()
            .enumerate()
            .map(|(i, text)| NewChunk {
                text: text.to_string(),
                chunk_index: i,
                total_chunks: texts.len(),
                language: None,
                extraction_method: ExtractionMethod::Direct,
                quality_score: 95.0,
                priority_boost: 1,
                grade_level: Some(5),
                subject_hint: None,
                embedding: Some(embedder.embed_sync(text)),
            })
            .collect();
        ledger
            .complete(file, UploadStatus::Completed, TransitionFields::default(), &chunks)
            .unwrap();
        Arc::new(store)
    }

    fn service(store: Arc<SqliteStore>, generator: Option<Arc<FakeGenerator>>) -> ChatService {
        ChatService::new(
            store,
            Arc::new(HashEmbedder::new(DIM)),
            generator.map(|g| g as Arc<dyn TextGenerator>),
            MmrOptions {
                k: 1,
                ..Default::default()
            },
        )
    }

    fn request(question: &str) -> ChatRequest {
        ChatRequest {
            messages: vec![ChatMessage::user(question)],
        }
    }

    #[tokio::test]
    async fn test_prepare_classifies_and_retrieves() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(seeded_store(&dir), Some(FakeGenerator::new(&[])));

        let prepared = svc.prepare(&request("What are the multiplication rules?")).await.unwrap();
        assert_eq!(prepared.topic.subject, Subject::Mathematics);
        assert_eq!(prepared.template.kind, TemplateKind::Math);
        assert_eq!(prepared.context.len(), 1);
        assert!(prepared.context[0].excerpt.starts_with("Multiplication"));
        assert!(prepared.messages[0].content.contains("Multiplication rules"));
    }

    #[tokio::test]
    async fn test_missing_question_and_provider() {
        let dir = tempfile::tempdir().unwrap();
        let store = seeded_store(&dir);

        let svc = service(store.clone(), Some(FakeGenerator::new(&[])));
        let empty = ChatRequest {
            messages: vec![ChatMessage::user("hi"), ChatMessage::assistant("hello")],
        };
        assert!(matches!(svc.prepare(&empty).await, Err(ChatError::MissingQuestion)));

        let svc = service(store, None);
        assert!(matches!(
            svc.prepare(&request("What is a fraction?")).await,
            Err(ChatError::NoProvider)
        ));
    }

    #[tokio::test]
    async fn test_complete_regenerates_once() {
        let dir = tempfile::tempdir().unwrap();
        let generator = FakeGenerator::new(&[answer(6), answer(10)]);
        let svc = service(seeded_store(&dir), Some(generator.clone()));

        let response = svc.complete(&request("What is Newton's first law?")).await.unwrap();
        assert!(response.regenerated);
        assert!(response.validation.passed);
        assert_eq!(response.template, TemplateKind::Physics);
        assert_eq!(response.model, "fake-model");
        assert_eq!(generator.seen.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_complete_keeps_better_answer() {
        let dir = tempfile::tempdir().unwrap();
        let generator = FakeGenerator::new(&[answer(8), answer(3)]);
        let svc = service(seeded_store(&dir), Some(generator));

        let response = svc.complete(&request("Explain photosynthesis")).await.unwrap();
        assert!(response.regenerated);
        assert!(!response.validation.passed);
        assert_eq!(response.validation.items_found, 8);
    }

    #[tokio::test]
    async fn test_complete_passes_first_time() {
        let dir = tempfile::tempdir().unwrap();
        let generator = FakeGenerator::new(&[answer(10)]);
        let svc = service(seeded_store(&dir), Some(generator.clone()));

        let response = svc.complete(&request("ما هي قواعد الضرب؟")).await.unwrap();
        assert!(!response.regenerated);
        assert_eq!(response.template, TemplateKind::Math);
        assert_eq!(generator.seen.lock().len(), 1);
    }
}
