#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// End-to-end tests for the ingestion and question-answering pipeline,
// with the external services replaced by in-process mocks.

use serde_json::json;
use std::path::PathBuf;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use textbook_rag::chunker::{ChunkLimits, chunk_chapter};
use textbook_rag::config::{
    Config, EmbedderConfig, GenerationConfig, RetrievalConfig, VectorStoreConfig,
};
use textbook_rag::embeddings::{Embedder, EmbeddingClient};
use textbook_rag::generation::ChatClient;
use textbook_rag::index::SearchFilter;
use textbook_rag::index::ephemeral::EphemeralIndex;
use textbook_rag::index::qdrant::QdrantIndex;
use textbook_rag::orchestrator::{Orchestrator, QueryOutcome};
use textbook_rag::tokenizer::{HeuristicTokenizer, TokenCounter};

struct ConstantEmbedder;

impl Embedder for ConstantEmbedder {
    fn embed(&self, _text: &str) -> textbook_rag::Result<Vec<f32>> {
        Ok(vec![1.0, 0.0, 0.0])
    }

    fn embed_many(&self, texts: &[String]) -> textbook_rag::Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|_| vec![1.0, 0.0, 0.0]).collect())
    }
}

fn sample_chapter() -> String {
    let long_section = "Inverse kinematics determines joint angles for a desired pose. ".repeat(75);
    format!(
        "# Kinematics\n\nThis chapter introduces the study of motion.\n\n\
         ## Forward Kinematics\n\nForward kinematics maps joint angles to end effector poses.\n\n\
         ## Inverse Kinematics\n\n{long_section}\n"
    )
}

#[test]
fn chapter_ingestion_produces_bounded_passages() {
    let limits = ChunkLimits::default();
    let passages = chunk_chapter(
        &sample_chapter(),
        3,
        "chapter-3.md",
        limits,
        &HeuristicTokenizer,
    );

    // One passage per small section plus a split of the long one.
    let long: Vec<_> = passages.iter().filter(|p| p.section == "3.2").collect();
    assert_eq!(long.len(), 2);

    for passage in &passages {
        assert!(passage.token_count <= limits.max_tokens);
        assert_eq!(passage.chapter, 3);
        assert_eq!(passage.source_document, "chapter-3.md");
    }

    let reassembled: Vec<&str> = long
        .iter()
        .flat_map(|p| p.text.split_whitespace())
        .collect();
    let original_words = sample_chapter();
    let expected: Vec<&str> = original_words
        .split("## Inverse Kinematics")
        .nth(1)
        .expect("long section present")
        .split_whitespace()
        .collect();
    assert_eq!(reassembled, expected);
}

#[test]
fn short_selection_becomes_one_ephemeral_passage() {
    let selection = "Robots grip objects."; // 20 chars
    let index = EphemeralIndex::build(
        selection,
        ChunkLimits::default(),
        &HeuristicTokenizer,
        &ConstantEmbedder,
    )
    .expect("build");

    assert_eq!(index.len(), 1);
    let hits = index.search(&[1.0, 0.0, 0.0], 5, 0.0);
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].passage_id, "selected-000");
    assert_eq!(hits[0].text, selection);
}

#[test]
fn ephemeral_passages_respect_token_budgets() {
    let selection = "The controller compensates for gravity and friction. ".repeat(120);
    let limits = ChunkLimits::default();
    let index =
        EphemeralIndex::build(&selection, limits, &HeuristicTokenizer, &ConstantEmbedder)
            .expect("build");

    assert!(index.len() > 1);
    for hit in index.search(&[1.0, 0.0, 0.0], 100, 0.0) {
        assert!(HeuristicTokenizer.count(&hit.text) <= limits.max_tokens);
        assert!(hit.passage_id.starts_with("selected-"));
    }
}

fn test_config(embed_uri: String, store_uri: String, chat_uri: String) -> Config {
    Config {
        embedder: EmbedderConfig {
            base_url: embed_uri,
            model: "test-embed".to_string(),
            dimension: 3,
            batch_size: 16,
        },
        vector_store: VectorStoreConfig {
            base_url: store_uri,
            api_key: None,
            collection: "textbook_chunks_v1".to_string(),
            timeout_seconds: 5,
            upload_batch_size: 100,
        },
        generation: GenerationConfig {
            base_url: chat_uri,
            api_key: Some("test-key".to_string()),
            model: "test-chat".to_string(),
            max_tokens: 256,
            temperature: 0.3,
            ..GenerationConfig::default()
        },
        chunking: ChunkLimits::default(),
        retrieval: RetrievalConfig::default(),
        base_dir: PathBuf::new(),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn full_question_pipeline_over_http_boundaries() {
    let embed_server = MockServer::start().await;
    let store_server = MockServer::start().await;
    let chat_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "embeddings": [[1.0, 0.0, 0.0]] })),
        )
        .expect(1)
        .mount(&embed_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/collections/textbook_chunks_v1/points/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": [{
                "id": "p1",
                "score": 0.91,
                "payload": {
                    "text": "Inverse kinematics determines joint angles for a desired pose.",
                    "chapter": 3,
                    "section": "3.2",
                    "anchor": "inverse-kinematics",
                    "token_count": 12,
                    "sequence_index": 0,
                    "source_document": "chapter-3.md",
                },
            }],
        })))
        .expect(1)
        .mount(&store_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": "Joint angles come from inverse kinematics [Chapter 3, Section 3.2].",
                },
            }],
        })))
        .expect(1)
        .mount(&chat_server)
        .await;

    let config = test_config(embed_server.uri(), store_server.uri(), chat_server.uri());
    let outcome = tokio::task::spawn_blocking(move || {
        let embedder = EmbeddingClient::new(&config.embedder).expect("embedder");
        let index = QdrantIndex::new(&config.vector_store, config.embedder.dimension)
            .expect("index")
            .with_retry_attempts(1);
        let generator = ChatClient::new(&config.generation).expect("generator");
        let orchestrator =
            Orchestrator::new(&embedder, &index, &generator, &HeuristicTokenizer, &config);

        orchestrator
            .answer_question("How are joint angles computed?", &SearchFilter::default())
            .expect("query")
    })
    .await
    .expect("task panicked");

    match outcome {
        QueryOutcome::Answered {
            answer, citations, ..
        } => {
            assert!(answer.contains("inverse kinematics"));
            assert_eq!(citations.len(), 1);
            assert_eq!(citations[0].passage_id, "p1");
            assert_eq!(citations[0].source, "Chapter 3, Section 3.2");
            assert!(citations[0].text_preview.starts_with("Inverse kinematics"));
        }
        QueryOutcome::NotFound { .. } => panic!("expected an answer"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn ingest_then_search_round_trip_over_http_boundaries() {
    let embed_server = MockServer::start().await;
    let store_server = MockServer::start().await;

    // The sample chapter yields four passages: the chapter intro, the
    // short section, and the long section split in two.
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "embeddings": [
                [1.0, 0.0, 0.0],
                [0.0, 1.0, 0.0],
                [0.0, 0.0, 1.0],
                [1.0, 0.0, 0.0],
            ],
        })))
        .mount(&embed_server)
        .await;

    Mock::given(method("PUT"))
        .and(path("/collections/textbook_chunks_v1/points"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": {} })))
        .expect(1)
        .mount(&store_server)
        .await;

    let config = test_config(
        embed_server.uri(),
        store_server.uri(),
        "http://localhost:1".to_string(),
    );
    let stored = tokio::task::spawn_blocking(move || {
        let embedder = EmbeddingClient::new(&config.embedder).expect("embedder");
        let index = QdrantIndex::new(&config.vector_store, config.embedder.dimension)
            .expect("index")
            .with_retry_attempts(1);

        let passages = chunk_chapter(
            &sample_chapter(),
            3,
            "chapter-3.md",
            config.chunking,
            &HeuristicTokenizer,
        );
        assert_eq!(passages.len(), 4);

        let texts: Vec<String> = passages.iter().map(|p| p.text.clone()).collect();
        let vectors = embedder.embed_many(&texts).expect("embed");
        index.upsert(&passages, &vectors).expect("upsert")
    })
    .await
    .expect("task panicked");

    assert_eq!(stored, 4);
}
