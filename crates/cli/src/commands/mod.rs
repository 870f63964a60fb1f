//! CLI command implementations and shared wiring.

pub mod chat;
pub mod doctor;
pub mod turn;

use std::sync::Arc;

use carepod_config::AppConfig;
use carepod_core::audit::TracingSink;
use carepod_core::completion::CompletionService;
use carepod_core::knowledge::{ChunkMetadata, KnowledgeChunk};
use carepod_engine::{LoggingHandoff, Orchestrator};
use carepod_persistence::InMemorySessionStore;
use carepod_providers::{FailingCompletion, HttpCompletionService};
use carepod_retrieval::{HashingEmbedder, InMemoryKnowledgeIndex};

/// Load configuration from the given path, or defaults + env otherwise.
pub fn load_config(path: Option<&str>) -> Result<AppConfig, Box<dyn std::error::Error>> {
    match path {
        Some(path) => Ok(AppConfig::load(path)?),
        None => Ok(AppConfig::from_env()),
    }
}

/// Build a fully wired orchestrator for CLI use.
///
/// Without an API key the completion service is a stub that always fails,
/// which exercises the engine's degraded keyword path; triage and
/// escalation still work.
pub async fn build_orchestrator(config: AppConfig) -> Orchestrator {
    let completion: Arc<dyn CompletionService> = if config.completion.api_key.is_some() {
        match HttpCompletionService::from_config(&config.completion) {
            Ok(service) => Arc::new(service),
            Err(e) => {
                tracing::warn!(error = %e, "Completion service unavailable; degraded mode");
                Arc::new(FailingCompletion::timeout())
            }
        }
    } else {
        tracing::warn!("No CAREPOD_API_KEY set; running in degraded keyword mode");
        Arc::new(FailingCompletion::timeout())
    };

    let index = Arc::new(InMemoryKnowledgeIndex::new());
    index.insert_all(demo_corpus()).await;

    Orchestrator::new(
        completion,
        index,
        Arc::new(HashingEmbedder::new()),
        Arc::new(InMemorySessionStore::new()),
        Arc::new(LoggingHandoff),
        Arc::new(TracingSink),
        config,
    )
}

/// A small built-in guidance corpus for demos.
fn demo_corpus() -> Vec<KnowledgeChunk> {
    fn chunk(id: &str, text: &str, conditions: &[&str], contraindications: &[&str]) -> KnowledgeChunk {
        KnowledgeChunk {
            id: id.into(),
            text: text.into(),
            metadata: ChunkMetadata {
                conditions: conditions.iter().map(|s| s.to_string()).collect(),
                contraindications: contraindications.iter().map(|s| s.to_string()).collect(),
                severity_class: 5,
                source: "demo-corpus".into(),
                updated_at: None,
            },
        }
    }

    vec![
        chunk(
            "cardiac-001",
            "Sudden chest pain, especially with shortness of breath, sweating, or \
             radiation to the arm or jaw, warrants immediate emergency evaluation.",
            &["chest pain", "shortness of breath"],
            &[],
        ),
        chunk(
            "resp-001",
            "New difficulty breathing at rest should be assessed urgently, \
             particularly with a history of asthma or COPD.",
            &["trouble breathing", "asthma", "copd"],
            &[],
        ),
        chunk(
            "neuro-001",
            "A sudden, severe headache unlike previous headaches needs urgent \
             assessment; typical tension headaches respond to rest and fluids.",
            &["headache"],
            &[],
        ),
        chunk(
            "gi-001",
            "Persistent vomiting beyond 24 hours risks dehydration; seek care if \
             unable to keep fluids down.",
            &["nausea", "vomiting"],
            &[],
        ),
        chunk(
            "fever-001",
            "Adult fever above 39.4C, or any fever lasting more than three days, \
             should be evaluated by a clinician.",
            &["fever"],
            &[],
        ),
        chunk(
            "analgesic-001",
            "Ibuprofen can ease headache and muscle pain; avoid with NSAID allergy \
             or certain kidney conditions.",
            &["headache", "pain"],
            &["ibuprofen", "nsaid"],
        ),
    ]
}
