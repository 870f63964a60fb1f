//! End-to-end turn scenarios against mock collaborators.

use std::sync::Arc;

use carepod_config::{AppConfig, TriageConfig};
use carepod_core::audit::{MemorySink, TracingSink};
use carepod_core::completion::CompletionService;
use carepod_core::error::EscalationError;
use carepod_core::knowledge::{ChunkMetadata, KnowledgeChunk};
use carepod_core::memory::MemoryLayer;
use carepod_core::triage::{EscalationState, UrgencyLevel};
use carepod_engine::{Orchestrator, TurnRequest};
use carepod_persistence::InMemorySessionStore;
use carepod_providers::{FailingCompletion, ScriptedCompletion};
use carepod_retrieval::{HashingEmbedder, InMemoryKnowledgeIndex};
use carepod_triage::{HandoffCase, HandoffChannel};

/// Handoff channel that accepts everything.
struct AcceptingHandoff;

#[async_trait::async_trait]
impl HandoffChannel for AcceptingHandoff {
    async fn dispatch(&self, _case: &HandoffCase) -> Result<(), EscalationError> {
        Ok(())
    }
}

/// Handoff channel that always refuses.
struct DeadHandoff;

#[async_trait::async_trait]
impl HandoffChannel for DeadHandoff {
    async fn dispatch(&self, _case: &HandoffCase) -> Result<(), EscalationError> {
        Err(EscalationError::ChannelUnavailable { attempts: 1 })
    }
}

fn chunk(id: &str, text: &str, conditions: &[&str]) -> KnowledgeChunk {
    KnowledgeChunk {
        id: id.into(),
        text: text.into(),
        metadata: ChunkMetadata {
            conditions: conditions.iter().map(|s| s.to_string()).collect(),
            severity_class: 5,
            source: "test-corpus".into(),
            updated_at: None,
            contraindications: vec![],
        },
    }
}

async fn seeded_index() -> Arc<InMemoryKnowledgeIndex> {
    let index = InMemoryKnowledgeIndex::new();
    index
        .insert_all([
            chunk(
                "cardiac",
                "Sudden chest pain with shortness of breath warrants emergency evaluation",
                &["chest pain", "shortness of breath"],
            ),
            chunk(
                "headache",
                "Most tension headaches resolve with rest, fluids, and time",
                &["headache"],
            ),
        ])
        .await;
    Arc::new(index)
}

/// Extraction reply the scripted completion returns for a chest-pain turn.
const CHEST_PAIN_EXTRACTION: &str = r#"{
    "symptoms": [
        {"name": "chest pain", "severity": 9, "duration": "30 minutes", "red_flag": true},
        {"name": "shortness of breath", "severity": 8, "red_flag": true}
    ],
    "pain_scale": 9
}"#;

const HEADACHE_EXTRACTION: &str = r#"{
    "symptoms": [{"name": "headache", "severity": 2, "duration": "2 days"}]
}"#;

async fn orchestrator_with(
    completion: Arc<dyn CompletionService>,
    handoff: Arc<dyn HandoffChannel>,
    config: AppConfig,
) -> Orchestrator {
    Orchestrator::new(
        completion,
        seeded_index().await,
        Arc::new(HashingEmbedder::new()),
        Arc::new(InMemorySessionStore::new()),
        handoff,
        Arc::new(TracingSink),
        config,
    )
}

fn fast_config() -> AppConfig {
    AppConfig {
        triage: TriageConfig {
            notify_backoff_ms: 1,
            ..Default::default()
        },
        ..Default::default()
    }
}

#[tokio::test]
async fn scenario_a_chest_pain_escalates_in_same_turn() {
    let completion = Arc::new(ScriptedCompletion::new(vec![
        CHEST_PAIN_EXTRACTION.into(),
        "I'm arranging urgent help for you now. Are you alone right now?".into(),
    ]));
    let orchestrator =
        orchestrator_with(completion, Arc::new(AcceptingHandoff), fast_config()).await;

    let response = orchestrator
        .process_turn(TurnRequest::new(
            "p-a",
            "chest pain and shortness of breath, pain 9/10",
        ))
        .await
        .unwrap();

    assert!(response.triage.score >= 8);
    assert_eq!(response.triage.level, UrgencyLevel::Critical);
    assert!(response.escalation.required);
    assert!(!response.degraded);

    // none -> pending -> notified happened inside this turn.
    let state = orchestrator
        .sessions()
        .escalation_state(&"p-a".into())
        .await;
    assert_eq!(state, EscalationState::Notified);
}

#[tokio::test]
async fn scenario_b_mild_headache_stays_unescalated() {
    let completion = Arc::new(ScriptedCompletion::new(vec![
        HEADACHE_EXTRACTION.into(),
        "That sounds uncomfortable. How is your hydration today?".into(),
    ]));
    let orchestrator =
        orchestrator_with(completion, Arc::new(AcceptingHandoff), fast_config()).await;

    let response = orchestrator
        .process_turn(TurnRequest::new("p-b", "mild headache for 2 days"))
        .await
        .unwrap();

    assert!(response.triage.score <= 3);
    assert!(matches!(
        response.triage.level,
        UrgencyLevel::Minimal | UrgencyLevel::Low
    ));
    assert!(!response.escalation.required);

    let state = orchestrator
        .sessions()
        .escalation_state(&"p-b".into())
        .await;
    assert_eq!(state, EscalationState::None);
}

#[tokio::test]
async fn scenario_c_nonsense_query_yields_empty_knowledge_without_error() {
    let completion = Arc::new(ScriptedCompletion::new(vec![
        r#"{"symptoms":[{"name":"xyzzy frobnication","severity":1}]}"#.into(),
        "Could you tell me more about how you're feeling?".into(),
    ]));
    let orchestrator =
        orchestrator_with(completion, Arc::new(AcceptingHandoff), fast_config()).await;

    let response = orchestrator
        .process_turn(TurnRequest::new("p-c", "xyzzy frobnication"))
        .await
        .unwrap();

    assert!(response.knowledge.is_empty());
    assert!(!response.degraded);
}

#[tokio::test]
async fn scenario_d_completion_failure_degrades_but_still_triages() {
    let orchestrator = orchestrator_with(
        Arc::new(FailingCompletion::timeout()),
        Arc::new(AcceptingHandoff),
        fast_config(),
    )
    .await;

    let response = orchestrator
        .process_turn(TurnRequest::new(
            "p-d",
            "severe chest pain, I can't breathe",
        ))
        .await
        .unwrap();

    assert!(response.degraded);
    // Keyword fallback still recognizes the red flag.
    assert_eq!(response.triage.level, UrgencyLevel::Critical);
    assert!(response.triage.score >= 8);
    assert!(!response.agent_response.is_empty());
}

#[tokio::test]
async fn scenario_e_escalation_never_auto_demotes() {
    let completion = Arc::new(ScriptedCompletion::new(vec![
        CHEST_PAIN_EXTRACTION.into(),
        "Help is being arranged.".into(),
        HEADACHE_EXTRACTION.into(),
        "Glad it's easing. Any other symptoms?".into(),
    ]));
    let orchestrator =
        orchestrator_with(completion, Arc::new(AcceptingHandoff), fast_config()).await;
    let patient = "p-e";

    let first = orchestrator
        .process_turn(TurnRequest::new(patient, "crushing chest pain, 9/10"))
        .await
        .unwrap();
    assert!(first.triage.score >= 8);
    assert_eq!(
        orchestrator.sessions().escalation_state(&patient.into()).await,
        EscalationState::Notified
    );

    let second = orchestrator
        .process_turn(TurnRequest::new(patient, "feeling a bit better now"))
        .await
        .unwrap();
    assert!(second.triage.score <= 3);

    // The ratchet holds until an explicit human resolve.
    assert_eq!(
        orchestrator.sessions().escalation_state(&patient.into()).await,
        EscalationState::Notified
    );

    orchestrator
        .sessions()
        .acknowledge_escalation(&patient.into())
        .await
        .unwrap();
    orchestrator
        .sessions()
        .resolve_escalation(&patient.into())
        .await
        .unwrap();
    assert_eq!(
        orchestrator.sessions().escalation_state(&patient.into()).await,
        EscalationState::Resolved
    );
}

#[tokio::test]
async fn dead_handoff_leaves_pending_not_failed() {
    let completion = Arc::new(ScriptedCompletion::new(vec![
        CHEST_PAIN_EXTRACTION.into(),
        "Please seek immediate care.".into(),
    ]));
    let orchestrator =
        orchestrator_with(completion, Arc::new(DeadHandoff), fast_config()).await;

    let response = orchestrator
        .process_turn(TurnRequest::new("p-f", "chest pain 9/10"))
        .await
        .unwrap();

    // The turn itself succeeds; the case is stuck pending for operators.
    assert!(response.escalation.required);
    assert_eq!(
        orchestrator.sessions().escalation_state(&"p-f".into()).await,
        EscalationState::Pending
    );
}

#[tokio::test]
async fn memory_accumulates_across_turns() {
    let completion = Arc::new(ScriptedCompletion::new(vec![
        r#"{"symptoms":[{"name":"dizziness","severity":3}],"conditions":["diabetes"],"age":70}"#
            .into(),
        "Noted. How long has this been going on?".into(),
        r#"{"symptoms":[{"name":"dizziness","severity":3}]}"#.into(),
        "Thanks for the update.".into(),
    ]));
    let orchestrator =
        orchestrator_with(completion, Arc::new(AcceptingHandoff), fast_config()).await;
    let patient = "p-mem";

    let first = orchestrator
        .process_turn(TurnRequest::new(patient, "dizzy, I have diabetes, 70 years old"))
        .await
        .unwrap();

    // Second turn: no conditions in the extraction, but semantic memory
    // remembers, so the chronic modifier and age band still apply.
    let second = orchestrator
        .process_turn(TurnRequest::new(patient, "still dizzy"))
        .await
        .unwrap();

    assert_eq!(first.triage.score, second.triage.score);
    let semantic = orchestrator.memory().semantic(&patient.into()).await;
    assert!(semantic.facts.contains_key("diabetes"));
    assert_eq!(semantic.age, Some(70));

    // Episodic layer recorded both turns.
    let episodic = orchestrator.memory().episodic(&patient.into()).await;
    assert_eq!(episodic.len(), 2);

    // Procedural preferences replace wholesale and persist.
    orchestrator
        .set_preferences(
            &patient.into(),
            carepod_core::memory::ProceduralPrefs {
                tone: Some("brief".into()),
                language: None,
                verbosity: None,
            },
        )
        .await;
    let prefs = orchestrator.memory().procedural(&patient.into()).await;
    assert_eq!(prefs.tone.as_deref(), Some("brief"));
}

#[tokio::test]
async fn audit_events_emitted_for_turn_commit() {
    let sink = Arc::new(MemorySink::new());
    let completion = Arc::new(ScriptedCompletion::new(vec![
        HEADACHE_EXTRACTION.into(),
        "Rest well.".into(),
    ]));
    let orchestrator = Orchestrator::new(
        completion,
        seeded_index().await,
        Arc::new(HashingEmbedder::new()),
        Arc::new(InMemorySessionStore::new()),
        Arc::new(AcceptingHandoff),
        sink.clone(),
        fast_config(),
    );

    orchestrator
        .process_turn(TurnRequest::new("p-audit", "mild headache"))
        .await
        .unwrap();

    assert!(!sink.events_for_layer(MemoryLayer::Working).is_empty());
    assert!(!sink.events_for_layer(MemoryLayer::Episodic).is_empty());
}

#[tokio::test]
async fn identical_turns_for_different_patients_score_identically() {
    let completion = Arc::new(ScriptedCompletion::new(vec![
        HEADACHE_EXTRACTION.into(),
        "Take care.".into(),
        HEADACHE_EXTRACTION.into(),
        "Take care.".into(),
    ]));
    let orchestrator =
        orchestrator_with(completion, Arc::new(AcceptingHandoff), fast_config()).await;

    let a = orchestrator
        .process_turn(TurnRequest::new("p-x", "mild headache for 2 days"))
        .await
        .unwrap();
    let b = orchestrator
        .process_turn(TurnRequest::new("p-y", "mild headache for 2 days"))
        .await
        .unwrap();

    assert_eq!(a.triage.score, b.triage.score);
    assert_eq!(a.triage.reasoning, b.triage.reasoning);
}

#[tokio::test]
async fn knowledge_list_bounded_by_top_k() {
    let completion = Arc::new(ScriptedCompletion::new(vec![
        HEADACHE_EXTRACTION.into(),
        "Rest and fluids.".into(),
    ]));
    let config = AppConfig {
        retrieval: carepod_config::RetrievalConfig {
            top_k: 1,
            ..Default::default()
        },
        ..fast_config()
    };
    let orchestrator = orchestrator_with(completion, Arc::new(AcceptingHandoff), config).await;

    let response = orchestrator
        .process_turn(TurnRequest::new("p-k", "headache"))
        .await
        .unwrap();
    assert!(response.knowledge.len() <= 1);
}
