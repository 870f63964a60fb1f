//! Process a single utterance and print the structured JSON response.

use carepod_config::AppConfig;
use carepod_engine::TurnRequest;

pub async fn run(
    config: AppConfig,
    patient: &str,
    utterance: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let orchestrator = super::build_orchestrator(config).await;

    let response = orchestrator
        .process_turn(TurnRequest::new(patient, utterance))
        .await?;

    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}
