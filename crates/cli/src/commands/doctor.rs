//! Check configuration and wiring.

use carepod_config::AppConfig;

pub fn run(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    config.validate()?;
    println!("configuration: ok");
    println!("  escalation threshold : {}", config.triage.escalation_threshold);
    println!("  notify attempts      : {}", config.triage.notify_max_attempts);
    println!("  retrieval top-k      : {}", config.retrieval.top_k);
    println!("  relevance floor      : {}", config.retrieval.relevance_floor);
    println!("  episodic retention   : {} days", config.memory.episodic_retention_days);
    println!("  extraction budget    : {} ms", config.engine.extraction_timeout_ms);
    println!("  step budget          : {} ms", config.retrieval.step_timeout_ms);
    println!(
        "  completion service   : {} ({})",
        config.completion.base_url,
        if config.completion.api_key.is_some() {
            "api key set"
        } else {
            "no api key, degraded keyword mode"
        }
    );
    Ok(())
}
