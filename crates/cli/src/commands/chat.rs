//! Interactive triage session on stdin.

use std::io::{BufRead, Write};

use carepod_config::AppConfig;
use carepod_engine::TurnRequest;

pub async fn run(config: AppConfig, patient: &str) -> Result<(), Box<dyn std::error::Error>> {
    let orchestrator = super::build_orchestrator(config).await;

    println!("carepod triage session for '{patient}'. Type 'quit' to exit.");
    println!("Note: this tool does not replace professional medical advice.\n");

    let stdin = std::io::stdin();
    loop {
        print!("you> ");
        std::io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let utterance = line.trim();
        if utterance.is_empty() {
            continue;
        }
        if utterance.eq_ignore_ascii_case("quit") || utterance.eq_ignore_ascii_case("exit") {
            orchestrator
                .sessions()
                .close_session(&patient.into())
                .await?;
            println!("Session closed. Take care.");
            break;
        }

        match orchestrator
            .process_turn(TurnRequest::new(patient, utterance))
            .await
        {
            Ok(response) => {
                println!("\ncarepod> {}", response.agent_response);
                println!(
                    "  triage: {}/10 ({}){}",
                    response.triage.score,
                    response.triage.level,
                    if response.degraded { " [degraded]" } else { "" }
                );
                println!("  action: {}", response.triage.recommended_action);
                if response.escalation.required {
                    println!(
                        "  escalation: {} ({})",
                        response.escalation.level, response.escalation.provider_type
                    );
                    for instruction in &response.escalation.instructions {
                        println!("    - {instruction}");
                    }
                }
                for item in &response.knowledge {
                    println!("  guidance [{}]: {}", item.source, item.text);
                }
                println!();
            }
            Err(e) => eprintln!("turn failed: {e}"),
        }
    }

    Ok(())
}
