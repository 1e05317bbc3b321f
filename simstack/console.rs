use std::io::Write as _;

use anyhow::Result;
use indexmap::IndexMap;
use simstack_events::EventKind;
use simstack_orchestrator::{EngineConfig, RunCoordinator, RunRequest};
use simstack_telemetry::Telemetry;
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() -> Result<()> {
    let config = EngineConfig::from_env();
    let telemetry = Telemetry::builder("console")
        .log_path("logs/simstack/console.log.jsonl")
        .build()
        .ok();
    let coordinator = RunCoordinator::bootstrap(config, telemetry)?;
    let mut tap = coordinator.subscribe();

    let printer = tokio::spawn(async move {
        while let Some(event) = tap.recv().await {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{line}"),
                Err(err) => eprintln!("event serialization failed: {err}"),
            }
            if event.kind == EventKind::Done || event.kind == EventKind::Error {
                print_prompt();
            }
        }
    });

    println!("SimStack console ready. Enter a goal to start a run, 'metrics' for the latest snapshot, 'exit' to quit.");
    print_prompt();
    let stdin = tokio::io::stdin();
    let mut lines = BufReader::new(stdin).lines();
    while let Some(line) = lines.next_line().await? {
        let input = line.trim();
        match input {
            "" => print_prompt(),
            "exit" | "quit" => break,
            "metrics" => {
                println!("{}", serde_json::to_string(&coordinator.metrics())?);
                print_prompt();
            }
            goal => {
                match coordinator.submit(RunRequest::new(goal, IndexMap::new())) {
                    Ok(ack) => println!("run {}", ack.status),
                    Err(err) => {
                        eprintln!("rejected: {err}");
                        print_prompt();
                    }
                }
            }
        }
    }

    printer.abort();
    Ok(())
}

fn print_prompt() {
    print!("goal> ");
    let _ = std::io::stdout().flush();
}
