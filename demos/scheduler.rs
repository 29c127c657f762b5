use memmert_atmoweb::{
    AtmoWebClient, JsonFileStore, NaiveTimePolicy, RunOutcome, ScheduleDocument, ScheduleEngine,
};
use std::env;
use std::time::Duration;

/// usage: scheduler <ip> <schedule.json> [--once] [--hours <h>] [--state <executed.json>]
#[tokio::main]
async fn main() -> memmert_atmoweb::Result<()> {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = env::args().collect();
    let host = args.get(1).expect("usage: scheduler <ip> <schedule.json>");
    let schedule_path = args.get(2).expect("usage: scheduler <ip> <schedule.json>");
    let once = args.iter().any(|a| a == "--once");
    let flag = |name: &str| {
        args.iter()
            .position(|a| a == name)
            .and_then(|i| args.get(i + 1))
            .cloned()
    };

    // Load errors are fatal before any polling starts.
    let document = ScheduleDocument::from_path(schedule_path, NaiveTimePolicy::Utc)?;
    let client = AtmoWebClient::builder(host).build()?;

    let mut builder = ScheduleEngine::builder(client, document).on_event(|event| {
        println!("{event:?}");
    });
    if let Some(hours) = flag("--hours").and_then(|h| h.parse::<f64>().ok()) {
        builder = builder.max_duration(Duration::from_secs_f64(hours * 3600.0));
    }
    if let Some(path) = flag("--state") {
        builder = builder.store(JsonFileStore::new(path));
    }
    let mut engine = builder.build()?;

    if once {
        engine.run_once(chrono::Utc::now()).await;
        return Ok(());
    }

    // ctrl_c() registers its handler on first poll; do that before the first
    // check so an early Ctrl-C cannot kill the process mid-write.
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    tokio::select! {
        biased;
        _ = &mut ctrl_c => {
            println!("Stopped by user.");
            return Ok(());
        }
        _ = std::future::ready(()) => {}
    }

    let shutdown = async move {
        if let Err(e) = ctrl_c.await {
            eprintln!("failed to listen for ctrl-c: {e}");
            std::future::pending::<()>().await;
        }
    };
    match engine.run_continuous(shutdown).await {
        RunOutcome::Exhausted => println!("Schedule complete."),
        RunOutcome::DurationElapsed => println!("Duration elapsed."),
        RunOutcome::Stopped => println!("Stopped by user."),
    }
    Ok(())
}
