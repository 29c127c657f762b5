use memmert_atmoweb::{AtmoWebClient, MessageLogMode, ParameterKey};
use std::env;
use std::time::Duration;

#[tokio::main]
async fn main() -> memmert_atmoweb::Result<()> {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = env::args().collect();
    let host = args.get(1).expect("usage: monitor <ip> [--log <path>]");
    let log_path = args
        .iter()
        .position(|a| a == "--log")
        .and_then(|i| args.get(i + 1));

    let mut builder = AtmoWebClient::builder(host).on_snapshot(|status| {
        let mode = status.mode.as_deref().unwrap_or("?");
        let mut line = format!("[{}] mode: {mode}", status.timestamp.format("%H:%M:%S"));
        for key in ParameterKey::ALL {
            let reading = status.readings.get(&key).copied().flatten();
            let setpoint = status.setpoints.get(&key).copied().flatten();
            if reading.is_none() && setpoint.is_none() {
                continue;
            }
            let fmt = |v: Option<f64>| v.map_or("-".to_string(), |v| format!("{v:.1}"));
            line.push_str(&format!(
                " | {}: {} / {}{}",
                key.name(),
                fmt(reading),
                fmt(setpoint),
                key.unit()
            ));
        }
        println!("{line}");
    });

    if let Some(path) = log_path {
        println!("Logging status to {path}");
        builder = builder.message_log(MessageLogMode::Diffed, path);
    }

    let mut client = builder.build()?;
    println!("Monitoring {}...", client.url());

    loop {
        client.status().await;
        tokio::time::sleep(Duration::from_secs(30)).await;
    }
}
