//! Autobahn testsuite runner: fetch the case count, echo every case back,
//! then update the reports.
//!
//! Usage: `cargo run --example autobahn [ws://localhost:9001]`

use rfc_ws::Connection;

const AGENT: &str = "rfc-ws";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let base = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "ws://localhost:9001".to_string());

    let mut ws = Connection::open(&format!("{}/getCaseCount", base), None)?;
    let count: u32 = match ws.receive()? {
        Some(msg) => msg.as_text().unwrap_or("0").parse()?,
        None => 0,
    };
    let _ = ws.close(1000, None);

    for case in 1..=count {
        println!("{}/{}", case, count);
        let url = format!("{}/runCase?case={}&agent={}", base, case, AGENT);
        let mut ws = match Connection::open(&url, None) {
            Ok(ws) => ws,
            Err(e) => {
                eprintln!("case {}: open failed: {}", case, e);
                continue;
            }
        };
        loop {
            match ws.receive() {
                Ok(Some(msg)) => {
                    let binary = msg.is_binary();
                    if ws.send(msg.as_bytes(), binary).is_err() {
                        break;
                    }
                }
                // Closed cleanly, or the connection aborted after a
                // protocol violation; either way the case is over.
                Ok(None) | Err(_) => break,
            }
        }
    }

    println!("updating reports and shutting down");
    let mut ws = Connection::open(&format!("{}/updateReports?agent={}", base, AGENT), None)?;
    let _ = ws.receive();
    Ok(())
}
