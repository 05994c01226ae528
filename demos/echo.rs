//! Echo client: send one message, print the reply, close.
//!
//! Usage: `cargo run --example echo [url] [message]`

use rfc_ws::{CloseReason, Connection};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let mut args = std::env::args().skip(1);
    let url = args.next().unwrap_or_else(|| "ws://127.0.0.1:9001/".to_string());
    let message = args.next().unwrap_or_else(|| "hello from rfc-ws".to_string());

    let mut ws = Connection::open(&url, None)?;
    ws.send(message.as_bytes(), false)?;

    match ws.receive()? {
        Some(msg) if msg.is_binary() => {
            println!("binary reply: {} bytes", msg.as_bytes().len())
        }
        Some(msg) => println!("reply: {}", msg.as_text().unwrap_or("")),
        None => println!("peer closed before replying"),
    }

    ws.close(CloseReason::NORMAL, None)?;
    Ok(())
}
