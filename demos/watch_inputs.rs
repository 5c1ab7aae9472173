//! Example: Watching the inputs for rising edges
//!
//! Run with: cargo run --example watch_inputs -- 10.0.2.218
//!
//! Polls the input bitmask every 100 ms and prints the channels that
//! switched on since the previous reading. Ctrl-C to stop.

use iob16_modbus::utils::{format_binary, rising_edges, word_to_bits};
use iob16_modbus::{Client, ClientConfig, LogicModeReading};
use std::net::Ipv4Addr;
use std::thread;
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

fn main() -> iob16_modbus::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let ip: Ipv4Addr = std::env::args()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(Ipv4Addr::new(10, 0, 2, 218));

    let mut client = Client::new(ClientConfig::new(ip, 1));
    client.connect()?;

    match client.read_logic_mode()? {
        LogicModeReading::Known(mode) => println!("Logic mode: {}", mode),
        LogicModeReading::Unknown(raw) => println!("Logic mode: unknown (0x{:04X})", raw),
    }

    let mut previous = client.read_input_states()?;
    println!("Watching inputs on {}...", client.config().device_addr);

    loop {
        thread::sleep(POLL_INTERVAL);

        let raw = client.read_input_raw()?;
        let current = word_to_bits(raw);
        for channel in rising_edges(&previous, &current) {
            println!("input {:>2} activated  ({})", channel, format_binary(raw));
        }
        previous = current;
    }
}
