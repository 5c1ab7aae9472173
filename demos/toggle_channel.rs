//! Example: Switching outputs on the I/O module
//!
//! Run with: cargo run --example toggle_channel -- 10.0.2.218 3
//!
//! This example demonstrates:
//! - Configuring the client (timeout, retry policy)
//! - ON/OFF/TOGGLE commands on one channel
//! - Reading the output states back
//! - The all-channels commands

use iob16_modbus::utils::{active_channels, format_states};
use iob16_modbus::{Client, ClientConfig, RetryPolicy};
use std::net::Ipv4Addr;
use std::thread;
use std::time::Duration;

fn main() -> iob16_modbus::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let ip: Ipv4Addr = args
        .next()
        .and_then(|s| s.parse().ok())
        .unwrap_or(Ipv4Addr::new(10, 0, 2, 218));
    let channel: u8 = args.next().and_then(|s| s.parse().ok()).unwrap_or(1);

    // =========================================================================
    // Connect
    // =========================================================================

    let config = ClientConfig::new(ip, 1)
        .with_timeout(Duration::from_secs(2))
        .with_retry(RetryPolicy::new(3, Duration::from_millis(500)));
    let mut client = Client::new(config);
    client.connect()?;
    println!("Connected to {}", client.config().device_addr);

    // =========================================================================
    // Single channel
    // =========================================================================

    println!("\n=== Channel {} ===\n", channel);

    client.turn_on(channel)?;
    println!("ON  -> {}", client.read_output_state(channel)?);
    thread::sleep(Duration::from_millis(500));

    client.toggle(channel)?;
    println!("TOGGLE -> {}", client.read_output_state(channel)?);
    thread::sleep(Duration::from_millis(500));

    client.turn_off(channel)?;
    println!("OFF -> {}", client.read_output_state(channel)?);

    // =========================================================================
    // All channels
    // =========================================================================

    println!("\n=== All Channels ===\n");

    client.turn_on_all()?;
    let outputs = client.read_output_states()?;
    println!("{}  ON: {:?}", format_states(&outputs), active_channels(&outputs));
    thread::sleep(Duration::from_secs(1));

    client.turn_off_all()?;
    let outputs = client.read_output_states()?;
    println!("{}  ON: {:?}", format_states(&outputs), active_channels(&outputs));

    client.disconnect();
    Ok(())
}
