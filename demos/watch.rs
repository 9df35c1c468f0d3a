// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Watch program: Connect to a gateway and print every event.
//!
//! The start page must be saved after logging in through a browser; the
//! session cookie of that login is passed along with it.
//!
//! # Usage
//!
//! ```bash
//! cargo run --example watch -- <start-page.html> <cookie> [device-to-toggle]
//! ```
//!
//! # Example
//!
//! ```bash
//! RUST_LOG=smarthome_lp=debug cargo run --example watch -- start.html \
//!     "ASP.NET_SessionId=abc123" Deckenlicht
//! ```

use std::env;

use smarthome_lp::subscription::Subscribable;
use smarthome_lp::{ConnectionBuilder, ConnectionEvent, GatewayConfig, Topology};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("smarthome_lp=info")),
        )
        .init();

    let args: Vec<String> = env::args().collect();

    if args.len() < 3 || args.len() > 4 {
        eprintln!("Usage: {} <start-page.html> <cookie> [device-to-toggle]", args[0]);
        eprintln!();
        eprintln!("Example:");
        eprintln!("  cargo run --example watch -- start.html \"ASP.NET_SessionId=abc123\"");
        std::process::exit(1);
    }

    let start_page = std::fs::read_to_string(&args[1])?;
    let cookie = &args[2];
    let toggle = args.get(3);

    let topology = Topology::from_document(&start_page)?;
    println!(
        "Session {} with {} sensors and {} actuator groups",
        topology.session_id,
        topology.sensors.len(),
        topology.actuator_groups.len()
    );

    let transport = GatewayConfig::new()
        .with_header("Cookie", cookie.as_str())
        .into_transport()?;

    let builder = ConnectionBuilder::new(transport, topology);
    builder.on_ready(|| println!("All values known"));
    let mut events = builder.subscribe();
    let connection = builder.connect().await?;

    connection.wait_ready().await?;
    for device in connection.devices() {
        println!("  {device}: {}", device.display_value());
    }

    if let Some(key) = toggle {
        match connection.toggle(key).await {
            Ok(device) => println!("Toggled {device}: {}", device.display_value()),
            Err(e) => println!("Toggle failed: {e}"),
        }
    }

    println!("Watching for changes...");
    while let Ok(event) = events.recv().await {
        match event {
            ConnectionEvent::Changed(change) => println!(
                "{} changed from {} to {}",
                change.device,
                change.old_value,
                change.device.display_value()
            ),
            ConnectionEvent::Message(payload) => println!("Message: {payload}"),
            ConnectionEvent::Error { error, fatal } => {
                println!("Error: {error} (fatal: {fatal})");
            }
            ConnectionEvent::Disconnected => break,
            ConnectionEvent::Ready => {}
        }
    }

    println!("Done!");
    Ok(())
}
