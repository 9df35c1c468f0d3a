// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `smarthome_lp` - A Rust client runtime for home-automation gateways
//! served over HTTP long polling.
//!
//! The gateway exposes its devices only through a web interface: a start
//! page embedding the topology, and JSON endpoints for long polling,
//! reading and writing values. This library keeps a live, typed model of
//! that installation.
//!
//! # Supported Features
//!
//! - **Topology extraction**: Session id, poll timeout, locations, sensors
//!   and actuators from the start page
//! - **Typed devices**: Window, temperature, humidity and brightness
//!   sensors; lights, electrical devices, variables and heating actuators
//! - **Live updates**: Long polling with timeout escalation, retry and
//!   failure thresholds
//! - **Initialization**: Unresolved values are fetched on connect and a
//!   one-shot `Ready` event follows
//! - **Control**: Set, toggle and refresh actuator values
//! - **Events**: Callbacks at device and connection scope, plus a
//!   broadcast channel
//!
//! # Quick Start
//!
//! ```no_run
//! use smarthome_lp::{ConnectionBuilder, GatewayConfig, Topology};
//! use smarthome_lp::subscription::Subscribable;
//!
//! #[tokio::main]
//! async fn main() -> smarthome_lp::Result<()> {
//!     // The start page is fetched by the caller after logging in.
//!     let start_page = std::fs::read_to_string("start.html").unwrap();
//!
//!     let transport = GatewayConfig::new()
//!         .with_header("Cookie", "ASP.NET_SessionId=...")
//!         .into_transport()?;
//!     let topology = Topology::from_document(&start_page)?;
//!
//!     let connection = ConnectionBuilder::new(transport, topology)
//!         .connect()
//!         .await?;
//!     connection.wait_ready().await?;
//!
//!     // Lookup by id, exact name or name substring
//!     if let Some(window) = connection.sensor("fenster") {
//!         println!("{window}: {}", window.display_value());
//!     }
//!
//!     connection.on_change(|change| {
//!         println!("{} changed from {}", change.device, change.old_value);
//!     });
//!
//!     connection.toggle("Deckenlicht").await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Event Channel
//!
//! ```no_run
//! use smarthome_lp::{ConnectionEvent, ConnectionBuilder, GatewayConfig, Topology};
//!
//! # async fn example(topology: Topology) -> smarthome_lp::Result<()> {
//! let transport = GatewayConfig::new().into_transport()?;
//! let builder = ConnectionBuilder::new(transport, topology);
//! let mut events = builder.subscribe();
//! let _connection = builder.connect().await?;
//!
//! while let Ok(event) = events.recv().await {
//!     match event {
//!         ConnectionEvent::Changed(change) => println!("{}", change.device),
//!         ConnectionEvent::Error { error, fatal } => eprintln!("{error} (fatal: {fatal})"),
//!         ConnectionEvent::Disconnected => break,
//!         _ => {}
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod event;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod subscription;
pub mod topology;
pub mod types;

pub use error::{
    DataError, Error, ProtocolError, Result, SessionError, TopologyError, TransportError,
    ValueError,
};
pub use event::{ConnectionEvent, DeviceChange, EventBus};
#[cfg(feature = "http")]
pub use protocol::{GatewayConfig, HttpTransport};
pub use protocol::{Request, Response, TimestampGenerator, Transport};
pub use registry::{Device, Location, Registry};
pub use session::{Connection, ConnectionBuilder, PollPolicy, PollState};
pub use subscription::{CallbackRegistry, Subscribable, SubscriptionId};
pub use topology::Topology;
pub use types::{DeviceKind, Value, ValueType, normalize};
