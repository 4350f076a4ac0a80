//! Point-to-point message relay over TCP.
//!
//! Clients register a display name with the relay, list who is online, and
//! send messages to each other by name; the relay forwards every message, so
//! clients never connect to each other directly.
//!
//! - [`cli`] parses the command line for server and client modes.
//! - [`frame`] frames multi-part messages on a byte stream.
//! - [`envelope`] and [`codec`] define the protocol messages and map them to
//!   and from frames.
//! - [`transport`] multiplexes client connections behind connection ids.
//! - [`registry`] tracks which connection holds which name.
//! - [`dispatch`] runs the session protocol for each inbound frame.
//! - [`server`] ties transport and dispatcher together in one event loop.
//! - [`command`] and [`client`] drive an interactive terminal session.

pub mod cli;
pub mod client;
pub mod codec;
pub mod command;
pub mod dispatch;
pub mod envelope;
pub mod frame;
pub mod registry;
pub mod server;
pub mod transport;
