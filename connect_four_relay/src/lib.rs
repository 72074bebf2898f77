// connect_four_relay: matchmaking and relay server for two-player games.
//
// The relay accepts TCP connections, gives each player a unique display name,
// pairs players first-come-first-served into two-player sessions, and relays
// moves, resets and chat between the two sides while flipping whose turn it
// is. It never checks whether a move is legal or who won; all game logic
// stays on the clients.
//
// Module overview:
// - `names.rs`:       Name registry: claimed display names, reserved names.
// - `connection.rs`:  One peer: transport, name, receive loop, teardown, and
//                     the shared rename procedure.
// - `pool.rs`:        Waiting pool: FIFO queue and the locked matchmaking
//                     decision.
// - `session.rs`:     Two-player session (start, relay, departure) and the
//                     live-session set.
// - `state.rs`:       `RelayState`, the shared owner of all of the above, plus
//                     the live-connection table and stats.
// - `server.rs`:      TCP listener, matchmaking, `RelayHandle`.
// - `events.rs`:      Bounded event channel for an external monitor.
// - `client.rs`:      Blocking `NetClient` used by tests and Rust front ends.
// - `config.rs` / `error.rs`: configuration and error types.
//
// Dependencies: `connect_four_protocol` (message types and framing). The
// relay can run as a standalone binary (`main.rs`) or be embedded in another
// process via `start_relay`.

pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod events;
pub mod names;
pub mod pool;
pub mod server;
pub mod session;
pub mod state;

pub use config::RelayConfig;
pub use error::RelayError;
pub use server::{RelayHandle, start_relay};
pub use state::RelayStats;
