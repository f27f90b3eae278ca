//! `keyfetch`: the fetcher daemon (C7-C8 of spec.md). Connects to a
//! `keyserver`, drives the session handshake/heartbeat state machine, and
//! reconciles every genuinely new keyset onto the local `<keydir>`.

pub mod config;
pub mod error;
pub mod reconciler;
pub mod session;
pub mod supervisor;
pub mod tls;
