//! Readiness-multiplexed runtime.
//!
//! - `bootstrap`: endpoint resolution and the two permanent sockets
//! - `registry`: slab-keyed table of accepted connections
//! - `event_loop`: the single-threaded poll/dispatch loop
//! - `peer`: endpoint formatting for diagnostics

pub mod bootstrap;
mod event_loop;
pub mod peer;
mod registry;

use crate::codec::{Transcriber, LINE_WIDTH, SPLIT_WIDTH};
use crate::config::Config;
use std::io;

/// Bind the permanent sockets and run the service loop until a fatal error.
pub fn run(config: Config) -> io::Result<()> {
    let sockets = bootstrap::bind(&config.host, config.port)?;
    let transcriber = Transcriber::new(LINE_WIDTH, SPLIT_WIDTH);
    let mut event_loop = event_loop::EventLoop::new(sockets, config.max_connections, transcriber)?;
    event_loop.run()
}
