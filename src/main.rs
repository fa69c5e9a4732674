//! monarch: one supervised worker per machine.
//!
//! # Architecture Overview
//!
//! ```text
//!   candidate A ──bind 127.0.0.1:1113──► wins ──► MASTER
//!                                                  │
//!   candidate B ──bind fails──► connect ──"B:pid"──┤ rendezvous listener
//!               ◄──────────────────────"A:pid"─────┤   (restart on notify)
//!               exit 0                             │
//!                                                  ▼
//!                                        ┌──────────────────┐
//!                                        │ ProcessSupervisor│──spawn──► worker
//!                                        │  budget, crash-  │◄─exit────   │ fd 3: JSON lines
//!                                        │  loop detection, │◄─messages───┘ stdout/stderr → log
//!                                        │  SIGTERM→SIGKILL │──signals──►
//!                                        └──────────────────┘
//! ```

use std::process::ExitCode;

use clap::Parser;

use monarch::lifecycle::startup::{self, Cli};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    Ok(startup::run(cli).await?)
}
