//! AT-command protocol engine for the Quectel EG25 cellular modem.
//!
//! The engine reconciles a declarative desired state (PIN, power, the one
//! call that should exist, ring behavior) against what the modem reports
//! over its serial channel, one AT command at a time. It owns no transport
//! and no timers: the caller feeds it bytes and clock ticks, the engine
//! answers with at most one outbound command per round and a structured
//! status snapshot.
//!
//! ```no_run
//! use modem_agent::{Modem, ModemConfig};
//! use std::collections::VecDeque;
//!
//! let mut modem = Modem::new();
//! modem.declare_setting("urc/ri/ring", "\"pulse\"");
//!
//! let config = ModemConfig::default();
//! let mut commands: Vec<String> = Vec::new();
//! let mut responses: VecDeque<u8> = VecDeque::new();
//! modem.apply(&config, &mut commands, &mut responses)?;
//! println!("{}", serde_json::to_string(&modem.generate_report())?);
//! # Ok::<(), eyre::Report>(())
//! ```

pub mod channel;
pub mod config;
pub mod control;
pub mod line_reader;
pub mod qcfg;
pub mod status;

mod modem;

pub use channel::{CommandChannel, ResponseChannel};
pub use config::{ModemConfig, Report};
pub use modem::Modem;
