//! The facade tying the engine together.
//!
//! [`Modem::apply`] drains whatever the modem has sent through the line
//! reader into [`Status`], then runs one [`Control`] scheduling round. The
//! owning event loop calls it on data-ready signals and on a periodic
//! timer, consults the poll predicates to pick its cadence, and invokes
//! [`Modem::cancel_command`] once [`Modem::command_timeout_ms`] elapses
//! without [`Modem::version`] changing.

use eyre::{Result, WrapErr};
use tracing::debug;

use crate::channel::{CommandChannel, ResponseChannel};
use crate::config::{CallReport, CallStage, ModemConfig, PinReport, Report};
use crate::control::Control;
use crate::line_reader::{Fill, LineReader};
use crate::qcfg::Qcfg;
use crate::status::{Call, CallState, Status};

/// Longest line the modem is expected to produce; anything above this is
/// noise and gets discarded by the reader.
const LINE_BUFFER_CAPACITY: usize = 256;

pub struct Modem {
    line_reader: LineReader,
    status: Status,
    qcfg: Qcfg,
    control: Control,

    /// Last confirmed call, kept across stale call-list windows so reports
    /// stay continuous between refreshes. Dropped on carrier loss.
    call_cache: Option<Call>,
    no_carrier_seen: u32,
}

impl Modem {
    pub fn new() -> Self {
        Self {
            line_reader: LineReader::new(LINE_BUFFER_CAPACITY),
            status: Status::new(),
            qcfg: Qcfg::new(),
            control: Control::new(),
            call_cache: None,
            no_carrier_seen: 0,
        }
    }

    /// Registers a persistent setting to reconcile. Call before the first
    /// [`Modem::apply`]; the registry is fixed thereafter.
    pub fn declare_setting(&mut self, name: &str, value: &str) {
        self.qcfg.declare(name, value);
    }

    /// One full round: drain available modem output, then schedule at most
    /// one corrective command.
    pub fn apply(
        &mut self,
        config: &ModemConfig,
        command_channel: &mut dyn CommandChannel,
        response_channel: &mut dyn ResponseChannel,
    ) -> Result<()> {
        let Self {
            line_reader,
            status,
            qcfg,
            ..
        } = self;
        loop {
            let fill = line_reader
                .fill(response_channel)
                .wrap_err("reading from modem")?;
            line_reader.consume_lines(|line| {
                debug!(line, "modem line");
                status.apply_line(line, qcfg);
            });
            if fill == Fill::Drained {
                break;
            }
        }

        if self.status.no_carrier_count() != self.no_carrier_seen {
            self.no_carrier_seen = self.status.no_carrier_count();
            self.call_cache = None;
        }
        if self.status.call_list_fresh() {
            self.call_cache = self.status.current_call().cloned();
        }

        self.control
            .apply_config(config, &mut self.status, &self.qcfg, command_channel)
            .wrap_err("sending command to modem")?;
        Ok(())
    }

    /// Renders the current status snapshot.
    pub fn generate_report(&self) -> Report {
        Report {
            ring_count: self.status.ring_count(),
            no_carrier_count: self.status.no_carrier_count(),
            sim: self.status.cpin().map(|_| "yes"),
            pin: match self.status.cpin() {
                Some("READY") => Some(PinReport::Ok),
                Some("SIM PIN") => Some(PinReport::Required),
                _ => None,
            },
            pin_remaining_attempts: self
                .status
                .sim_pin_count()
                .and_then(|counts| counts.split(',').next())
                .and_then(|attempts| attempts.parse().ok()),
            call: self.call_report(),
        }
    }

    fn call_report(&self) -> Option<CallReport> {
        // A locally initiated call is reported from its bookkeeping until
        // the call list takes over.
        if let Some(outbound) = self.control.outbound() {
            let state = if outbound.rejected {
                CallStage::Rejected
            } else {
                match &self.call_cache {
                    Some(call) if call.number == outbound.number => match call.state {
                        CallState::Active => CallStage::Active,
                        CallState::Alerting => CallStage::Alerting,
                        _ => CallStage::Outbound,
                    },
                    _ => CallStage::Outbound,
                }
            };
            return Some(CallReport {
                number: outbound.number.clone(),
                state,
            });
        }
        let call = self.call_cache.as_ref()?;
        let state = match call.state {
            CallState::Active => CallStage::Active,
            CallState::Alerting => CallStage::Alerting,
            CallState::Dialing => CallStage::Outbound,
            CallState::Incoming => {
                if self.control.accepting() {
                    CallStage::Accepted
                } else {
                    CallStage::Incoming
                }
            }
            CallState::Unsupported => return None,
        };
        Some(CallReport {
            number: call.number.clone(),
            state,
        })
    }

    /// A locally initiated call is still awaiting confirmation; poll
    /// aggressively.
    pub fn outbound(&self) -> bool {
        self.control.outbound().is_some()
    }

    /// A command is awaiting its terminal response.
    pub fn response_outstanding(&self) -> bool {
        self.status.pending_command().is_some()
    }

    /// Shutdown was requested but the modem has not confirmed yet.
    pub fn powering_down(&self) -> bool {
        self.control.power_down_requested() && !self.status.powered_down()
    }

    pub fn powered_down(&self) -> bool {
        self.status.powered_down()
    }

    pub fn busy_count(&self) -> u32 {
        self.status.busy_count()
    }

    pub fn command_timeout_ms(&self) -> u64 {
        self.control.command_timeout_ms()
    }

    /// Forces a call-list refresh on the next round.
    pub fn invalidate_call_list(&mut self) {
        self.status.invalidate_call_list();
    }

    /// Recovers from a stuck command; the next round re-establishes basic
    /// liveness before trusting further responses.
    pub fn cancel_command(&mut self) {
        self.control.cancel_command(&mut self.status);
    }

    /// Changes whenever observed state changed; the owner uses it to
    /// distinguish progress from a stuck exchange.
    pub fn version(&self) -> u64 {
        self.status.version()
    }
}

impl Default for Modem {
    fn default() -> Self {
        Self::new()
    }
}
