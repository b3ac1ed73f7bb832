//! The operation scheduler.
//!
//! Each [`Control::apply_config`] round reconciles the caller's desired
//! configuration against the observed [`Status`] and decides which single
//! corrective AT command (if any) goes out next. At most one operation is
//! ever in flight: the slot is a plain `Option<Operation>`, so the
//! invariant holds by construction. The derive order below doubles as the
//! priority table; the first unsatisfied concern wins the round.

use std::io;

use tracing::debug;

use crate::channel::CommandChannel;
use crate::config::{ModemConfig, Power};
use crate::qcfg::Qcfg;
use crate::status::{CallState, Status};

/// One corrective exchange with the modem. The variant order mirrors the
/// scheduling priority.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Basic liveness handshake (`AT`).
    CheckReady,
    /// Stop the modem from echoing our commands back (`ATE0`).
    DisableEcho,
    /// Read back one persistent setting.
    QuerySetting { name: String },
    /// Write one persistent setting.
    AssignSetting { name: String, value: String },
    /// Restart the modem so accepted setting assignments take effect.
    Reboot,
    /// Ask for the SIM PIN state.
    QueryPin,
    /// Ask for the remaining PIN attempts after a rejected password.
    QueryPinCount,
    /// Submit the SIM PIN.
    SetPin { pin: String },
    /// Orderly shutdown (`AT+QPOWD`).
    PowerDown,
    HangUp,
    RequestCallList,
    InitiateCall { number: String },
    AcceptCall,
    /// Caller-supplied command echoed on each new ring.
    Ring { command: String },
}

impl Operation {
    /// The wire string for this operation.
    pub fn command(&self) -> String {
        match self {
            Self::CheckReady => "AT".to_owned(),
            Self::DisableEcho => "ATE0".to_owned(),
            Self::QuerySetting { name } => format!("AT+QCFG=\"{name}\""),
            Self::AssignSetting { name, value } => format!("AT+QCFG=\"{name}\",{value}"),
            Self::Reboot => "AT+CFUN=1,1".to_owned(),
            Self::QueryPin => "AT+CPIN?".to_owned(),
            Self::QueryPinCount => "AT+QPINC=\"SC\"".to_owned(),
            Self::SetPin { pin } => format!("AT+CPIN=\"{pin}\""),
            Self::PowerDown => "AT+QPOWD".to_owned(),
            Self::HangUp => "ATH".to_owned(),
            Self::RequestCallList => "AT+CLCC".to_owned(),
            Self::InitiateCall { number } => format!("ATD{number};"),
            Self::AcceptCall => "ATA".to_owned(),
            Self::Ring { command } => command.clone(),
        }
    }
}

/// Bookkeeping for a locally initiated call until the call list confirms
/// it. `rejected` latches a carrier loss that happened before the call
/// ever showed up there.
#[derive(Debug, Clone)]
pub struct Outbound {
    pub number: String,
    pub rejected: bool,
    seen_in_call_list: bool,
}

#[derive(Debug, Default)]
pub struct Control {
    submitted: Option<Operation>,

    /// Last PIN handed to the modem; never resubmitted unchanged after a
    /// rejection.
    pin_submitted: Option<String>,
    /// Set when a PIN assignment failed; the remaining-attempts counter is
    /// queried before anything else PIN-related happens.
    query_pin_count: bool,
    /// Last applied power intent; keeps repeated rounds from resubmitting
    /// the shutdown command.
    power_off_sent: bool,
    /// An in-flight call lost its desired-config backing and must be torn
    /// down.
    hangup_needed: bool,
    /// An accept was issued for the current incoming call.
    accepting: bool,

    outbound: Option<Outbound>,
    ring_announced: u32,
    no_carrier_seen: u32,
}

impl Control {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs one scheduling round. Sends at most one command to `channel`.
    pub fn apply_config(
        &mut self,
        config: &ModemConfig,
        status: &mut Status,
        qcfg: &Qcfg,
        channel: &mut dyn CommandChannel,
    ) -> io::Result<()> {
        if let Some(op) = self.submitted.take() {
            if status.ok() {
                self.complete(&op);
            } else if status.error() || status.cme_error().is_some() {
                self.fail(&op);
                // Abandoned for this round; the next one re-derives.
                return Ok(());
            } else {
                self.submitted = Some(op);
            }
        }

        self.sync_power(config);
        self.sync_outbound(config, status);
        self.sync_accepting(status);
        self.sync_ring(config, status);

        if self.submitted.is_some() {
            return Ok(());
        }
        let Some(op) = self.next_operation(config, status, qcfg) else {
            return Ok(());
        };

        match &op {
            Operation::Reboot => {
                // Whatever PIN we submitted is owed again to the restarted
                // modem.
                self.pin_submitted = None;
            }
            Operation::SetPin { pin } => self.pin_submitted = Some(pin.clone()),
            Operation::PowerDown => self.power_off_sent = true,
            Operation::InitiateCall { number } => {
                self.outbound = Some(Outbound {
                    number: number.clone(),
                    rejected: false,
                    seen_in_call_list: false,
                });
            }
            Operation::AcceptCall => self.accepting = true,
            Operation::Ring { .. } => self.ring_announced = status.ring_count(),
            _ => {}
        }

        let command = op.command();
        debug!(%command, "submitting modem command");
        channel.send(&command)?;
        status.command_submitted(command);
        self.submitted = Some(op);
        Ok(())
    }

    fn complete(&mut self, op: &Operation) {
        match op {
            Operation::HangUp => self.hangup_needed = false,
            Operation::QueryPinCount => self.query_pin_count = false,
            Operation::Reboot => self.query_pin_count = false,
            _ => {}
        }
    }

    fn fail(&mut self, op: &Operation) {
        debug!(?op, "modem command failed");
        match op {
            // Fall back to querying how many attempts are left instead of
            // burning another one.
            Operation::SetPin { .. } => self.query_pin_count = true,
            Operation::AcceptCall => self.accepting = false,
            _ => {}
        }
    }

    fn sync_power(&mut self, config: &ModemConfig) {
        if config.power == Power::On {
            self.power_off_sent = false;
        }
    }

    fn sync_outbound(&mut self, config: &ModemConfig, status: &Status) {
        if status.no_carrier_count() != self.no_carrier_seen {
            self.no_carrier_seen = status.no_carrier_count();
            if let Some(ob) = &mut self.outbound {
                // Carrier loss before the call list ever confirmed the
                // call: the remote side rejected it.
                if !ob.seen_in_call_list {
                    ob.rejected = true;
                }
            }
        }
        let Some(ob) = &mut self.outbound else {
            return;
        };
        let withdrawn = match &config.call {
            None => true,
            Some(c) => c.number != ob.number || c.rejected(),
        };
        if withdrawn {
            if !ob.rejected {
                self.hangup_needed = true;
            }
            self.outbound = None;
            return;
        }
        if status.call_list_fresh() {
            match status.current_call() {
                Some(call) if call.number == ob.number => ob.seen_in_call_list = true,
                // Confirmed earlier, gone now: the call ended.
                _ if ob.seen_in_call_list => self.outbound = None,
                _ => {}
            }
        }
    }

    fn sync_accepting(&mut self, status: &Status) {
        if !self.accepting || !status.call_list_fresh() {
            return;
        }
        let still_incoming = status
            .current_call()
            .is_some_and(|call| call.state == CallState::Incoming);
        if !still_incoming {
            self.accepting = false;
        }
    }

    fn sync_ring(&mut self, config: &ModemConfig, status: &Status) {
        // Rings that arrive while no echo command is configured are not
        // announced retroactively.
        if config.ring.is_none() {
            self.ring_announced = status.ring_count();
        }
    }

    /// The priority scan. First unsatisfied concern wins.
    fn next_operation(
        &self,
        config: &ModemConfig,
        status: &Status,
        qcfg: &Qcfg,
    ) -> Option<Operation> {
        if status.powered_down() {
            return None;
        }
        if !status.at_ok() {
            return Some(Operation::CheckReady);
        }
        if !status.echo_disabled() {
            return Some(Operation::DisableEcho);
        }
        if let Some(entry) = qcfg.first_unknown() {
            return Some(Operation::QuerySetting {
                name: entry.name().to_owned(),
            });
        }
        if let Some(entry) = qcfg.first_mismatch() {
            return Some(Operation::AssignSetting {
                name: entry.name().to_owned(),
                value: entry.value().to_owned(),
            });
        }
        if qcfg.reboot_needed() {
            return Some(Operation::Reboot);
        }
        if status.cpin().is_none() {
            return Some(Operation::QueryPin);
        }
        if self.query_pin_count && status.sim_pin_count().is_none() {
            return Some(Operation::QueryPinCount);
        }
        if status.cpin() == Some("SIM PIN") {
            if let Some(pin) = &config.pin {
                if self.pin_submitted.as_deref() != Some(pin) {
                    return Some(Operation::SetPin { pin: pin.clone() });
                }
            }
        }
        if config.power == Power::Off && !self.power_off_sent {
            return Some(Operation::PowerDown);
        }
        if self.power_off_sent {
            // Shutting down; telephony no longer matters.
            return None;
        }
        if self.hangup_wanted(config, status) {
            return Some(Operation::HangUp);
        }
        if status.cpin() == Some("READY") {
            if !status.call_list_fresh() {
                return Some(Operation::RequestCallList);
            }
            match status.current_call() {
                Some(call) if call.state == CallState::Incoming => {
                    if let Some(c) = &config.call {
                        if c.number == call.number && !c.rejected() && !self.accepting {
                            return Some(Operation::AcceptCall);
                        }
                    }
                }
                None => {
                    if let Some(c) = &config.call {
                        if !c.rejected() && self.outbound.is_none() {
                            return Some(Operation::InitiateCall {
                                number: c.number.clone(),
                            });
                        }
                    }
                }
                _ => {}
            }
        }
        if let Some(command) = &config.ring {
            if status.ring_count() != self.ring_announced {
                return Some(Operation::Ring {
                    command: command.clone(),
                });
            }
        }
        None
    }

    fn hangup_wanted(&self, config: &ModemConfig, status: &Status) -> bool {
        if self.hangup_needed {
            return true;
        }
        let Some(c) = &config.call else {
            return false;
        };
        // Reject decisions are only taken on a fresh call list; after the
        // hang-up staled it, the refresh runs first.
        c.rejected() && status.call_list_fresh() && status.current_call().is_some()
    }

    /// Abandons the in-flight operation after a caller-detected timeout.
    /// Basic liveness is re-established before further responses are
    /// trusted.
    pub fn cancel_command(&mut self, status: &mut Status) {
        if let Some(op) = self.submitted.take() {
            debug!(?op, "canceling in-flight modem command");
            if op == Operation::AcceptCall {
                self.accepting = false;
            }
        }
        status.command_canceled();
        status.mark_unready();
    }

    /// How long the caller should wait for progress on the in-flight
    /// command. Hanging up can legitimately take the modem a long time
    /// (documented worst case 90 s); everything else answers promptly.
    pub fn command_timeout_ms(&self) -> u64 {
        match self.submitted {
            Some(Operation::HangUp) => 90_000,
            _ => 600,
        }
    }

    pub fn submitted(&self) -> Option<&Operation> {
        self.submitted.as_ref()
    }

    pub fn outbound(&self) -> Option<&Outbound> {
        self.outbound.as_ref()
    }

    pub fn accepting(&self) -> bool {
        self.accepting
    }

    /// True once the shutdown command went out for the current power-off
    /// intent.
    pub fn power_down_requested(&self) -> bool {
        self.power_off_sent
    }
}
