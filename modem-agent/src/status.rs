//! Observed modem state, reduced line by line.
//!
//! [`Status::apply_line`] is the sole mutator driven by modem output. It
//! recognizes the handful of responses and unsolicited result codes the
//! engine cares about and folds them into a flat set of flags, counters
//! and optional attributes. Everything else is logged and ignored.
//!
//! A single pending-command slot correlates responses with the one command
//! allowed in flight: terminal lines (`OK`, `ERROR`, `+CME ERROR`) clear
//! the slot, and some `OK` side effects depend on which command was
//! pending. The version counter increments on every recognized line so the
//! owner can tell progress from silence.

use tracing::debug;

use crate::qcfg::Qcfg;

/// One entry of the modem's current-call list (`+CLCC`), voice calls only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub number: String,
    pub state: CallState,
}

/// `+CLCC` stat field, as far as this engine understands it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Active,
    Dialing,
    Incoming,
    Alerting,
    Unsupported,
}

impl CallState {
    fn from_stat(stat: &str) -> Self {
        match stat {
            "0" => Self::Active,
            "2" => Self::Dialing,
            "3" => Self::Alerting,
            "4" => Self::Incoming,
            _ => Self::Unsupported,
        }
    }
}

#[derive(Debug, Default)]
pub struct Status {
    at_ok: bool,
    echo_disabled: bool,
    powered_down: bool,
    ok: bool,
    error: bool,
    call_list_fresh: bool,

    ring_count: u32,
    no_carrier_count: u32,
    busy_count: u32,

    cpin: Option<String>,
    cme_error: Option<String>,
    sim_pin_count: Option<String>,
    current_call: Option<Call>,

    pending: Option<String>,
    version: u64,
}

impl Status {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one modem output line into the observed state.
    pub fn apply_line(&mut self, line: &str, qcfg: &mut Qcfg) {
        match line {
            "OK" => {
                self.ok = true;
                if let Some(pending) = self.pending.take() {
                    self.apply_ok_for(&pending, qcfg);
                }
            }
            "ERROR" => {
                self.error = true;
                self.pending = None;
            }
            // Boot banner after power-up or reboot: the handshake and echo
            // setting no longer hold.
            "RDY" => {
                self.at_ok = false;
                self.echo_disabled = false;
            }
            "POWERED DOWN" => self.powered_down = true,
            "RING" => {
                self.ring_count += 1;
                self.call_list_fresh = false;
            }
            "NO CARRIER" => {
                self.no_carrier_count += 1;
                self.call_list_fresh = false;
            }
            _ => {
                if let Some(code) = line.strip_prefix("+CME ERROR: ") {
                    self.apply_cme_error(code);
                } else if let Some(state) = line.strip_prefix("+CPIN: ") {
                    self.cpin = Some(state.to_owned());
                } else if let Some(counts) = line.strip_prefix("+QPINC: \"SC\",") {
                    self.sim_pin_count = Some(counts.to_owned());
                } else if let Some(setting) = line.strip_prefix("+QCFG: ") {
                    if !apply_qcfg_response(setting, qcfg) {
                        debug!(line, "ignoring unsolicited modem line");
                        return;
                    }
                } else if let Some(entry) = line.strip_prefix("+CLCC: ") {
                    if !self.apply_call_list_entry(entry) {
                        debug!(line, "ignoring unsolicited modem line");
                        return;
                    }
                } else {
                    debug!(line, "ignoring unsolicited modem line");
                    return;
                }
            }
        }
        self.version = self.version.wrapping_add(1);
    }

    /// Side effects of a terminal `OK`, keyed on the command it answers.
    fn apply_ok_for(&mut self, pending: &str, qcfg: &mut Qcfg) {
        if pending == "AT" {
            self.at_ok = true;
        } else if pending == "ATE0" {
            self.echo_disabled = true;
        } else if pending == "AT+CLCC" {
            // An empty list produces no +CLCC line at all; the OK alone
            // then means "no calls".
            if !self.call_list_fresh {
                self.current_call = None;
            }
            self.call_list_fresh = true;
        } else if pending == "ATH" || pending == "ATA" || pending.starts_with("ATD") {
            // The command just altered remote call state; whatever call
            // list we knew is outdated.
            self.call_list_fresh = false;
        } else if pending == "AT+CFUN=1,1" {
            // Reboot accepted: forget everything that only held for the
            // old modem session.
            self.cpin = None;
            self.cme_error = None;
            self.sim_pin_count = None;
            self.current_call = None;
            self.call_list_fresh = false;
            qcfg.invalidate_after_reboot();
        } else if let Some(name) = qcfg_assign_name(pending) {
            qcfg.note_assignment_accepted(name);
        }
    }

    fn apply_cme_error(&mut self, code: &str) {
        self.cme_error = Some(code.to_owned());
        self.pending = None;
        // 14 = SIM busy, 16 = incorrect password (Quectel CME table).
        if code == "14" || code == "16" {
            self.busy_count += 1;
        }
        if code == "16" {
            // The PIN state we knew led to a rejected password; re-query.
            self.cpin = None;
        }
    }

    /// `+CLCC: idx,dir,stat,mode,mpty,"number",type`; only voice calls
    /// (mode 0) are recognized.
    fn apply_call_list_entry(&mut self, entry: &str) -> bool {
        let fields: Vec<&str> = entry.split(',').collect();
        if fields.len() < 6 || fields[3] != "0" {
            return false;
        }
        self.current_call = Some(Call {
            number: fields[5].trim_matches('"').to_owned(),
            state: CallState::from_stat(fields[2]),
        });
        self.call_list_fresh = true;
        true
    }

    /// Records the command just sent; responses are correlated against it.
    /// Terminal flags of the previous round are reset.
    pub fn command_submitted(&mut self, command: String) {
        self.pending = Some(command);
        self.ok = false;
        self.error = false;
        self.cme_error = None;
        self.version = self.version.wrapping_add(1);
    }

    /// Abandons the in-flight command, as a timed-out exchange would.
    /// Leaves the same "nothing outstanding" state a terminal response
    /// produces.
    pub fn command_canceled(&mut self) {
        self.pending = None;
        self.ok = false;
        self.error = false;
        self.cme_error = None;
        self.version = self.version.wrapping_add(1);
    }

    /// Drops the basic-liveness flag so the next scheduling round starts
    /// over with the readiness handshake.
    pub fn mark_unready(&mut self) {
        self.at_ok = false;
        self.version = self.version.wrapping_add(1);
    }

    /// Marks the call list outdated, forcing a refresh on the next round.
    pub fn invalidate_call_list(&mut self) {
        self.call_list_fresh = false;
        self.version = self.version.wrapping_add(1);
    }

    pub fn at_ok(&self) -> bool {
        self.at_ok
    }

    pub fn echo_disabled(&self) -> bool {
        self.echo_disabled
    }

    pub fn powered_down(&self) -> bool {
        self.powered_down
    }

    pub fn ok(&self) -> bool {
        self.ok
    }

    pub fn error(&self) -> bool {
        self.error
    }

    pub fn call_list_fresh(&self) -> bool {
        self.call_list_fresh
    }

    pub fn ring_count(&self) -> u32 {
        self.ring_count
    }

    pub fn no_carrier_count(&self) -> u32 {
        self.no_carrier_count
    }

    pub fn busy_count(&self) -> u32 {
        self.busy_count
    }

    /// `+CPIN:` payload, e.g. `READY` or `SIM PIN`; `None` until queried.
    pub fn cpin(&self) -> Option<&str> {
        self.cpin.as_deref()
    }

    pub fn cme_error(&self) -> Option<&str> {
        self.cme_error.as_deref()
    }

    /// `+QPINC: "SC",…` payload: remaining PIN and PUK attempts.
    pub fn sim_pin_count(&self) -> Option<&str> {
        self.sim_pin_count.as_deref()
    }

    pub fn current_call(&self) -> Option<&Call> {
        self.current_call.as_ref()
    }

    /// The command currently awaiting a terminal response, if any.
    pub fn pending_command(&self) -> Option<&str> {
        self.pending.as_deref()
    }

    /// Incremented on every observable mutation; unchanged by lines the
    /// engine does not recognize.
    pub fn version(&self) -> u64 {
        self.version
    }
}

/// Extracts the setting name from a pending `AT+QCFG="name",value`
/// assignment. Query commands (no value part) yield `None`.
fn qcfg_assign_name(pending: &str) -> Option<&str> {
    let rest = pending.strip_prefix("AT+QCFG=\"")?;
    let (name, rest) = rest.split_once('"')?;
    rest.strip_prefix(',')?;
    Some(name)
}

/// Handles a `+QCFG: name,value` query response (name de-quoted).
fn apply_qcfg_response(setting: &str, qcfg: &mut Qcfg) -> bool {
    let Some((name, value)) = setting.split_once(',') else {
        return false;
    };
    qcfg.apply_response(name.trim_matches('"'), value)
}
