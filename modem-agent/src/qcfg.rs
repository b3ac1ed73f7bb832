//! Registry of persistent modem settings (Quectel `AT+QCFG`).
//!
//! Each entry pairs a setting name with the value the caller wants the
//! modem to hold, plus what we have observed so far. The scheduler queries
//! unknown entries, assigns mismatching ones and reboots the modem once
//! every entry is settled and at least one was changed, because QCFG
//! assignments only take effect after a restart.

/// Observed reconciliation state of one setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    /// Not yet queried (or invalidated by a reboot).
    Unknown,
    /// The modem already holds the desired value.
    Confirmed,
    /// The modem reported a different value; an assignment is due.
    Mismatch,
    /// An assignment was accepted; takes effect after reboot.
    Modified,
}

#[derive(Debug, Clone)]
pub struct Entry {
    name: String,
    value: String,
    state: EntryState,
}

impl Entry {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Desired value, verbatim as it appears on the wire (string values
    /// keep their quotes).
    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn state(&self) -> EntryState {
        self.state
    }
}

/// The set of names is fixed once the owner has declared its settings;
/// entries are never removed.
#[derive(Debug, Default)]
pub struct Qcfg {
    entries: Vec<Entry>,
}

impl Qcfg {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a setting with its desired value. Declaring the same name
    /// twice replaces the desired value and resets the entry.
    pub fn declare(&mut self, name: &str, value: &str) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.name == name) {
            entry.value = value.to_owned();
            entry.state = EntryState::Unknown;
            return;
        }
        self.entries.push(Entry {
            name: name.to_owned(),
            value: value.to_owned(),
            state: EntryState::Unknown,
        });
    }

    pub fn first_unknown(&self) -> Option<&Entry> {
        self.entries
            .iter()
            .find(|e| e.state == EntryState::Unknown)
    }

    pub fn first_mismatch(&self) -> Option<&Entry> {
        self.entries
            .iter()
            .find(|e| e.state == EntryState::Mismatch)
    }

    /// True iff no entry is Unknown or Mismatch and at least one is
    /// Modified: all settings are settled but the modem must restart for
    /// them to apply.
    pub fn reboot_needed(&self) -> bool {
        let settled = self
            .entries
            .iter()
            .all(|e| matches!(e.state, EntryState::Confirmed | EntryState::Modified));
        settled
            && self
                .entries
                .iter()
                .any(|e| e.state == EntryState::Modified)
    }

    /// Resets every entry to Unknown. Called once a reboot was confirmed;
    /// the settings must be re-verified against the restarted modem.
    pub fn invalidate_after_reboot(&mut self) {
        for entry in &mut self.entries {
            entry.state = EntryState::Unknown;
        }
    }

    /// Records a `+QCFG: name,value` query response. Returns true if a
    /// known entry changed state.
    pub fn apply_response(&mut self, name: &str, value: &str) -> bool {
        let Some(entry) = self.entries.iter_mut().find(|e| e.name == name) else {
            return false;
        };
        let state = if entry.value == value {
            EntryState::Confirmed
        } else {
            EntryState::Mismatch
        };
        let changed = entry.state != state;
        entry.state = state;
        changed
    }

    /// Records that the modem accepted an assignment for `name`. Returns
    /// true if a known entry changed state.
    pub fn note_assignment_accepted(&mut self, name: &str) -> bool {
        let Some(entry) = self.entries.iter_mut().find(|e| e.name == name) else {
            return false;
        };
        let changed = entry.state != EntryState::Modified;
        entry.state = EntryState::Modified;
        changed
    }
}
