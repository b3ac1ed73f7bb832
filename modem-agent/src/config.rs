//! Desired-configuration input and status-report output.
//!
//! Both are plain serde trees: the owner hands the engine a [`ModemConfig`]
//! on every apply round and renders the [`Report`] snapshot for whoever
//! displays or reacts to modem state.

use serde::{Deserialize, Serialize};

/// What the caller wants the modem to be doing.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModemConfig {
    /// SIM PIN to submit when the modem asks for one.
    pub pin: Option<String>,

    /// Requested power state; powering back on is the platform's job
    /// (GPIO sequencing), so only "off" is actionable here.
    #[serde(default)]
    pub power: Power,

    /// The one call the caller wants placed, accepted or rejected.
    pub call: Option<CallConfig>,

    /// Command string echoed to the modem on each new ring, typically to
    /// trigger an audible indicator.
    pub ring: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Power {
    #[default]
    On,
    Off,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CallConfig {
    pub number: String,

    /// `"rejected"` asks the engine to hang up / not accept this call.
    pub state: Option<String>,
}

impl CallConfig {
    pub fn rejected(&self) -> bool {
        self.state.as_deref() == Some("rejected")
    }
}

/// Snapshot of observed modem state, rendered by the facade.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub ring_count: u32,
    pub no_carrier_count: u32,

    /// `"yes"` once the SIM has reported any PIN state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sim: Option<&'static str>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub pin: Option<PinReport>,

    /// Remaining PIN attempts, when a counter query has run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pin_remaining_attempts: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub call: Option<CallReport>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PinReport {
    Ok,
    Required,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallReport {
    pub number: String,
    pub state: CallStage,
}

/// Externally visible lifecycle of the one tracked call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CallStage {
    Incoming,
    Accepted,
    Outbound,
    Active,
    Alerting,
    Rejected,
}
