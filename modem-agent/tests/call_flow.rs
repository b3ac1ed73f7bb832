//! End-to-end exercise of the engine against scripted modem behavior:
//! flaky startup, echo disable, a rejected then a correct PIN, a refused
//! and a successful outbound call, an incoming call with ring echo and
//! accept, remote hang-up, and an orderly power-down.

use std::collections::VecDeque;

use modem_agent::config::{CallConfig, CallStage, PinReport};
use modem_agent::{Modem, ModemConfig};

struct Phone {
    modem: Modem,
    sent: Vec<String>,
}

impl Phone {
    fn new() -> Self {
        Self {
            modem: Modem::new(),
            sent: Vec::new(),
        }
    }

    /// Feeds scripted modem output, runs one apply round, and returns the
    /// command that went out, if any.
    fn apply(&mut self, config: &ModemConfig, feed: &str) -> Option<String> {
        let before = self.sent.len();
        let mut response: VecDeque<u8> = feed.bytes().collect();
        self.modem
            .apply(config, &mut self.sent, &mut response)
            .unwrap();
        assert!(
            self.sent.len() <= before + 1,
            "more than one command per round: {:?}",
            &self.sent[before..]
        );
        self.sent.get(before).cloned()
    }
}

fn with_call(base: &ModemConfig, number: &str, state: Option<&str>) -> ModemConfig {
    ModemConfig {
        call: Some(CallConfig {
            number: number.to_owned(),
            state: state.map(str::to_owned),
        }),
        ..base.clone()
    }
}

#[test]
fn test_full_call_flow() {
    let mut phone = Phone::new();
    let config = ModemConfig::default();

    // The modem ignores the first three readiness probes; the owner times
    // out and cancels each round.
    for _ in 0..3 {
        assert_eq!(phone.apply(&config, "").as_deref(), Some("AT"));
        phone.modem.cancel_command();
        assert!(!phone.modem.response_outstanding());
    }
    assert_eq!(phone.apply(&config, "").as_deref(), Some("AT"));
    assert_eq!(phone.apply(&config, "OK\r\n").as_deref(), Some("ATE0"));
    assert_eq!(phone.apply(&config, "OK\r\n").as_deref(), Some("AT+CPIN?"));

    // Wrong PIN: rejected with CME 16, fallback queries the attempt
    // counter, and the rejected PIN is never resubmitted unchanged.
    let config = ModemConfig {
        pin: Some("4321".to_owned()),
        ..ModemConfig::default()
    };
    assert_eq!(
        phone
            .apply(&config, "+CPIN: SIM PIN\r\nOK\r\n")
            .as_deref(),
        Some("AT+CPIN=\"4321\"")
    );
    assert_eq!(phone.apply(&config, "+CME ERROR: 16\r\n"), None);
    assert_eq!(phone.modem.busy_count(), 1);
    assert_eq!(phone.apply(&config, "").as_deref(), Some("AT+CPIN?"));
    assert_eq!(
        phone
            .apply(&config, "+CPIN: SIM PIN\r\nOK\r\n")
            .as_deref(),
        Some("AT+QPINC=\"SC\"")
    );
    assert_eq!(
        phone.apply(&config, "+QPINC: \"SC\",2,10\r\nOK\r\n"),
        None
    );
    let report = phone.modem.generate_report();
    assert_eq!(report.sim, Some("yes"));
    assert_eq!(report.pin, Some(PinReport::Required));
    assert_eq!(report.pin_remaining_attempts, Some(2));
    assert_eq!(phone.apply(&config, ""), None);

    // Correct PIN unlocks telephony; the first call-list refresh follows.
    let config = ModemConfig {
        pin: Some("1234".to_owned()),
        ..ModemConfig::default()
    };
    assert_eq!(phone.apply(&config, "").as_deref(), Some("AT+CPIN=\"1234\""));
    assert_eq!(
        phone.apply(&config, "OK\r\n+CPIN: READY\r\n").as_deref(),
        Some("AT+CLCC")
    );
    assert_eq!(phone.apply(&config, "OK\r\n"), None);
    assert_eq!(phone.modem.generate_report().pin, Some(PinReport::Ok));

    // First dial attempt: the remote side never answers, carrier drops.
    let config = with_call(&config, "03519999", None);
    assert_eq!(phone.apply(&config, "").as_deref(), Some("ATD03519999;"));
    assert!(phone.modem.outbound());
    assert_eq!(
        phone.apply(&config, "OK\r\nNO CARRIER\r\n").as_deref(),
        Some("AT+CLCC")
    );
    assert_eq!(phone.apply(&config, "OK\r\n"), None);
    let call = phone.modem.generate_report().call.unwrap();
    assert_eq!(call.number, "03519999");
    assert_eq!(call.state, CallStage::Rejected);

    // Second dial attempt connects and the call list confirms it.
    let config = with_call(&config, "+49123123123", None);
    assert_eq!(
        phone.apply(&config, "").as_deref(),
        Some("ATD+49123123123;")
    );
    assert_eq!(phone.apply(&config, "OK\r\n").as_deref(), Some("AT+CLCC"));
    assert_eq!(
        phone.apply(
            &config,
            "+CLCC: 1,0,0,0,0,\"+49123123123\",145\r\nOK\r\n"
        ),
        None
    );
    let call = phone.modem.generate_report().call.unwrap();
    assert_eq!(call.state, CallStage::Active);

    // The caller withdraws the call: hang up, with the long grace period.
    let config = ModemConfig {
        pin: Some("1234".to_owned()),
        ..ModemConfig::default()
    };
    assert_eq!(phone.apply(&config, "").as_deref(), Some("ATH"));
    assert_eq!(phone.modem.command_timeout_ms(), 90_000);
    assert_eq!(phone.apply(&config, "OK\r\n").as_deref(), Some("AT+CLCC"));
    assert_eq!(phone.apply(&config, "OK\r\n"), None);
    assert!(phone.modem.generate_report().call.is_none());

    // Incoming call: every ring refreshes the list and echoes the
    // configured ring command once per RING.
    let config = ModemConfig {
        pin: Some("1234".to_owned()),
        ring: Some("AT+QLDTMF=5,\"4\",1".to_owned()),
        ..ModemConfig::default()
    };
    let incoming = "+CLCC: 1,1,4,0,0,\"+4930111222\",129\r\nOK\r\n";
    for ring in 1..=3u32 {
        assert_eq!(phone.apply(&config, "RING\r\n").as_deref(), Some("AT+CLCC"));
        assert_eq!(
            phone.apply(&config, incoming).as_deref(),
            Some("AT+QLDTMF=5,\"4\",1"),
            "ring {ring}"
        );
        assert_eq!(phone.apply(&config, "OK\r\n"), None);
        assert_eq!(phone.modem.generate_report().ring_count, ring);
    }
    let call = phone.modem.generate_report().call.unwrap();
    assert_eq!(call.number, "+4930111222");
    assert_eq!(call.state, CallStage::Incoming);

    // The user picks up.
    let config = with_call(&config, "+4930111222", None);
    assert_eq!(phone.apply(&config, "").as_deref(), Some("ATA"));
    assert_eq!(
        phone.modem.generate_report().call.unwrap().state,
        CallStage::Accepted
    );
    assert_eq!(phone.apply(&config, "OK\r\n").as_deref(), Some("AT+CLCC"));
    assert_eq!(
        phone.apply(&config, "+CLCC: 1,1,0,0,0,\"+4930111222\",129\r\nOK\r\n"),
        None
    );
    assert_eq!(
        phone.modem.generate_report().call.unwrap().state,
        CallStage::Active
    );

    // Remote side hangs up; the UI drops the call node at the same time.
    let config = ModemConfig {
        pin: Some("1234".to_owned()),
        ring: config.ring.clone(),
        ..ModemConfig::default()
    };
    assert_eq!(
        phone.apply(&config, "NO CARRIER\r\n").as_deref(),
        Some("AT+CLCC")
    );
    assert_eq!(phone.apply(&config, "OK\r\n"), None);
    assert!(phone.modem.generate_report().call.is_none());

    // Orderly shutdown.
    let config = ModemConfig {
        pin: Some("1234".to_owned()),
        power: modem_agent::config::Power::Off,
        ..ModemConfig::default()
    };
    assert_eq!(phone.apply(&config, "").as_deref(), Some("AT+QPOWD"));
    assert!(phone.modem.powering_down());
    assert_eq!(phone.apply(&config, "OK\r\nPOWERED DOWN\r\n"), None);
    assert!(phone.modem.powered_down());
    assert!(!phone.modem.powering_down());
}

#[test]
fn test_setting_reconciliation_survives_the_reboot() {
    let mut phone = Phone::new();
    phone.modem.declare_setting("urc/ri/ring", "\"pulse\"");
    phone.modem.declare_setting("risignaltype", "\"physical\"");
    let config = ModemConfig::default();

    assert_eq!(phone.apply(&config, "").as_deref(), Some("AT"));
    assert_eq!(phone.apply(&config, "OK\r\n").as_deref(), Some("ATE0"));
    assert_eq!(
        phone.apply(&config, "OK\r\n").as_deref(),
        Some("AT+QCFG=\"urc/ri/ring\"")
    );
    // First setting mismatches, second already holds.
    assert_eq!(
        phone
            .apply(&config, "+QCFG: \"urc/ri/ring\",\"off\"\r\nOK\r\n")
            .as_deref(),
        Some("AT+QCFG=\"risignaltype\"")
    );
    assert_eq!(
        phone
            .apply(&config, "+QCFG: \"risignaltype\",\"physical\"\r\nOK\r\n")
            .as_deref(),
        Some("AT+QCFG=\"urc/ri/ring\",\"pulse\"")
    );
    // Assignment accepted -> reboot for it to take effect.
    assert_eq!(phone.apply(&config, "OK\r\n").as_deref(), Some("AT+CFUN=1,1"));
    // Boot banner restarts the handshake and the whole verification.
    assert_eq!(phone.apply(&config, "OK\r\nRDY\r\n").as_deref(), Some("AT"));
    assert_eq!(phone.apply(&config, "OK\r\n").as_deref(), Some("ATE0"));
    assert_eq!(
        phone.apply(&config, "OK\r\n").as_deref(),
        Some("AT+QCFG=\"urc/ri/ring\"")
    );
    // This time both confirm and no further reboot happens.
    assert_eq!(
        phone
            .apply(&config, "+QCFG: \"urc/ri/ring\",\"pulse\"\r\nOK\r\n")
            .as_deref(),
        Some("AT+QCFG=\"risignaltype\"")
    );
    assert_eq!(
        phone
            .apply(&config, "+QCFG: \"risignaltype\",\"physical\"\r\nOK\r\n")
            .as_deref(),
        Some("AT+CPIN?")
    );
}
