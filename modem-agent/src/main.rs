use std::fs;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;
use color_eyre::eyre::{Result, WrapErr};
use serialport::SerialPort;
use tracing::{debug, info, warn};
use tracing_subscriber::{prelude::*, EnvFilter};

use modem_agent::{CommandChannel, Modem, ModemConfig, ResponseChannel};

/// Persistent EG25 settings reconciled at startup. String values keep
/// their wire quoting.
const PERSISTENT_SETTINGS: &[(&str, &str)] = &[
    ("risignaltype", "\"physical\""),
    ("urc/ri/ring", "\"pulse\""),
    ("urc/ri/other", "\"off\""),
];

/// Poll cadence while a command or outbound call is in flight.
const POLL_BUSY: Duration = Duration::from_millis(100);
/// Poll cadence while idle.
const POLL_IDLE: Duration = Duration::from_millis(500);

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[arg(
        short = 'm',
        long = "modem",
        default_value = "/dev/ttyUSB2",
        help = "Path to the EG25 modem device"
    )]
    modem: String,

    #[arg(long = "baud", default_value_t = 115_200)]
    baud: u32,

    #[arg(
        short = 'c',
        long = "config",
        env = "MODEM_AGENT_CONFIG",
        help = "Desired-configuration JSON file, re-read every poll round"
    )]
    config: Option<PathBuf>,
}

struct SerialResponseChannel {
    port: Box<dyn SerialPort>,
}

impl ResponseChannel for SerialResponseChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        // Stay non-blocking: only pull what the port already buffers.
        let available = self.port.bytes_to_read().map_err(io::Error::other)? as usize;
        if available == 0 {
            return Ok(0);
        }
        let want = buf.len().min(available);
        self.port.read(&mut buf[..want])
    }
}

struct SerialCommandChannel {
    port: Box<dyn SerialPort>,
}

impl CommandChannel for SerialCommandChannel {
    fn send(&mut self, command: &str) -> io::Result<()> {
        self.port.write_all(command.as_bytes())?;
        self.port.write_all(b"\r\n")
    }
}

fn load_config(path: Option<&PathBuf>) -> ModemConfig {
    let Some(path) = path else {
        return ModemConfig::default();
    };
    match fs::read_to_string(path) {
        Ok(raw) => match serde_json::from_str(&raw) {
            Ok(config) => config,
            Err(e) => {
                warn!("Ignoring malformed config {}: {}", path.display(), e);
                ModemConfig::default()
            }
        },
        Err(e) => {
            debug!("Config {} not readable ({}), using defaults", path.display(), e);
            ModemConfig::default()
        }
    }
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    info!("Opening modem on {}", cli.modem);
    let port = serialport::new(&cli.modem, cli.baud)
        .timeout(Duration::from_millis(10))
        .open()
        .wrap_err_with(|| format!("Failed to open serial port '{}'", cli.modem))?;
    let mut commands = SerialCommandChannel {
        port: port.try_clone().wrap_err("Failed to clone serial port")?,
    };
    let mut responses = SerialResponseChannel { port };

    let mut modem = Modem::new();
    for (name, value) in PERSISTENT_SETTINGS {
        modem.declare_setting(name, value);
    }

    let mut last_version = modem.version();
    let mut last_progress = Instant::now();
    loop {
        let config = load_config(cli.config.as_ref());
        modem.apply(&config, &mut commands, &mut responses)?;

        if modem.version() != last_version {
            last_version = modem.version();
            last_progress = Instant::now();
            let report = modem.generate_report();
            println!("{}", serde_json::to_string(&report)?);
        } else if modem.response_outstanding()
            && last_progress.elapsed() >= Duration::from_millis(modem.command_timeout_ms())
        {
            warn!("Command timed out, canceling");
            modem.cancel_command();
            last_progress = Instant::now();
        }

        if modem.powered_down() {
            info!("Modem reports powered down, exiting");
            return Ok(());
        }

        let cadence = if modem.outbound() || modem.response_outstanding() {
            POLL_BUSY
        } else {
            POLL_IDLE
        };
        thread::sleep(cadence);
    }
}
