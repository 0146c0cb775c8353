//! # pmuctl binary
//!
//! Command-line front end for the control registry. Every invocation starts
//! with all controls disabled and restores that state on exit.
//!
//! # Usage
//!
//! ```bash
//! # Show the snapshot (simulation backend by default)
//! pmuctl status
//!
//! # Textual writes
//! pmuctl set PMCCNTR=1 CNTKCTL=1
//!
//! # Keep the cycle counter readable from EL0 until Ctrl-C
//! pmuctl --backend arm64 hold PMCCNTR
//!
//! # Device-node session on stdin
//! printf 'PMCCNTR=1\n?\nget PMCCNTR\n' | pmuctl shell
//! ```

use clap::{Parser, Subcommand, ValueEnum};
use nix::errno::Errno;
use pmuctl::{BackendRegistry, DeviceNode, PmuCtl, UserSlice};
use pmuctl_common::config::{ConfigError, ConfigLoader, PmuctlFileConfig};
use pmuctl_common::consts::{ControlId, DEFAULT_CONFIG_PATH};
use pmuctl_common::ioctl::{IoctlCommand, PAYLOAD_SIZE, PmuctlToggle};
use serde::Serialize;
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::mpsc;
use tracing::{error, info, warn, Level};
use tracing_subscriber::EnvFilter;

/// pmuctl - EL0 access control for ARMv8 PMU and timer counters
#[derive(Parser, Debug)]
#[command(name = "pmuctl")]
#[command(author = "RTS007")]
#[command(version)]
#[command(about = "Enable or disable EL0 counter access on every CPU")]
#[command(long_about = None)]
struct Args {
    /// Path to pmuctl.toml. Defaults are used if the default path is missing.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Force the simulation backend
    #[arg(short = 's', long)]
    simulate: bool,

    /// Register backend (overrides the config file)
    #[arg(short, long)]
    backend: Option<String>,

    /// Number of CPUs to broadcast to (0 = all in the affinity mask)
    #[arg(long)]
    cpus: Option<usize>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the state of every control
    Status {
        /// Output format
        #[arg(long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },
    /// Apply NAME=VALUE requests through the textual protocol
    Set {
        /// Requests such as PMCCNTR=1
        #[arg(required = true)]
        requests: Vec<String>,
    },
    /// Send a binary set command
    Ioctl {
        /// Control name (PMCCNTR, CNTKCTL)
        control: String,
        /// 0 to disable, 1 to enable
        value: i32,
    },
    /// Enable controls and keep them enabled until interrupted
    Hold {
        /// Controls to enable (default: all)
        controls: Vec<String>,
    },
    /// Device-node session reading requests from stdin
    Shell,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Format {
    Text,
    Json,
}

/// JSON status report.
#[derive(Serialize)]
struct StatusReport<'a> {
    backend: &'a str,
    cpus: usize,
    controls: Vec<ControlStatus>,
}

#[derive(Serialize)]
struct ControlStatus {
    id: usize,
    name: &'static str,
    enabled: Option<bool>,
    modifiable: bool,
}

fn main() {
    if let Err(e) = run() {
        error!("pmuctl failed: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let loaded = load_config(&args);
    let level = match &loaded {
        Ok(config) => Level::from(config.shared.log_level),
        Err(_) => Level::INFO,
    };
    setup_tracing(&args, level);

    let mut config = loaded?;
    if args.simulate {
        config.pmuctl.backend = "simulation".to_string();
    } else if let Some(backend) = &args.backend {
        config.pmuctl.backend = backend.clone();
    }
    if let Some(cpus) = args.cpus {
        config.pmuctl.cpus = cpus;
    }
    config.validate()?;

    info!("pmuctl v{} starting...", env!("CARGO_PKG_VERSION"));
    let backends = BackendRegistry::with_builtin();
    let pmuctl = PmuCtl::start(&config.pmuctl, &backends)?;

    match args.command {
        Command::Status { format } => print_status(&pmuctl, &config.pmuctl.backend, format)?,
        Command::Set { requests } => {
            let node = pmuctl.device();
            for request in &requests {
                check(node.write(request.as_bytes()) as i32, request)?;
            }
            print_snapshot(&node)?;
            warn!("Controls are reset when pmuctl exits; use `hold` to keep them enabled");
        }
        Command::Ioctl { control, value } => {
            let id = parse_control(&control)?;
            let mut buf = PmuctlToggle { enable: value }.to_bytes();
            let node = pmuctl.device();
            check(
                node.ioctl(IoctlCommand::Set(id).code(), UserSlice::readable(&mut buf)),
                &control,
            )?;
            print_snapshot(&node)?;
        }
        Command::Hold { controls } => hold(&pmuctl, &controls)?,
        Command::Shell => shell(pmuctl.device())?,
    }

    pmuctl.shutdown();
    info!("pmuctl shutdown complete");
    Ok(())
}

/// Load the config file, falling back to defaults when the default path is absent.
fn load_config(args: &Args) -> Result<PmuctlFileConfig, ConfigError> {
    match &args.config {
        Some(path) => PmuctlFileConfig::load(path),
        None => match PmuctlFileConfig::load(std::path::Path::new(DEFAULT_CONFIG_PATH)) {
            Err(ConfigError::FileNotFound) => Ok(PmuctlFileConfig::default()),
            other => other,
        },
    }
}

fn parse_control(name: &str) -> Result<ControlId, String> {
    ControlId::from_name(name).ok_or_else(|| format!("unknown control '{name}'"))
}

/// Turn a negative errno into an error naming the request.
fn check(rc: i32, what: &str) -> Result<(), String> {
    if rc < 0 {
        return Err(format!("{what}: {}", Errno::from_raw(-rc)));
    }
    Ok(())
}

fn print_snapshot(node: &DeviceNode<'_>) -> Result<(), String> {
    let mut buf = vec![0u8; node.page_size()];
    let mut offset = 0;
    let rc = node.read(&mut buf, &mut offset);
    check(rc as i32, "read")?;
    print!("{}", String::from_utf8_lossy(&buf[..rc as usize]));
    Ok(())
}

fn print_status(pmuctl: &PmuCtl, backend: &str, format: Format) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        Format::Text => print_snapshot(&pmuctl.device())?,
        Format::Json => {
            let controls: Vec<ControlStatus> = pmuctl.dispatcher().with_token(|registry| {
                registry
                    .iter()
                    .enumerate()
                    .map(|(id, desc)| ControlStatus {
                        id,
                        name: desc.name(),
                        enabled: desc.show(),
                        modifiable: desc.can_modify(),
                    })
                    .collect()
            });
            let report = StatusReport {
                backend,
                cpus: pmuctl.cpu_count(),
                controls,
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(())
}

fn hold(pmuctl: &PmuCtl, controls: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let ids = if controls.is_empty() {
        ControlId::ALL.to_vec()
    } else {
        controls
            .iter()
            .map(|name| parse_control(name))
            .collect::<Result<Vec<_>, _>>()?
    };

    for id in &ids {
        pmuctl.dispatcher().set(id.name(), true)?;
    }
    print_snapshot(&pmuctl.device())?;

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })?;
    info!("Holding {} controls enabled, press Ctrl-C to restore", ids.len());
    rx.recv()?;
    info!("Received shutdown signal");
    Ok(())
}

/// Serve device-node requests from stdin until EOF or `quit`.
fn shell(node: DeviceNode<'_>) -> Result<(), Box<dyn std::error::Error>> {
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        let request = line.trim();
        let mut words = request.split_whitespace();

        match (words.next(), words.next(), words.next()) {
            (None, ..) | (Some("?"), None, None) => report(print_snapshot(&node)),
            (Some("quit" | "exit"), None, None) => break,
            (Some("get"), Some(name), None) => report(shell_get(&node, name)),
            (Some("ioctl"), Some(name), Some(value)) => report(shell_set(&node, name, value)),
            _ => {
                let rc = node.write(request.as_bytes());
                match check(rc as i32, request) {
                    Ok(()) => println!("ok ({rc} bytes)"),
                    Err(e) => println!("error: {e}"),
                }
            }
        }
    }
    Ok(())
}

fn shell_get(node: &DeviceNode<'_>, name: &str) -> Result<(), String> {
    let id = parse_control(name)?;
    let mut buf = [0u8; PAYLOAD_SIZE];
    check(
        node.ioctl(IoctlCommand::Get(id).code(), UserSlice::writable(&mut buf)),
        name,
    )?;
    println!("{}={}", id, PmuctlToggle::from_bytes(buf).enable);
    Ok(())
}

fn shell_set(node: &DeviceNode<'_>, name: &str, value: &str) -> Result<(), String> {
    let id = parse_control(name)?;
    let enable: i32 = value
        .parse()
        .map_err(|_| format!("invalid value '{value}'"))?;
    let mut buf = PmuctlToggle { enable }.to_bytes();
    check(
        node.ioctl(IoctlCommand::Set(id).code(), UserSlice::readable(&mut buf)),
        name,
    )?;
    println!("ok");
    Ok(())
}

fn report(result: Result<(), String>) {
    if let Err(e) = result {
        println!("error: {e}");
    }
}

/// Setup tracing subscriber based on CLI arguments and config level.
fn setup_tracing(args: &Args, level: Level) {
    let level = if args.verbose { Level::DEBUG } else { level };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    // Logs go to stderr so stdout stays parseable.
    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}
