//! pjctl: entry point.
//!
//! ```text
//! pjctl get <name>                 Read a named value
//! pjctl set <name> <value>         Change a named value
//! pjctl raw <code> [--reference]   Send an arbitrary opcode
//! pjctl listen                     Print state changes as JSON lines
//! pjctl list                       Show the command table
//! pjctl --gen-config               Write default config to stdout
//! ```

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use pjctl::catalog::{self, CATALOG, Capability, CommandDescriptor};
use pjctl::config::PjctlConfig;
use pjctl::poller::Poller;
use pjctl_core::{CommandFrame, Device, PjError, Transport};

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "pjctl", about = "Control a networked projector")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "pjctl.toml")]
    config: PathBuf,

    /// Device host, overrides the config file.
    #[arg(long)]
    host: Option<String>,

    /// Device port, overrides the config file.
    #[arg(long)]
    port: Option<u16>,

    /// Session password, overrides the config file.
    #[arg(long)]
    password: Option<String>,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Read a named value.
    Get { name: String },
    /// Change a named value.
    Set { name: String, value: String },
    /// Send an arbitrary opcode.
    Raw {
        code: String,
        /// Send as a reference query and print the response.
        #[arg(long)]
        reference: bool,
    },
    /// Poll the device and print state changes as JSON lines.
    Listen,
    /// Show the command table.
    List,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = toml::to_string_pretty(&PjctlConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let Some(command) = cli.command else {
        eprintln!("no command given; see --help");
        std::process::exit(2);
    };

    if let Command::List = command {
        list();
        return Ok(());
    }

    let mut config = PjctlConfig::load(&cli.config);
    if let Some(host) = cli.host {
        config.device.host = host;
    }
    if let Some(port) = cli.port {
        config.device.port = port;
    }
    if let Some(password) = cli.password {
        config.device.password = password;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let device = Device::new(config.to_device_config())?;
    info!("pjctl v{} → {}", env!("CARGO_PKG_VERSION"), device.info());

    let result = match command {
        Command::Get { name } => get(&device, &name).await,
        Command::Set { name, value } => set(&device, &name, &value).await,
        Command::Raw { code, reference } => raw(&device, code, reference).await,
        Command::Listen => {
            let ctrl_c = async {
                tokio::signal::ctrl_c().await.ok();
                info!("Ctrl-C received, stopping");
            };
            listen(&device, &config, ctrl_c).await
        }
        Command::List => Ok(()),
    };

    device.disconnect().await;
    result?;
    Ok(())
}

// ── Commands ─────────────────────────────────────────────────────

fn descriptor(name: &str) -> Result<&'static CommandDescriptor, PjError> {
    catalog::lookup(name).ok_or_else(|| PjError::InvalidCommand(format!("unknown command '{name}'")))
}

async fn get(device: &Device, name: &str) -> Result<(), PjError> {
    let mut batch = [descriptor(name)?.reference()?];
    device.send(&mut batch).await?;
    print_response(&batch[0])
}

async fn set(device: &Device, name: &str, value: &str) -> Result<(), PjError> {
    let mut batch = [descriptor(name)?.operation(value)?];
    device.send(&mut batch).await?;
    if !batch[0].ack {
        return Err(PjError::Command(format!("{} was not acknowledged", batch[0].opcode())));
    }
    Ok(())
}

async fn raw(device: &Device, code: String, reference: bool) -> Result<(), PjError> {
    let frame = if reference {
        CommandFrame::reference(code)
    } else {
        CommandFrame::operation(code)
    };
    let mut batch = [frame];
    device.send(&mut batch).await?;
    if reference {
        print_response(&batch[0])
    } else if batch[0].ack {
        Ok(())
    } else {
        Err(PjError::Command(format!("{} was not acknowledged", batch[0].opcode())))
    }
}

fn print_response(frame: &CommandFrame) -> Result<(), PjError> {
    match &frame.response {
        Some(value) => {
            println!("{value}");
            Ok(())
        }
        None => Err(PjError::Command(format!("no response for {}", frame.opcode()))),
    }
}

fn list() {
    for d in CATALOG {
        let mut modes = Vec::new();
        if d.caps.contains(Capability::REFERENCE) {
            modes.push("get");
        }
        if d.caps.contains(Capability::OPERATION) {
            modes.push("set");
        }
        let values: Vec<&str> = d.values.iter().map(|(_, name)| *name).collect();
        println!("{:<14} {:<5} {:<8} {}", d.name, d.code, modes.join("/"), values.join(" "));
    }
}

/// Poll until `shutdown` resolves, printing each non-empty change set as
/// one JSON line. A poll in progress is abandoned on shutdown.
async fn listen<T: Transport>(
    device: &Device<T>,
    config: &PjctlConfig,
    shutdown: impl Future<Output = ()>,
) -> Result<(), PjError> {
    let polling = &config.polling;
    let mut poller = Poller::new(Duration::from_secs(polling.full_sync_secs));
    let mut failures = 0u32;

    tokio::pin!(shutdown);

    loop {
        let outcome = tokio::select! {
            _ = &mut shutdown => break,
            outcome = poller.poll(device) => outcome,
        };

        let pause = match outcome {
            Ok(changes) => {
                failures = 0;
                if !changes.is_empty() {
                    match serde_json::to_string(&changes) {
                        Ok(line) => println!("{line}"),
                        Err(e) => warn!("cannot encode changes: {e}"),
                    }
                }
                Duration::from_secs(polling.interval_secs)
            }
            Err(e) if e.is_terminal() => return Err(e),
            Err(e) if e.is_timeout() => {
                // A projector without signal ignores some queries; one miss is normal.
                failures += 1;
                if failures > 1 {
                    warn!("poll timed out: {e}");
                }
                Duration::from_secs(polling.timeout_backoff_secs)
            }
            Err(e) => {
                failures += 1;
                warn!("poll failed: {e}");
                Duration::from_secs(polling.error_backoff_secs)
            }
        };

        tokio::select! {
            _ = &mut shutdown => break,
            _ = tokio::time::sleep(pause) => {}
        }
    }

    Ok(())
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use pjctl_core::ProtocolTiming;
    use pjctl_core::fake::{DeviceScript, FakeTransport};
    use tokio::time::{Instant, sleep};

    fn device(script: DeviceScript) -> (FakeTransport, Device<FakeTransport>) {
        let fake = FakeTransport::new(script);
        let device = Device::with_transport(fake.clone(), None, ProtocolTiming::default());
        (fake, device)
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_interrupts_poll_in_backoff() {
        // Refused forever: one poll would spend ~9 s backing off.
        let (fake, device) = device(DeviceScript::default().refuse(u32::MAX));
        let start = Instant::now();

        let result = listen(
            &device,
            &PjctlConfig::default(),
            sleep(Duration::from_millis(500)),
        )
        .await;

        assert!(result.is_ok());
        assert!(start.elapsed() < Duration::from_secs(1));
        assert!(fake.refusals() < 10);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_interrupts_pause_between_polls() {
        let (fake, device) = device(DeviceScript::default().value("PW", b"0"));
        let start = Instant::now();

        let result = listen(
            &device,
            &PjctlConfig::default(),
            sleep(Duration::from_secs(3)),
        )
        .await;

        assert!(result.is_ok());
        assert!(start.elapsed() < Duration::from_secs(4));
        assert!(fake.connects() >= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn terminal_error_ends_listen() {
        let (_fake, device) = device(DeviceScript::default().auth_reply(b"PJNAK"));
        let result = listen(&device, &PjctlConfig::default(), std::future::pending()).await;
        assert!(matches!(result, Err(PjError::Auth)));
    }
}
