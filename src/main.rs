use clap::{Parser, Subcommand};
use pktsock::capture::{AfPacketProvider, RawSocketProvider};
use pktsock::config::{self, Config};
use pktsock::protocol::{decode, DecodedFrame, MacAddr, ProtocolTag};
use pktsock::session::{Mode, Opened, SessionHandle};
use pktsock::telemetry::init_logging;
use pktsock::Error;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::runtime::Runtime;
use tracing::{debug, info};

#[derive(Parser)]
#[command(name = "pktsock")]
#[command(about = "Capture and send link-layer frames on a raw packet socket")]
struct Cli {
    /// Path to config.toml (defaults apply when omitted)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List network interfaces
    Interfaces,
    /// Print inbound frames
    Capture {
        /// Number of frames to print
        #[arg(short = 'n', long, default_value_t = 10)]
        count: usize,

        /// Push frames as they arrive instead of polling the queue
        #[arg(long)]
        active: bool,

        /// Print frames as hex instead of decoded headers
        #[arg(long)]
        raw: bool,

        /// Only frames carrying this protocol (dix, ip, tcp, udp, icmp)
        #[arg(short, long)]
        protocol: Option<ProtocolTag>,

        /// Only frames to or from this MAC address
        #[arg(long)]
        mac: Option<MacAddr>,

        /// Delay between polls when the queue is empty
        #[arg(long, default_value_t = 100)]
        poll_ms: u64,
    },
    /// Send a hex-encoded frame
    Send {
        /// Outgoing interface
        #[arg(short, long)]
        interface: String,

        /// Frame bytes as hex, e.g. "ffffffffffff 001122334455 0800 ..."
        frame: String,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Validate config.toml
    Validate,
}

struct CaptureOptions {
    count: usize,
    active: bool,
    raw: bool,
    filter: FrameFilter,
    poll: Duration,
}

#[derive(Debug, Clone, Default)]
struct FrameFilter {
    protocol: Option<ProtocolTag>,
    mac: Option<MacAddr>,
}

impl FrameFilter {
    fn is_empty(&self) -> bool {
        self.protocol.is_none() && self.mac.is_none()
    }

    fn matches(&self, frame: &DecodedFrame) -> bool {
        if let Some(protocol) = self.protocol {
            if !frame.contains(protocol) {
                return false;
            }
        }
        if let Some(mac) = self.mac {
            let Some(dix) = frame.header(ProtocolTag::Dix) else {
                return false;
            };
            let hit = |name: &str| dix.bytes(name) == Some(&mac.0[..]);
            if !hit("dst") && !hit("src") {
                return false;
            }
        }
        true
    }
}

fn main() {
    let cli = Cli::parse();

    let cfg = match load_config(cli.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("[ERROR] {}", e);
            std::process::exit(1);
        }
    };

    // RUST_LOG still takes priority over the config file
    init_logging(Some(&cfg.logging));

    let result = match cli.command {
        Commands::Interfaces => cmd_interfaces(&cfg),
        Commands::Capture {
            count,
            active,
            raw,
            protocol,
            mac,
            poll_ms,
        } => cmd_capture(
            &cfg,
            CaptureOptions {
                count,
                active,
                raw,
                filter: FrameFilter { protocol, mac },
                poll: Duration::from_millis(poll_ms),
            },
        ),
        Commands::Send { interface, frame } => cmd_send(&cfg, &interface, &frame),
        Commands::Config {
            action: ConfigAction::Validate,
        } => cmd_config_validate(&cfg),
    };

    if let Err(e) = result {
        eprintln!("[ERROR] {}", e);
        std::process::exit(1);
    }
}

fn load_config(path: Option<&Path>) -> Result<Config, String> {
    match path {
        Some(path) => {
            config::load(path).map_err(|e| format!("Failed to load {}: {}", path.display(), e))
        }
        None => Ok(Config::default()),
    }
}

fn cmd_interfaces(cfg: &Config) -> Result<(), String> {
    let provider = AfPacketProvider::from_config(&cfg.session);
    let names = provider
        .list_interfaces()
        .map_err(|e| format!("Failed to list interfaces: {}", e))?;
    for name in names {
        println!("{}", name);
    }
    Ok(())
}

fn cmd_capture(cfg: &Config, opts: CaptureOptions) -> Result<(), String> {
    require_valid(cfg)?;

    let rt = Runtime::new().map_err(|e| format!("Failed to create runtime: {}", e))?;

    rt.block_on(async move {
        let handle = SessionHandle::spawn(AfPacketProvider::from_config(&cfg.session), &cfg.session);

        let mode = if opts.active {
            Mode::Active
        } else {
            Mode::Passive
        };
        let opened = handle
            .open(mode)
            .await
            .map_err(|e| format!("Failed to open session: {}. Run with root privileges.", e))?;

        info!("Capturing {} frames ({:?} mode)...", opts.count, mode);

        match opened {
            Opened::Active(mut frames) => {
                let mut printed = 0;
                while printed < opts.count {
                    let Some(frame) = frames.recv().await else {
                        break;
                    };
                    let decoded = decode(&frame);
                    if opts.filter.matches(&decoded) {
                        print_frame(&frame, &decoded, opts.raw);
                        printed += 1;
                    }
                }
            }
            Opened::Passive => {
                poll_queue(&handle, &opts).await?;

                let stats = handle
                    .stats()
                    .await
                    .map_err(|e| format!("Failed to read stats: {}", e))?;
                info!(
                    "Queue: {}/{} queued, serviced={}, dropped={}",
                    stats.queue_length, stats.max_queue_length, stats.serviced, stats.dropped
                );
            }
        }

        handle
            .close()
            .await
            .map_err(|e| format!("Failed to close session: {}", e))
    })
}

async fn poll_queue(handle: &SessionHandle, opts: &CaptureOptions) -> Result<(), String> {
    let mut printed = 0;

    while printed < opts.count {
        let wanted = opts.count - printed;
        let result = if opts.filter.is_empty() {
            handle.receive(wanted).await.map(|frames| {
                for frame in &frames {
                    print_frame(frame, &decode(frame), opts.raw);
                }
                frames.len()
            })
        } else {
            let filter = opts.filter.clone();
            handle
                .receive_parsed(move |frame| filter.matches(frame), wanted)
                .await
                .map(|frames| {
                    for frame in &frames {
                        print_frame(&frame.to_bytes(), frame, opts.raw);
                    }
                    frames.len()
                })
        };

        match result {
            Ok(n) => printed += n,
            Err(Error::Eagain) => {
                debug!("Queue empty, sleeping {:?}", opts.poll);
                tokio::time::sleep(opts.poll).await;
            }
            Err(e) => return Err(format!("Receive failed: {}", e)),
        }
    }

    Ok(())
}

fn print_frame(bytes: &[u8], decoded: &DecodedFrame, raw: bool) {
    if raw {
        println!("{}", hex::encode(bytes));
    } else {
        println!("{}", decoded);
    }
}

fn cmd_send(cfg: &Config, interface: &str, frame_hex: &str) -> Result<(), String> {
    require_valid(cfg)?;
    let frame = parse_hex(frame_hex)?;

    let rt = Runtime::new().map_err(|e| format!("Failed to create runtime: {}", e))?;
    rt.block_on(async move {
        let handle = SessionHandle::spawn(AfPacketProvider::from_config(&cfg.session), &cfg.session);
        handle
            .open(Mode::Passive)
            .await
            .map_err(|e| format!("Failed to open session: {}. Run with root privileges.", e))?;

        let len = frame.len();
        let sent = handle.send(interface, frame).await;
        // Close even when the send failed
        let closed = handle.close().await;

        sent.map_err(|e| format!("Failed to send on {}: {}", interface, e))?;
        closed.map_err(|e| format!("Failed to close session: {}", e))?;
        info!("Sent {} bytes on {}", len, interface);
        Ok(())
    })
}

fn cmd_config_validate(cfg: &Config) -> Result<(), String> {
    require_valid(cfg)?;
    println!("[INFO] Configuration is valid");
    Ok(())
}

/// Print diagnostics and refuse to go on if the config has errors
fn require_valid(cfg: &Config) -> Result<(), String> {
    let validation = config::validate(cfg);
    validation.print_diagnostics();

    if validation.has_errors() {
        Err("Validation failed".to_string())
    } else {
        Ok(())
    }
}

/// Parse hex digits, ignoring whitespace and ':' / '-' separators
fn parse_hex(s: &str) -> Result<Vec<u8>, String> {
    let digits: String = s
        .chars()
        .filter(|c| !c.is_ascii_whitespace() && *c != ':' && *c != '-')
        .collect();

    hex::decode(digits).map_err(|e| format!("Invalid frame hex: {}", e))
}
