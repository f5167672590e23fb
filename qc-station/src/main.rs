use std::env;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process;

use crossterm::style::Stylize;
use log::LevelFilter;
use qc_station::config::{FrontEnd, TransportKind};
use qc_station::console::{Console, Line, Tone, TranscriptLogger};
use qc_station::persistence::JsonFileStore;
use qc_station::persistence::ResultStore;
use qc_station::transport::{BlePeripheral, SimulatedPeripheral, Transport};
use qc_station::{Orchestrator, StationConfig};
use tokio::io::{AsyncBufReadExt, BufReader};

const USAGE: &str = "Usage: qc-station [--config <path>] [--front-end <kiosk|technician>] \
                     [--transport <ble|simulated>]";

#[derive(Debug, Default)]
struct Args {
    config: Option<PathBuf>,
    front_end: Option<FrontEnd>,
    transport: Option<TransportKind>,
}

#[tokio::main]
async fn main() -> io::Result<()> {
    env_logger::Builder::new()
        .filter_level(LevelFilter::Info)
        .format_timestamp_millis()
        .parse_default_env()
        .init();

    let args = parse_args().unwrap_or_else(|err| {
        eprintln!("{err}");
        eprintln!("{USAGE}");
        process::exit(2);
    });

    let mut config = StationConfig::load(args.config.as_deref());
    if let Some(front_end) = args.front_end {
        config.front_end = front_end;
    }
    if let Some(transport) = args.transport {
        config.transport = transport;
    }

    let store = JsonFileStore::new(&config.storage.results_dir);
    let orchestrator = match config.transport {
        TransportKind::Ble => match config.gatt.uuids() {
            Ok(uuids) => spawn_or_exit(BlePeripheral::new(uuids), store, &config),
            Err(err) => {
                log::error!("{err}");
                process::exit(2);
            }
        },
        TransportKind::Simulated => {
            let transport = SimulatedPeripheral::new(config.simulator.clone(), config.gatt.clone());
            spawn_or_exit(transport, store, &config)
        }
    };
    log::info!("driving the {:?} transport", config.transport);

    let transcript = match &config.storage.transcript_path {
        Some(path) => Some(TranscriptLogger::create(path, "BLE QC station transcript")?),
        None => None,
    };
    let mut console = Console::new(config.front_end, transcript, orchestrator.snapshot());
    let mut snapshots = orchestrator.subscribe();
    let mut input = BufReader::new(tokio::io::stdin()).lines();
    let mut writer = io::stdout();

    print_line(&mut writer, &console.banner())?;
    prompt(&mut writer)?;

    loop {
        tokio::select! {
            line = input.next_line() => {
                let Some(line) = line? else {
                    writeln!(writer)?;
                    break;
                };

                let response = console.handle_line(&orchestrator, &line).await?;
                for line in &response.lines {
                    print_line(&mut writer, line)?;
                }
                if response.exit {
                    break;
                }
                prompt(&mut writer)?;
            }
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                let updates = console.observe(&snapshot)?;
                if !updates.is_empty() {
                    writeln!(writer)?;
                    for line in &updates {
                        print_line(&mut writer, line)?;
                    }
                    prompt(&mut writer)?;
                }
            }
        }
    }

    orchestrator.shutdown().await.map_err(io::Error::other)
}

fn spawn_or_exit(
    transport: impl Transport + 'static,
    store: impl ResultStore + 'static,
    config: &StationConfig,
) -> Orchestrator {
    Orchestrator::spawn(transport, store, config).unwrap_or_else(|err| {
        log::error!("{err}");
        process::exit(2);
    })
}

fn prompt(writer: &mut impl Write) -> io::Result<()> {
    write!(writer, "> ")?;
    writer.flush()
}

fn print_line(writer: &mut impl Write, line: &Line) -> io::Result<()> {
    let text = line.text.as_str();
    match line.tone {
        Tone::Plain => writeln!(writer, "{text}"),
        Tone::Good => writeln!(writer, "{}", text.green()),
        Tone::Warn => writeln!(writer, "{}", text.yellow()),
        Tone::Bad => writeln!(writer, "{}", text.red().bold()),
        Tone::Dim => writeln!(writer, "{}", text.dark_grey()),
    }
}

fn parse_args() -> Result<Args, String> {
    let mut parsed = Args::default();
    let mut args = env::args().skip(1);

    while let Some(arg) = args.next() {
        if let Some(value) = arg.strip_prefix("--config=") {
            parsed.config = Some(PathBuf::from(value));
        } else if arg == "--config" {
            let value = args
                .next()
                .ok_or_else(|| "Expected value after --config".to_string())?;
            parsed.config = Some(PathBuf::from(value));
        } else if let Some(value) = arg.strip_prefix("--front-end=") {
            parsed.front_end = Some(FrontEnd::from_tag(value)?);
        } else if arg == "--front-end" {
            let value = args
                .next()
                .ok_or_else(|| "Expected value after --front-end".to_string())?;
            parsed.front_end = Some(FrontEnd::from_tag(&value)?);
        } else if let Some(value) = arg.strip_prefix("--transport=") {
            parsed.transport = Some(TransportKind::from_tag(value)?);
        } else if arg == "--transport" {
            let value = args
                .next()
                .ok_or_else(|| "Expected value after --transport".to_string())?;
            parsed.transport = Some(TransportKind::from_tag(&value)?);
        } else {
            return Err(format!("Unknown argument `{arg}`"));
        }
    }

    Ok(parsed)
}
