use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use colored::*;
use radioboard::protocol::{
    checksum, decode_error, decode_gps, decode_state, encode_state, ERROR_HEADER, GPS_HEADER,
    MESSAGE_TERMINATOR, STATE_COMMAND_HEADER, STATE_REQUEST_HEADER,
};
use radioboard::types::{GpsFix, SystemState, ValveState};
use radioboard::ErrorRecord;
use serde::Serialize;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, warn};

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: &str = "8090";
const REPLY_TIMEOUT_SECS: u64 = 5;

type CliResult = Result<(), Box<dyn std::error::Error>>;

/// A ground-link message with its checksum verdict.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Decoded {
    State { checksum_ok: bool, state: SystemState },
    Error { checksum_ok: bool, record: ErrorRecord },
    Gps { checksum_ok: bool, fix: GpsFix },
}

#[tokio::main]
async fn main() -> CliResult {
    // Logs go to stderr so JSON output stays clean
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let valve_values = ["open", "closed", "unknown", "illegal"];
    let matches = App::new("radioctl")
        .version("0.1.0")
        .author("Avionics Software Team")
        .about("📻 Ground station tool for the radio board link")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(
            Arg::with_name("host")
                .short("H")
                .long("host")
                .value_name("HOST")
                .help("Radio bridge host address")
                .takes_value(true)
                .default_value(DEFAULT_HOST)
                .global(true),
        )
        .arg(
            Arg::with_name("port")
                .short("p")
                .long("port")
                .value_name("PORT")
                .help("Radio bridge port")
                .takes_value(true)
                .default_value(DEFAULT_PORT)
                .global(true),
        )
        .arg(
            Arg::with_name("format")
                .short("f")
                .long("format")
                .value_name("FORMAT")
                .help("Output format")
                .takes_value(true)
                .possible_values(&["json", "table"])
                .default_value("table")
                .global(true),
        )
        .subcommand(
            SubCommand::with_name("encode")
                .about("🧮 Build a state command without sending it")
                .arg(valve_arg("injector", &valve_values))
                .arg(valve_arg("vent", &valve_values))
                .arg(power_arg()),
        )
        .subcommand(
            SubCommand::with_name("decode")
                .about("🔍 Decode any wire message and verify its checksum")
                .arg(
                    Arg::with_name("message")
                        .help("Message text, header included")
                        .required(true),
                ),
        )
        .subcommand(
            SubCommand::with_name("checksum")
                .about("Compute the checksum symbol of a payload")
                .arg(
                    Arg::with_name("payload")
                        .help("Payload symbols, header and checksum excluded")
                        .required(true),
                ),
        )
        .subcommand(
            SubCommand::with_name("request")
                .about("📊 Ask the radio board for its current state"),
        )
        .subcommand(
            SubCommand::with_name("command")
                .about("🚀 Send desired valve positions and bus power")
                .arg(valve_arg("injector", &valve_values))
                .arg(valve_arg("vent", &valve_values))
                .arg(power_arg()),
        )
        .subcommand(
            SubCommand::with_name("monitor")
                .about("📡 Print every message the radio board sends (Ctrl+C to stop)"),
        )
        .get_matches();

    let host = matches.value_of("host").unwrap_or(DEFAULT_HOST);
    let port: u16 = matches.value_of("port").unwrap_or(DEFAULT_PORT).parse()?;
    let format = matches.value_of("format").unwrap_or("table");

    match matches.subcommand() {
        ("encode", Some(sub)) => {
            let message = encode_state(&command_state(sub));
            println!("{}", printable(&message));
        }
        ("decode", Some(sub)) => {
            let text = sub.value_of("message").unwrap_or_default();
            let mut bytes = text.as_bytes().to_vec();
            if bytes.last() != Some(&MESSAGE_TERMINATOR) {
                bytes.push(MESSAGE_TERMINATOR);
            }
            match decode_message(&bytes) {
                Ok(decoded) => print_decoded(&decoded, format)?,
                Err(e) => {
                    eprintln!("{} {}", "❌".red(), e.bright_red());
                    std::process::exit(1);
                }
            }
        }
        ("checksum", Some(sub)) => {
            let payload = sub.value_of("payload").unwrap_or_default();
            println!("{}", char::from(checksum(payload.as_bytes())));
        }
        ("request", _) => handle_request(host, port, format).await?,
        ("command", Some(sub)) => handle_command(sub, host, port).await?,
        ("monitor", _) => handle_monitor(host, port, format).await?,
        _ => unreachable!("clap requires a subcommand"),
    }

    Ok(())
}

fn valve_arg<'a>(name: &'a str, values: &'a [&'a str]) -> Arg<'a, 'a> {
    Arg::with_name(name)
        .long(name)
        .value_name("STATE")
        .help("Desired valve position")
        .takes_value(true)
        .possible_values(values)
        .default_value("unknown")
}

fn power_arg<'a>() -> Arg<'a, 'a> {
    Arg::with_name("power")
        .long("power")
        .value_name("STATE")
        .help("Bus power")
        .takes_value(true)
        .possible_values(&["on", "off"])
        .default_value("on")
}

fn parse_valve(value: Option<&str>) -> ValveState {
    match value {
        Some("open") => ValveState::Open,
        Some("closed") => ValveState::Closed,
        Some("illegal") => ValveState::Illegal,
        _ => ValveState::Unknown,
    }
}

fn command_state(matches: &ArgMatches<'_>) -> SystemState {
    SystemState {
        injector_valve_state: parse_valve(matches.value_of("injector")),
        vent_valve_state: parse_valve(matches.value_of("vent")),
        bus_is_powered: matches.value_of("power") != Some("off"),
        ..SystemState::default()
    }
}

fn printable(message: &[u8]) -> String {
    String::from_utf8_lossy(message).trim_end().to_string()
}

fn decode_message(message: &[u8]) -> Result<Decoded, String> {
    let trimmed = match message.iter().position(|&b| b == MESSAGE_TERMINATOR) {
        Some(end) => &message[..=end],
        None => message,
    };
    if trimmed.len() < 3 {
        return Err(format!("message too short: {} bytes", trimmed.len()));
    }

    let checksum_at = trimmed.len() - 2;
    let checksum_ok = checksum(&trimmed[1..checksum_at]) == trimmed[checksum_at];
    match trimmed[0] {
        STATE_COMMAND_HEADER => decode_state(trimmed)
            .map(|state| Decoded::State { checksum_ok, state })
            .map_err(|e| e.to_string()),
        ERROR_HEADER => decode_error(trimmed)
            .map(|record| Decoded::Error { checksum_ok, record })
            .map_err(|e| e.to_string()),
        GPS_HEADER => decode_gps(trimmed)
            .map(|fix| Decoded::Gps { checksum_ok, fix })
            .map_err(|e| e.to_string()),
        other => Err(format!("unknown header {:?}", char::from(other))),
    }
}

fn valve_colored(state: ValveState) -> ColoredString {
    match state {
        ValveState::Open => "OPEN".bright_green(),
        ValveState::Closed => "CLOSED".bright_cyan(),
        ValveState::Unknown => "UNKNOWN".yellow(),
        ValveState::Illegal => "ILLEGAL".bright_red(),
    }
}

fn print_decoded(decoded: &Decoded, format: &str) -> CliResult {
    if format == "json" {
        println!("{}", serde_json::to_string(decoded)?);
        return Ok(());
    }

    let checksum_ok = match decoded {
        Decoded::State { checksum_ok, .. }
        | Decoded::Error { checksum_ok, .. }
        | Decoded::Gps { checksum_ok, .. } => *checksum_ok,
    };
    let verdict = if checksum_ok { "ok".green() } else { "BAD".red().bold() };

    match decoded {
        Decoded::State { state, .. } => {
            println!("{} {}", "📊".bright_blue(), "State".bright_blue().bold());
            println!("  {:<18} {}", "Boards:".bright_white(), state.boards_connected);
            println!("  {:<18} {}", "Injector:".bright_white(), valve_colored(state.injector_valve_state));
            println!("  {:<18} {}", "Vent:".bright_white(), valve_colored(state.vent_valve_state));
            println!("  {:<18} {}", "Tank pressure:".bright_white(), state.tank_pressure);
            let power = if state.bus_is_powered { "ON".green() } else { "OFF".red() };
            println!("  {:<18} {}", "Bus power:".bright_white(), power);
            let errors = if state.any_errors_detected { "ACTIVE".red() } else { "none".green() };
            println!("  {:<18} {}", "Errors:".bright_white(), errors);
            println!("  {:<18} {}mV", "Bus battery:".bright_white(), state.bus_battery_mv);
            println!("  {:<18} {}mV", "Vent battery:".bright_white(), state.vent_battery_mv);
        }
        Decoded::Error { record, .. } => {
            println!("{} {}", "⚠️ ".yellow(), "Error report".yellow().bold());
            println!("  {:<18} {:#04x}", "Board:".bright_white(), record.board_id());
            println!("  {:<18} {:?} ({})", "Kind:".bright_white(), record.kind(), record.kind().code());
            println!("  {:<18} {:?}", "Payload:".bright_white(), record.payload());
        }
        Decoded::Gps { fix, .. } => {
            println!("{} {}", "🛰️ ".bright_blue(), "GPS fix".bright_blue().bold());
            println!(
                "  {:<18} {}° {}.{:02}' {}",
                "Latitude:".bright_white(),
                fix.lat_degrees,
                fix.lat_minutes,
                fix.lat_dminutes,
                char::from(fix.lat_direction)
            );
            println!(
                "  {:<18} {}° {}.{:02}' {}",
                "Longitude:".bright_white(),
                fix.lon_degrees,
                fix.lon_minutes,
                fix.lon_dminutes,
                char::from(fix.lon_direction)
            );
        }
    }
    println!("  {:<18} {}", "Checksum:".bright_white(), verdict);
    Ok(())
}

async fn connect(host: &str, port: u16) -> Result<TcpStream, Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", host, port);
    match TcpStream::connect(&addr).await {
        Ok(stream) => {
            debug!(%addr, "connected to radio bridge");
            Ok(stream)
        }
        Err(e) => {
            warn!(%addr, error = %e, "bridge connection failed");
            eprintln!("{} Failed to connect to radio bridge at {}", "❌".red(), addr.bright_white());
            if e.kind() == std::io::ErrorKind::ConnectionRefused {
                eprintln!("{} Bridge is not running. Start the simulator with:", "💡".yellow());
                eprintln!("   {}", "cargo run --bin radioboard-sim".bright_cyan());
            }
            Err(e.into())
        }
    }
}

async fn handle_request(host: &str, port: u16, format: &str) -> CliResult {
    let stream = connect(host, port).await?;
    let (reader, mut writer) = stream.into_split();
    writer.write_all(&[STATE_REQUEST_HEADER, MESSAGE_TERMINATOR]).await?;

    let mut reader = BufReader::new(reader);
    let reply = tokio::time::timeout(Duration::from_secs(REPLY_TIMEOUT_SECS), async {
        let mut line = Vec::new();
        loop {
            line.clear();
            if reader.read_until(MESSAGE_TERMINATOR, &mut line).await? == 0 {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "bridge closed connection",
                ));
            }
            // Error and GPS traffic may arrive ahead of the reply
            if line.first() == Some(&STATE_COMMAND_HEADER) {
                return Ok(line);
            }
            debug!(text = %printable(&line), "skipping traffic ahead of state reply");
        }
    })
    .await;

    let line = match reply {
        Ok(result) => result?,
        Err(_) => {
            eprintln!("{} No reply after {} seconds", "⏰".yellow(), REPLY_TIMEOUT_SECS);
            return Err("request timeout".into());
        }
    };

    let decoded = decode_message(&line)?;
    print_decoded(&decoded, format)
}

async fn handle_command(matches: &ArgMatches<'_>, host: &str, port: u16) -> CliResult {
    let state = command_state(matches);
    let message = encode_state(&state);
    let mut stream = connect(host, port).await?;
    stream.write_all(&message).await?;
    stream.flush().await?;
    debug!(text = %printable(&message), "state command written");

    println!(
        "{} sent {} (injector {}, vent {}, bus {})",
        "✅".green(),
        printable(&message).bright_white(),
        valve_colored(state.injector_valve_state),
        valve_colored(state.vent_valve_state),
        if state.bus_is_powered { "ON".green() } else { "OFF".red() }
    );
    Ok(())
}

async fn handle_monitor(host: &str, port: u16, format: &str) -> CliResult {
    println!("{}", "📡 Monitoring radio link (Press Ctrl+C to stop)...".bright_blue().bold());
    let stream = connect(host, port).await?;
    let mut reader = BufReader::new(stream);
    let mut line = Vec::new();

    loop {
        line.clear();
        if reader.read_until(MESSAGE_TERMINATOR, &mut line).await? == 0 {
            println!("{}", "Bridge closed connection".yellow());
            return Ok(());
        }
        match decode_message(&line) {
            Ok(decoded) => print_decoded(&decoded, format)?,
            Err(e) => eprintln!("{} {} ({})", "❓".yellow(), e.dimmed(), printable(&line)),
        }
    }
}
