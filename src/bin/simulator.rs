use clap::{App, Arg};
use heapless::spsc::Queue;
use radioboard::can::{
    build_analog_reading, build_board_status, build_gps_coordinate, build_valve_status,
    AnalogChannel, CanFrame, FrameError, GpsCoordinate, MessageType,
};
use radioboard::platform::{BatteryMonitor, BusPower, CanRx, CanTx, Clock, TxQueueFull, UartRx, UartTx};
use radioboard::types::ValveKind;
use radioboard::{ErrorKind, RadioBoard, ValveState};
use std::convert::Infallible;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio::time;
use tracing::{debug, error, info, warn};

const DEFAULT_PORT: &str = "8090";
const DEFAULT_TICK_MS: &str = "10";
const DEFAULT_STATUS_SECS: &str = "5";

const CAN_QUEUE_DEPTH: usize = 64;
const UART_QUEUE_DEPTH: usize = 512;
const GROUND_CHANNEL_DEPTH: usize = 64;
const RADIO_BROADCAST_BUFFER_SIZE: usize = 256;

const REPORT_INTERVAL_MS: u64 = 500;
const GPS_REPORT_INTERVAL_MS: u64 = 1000;
const BUS_BATTERY_MV: u16 = 12_400;

const INJECTOR_BOARD_ID: u8 = 0x03;
const VENT_BOARD_ID: u8 = 0x04;
const SENSOR_BOARD_ID: u8 = 0x05;
const GPS_BOARD_ID: u8 = 0x06;

/// Host stand-in for the radio board's peripherals.
struct SimPlatform {
    start: Instant,
    can_rx: Queue<CanFrame, CAN_QUEUE_DEPTH>,
    can_tx: Queue<CanFrame, CAN_QUEUE_DEPTH>,
    uart_rx: Queue<u8, UART_QUEUE_DEPTH>,
    uart_tx: Vec<u8>,
    powered: bool,
}

impl SimPlatform {
    fn new() -> Self {
        Self {
            start: Instant::now(),
            can_rx: Queue::new(),
            can_tx: Queue::new(),
            uart_rx: Queue::new(),
            uart_tx: Vec::new(),
            powered: true,
        }
    }
}

impl Clock for SimPlatform {
    fn millis(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

impl CanRx for SimPlatform {
    fn pop_frame(&mut self) -> nb::Result<CanFrame, Infallible> {
        self.can_rx.pop_frame()
    }
}

impl CanTx for SimPlatform {
    fn enqueue(&mut self, frame: CanFrame) -> Result<(), TxQueueFull> {
        CanTx::enqueue(&mut self.can_tx, frame)
    }
}

impl UartRx for SimPlatform {
    fn read_byte(&mut self) -> nb::Result<u8, Infallible> {
        self.uart_rx.read_byte()
    }
}

impl UartTx for SimPlatform {
    fn transmit(&mut self, bytes: &[u8]) {
        self.uart_tx.extend_from_slice(bytes);
    }
}

impl BusPower for SimPlatform {
    fn is_powered(&self) -> bool {
        self.powered
    }

    fn trigger_powerup(&mut self) {
        if !self.powered {
            info!("🔌 bus power up");
        }
        self.powered = true;
    }

    fn trigger_shutdown(&mut self) {
        if self.powered {
            info!("🔌 bus shutdown");
        }
        self.powered = false;
    }
}

impl BatteryMonitor for SimPlatform {
    fn battery_mv(&self) -> u16 {
        BUS_BATTERY_MV
    }
}

/// Valve, sensor and GPS boards talking on the simulated bus.
struct SimBus {
    injector: ValveState,
    vent: ValveState,
    tank_pressure: u16,
    vent_battery_mv: u16,
    gps: bool,
    last_report: u64,
    last_gps: u64,
}

impl SimBus {
    fn new(gps: bool) -> Self {
        Self {
            injector: ValveState::Closed,
            vent: ValveState::Closed,
            tank_pressure: 400,
            vent_battery_mv: 8_200,
            gps,
            last_report: 0,
            last_gps: 0,
        }
    }

    /// Valve boards act on every command the radio board queued.
    fn apply_commands(&mut self, hw: &mut SimPlatform) {
        while let Some(frame) = hw.can_tx.dequeue() {
            let target = match frame.message_type() {
                Some(MessageType::InjValveCmd) => &mut self.injector,
                Some(MessageType::VentValveCmd) => &mut self.vent,
                _ => continue,
            };
            match frame.valve_state() {
                Ok(state) => {
                    if *target != state {
                        debug!(sid = frame.sid(), %state, "valve moved");
                    }
                    *target = state;
                }
                Err(e) => warn!(error = %e, "valve board rejected command"),
            }
        }
    }

    fn report(&mut self, now: u64, hw: &mut SimPlatform) {
        if !hw.powered {
            return;
        }

        if now.saturating_sub(self.last_report) >= REPORT_INTERVAL_MS {
            self.last_report = now;
            self.step_physics();

            for id in [INJECTOR_BOARD_ID, VENT_BOARD_ID, SENSOR_BOARD_ID, GPS_BOARD_ID] {
                emit(hw, build_board_status(id, now, ErrorKind::Nominal, [0; 4]));
            }
            emit(hw, build_valve_status(ValveKind::Injector, INJECTOR_BOARD_ID, now, self.injector));
            emit(hw, build_valve_status(ValveKind::Vent, VENT_BOARD_ID, now, self.vent));
            emit(
                hw,
                build_analog_reading(SENSOR_BOARD_ID, now, AnalogChannel::TankPressure, self.tank_pressure),
            );
            emit(
                hw,
                build_analog_reading(VENT_BOARD_ID, now, AnalogChannel::VentBattery, self.vent_battery_mv),
            );
        }

        if self.gps && now.saturating_sub(self.last_gps) >= GPS_REPORT_INTERVAL_MS {
            self.last_gps = now;
            let latitude = GpsCoordinate { degrees: 32, minutes: 59, dminutes: 41, direction: b'N' };
            let longitude = GpsCoordinate { degrees: 106, minutes: 58, dminutes: 12, direction: b'W' };
            emit(hw, build_gps_coordinate(MessageType::GpsLatitude, GPS_BOARD_ID, now, latitude));
            emit(hw, build_gps_coordinate(MessageType::GpsLongitude, GPS_BOARD_ID, now, longitude));
        }
    }

    fn step_physics(&mut self) {
        if self.vent == ValveState::Open {
            self.tank_pressure = self.tank_pressure.saturating_sub(15);
        } else if self.injector == ValveState::Open {
            self.tank_pressure = self.tank_pressure.saturating_sub(5);
        } else {
            self.tank_pressure = (self.tank_pressure + 2).min(950);
        }
    }
}

fn emit(hw: &mut SimPlatform, frame: Result<CanFrame, FrameError>) {
    match frame {
        Ok(frame) => {
            if hw.can_rx.enqueue(frame).is_err() {
                warn!("simulated CAN receive queue full, frame dropped");
            }
        }
        Err(e) => error!(error = %e, "simulated board built a bad frame"),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let matches = App::new("radioboard-sim")
        .version("0.1.0")
        .author("Avionics Software Team")
        .about("📻 Radio board simulator with a TCP ground-link bridge")
        .arg(
            Arg::with_name("port")
                .short("p")
                .long("port")
                .value_name("PORT")
                .help("TCP port carrying ground-link bytes")
                .takes_value(true)
                .default_value(DEFAULT_PORT),
        )
        .arg(
            Arg::with_name("tick-ms")
                .long("tick-ms")
                .value_name("MS")
                .help("Main loop period")
                .takes_value(true)
                .default_value(DEFAULT_TICK_MS),
        )
        .arg(
            Arg::with_name("status-secs")
                .long("status-secs")
                .value_name("SECS")
                .help("Interval between JSON status dumps")
                .takes_value(true)
                .default_value(DEFAULT_STATUS_SECS),
        )
        .arg(
            Arg::with_name("no-gps")
                .long("no-gps")
                .help("Run without a GPS board on the bus"),
        )
        .get_matches();

    let port: u16 = matches.value_of("port").unwrap_or(DEFAULT_PORT).parse()?;
    let tick_ms: u64 = matches.value_of("tick-ms").unwrap_or(DEFAULT_TICK_MS).parse()?;
    let status_secs: u64 = matches
        .value_of("status-secs")
        .unwrap_or(DEFAULT_STATUS_SECS)
        .parse()?;

    println!("📻 Radio Board Simulator");
    println!("========================");

    let (ground_tx, mut ground_rx) = mpsc::channel::<Vec<u8>>(GROUND_CHANNEL_DEPTH);
    let (radio_tx, _) = broadcast::channel::<Vec<u8>>(RADIO_BROADCAST_BUFFER_SIZE);

    let server_radio_tx = radio_tx.clone();
    let tcp_server = tokio::spawn(async move {
        if let Err(e) = start_tcp_server(port, ground_tx, server_radio_tx).await {
            error!("TCP server error: {}", e);
        }
    });

    let mut hw = SimPlatform::new();
    let mut bus = SimBus::new(!matches.is_present("no-gps"));
    let mut board = RadioBoard::new();
    board.init();

    let mut tick = time::interval(Duration::from_millis(tick_ms.max(1)));
    let mut status = time::interval(Duration::from_secs(status_secs.max(1)));

    loop {
        tokio::select! {
            _ = tick.tick() => {
                while let Ok(bytes) = ground_rx.try_recv() {
                    for byte in bytes {
                        if hw.uart_rx.enqueue(byte).is_err() {
                            warn!("UART receive queue full, ground byte dropped");
                        }
                    }
                }

                let now = hw.millis();
                bus.apply_commands(&mut hw);
                bus.report(now, &mut hw);
                board.poll(&mut hw);

                if !hw.uart_tx.is_empty() {
                    // No connected clients is not an error
                    let _ = radio_tx.send(std::mem::take(&mut hw.uart_tx));
                }
            }
            _ = status.tick() => {
                let snapshot = board.snapshot(&hw);
                match serde_json::to_string(&snapshot) {
                    Ok(json) => info!("📊 STATUS: {}", json),
                    Err(e) => warn!("Failed to serialize status: {}", e),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested");
                break;
            }
        }
    }

    tcp_server.abort();
    println!("📻 Radio Board Simulator stopped");

    Ok(())
}

async fn start_tcp_server(
    port: u16,
    ground_tx: mpsc::Sender<Vec<u8>>,
    radio_tx: broadcast::Sender<Vec<u8>>,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(("127.0.0.1", port)).await?;
    info!("🌐 Ground-link bridge listening on port {}", port);

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                info!("🔗 Ground station connected: {}", addr);
                let client_ground_tx = ground_tx.clone();
                let client_radio_rx = radio_tx.subscribe();

                tokio::spawn(async move {
                    if let Err(e) = handle_client(stream, client_ground_tx, client_radio_rx).await {
                        warn!("Client {} error: {}", addr, e);
                    }
                    info!("🔌 Ground station {} disconnected", addr);
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}

async fn handle_client(
    stream: TcpStream,
    ground_tx: mpsc::Sender<Vec<u8>>,
    mut radio_rx: broadcast::Receiver<Vec<u8>>,
) -> std::io::Result<()> {
    let (mut reader, mut writer) = stream.into_split();

    let radio_task = tokio::spawn(async move {
        loop {
            match radio_rx.recv().await {
                Ok(bytes) => {
                    if let Err(e) = writer.write_all(&bytes).await {
                        warn!("Failed to forward radio bytes: {}", e);
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Ground station lagging, {} radio bursts skipped", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let mut buffer = [0u8; 256];
    let result = loop {
        match reader.read(&mut buffer).await {
            Ok(0) => break Ok(()),
            Ok(n) => {
                if ground_tx.send(buffer[..n].to_vec()).await.is_err() {
                    break Ok(());
                }
            }
            Err(e) => break Err(e),
        }
    };

    radio_task.abort();
    result
}
