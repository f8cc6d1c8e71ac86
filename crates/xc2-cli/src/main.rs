//! Command-line driver for an XC2/Modbus-XC2 bus — `spec.md` §7 "CLI tooling".
//!
//! Thin wrapper over `xc2-bus`/`xc2-device`/`xc2-registers`: pick a transport, optionally
//! address one device on it, and run a single request/response or broadcast.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::Mutex;

use xc2_bus::selector::WireFrame;
use xc2_bus::{BusPort, Protocol, SerialBus, TcpBus};
use xc2_device::DeviceSession;
use xc2_protocol::consts::{DeviceType, XC2Addr, XC2Commands, XC2PacketType, DEFAULT_MAX_PKT_DATA_SIZE, TIMEOUT_RESPONSE_MS};
use xc2_protocol::{ModbusPacket, XC2Packet};
use xc2_registers::RegValue;

#[derive(Parser)]
#[command(name = "xc2-cli", about = "Talk to XC2 / Modbus-XC2 devices over serial or TCP")]
struct Cli {
    #[command(flatten)]
    transport: Transport,

    /// Wire protocol to speak on the transport.
    #[arg(long, value_enum, default_value = "xc2")]
    protocol: ProtocolArg,

    /// This host's bus address.
    #[arg(long, default_value_t = XC2Addr::Master as u16)]
    my_addr: u16,

    /// Request/response timeout in milliseconds.
    #[arg(long, default_value_t = TIMEOUT_RESPONSE_MS)]
    timeout_ms: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args)]
struct Transport {
    /// Serial device path, e.g. /dev/ttyUSB0.
    #[arg(long)]
    serial: Option<String>,

    /// Baud rate for `--serial`.
    #[arg(long, default_value_t = 115200)]
    baud: u32,

    /// TCP endpoint, e.g. 192.168.1.50:4660.
    #[arg(long)]
    tcp: Option<String>,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum ProtocolArg {
    Xc2,
    Modbus,
}

impl From<ProtocolArg> for Protocol {
    fn from(value: ProtocolArg) -> Self {
        match value {
            ProtocolArg::Xc2 => Protocol::Xc2,
            ProtocolArg::Modbus => Protocol::Modbus,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Sends `CMD_ECHO` to one device and prints whether it answered from bootloader or
    /// application firmware.
    Echo {
        #[arg(long)]
        addr: u16,
    },
    /// Resets one device (`SYS_RESET`).
    Reset {
        #[arg(long)]
        addr: u16,
    },
    /// Discovers a device's register structure and reads one register.
    ReadReg {
        #[arg(long)]
        addr: u16,
        #[arg(long)]
        device_type: DeviceTypeArg,
        name: String,
    },
    /// Discovers a device's register structure and writes one register.
    WriteReg {
        #[arg(long)]
        addr: u16,
        #[arg(long)]
        device_type: DeviceTypeArg,
        name: String,
        value: String,
    },
    /// Broadcasts `CMD_ECHO` and lists every address that answered.
    Scan,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum DeviceTypeArg {
    Generic,
    Aio,
    Cvm24p,
    Cvm32a,
    Dio,
    Pmm,
    Rel,
    Xam,
    Evm8,
    Evm8Core,
    Cvm64h,
    Hvload,
    Dctrl,
    Mis,
}

impl From<DeviceTypeArg> for DeviceType {
    fn from(value: DeviceTypeArg) -> Self {
        match value {
            DeviceTypeArg::Generic => DeviceType::Generic,
            DeviceTypeArg::Aio => DeviceType::Aio,
            DeviceTypeArg::Cvm24p => DeviceType::Cvm24p,
            DeviceTypeArg::Cvm32a => DeviceType::Cvm32a,
            DeviceTypeArg::Dio => DeviceType::Dio,
            DeviceTypeArg::Pmm => DeviceType::Pmm,
            DeviceTypeArg::Rel => DeviceType::Rel,
            DeviceTypeArg::Xam => DeviceType::Xam,
            DeviceTypeArg::Evm8 => DeviceType::Evm8,
            DeviceTypeArg::Evm8Core => DeviceType::Evm8Core,
            DeviceTypeArg::Cvm64h => DeviceType::Cvm64h,
            DeviceTypeArg::Hvload => DeviceType::Hvload,
            DeviceTypeArg::Dctrl => DeviceType::Dctrl,
            DeviceTypeArg::Mis => DeviceType::Mis,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();
    let cli = Cli::parse();
    let protocol: Protocol = cli.protocol.into();
    let timeout = Duration::from_millis(cli.timeout_ms);

    let mut bus = build_bus(&cli.transport, protocol)?;
    bus.connect().await.context("connecting to transport")?;
    let bus: Arc<Mutex<dyn BusPort>> = Arc::new(Mutex::new(bus));

    match cli.command {
        Command::Echo { addr } => {
            let session = DeviceSession::new(bus, protocol, cli.my_addr, addr, format!("dev-{addr:#x}"), DeviceType::Generic);
            let echo = session.get_echo().await?;
            println!("{echo:?}");
        }
        Command::Reset { addr } => {
            let session = DeviceSession::new(bus, protocol, cli.my_addr, addr, format!("dev-{addr:#x}"), DeviceType::Generic);
            session.reset().await?;
            println!("reset sent to {addr:#x}");
        }
        Command::ReadReg { addr, device_type, name } => {
            let session = DeviceSession::new(bus, protocol, cli.my_addr, addr, format!("dev-{addr:#x}"), device_type.into());
            session.initial_structure_reading(DEFAULT_MAX_PKT_DATA_SIZE).await?;
            let value = session.read_reg(&name).await?;
            println!("{name} = {}", format_reg_value(&value));
        }
        Command::WriteReg { addr, device_type, name, value } => {
            let session = DeviceSession::new(bus, protocol, cli.my_addr, addr, format!("dev-{addr:#x}"), device_type.into());
            session.initial_structure_reading(DEFAULT_MAX_PKT_DATA_SIZE).await?;
            let parsed = parse_reg_value(&value)?;
            session.write_reg(&name, &parsed).await?;
            println!("{name} <- {}", format_reg_value(&parsed));
        }
        Command::Scan => {
            let pkt = XC2Packet::new(XC2PacketType::Command, XC2Addr::Broadcast as u16, cli.my_addr, XC2Commands::CMD_ECHO, Vec::new(), 0);
            let frame = match protocol {
                Protocol::Xc2 => WireFrame::Xc2(pkt),
                Protocol::Modbus => WireFrame::Modbus(ModbusPacket::new(pkt)),
            };
            let replies = bus.lock().await.broadcast(frame, Some(timeout)).await.context("broadcasting echo")?;
            for reply in replies {
                println!("{:#05x}", reply.src());
            }
        }
    }
    Ok(())
}

fn build_bus(transport: &Transport, protocol: Protocol) -> Result<Box<dyn BusPort>> {
    match (&transport.serial, &transport.tcp) {
        (Some(port), None) => Ok(Box::new(SerialBus::serial(port.clone(), transport.baud, protocol))),
        (None, Some(endpoint)) => {
            let (host, port) = endpoint.rsplit_once(':').ok_or_else(|| anyhow!("--tcp expects host:port"))?;
            let port: u16 = port.parse().context("parsing TCP port")?;
            Ok(Box::new(TcpBus::tcp(host.to_string(), port, protocol)))
        }
        _ => bail!("exactly one of --serial or --tcp must be given"),
    }
}

fn format_reg_value(value: &RegValue) -> String {
    match value {
        RegValue::Bool(b) => b.to_string(),
        RegValue::Int(i) => i.to_string(),
        RegValue::UInt(u) => u.to_string(),
        RegValue::Float(f) => f.to_string(),
        RegValue::Str(s) => s.clone(),
        RegValue::Array(items) => {
            let parts: Vec<String> = items.iter().map(format_reg_value).collect();
            format!("[{}]", parts.join(", "))
        }
    }
}

/// Parses a command-line register value the same way the device typer classifies replies
/// (`xct_protocol::retype_value`), minus string quoting: comma-separated becomes an array,
/// `true`/`false` becomes a bool, a parseable integer or float is numeric, anything else is
/// a plain string.
fn parse_reg_value(raw: &str) -> Result<RegValue> {
    if raw.contains(',') {
        let items: Result<Vec<RegValue>> = raw.split(',').map(|part| parse_reg_value(part.trim())).collect();
        return Ok(RegValue::Array(items?));
    }
    if raw.eq_ignore_ascii_case("true") {
        return Ok(RegValue::Bool(true));
    }
    if raw.eq_ignore_ascii_case("false") {
        return Ok(RegValue::Bool(false));
    }
    if let Ok(n) = i64::from_str(raw) {
        return Ok(RegValue::Int(n));
    }
    if let Ok(f) = f32::from_str(raw) {
        if raw.contains('.') {
            return Ok(RegValue::Float(f));
        }
    }
    Ok(RegValue::Str(raw.to_string()))
}
