//! CLI tool for SynScan Wi-Fi mount control.
//!
//! Subcommands:
//! - `goto`: Slew to an absolute azimuth/altitude and wait for completion
//! - `track`: Move at a constant speed per axis until stopped
//! - `stop`: Stop both motors
//! - `sync`: Re-synchronize the mount's position without moving
//! - `status`: Print position and per-motor status once
//! - `watch`: Print position and status periodically
//! - `switch`: Toggle the auxiliary switch output
//! - `discover`: Probe a /24 subnet for reachable mounts

use std::net::IpAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use synscan::transport::{DEFAULT_ADDR, DEFAULT_PORT};
use synscan::{MotionSpeed, Mount};
use tracing::info;

/// SynScan Wi-Fi mount control tool
#[derive(Parser, Debug)]
#[command(name = "synscan_tool")]
#[command(about = "Control tool for SkyWatcher SynScan Wi-Fi mounts")]
#[command(version)]
struct Args {
    /// Mount IP address
    #[arg(long, global = true, default_value = DEFAULT_ADDR, env = "SYNSCAN_UDP_IP")]
    host: IpAddr,

    /// Mount UDP port
    #[arg(long, global = true, default_value_t = DEFAULT_PORT, env = "SYNSCAN_UDP_PORT")]
    port: u16,

    /// Per-request reply timeout in seconds
    #[arg(long, global = true, default_value_t = 2.0)]
    timeout: f64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Slew to a target azimuth/altitude and wait until motion stops
    Goto {
        /// Target azimuth in degrees
        azimuth: f64,

        /// Target altitude in degrees
        altitude: f64,

        /// Speed class for the slew
        #[arg(long, value_enum, default_value = "fast")]
        speed: MotionSpeed,

        /// Completion poll interval in seconds
        #[arg(long, default_value_t = 0.5)]
        poll: f64,
    },

    /// Move at constant speeds (degrees per second, sign is direction)
    Track {
        /// Azimuth axis speed
        azimuth_speed: f64,

        /// Altitude axis speed
        altitude_speed: f64,
    },

    /// Stop both motors
    Stop {
        /// Stop immediately instead of decelerating
        #[arg(long)]
        instant: bool,
    },

    /// Re-synchronize the mount position with the given angles (no motion)
    Sync {
        /// Actual azimuth in degrees
        azimuth: f64,

        /// Actual altitude in degrees
        altitude: f64,
    },

    /// Print position and per-motor status once
    Status,

    /// Print position and per-motor status periodically
    Watch {
        /// Refresh interval in seconds
        #[arg(long, default_value_t = 1.0)]
        seconds: f64,
    },

    /// Turn the auxiliary switch output on or off
    Switch {
        /// Desired switch state
        #[arg(value_enum)]
        state: SwitchState,

        /// Revert the switch after this many seconds (0 = leave as set)
        #[arg(long, default_value_t = 0.0)]
        seconds: f64,
    },

    /// Probe a /24 subnet for reachable mounts
    Discover {
        /// Subnet prefix to scan (first three octets)
        #[arg(long, default_value = "192.168.4")]
        subnet: String,

        /// Per-host probe timeout in seconds
        #[arg(long, default_value_t = 0.5)]
        probe_timeout: f64,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum SwitchState {
    On,
    Off,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let timeout = Duration::from_secs_f64(args.timeout);

    match args.command {
        Command::Goto {
            azimuth,
            altitude,
            speed,
            poll,
        } => cmd_goto(&args, timeout, (azimuth, altitude), speed, poll),
        Command::Track {
            azimuth_speed,
            altitude_speed,
        } => cmd_track(&args, timeout, (azimuth_speed, altitude_speed)),
        Command::Stop { instant } => cmd_stop(&args, timeout, instant),
        Command::Sync { azimuth, altitude } => cmd_sync(&args, timeout, (azimuth, altitude)),
        Command::Status => cmd_status(&args, timeout),
        Command::Watch { seconds } => cmd_watch(&args, timeout, seconds),
        Command::Switch { state, seconds } => cmd_switch(&args, timeout, state, seconds),
        Command::Discover {
            subnet,
            probe_timeout,
        } => cmd_discover(&subnet, args.port, Duration::from_secs_f64(probe_timeout)),
    }
}

fn connect(args: &Args, timeout: Duration) -> Result<Mount> {
    info!("Connecting to mount at {}:{}...", args.host, args.port);
    Mount::wifi_mount(args.host, args.port, timeout)
        .with_context(|| format!("failed to initialize mount at {}:{}", args.host, args.port))
}

fn cmd_goto(
    args: &Args,
    timeout: Duration,
    target: (f64, f64),
    speed: MotionSpeed,
    poll: f64,
) -> Result<()> {
    let mount = connect(args, timeout)?;

    info!(
        "Slewing to azimuth {:.3} deg, altitude {:.3} deg...",
        target.0, target.1
    );
    mount.goto(target, speed, Duration::from_secs_f64(poll))?;

    let (azimuth, altitude) = mount.get_position_degrees()?;
    info!("Done! Position: ({azimuth:.3}, {altitude:.3}) deg");
    Ok(())
}

fn cmd_track(args: &Args, timeout: Duration, speeds: (f64, f64)) -> Result<()> {
    let mount = connect(args, timeout)?;

    info!(
        "Tracking at {:.4} deg/s azimuth, {:.4} deg/s altitude",
        speeds.0, speeds.1
    );
    mount.track(speeds)?;

    info!("Tracking started (run `synscan_tool stop` to end it)");
    Ok(())
}

fn cmd_stop(args: &Args, timeout: Duration, instant: bool) -> Result<()> {
    let mount = connect(args, timeout)?;

    if instant {
        mount.azimuth().instant_stop()?;
        mount.declination().instant_stop()?;
    } else {
        mount.stop_motion()?;
    }

    info!("Motors stopped");
    Ok(())
}

fn cmd_sync(args: &Args, timeout: Duration, position: (f64, f64)) -> Result<()> {
    let mount = connect(args, timeout)?;

    mount.set_position_degrees(position)?;
    info!(
        "Position synchronized to ({:.3}, {:.3}) deg",
        position.0, position.1
    );
    Ok(())
}

fn print_status(mount: &Mount) -> Result<()> {
    let (azimuth, altitude) = mount.get_position_degrees()?;
    println!("Position: ({azimuth:.3}, {altitude:.3}) deg");
    println!("Azimuth motor: {:?}", mount.azimuth().get_status()?);
    println!("Altitude motor: {:?}", mount.declination().get_status()?);
    Ok(())
}

fn cmd_status(args: &Args, timeout: Duration) -> Result<()> {
    let mount = connect(args, timeout)?;
    print_status(&mount)
}

fn cmd_watch(args: &Args, timeout: Duration, seconds: f64) -> Result<()> {
    let mount = connect(args, timeout)?;
    loop {
        print_status(&mount)?;
        std::thread::sleep(Duration::from_secs_f64(seconds));
    }
}

fn cmd_switch(args: &Args, timeout: Duration, state: SwitchState, seconds: f64) -> Result<()> {
    let mount = connect(args, timeout)?;

    match state {
        SwitchState::On => mount.set_aux_switch_on()?,
        SwitchState::Off => mount.set_aux_switch_off()?,
    }
    info!("Aux switch {state:?}");

    if seconds > 0.0 {
        std::thread::sleep(Duration::from_secs_f64(seconds));
        match state {
            SwitchState::On => mount.set_aux_switch_off()?,
            SwitchState::Off => mount.set_aux_switch_on()?,
        }
        info!("Aux switch reverted after {seconds}s");
    }
    Ok(())
}

fn cmd_discover(subnet: &str, port: u16, probe_timeout: Duration) -> Result<()> {
    let hosts: Vec<IpAddr> = (1..255u16)
        .map(|octet| {
            format!("{subnet}.{octet}")
                .parse()
                .with_context(|| format!("invalid subnet prefix: {subnet}"))
        })
        .collect::<Result<_>>()?;

    info!("Probing {}.1-254 on port {port}...", subnet);

    let found: Vec<IpAddr> = std::thread::scope(|scope| {
        let probes: Vec<_> = hosts
            .iter()
            .map(|&host| scope.spawn(move || Mount::probe(host, port, probe_timeout).then_some(host)))
            .collect();
        probes
            .into_iter()
            .filter_map(|probe| probe.join().ok().flatten())
            .collect()
    });

    if found.is_empty() {
        println!("No mounts found on {subnet}.0/24");
    } else {
        for host in found {
            println!("Found mount at {host}:{port}");
        }
    }
    Ok(())
}
