//! # HAL Executable
//!
//! Brings up the kiosk's hardware control core:
//! - Opens the I/O board and motion controller channels (or the simulated hardware)
//! - Initialises the control system and the motion controller
//! - Homes the axes and reports the control board revision
//!
//! then shuts everything down again.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use color_eyre::{
    eyre::{eyre, WrapErr},
    Result,
};
use log::{info, warn};
use std::sync::Arc;
use structopt::StructOpt;

// Internal
use comms_if::{serial::SerialChannel, ChannelSettings};
use hal_lib::{
    counters::CounterStore,
    hal::{Hal, HalParts},
    motion::{MotionErrorLog, SettleResetter},
    params::HalParams,
    runtime::{SimRuntime, SystemRuntime},
    sim::{ArcusSim, CoreBoardSim},
};
use util::{
    host,
    logger::{logger_init, parse_level},
    session::Session,
};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

const PARAMS_FILE: &str = "hal_exec.toml";

const COUNTERS_FILE: &str = "counters.json";

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, StructOpt)]
#[structopt(name = "hal_exec", about = "Kiosk hardware control core")]
struct Opt {
    /// Run against the simulated boards and motion controller
    #[structopt(long)]
    sim: bool,

    /// Do not home the axes
    #[structopt(long)]
    skip_home: bool,

    /// Home each axis once instead of twice
    #[structopt(long)]
    fast_home: bool,

    /// Ignore the front door sensor
    #[structopt(long)]
    door_override: bool,

    /// Minimum log level: info, debug or trace
    #[structopt(long, default_value = "debug")]
    log_level: String,
}

// ------------------------------------------------------------------------------------------------
// MAIN
// ------------------------------------------------------------------------------------------------

fn main() -> Result<()> {
    color_eyre::install()?;
    let opt = Opt::from_args();

    // ---- EARLY INITIALISATION ----

    let session = Session::new("hal_exec", "sessions").wrap_err("Failed to create the session")?;

    let level = parse_level(&opt.log_level)
        .ok_or_else(|| eyre!("Unknown log level \"{}\"", opt.log_level))?;
    logger_init(level, &[], &session).wrap_err("Failed to initialise logging")?;

    info!("Kiosk HAL Executable\n");
    info!(
        "Running on: {:#?}",
        host::get_uname().wrap_err("Failed to get host information")?
    );
    info!("Session directory: {:?}\n", session.session_root);

    // ---- LOAD PARAMETERS ----

    let params: HalParams =
        util::params::load(PARAMS_FILE).wrap_err("Could not load HAL params")?;
    info!("HAL parameters loaded");

    let counters = Arc::new(
        CounterStore::open(session.session_root.join(COUNTERS_FILE))
            .wrap_err("Could not open the counter store")?,
    );

    // ---- BUILD THE HAL ----

    let error_log = MotionErrorLog::open(&session.session_root);
    let parts = if opt.sim {
        warn!("Running against simulated hardware");
        let runtime = Arc::new(SimRuntime::new());
        let board = CoreBoardSim::with_runtime(runtime.clone());
        let arcus = ArcusSim::with_runtime(runtime.clone());

        HalParts {
            params,
            runtime,
            core_channel: Box::new(board.channel()),
            motion_channel: Box::new(arcus.channel()),
            counters,
            resetter: arcus.resetter(),
            error_log,
            door_override: opt.door_override,
        }
    } else {
        let runtime = Arc::new(SystemRuntime::new());
        let core_channel = SerialChannel::new(
            params.ports.controller.clone(),
            ChannelSettings::core_board(),
            "CORE",
        );
        let motion_channel = SerialChannel::new(
            params.ports.motion_controller.clone(),
            ChannelSettings::motion_controller(
                params.timing.arcus_write_pause_ms,
                params.timing.motion_controller_timeout_ms,
            ),
            "ARCUS",
        );

        HalParts {
            params,
            runtime: runtime.clone(),
            core_channel: Box::new(core_channel),
            motion_channel: Box::new(motion_channel),
            counters,
            resetter: Box::new(SettleResetter::new(runtime)),
            error_log,
            door_override: opt.door_override,
        }
    };

    let hal = Hal::new(parts).wrap_err("Failed to build the HAL")?;
    info!("HAL built");

    // ---- BRING UP ----

    hal.initialize().wrap_err("Failed to initialise the hardware")?;
    info!("Hardware initialised");

    if opt.skip_home {
        warn!("Homing skipped, the picker cannot move");
    } else {
        hal.home(opt.fast_home).wrap_err("Failed to home the axes")?;
        info!("Axes homed");
    }

    let revision = hal.revision();
    if revision.success {
        info!("Control system revision {}", revision.revision());
    } else {
        warn!("Not every control board reported its version");
    }
    for board in revision.responses.iter() {
        info!("    {}: {}", board.board_name, board.version);
    }

    // ---- SHUTDOWN ----

    hal.shutdown();
    info!("HAL shut down");
    session.exit();

    Ok(())
}
