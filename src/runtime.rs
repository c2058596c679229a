//! Boot, outer run loop, and the fatal halt path.
//!
//! ```text
//!   boot() ──▶ NodeService ──▶ run() ── tick ─▶ feed watchdog ─▶ sleep ─┐
//!                                 ▲                                     │
//!                                 └─────────────────────────────────────┘
//!                                 │ Fatal
//!                                 ▼
//!                               halt() (stop feeding, wait for reset)
//! ```
//!
//! [`Platform`] bundles the concrete adapters for a firmware image; tests
//! drive [`run`] directly with mocks.

use std::time::Duration;

use anyhow::{Context, anyhow};
use log::{error, info, warn};

use crate::adapters::device_id::{read_mac, short_id, unique_id_from_mac};
use crate::adapters::entropy::HardwareRng;
use crate::adapters::log_sink::LogEventSink;
use crate::adapters::nvs::{NvsAdapter, validate_config};
use crate::adapters::ota_sink::{OtaSink, check_rollback};
use crate::adapters::time::Esp32Clock;
use crate::app::ports::{ClockPort, ConfigError, ConfigPort, ParamStorage, WatchdogPort};
use crate::app::service::{NodeIo, NodeService};
use crate::config::NodeConfig;
use crate::dronecan::transport::{CanBus, Transport};
use crate::drivers::watchdog::Watchdog;
use crate::error::Fatal;
use crate::node::identity::UniqueId;
use crate::node::params::ParamTable;

/// Pause between pump iterations.
const TICK_PERIOD: Duration = Duration::from_millis(1);

/// Sleep granularity while waiting for the watchdog after a fatal command.
const HALT_POLL: Duration = Duration::from_millis(100);

// ───────────────────────────────────────────────────────────────
// Boot
// ───────────────────────────────────────────────────────────────

fn load_config(port: &dyn ConfigPort) -> anyhow::Result<NodeConfig> {
    match port.load() {
        Ok(cfg) => {
            validate_config(&cfg)
                .map_err(|e| anyhow!("{e}"))
                .context("stored node config is out of range")?;
            Ok(cfg)
        }
        Err(ConfigError::NotFound) => {
            info!("No stored node config, using defaults");
            Ok(NodeConfig::default())
        }
        Err(ConfigError::Corrupted) => {
            warn!("Stored node config is corrupted, using defaults");
            Ok(NodeConfig::default())
        }
        Err(e) => Err(anyhow!("{e}")).context("loading node config"),
    }
}

/// Load config and parameters and build the service.
///
/// Parameter slots that are missing or unreadable fall back to their
/// defaults; only config storage failures abort the boot.
pub fn boot(
    config_port: &dyn ConfigPort,
    storage: &dyn ParamStorage,
    unique_id: UniqueId,
) -> anyhow::Result<NodeService> {
    let config = load_config(config_port)?;

    let mut params = ParamTable::default();
    let restored = params.load(storage);
    info!(
        "Boot: {} ({}), {}/{} params restored, unique id {}",
        config.node_name,
        match config.static_node_id {
            Some(_) => "static",
            None => "dynamic",
        },
        restored,
        params.len(),
        unique_id
    );

    Ok(NodeService::new(config, unique_id, params))
}

// ───────────────────────────────────────────────────────────────
// Run loop
// ───────────────────────────────────────────────────────────────

/// Pump the node until a fatal command arrives.
///
/// The watchdog is fed after every completed tick. A tick that returns
/// [`Fatal`] ends the loop before the feed.
pub fn run(
    service: &mut NodeService,
    clock: &dyn ClockPort,
    watchdog: &dyn WatchdogPort,
    io: &mut NodeIo<'_>,
) -> Fatal {
    loop {
        if let Err(fatal) = service.tick(clock.now(), io) {
            return fatal;
        }
        watchdog.feed();
        std::thread::sleep(TICK_PERIOD);
    }
}

/// Stop servicing the bus and wait for the watchdog to reset the device.
pub fn halt(fatal: Fatal) -> ! {
    error!("Node halted: {}; waiting for watchdog reset", fatal);
    loop {
        std::thread::sleep(HALT_POLL);
    }
}

pub fn run_forever(
    service: &mut NodeService,
    clock: &dyn ClockPort,
    watchdog: &dyn WatchdogPort,
    io: &mut NodeIo<'_>,
) -> ! {
    halt(run(service, clock, watchdog, io))
}

// ───────────────────────────────────────────────────────────────
// Platform bundle
// ───────────────────────────────────────────────────────────────

/// The on-chip adapters a firmware image needs besides its bus driver and
/// transport.
pub struct Platform {
    pub nvs: NvsAdapter,
    pub clock: Esp32Clock,
    pub rng: HardwareRng,
    pub ota: OtaSink,
    pub events: LogEventSink,
    pub watchdog: Watchdog,
}

impl Platform {
    /// Confirm the running image, open NVS and arm the watchdog.
    pub fn init() -> anyhow::Result<Self> {
        check_rollback();
        let nvs = NvsAdapter::new()
            .map_err(|e| anyhow!("{e}"))
            .context("initialising NVS")?;

        Ok(Self {
            nvs,
            clock: Esp32Clock::new(),
            rng: HardwareRng,
            ota: OtaSink::new(),
            events: LogEventSink::new(),
            watchdog: Watchdog::default(),
        })
    }

    /// [`boot`] against NVS with the eFuse-derived unique ID.
    pub fn boot_node(&self) -> anyhow::Result<NodeService> {
        let mac = read_mac();
        info!("Device {}", short_id(&mac));
        boot(&self.nvs, &self.nvs, unique_id_from_mac(&mac))
    }

    /// Start `service` and pump it until the device resets.
    pub fn run_forever(
        &mut self,
        service: &mut NodeService,
        bus: &mut dyn CanBus,
        transport: &mut dyn Transport,
    ) -> ! {
        service.start(transport, &mut self.events);
        let mut io = NodeIo {
            bus,
            transport,
            storage: &mut self.nvs,
            firmware: &mut self.ota,
            rng: &mut self.rng,
            events: &mut self.events,
        };
        run_forever(service, &self.clock, &self.watchdog, &mut io)
    }
}
