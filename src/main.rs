//! RouterBridge firmware: main entry point.
//!
//! ```text
//! ┌──────────────────────────── MCU ─────────────────────────────┐
//! │                                                              │
//! │  main loop (APP core)            dispatch thread (PRO core)  │
//! │  SafeUpdater::update             Normal handlers             │
//! │  WiFi / Monitor proxies                                      │
//! │           │                               │                  │
//! │           └──────────── Bridge ───────────┘                  │
//! │                           │                                  │
//! └───────────────────────────┼──────────────────────────────────┘
//!                             │ UART1
//!                      co-processor router
//! ```
#![deny(unused_must_use)]

use std::time::Duration;

use anyhow::{Context, Result};
use esp_idf_hal::gpio::AnyIOPin;
use esp_idf_hal::peripherals::Peripherals;
use esp_idf_hal::uart::{UartDriver, config::Config as UartConfig};
use esp_idf_hal::units::Hertz;
use log::{info, warn};

use routerbridge::adapters::uart::UartTransport;
use routerbridge::proxies::monitor::Monitor;
use routerbridge::proxies::wifi::WifiProxy;
use routerbridge::{Bridge, BridgeConfig, DispatchOutcome};

/// Provisioned configuration, if any was flashed alongside the firmware.
const CONFIG_JSON: Option<&str> = option_env!("ROUTERBRIDGE_CONFIG");

fn load_config() -> BridgeConfig {
    let Some(json) = CONFIG_JSON else {
        return BridgeConfig::default();
    };
    match BridgeConfig::from_json(json) {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!("Config rejected ({}), using defaults", e);
            BridgeConfig::default()
        }
    }
}

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("RouterBridge v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config();

    // ── 2. UART link to the router ────────────────────────────
    let peripherals = Peripherals::take().context("peripherals already taken")?;
    let uart = UartDriver::new(
        peripherals.uart1,
        peripherals.pins.gpio17,
        peripherals.pins.gpio18,
        Option::<AnyIOPin>::None,
        Option::<AnyIOPin>::None,
        &UartConfig::default().baudrate(Hertz(config.baud_rate)),
    )
    .context("UART1 init failed")?;

    // ── 3. Bridge ─────────────────────────────────────────────
    let (bridge, safe) = Bridge::new(UartTransport::new(uart), config);
    bridge.begin().context("bridge handshake failed")?;

    bridge.provide("uptime_ms", |(): ()| {
        // SAFETY: plain read of the monotonic timer.
        unsafe { esp_idf_svc::sys::esp_timer_get_time() / 1000 }
    })?;

    let monitor: Monitor = Monitor::new(bridge.clone());
    bridge.provide_safe("console", |(line,): (String,)| {
        info!("console: {}", line);
        line.len()
    })?;

    let wifi = WifiProxy::new(bridge.clone());
    info!("WiFi status: {:?}", wifi.status());
    if monitor.begin() {
        monitor.write("RouterBridge up\n");
    }

    info!("System ready. Entering main loop.");

    // ── 4. Main loop: run safe-context handlers here ──────────
    loop {
        if safe.update() != DispatchOutcome::Handled {
            std::thread::sleep(Duration::from_millis(10));
        }
    }
}
