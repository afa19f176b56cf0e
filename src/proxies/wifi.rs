//! WiFi station proxy.
//!
//! Drives the co-processor's WiFi interface. Connection details (SSID,
//! addresses) are cached locally and refreshed on every successful query.

use core::net::Ipv4Addr;

use log::{info, warn};
use parking_lot::Mutex;

use super::ensure_ready;
use crate::bridge::Bridge;

pub mod methods {
    pub const BEGIN: &str = "wifi/begin";
    pub const DISCONNECT: &str = "wifi/disconnect";
    pub const STATUS: &str = "wifi/status";
    pub const SCAN: &str = "wifi/scan";
    pub const SSID: &str = "wifi/SSID";
    pub const BSSID: &str = "wifi/BSSID";
    pub const RSSI: &str = "wifi/RSSI";
    pub const LOCAL_IP: &str = "wifi/localIP";
    pub const SUBNET_MASK: &str = "wifi/subnetMask";
    pub const GATEWAY_IP: &str = "wifi/gatewayIP";
    pub const MAC_ADDRESS: &str = "wifi/macAddress";
}

/// Link status, numbered as the router reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WifiStatus {
    NoShield = 255,
    Idle = 0,
    NoSsidAvail = 1,
    ScanCompleted = 2,
    Connected = 3,
    ConnectFailed = 4,
    ConnectionLost = 5,
    Disconnected = 6,
}

impl WifiStatus {
    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            255 => Self::NoShield,
            0 => Self::Idle,
            1 => Self::NoSsidAvail,
            2 => Self::ScanCompleted,
            3 => Self::Connected,
            4 => Self::ConnectFailed,
            5 => Self::ConnectionLost,
            6 => Self::Disconnected,
            _ => return None,
        })
    }
}

/// Network count as reported by a scan: `-1` on failure, at most 127.
fn clamp_scan_count(raw: i32) -> i8 {
    raw.clamp(-1, 127) as i8
}

fn mac_from(bytes: &[u8]) -> Option<[u8; 6]> {
    bytes.get(..6)?.try_into().ok()
}

struct WifiState {
    status: WifiStatus,
    ssid: String,
    local_ip: Ipv4Addr,
    subnet_mask: Ipv4Addr,
    gateway_ip: Ipv4Addr,
    bssid: [u8; 6],
    rssi: i32,
}

impl Default for WifiState {
    fn default() -> Self {
        Self {
            status: WifiStatus::Idle,
            ssid: String::new(),
            local_ip: Ipv4Addr::UNSPECIFIED,
            subnet_mask: Ipv4Addr::UNSPECIFIED,
            gateway_ip: Ipv4Addr::UNSPECIFIED,
            bssid: [0; 6],
            rssi: 0,
        }
    }
}

pub struct WifiProxy {
    bridge: Bridge,
    state: Mutex<WifiState>,
}

impl WifiProxy {
    pub fn new(bridge: Bridge) -> Self {
        Self {
            bridge,
            state: Mutex::new(WifiState::default()),
        }
    }

    /// Join `ssid`; pass `None` for an open network.
    pub fn begin(&self, ssid: &str, passphrase: Option<&str>) -> WifiStatus {
        if !ensure_ready(&self.bridge) {
            let mut state = self.state.lock();
            state.status = WifiStatus::NoShield;
            return state.status;
        }

        let mut state = self.state.lock();
        let outcome = self
            .bridge
            .call(methods::BEGIN, (ssid, passphrase.unwrap_or("")))
            .wait::<u8>();

        state.status = match outcome {
            Ok(code) => WifiStatus::from_code(code).unwrap_or(WifiStatus::ConnectFailed),
            Err(e) => {
                warn!("WIFI: begin failed: {}", e);
                WifiStatus::ConnectFailed
            }
        };
        if state.status == WifiStatus::Connected {
            state.ssid = ssid.to_owned();
            self.refresh_addresses(&mut state);
            info!("WIFI: connected to '{}' as {}", ssid, state.local_ip);
        }
        state.status
    }

    pub fn disconnect(&self) -> WifiStatus {
        let mut state = self.state.lock();
        if state.status != WifiStatus::Connected {
            return state.status;
        }
        if self.bridge.call(methods::DISCONNECT, ()).wait::<i32>().is_ok() {
            state.status = WifiStatus::Disconnected;
            state.ssid.clear();
            state.local_ip = Ipv4Addr::UNSPECIFIED;
        }
        state.status
    }

    /// Query the link status; the cached value is returned if the query fails.
    pub fn status(&self) -> WifiStatus {
        let mut state = self.state.lock();
        match self.bridge.call(methods::STATUS, ()).wait::<u8>() {
            Ok(code) => match WifiStatus::from_code(code) {
                Some(s) => state.status = s,
                None => warn!("WIFI: unknown status code {}", code),
            },
            Err(e) => warn!("WIFI: status query failed: {}", e),
        }
        state.status
    }

    pub fn is_connected(&self) -> bool {
        self.status() == WifiStatus::Connected
    }

    /// Number of networks found, or `-1` on failure.
    pub fn scan_networks(&self) -> i8 {
        if !ensure_ready(&self.bridge) {
            return -1;
        }
        let _state = self.state.lock();
        self.bridge
            .call(methods::SCAN, ())
            .wait::<i32>()
            .map_or(-1, clamp_scan_count)
    }

    /// SSID of entry `index` from the last scan.
    pub fn scanned_ssid(&self, index: u8) -> Option<String> {
        let _state = self.state.lock();
        self.bridge.call(methods::SSID, (index,)).wait::<String>().ok()
    }

    /// SSID of the current network (cached).
    pub fn ssid(&self) -> String {
        self.state.lock().ssid.clone()
    }

    pub fn bssid(&self) -> Option<[u8; 6]> {
        let mut state = self.state.lock();
        let bssid = self
            .bridge
            .call(methods::BSSID, ())
            .wait::<Vec<u8>>()
            .ok()
            .and_then(|b| mac_from(&b))?;
        state.bssid = bssid;
        Some(bssid)
    }

    /// Signal strength in dBm.
    pub fn rssi(&self) -> Option<i32> {
        let mut state = self.state.lock();
        let rssi = self.bridge.call(methods::RSSI, ()).wait::<i32>().ok()?;
        state.rssi = rssi;
        Some(rssi)
    }

    pub fn local_ip(&self) -> Ipv4Addr {
        let mut state = self.state.lock();
        if let Some(ip) = self.query_ip(methods::LOCAL_IP) {
            state.local_ip = ip;
        }
        state.local_ip
    }

    pub fn subnet_mask(&self) -> Ipv4Addr {
        let mut state = self.state.lock();
        if let Some(ip) = self.query_ip(methods::SUBNET_MASK) {
            state.subnet_mask = ip;
        }
        state.subnet_mask
    }

    pub fn gateway_ip(&self) -> Ipv4Addr {
        let mut state = self.state.lock();
        if let Some(ip) = self.query_ip(methods::GATEWAY_IP) {
            state.gateway_ip = ip;
        }
        state.gateway_ip
    }

    pub fn mac_address(&self) -> Option<[u8; 6]> {
        let _state = self.state.lock();
        self.bridge
            .call(methods::MAC_ADDRESS, ())
            .wait::<Vec<u8>>()
            .ok()
            .and_then(|b| mac_from(&b))
    }

    fn query_ip(&self, method: &str) -> Option<Ipv4Addr> {
        let text = self.bridge.call(method, ()).wait::<String>().ok()?;
        text.parse().ok()
    }

    fn refresh_addresses(&self, state: &mut WifiState) {
        if let Some(ip) = self.query_ip(methods::LOCAL_IP) {
            state.local_ip = ip;
        }
        if let Some(ip) = self.query_ip(methods::SUBNET_MASK) {
            state.subnet_mask = ip;
        }
        if let Some(ip) = self.query_ip(methods::GATEWAY_IP) {
            state.gateway_ip = ip;
        }
    }
}
