//! Typed scenario configuration.
//!
//! [`ScenarioConfig::wired`] and [`ScenarioConfig::wireless`] give the
//! stock scenarios; [`ScenarioConfig::validate`] rejects combinations the
//! scenario builder cannot honor.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::device::sixlowpan::{DEFAULT_MESH_RADIUS, MAX_DATAGRAM_SIZE};
use crate::error::{SimError, SimResult};
use crate::packet::{IPV6_HEADER_LEN, UDP_HEADER_LEN};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkVariant {
    /// Shared-medium wired segment with an access point.
    Csma,
    /// IEEE 802.15.4 PAN.
    LrWpan,
}

impl LinkVariant {
    /// Capture file prefix.
    pub fn capture_prefix(self) -> &'static str {
        match self {
            LinkVariant::Csma => "ami",
            LinkVariant::LrWpan => "ami-lrwpan",
        }
    }
}

impl std::fmt::Display for LinkVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkVariant::Csma => f.write_str("csma"),
            LinkVariant::LrWpan => f.write_str("lrwpan"),
        }
    }
}

/// Placement rectangle in meters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Area {
    pub width: u32,
    pub height: u32,
}

impl Default for Area {
    fn default() -> Self {
        Area {
            width: 50,
            height: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CsmaConfig {
    pub data_rate_bps: u64,
    pub delay_ms: u64,
    /// Small enough that the shim has to fragment.
    pub station_mtu: u16,
    pub ap_mtu: u16,
    /// Carry 6LoWPAN in EtherType `0xA0ED` frames.
    pub force_ether_type: bool,
}

impl Default for CsmaConfig {
    fn default() -> Self {
        CsmaConfig {
            data_rate_bps: 5_000_000,
            delay_ms: 2,
            station_mtu: 150,
            ap_mtu: 1500,
            force_ether_type: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LrWpanConfig {
    pub pan_id: u16,
    pub channel_number: u8,
    pub data_rate_bps: u64,
}

impl Default for LrWpanConfig {
    fn default() -> Self {
        LrWpanConfig {
            pan_id: 0,
            channel_number: 11,
            data_rate_bps: 250_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EchoConfig {
    pub port: u16,
    pub packet_size: usize,
    pub max_packets: u32,
    pub interval_secs: f64,
    pub server_start_secs: f64,
    pub client_start_secs: f64,
}

impl EchoConfig {
    fn with_client_start(client_start_secs: f64) -> Self {
        EchoConfig {
            port: 9,
            packet_size: 1024,
            max_packets: 1,
            interval_secs: 1.0,
            server_start_secs: 1.0,
            client_start_secs,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioConfig {
    pub variant: LinkVariant,
    pub nodes: u32,
    pub area: Area,
    pub duration_secs: f64,
    /// LR-WPAN only.
    pub mesh_under: bool,
    pub mesh_radius: u8,
    /// `info` logging for the echo applications.
    pub verbose: bool,
    /// Write pcap files for the traced devices.
    pub tracing: bool,
    pub seed: u64,
    pub output_dir: PathBuf,
    pub csma: CsmaConfig,
    pub lrwpan: LrWpanConfig,
    pub echo: EchoConfig,
}

impl ScenarioConfig {
    fn base(variant: LinkVariant, client_start_secs: f64) -> Self {
        ScenarioConfig {
            variant,
            nodes: 3,
            area: Area::default(),
            duration_secs: 10.0,
            mesh_under: false,
            mesh_radius: DEFAULT_MESH_RADIUS,
            verbose: true,
            tracing: false,
            seed: 1,
            output_dir: PathBuf::from("."),
            csma: CsmaConfig::default(),
            lrwpan: LrWpanConfig::default(),
            echo: EchoConfig::with_client_start(client_start_secs),
        }
    }

    pub fn wired() -> Self {
        ScenarioConfig::base(LinkVariant::Csma, 2.0)
    }

    pub fn wireless() -> Self {
        ScenarioConfig::base(LinkVariant::LrWpan, 3.0)
    }

    /// Largest echo payload every hop can carry: the 6LoWPAN datagram
    /// limit, and on CSMA also the access point MTU.
    pub fn max_packet_size(&self) -> usize {
        let overhead = IPV6_HEADER_LEN + UDP_HEADER_LEN;
        let lowpan = MAX_DATAGRAM_SIZE - overhead;
        match self.variant {
            LinkVariant::Csma => lowpan.min(usize::from(self.csma.ap_mtu).saturating_sub(overhead)),
            LinkVariant::LrWpan => lowpan,
        }
    }

    pub fn validate(&self) -> SimResult<()> {
        let invalid = |msg: String| Err(SimError::InvalidScenario(msg));
        if self.nodes < 2 {
            return invalid(format!("need at least 2 nodes, got {}", self.nodes));
        }
        if !self.duration_secs.is_finite() || self.duration_secs <= 0.0 {
            return invalid(format!("duration must be positive, got {}", self.duration_secs));
        }
        let echo = &self.echo;
        if !(echo.server_start_secs >= 0.0) {
            return invalid("server start must be non-negative".into());
        }
        if !(echo.server_start_secs < echo.client_start_secs) {
            return invalid(format!(
                "server start ({}s) must precede client start ({}s)",
                echo.server_start_secs, echo.client_start_secs
            ));
        }
        if !(echo.client_start_secs < self.duration_secs) {
            return invalid(format!(
                "duration ({}s) must exceed client start ({}s)",
                self.duration_secs, echo.client_start_secs
            ));
        }
        if !(echo.interval_secs > 0.0) || !echo.interval_secs.is_finite() {
            return invalid("echo interval must be positive".into());
        }
        let max_payload = self.max_packet_size();
        if echo.packet_size > max_payload {
            return invalid(format!(
                "echo packet size {} exceeds {} bytes for {}",
                echo.packet_size, max_payload, self.variant
            ));
        }
        if self.mesh_under && self.variant != LinkVariant::LrWpan {
            return invalid("mesh-under is only available on LR-WPAN".into());
        }
        if self.mesh_under && self.mesh_radius == 0 {
            return invalid("mesh radius must be at least 1".into());
        }
        if self.area.width == 0 || self.area.height == 0 {
            return invalid("placement area must be non-empty".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        ScenarioConfig::wired().validate().unwrap();
        ScenarioConfig::wireless().validate().unwrap();
    }

    #[test]
    fn test_server_starts_before_client() {
        for cfg in [ScenarioConfig::wired(), ScenarioConfig::wireless()] {
            assert!(cfg.echo.server_start_secs < cfg.echo.client_start_secs);
        }
        for duration in [3.5, 10.0, 60.0] {
            let mut cfg = ScenarioConfig::wireless();
            cfg.duration_secs = duration;
            cfg.validate().unwrap();
            assert!(cfg.echo.server_start_secs < cfg.echo.client_start_secs);
        }
    }

    #[test]
    fn test_rejects_single_node() {
        let mut cfg = ScenarioConfig::wired();
        cfg.nodes = 1;
        assert!(matches!(cfg.validate(), Err(SimError::InvalidScenario(_))));
    }

    #[test]
    fn test_rejects_duration_before_client_start() {
        let mut cfg = ScenarioConfig::wireless();
        cfg.duration_secs = 3.0;
        assert!(cfg.validate().is_err());
        cfg.duration_secs = f64::NAN;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_rejects_mesh_under_on_csma() {
        let mut cfg = ScenarioConfig::wired();
        cfg.mesh_under = true;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_rejects_packet_size_beyond_link_limits() {
        let mut cfg = ScenarioConfig::wireless();
        assert_eq!(cfg.max_packet_size(), 1999);
        cfg.echo.packet_size = 1999;
        cfg.validate().unwrap();
        cfg.echo.packet_size = 2000;
        assert!(matches!(cfg.validate(), Err(SimError::InvalidScenario(_))));
        cfg.echo.packet_size = 70_000;
        assert!(matches!(cfg.validate(), Err(SimError::InvalidScenario(_))));

        let mut cfg = ScenarioConfig::wired();
        assert_eq!(cfg.max_packet_size(), 1452);
        cfg.echo.packet_size = 1453;
        assert!(matches!(cfg.validate(), Err(SimError::InvalidScenario(_))));
    }

    #[test]
    fn test_config_serializes() {
        let json = serde_json::to_string(&ScenarioConfig::wireless()).unwrap();
        let back: ScenarioConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ScenarioConfig::wireless());
    }
}
