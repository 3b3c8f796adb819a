use super::*;

use crate::device::DeviceRole;
use crate::internet::{Ipv6Prefix, StaticRouting};
use crate::time::VirtualTime;
use crate::trace::{DropReason, TraceKind};

fn quiet(mut config: ScenarioConfig) -> ScenarioConfig {
    config.verbose = false;
    config
}

fn global_prefix() -> Ipv6Prefix {
    Ipv6Prefix::new(GLOBAL_PREFIX, GLOBAL_PREFIX_LEN)
}

#[test]
fn test_every_node_gets_one_device_and_address() {
    for base in [ScenarioConfig::wired(), ScenarioConfig::wireless()] {
        for n in 2..=5 {
            let mut config = quiet(base.clone());
            config.nodes = n;
            let scenario = Scenario::build(config).unwrap();
            assert_eq!(scenario.nodes().len(), n as usize);
            assert_eq!(scenario.devices().len(), n as usize);
            let addresses = scenario.global_addresses();
            assert_eq!(addresses.len(), n as usize);
            assert!(addresses.iter().all(|a| global_prefix().contains(a)));
        }
    }
}

#[test]
fn test_server_starts_before_client() {
    for config in [ScenarioConfig::wired(), ScenarioConfig::wireless()] {
        let scenario = Scenario::build(quiet(config)).unwrap();
        let world = scenario.world();
        let server = world.app_slot(scenario.server()).unwrap();
        let client = world.app_slot(scenario.client()).unwrap();
        assert!(server.start.unwrap() < client.start.unwrap());
    }
}

#[test]
fn test_mesh_flag_reaches_every_device() {
    for mesh in [false, true] {
        let mut config = quiet(ScenarioConfig::wireless());
        config.mesh_under = mesh;
        let scenario = Scenario::build(config).unwrap();
        for device in scenario.world().devices() {
            assert_eq!(device.mesh_under(), mesh);
            if mesh {
                assert_eq!(device.lowpan.as_ref().unwrap().mesh_radius(), 10);
            }
        }
    }
}

#[test]
fn test_wired_layout() {
    let scenario = Scenario::build(quiet(ScenarioConfig::wired())).unwrap();
    let world = scenario.world();
    let ap = world.device(scenario.devices().get(0).unwrap()).unwrap();
    assert_eq!(ap.role, DeviceRole::AccessPoint);
    assert_eq!(ap.mtu, 1500);
    assert!(!ap.is_adapted());
    for id in scenario.devices().iter().skip(1) {
        let station = world.device(id).unwrap();
        assert_eq!(station.role, DeviceRole::Station);
        assert_eq!(station.mtu, 150);
        assert!(station.lowpan.as_ref().unwrap().force_ether_type());
    }
    assert_eq!(scenario.interfaces().len(), 2);
    assert_eq!(scenario.traced_devices().len(), 1);

    let server = world.app_slot(scenario.server()).unwrap();
    let client = world.app_slot(scenario.client()).unwrap();
    assert_eq!(server.node, NodeId::new(1));
    assert_eq!(client.node, NodeId::new(0));
}

#[test]
fn test_wired_defaults_run() {
    let scenario = Scenario::build(quiet(ScenarioConfig::wired())).unwrap();
    let server_address = scenario.interfaces().address(0).unwrap();
    let report = scenario.run().unwrap();

    assert_eq!(report.end_time, VirtualTime::from_secs(10));
    assert_eq!(report.server.start, Some(VirtualTime::from_secs(1)));
    assert_eq!(report.server.stop, Some(VirtualTime::from_secs(10)));

    let client = &report.client;
    assert_eq!(client.node, 0);
    assert_eq!(client.sent.len(), 1);
    assert_eq!(client.sent[0].time, VirtualTime::from_secs(2));
    assert_eq!(client.sent[0].bytes, 1024);
    assert_eq!(*client.sent[0].peer.ip(), server_address);

    assert_eq!(report.server.received.len(), 1);
    assert_eq!(report.server.sent.len(), 1);
    // The access point has no shim, so the fragmented reply never lands.
    assert!(client.received.is_empty());
    let ap = &report.devices[0];
    assert!(!ap.adapted);
    assert!(ap.stats.rx_dropped > 0);
}

#[test]
fn test_wired_reply_is_dropped_at_access_point() {
    let mut scenario = Scenario::build(quiet(ScenarioConfig::wired())).unwrap();
    scenario.sim.stop_at(VirtualTime::from_secs(10)).unwrap();
    scenario.sim.run(&mut scenario.world).unwrap();
    let drops = scenario
        .world
        .trace
        .iter()
        .filter(|e| {
            matches!(
                e.kind,
                TraceKind::FrameDropped {
                    reason: DropReason::NoAdaptationLayer,
                    ..
                }
            )
        })
        .count();
    assert!(drops > 0);
}

#[test]
fn test_wireless_layout() {
    let scenario = Scenario::build(quiet(ScenarioConfig::wireless())).unwrap();
    let world = scenario.world();
    let coordinator = world.device(scenario.devices().get(0).unwrap()).unwrap();
    assert_eq!(coordinator.role, DeviceRole::Coordinator);

    let router = scenario.interfaces().address(0).unwrap();
    for node in 1..3 {
        let stack = world.stack(NodeId::new(node)).unwrap();
        let static_routing = stack.routing().protocol::<StaticRouting>().unwrap();
        assert_eq!(static_routing.default_route().unwrap().gateway, Some(router));
    }
    assert!(world.stack(NodeId::new(0)).unwrap().interfaces()[0].forwarding);

    let server = world.app_slot(scenario.server()).unwrap();
    assert_eq!(server.node, NodeId::new(2));
    assert_eq!(scenario.traced_devices().len(), 2);
}

#[test]
fn test_wireless_defaults_run() {
    let report = Scenario::build(quiet(ScenarioConfig::wireless()))
        .unwrap()
        .run()
        .unwrap();

    assert_eq!(report.end_time, VirtualTime::from_secs(10));
    assert_eq!(report.client.sent.len(), 1);
    assert_eq!(report.client.sent[0].time, VirtualTime::from_secs(3));
    assert_eq!(report.server.received.len(), 1);
    assert_eq!(report.client.received.len(), 1);
    assert_eq!(report.client.received[0].bytes, 1024);

    let client_device = &report.devices[0];
    assert_eq!(client_device.stats.tx_frames, 12);
    assert_eq!(report.devices[2].stats.tx_frames, 12);
    assert_eq!(report.nodes[1].default_gateway, Some(report.nodes[0].addresses[0]));
    assert!(report.nodes[0].forwarding);
}

#[test]
fn test_mesh_under_delivers_and_suppresses_duplicates() {
    let mut config = quiet(ScenarioConfig::wireless());
    config.mesh_under = true;
    config.nodes = 4;
    let report = Scenario::build(config).unwrap().run().unwrap();

    assert_eq!(report.client.received.len(), 1);
    assert_eq!(report.server.received.len(), 1);
    let duplicates: u64 = report
        .devices
        .iter()
        .filter_map(|d| d.lowpan.as_ref())
        .map(|l| l.mesh_duplicates)
        .sum();
    assert!(duplicates > 0);
    assert!(report.devices.iter().any(|d| d.stats.relayed > 0));
}

#[test]
fn test_tracing_off_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = quiet(ScenarioConfig::wireless());
    config.output_dir = dir.path().to_path_buf();
    let report = Scenario::build(config).unwrap().run().unwrap();
    assert!(report.captures.is_empty());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn test_wired_tracing_captures_access_point() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = quiet(ScenarioConfig::wired());
    config.tracing = true;
    config.output_dir = dir.path().to_path_buf();
    let report = Scenario::build(config).unwrap().run().unwrap();
    assert_eq!(report.captures, vec![dir.path().join("ami-0-0.pcap")]);
    assert!(report.captures[0].exists());
}

#[test]
fn test_wireless_tracing_captures_both_ends() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = quiet(ScenarioConfig::wireless());
    config.tracing = true;
    config.nodes = 4;
    config.output_dir = dir.path().join("out");
    let report = Scenario::build(config).unwrap().run().unwrap();

    let mut names: Vec<String> = report
        .captures
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(names, vec!["ami-lrwpan-0-0.pcap", "ami-lrwpan-3-0.pcap"]);
    assert!(report.captures.iter().all(|p| p.exists()));
}

#[test]
fn test_same_seed_same_report() {
    let run = || {
        let report = Scenario::build(quiet(ScenarioConfig::wireless()))
            .unwrap()
            .run()
            .unwrap();
        serde_json::to_string(&report).unwrap()
    };
    assert_eq!(run(), run());
}

#[test]
fn test_seed_moves_nodes() {
    let positions = |seed| {
        let mut config = quiet(ScenarioConfig::wireless());
        config.seed = seed;
        let scenario = Scenario::build(config).unwrap();
        scenario
            .world()
            .nodes()
            .iter()
            .map(|n| n.position.unwrap())
            .collect::<Vec<_>>()
    };
    assert_eq!(positions(1), positions(1));
    assert_ne!(positions(1), positions(2));
}

#[test]
fn test_invalid_config_rejected() {
    let mut config = ScenarioConfig::wired();
    config.nodes = 1;
    assert!(matches!(Scenario::build(config), Err(SimError::InvalidScenario(_))));
}
