//! End-to-end control surface tests.
//!
//! Each test runs a `DmServer` against segment files in a private temp
//! directory, writes channels the way an external client does, and checks
//! what reaches the combined channel and the simulated mirror.

use hexdm_common::config::ConfigLoader;
use hexdm_common::dm::config::{HexDmConfig, WakeMode};
use hexdm_common::dm::types::SegmentPtt;
use hexdm_hal::drivers::simulation::{SimulationDriver, SimulationProbe};
use hexdm_hal::HardwareLink;
use hexdm_server::{DmServer, ServerError, StartOutcome};
use hexdm_shared_memory::ChannelClient;
use proptest::prelude::*;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn test_config(dir: &TempDir, nseg: usize) -> HexDmConfig {
    let mut config = HexDmConfig::default();
    config.dm.nseg = nseg;
    config.channels.shm_dir = dir.path().to_path_buf();
    config.combiner.wake_interval_ms = 5;
    config
}

fn connected_server(config: HexDmConfig) -> (DmServer, SimulationProbe) {
    let driver = SimulationDriver::new();
    let probe = driver.probe();
    let link = HardwareLink::connect(Box::new(driver), &config.dm.serial).unwrap();
    (DmServer::with_link(config, link).unwrap(), probe)
}

fn eventually(mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    false
}

#[test]
fn test_shipped_config_is_valid() {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("config/hexdm.toml");
    let config = HexDmConfig::load(&path).unwrap();
    config.validate().unwrap();
    assert!(config.dm.simulate);
    assert_eq!(config.combiner.wake_mode, WakeMode::Poll);
}

#[test]
fn test_set_nch_shapes_channel_set() {
    let dir = TempDir::new().unwrap();
    let mut server = DmServer::with_link(test_config(&dir, 169), HardwareLink::simulated("SIM")).unwrap();

    for nch in [1, 3, 7] {
        server.set_nch(nch).unwrap();
        assert_eq!(server.get_nch(), nch as usize);
        let set = server.channel_set().unwrap();
        assert_eq!(set.len(), nch as usize + 1);
        for index in 0..set.len() {
            assert_eq!(set.read(index).unwrap().0.len(), 3 * 169);
        }
        assert_eq!(set.shape(), (3, 169));
    }
}

#[test]
fn test_set_nch_while_caller_holds_channel_set() {
    let dir = TempDir::new().unwrap();
    let mut server = DmServer::with_link(test_config(&dir, 2), HardwareLink::simulated("SIM")).unwrap();
    let held = server.channel_set().unwrap();

    server.set_nch(2).unwrap();
    assert_eq!(server.get_nch(), 2);
    assert!(held.is_destroyed());
    assert!(held.write(0, &[1.0; 6]).is_err());
    assert!(!dir.path().join("ptt03.im.shm").exists());

    drop(held);
    let set = server.channel_set().unwrap();
    assert!(set.path(0).unwrap().exists());
    assert!(set.path(set.combined_index()).unwrap().exists());
    server.reset(1).unwrap();
    assert_eq!(server.start().unwrap(), StartOutcome::Started);
}

#[test]
fn test_stuck_write_flag_does_not_stall_combiner() {
    let dir = TempDir::new().unwrap();
    let (mut server, probe) = connected_server(test_config(&dir, 2));
    let set = server.channel_set().unwrap();
    set.channel(0).unwrap().header().write.store(1, Ordering::Release);
    server.start().unwrap();

    set.write(1, &[4000.0, 0.0, 0.0, 0.0, 0.0, 0.0]).unwrap();
    assert!(eventually(|| {
        set.read(set.combined_index()).unwrap().0 == vec![4000.0, 0.0, 0.0, 0.0, 0.0, 0.0]
    }));
    assert!(eventually(|| probe.output()[..3] == [1.0, 1.0, 1.0]));
    assert_eq!(server.status(), "running");
    server.stop();
}

#[test]
fn test_reset_zeroes_and_advances_version() {
    let dir = TempDir::new().unwrap();
    let mut server = DmServer::with_link(test_config(&dir, 4), HardwareLink::simulated("SIM")).unwrap();
    let client = ChannelClient::attach(dir.path(), "", 2).unwrap();
    client.write(&[7.0; 12]).unwrap();

    let set = server.channel_set().unwrap();
    let before = set.version(2).unwrap();
    server.reset(2).unwrap();

    let (data, after) = set.read(2).unwrap();
    assert!(after > before);
    assert!(data.iter().all(|v| *v == 0.0));
}

#[test]
fn test_reset_all_channels() {
    let dir = TempDir::new().unwrap();
    let mut server = DmServer::with_link(test_config(&dir, 2), HardwareLink::simulated("SIM")).unwrap();
    let set = server.channel_set().unwrap();
    for index in 0..set.nch() {
        set.write(index, &[1.0; 6]).unwrap();
    }

    server.reset(-1).unwrap();
    for index in 0..set.nch() {
        assert_eq!(set.read(index).unwrap(), (vec![0.0; 6], 2));
    }
}

#[test]
fn test_out_of_range_reset_changes_nothing() {
    let dir = TempDir::new().unwrap();
    let mut server = DmServer::with_link(test_config(&dir, 2), HardwareLink::simulated("SIM")).unwrap();
    let set = server.channel_set().unwrap();
    set.write(0, &[3.0; 6]).unwrap();

    let snapshot: Vec<_> = (0..set.len()).map(|i| set.read(i).unwrap()).collect();
    assert!(matches!(
        server.reset(4),
        Err(ServerError::InvalidChannel { index: 4, nch: 4 })
    ));
    let after: Vec<_> = (0..set.len()).map(|i| set.read(i).unwrap()).collect();
    assert_eq!(snapshot, after);
}

#[test]
fn test_combined_channel_is_sum_and_reaches_mirror() {
    let dir = TempDir::new().unwrap();
    let (mut server, probe) = connected_server(test_config(&dir, 169));
    assert_eq!(server.start().unwrap(), StartOutcome::Started);

    let first = ChannelClient::attach(dir.path(), "", 0).unwrap();
    let second = ChannelClient::attach(dir.path(), "", 3).unwrap();
    first.write_segment(5, SegmentPtt::new(10.0, 0.0, 0.0)).unwrap();
    second.write_segment(5, SegmentPtt::new(5.0, 0.0, 0.0)).unwrap();

    let combined = ChannelClient::attach_combined(dir.path(), "").unwrap();
    assert!(eventually(|| {
        combined.segment_ptt(5).unwrap() == SegmentPtt::new(15.0, 0.0, 0.0)
    }));
    assert!(eventually(|| probe.output()[15] == 15.0 / 4000.0));

    server.quit().unwrap();
    assert!(!probe.is_connected());
    assert_eq!(probe.clears(), 1);
}

#[test]
fn test_event_mode_combines_on_write() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&dir, 3);
    config.combiner.wake_mode = WakeMode::Event;
    let (mut server, probe) = connected_server(config);
    server.start().unwrap();

    let set = server.channel_set().unwrap();
    set.write(1, &[4000.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]).unwrap();
    assert!(eventually(|| probe.output()[..3] == [1.0, 1.0, 1.0]));
    server.stop();
}

#[test]
fn test_resize_while_running_restarts_on_new_set() {
    let dir = TempDir::new().unwrap();
    let (mut server, probe) = connected_server(test_config(&dir, 2));
    server.start().unwrap();

    server.set_nch(2).unwrap();
    assert_eq!(server.status(), "running");
    assert!(!dir.path().join("ptt02.im.shm").exists());

    let client = ChannelClient::attach(dir.path(), "", 1).unwrap();
    client.write_segment(1, SegmentPtt::new(8000.0, 0.0, 0.0)).unwrap();
    assert!(eventually(|| probe.output()[3..6] == [2.0, 2.0, 2.0]));
}

#[test]
fn test_no_combines_after_stop() {
    let dir = TempDir::new().unwrap();
    let mut server = DmServer::with_link(test_config(&dir, 2), HardwareLink::simulated("SIM")).unwrap();
    server.start().unwrap();
    assert!(eventually(|| server.status_report().loop_stats.combines >= 1));
    server.stop();

    let set = server.channel_set().unwrap();
    let combined_version = set.version(set.combined_index()).unwrap();
    set.write(0, &[1.0; 6]).unwrap();
    thread::sleep(Duration::from_millis(30));

    assert_eq!(set.version(set.combined_index()).unwrap(), combined_version);
    assert_eq!(set.read(set.combined_index()).unwrap().0, vec![0.0; 6]);
}

#[test]
fn test_quit_while_running_destroys_set_after_stop() {
    let dir = TempDir::new().unwrap();
    let mut server = DmServer::with_link(test_config(&dir, 2), HardwareLink::simulated("SIM")).unwrap();
    server.start().unwrap();

    server.quit().unwrap();
    assert_eq!(server.status(), "idle");
    assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
    assert!(matches!(server.start(), Err(ServerError::NotAllocated)));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_combined_equals_elementwise_sum(
        channels in prop::collection::vec(prop::collection::vec(-1.0e3f64..1.0e3, 6), 1..5),
    ) {
        let dir = TempDir::new().unwrap();
        let mut config = test_config(&dir, 2);
        config.channels.default_nch = channels.len();
        let mut server = DmServer::with_link(config, HardwareLink::simulated("SIM")).unwrap();
        let set = server.channel_set().unwrap();
        for (index, data) in channels.iter().enumerate() {
            set.write(index, data).unwrap();
        }

        let mut expected = vec![0.0; 6];
        for data in &channels {
            for (acc, value) in expected.iter_mut().zip(data) {
                *acc += value;
            }
        }

        server.start().unwrap();
        prop_assert!(eventually(|| set.read(set.combined_index()).unwrap().0 == expected));
        server.stop();
    }
}
