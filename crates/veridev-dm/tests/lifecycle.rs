//! Lifecycle tests driven through the control-plane seam.

use std::io;
use std::path::{Path, PathBuf};

use veridev_dm::{DmControl, DmError, VerityDevice, DM_DEVICE_NAME};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Step {
    Create,
    LoadTable,
    Resume,
    ProbeOpen,
    ProbeRead,
    StatusQuery,
}

/// Records every control-plane call and optionally fails one step.
struct MockControl {
    fail_at: Option<Step>,
    fail_remove: bool,
    minor: u32,
    status: String,
    registered: bool,
    created: Option<(String, String)>,
    loaded: Option<(String, u64, String)>,
    probed: Option<PathBuf>,
    remove_calls: Vec<bool>,
}

impl MockControl {
    fn new() -> Self {
        Self {
            fail_at: None,
            fail_remove: false,
            minor: 3,
            status: "V".to_string(),
            registered: false,
            created: None,
            loaded: None,
            probed: None,
            remove_calls: Vec::new(),
        }
    }

    fn failing_at(step: Step) -> Self {
        Self {
            fail_at: Some(step),
            ..Self::new()
        }
    }

    fn with_status(status: &str) -> Self {
        Self {
            status: status.to_string(),
            ..Self::new()
        }
    }

    fn injected() -> io::Error {
        io::Error::new(io::ErrorKind::Other, "injected")
    }
}

impl DmControl for MockControl {
    fn create(&mut self, name: &str, uuid: &str) -> Result<(), DmError> {
        if self.fail_at == Some(Step::Create) {
            return Err(DmError::CreateFailed(Self::injected()));
        }
        self.registered = true;
        self.created = Some((name.to_string(), uuid.to_string()));
        Ok(())
    }

    fn load_table(&mut self, uuid: &str, sectors: u64, params: &str) -> Result<(), DmError> {
        if self.fail_at == Some(Step::LoadTable) {
            return Err(DmError::TableLoadFailed(Self::injected()));
        }
        self.loaded = Some((uuid.to_string(), sectors, params.to_string()));
        Ok(())
    }

    fn resume(&mut self, _uuid: &str) -> Result<u64, DmError> {
        if self.fail_at == Some(Step::Resume) {
            return Err(DmError::ActivationFailed(Self::injected()));
        }
        // kernel dev_t encoding: major 253, minor split around bit 8
        let minor = self.minor as u64;
        Ok(((minor & !0xff) << 12) | (253 << 8) | (minor & 0xff))
    }

    fn probe(&mut self, node: &Path) -> Result<(), DmError> {
        if self.fail_at == Some(Step::ProbeOpen) {
            return Err(DmError::ProbeOpenFailed {
                node: node.to_path_buf(),
                source: Self::injected(),
            });
        }
        if self.fail_at == Some(Step::ProbeRead) {
            return Err(DmError::ProbeReadFailed {
                node: node.to_path_buf(),
                source: io::Error::from_raw_os_error(5),
            });
        }
        self.probed = Some(node.to_path_buf());
        Ok(())
    }

    fn table_status(&mut self, _uuid: &str) -> Result<String, DmError> {
        if self.fail_at == Some(Step::StatusQuery) {
            return Err(DmError::StatusQueryFailed(Self::injected()));
        }
        Ok(self.status.clone())
    }

    fn remove(&mut self, _uuid: &str, deferred: bool) -> Result<(), DmError> {
        self.remove_calls.push(deferred);
        if self.fail_remove {
            return Err(DmError::RemoveFailed(Self::injected()));
        }
        self.registered = false;
        Ok(())
    }
}

fn device() -> VerityDevice {
    VerityDevice::new("/dev/loop0", 4096, hex::encode([0xa5u8; 32]), hex::encode([0x5au8; 16]))
        .unwrap()
}

#[test]
fn setup_configures_and_publishes_the_node() {
    let mut ctl = MockControl::new();
    let mut dev = device();

    dev.setup_with(&mut ctl).unwrap();

    assert_eq!(dev.upper_dev(), Some(Path::new("/dev/dm-3")));
    let (name, uuid) = ctl.created.as_ref().unwrap();
    assert_eq!(name, DM_DEVICE_NAME);
    assert_eq!(uuid, dev.uuid());

    let (load_uuid, sectors, params) = ctl.loaded.as_ref().unwrap();
    assert_eq!(load_uuid, dev.uuid());
    assert_eq!(*sectors, 4096 / 512);
    assert!(params.starts_with("1 /dev/loop0 /dev/loop0 4096 4096 1 1 sha256 "));

    assert_eq!(ctl.probed.as_deref(), Some(Path::new("/dev/dm-3")));
    assert!(ctl.remove_calls.is_empty());
}

#[test]
fn setup_then_remove_leaves_nothing_registered() {
    let mut ctl = MockControl::new();
    let mut dev = device();

    dev.setup_with(&mut ctl).unwrap();
    assert!(ctl.registered);

    dev.remove_with(&mut ctl, false).unwrap();
    assert!(!ctl.registered);
    assert!(dev.upper_dev().is_none());
    assert_eq!(ctl.remove_calls, vec![false]);
}

#[test]
fn create_failure_stops_without_rollback() {
    let mut ctl = MockControl::failing_at(Step::Create);
    let mut dev = device();

    let err = dev.setup_with(&mut ctl).unwrap_err();
    assert!(matches!(err, DmError::CreateFailed(_)));
    assert!(dev.upper_dev().is_none());
    assert!(ctl.remove_calls.is_empty());
}

#[test]
fn each_later_failure_rolls_back_with_one_immediate_remove() {
    let cases = [
        (Step::LoadTable, "TableLoadFailed"),
        (Step::Resume, "ActivationFailed"),
        (Step::ProbeOpen, "ProbeOpenFailed"),
        (Step::ProbeRead, "ProbeReadFailed"),
        (Step::StatusQuery, "StatusQueryFailed"),
    ];

    for (step, expected) in cases {
        let mut ctl = MockControl::failing_at(step);
        let mut dev = device();

        let err = dev.setup_with(&mut ctl).unwrap_err();
        let matches = match (step, &err) {
            (Step::LoadTable, DmError::TableLoadFailed(_)) => true,
            (Step::Resume, DmError::ActivationFailed(_)) => true,
            (Step::ProbeOpen, DmError::ProbeOpenFailed { .. }) => true,
            (Step::ProbeRead, DmError::ProbeReadFailed { .. }) => true,
            (Step::StatusQuery, DmError::StatusQueryFailed(_)) => true,
            _ => false,
        };
        assert!(matches, "{expected}, got {err:?}");
        assert!(dev.upper_dev().is_none(), "{expected} left upper_dev set");
        assert_eq!(ctl.remove_calls, vec![false], "{expected} rollback");
        assert!(!ctl.registered, "{expected} left the device registered");
    }
}

#[test]
fn oversized_parameters_roll_back_the_created_device() {
    let mut ctl = MockControl::new();
    let salt = "ab".repeat(600);
    let mut dev =
        VerityDevice::new("/dev/loop0", 4096, hex::encode([0xa5u8; 32]), salt).unwrap();

    let err = dev.setup_with(&mut ctl).unwrap_err();
    assert!(matches!(err, DmError::ParamsOverflow { .. }));
    assert!(dev.upper_dev().is_none());
    assert_eq!(ctl.remove_calls, vec![false]);
    assert!(!ctl.registered);
}

#[test]
fn any_status_but_the_verified_marker_fails_setup() {
    for status in ["C", "", "V ", "V V"] {
        let mut ctl = MockControl::with_status(status);
        let mut dev = device();

        let err = dev.setup_with(&mut ctl).unwrap_err();
        match err {
            DmError::UnexpectedStatus(s) => assert_eq!(s, status),
            other => panic!("expected UnexpectedStatus, got {other:?}"),
        }
        assert!(dev.upper_dev().is_none());
        assert_eq!(ctl.remove_calls, vec![false]);
    }
}

#[test]
fn probe_read_failure_reports_the_io_error() {
    let mut ctl = MockControl::failing_at(Step::ProbeRead);
    let mut dev = device();

    let err = dev.setup_with(&mut ctl).unwrap_err();
    match err {
        DmError::ProbeReadFailed { node, source } => {
            assert_eq!(node, Path::new("/dev/dm-3"));
            assert_eq!(source.raw_os_error(), Some(5));
        }
        other => panic!("expected ProbeReadFailed, got {other:?}"),
    }
    assert!(!ctl.registered);
}

#[test]
fn rollback_remove_failure_never_masks_the_stage_error() {
    let mut ctl = MockControl::failing_at(Step::Resume);
    ctl.fail_remove = true;
    let mut dev = device();

    let err = dev.setup_with(&mut ctl).unwrap_err();
    assert!(matches!(err, DmError::ActivationFailed(_)));
    assert_eq!(ctl.remove_calls, vec![false]);
    assert!(dev.upper_dev().is_none());
}

#[test]
fn failed_remove_leaves_the_device_active() {
    let mut ctl = MockControl::new();
    let mut dev = device();

    dev.setup_with(&mut ctl).unwrap();
    ctl.fail_remove = true;

    let err = dev.remove_with(&mut ctl, false).unwrap_err();
    assert!(matches!(err, DmError::RemoveFailed(_)));
    assert!(dev.upper_dev().is_some(), "failed remove must not clear upper_dev");
}

#[test]
fn deferred_remove_passes_the_flag_through() {
    let mut ctl = MockControl::new();
    let mut dev = device();

    dev.setup_with(&mut ctl).unwrap();
    dev.remove_with(&mut ctl, true).unwrap();

    assert_eq!(ctl.remove_calls, vec![true]);
    assert!(dev.upper_dev().is_none());
}

#[test]
fn setup_rejects_an_active_device() {
    let mut ctl = MockControl::new();
    let mut dev = device();

    dev.setup_with(&mut ctl).unwrap();
    ctl.created = None;

    let err = dev.setup_with(&mut ctl).unwrap_err();
    assert!(matches!(err, DmError::InvalidState(_)));
    assert!(ctl.created.is_none(), "second setup must not touch the control plane");
    assert!(dev.upper_dev().is_some());
}

#[test]
fn remove_rejects_an_inactive_device() {
    let mut ctl = MockControl::new();
    let mut dev = device();

    let err = dev.remove_with(&mut ctl, false).unwrap_err();
    assert!(matches!(err, DmError::InvalidState(_)));
    assert!(ctl.remove_calls.is_empty());
}

#[test]
fn larger_regions_scale_blocks_and_sectors() {
    let mut ctl = MockControl::new();
    let mut dev = VerityDevice::new(
        "/dev/loop7",
        4096 * 137,
        hex::encode([0x11u8; 32]),
        hex::encode([0x22u8; 16]),
    )
    .unwrap();

    dev.setup_with(&mut ctl).unwrap();

    let (_, sectors, params) = ctl.loaded.as_ref().unwrap();
    assert_eq!(*sectors, 4096 * 137 / 512);
    assert!(params.contains(" 137 137 sha256 "));
}
