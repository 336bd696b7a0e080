//! Lifecycle tests for the driver hosted on the in-memory namespace.
//!
//! The namespace plays the object manager: it enforces name collisions,
//! records every create/delete in order, and can fail a chosen call. That is
//! enough to check startup rollback, teardown order and stop idempotence
//! without a live kernel.

use std::sync::Arc;

use kmon_driver::consts::*;
use kmon_driver::namespace::{Fault, Namespace, NamespaceOp};
use kmon_driver::config::SESSION_BUFFER_LIMIT;
use kmon_driver::{
    driver_entry, CancelToken, Driver, DriverConfig, DriverState, FileObject, Irp, ObjectManager,
    RegistrationInfo, Stage, StartError,
};
use shared::constants::{DEVICE_NAME, SYMBOLIC_LINK};

fn registration() -> RegistrationInfo {
    RegistrationInfo {
        registry_path: r"\Registry\Machine\System\CurrentControlSet\Services\kmon".into(),
    }
}

fn host() -> (Arc<Namespace>, Arc<dyn ObjectManager>) {
    let ns = Arc::new(Namespace::new());
    let om: Arc<dyn ObjectManager> = ns.clone();
    (ns, om)
}

const FILE: FileObject = FileObject { id: 1, process_id: 4242 };

#[test]
fn start_publishes_device_and_alias() {
    let (ns, om) = host();
    let mut driver = Driver::new(om, DriverConfig::default());
    driver.start(&registration()).unwrap();

    assert_eq!(driver.state(), DriverState::ManagerReady);
    assert!(driver.is_present());
    assert!(!driver.is_degraded());
    assert!(ns.device_exists(DEVICE_NAME));
    assert!(ns.resolve(SYMBOLIC_LINK));

    let device = driver.device().unwrap();
    assert!(device.is_direct_io());
    assert!(!device.is_initializing());
    assert_eq!(device.characteristics() & FILE_DEVICE_SECURE_OPEN, FILE_DEVICE_SECURE_OPEN);
    assert_eq!(device.alias().map(|a| a.to_string()).as_deref(), Some(SYMBOLIC_LINK));

    assert_eq!(
        ns.journal(),
        vec![
            NamespaceOp::CreateDevice(DEVICE_NAME.into()),
            NamespaceOp::CreateLink(SYMBOLIC_LINK.into()),
        ]
    );
}

#[test]
fn second_start_is_refused_without_side_effects() {
    let (ns, om) = host();
    let mut driver = Driver::new(om, DriverConfig::default());
    driver.start(&registration()).unwrap();

    let err = driver.start(&registration()).unwrap_err();
    assert!(matches!(err, StartError::AlreadyStarted));
    assert_eq!(driver.state(), DriverState::ManagerReady);
    assert_eq!(ns.device_count(), 1);
    assert_eq!(ns.link_count(), 1);
}

#[test]
fn name_in_use_fails_and_leaves_nothing_behind() {
    let (ns, om) = host();
    let _other = driver_entry(om.clone(), DriverConfig::default(), &registration()).unwrap();

    let mut mine = DriverConfig::default();
    mine.device.alias = r"\??\KmonSecond".into();
    let mut driver = Driver::new(om, mine);
    let err = driver.start(&registration()).unwrap_err();

    assert_eq!(err.status(), STATUS_OBJECT_NAME_COLLISION);
    assert_eq!(err.stage(), Some(Stage::DeviceCreation));
    assert_eq!(driver.state(), DriverState::Failed(Stage::DeviceCreation));
    assert!(!driver.is_present());
    assert!(!ns.link_exists(r"\??\KmonSecond"));

    driver.stop();
    assert_eq!(driver.state(), DriverState::Unstarted);
    assert_eq!(ns.device_count(), 1, "the other endpoint must be untouched");
}

#[test]
fn alias_failure_rolls_back_the_device() {
    let (ns, om) = host();
    ns.inject(Fault::CreateLink(STATUS_INSUFFICIENT_RESOURCES));

    let mut driver = Driver::new(om, DriverConfig::default());
    let err = driver.start(&registration()).unwrap_err();

    assert_eq!(err.status(), STATUS_INSUFFICIENT_RESOURCES);
    assert_eq!(driver.state(), DriverState::Failed(Stage::AliasPublication));
    assert!(!ns.device_exists(DEVICE_NAME));
    assert!(!ns.link_exists(SYMBOLIC_LINK));
    assert!(ns.dangling_links().is_empty());
    assert_eq!(
        ns.journal(),
        vec![
            NamespaceOp::CreateDevice(DEVICE_NAME.into()),
            NamespaceOp::DeleteDevice(DEVICE_NAME.into()),
        ]
    );
}

#[test]
fn alias_taken_by_another_object_rolls_back() {
    let (ns, om) = host();
    let _other = driver_entry(om.clone(), DriverConfig::default(), &registration()).unwrap();

    let mut cfg = DriverConfig::default();
    cfg.device.name = r"\Device\KmonOther".into();
    let mut driver = Driver::new(om, cfg);
    let err = driver.start(&registration()).unwrap_err();

    assert_eq!(err.stage(), Some(Stage::AliasPublication));
    assert!(!ns.device_exists(r"\Device\KmonOther"));
    assert!(ns.resolve(SYMBOLIC_LINK), "existing alias keeps pointing at the first device");
}

#[test]
fn invalid_names_fail_before_any_object_exists() {
    let (ns, om) = host();
    let mut cfg = DriverConfig::default();
    cfg.device.name = "Device".into();

    let mut driver = Driver::new(om, cfg);
    let err = driver.start(&registration()).unwrap_err();
    assert_eq!(err.status(), STATUS_OBJECT_NAME_INVALID);
    assert_eq!(driver.state(), DriverState::Failed(Stage::NameBinding));
    assert!(ns.journal().is_empty());
}

#[test]
fn device_creation_failure_is_reported() {
    let (ns, om) = host();
    ns.inject(Fault::CreateDevice(STATUS_INSUFFICIENT_RESOURCES));

    let mut driver = Driver::new(om, DriverConfig::default());
    let err = driver.start(&registration()).unwrap_err();
    assert_eq!(err.stage(), Some(Stage::DeviceCreation));
    assert!(ns.journal().is_empty());

    // the fault was one-shot, a retry goes through
    driver.start(&registration()).unwrap();
    assert!(driver.is_present());
}

#[test]
fn teardown_removes_alias_strictly_before_device() {
    let (ns, om) = host();
    let mut driver = driver_entry(om, DriverConfig::default(), &registration()).unwrap();
    driver.stop();

    let journal = ns.journal();
    let link_gone = journal
        .iter()
        .position(|op| *op == NamespaceOp::DeleteLink(SYMBOLIC_LINK.into()))
        .unwrap();
    let device_gone = journal
        .iter()
        .position(|op| *op == NamespaceOp::DeleteDevice(DEVICE_NAME.into()))
        .unwrap();
    assert!(link_gone < device_gone);
    assert!(ns.dangling_links().is_empty());
    assert_eq!(ns.device_count(), 0);
}

#[test]
fn stop_twice_equals_stop_once() {
    let (ns, om) = host();
    let mut driver = driver_entry(om, DriverConfig::default(), &registration()).unwrap();

    driver.stop();
    let after_first = (driver.state(), ns.journal(), ns.device_count(), ns.link_count());
    driver.stop();
    let after_second = (driver.state(), ns.journal(), ns.device_count(), ns.link_count());

    assert_eq!(after_first, after_second);
    assert_eq!(driver.state(), DriverState::Unstarted);
}

#[test]
fn stop_before_start_is_harmless() {
    let (ns, om) = host();
    let mut driver = Driver::new(om, DriverConfig::default());
    driver.stop();
    assert_eq!(driver.state(), DriverState::Unstarted);
    assert!(ns.journal().is_empty());
}

#[test]
fn dropping_the_driver_unloads_it() {
    let (ns, om) = host();
    {
        let _driver = driver_entry(om, DriverConfig::default(), &registration()).unwrap();
        assert!(ns.resolve(SYMBOLIC_LINK));
    }
    assert!(!ns.device_exists(DEVICE_NAME));
    assert!(!ns.link_exists(SYMBOLIC_LINK));
}

#[test]
fn restart_after_stop_reuses_the_names() {
    let (ns, om) = host();
    let mut driver = driver_entry(om, DriverConfig::default(), &registration()).unwrap();
    driver.stop();
    driver.start(&registration()).unwrap();
    assert!(ns.resolve(SYMBOLIC_LINK));
    assert_eq!(driver.state(), DriverState::ManagerReady);
}

#[test]
fn requests_after_stop_find_no_device() {
    let (_ns, om) = host();
    let mut driver = driver_entry(om, DriverConfig::default(), &registration()).unwrap();
    driver.stop();

    let mut irp = Irp::create(FILE);
    assert_eq!(driver.dispatch(&mut irp), STATUS_NO_SUCH_DEVICE);
    assert!(irp.is_completed());
}

/*──────────────────────── manager failure ───────────────────────────────*/

fn failing_manager(required: bool) -> DriverConfig {
    let mut cfg = DriverConfig::default();
    cfg.manager.event_queue_depth = 0; // init rejects zero limits
    cfg.manager.required = required;
    cfg
}

#[test]
fn manager_failure_degrades_but_endpoint_serves_requests() {
    let (ns, om) = host();
    let driver = driver_entry(om, failing_manager(false), &registration()).unwrap();

    assert_eq!(driver.state(), DriverState::ManagerReady);
    assert!(driver.is_degraded());
    assert!(driver.manager().is_none());
    assert!(ns.resolve(SYMBOLIC_LINK));

    let mut open = Irp::create(FILE);
    assert_eq!(driver.dispatch(&mut open), STATUS_SUCCESS);

    let mut write = Irp::write(FILE, b"hello");
    assert_eq!(driver.dispatch(&mut write), STATUS_SUCCESS);
    assert_eq!(write.information(), 0);

    let mut read = Irp::read(FILE, 16);
    assert_eq!(driver.dispatch(&mut read), STATUS_SUCCESS);
    assert!(read.output().is_empty());

    let mut ioctl = Irp::device_control(FILE, shared::constants::IOCTL_READ_DATA, vec![0; 64]);
    assert_eq!(driver.dispatch(&mut ioctl), STATUS_DEVICE_NOT_READY);

    let mut cleanup = Irp::cleanup(FILE);
    assert_eq!(driver.dispatch(&mut cleanup), STATUS_SUCCESS);
}

#[test]
fn degraded_transfers_still_observe_cancellation() {
    let (_ns, om) = host();
    let mut cfg = DriverConfig::default();
    cfg.manager.enabled = false;
    let driver = driver_entry(om, cfg, &registration()).unwrap();
    assert!(driver.is_degraded());

    let token = CancelToken::new();
    token.cancel();

    let mut read = Irp::read(FILE, 16).with_cancel(token.clone());
    assert_eq!(driver.dispatch(&mut read), STATUS_CANCELLED);
    assert_eq!(read.information(), 0);

    let mut write = Irp::write(FILE, b"hello").with_cancel(token);
    assert_eq!(driver.dispatch(&mut write), STATUS_CANCELLED);
    assert_eq!(write.information(), 0);
}

#[test]
fn oversized_manager_limits_degrade_instead_of_aborting() {
    let (ns, om) = host();
    let mut cfg = DriverConfig::default();
    cfg.manager.session_buffer_bytes = usize::MAX / 2;
    cfg.manager.event_queue_depth = usize::MAX / 2;
    let driver = driver_entry(om, cfg, &registration()).unwrap();

    assert!(driver.is_degraded());
    assert!(ns.resolve(SYMBOLIC_LINK));

    let mut open = Irp::create(FILE);
    assert_eq!(driver.dispatch(&mut open), STATUS_SUCCESS);
}

#[test]
fn largest_session_buffer_opens_without_preallocating() {
    let (_ns, om) = host();
    let mut cfg = DriverConfig::default();
    cfg.manager.session_buffer_bytes = SESSION_BUFFER_LIMIT;
    cfg.manager.max_sessions = 64;
    let driver = driver_entry(om, cfg, &registration()).unwrap();
    assert!(!driver.is_degraded());

    for id in 0..64 {
        let mut open = Irp::create(FileObject { id, process_id: 10 });
        assert_eq!(driver.dispatch(&mut open), STATUS_SUCCESS);
    }
    let session = driver.manager().unwrap().session(5).unwrap();
    assert_eq!(session.pending(), 0);
}

#[test]
fn disabled_manager_runs_degraded() {
    let (_ns, om) = host();
    let mut cfg = DriverConfig::default();
    cfg.manager.enabled = false;
    let driver = driver_entry(om, cfg, &registration()).unwrap();
    assert!(driver.is_degraded());
}

#[test]
fn required_manager_failure_rolls_back_everything() {
    let (ns, om) = host();
    let mut driver = Driver::new(om, failing_manager(true));
    let err = driver.start(&registration()).unwrap_err();

    assert!(matches!(err, StartError::Manager { status } if status == STATUS_INVALID_PARAMETER));
    assert_eq!(driver.state(), DriverState::Failed(Stage::ManagerInit));
    assert!(!driver.is_present());
    assert_eq!(ns.device_count(), 0);
    assert_eq!(ns.link_count(), 0);

    let journal = ns.journal();
    assert_eq!(
        journal[2..],
        [
            NamespaceOp::DeleteLink(SYMBOLIC_LINK.into()),
            NamespaceOp::DeleteDevice(DEVICE_NAME.into()),
        ]
    );
}

#[test]
fn exclusive_device_is_created_exclusive() {
    let (ns, om) = host();
    let mut cfg = DriverConfig::default();
    cfg.device.exclusive = true;
    cfg.device.secure_open = false;
    let driver = driver_entry(om, cfg, &registration()).unwrap();

    assert_eq!(ns.is_exclusive(DEVICE_NAME), Some(true));
    let device = driver.device().unwrap();
    assert_eq!(device.flags() & DO_EXCLUSIVE, DO_EXCLUSIVE);
    assert_eq!(device.characteristics(), 0);
}
