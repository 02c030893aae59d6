//! End-to-end scheduler scenarios against in-memory collaborators:
//! the tick walks the watch-list, failures stay isolated per target,
//! and stopping detaches the scheduler cleanly.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ethers::types::{Bytes, H256, U256};
use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;

use tally_contracts::acl::AclDecision;
use tally_contracts::{target_id_from_uuid, TargetRecord};
use tally_gateway_client::{codec, Decryption};
use tally_relayer::coordinator::{
    DecryptionCoordinator, Gateway, PermissionChecker, RetrySchedule,
    Submitter, TargetReader,
};
use tally_relayer::poller::VotePoller;
use tally_relayer_monitor::{Metrics, Monitor};
use tally_relayer_utils::{Error, Result};

fn record(target_id: H256, total: u64, decrypted: u64) -> TargetRecord {
    TargetRecord {
        target_id,
        target_type: 1,
        exists: true,
        total_votes: U256::from(total),
        decrypted_sum: U256::zero(),
        decrypted_count: U256::from(decrypted),
        enc_sum_handle: H256::repeat_byte(0x11),
        enc_count_handle: H256::repeat_byte(0x22),
        last_decrypt_time: U256::zero(),
    }
}

#[derive(Default)]
struct FakeReader {
    records: Mutex<HashMap<H256, TargetRecord>>,
    broken: Mutex<Vec<H256>>,
}

/// Local wrapper so the foreign `TargetReader` trait can be implemented
/// without tripping the orphan rule from this integration-test crate.
struct ReaderSeam(Arc<FakeReader>);

#[async_trait]
impl TargetReader for ReaderSeam {
    async fn read_target(&self, target_id: H256) -> Result<TargetRecord> {
        if self.0.broken.lock().contains(&target_id) {
            return Err(Error::ReadFailure("node unreachable".into()));
        }
        self.0
            .records
            .lock()
            .get(&target_id)
            .cloned()
            .ok_or_else(|| Error::ReadFailure("no such record".into()))
    }
}

struct OpenAcl;

#[async_trait]
impl PermissionChecker for OpenAcl {
    async fn check_permissions(&self, handles: &[H256]) -> AclDecision {
        AclDecision {
            per_handle: handles.iter().map(|h| (*h, true)).collect(),
            all_allowed: true,
        }
    }
}

struct FakeGateway {
    calls: AtomicUsize,
}

/// Local wrapper so the foreign `Gateway` trait can be implemented
/// without tripping the orphan rule from this integration-test crate.
struct GatewaySeam(Arc<FakeGateway>);

#[async_trait]
impl Gateway for GatewaySeam {
    async fn public_decrypt(&self, _: &[H256]) -> Result<Decryption> {
        self.0.calls.fetch_add(1, Ordering::SeqCst);
        let values = [U256::from(35u64), U256::from(10u64)];
        Ok(Decryption {
            cleartexts: values.to_vec(),
            clear_values: codec::encode_clear_values(&values, &[]).into(),
            proof: vec![1, 0xAA, 0x00].into(),
            signer_count: 1,
        })
    }
}

struct FakeSubmitter {
    stored: Mutex<Vec<H256>>,
}

/// Local wrapper so the foreign `Submitter` trait can be implemented
/// without tripping the orphan rule from this integration-test crate.
struct SubmitterSeam(Arc<FakeSubmitter>);

#[async_trait]
impl Submitter for SubmitterSeam {
    async fn request_decryption_data(&self, _: H256) -> Result<H256> {
        Ok(H256::repeat_byte(0xA1))
    }

    async fn verify_and_store_decryption(
        &self,
        target_id: H256,
        _: Bytes,
        _: Bytes,
    ) -> Result<H256> {
        self.0.stored.lock().push(target_id);
        Ok(H256::repeat_byte(0xB2))
    }
}

type TestCoordinator = DecryptionCoordinator<
    ReaderSeam,
    OpenAcl,
    GatewaySeam,
    SubmitterSeam,
>;

struct Harness {
    reader: Arc<FakeReader>,
    gateway: Arc<FakeGateway>,
    submitter: Arc<FakeSubmitter>,
    coordinator: Arc<TestCoordinator>,
    monitor: Monitor,
}

fn harness() -> Harness {
    let reader = Arc::new(FakeReader::default());
    let gateway = Arc::new(FakeGateway {
        calls: AtomicUsize::new(0),
    });
    let submitter = Arc::new(FakeSubmitter {
        stored: Mutex::new(vec![]),
    });
    let monitor = Monitor::new();
    let coordinator = Arc::new(DecryptionCoordinator::new(
        ReaderSeam(reader.clone()),
        OpenAcl,
        GatewaySeam(gateway.clone()),
        SubmitterSeam(submitter.clone()),
        monitor.clone(),
        Arc::new(Metrics::new().unwrap()),
        RetrySchedule {
            settle_delay: Duration::from_millis(1),
            attempts: 1,
            delay: Duration::from_millis(1),
        },
    ));
    Harness {
        reader,
        gateway,
        submitter,
        coordinator,
        monitor,
    }
}

#[tokio::test]
async fn a_failing_target_does_not_abort_the_tick() {
    let h = harness();
    let broken = target_id_from_uuid("broken-dapp");
    let healthy = target_id_from_uuid("healthy-dapp");
    h.reader.broken.lock().push(broken);
    h.reader
        .records
        .lock()
        .insert(healthy, record(healthy, 10, 3));

    let watch_list = Arc::new(RwLock::new(vec![broken, healthy]));
    let poller = VotePoller::new(
        h.coordinator.clone(),
        watch_list,
        h.monitor.clone(),
        Duration::from_secs(30),
    );
    poller.tick().await;

    // the healthy target still got decrypted and stored.
    assert_eq!(h.submitter.stored.lock().clone(), vec![healthy]);
    let state = h.monitor.state();
    assert!(state.last_check_ms.is_some());
    assert_eq!(state.error_count, 1);
    assert_eq!(state.processed_count, 1);
}

#[tokio::test]
async fn quiet_targets_cost_no_gateway_traffic() {
    let h = harness();
    let quiet = target_id_from_uuid("quiet-dapp");
    h.reader
        .records
        .lock()
        .insert(quiet, record(quiet, 5, 5));

    let watch_list = Arc::new(RwLock::new(vec![quiet]));
    let poller = VotePoller::new(
        h.coordinator.clone(),
        watch_list,
        h.monitor.clone(),
        Duration::from_secs(30),
    );
    poller.tick().await;

    assert_eq!(h.gateway.calls.load(Ordering::SeqCst), 0);
    assert!(h.submitter.stored.lock().is_empty());
    assert!(h.monitor.state().last_check_ms.is_some());
}

#[tokio::test]
async fn the_scheduler_stops_on_signal() {
    let h = harness();
    let busy = target_id_from_uuid("busy-dapp");
    h.reader.records.lock().insert(busy, record(busy, 10, 0));

    let watch_list = Arc::new(RwLock::new(vec![busy]));
    let poller = VotePoller::new(
        h.coordinator.clone(),
        watch_list,
        h.monitor.clone(),
        Duration::from_millis(20),
    );
    let (stop_tx, stop_rx) = broadcast::channel(1);
    let task = tokio::spawn(poller.run(stop_rx));

    // let at least one tick land, then stop.
    tokio::time::sleep(Duration::from_millis(100)).await;
    stop_tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(1), task)
        .await
        .expect("scheduler should stop promptly")
        .unwrap();

    assert!(!h.submitter.stored.lock().is_empty());
}
