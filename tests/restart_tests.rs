// ABOUTME: End-to-end tests for the sync loop across agent restarts
// ABOUTME: A file-backed group store must keep a restarted agent from creating duplicate groups

use raduno::scheduler::run_sync_loop;
use raduno_core::chain::ChainReader;
use raduno_core::deadline::Deadline;
use raduno_core::reconciler::Reconciler;
use raduno_core::store::GroupStore;
use raduno_core::testing::{MockContracts, MockEvent, MockTransport, TransportCall};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::watch;

const AGENT: &str = "0x00000000000000000000000000000000000a6e47";
const EVENT: &str = "0xaaa0000000000000000000000000000000000001";
const OWNER: &str = "0x0000000000000000000000000000000000000a11";
const P1: &str = "0x0000000000000000000000000000000000000001";
const P2: &str = "0x0000000000000000000000000000000000000002";
const P3: &str = "0x0000000000000000000000000000000000000003";

fn reconciler(transport: &MockTransport, contracts: &MockContracts, db: &Path) -> Reconciler {
    let deadline = Deadline::from_secs(5);
    Reconciler::new(
        Arc::new(transport.clone()),
        ChainReader::new(Arc::new(contracts.clone()), "raduno.eth", deadline),
        GroupStore::new(db).unwrap(),
        deadline,
        false,
    )
}

async fn run_once(reconciler: Reconciler) {
    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn(run_sync_loop(reconciler, Duration::from_secs(3600), rx));
    tokio::time::sleep(Duration::from_secs(1)).await;
    tx.send(true).unwrap();
    assert_eq!(handle.await.unwrap(), 1);
}

fn creates(transport: &MockTransport) -> usize {
    transport
        .calls()
        .iter()
        .filter(|c| matches!(c, TransportCall::CreateGroup(_)))
        .count()
}

#[tokio::test(start_paused = true)]
async fn test_restart_reuses_stored_group() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("group-mappings.db");

    let transport = MockTransport::new(AGENT)
        .with_user(P1, "inbox-p1")
        .with_user(P2, "inbox-p2")
        .with_user(P3, "inbox-p3");
    let contracts = MockContracts::new()
        .with_event(MockEvent::new(EVENT, OWNER, "hack").participants(&[P1, P2]));

    run_once(reconciler(&transport, &contracts, &db)).await;
    assert_eq!(creates(&transport), 1);
    let group_id = transport.groups()[0].id.clone();

    // New participant registers while the agent is down
    contracts.set_participants(EVENT, &[P1, P2, P3]);

    run_once(reconciler(&transport, &contracts, &db)).await;
    assert_eq!(creates(&transport), 1, "restart must not create a second group");
    assert_eq!(transport.groups().len(), 1);
    assert_eq!(
        transport.member_addresses(&group_id),
        {
            let mut expected = vec![AGENT.to_string(), P1.to_string(), P2.to_string(), P3.to_string()];
            expected.sort();
            expected
        }
    );

    let mappings = GroupStore::new(&db).unwrap().list_all().unwrap();
    assert_eq!(mappings.len(), 1);
    assert_eq!(mappings[0].event_address, EVENT);
    assert_eq!(mappings[0].group_id, group_id);
    assert_eq!(mappings[0].agent_address.as_deref(), Some(AGENT));
}
