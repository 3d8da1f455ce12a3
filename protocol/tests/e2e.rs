//! End-to-end integration tests for the shard-storage protocol.
//!
//! These tests run a renter/farmer cluster on the in-memory grid and
//! exercise the full negotiation lifecycle: contract publication, the
//! farmer's offer, countersigning, consignment, retrieval, and the
//! audit challenge/response rounds — all through the signed-envelope
//! RPC path, exactly as it runs over HTTP.
//!
//! Each test stands alone with its own grid and temporary storage.
//! No shared state, no test ordering dependencies, no flaky failures.

use std::sync::Arc;
use std::time::Duration;

use storj_protocol::contact::{unix_millis, Contact, ContactBook};
use storj_protocol::identity::{Identity, NodeId};
use storj_protocol::message::rpc::{RpcMethod, RpcRequest};
use storj_protocol::message::MessageAuth;
use storj_protocol::network::memory::MemoryGrid;
use storj_protocol::network::node::{NetworkStack, NodeOptions};
use storj_protocol::network::Transport;
use storj_protocol::storage::{ItemStore, ShardStore, SledShardStore};
use storj_protocol::{Node, NodeError};

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

/// A node wired to the grid, plus the handles tests need to poke at its
/// internals: the items directory (to inspect persisted state) and the
/// shard store (to simulate a farmer discarding data).
struct TestPeer {
    node: Node,
    contact: Contact,
    shards: Arc<SledShardStore>,
    items_dir: tempfile::TempDir,
}

fn spawn_peer(grid: &Arc<MemoryGrid>, port: u16, farm: bool, seeds: Vec<Contact>) -> TestPeer {
    let identity = Identity::generate();
    let contact = Contact::new("127.0.0.1", port, identity.node_id());
    let book = Arc::new(ContactBook::new());
    let auth = Arc::new(MessageAuth::new(identity.clone(), Arc::clone(&book)));
    let items_dir = tempfile::tempdir().expect("tempdir");
    let items = ItemStore::open(items_dir.path()).expect("item store");
    let shards = Arc::new(SledShardStore::open_temporary().expect("shard store"));

    let node = Node::new(
        identity,
        contact.clone(),
        NodeOptions { farm, seeds },
        auth,
        book,
        NetworkStack::in_memory(grid),
        Arc::clone(&shards) as Arc<dyn ShardStore>,
        items,
    );
    grid.attach(contact.clone(), Arc::new(node.clone()));

    TestPeer {
        node,
        contact,
        shards,
        items_dir,
    }
}

/// A joined renter + farmer pair: the renter's seed list is the farmer.
async fn cluster(grid: &Arc<MemoryGrid>) -> (TestPeer, TestPeer) {
    let farmer = spawn_peer(grid, 4001, true, vec![]);
    farmer.node.join().await.expect("farmer join");

    let renter = spawn_peer(grid, 4000, false, vec![farmer.contact.clone()]);
    renter.node.join().await.expect("renter join");

    (renter, farmer)
}

/// Count the remaining audit challenges the renter holds for a shard.
fn remaining_challenges(renter: &TestPeer, shard_hash: &NodeId, farmer_id: &NodeId) -> usize {
    let items = ItemStore::open(renter.items_dir.path()).expect("reopen item store");
    let item = items
        .load(shard_hash)
        .expect("load item")
        .expect("item exists");
    item.challenges
        .get(farmer_id)
        .map(|record| record.remaining())
        .unwrap_or(0)
}

// ---------------------------------------------------------------------------
// S1: Sign/verify happy path
// ---------------------------------------------------------------------------

#[tokio::test]
async fn s1_signed_envelope_accepts_fresh_and_rejects_stale() {
    let signer = Identity::generate();
    let signer_contact = Contact::new("127.0.0.1", 4000, signer.node_id());
    let receiver = MessageAuth::new(Identity::generate(), Arc::new(ContactBook::new()));

    // Fresh message: signed now, verified now.
    let signer_auth = MessageAuth::new(signer.clone(), Arc::new(ContactBook::new()));
    let mut fresh = RpcRequest::new(
        RpcMethod::Ping,
        serde_json::json!({ "contact": signer_contact }),
    );
    signer_auth.sign_request(&mut fresh);
    assert!(receiver.verify_request(&signer_contact, &mut fresh).is_ok());

    // Stale message: the envelope of msg_id "abc" with a nonce minted
    // 20 seconds ago is outside the 15-second window.
    let stale_nonce = unix_millis() - 20_000;
    let mut stale = RpcRequest::new(RpcMethod::Ping, serde_json::json!({}));
    stale.id = "abc".into();
    let target = format!("abc{stale_nonce}");
    let signature = signer.sign(target.as_bytes());
    let params = stale.params.as_object_mut().unwrap();
    params.insert("__nonce".into(), serde_json::json!(stale_nonce));
    params.insert(
        "__signature".into(),
        serde_json::json!(signature.to_base64()),
    );

    let err = receiver
        .verify_request(&signer_contact, &mut stale)
        .unwrap_err();
    assert!(err.to_string().contains("nonce expired"));
}

// ---------------------------------------------------------------------------
// S2: Store / retrieve
// ---------------------------------------------------------------------------

#[tokio::test]
async fn s2_store_then_retrieve_roundtrips_the_shard() {
    let grid = MemoryGrid::new();
    let (renter, farmer) = cluster(&grid).await;

    let shard_hash = renter
        .node
        .store(b"hello", Duration::from_secs(3600))
        .await
        .expect("store succeeds");

    // The returned hash is the content address of the bytes.
    assert_eq!(shard_hash, NodeId::from_content(b"hello"));

    // The farmer physically holds the shard.
    assert!(farmer.shards.contains(&shard_hash).unwrap());

    // And the bytes come back intact.
    let bytes = renter.node.retrieve(&shard_hash).await.expect("retrieve");
    assert_eq!(bytes, b"hello");
}

#[tokio::test]
async fn store_persists_the_renter_storage_item() {
    let grid = MemoryGrid::new();
    let (renter, farmer) = cluster(&grid).await;

    let shard_hash = renter
        .node
        .store(b"persisted shard", Duration::from_secs(3600))
        .await
        .expect("store");

    let items = ItemStore::open(renter.items_dir.path()).unwrap();
    let item = items.load(&shard_hash).unwrap().expect("item persisted");

    // One replica, all four maps key-aligned under the farmer's id.
    let farmer_id = farmer.node.node_id();
    assert_eq!(item.contracts.len(), 1);
    assert!(item.contracts.contains_key(&farmer_id));
    assert!(item.trees.contains_key(&farmer_id));
    assert!(item.challenges.contains_key(&farmer_id));
    assert!(item.meta.contains_key(&farmer_id));

    // The stored contract carries both signatures and the farmer's
    // payment destination.
    let contract = item.contracts.get(&farmer_id).unwrap();
    assert!(contract.is_complete());
    assert_eq!(contract.payment_destination.as_deref(), Some(farmer.node.address()).as_deref());
}

#[tokio::test]
async fn first_valid_offer_wins_with_competing_farmers() {
    let grid = MemoryGrid::new();
    let farmer_a = spawn_peer(&grid, 4001, true, vec![]);
    let farmer_b = spawn_peer(&grid, 4002, true, vec![]);
    farmer_a.node.join().await.unwrap();
    farmer_b.node.join().await.unwrap();

    let renter = spawn_peer(
        &grid,
        4000,
        false,
        vec![farmer_a.contact.clone(), farmer_b.contact.clone()],
    );
    renter.node.join().await.unwrap();

    let shard_hash = renter
        .node
        .store(b"contested shard", Duration::from_secs(3600))
        .await
        .expect("store");

    // Exactly one farmer ended up under contract (v1 single-replica),
    // and nothing is left pending.
    let items = ItemStore::open(renter.items_dir.path()).unwrap();
    let item = items.load(&shard_hash).unwrap().unwrap();
    assert_eq!(item.contracts.len(), 1);
    assert_eq!(renter.node.pending_count(), 0);
}

// ---------------------------------------------------------------------------
// S3 / S4: Audit pass and fail
// ---------------------------------------------------------------------------

#[tokio::test]
async fn s3_audit_passes_while_farmer_holds_the_shard() {
    let grid = MemoryGrid::new();
    let (renter, farmer) = cluster(&grid).await;
    let farmer_id = farmer.node.node_id();

    let shard_hash = renter
        .node
        .store(b"audited shard", Duration::from_secs(3600))
        .await
        .expect("store");
    assert_eq!(remaining_challenges(&renter, &shard_hash, &farmer_id), 12);

    let verdict = renter.node.audit(&shard_hash).await.expect("audit runs");
    assert!(verdict, "an honest farmer passes the audit");

    // One pre-image revealed, eleven left.
    assert_eq!(remaining_challenges(&renter, &shard_hash, &farmer_id), 11);
}

#[tokio::test]
async fn s4_audit_fails_after_farmer_discards_the_shard() {
    let grid = MemoryGrid::new();
    let (renter, farmer) = cluster(&grid).await;
    let farmer_id = farmer.node.node_id();

    let shard_hash = renter
        .node
        .store(b"doomed shard", Duration::from_secs(3600))
        .await
        .expect("store");
    assert!(renter.node.audit(&shard_hash).await.unwrap());

    // The farmer silently discards the shard bytes.
    farmer.shards.delete(&shard_hash).unwrap();

    let verdict = renter.node.audit(&shard_hash).await.expect("audit runs");
    assert!(!verdict, "a farmer without the shard fails the audit");

    // The challenge was still consumed: 12 - 2 = 10 remain. Revealed
    // pre-images are never reused, verdict or no verdict.
    assert_eq!(remaining_challenges(&renter, &shard_hash, &farmer_id), 10);
}

#[tokio::test]
async fn audits_exhaust_after_the_precommitted_supply() {
    let grid = MemoryGrid::new();
    let (renter, _farmer) = cluster(&grid).await;

    let shard_hash = renter
        .node
        .store(b"fully audited shard", Duration::from_secs(3600))
        .await
        .expect("store");

    // All twelve pre-committed challenges pass.
    for round in 0..12 {
        let verdict = renter.node.audit(&shard_hash).await.expect("audit runs");
        assert!(verdict, "audit round {round} should pass");
    }

    // The thirteenth has nothing left to reveal.
    assert!(matches!(
        renter.node.audit(&shard_hash).await,
        Err(NodeError::ChallengesExhausted)
    ));
}

// ---------------------------------------------------------------------------
// S5: Unknown shard
// ---------------------------------------------------------------------------

#[tokio::test]
async fn s5_retrieve_of_unknown_shard_is_a_storage_error() {
    let grid = MemoryGrid::new();
    let (renter, _farmer) = cluster(&grid).await;

    let unknown = NodeId::from_content(b"nobody ever stored this");
    assert!(matches!(
        renter.node.retrieve(&unknown).await,
        Err(NodeError::StorageError(_))
    ));
    assert!(matches!(
        renter.node.audit(&unknown).await,
        Err(NodeError::StorageError(_))
    ));
}

// ---------------------------------------------------------------------------
// S6: Tampered signature
// ---------------------------------------------------------------------------

#[tokio::test]
async fn s6_request_with_stolen_node_id_is_dropped_silently() {
    let grid = MemoryGrid::new();
    let (_renter, farmer) = cluster(&grid).await;

    // Q signs with its own key but claims K's node id in the contact.
    let victim = Identity::generate();
    let imposter = Identity::generate();
    let forged_contact = Contact::new("127.0.0.1", 4999, victim.node_id());

    let mut request = RpcRequest::new(
        RpcMethod::Ping,
        serde_json::json!({ "contact": forged_contact }),
    );
    MessageAuth::new(imposter, Arc::new(ContactBook::new())).sign_request(&mut request);

    let failures_before = farmer.node.auth_failures();
    let outcome = grid.send(&farmer.contact, request).await;

    // No reply — the message was dropped, and the drop was counted.
    assert!(outcome.is_err());
    assert_eq!(farmer.node.auth_failures(), failures_before + 1);
}

// ---------------------------------------------------------------------------
// Lifecycle invariants
// ---------------------------------------------------------------------------

#[tokio::test]
async fn join_twice_fails_without_disturbing_the_cluster() {
    let grid = MemoryGrid::new();
    let (renter, _farmer) = cluster(&grid).await;

    assert!(matches!(
        renter.node.join().await,
        Err(NodeError::AlreadyOpen)
    ));

    // The node still works after the rejected second join.
    let shard_hash = renter
        .node
        .store(b"still alive", Duration::from_secs(3600))
        .await
        .expect("store still works");
    assert_eq!(
        renter.node.retrieve(&shard_hash).await.unwrap(),
        b"still alive"
    );
}

#[tokio::test]
async fn left_node_refuses_operations() {
    let grid = MemoryGrid::new();
    let (renter, _farmer) = cluster(&grid).await;

    renter.node.leave().await.unwrap();
    assert!(matches!(
        renter.node.store(b"too late", Duration::from_secs(60)).await,
        Err(NodeError::NotOpen)
    ));
    assert!(matches!(renter.node.leave().await, Err(NodeError::NotOpen)));
}
