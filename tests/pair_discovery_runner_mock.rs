use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time;

use snipe_engine::pair_discovery::mock::spawn_mock_feed;
use snipe_engine::types::PoolCandidate;

#[tokio::test]
async fn mock_feed_emits_candidates() {
    let (tx, mut rx) = mpsc::channel::<PoolCandidate>(16);
    let handle = spawn_mock_feed(tx, Duration::from_millis(10));

    let received = time::timeout(Duration::from_millis(500), rx.recv()).await;
    handle.abort();

    assert!(received.is_ok(), "expected at least one mock candidate within timeout");
    assert!(received.unwrap().is_some());
}
