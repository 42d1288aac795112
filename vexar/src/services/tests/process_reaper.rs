//! Tests for SystemReaper

use crate::services::SystemReaper;
use crate::traits::StrayProcessReaper;

#[tokio::test]
async fn test_nothing_to_reap() {
    let reaper = SystemReaper::new();
    let count = reaper
        .terminate_strays("vexar-test-no-such-process-name")
        .await
        .unwrap();
    assert_eq!(count, 0);
}
