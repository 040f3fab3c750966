//! Pre-warming of an empty pool

mod common;

use common::{controller, naming, settings, FakeCloud};
use std::sync::atomic::Ordering;
use std::time::Duration;

use blobdisk::config::ProcessRole;
use blobdisk::storage::SkuClass;

#[tokio::test]
async fn test_control_plane_warms_empty_pool() {
    let cloud = FakeCloud::new();
    let naming = naming();
    let controller = controller(&cloud, &settings());
    controller.refresh_pool().await.unwrap();

    assert_eq!(controller.bootstrap().await, 2);
    controller.wait_for_bootstrap().await;

    let premium = naming.account_name_for(1);
    let standard = naming.account_name_for(2);
    assert_eq!(cloud.account_sku(&premium), Some(SkuClass::PremiumLrs));
    assert_eq!(cloud.account_sku(&standard), Some(SkuClass::StandardLrs));
    assert!(controller.pool().get(&premium).await.unwrap().is_container_created());
    assert!(controller.pool().get(&standard).await.unwrap().is_container_created());
    assert_eq!(controller.pool().pool_account_count().await, 2);
}

#[tokio::test]
async fn test_ignored_bootstrap_result_still_warms_pool() {
    let cloud = FakeCloud::new();
    let controller = controller(&cloud, &settings());
    controller.refresh_pool().await.unwrap();

    let _ = controller.bootstrap().await;

    for _ in 0..200 {
        if FakeCloud::count(&cloud.container_create_calls) == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(cloud.account_names().len(), 2);
    assert_eq!(FakeCloud::count(&cloud.container_create_calls), 2);
}

#[tokio::test]
async fn test_bootstrap_runs_once() {
    let cloud = FakeCloud::new();
    let controller = controller(&cloud, &settings());
    controller.refresh_pool().await.unwrap();

    controller.bootstrap().await;
    controller.wait_for_bootstrap().await;
    assert_eq!(controller.bootstrap().await, 0);
    assert_eq!(FakeCloud::count(&cloud.create_calls), 2);
}

#[tokio::test]
async fn test_node_process_does_not_bootstrap() {
    let cloud = FakeCloud::new();
    let mut settings = settings();
    settings.role = ProcessRole::Node;
    let controller = controller(&cloud, &settings);
    controller.refresh_pool().await.unwrap();

    assert_eq!(controller.bootstrap().await, 0);
    controller.wait_for_bootstrap().await;
    assert!(cloud.account_names().is_empty());
}

#[tokio::test]
async fn test_existing_pool_is_not_warmed() {
    let cloud = FakeCloud::new();
    let naming = naming();
    cloud.seed_account(&naming.account_name_for(7), SkuClass::StandardLrs, naming.container(), 3);

    let controller = controller(&cloud, &settings());
    controller.refresh_pool().await.unwrap();

    assert_eq!(controller.bootstrap().await, 0);
    assert_eq!(FakeCloud::count(&cloud.create_calls), 0);
}

#[tokio::test]
async fn test_shutdown_stops_bootstrap_tasks() {
    let cloud = FakeCloud::new();
    cloud.creating_polls.store(u32::MAX, Ordering::SeqCst);

    let mut settings = settings();
    settings.pool.provisioning_backoff.steps = 10_000;
    let controller = controller(&cloud, &settings);
    controller.refresh_pool().await.unwrap();

    assert_eq!(controller.bootstrap().await, 2);
    controller.shutdown().await;
    controller.wait_for_bootstrap().await;

    // Neither account ever became ready, so no container was made
    assert_eq!(FakeCloud::count(&cloud.container_create_calls), 0);
}
