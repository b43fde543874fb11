/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use router::RouteTarget;

use crate::harness::build_env;

#[tokio::test]
async fn add_remove_is_idempotent() {
    let env = build_env(false).await;
    let router = &env.server.core.router;

    for _ in 0..3 {
        router
            .add_email_route("cat@call.autoroad.lv", 42, RouteTarget::EncryptedPipe(42))
            .await
            .unwrap();
    }
    let map = env.transport_map();
    assert_eq!(
        map.matches("cat@call.autoroad.lv\tencimap-pipe:42").count(),
        1
    );

    // Same key, different case on the domain part: replaced, not added.
    router
        .add_email_route("cat@CALL.AUTOROAD.LV", 42, RouteTarget::EncryptedPipe(43))
        .await
        .unwrap();
    let map = env.transport_map();
    assert_eq!(map.matches("cat@call.autoroad.lv").count(), 1);
    assert!(map.contains("encimap-pipe:43"));

    assert!(router
        .remove_email_route("cat@call.autoroad.lv", None)
        .await
        .unwrap());
    assert!(!router
        .remove_email_route("cat@call.autoroad.lv", None)
        .await
        .unwrap());
    assert!(!env.transport_map().contains("cat@call.autoroad.lv"));

    // Every write compiled the map.
    assert!(env.mta_driver.compiles.lock().len() >= 5);
    env.cleanup();
}

#[tokio::test]
async fn catchall_and_domain_routes() {
    let env = build_env(false).await;
    let router = &env.server.core.router;

    router
        .add_email_route(
            "info@carmarket.lv",
            7,
            RouteTarget::SimpleMaildir("info@carmarket.lv".to_string()),
        )
        .await
        .unwrap();
    router
        .add_catchall_route("carmarket.lv", "info@carmarket.lv", 7)
        .await
        .unwrap();

    // Exact entry wins over the catch-all, which wins over a bare domain.
    assert_eq!(
        router.test_route("info@carmarket.lv").await.unwrap(),
        Some("simple-maildir:info@carmarket.lv".to_string())
    );
    assert_eq!(
        router.test_route("anything@carmarket.lv").await.unwrap(),
        Some("info@carmarket.lv".to_string())
    );
    assert_eq!(router.test_route("x@other.lv").await.unwrap(), None);

    let routes = router.list_routes().await.unwrap();
    assert_eq!(routes.len(), 2);
    assert!(routes
        .iter()
        .any(|(key, target)| key == "@carmarket.lv" && target == "info@carmarket.lv"));

    assert!(router.remove_catchall_route("carmarket.lv").await.unwrap());
    assert_eq!(router.test_route("anything@carmarket.lv").await.unwrap(), None);
    env.cleanup();
}

#[tokio::test]
async fn reload_failure_keeps_the_map() {
    let env = build_env(false).await;
    env.mta_driver
        .fail_reload
        .store(true, std::sync::atomic::Ordering::Relaxed);

    env.server
        .core
        .router
        .add_email_route("cat@call.autoroad.lv", 42, RouteTarget::EncryptedPipe(42))
        .await
        .unwrap();

    // The write survives; the failed reload is reported through health.
    assert!(env.transport_map().contains("cat@call.autoroad.lv"));
    assert!(!env.server.core.router.last_reload_ok());

    env.mta_driver
        .fail_reload
        .store(false, std::sync::atomic::Ordering::Relaxed);
    env.server.core.router.reload().await.unwrap();
    env.cleanup();
}

#[tokio::test]
async fn operator_comments_survive_rewrites() {
    let env = build_env(false).await;
    std::fs::create_dir_all(env.server.core.router.map_path().parent().unwrap()).unwrap();
    std::fs::write(
        env.server.core.router.map_path(),
        "# hand-managed entries below\nlegacy.lv\tencimap-pipe:1\n",
    )
    .unwrap();

    env.server
        .core
        .router
        .add_email_route("cat@call.autoroad.lv", 42, RouteTarget::EncryptedPipe(42))
        .await
        .unwrap();

    let map = env.transport_map();
    assert!(map.starts_with("# hand-managed entries below\n"));
    assert!(map.contains("legacy.lv\tencimap-pipe:1"));
    assert!(map.contains("cat@call.autoroad.lv\tencimap-pipe:42"));
    env.cleanup();
}
