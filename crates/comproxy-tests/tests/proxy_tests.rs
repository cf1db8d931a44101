//! End-to-end proxy tests against a mock upstream.
//!
//! Run with: `cargo test -p comproxy-tests --test proxy_tests`

use comproxy_core::{CacheController, CacheControllers};
use comproxy_tests::{ComposerFixture, TestContext, x_cache};
use reqwest::StatusCode;
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, ResponseTemplate};

async fn mount_json(ctx: &TestContext, at: &str, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(at))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(&ctx.upstream)
        .await;
}

async fn mount_widget(ctx: &TestContext, versions: &[&str]) {
    let provider = ComposerFixture::provider("acme", "widget", versions, &ctx.upstream_url());
    mount_json(ctx, "/p/acme/widget.json", provider).await;
    for version in versions {
        Mock::given(method("GET"))
            .and(path(ComposerFixture::dist_path("acme", "widget", version)))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/octet-stream")
                    .set_body_bytes(ComposerFixture::archive("acme", "widget", version)),
            )
            .mount(&ctx.upstream)
            .await;
    }
}

fn always_stale(stale_on_error: bool) -> CacheControllers {
    let controller = CacheController::from_minutes(0).unwrap().with_stale_on_error(stale_on_error);
    CacheControllers::new(controller, controller)
}

#[tokio::test]
async fn test_health_endpoint() {
    let ctx = TestContext::new().await.expect("Failed to create test context");
    assert!(ctx.client.health().await.unwrap());
    assert_eq!(ctx.client.get("/ready").await.unwrap().status(), StatusCode::OK);
}

#[tokio::test]
async fn test_package_list_is_cached() {
    let ctx = TestContext::new().await.expect("Failed to create test context");
    mount_json(&ctx, "/packages/list.json", ComposerFixture::package_list(&["acme/widget"])).await;

    let (first_cache, first) = ctx.client.get_json("/packages/list.json").await.unwrap();
    let (second_cache, second) = ctx.client.get_json("/packages/list.json").await.unwrap();

    assert_eq!(first_cache, "MISS");
    assert_eq!(second_cache, "HIT");
    assert_eq!(first, second);
    assert_eq!(ctx.upstream_hits("/packages/list.json").await, 1);
}

#[tokio::test]
async fn test_package_index_is_synthesized() {
    let ctx = TestContext::new().await.expect("Failed to create test context");
    mount_json(
        &ctx,
        "/packages/list.json",
        ComposerFixture::package_list(&["acme/widget", "acme/gadget"]),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/packages.json"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .expect(0)
        .mount(&ctx.upstream)
        .await;

    let (_, index) = ctx.client.get_json("/packages.json").await.unwrap();

    assert_eq!(
        index["providers-url"],
        format!("{}/p/%package%.json", ctx.client.base_url())
    );
    assert!(index["providers"]["acme/widget"].is_object());
    assert!(index["providers"]["acme/gadget"].is_object());
    assert_eq!(ctx.upstream_hits("/packages/list.json").await, 1);
}

#[tokio::test]
async fn test_provider_rewrite_and_archive_download() {
    let ctx = TestContext::new().await.expect("Failed to create test context");
    mount_widget(&ctx, &["1.0.0", "1.1.0"]).await;

    let (_, provider) = ctx.client.get_json("/p/acme/widget.json").await.unwrap();
    let dist_url = provider["packages"]["acme/widget"]["1.1.0"]["dist"]["url"]
        .as_str()
        .unwrap()
        .to_string();
    assert_eq!(
        dist_url,
        ctx.client.url(&ComposerFixture::archive_path("acme", "widget", "1.1.0"))
    );
    assert_eq!(provider["packages"]["acme/widget"]["1.1.0"]["dist"]["type"], "zip");
    assert_eq!(provider["packages"]["acme/widget"]["1.1.0"]["dist"]["reference"], "ref-1.1.0");

    let archive = ctx.client.get_url(&dist_url).await.unwrap();
    assert_eq!(archive.status(), StatusCode::OK);
    assert_eq!(archive.headers()["content-type"], "application/zip");
    assert_eq!(x_cache(&archive), "MISS");
    assert_eq!(
        archive.bytes().await.unwrap().as_ref(),
        ComposerFixture::archive("acme", "widget", "1.1.0").as_slice()
    );

    // The provider document was already cached by the client read.
    assert_eq!(ctx.upstream_hits("/p/acme/widget.json").await, 1);
}

#[tokio::test]
async fn test_concurrent_archive_requests_fetch_once() {
    let ctx = TestContext::new().await.expect("Failed to create test context");
    let provider = ComposerFixture::provider("acme", "widget", &["1.0.0"], &ctx.upstream_url());
    Mock::given(method("GET"))
        .and(path("/p/acme/widget.json"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(provider)
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&ctx.upstream)
        .await;
    Mock::given(method("GET"))
        .and(path(ComposerFixture::dist_path("acme", "widget", "1.0.0")))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(ComposerFixture::archive("acme", "widget", "1.0.0"))
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&ctx.upstream)
        .await;

    let archive = ComposerFixture::archive_path("acme", "widget", "1.0.0");
    let (first, second) = tokio::join!(ctx.client.get(&archive), ctx.client.get(&archive));
    let first = first.unwrap();
    let second = second.unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(first.bytes().await.unwrap(), second.bytes().await.unwrap());

    let stats = ctx.client.stats().await.unwrap();
    assert_eq!(stats["proxy"]["joined_fetches"], 1);
}

#[tokio::test]
async fn test_missing_version_is_not_found() {
    let ctx = TestContext::new().await.expect("Failed to create test context");
    mount_widget(&ctx, &["1.0.0"]).await;

    let resp = ctx
        .client
        .get(&ComposerFixture::archive_path("acme", "widget", "9.9.9"))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert!(resp.text().await.unwrap().contains("9.9.9"));
    assert_eq!(
        ctx.upstream_hits(&ComposerFixture::dist_path("acme", "widget", "9.9.9")).await,
        0
    );
}

#[tokio::test]
async fn test_provider_failure_is_bad_gateway_for_archive() {
    let ctx = TestContext::new().await.expect("Failed to create test context");
    Mock::given(method("GET"))
        .and(path("/p/acme/widget.json"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&ctx.upstream)
        .await;

    let resp = ctx
        .client
        .get(&ComposerFixture::archive_path("acme", "widget", "1.0.0"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_upstream_not_found_passes_through() {
    let ctx = TestContext::new().await.expect("Failed to create test context");
    let resp = ctx.client.get("/p/acme/unknown.json").await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_malformed_provider_is_bad_gateway() {
    let ctx = TestContext::new().await.expect("Failed to create test context");
    Mock::given(method("GET"))
        .and(path("/p/acme/widget.json"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&ctx.upstream)
        .await;

    let resp = ctx
        .client
        .get(&ComposerFixture::archive_path("acme", "widget", "1.0.0"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_unknown_paths_and_methods() {
    let ctx = TestContext::new().await.expect("Failed to create test context");
    assert_eq!(ctx.client.get("/index.html").await.unwrap().status(), StatusCode::NOT_FOUND);
    assert_eq!(ctx.client.get("/p2/acme/widget.json").await.unwrap().status(), StatusCode::NOT_FOUND);
    assert_eq!(
        ctx.client.post("/packages.json").await.unwrap().status(),
        StatusCode::METHOD_NOT_ALLOWED
    );
    assert_eq!(ctx.upstream_hits("/index.html").await, 0);
}

#[tokio::test]
async fn test_stale_copy_revalidated_with_etag() {
    let ctx = TestContext::builder()
        .controllers(always_stale(false))
        .start()
        .await
        .expect("Failed to create test context");

    Mock::given(method("GET"))
        .and(path("/packages/list.json"))
        .and(header("if-none-match", "\"list-v1\""))
        .respond_with(ResponseTemplate::new(304))
        .expect(1)
        .mount(&ctx.upstream)
        .await;
    Mock::given(method("GET"))
        .and(path("/packages/list.json"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("etag", "\"list-v1\"")
                .set_body_json(ComposerFixture::package_list(&["acme/widget"])),
        )
        .expect(1)
        .mount(&ctx.upstream)
        .await;

    let (first_cache, first) = ctx.client.get_json("/packages/list.json").await.unwrap();
    let (second_cache, second) = ctx.client.get_json("/packages/list.json").await.unwrap();

    assert_eq!(first_cache, "MISS");
    assert_eq!(second_cache, "REVALIDATED");
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_stale_on_error_serves_cached_copy() {
    let ctx = TestContext::builder()
        .controllers(always_stale(true))
        .start()
        .await
        .expect("Failed to create test context");
    mount_json(&ctx, "/packages/list.json", ComposerFixture::package_list(&["acme/widget"])).await;

    let (_, first) = ctx.client.get_json("/packages/list.json").await.unwrap();

    ctx.upstream.reset().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&ctx.upstream)
        .await;

    let (cache, second) = ctx.client.get_json("/packages/list.json").await.unwrap();
    assert_eq!(cache, "STALE");
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_upstream_error_without_stale_on_error() {
    let ctx = TestContext::builder()
        .controllers(always_stale(false))
        .start()
        .await
        .expect("Failed to create test context");
    mount_json(&ctx, "/packages/list.json", ComposerFixture::package_list(&["acme/widget"])).await;
    ctx.client.get_json("/packages/list.json").await.unwrap();

    ctx.upstream.reset().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&ctx.upstream)
        .await;

    let resp = ctx.client.get("/packages/list.json").await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_request_deadline() {
    let ctx = TestContext::builder()
        .request_timeout(Duration::from_millis(100))
        .start()
        .await
        .expect("Failed to create test context");
    Mock::given(method("GET"))
        .and(path("/packages/list.json"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(ComposerFixture::package_list(&[]))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&ctx.upstream)
        .await;

    let resp = ctx.client.get("/packages.json").await.unwrap();
    assert_eq!(resp.status(), StatusCode::GATEWAY_TIMEOUT);
}

#[tokio::test]
async fn test_filesystem_store_survives_restart() {
    let dir = tempfile::tempdir().unwrap();

    let first = TestContext::builder()
        .filesystem(dir.path())
        .start()
        .await
        .expect("Failed to create test context");
    mount_json(&first, "/packages/list.json", ComposerFixture::package_list(&["acme/widget"])).await;
    let (_, original) = first.client.get_json("/packages/list.json").await.unwrap();
    drop(first);

    let second = TestContext::builder()
        .filesystem(dir.path())
        .start()
        .await
        .expect("Failed to create test context");
    let (cache, cached) = second.client.get_json("/packages/list.json").await.unwrap();

    assert_eq!(cache, "HIT");
    assert_eq!(cached, original);
    assert_eq!(second.upstream_hits("/packages/list.json").await, 0);

    let stats = second.client.stats().await.unwrap();
    assert_eq!(stats["store"]["entries"], 1);
}
