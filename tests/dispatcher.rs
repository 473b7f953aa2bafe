mod support;

use std::{io::Read, sync::Arc};

use axum::{
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use flate2::read::GzDecoder;
use frontgate::{
    application::{
        pages::CACHE_STATUS_HEADER,
        render::{RenderError, RenderOutput},
    },
    cache::{ManualClock, PageKey},
    domain::device::DeviceClass,
    infra::http::build_router,
};
use tower::ServiceExt;

use support::{MemorySettings, StubEngine, body_bytes, get, harness, harness_with_clock};

const IPHONE: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 Mobile/15E148";

#[tokio::test]
async fn first_request_renders_once_and_caches_every_encoding() {
    let harness = harness(StubEngine::echo()).await;
    let router = build_router(harness.state.clone());

    let response = router
        .clone()
        .oneshot(
            get("/")
                .header(header::ACCEPT_ENCODING, "gzip")
                .body(Body::empty())
                .expect("request should build"),
        )
        .await
        .expect("router should respond");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_ENCODING], "gzip");
    assert_eq!(response.headers()[CACHE_STATUS_HEADER], "MISS");
    assert_eq!(response.headers()[header::CACHE_CONTROL], "public, max-age=900");
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/html; charset=utf-8"
    );

    let compressed = body_bytes(response).await;
    let mut html = String::new();
    GzDecoder::new(compressed.as_ref())
        .read_to_string(&mut html)
        .expect("body should be gzip");
    assert!(html.contains(r#"<div id="app"><main>/</main></div>"#));
    assert!(html.contains("<title>Stub</title>"));

    assert_eq!(harness.engine.calls(), 1);
    assert_eq!(harness.engine.seen()[0].theme, "theme-default");

    let entry = harness
        .state
        .pages
        .cache()
        .lookup(&PageKey::new("/", DeviceClass::Desktop))
        .expect("page should be cached under /:desktop");
    assert!(entry.variants.gzip.is_some());
    assert!(entry.variants.brotli.is_some());
    assert_eq!(entry.document().as_ref(), html.as_bytes());

    let again = router
        .oneshot(
            get("/")
                .header(header::ACCEPT_ENCODING, "br, gzip")
                .body(Body::empty())
                .expect("request should build"),
        )
        .await
        .expect("router should respond");
    assert_eq!(again.status(), StatusCode::OK);
    assert_eq!(again.headers()[CACHE_STATUS_HEADER], "HIT");
    assert_eq!(again.headers()[header::CONTENT_ENCODING], "br");
    assert_eq!(harness.engine.calls(), 1);
}

#[tokio::test]
async fn identity_is_served_without_accept_encoding() {
    let harness = harness(StubEngine::echo()).await;
    let router = build_router(harness.state.clone());

    let response = router
        .oneshot(get("/about").body(Body::empty()).expect("request should build"))
        .await
        .expect("router should respond");

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get(header::CONTENT_ENCODING).is_none());
    let html = body_bytes(response).await;
    let html = std::str::from_utf8(&html).expect("utf-8 body");
    assert!(html.contains("<main>/about</main>"));
    assert!(html.contains(r#"{"route":"/about"}"#));
}

#[tokio::test]
async fn device_classes_are_cached_separately() {
    let harness = harness(StubEngine::echo()).await;
    let router = build_router(harness.state.clone());

    for agent in [IPHONE, "Mozilla/5.0 (X11; Linux x86_64) Firefox/131.0", IPHONE] {
        let response = router
            .clone()
            .oneshot(
                get("/posts/hello")
                    .header(header::USER_AGENT, agent)
                    .body(Body::empty())
                    .expect("request should build"),
            )
            .await
            .expect("router should respond");
        assert_eq!(response.status(), StatusCode::OK);
    }

    assert_eq!(harness.engine.calls(), 2);
    let cache = harness.state.pages.cache();
    assert_eq!(cache.len(), 2);
    assert!(
        cache
            .lookup(&PageKey::new("/posts/hello", DeviceClass::Mobile))
            .is_some()
    );
    assert!(
        cache
            .lookup(&PageKey::new("/posts/hello", DeviceClass::Desktop))
            .is_some()
    );
}

#[tokio::test]
async fn query_strings_are_part_of_the_cache_key() {
    let harness = harness(StubEngine::echo()).await;
    let router = build_router(harness.state.clone());

    for uri in ["/search?q=rust", "/search?q=axum", "/search?q=rust"] {
        let response = router
            .clone()
            .oneshot(get(uri).body(Body::empty()).expect("request should build"))
            .await
            .expect("router should respond");
        assert_eq!(response.status(), StatusCode::OK);
    }

    assert_eq!(harness.engine.calls(), 2);
    assert_eq!(harness.engine.seen()[0].route, "/search?q=rust");
}

#[tokio::test]
async fn static_assets_carry_etag_and_answer_conditional_requests() {
    let harness = harness(StubEngine::echo()).await;
    let router = build_router(harness.state.clone());

    let response = router
        .clone()
        .oneshot(
            get("/assets/app.js")
                .body(Body::empty())
                .expect("request should build"),
        )
        .await
        .expect("router should respond");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CACHE_CONTROL],
        "public, max-age=31536000, immutable"
    );
    let etag = response.headers()[header::ETAG]
        .to_str()
        .expect("etag is ascii")
        .to_string();
    assert!(etag.starts_with('"') && etag.ends_with('"'));
    assert!(
        response.headers()[header::CONTENT_TYPE]
            .to_str()
            .expect("content type is ascii")
            .contains("javascript")
    );

    let conditional = router
        .oneshot(
            get("/assets/app.js")
                .header(header::IF_NONE_MATCH, etag.as_str())
                .body(Body::empty())
                .expect("request should build"),
        )
        .await
        .expect("router should respond");
    assert_eq!(conditional.status(), StatusCode::NOT_MODIFIED);
    assert_eq!(conditional.headers()[header::ETAG], etag.as_str());
    assert!(body_bytes(conditional).await.is_empty());
    assert_eq!(harness.engine.calls(), 0);
}

#[tokio::test]
async fn build_output_files_use_the_static_cache_policy() {
    let harness = harness(StubEngine::echo()).await;
    let router = build_router(harness.state.clone());

    let response = router
        .oneshot(get("/robots.txt").body(Body::empty()).expect("request should build"))
        .await
        .expect("router should respond");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CACHE_CONTROL], "public, max-age=86400");
    assert_eq!(body_bytes(response).await.as_ref(), b"User-agent: *\n");
}

#[tokio::test]
async fn theme_files_are_served_from_the_themes_directory() {
    let harness = harness(StubEngine::echo()).await;
    let router = build_router(harness.state.clone());

    let response = router
        .oneshot(
            get("/themes/theme-dark/preview.png")
                .body(Body::empty())
                .expect("request should build"),
        )
        .await
        .expect("router should respond");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
}

#[tokio::test]
async fn missing_static_files_fall_through_to_the_renderer() {
    let harness = harness(StubEngine::echo()).await;
    let router = build_router(harness.state.clone());

    let response = router
        .oneshot(
            get("/assets/missing.js")
                .body(Body::empty())
                .expect("request should build"),
        )
        .await
        .expect("router should respond");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(harness.engine.calls(), 1);
}

#[tokio::test]
async fn traversal_attempts_never_leave_the_static_roots() {
    let harness = harness(StubEngine::echo()).await;
    let router = build_router(harness.state.clone());

    let response = router
        .oneshot(
            get("/assets/../index.html")
                .body(Body::empty())
                .expect("request should build"),
        )
        .await
        .expect("router should respond");

    let body = body_bytes(response).await;
    let body = std::str::from_utf8(&body).expect("utf-8 body");
    assert!(body.contains("<main>/assets/../index.html</main>"));
}

#[tokio::test]
async fn percent_encoded_asset_names_are_decoded() {
    let harness = harness(StubEngine::echo()).await;
    let router = build_router(harness.state.clone());

    let response = router
        .oneshot(
            get("/assets/my%20file.css")
                .body(Body::empty())
                .expect("request should build"),
        )
        .await
        .expect("router should respond");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "text/css");
    assert_eq!(body_bytes(response).await.as_ref(), b"body { margin: 0 }\n");
    assert_eq!(harness.engine.calls(), 0);
}

#[tokio::test]
async fn encoded_traversal_is_rejected_after_decoding() {
    let harness = harness(StubEngine::echo()).await;
    let router = build_router(harness.state.clone());

    for uri in ["/assets/%2e%2e/index.html", "/assets/..%2findex.html"] {
        let response = router
            .clone()
            .oneshot(get(uri).body(Body::empty()).expect("request should build"))
            .await
            .expect("router should respond");

        assert!(response.headers().get(header::ETAG).is_none(), "{uri}");
        let body = body_bytes(response).await;
        let body = std::str::from_utf8(&body).expect("utf-8 body");
        assert!(body.contains(&format!("<main>{uri}</main>")), "{uri}");
    }
    assert_eq!(harness.engine.calls(), 2);
    assert!(harness.state.static_files.is_empty());
}

#[tokio::test]
async fn theme_manifests_are_not_served_as_files() {
    let harness = harness(StubEngine::echo()).await;
    let router = build_router(harness.state.clone());

    let response = router
        .oneshot(
            get("/themes/theme-dark/theme.toml")
                .body(Body::empty())
                .expect("request should build"),
        )
        .await
        .expect("router should respond");

    assert!(response.headers().get(header::ETAG).is_none());
    let body = body_bytes(response).await;
    let body = std::str::from_utf8(&body).expect("utf-8 body");
    assert!(!body.contains("version = \"1.0.0\""));
    assert!(body.contains("<main>/themes/theme-dark/theme.toml</main>"));
    assert_eq!(harness.engine.calls(), 1);
}

#[tokio::test]
async fn expired_pages_are_swept_and_rendered_again() {
    let clock = Arc::new(ManualClock::default());
    let harness = harness_with_clock(
        StubEngine::echo(),
        MemorySettings::with_theme("theme-default"),
        clock.clone(),
        |settings| settings.cache.page_ttl = std::time::Duration::from_secs(60),
    )
    .await;
    let router = build_router(harness.state.clone());
    let cache = harness.state.pages.cache();

    let first = router
        .clone()
        .oneshot(get("/a").body(Body::empty()).expect("request should build"))
        .await
        .expect("router should respond");
    assert_eq!(first.headers()[CACHE_STATUS_HEADER], "MISS");
    assert_eq!(cache.len(), 1);

    clock.advance(time::Duration::seconds(61));

    let other = router
        .clone()
        .oneshot(get("/b").body(Body::empty()).expect("request should build"))
        .await
        .expect("router should respond");
    assert_eq!(other.headers()[CACHE_STATUS_HEADER], "MISS");
    assert_eq!(cache.len(), 1, "stale /a entry should be removed");
    assert!(
        cache
            .lookup(&PageKey::new("/b", DeviceClass::Desktop))
            .is_some()
    );

    let again = router
        .oneshot(get("/a").body(Body::empty()).expect("request should build"))
        .await
        .expect("router should respond");
    assert_eq!(again.headers()[CACHE_STATUS_HEADER], "MISS");
    assert_eq!(harness.engine.calls(), 3);
    assert_eq!(cache.len(), 2);
}

#[tokio::test]
async fn renderer_redirects_become_permanent_and_are_not_cached() {
    let engine = StubEngine::new(|_| {
        Ok(RenderOutput {
            redirect: Some("/new-home".to_string()),
            ..RenderOutput::default()
        })
    });
    let harness = harness(engine).await;
    let router = build_router(harness.state.clone());

    let response = router
        .oneshot(get("/old-home").body(Body::empty()).expect("request should build"))
        .await
        .expect("router should respond");

    assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
    assert_eq!(response.headers()[header::LOCATION], "/new-home");
    assert!(harness.state.pages.cache().is_empty());
}

#[tokio::test]
async fn empty_redirects_render_the_page() {
    let engine = StubEngine::new(|request| {
        Ok(RenderOutput {
            markup: format!("<main>{}</main>", request.route),
            redirect: Some(String::new()),
            ..RenderOutput::default()
        })
    });
    let harness = harness(engine).await;
    let router = build_router(harness.state.clone());

    let response = router
        .oneshot(get("/home").body(Body::empty()).expect("request should build"))
        .await
        .expect("router should respond");

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get(header::LOCATION).is_none());
    let body = body_bytes(response).await;
    assert!(
        std::str::from_utf8(&body)
            .expect("utf-8 body")
            .contains("<main>/home</main>")
    );
    assert_eq!(harness.state.pages.cache().len(), 1);
}

#[tokio::test]
async fn render_failures_surface_as_server_errors_with_the_message() {
    let engine = StubEngine::new(|_| Err(RenderError::engine("component exploded")));
    let harness = harness(engine).await;
    let router = build_router(harness.state.clone());

    let response = router
        .oneshot(get("/broken").body(Body::empty()).expect("request should build"))
        .await
        .expect("router should respond");

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_bytes(response).await;
    assert!(
        std::str::from_utf8(&body)
            .expect("utf-8 body")
            .contains("component exploded")
    );
    assert!(harness.state.pages.cache().is_empty());
}

#[tokio::test]
async fn non_get_methods_are_rejected_on_the_render_path() {
    let harness = harness(StubEngine::echo()).await;
    let router = build_router(harness.state.clone());

    let response = router
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/contact")
                .body(Body::empty())
                .expect("request should build"),
        )
        .await
        .expect("router should respond");

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(harness.engine.calls(), 0);
}

#[tokio::test]
async fn responses_echo_the_request_id() {
    let harness = harness(StubEngine::echo()).await;
    let router = build_router(harness.state.clone());

    let response = router
        .oneshot(
            get("/")
                .header("x-request-id", "req-42")
                .body(Body::empty())
                .expect("request should build"),
        )
        .await
        .expect("router should respond");

    assert_eq!(response.headers()["x-request-id"], "req-42");
}
