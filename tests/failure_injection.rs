//! Failure injection tests for the forwarding proxy.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use reqwest::StatusCode;
use serde_json::Value;
use shinra_proxy::config::ProxyConfig;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;

mod common;

use common::MockResponse;

fn addr(port: u16) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], port))
}

#[tokio::test]
async fn test_slow_upstream_times_out_with_504() {
    let backend = common::start_mock_backend(
        addr(28401),
        MockResponse::new(200, "video/mp2t", vec![7u8; 64]).delayed(Duration::from_secs(5)),
    )
    .await;
    let proxy = addr(28402);
    let mut config = ProxyConfig::default();
    config.upstream.timeout_secs = 1;
    let shutdown = common::start_proxy(proxy, config, false).await;

    let started = Instant::now();
    let res = common::client()
        .get(format!("http://{proxy}/proxy?url=http://{backend}/slow.ts"))
        .send()
        .await
        .expect("Proxy unreachable");

    assert_eq!(res.status(), StatusCode::GATEWAY_TIMEOUT);
    assert!(started.elapsed() < Duration::from_secs(4), "timeout not enforced");
    assert_eq!(res.headers()["content-type"], "application/json");
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"]["code"], 504);
    assert_eq!(body["error"]["path"], "/proxy");
    assert_eq!(body["success"], false);

    shutdown.trigger();
}

#[tokio::test]
async fn test_unreachable_upstream_returns_502() {
    let dead = common::closed_port().await;
    let proxy = addr(28411);
    let shutdown = common::start_proxy(proxy, ProxyConfig::default(), false).await;

    let res = common::client()
        .get(format!("http://{proxy}/proxy/http://{dead}/segment.ts"))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"]["code"], 502);

    shutdown.trigger();
}

#[tokio::test]
async fn test_private_targets_refused_by_default() {
    let backend = common::start_mock_backend(
        addr(28421),
        MockResponse::new(200, "text/plain", "internal secret"),
    )
    .await;
    let proxy = addr(28422);
    let shutdown = common::start_proxy(proxy, ProxyConfig::default(), true).await;
    let client = common::client();

    for target in [
        format!("http://{backend}/admin"),
        "http://localhost:28421/admin".to_string(),
        "http://169.254.169.254/latest/meta-data/".to_string(),
    ] {
        let res = client
            .get(format!("http://{proxy}/proxy?url={target}"))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST, "{target}");
        let body = res.text().await.unwrap();
        assert!(!body.contains("internal secret"));
    }

    shutdown.trigger();
}

#[tokio::test]
async fn test_oversized_request_body_is_rejected() {
    let backend =
        common::start_mock_backend(addr(28431), MockResponse::new(200, "text/plain", "ok")).await;
    let proxy = addr(28432);
    let mut config = ProxyConfig::default();
    config.limits.max_body_bytes = 16;
    let shutdown = common::start_proxy(proxy, config, false).await;
    let client = common::client();

    let res = client
        .post(format!("http://{proxy}/proxy?url=http://{backend}/upload"))
        .body(vec![b'x'; 64])
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);

    let res = client
        .post(format!("http://{proxy}/proxy?url=http://{backend}/upload"))
        .body(vec![b'x'; 8])
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.text().await.unwrap(), "ok");

    shutdown.trigger();
}

#[tokio::test]
async fn test_oversized_playlist_streams_unmodified() {
    let mut playlist = String::from("#EXTM3U\n");
    for i in 0..200 {
        playlist.push_str(&format!("#EXTINF:4,\nsegment-{i}.ts\n"));
    }
    let backend = common::start_mock_backend(
        addr(28441),
        MockResponse::new(200, "application/x-mpegURL", playlist.clone()),
    )
    .await;
    let proxy = addr(28442);
    let mut config = ProxyConfig::default();
    config.limits.max_playlist_bytes = 256;
    let shutdown = common::start_proxy(proxy, config, false).await;

    let res = common::client()
        .get(format!("http://{proxy}/proxy?url=http://{backend}/big.m3u8"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.text().await.unwrap(), playlist);

    shutdown.trigger();
}

#[tokio::test]
async fn test_request_deadline_answers_with_504_envelope() {
    let backend = common::start_mock_backend(
        addr(28451),
        MockResponse::new(200, "video/mp2t", vec![7u8; 64]).delayed(Duration::from_secs(3)),
    )
    .await;
    let proxy = addr(28452);
    let mut config = ProxyConfig::default();
    config.limits.request_timeout_secs = 1;
    config.upstream.timeout_secs = 5;
    let shutdown = common::start_proxy(proxy, config, false).await;

    let res = common::client()
        .get(format!("http://{proxy}/proxy?url=http://{backend}/slow.ts"))
        .header("Origin", "https://player.example.org")
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(res.headers()["content-type"], "application/json");
    assert_eq!(res.headers()["access-control-allow-origin"], "*");
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"]["code"], 504);
    assert_eq!(body["error"]["path"], "/proxy");
    assert_eq!(body["success"], false);

    shutdown.trigger();
}

#[tokio::test]
async fn test_stalled_upstream_body_is_cut_off() {
    let backend = common::start_raw_backend(addr(28461), |mut socket| async move {
        if common::read_head(&mut socket).await.is_some() {
            let _ = socket
                .write_all(
                    b"HTTP/1.1 200 OK\r\nContent-Type: video/mp2t\r\nContent-Length: 1000\r\n\r\nabcd",
                )
                .await;
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
    })
    .await;
    let proxy = addr(28462);
    let mut config = ProxyConfig::default();
    config.upstream.timeout_secs = 1;
    let shutdown = common::start_proxy(proxy, config, false).await;

    let res = common::client()
        .get(format!("http://{proxy}/proxy?url=http://{backend}/stall.ts"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let body = tokio::time::timeout(Duration::from_secs(6), res.bytes())
        .await
        .expect("stalled body was never cut off");
    assert!(body.is_err(), "truncated body must not look complete");

    shutdown.trigger();
}

#[tokio::test]
async fn test_client_disconnect_aborts_upstream_fetch() {
    let (events, mut seen) = mpsc::unbounded_channel::<&'static str>();
    let backend = common::start_raw_backend(addr(28471), move |mut socket| {
        let events = events.clone();
        async move {
            if common::read_head(&mut socket).await.is_none() {
                return;
            }
            let _ = events.send("request");
            // Never answer; report when the proxy hangs up.
            let mut buf = [0u8; 64];
            loop {
                match socket.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(_) => continue,
                }
            }
            let _ = events.send("closed");
        }
    })
    .await;
    let proxy = addr(28472);
    let shutdown = common::start_proxy(proxy, ProxyConfig::default(), false).await;

    let request = tokio::spawn(
        common::client()
            .get(format!("http://{proxy}/proxy?url=http://{backend}/live.m3u8"))
            .send(),
    );
    let first = tokio::time::timeout(Duration::from_secs(5), seen.recv())
        .await
        .expect("upstream never saw the request");
    assert_eq!(first, Some("request"));

    request.abort();
    let _ = request.await;

    let next = tokio::time::timeout(Duration::from_secs(3), seen.recv())
        .await
        .expect("upstream fetch outlived the caller");
    assert_eq!(next, Some("closed"));

    shutdown.trigger();
}
