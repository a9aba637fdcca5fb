//! End-to-end: real server on a loopback port, real HTTP client.

use chunkstream::{
    client::{FileDescriptor, HttpTransport, RetryPolicy, UploadScheduler},
    config::AppConfig,
    models::upload::{ChunkEncoding, ChunkOutcome},
    routes::routes::routes,
    state::AppState,
};
use reqwest::{StatusCode, header};
use serde_json::Value;
use std::{net::SocketAddr, path::Path};
use tempfile::TempDir;
use tokio::net::TcpListener;

const MIB: usize = 1024 * 1024;

async fn spawn_server(storage: &Path, max_chunk_bytes: usize) -> String {
    let cfg = AppConfig {
        host: "127.0.0.1".into(),
        port: 0,
        storage_dir: storage.to_path_buf(),
        max_chunk_bytes,
        staging_ttl_secs: 0,
        sweep_interval_secs: 0,
    };
    let state = AppState::from_config(&cfg);
    state.prepare().await.unwrap();
    let app = routes().with_state(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });
    format!("http://{}", addr)
}

fn patterned(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// Upload `files` through the scheduler and return each final file name.
async fn upload_all(
    server: &str,
    encoding: ChunkEncoding,
    chunk_size: u64,
    files: &[&Path],
) -> Vec<(String, String)> {
    let transport =
        HttpTransport::new(reqwest::Client::new(), server).with_encoding(encoding);
    let mut scheduler =
        UploadScheduler::new(transport, chunk_size).with_retry_policy(RetryPolicy::none());
    for path in files {
        scheduler.enqueue([FileDescriptor::from_path(path).await.unwrap()]);
    }
    scheduler.run().await.unwrap();
    scheduler
        .entries()
        .iter()
        .map(|e| {
            (
                e.resource_id.clone().unwrap(),
                e.final_filename.clone().unwrap(),
            )
        })
        .collect()
}

#[tokio::test]
async fn twelve_mib_upload_plays_back_with_ranges() {
    let storage = TempDir::new().unwrap();
    let server = spawn_server(storage.path(), 10 * MIB).await;

    let source = TempDir::new().unwrap();
    let path = source.path().join("movie.mp4");
    let data = patterned(12 * MIB);
    std::fs::write(&path, &data).unwrap();

    let uploaded = upload_all(&server, ChunkEncoding::Raw, 5 * MIB as u64, &[path.as_path()]).await;
    let (resource_id, final_filename) = &uploaded[0];
    assert_eq!(final_filename, &format!("{}.mp4", resource_id));
    assert!(storage.path().join("uploads").join(final_filename).exists());

    let http = reqwest::Client::new();
    let url = format!("{}/video/{}", server, resource_id);

    let full = http.get(&url).send().await.unwrap();
    assert_eq!(full.status(), StatusCode::OK);
    assert_eq!(full.headers()[header::CONTENT_TYPE], "video/mp4");
    assert_eq!(full.headers()[header::ACCEPT_RANGES], "bytes");
    assert_eq!(
        full.headers()[header::CONTENT_LENGTH],
        (12 * MIB).to_string().as_str()
    );
    assert!(full.bytes().await.unwrap() == data);

    let first = http
        .get(&url)
        .header(header::RANGE, "bytes=0-0")
        .send()
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(
        first.headers()[header::CONTENT_RANGE],
        format!("bytes 0-0/{}", 12 * MIB).as_str()
    );
    assert_eq!(first.bytes().await.unwrap().as_ref(), &data[..1]);

    // Crosses the boundary between the first and second chunk.
    let start = 5 * MIB - 3;
    let end = 5 * MIB + 6;
    let middle = http
        .get(&url)
        .header(header::RANGE, format!("bytes={}-{}", start, end))
        .send()
        .await
        .unwrap();
    assert_eq!(middle.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(middle.headers()[header::CONTENT_LENGTH], "10");
    assert_eq!(middle.bytes().await.unwrap().as_ref(), &data[start..=end]);

    let open_ended = http
        .get(&url)
        .header(header::RANGE, format!("bytes={}-", 12 * MIB - 4))
        .send()
        .await
        .unwrap();
    assert_eq!(open_ended.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(open_ended.bytes().await.unwrap().as_ref(), &data[12 * MIB - 4..]);

    let past_end = http
        .get(&url)
        .header(header::RANGE, format!("bytes={}-{}", 12 * MIB, 12 * MIB))
        .send()
        .await
        .unwrap();
    assert_eq!(past_end.status(), StatusCode::RANGE_NOT_SATISFIABLE);
    assert_eq!(
        past_end.headers()[header::CONTENT_RANGE],
        format!("bytes */{}", 12 * MIB).as_str()
    );
    assert!(past_end.bytes().await.unwrap().is_empty());

    let by_name = http
        .get(format!("{}/uploads/{}", server, final_filename))
        .header(header::RANGE, "bytes=10-19")
        .send()
        .await
        .unwrap();
    assert_eq!(by_name.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(by_name.bytes().await.unwrap().as_ref(), &data[10..20]);

    let staging: Vec<_> = std::fs::read_dir(storage.path().join("staging"))
        .unwrap()
        .collect();
    assert!(staging.is_empty(), "staging artifact should be promoted");
}

#[tokio::test]
async fn queued_files_finalize_in_order_with_distinct_ids() {
    let storage = TempDir::new().unwrap();
    let server = spawn_server(storage.path(), MIB).await;

    let source = TempDir::new().unwrap();
    let a = source.path().join("a.mp4");
    let b = source.path().join("b.mp4");
    std::fs::write(&a, patterned(1000)).unwrap();
    std::fs::write(&b, b"second file").unwrap();

    let uploaded = upload_all(&server, ChunkEncoding::Raw, 64, &[a.as_path(), b.as_path()]).await;
    assert_ne!(uploaded[0].0, uploaded[1].0);

    let body = reqwest::get(format!("{}/video/{}", server, uploaded[1].0))
        .await
        .unwrap()
        .bytes()
        .await
        .unwrap();
    assert_eq!(body.as_ref(), b"second file");
}

#[tokio::test]
async fn base64_chunks_round_trip() {
    let storage = TempDir::new().unwrap();
    let server = spawn_server(storage.path(), MIB).await;

    let source = TempDir::new().unwrap();
    let path = source.path().join("clip.webm");
    let data = patterned(3000);
    std::fs::write(&path, &data).unwrap();

    let uploaded = upload_all(&server, ChunkEncoding::Base64, 1024, &[path.as_path()]).await;
    let (resource_id, final_filename) = &uploaded[0];
    assert!(final_filename.ends_with(".webm"));

    // No `.mp4` under this id, so the key lookup falls back to the stem.
    let response = reqwest::get(format!("{}/video/{}", server, resource_id))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "video/webm");
    assert!(response.bytes().await.unwrap() == data);
}

#[tokio::test]
async fn empty_file_finalizes_and_serves_empty_body() {
    let storage = TempDir::new().unwrap();
    let server = spawn_server(storage.path(), MIB).await;

    let source = TempDir::new().unwrap();
    let path = source.path().join("empty.txt");
    std::fs::write(&path, b"").unwrap();

    let uploaded = upload_all(&server, ChunkEncoding::Raw, 1024, &[path.as_path()]).await;
    let final_filename = &uploaded[0].1;
    assert!(final_filename.ends_with(".txt"));

    let response = reqwest::get(format!("{}/uploads/{}", server, final_filename))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/octet-stream"
    );
    assert!(response.bytes().await.unwrap().is_empty());
}

#[tokio::test]
async fn chunks_without_token_are_keyed_by_client_address() {
    let storage = TempDir::new().unwrap();
    let server = spawn_server(storage.path(), MIB).await;
    let http = reqwest::Client::new();

    let post = |index: u64, body: &'static [u8]| {
        http.post(format!("{}/upload", server))
            .query(&[
                ("name", "anon.mp4".to_string()),
                ("size", "6".to_string()),
                ("currentChunkIndex", index.to_string()),
                ("totalChunks", "2".to_string()),
            ])
            .body(body)
            .send()
    };

    let first: ChunkOutcome = post(0, b"abc").await.unwrap().json().await.unwrap();
    assert_eq!(first, ChunkOutcome::Continue);
    let last: ChunkOutcome = post(1, b"def").await.unwrap().json().await.unwrap();
    let ChunkOutcome::Finalized { resource_id, .. } = last else {
        panic!("expected finalized outcome");
    };

    let body = reqwest::get(format!("{}/video/{}", server, resource_id))
        .await
        .unwrap()
        .bytes()
        .await
        .unwrap();
    assert_eq!(body.as_ref(), b"abcdef");
}

#[tokio::test]
async fn duplicated_chunk_blocks_finalize() {
    let storage = TempDir::new().unwrap();
    let server = spawn_server(storage.path(), MIB).await;
    let http = reqwest::Client::new();

    let post = |index: u64| {
        http.post(format!("{}/upload", server))
            .query(&[
                ("name", "dup.mp4".to_string()),
                ("size", "8".to_string()),
                ("currentChunkIndex", index.to_string()),
                ("totalChunks", "2".to_string()),
                ("uploadId", "dup-token".to_string()),
            ])
            .body(&b"1234"[..])
            .send()
    };

    assert_eq!(post(0).await.unwrap().status(), StatusCode::OK);
    assert_eq!(post(0).await.unwrap().status(), StatusCode::OK);

    let last = post(1).await.unwrap();
    assert_eq!(last.status(), StatusCode::CONFLICT);
    let body: Value = last.json().await.unwrap();
    assert_eq!(body["status"], 409);

    let public: Vec<_> = std::fs::read_dir(storage.path().join("uploads"))
        .unwrap()
        .collect();
    assert!(public.is_empty());
}

#[tokio::test]
async fn malformed_requests_are_rejected() {
    let storage = TempDir::new().unwrap();
    let server = spawn_server(storage.path(), 16).await;
    let http = reqwest::Client::new();

    let missing = http
        .post(format!("{}/upload?name=a.mp4", server))
        .body("x")
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::BAD_REQUEST);
    let body: Value = missing.json().await.unwrap();
    assert_eq!(body["error"], "Missing required query parameters");

    let too_big = http
        .post(format!(
            "{}/upload?name=a.mp4&currentChunkIndex=0&totalChunks=1",
            server
        ))
        .body(vec![0u8; 64])
        .send()
        .await
        .unwrap();
    assert_eq!(too_big.status(), StatusCode::PAYLOAD_TOO_LARGE);

    let traversal = http
        .post(format!(
            "{}/upload?name=..%2Fescape.mp4&currentChunkIndex=0&totalChunks=1",
            server
        ))
        .body("x")
        .send()
        .await
        .unwrap();
    assert_eq!(traversal.status(), StatusCode::BAD_REQUEST);

    let out_of_range = http
        .post(format!(
            "{}/upload?name=a.mp4&currentChunkIndex=3&totalChunks=2",
            server
        ))
        .body("x")
        .send()
        .await
        .unwrap();
    assert_eq!(out_of_range.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn malformed_query_values_get_json_errors() {
    let storage = TempDir::new().unwrap();
    let server = spawn_server(storage.path(), MIB).await;
    let http = reqwest::Client::new();

    let post = |query: &'static str| {
        http.post(format!("{}/upload?{}", server, query))
            .body("x")
            .send()
    };

    let cases = [
        (
            "name=a.mp4&currentChunkIndex=abc&totalChunks=1",
            "Invalid value `abc` for `currentChunkIndex`",
        ),
        (
            "name=a.mp4&currentChunkIndex=&totalChunks=1",
            "Missing required query parameters",
        ),
        (
            "name=a.mp4&currentChunkIndex=0&totalChunks=1&encoding=hex",
            "Unsupported encoding `hex`",
        ),
    ];
    for (query, message) in cases {
        let response = post(query).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{query}");
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/json",
            "{query}"
        );
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["error"], message, "{query}");
        assert_eq!(body["status"], 400);
    }

    assert_eq!(std::fs::read_dir(storage.path().join("staging")).unwrap().count(), 0);
}

#[tokio::test]
async fn unknown_resources_are_not_found() {
    let storage = TempDir::new().unwrap();
    let server = spawn_server(storage.path(), MIB).await;

    let missing = reqwest::get(format!("{}/video/does-not-exist", server))
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    let body: Value = missing.json().await.unwrap();
    assert_eq!(body["error"], "Video not found");

    let missing = reqwest::get(format!("{}/uploads/nothing.mp4", server))
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn probes_report_ok() {
    let storage = TempDir::new().unwrap();
    let server = spawn_server(storage.path(), MIB).await;

    let health = reqwest::get(format!("{}/healthz", server)).await.unwrap();
    assert_eq!(health.status(), StatusCode::OK);
    let body: Value = health.json().await.unwrap();
    assert_eq!(body["status"], "ok");

    let ready = reqwest::get(format!("{}/readyz", server)).await.unwrap();
    assert_eq!(ready.status(), StatusCode::OK);
}
