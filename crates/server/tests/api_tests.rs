//! Integration tests for the HTTP API.

mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use common::{multipart_body, test_ip, TestServer};
use serde_json::Value;
use std::time::Duration;
use tower::ServiceExt;
use uuid::Uuid;

async fn send(
    router: &axum::Router,
    request: Request<Body>,
) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec();
    (status, headers, body)
}

async fn get(router: &axum::Router, uri: &str, ip: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .header("x-real-ip", ip)
        .body(Body::empty())
        .unwrap();
    let (status, _, body) = send(router, request).await;
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

async fn post_job(
    server: &TestServer,
    ip: &str,
    fields: &[(&str, &str)],
    file: Option<(&str, &[u8])>,
) -> (StatusCode, Value) {
    let (content_type, body) = multipart_body(fields, file);
    let request = Request::builder()
        .method("POST")
        .uri("/api/jobs")
        .header("x-real-ip", ip)
        .header(header::CONTENT_TYPE, content_type)
        .body(Body::from(body))
        .unwrap();
    let (status, _, body) = send(&server.router, request).await;
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

/// Insert a job row directly, as if intake had accepted it.
async fn seed_job(server: &TestServer) -> fileforge_metadata::JobRow {
    let session = server
        .state
        .metadata
        .touch_session(&test_ip(), 1_000_000)
        .await
        .unwrap();
    server
        .state
        .metadata
        .create_job(
            session.session_id,
            "image_convert",
            "photo.png",
            128,
            r#"{"output_format":"jpeg"}"#,
            24,
        )
        .await
        .unwrap()
}

#[tokio::test]
async fn health_reports_ok() {
    let Some(server) = TestServer::new_or_skip().await else {
        return;
    };
    let (status, json) = get(&server.router, "/api/health", &test_ip()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["service"], "api");
}

#[tokio::test]
async fn formats_catalog_is_public_and_cached() {
    let Some(server) = TestServer::new_or_skip().await else {
        return;
    };
    let request = Request::builder()
        .method("GET")
        .uri("/api/formats")
        .body(Body::empty())
        .unwrap();
    let (status, headers, body) = send(&server.router, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        headers.get(header::CACHE_CONTROL).unwrap(),
        "public, max-age=3600"
    );
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert!(json.get("image_convert").is_some());
    assert!(json.get("video_compress").is_some());
}

#[tokio::test]
async fn invalid_job_ids_are_bad_requests() {
    let Some(server) = TestServer::new_or_skip().await else {
        return;
    };
    let ip = test_ip();
    for uri in [
        "/api/jobs/not-a-uuid",
        "/api/jobs/not-a-uuid/download",
    ] {
        let (status, json) = get(&server.router, uri, &ip).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(json["message"], "Invalid job ID");
    }

    let request = Request::builder()
        .method("DELETE")
        .uri("/api/jobs/not-a-uuid")
        .header("x-real-ip", &ip)
        .body(Body::empty())
        .unwrap();
    let (status, _, _) = send(&server.router, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_jobs_are_not_found() {
    let Some(server) = TestServer::new_or_skip().await else {
        return;
    };
    let ip = test_ip();
    let missing = Uuid::new_v4();

    let (status, _) = get(&server.router, &format!("/api/jobs/{missing}"), &ip).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let request = Request::builder()
        .method("DELETE")
        .uri(format!("/api/jobs/{missing}"))
        .header("x-real-ip", &ip)
        .body(Body::empty())
        .unwrap();
    let (status, _, _) = send(&server.router, request).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn requests_without_a_client_ip_are_rejected() {
    let Some(server) = TestServer::new_or_skip().await else {
        return;
    };
    // No x-real-ip header and no socket info under oneshot.
    let request = Request::builder()
        .method("GET")
        .uri(format!("/api/jobs/{}", Uuid::new_v4()))
        .body(Body::empty())
        .unwrap();
    let (status, _, _) = send(&server.router, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn intake_validates_operation_file_and_format() {
    let Some(server) = TestServer::new_or_skip().await else {
        return;
    };
    let ip = test_ip();
    let png = b"\x89PNG\r\n\x1a\nfake image bytes".as_slice();

    let (status, json) = post_job(
        &server,
        &ip,
        &[("operation", "shrinkify")],
        Some(("a.png", png)),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["message"].as_str().unwrap().contains("Invalid operation"));

    let (status, json) = post_job(&server, &ip, &[("operation", "image_convert")], None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["message"].as_str().unwrap().contains("No file provided"));

    let (status, json) = post_job(
        &server,
        &ip,
        &[("operation", "image_convert"), ("output_format", "jpeg")],
        Some(("a.png", b"")),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["message"], "File is empty");

    let (status, json) = post_job(
        &server,
        &ip,
        &[("operation", "image_convert"), ("output_format", "jpeg")],
        Some(("notes.txt", png)),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["message"]
        .as_str()
        .unwrap()
        .contains("Unsupported input format"));

    let (status, json) = post_job(
        &server,
        &ip,
        &[("operation", "image_convert")],
        Some(("a.png", png)),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["message"]
        .as_str()
        .unwrap()
        .contains("output_format is required"));
}

#[tokio::test]
async fn intake_persists_encrypts_and_enqueues() {
    let Some(server) = TestServer::new_or_skip().await else {
        return;
    };
    let ip = test_ip();
    let payload = b"\x89PNG\r\n\x1a\npretend this is a real png".as_slice();

    let (status, json) = post_job(
        &server,
        &ip,
        &[("operation", "image_convert"), ("output_format", "jpeg")],
        Some(("Holiday Photo.PNG", payload)),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "body: {json}");
    assert_eq!(json["status"], "pending");
    assert_eq!(json["operation"], "image_convert");
    assert_eq!(json["original_name"], "Holiday Photo.PNG");
    assert_eq!(json["input_size"], payload.len() as i64);
    assert!(json.get("output_size").is_none());

    let job_id: Uuid = json["id"].as_str().unwrap().parse().unwrap();

    // The row exists and the input blob landed, encrypted.
    let row = server.state.metadata.get_job(job_id).await.unwrap().unwrap();
    assert_eq!(row.status, "pending");
    assert!(server.state.store.input_exists(job_id));
    let blob = std::fs::read(server.state.store.input_path(job_id)).unwrap();
    assert_eq!(
        blob.len(),
        fileforge_crypto::NONCE_SIZE + payload.len() + fileforge_crypto::TAG_SIZE
    );
    let key = fileforge_crypto::derive_key(&server.state.master_key, &job_id.to_string()).unwrap();
    let mut plain = Vec::new();
    fileforge_crypto::decrypt_stream(&key, &mut blob.as_slice(), &mut plain).unwrap();
    assert_eq!(plain, payload);

    // The id reached the queue.
    let popped = server
        .state
        .queue
        .dequeue(Duration::from_secs(2))
        .await
        .unwrap();
    assert_eq!(popped.as_deref(), Some(job_id.to_string().as_str()));

    // Download before completion conflicts.
    let (status, _) = get(
        &server.router,
        &format!("/api/jobs/{job_id}/download"),
        &ip,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // Delete removes the row and the blob.
    let request = Request::builder()
        .method("DELETE")
        .uri(format!("/api/jobs/{job_id}"))
        .header("x-real-ip", &ip)
        .body(Body::empty())
        .unwrap();
    let (status, _, body) = send(&server.router, request).await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "deleted");
    assert!(!server.state.store.input_exists(job_id));

    let (status, _) = get(&server.router, &format!("/api/jobs/{job_id}"), &ip).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn download_surfaces_terminal_failure() {
    let Some(server) = TestServer::new_or_skip().await else {
        return;
    };
    let job = seed_job(&server).await;
    server
        .state
        .metadata
        .update_job_failed(job.job_id, "ffmpeg failed (exit status: 1): boom")
        .await
        .unwrap();

    let (status, json) = get(
        &server.router,
        &format!("/api/jobs/{}/download", job.job_id),
        &test_ip(),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(json["message"].as_str().unwrap().contains("ffmpeg failed"));

    server.state.metadata.delete_job(job.job_id).await.unwrap();
}

#[tokio::test]
async fn download_without_output_blob_is_not_found() {
    let Some(server) = TestServer::new_or_skip().await else {
        return;
    };
    let job = seed_job(&server).await;
    server
        .state
        .metadata
        .update_job_completed(job.job_id, "photo.jpeg", 42)
        .await
        .unwrap();

    let (status, json) = get(
        &server.router,
        &format!("/api/jobs/{}/download", job.job_id),
        &test_ip(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(json["message"].as_str().unwrap().contains("expired"));

    server.state.metadata.delete_job(job.job_id).await.unwrap();
}

#[tokio::test]
async fn download_streams_the_decrypted_output() {
    let Some(server) = TestServer::new_or_skip().await else {
        return;
    };
    let job = seed_job(&server).await;
    let result: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();

    let key = fileforge_crypto::derive_key(&server.state.master_key, &job.job_id.to_string())
        .unwrap();
    let mut ciphertext = Vec::new();
    fileforge_crypto::encrypt_stream(&key, &mut result.as_slice(), &mut ciphertext).unwrap();
    std::fs::write(server.state.store.output_path(job.job_id), &ciphertext).unwrap();
    server
        .state
        .metadata
        .update_job_completed(job.job_id, "photo.jpeg", result.len() as i64)
        .await
        .unwrap();

    let request = Request::builder()
        .method("GET")
        .uri(format!("/api/jobs/{}/download", job.job_id))
        .header("x-real-ip", test_ip())
        .body(Body::empty())
        .unwrap();
    let (status, headers, body) = send(&server.router, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers.get(header::CONTENT_TYPE).unwrap(), "image/jpeg");
    assert_eq!(
        headers.get(header::CONTENT_DISPOSITION).unwrap(),
        "attachment; filename=\"photo.jpeg\""
    );
    assert_eq!(headers.get(header::CACHE_CONTROL).unwrap(), "no-store");
    assert_eq!(
        headers.get(header::CONTENT_LENGTH).unwrap(),
        result.len().to_string().as_str()
    );
    assert_eq!(body, result);

    server.state.metadata.delete_job(job.job_id).await.unwrap();
    server.state.store.delete_job_files(job.job_id);
}

#[tokio::test]
async fn corrupted_output_terminates_the_stream() {
    let Some(server) = TestServer::new_or_skip().await else {
        return;
    };
    let job = seed_job(&server).await;
    let result = vec![0xabu8; 100_000];

    let key = fileforge_crypto::derive_key(&server.state.master_key, &job.job_id.to_string())
        .unwrap();
    let mut ciphertext = Vec::new();
    fileforge_crypto::encrypt_stream(&key, &mut result.as_slice(), &mut ciphertext).unwrap();
    // Flip a byte inside the first sealed chunk.
    ciphertext[fileforge_crypto::NONCE_SIZE + 10] ^= 0x01;
    std::fs::write(server.state.store.output_path(job.job_id), &ciphertext).unwrap();
    server
        .state
        .metadata
        .update_job_completed(job.job_id, "photo.jpeg", result.len() as i64)
        .await
        .unwrap();

    let request = Request::builder()
        .method("GET")
        .uri(format!("/api/jobs/{}/download", job.job_id))
        .header("x-real-ip", test_ip())
        .body(Body::empty())
        .unwrap();
    let response = server.router.clone().oneshot(request).await.unwrap();
    // Headers are already out; the failure shows up as a broken body.
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await;
    assert!(body.is_err(), "stream must abort on a tag failure");

    server.state.metadata.delete_job(job.job_id).await.unwrap();
    server.state.store.delete_job_files(job.job_id);
}

#[tokio::test]
async fn rate_limit_answers_429_with_retry_after() {
    let Some(server) =
        TestServer::with_config_or_skip(|config| config.rate_limit_per_hour = 2).await
    else {
        return;
    };
    let ip = test_ip();
    let uri = format!("/api/jobs/{}", Uuid::new_v4());

    for _ in 0..2 {
        let (status, _) = get(&server.router, &uri, &ip).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    let request = Request::builder()
        .method("GET")
        .uri(&uri)
        .header("x-real-ip", &ip)
        .body(Body::empty())
        .unwrap();
    let (status, headers, _) = send(&server.router, request).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(headers.get(header::RETRY_AFTER).unwrap(), "3600");
}

#[tokio::test]
async fn flagged_sessions_are_locked_out() {
    let Some(server) = TestServer::with_config_or_skip(|config| {
        config.flag_threshold = 3;
        config.rate_limit_per_hour = 10_000;
    })
    .await
    else {
        return;
    };
    let ip = test_ip();
    let uri = format!("/api/jobs/{}", Uuid::new_v4());

    let mut statuses = Vec::new();
    for _ in 0..4 {
        let (status, _) = get(&server.router, &uri, &ip).await;
        statuses.push(status);
    }

    assert_eq!(statuses[0], StatusCode::NOT_FOUND);
    assert_eq!(statuses[1], StatusCode::NOT_FOUND);
    assert_eq!(
        statuses[3],
        StatusCode::FORBIDDEN,
        "the flag must lock the session out"
    );

    let session = server
        .state
        .metadata
        .touch_session(&ip, 1_000_000)
        .await
        .unwrap();
    assert!(session.is_flagged, "flagging is monotonic");
}

#[tokio::test]
async fn admin_stats_have_the_expected_shape() {
    let Some(server) = TestServer::new_or_skip().await else {
        return;
    };
    let (status, json) = get(&server.router, "/api/admin/stats", &test_ip()).await;
    assert_eq!(status, StatusCode::OK);
    for field in [
        "queue_length",
        "active_jobs",
        "completed_24h",
        "failed_24h",
        "active_sessions",
        "storage_used_mb",
    ] {
        assert!(json.get(field).is_some(), "missing {field}");
    }
}

#[tokio::test]
async fn sweeper_removes_expired_rows_and_blobs() {
    let Some(server) = TestServer::new_or_skip().await else {
        return;
    };

    let session = server
        .state
        .metadata
        .touch_session(&test_ip(), 1_000_000)
        .await
        .unwrap();
    let job = server
        .state
        .metadata
        .create_job(session.session_id, "image_convert", "a.png", 10, "{}", 0)
        .await
        .unwrap();
    std::fs::write(server.state.store.input_path(job.job_id), b"in").unwrap();
    std::fs::write(server.state.store.output_path(job.job_id), b"out").unwrap();

    fileforge_server::sweeper::sweep_once(&server.state).await;

    assert!(server
        .state
        .metadata
        .get_job(job.job_id)
        .await
        .unwrap()
        .is_none());
    assert!(!server.state.store.input_exists(job.job_id));
    assert!(!server.state.store.output_exists(job.job_id));

    let (status, _) = get(
        &server.router,
        &format!("/api/jobs/{}", job.job_id),
        &test_ip(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
