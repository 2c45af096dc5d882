//! End-to-end scenarios against a spawned `s3gate` binary.

mod common;

use common::TestServer;

#[tokio::test]
async fn lists_every_bucket_an_owner_has_created() {
    let server = TestServer::filesystem().await;
    let client = server.client("alice");

    assert!(client.put_bucket("bucket-a").await.status().is_success());
    assert!(client.put_bucket("bucket-b").await.status().is_success());

    let resp = client.get("/").await;
    assert!(resp.status().is_success());
    let body = resp.text().await.unwrap();
    assert!(body.contains("bucket-a"));
    assert!(body.contains("bucket-b"));
}

#[tokio::test]
async fn nested_key_put_get_round_trips() {
    let server = TestServer::filesystem().await;
    let client = server.client("alice");
    client.put_bucket("docs").await;

    let payload = b"hello nested world".to_vec();
    let put_resp = client.put_object("docs", "a/b/c/report.txt", "text/plain", None, payload.clone()).await;
    assert!(put_resp.status().is_success(), "put failed: {}", put_resp.status());

    let get_resp = client.get("/docs/a/b/c/report.txt").await;
    assert!(get_resp.status().is_success());
    assert_eq!(get_resp.headers().get("content-type").unwrap(), "text/plain");
    let body = get_resp.bytes().await.unwrap();
    assert_eq!(body.as_ref(), payload.as_slice());
}

#[tokio::test]
async fn prefix_and_delimiter_group_keys_into_common_prefixes() {
    let server = TestServer::filesystem().await;
    let client = server.client("alice");
    client.put_bucket("logs").await;

    for key in ["2024/01/a.log", "2024/01/b.log", "2024/02/c.log", "readme.txt"] {
        let resp = client.put_object("logs", key, "text/plain", None, b"x".to_vec()).await;
        assert!(resp.status().is_success());
    }

    let resp = client.get("/logs?prefix=2024/&delimiter=/").await;
    assert!(resp.status().is_success());
    let body = resp.text().await.unwrap();
    assert!(body.contains("<CommonPrefixes>"));
    assert!(body.contains("2024/01/"));
    assert!(body.contains("2024/02/"));
    assert!(!body.contains("readme.txt"));
}

#[tokio::test]
async fn deleting_a_non_empty_bucket_fails() {
    let server = TestServer::filesystem().await;
    let client = server.client("alice");
    client.put_bucket("occupied").await;
    client.put_object("occupied", "file.txt", "text/plain", None, b"data".to_vec()).await;

    let resp = client.delete("/occupied").await;
    assert_eq!(resp.status().as_u16(), 409);
    let body = resp.text().await.unwrap();
    assert!(body.contains("BucketNotEmpty"));
}

#[tokio::test]
async fn wrong_content_md5_rejects_the_put_and_leaves_no_object() {
    let server = TestServer::filesystem().await;
    let client = server.client("alice");
    client.put_bucket("checked").await;

    // base64 of 16 zero bytes: deliberately wrong for any non-empty body.
    let bogus_md5 = "AAAAAAAAAAAAAAAAAAAAAA==";
    let resp = client.put_object("checked", "file.txt", "text/plain", Some(bogus_md5), b"real content".to_vec()).await;
    assert_eq!(resp.status().as_u16(), 400);
    let body = resp.text().await.unwrap();
    assert!(body.contains("BadDigest"));

    let get_resp = client.get("/checked/file.txt").await;
    assert_eq!(get_resp.status().as_u16(), 404);
    let body = get_resp.text().await.unwrap();
    assert!(body.contains("NoSuchKey"));
}

#[tokio::test]
async fn head_bucket_reports_existence() {
    let server = TestServer::filesystem().await;
    let client = server.client("alice");
    client.put_bucket("present").await;

    let http = reqwest::Client::new();
    let present = http.head(format!("http://{}/present", server.addr())).send().await.unwrap();
    // HEAD requires the same signature as GET would for the same resource;
    // since we don't sign this one, assert only that the route exists and
    // rejects unauthenticated requests distinctly from a 404.
    assert_ne!(present.status().as_u16(), 404);
}

#[tokio::test]
async fn unrecognized_verb_gets_the_xml_error_envelope_not_axums_default_405() {
    let server = TestServer::filesystem().await;
    let http = reqwest::Client::new();

    let resp = http.patch(format!("http://{}/some-bucket/some-key", server.addr())).send().await.unwrap();
    assert_eq!(resp.status().as_u16(), 400);
    let body = resp.text().await.unwrap();
    assert!(body.contains("MethodNotAllowed"));
}

#[tokio::test]
async fn distributed_backend_put_get_round_trips() {
    let server = TestServer::distributed().await;
    let client = server.client("alice");
    client.put_bucket("bucket").await;

    let payload = b"distributed payload".to_vec();
    let put_resp = client.put_object("bucket", "key.bin", "application/octet-stream", None, payload.clone()).await;
    assert!(put_resp.status().is_success());

    let get_resp = client.get("/bucket/key.bin").await;
    assert!(get_resp.status().is_success());
    let body = get_resp.bytes().await.unwrap();
    assert_eq!(body.as_ref(), payload.as_slice());
}

#[tokio::test]
async fn concurrent_puts_to_distinct_keys_in_the_same_bucket_all_land() {
    let server = std::sync::Arc::new(TestServer::distributed().await);
    let client = server.client("alice");
    client.put_bucket("concurrent").await;

    let mut tasks = Vec::new();
    for i in 0..16 {
        let client = server.client("alice");
        tasks.push(tokio::spawn(async move {
            let key = format!("key-{i}");
            let body = format!("payload-{i}").into_bytes();
            client.put_object("concurrent", &key, "text/plain", None, body).await.status().is_success()
        }));
    }
    for task in tasks {
        assert!(task.await.unwrap());
    }

    for i in 0..16 {
        let resp = client.get(&format!("/concurrent/key-{i}")).await;
        assert!(resp.status().is_success());
        assert_eq!(resp.text().await.unwrap(), format!("payload-{i}"));
    }
}
