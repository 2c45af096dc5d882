//! Shared test infrastructure for integration tests.
//!
//! Spawns a real `s3gate` binary against a temp directory and provides a
//! minimal AWS v2-signing client, since `aws-sdk-s3` only speaks SigV4 and
//! this gateway deliberately only speaks v2.

#![allow(dead_code)]

use base64::Engine;
use s3gate::api::auth::{bytes_to_sign, hmac_sha1, CanonicalRequest};
use std::process::{Child, Command};
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::sleep;

static PORT_COUNTER: AtomicU16 = AtomicU16::new(18800);

pub struct TestServer {
    process: Child,
    addr: String,
    _data_dir: TempDir,
}

impl TestServer {
    pub async fn filesystem() -> Self {
        let port = PORT_COUNTER.fetch_add(1, Ordering::SeqCst);
        let addr = format!("127.0.0.1:{port}");
        let data_dir = TempDir::new().expect("failed to create temp dir");

        let process = Command::new(env!("CARGO_BIN_EXE_s3gate"))
            .arg("serve")
            .arg("--root")
            .arg(data_dir.path())
            .arg("--listen")
            .arg(&addr)
            .env("RUST_LOG", "warn")
            .spawn()
            .expect("failed to start s3gate");

        let mut server = Self { process, addr, _data_dir: data_dir };
        server.wait_ready().await;
        server
    }

    /// Distributed backend, using a bare directory path as `--blob-master`
    /// so the gateway falls back to `LocalBlobStore` and no real SeaweedFS
    /// master is required.
    pub async fn distributed() -> Self {
        let port = PORT_COUNTER.fetch_add(1, Ordering::SeqCst);
        let addr = format!("127.0.0.1:{port}");
        let data_dir = TempDir::new().expect("failed to create temp dir");
        let meta_dir = data_dir.path().join("meta");
        let blob_dir = data_dir.path().join("blobs");

        let process = Command::new(env!("CARGO_BIN_EXE_s3gate"))
            .arg("serve")
            .arg("--blob-master")
            .arg(&blob_dir)
            .arg("--meta-dir")
            .arg(&meta_dir)
            .arg("--listen")
            .arg(&addr)
            .env("RUST_LOG", "warn")
            .spawn()
            .expect("failed to start s3gate");

        let mut server = Self { process, addr, _data_dir: data_dir };
        server.wait_ready().await;
        server
    }

    async fn wait_ready(&mut self) {
        for _ in 0..100 {
            if std::net::TcpStream::connect(&self.addr).is_ok() {
                sleep(Duration::from_millis(50)).await;
                return;
            }
            if let Ok(Some(status)) = self.process.try_wait() {
                panic!("s3gate exited before becoming ready: {status}");
            }
            sleep(Duration::from_millis(50)).await;
        }
        let _ = self.process.kill();
        panic!("timed out waiting for s3gate on {}", self.addr);
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn client(&self, access_key: &str) -> SignedClient {
        SignedClient {
            base_url: format!("http://{}", self.addr),
            host: self.addr.clone(),
            access_key: access_key.to_string(),
            http: reqwest::Client::new(),
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.process.kill();
    }
}

/// An HTTP client that signs every request with AWS Signature Version 2
/// against an access key with no provisioned secret, matching the reference
/// backends' empty-secret anonymous owners.
pub struct SignedClient {
    base_url: String,
    host: String,
    access_key: String,
    http: reqwest::Client,
}

impl SignedClient {
    fn authorization(&self, method: &str, path_and_query: &str, headers: &axum::http::HeaderMap) -> String {
        let req = CanonicalRequest {
            method,
            headers,
            host: &self.host,
            service_host: "",
            request_target: path_and_query,
        };
        let sts = bytes_to_sign(&req);
        let sig = hmac_sha1(&[], &sts);
        let sig_b64 = base64::engine::general_purpose::STANDARD.encode(sig);
        format!("AWS {}:{}", self.access_key, sig_b64)
    }

    pub async fn get(&self, path_and_query: &str) -> reqwest::Response {
        let headers = axum::http::HeaderMap::new();
        let auth = self.authorization("GET", path_and_query, &headers);
        self.http
            .get(format!("{}{}", self.base_url, path_and_query))
            .header("Authorization", auth)
            .send()
            .await
            .expect("request failed")
    }

    pub async fn delete(&self, path_and_query: &str) -> reqwest::Response {
        let headers = axum::http::HeaderMap::new();
        let auth = self.authorization("DELETE", path_and_query, &headers);
        self.http
            .delete(format!("{}{}", self.base_url, path_and_query))
            .header("Authorization", auth)
            .send()
            .await
            .expect("request failed")
    }

    pub async fn put_bucket(&self, bucket: &str) -> reqwest::Response {
        let path = format!("/{bucket}");
        let headers = axum::http::HeaderMap::new();
        let auth = self.authorization("PUT", &path, &headers);
        self.http
            .put(format!("{}{}", self.base_url, path))
            .header("Authorization", auth)
            .send()
            .await
            .expect("request failed")
    }

    /// `PUT /{bucket}/{key}` with an explicit content type and optional
    /// `Content-MD5`, mirroring the object-level PUT contract.
    pub async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        content_type: &str,
        content_md5: Option<&str>,
        body: Vec<u8>,
    ) -> reqwest::Response {
        let path = format!("/{bucket}/{key}");
        let mut headers = axum::http::HeaderMap::new();
        headers.insert("content-type", content_type.parse().unwrap());
        if let Some(md5) = content_md5 {
            headers.insert("content-md5", md5.parse().unwrap());
        }
        let auth = self.authorization("PUT", &path, &headers);

        let mut req = self
            .http
            .put(format!("{}{}", self.base_url, path))
            .header("Authorization", auth)
            .header("Content-Type", content_type);
        if let Some(md5) = content_md5 {
            req = req.header("Content-MD5", md5);
        }
        req.body(body).send().await.expect("request failed")
    }
}
