//! HTTP client for the object-storage APIs, and the [`Backend`]
//! implementation the gateway mounts. The metadata service lists buckets
//! and object keys as JSON; the data service serves object bytes and
//! honours `Range` requests.

use std::time::Duration;

use gateway::{Backend, Node, ObjectMeta, Vfs, VfsBuilder};

use crate::error::{Error, Result};

pub struct Client {
    http: reqwest::blocking::Client,
    metadata_url: String,
    data_url: String,
    token: String,
}

impl Client {
    pub fn new(metadata_url: &str, data_url: &str, password: &str, timeout: u64) -> Result<Self> {
        for (url, name) in [
            (metadata_url, "GATEWAY_METADATA_API"),
            (data_url, "GATEWAY_DATA_API"),
        ] {
            reqwest::Url::parse(url)
                .map_err(|_| Error::Config(format!("{} is not a valid URL: {}", name, url)))?;
        }
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(timeout))
            .build()?;
        Ok(Client {
            http,
            metadata_url: metadata_url.trim_end_matches('/').to_string(),
            data_url: data_url.trim_end_matches('/').to_string(),
            token: password.to_string(),
        })
    }

    pub fn buckets(&self) -> Result<Vec<ObjectMeta>> {
        self.get_listing(format!("{}/buckets", self.metadata_url))
    }

    pub fn objects(&self, bucket: &str) -> Result<Vec<ObjectMeta>> {
        self.get_listing(format!("{}/objects/{}", self.metadata_url, bucket))
    }

    fn get_listing(&self, url: String) -> Result<Vec<ObjectMeta>> {
        let response = self.http.get(&url).bearer_auth(&self.token).send()?;
        if !response.status().is_success() {
            return Err(Error::Request(response.status(), url));
        }
        Ok(response.json()?)
    }

    fn object_url(&self, path: &str) -> String {
        format!("{}/{}", self.data_url, path)
    }
}

impl Backend for Client {
    fn build_filesystem(&self) -> gateway::Result<Vfs> {
        let mut builder = VfsBuilder::new();
        let root = builder.root();

        let buckets = self
            .buckets()
            .map_err(|err| gateway::Error::Backend(err.to_string()))?;
        for bucket in &buckets {
            log::info!("Filling in bucket {}", bucket.name);
            let dir = builder.add_directory(root, bucket);
            match self.objects(&bucket.name) {
                Ok(objects) => {
                    for object in &objects {
                        builder.add_object_key(dir, object);
                    }
                }
                Err(err) => log::error!("Could not list bucket {}: {}", bucket.name, err),
            }
        }
        Ok(builder.finish())
    }

    fn authorize_open(&self, pid: u32) -> bool {
        if is_thumbnailer(pid) {
            log::debug!("Refusing open from thumbnailer process {pid}");
            return false;
        }
        true
    }

    fn fetch_metadata(&self, node: &mut Node, path: &str) {
        let response = self
            .http
            .head(self.object_url(path))
            .bearer_auth(&self.token)
            .send();
        match response {
            Ok(response) if response.status().is_success() => {
                if let Some(length) = response.content_length() {
                    if length != node.size {
                        log::debug!("Size of {path} corrected from {} to {length}", node.size);
                        node.size = length;
                    }
                }
            }
            Ok(response) => {
                log::warn!("Size of {path} could not be verified: HTTP {}", response.status());
            }
            Err(err) => log::warn!("Size of {path} could not be verified: {err}"),
        }
    }

    fn fetch_bytes(&self, node: &Node, path: &str, buf: &mut [u8], offset: u64) -> i64 {
        if offset >= node.size || buf.is_empty() {
            return 0;
        }
        let end = (offset + buf.len() as u64).min(node.size) - 1;

        let response = self
            .http
            .get(self.object_url(path))
            .bearer_auth(&self.token)
            .header(reqwest::header::RANGE, format!("bytes={offset}-{end}"))
            .send();
        let response = match response {
            Ok(response) => response,
            Err(err) => {
                log::error!("Request for {path} failed: {err}");
                return -1;
            }
        };

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return -2;
        }
        if !status.is_success() {
            log::error!("Request for {path} failed: HTTP {status}");
            return -3;
        }

        match response.bytes() {
            Ok(body) => {
                let n = body.len().min(buf.len());
                buf[..n].copy_from_slice(&body[..n]);
                n as i64
            }
            Err(err) => {
                log::error!("Body of {path} could not be read: {err}");
                -1
            }
        }
    }

    fn wait_for_quiescence(&self) {
        // This client performs no detached work; nothing to wait for.
    }
}

#[cfg(target_os = "macos")]
fn is_thumbnailer(pid: u32) -> bool {
    // Finder's QuickLook opens everything it can see to build thumbnails,
    // which would trigger a remote fetch per file.
    let output = match std::process::Command::new("pgrep")
        .args(["-f", "QuickLook"])
        .output()
    {
        Ok(output) => output,
        Err(_) => return false,
    };
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .any(|line| line.trim().parse::<u32>().map(|p| p == pid).unwrap_or(false))
}

#[cfg(not(target_os = "macos"))]
fn is_thumbnailer(_pid: u32) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listing_rows_decode() {
        let json = r#"[
            {"name": "bucket-a", "bytes": 1024, "last_modified": "2024-03-01T10:00:00Z"},
            {"name": "bucket-b"}
        ]"#;
        let rows: Vec<ObjectMeta> = serde_json::from_str(json).unwrap();
        assert_eq!(rows[0].name, "bucket-a");
        assert_eq!(rows[0].bytes, 1024);
        assert!(rows[0].last_modified.is_some());
        assert_eq!(rows[1].bytes, 0);
        assert!(rows[1].last_modified.is_none());
    }

    #[test]
    fn test_invalid_endpoint_url_is_rejected() {
        assert!(Client::new("not a url", "https://data.example", "pw", 20).is_err());
        assert!(Client::new("https://meta.example", "also wrong", "pw", 20).is_err());
    }

    #[test]
    fn test_endpoint_urls_are_normalized() {
        let client = Client::new("https://meta.example/", "https://data.example/", "pw", 20).unwrap();
        assert_eq!(client.object_url("bucket/key"), "https://data.example/bucket/key");
    }
}
