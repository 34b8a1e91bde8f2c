//! Supabase storage + PostgREST client.
//!
//! Only the three calls this station needs are implemented:
//! - `POST /storage/v1/object/<bucket>/<name>` to upload an image,
//! - `POST /rest/v1/<table>` to insert a row,
//! - `GET /storage/v1/bucket` to list buckets (connectivity check).

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use url::Url;

use super::{RemoteStore, UploadRecord};
use crate::config::BackendSettings;

#[derive(Clone, Debug, Deserialize)]
pub struct BucketInfo {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub public: bool,
}

pub struct SupabaseStore {
    agent: ureq::Agent,
    endpoint: Url,
    key: String,
    bucket: String,
    table: String,
}

impl SupabaseStore {
    pub fn new(settings: &BackendSettings) -> Result<Self> {
        let mut endpoint = Url::parse(&settings.endpoint)
            .with_context(|| format!("parse backend endpoint {}", settings.endpoint))?;
        if !endpoint.path().ends_with('/') {
            let path = format!("{}/", endpoint.path());
            endpoint.set_path(&path);
        }
        let agent = ureq::AgentBuilder::new()
            .timeout(settings.timeout)
            .build();
        Ok(Self {
            agent,
            endpoint,
            key: settings.key.clone(),
            bucket: settings.bucket.clone(),
            table: settings.table.clone(),
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Public URL of an object in the configured bucket.
    pub fn public_url(&self, name: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.endpoint.as_str().trim_end_matches('/'),
            self.bucket,
            name
        )
    }

    /// Insert one row and return the rows echoed back by the server.
    ///
    /// An empty result usually means row-level security hides the new row from
    /// the key in use.
    pub fn insert_row<T: Serialize>(&self, row: &T) -> Result<Vec<serde_json::Value>> {
        let url = self.url(&format!("rest/v1/{}", self.table))?;
        let body = serde_json::to_string(row).context("serialize row")?;
        let response = self
            .authorized(self.agent.post(url.as_str()))
            .set("Content-Type", "application/json")
            .set("Prefer", "return=representation")
            .send_string(&body);
        let text = read_body(response, "table insert")?;
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&text).context("parse table insert response")
    }

    pub fn list_buckets(&self) -> Result<Vec<BucketInfo>> {
        let url = self.url("storage/v1/bucket")?;
        let response = self.authorized(self.agent.get(url.as_str())).call();
        let text = read_body(response, "bucket listing")?;
        serde_json::from_str(&text).context("parse bucket listing")
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.endpoint
            .join(path)
            .with_context(|| format!("build backend url for {}", path))
    }

    fn authorized(&self, request: ureq::Request) -> ureq::Request {
        request
            .set("apikey", &self.key)
            .set("Authorization", &format!("Bearer {}", self.key))
    }
}

impl RemoteStore for SupabaseStore {
    fn put_object(&mut self, name: &str, bytes: &[u8], content_type: &str) -> Result<String> {
        let url = self.url(&format!("storage/v1/object/{}/{}", self.bucket, name))?;
        let response = self
            .authorized(self.agent.post(url.as_str()))
            .set("Content-Type", content_type)
            .set("x-upsert", "false")
            .send_bytes(bytes);
        read_body(response, "object upload")?;
        Ok(self.public_url(name))
    }

    fn insert_record(&mut self, record: &UploadRecord) -> Result<()> {
        self.insert_row(record)?;
        Ok(())
    }
}

fn read_body(response: Result<ureq::Response, ureq::Error>, what: &str) -> Result<String> {
    match response {
        Ok(response) => response
            .into_string()
            .with_context(|| format!("read {} response", what)),
        Err(ureq::Error::Status(code, response)) => {
            let body = response.into_string().unwrap_or_default();
            Err(anyhow!("{} failed with HTTP {}: {}", what, code, body.trim()))
        }
        Err(ureq::Error::Transport(transport)) => {
            Err(anyhow!("{} failed: {}", what, transport))
        }
    }
}
