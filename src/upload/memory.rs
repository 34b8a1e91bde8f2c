use anyhow::{anyhow, Result};

use super::{RemoteStore, UploadRecord};

const DEFAULT_BUCKET: &str = "laundry-images";

#[derive(Clone, Debug)]
pub struct StoredObject {
    pub name: String,
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// In-process stand-in for the remote backend.
///
/// Either write can be made to fail with a fixed message, which lets tests walk
/// the partial-failure paths deterministically.
#[derive(Clone, Debug)]
pub struct InMemoryStore {
    endpoint: String,
    bucket: String,
    objects: Vec<StoredObject>,
    records: Vec<UploadRecord>,
    object_failure: Option<String>,
    insert_failure: Option<String>,
}

impl InMemoryStore {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            bucket: DEFAULT_BUCKET.to_string(),
            objects: Vec::new(),
            records: Vec::new(),
            object_failure: None,
            insert_failure: None,
        }
    }

    /// Make every `put_object` fail with `message`.
    pub fn failing_objects(mut self, message: impl Into<String>) -> Self {
        self.object_failure = Some(message.into());
        self
    }

    /// Make every `insert_record` fail with `message`.
    pub fn failing_inserts(mut self, message: impl Into<String>) -> Self {
        self.insert_failure = Some(message.into());
        self
    }

    pub fn objects(&self) -> &[StoredObject] {
        &self.objects
    }

    pub fn records(&self) -> &[UploadRecord] {
        &self.records
    }
}

impl RemoteStore for InMemoryStore {
    fn put_object(&mut self, name: &str, bytes: &[u8], content_type: &str) -> Result<String> {
        if let Some(message) = &self.object_failure {
            return Err(anyhow!("{}", message));
        }
        if self.objects.iter().any(|o| o.name == name) {
            return Err(anyhow!("object {} already exists", name));
        }
        self.objects.push(StoredObject {
            name: name.to_string(),
            bytes: bytes.to_vec(),
            content_type: content_type.to_string(),
        });
        Ok(format!(
            "{}/storage/v1/object/public/{}/{}",
            self.endpoint, self.bucket, name
        ))
    }

    fn insert_record(&mut self, record: &UploadRecord) -> Result<()> {
        if let Some(message) = &self.insert_failure {
            return Err(anyhow!("{}", message));
        }
        self.records.push(record.clone());
        Ok(())
    }
}
