//! Manual upload of a frame and its top detection.
//!
//! An upload is two independent remote writes, in order:
//! 1. the JPEG-encoded frame goes to object storage under a timestamped name,
//! 2. one `UploadRecord` row referencing the stored image goes to the table.
//!
//! There are no retries. If the row insert fails after the image was stored,
//! the image stays orphaned; nothing reconciles the two.

mod memory;
mod supabase;

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::classify::TopObjectState;
use crate::frame::Frame;

pub use memory::{InMemoryStore, StoredObject};
pub use supabase::{BucketInfo, SupabaseStore};

pub const JPEG_CONTENT_TYPE: &str = "image/jpeg";

/// One row of the upload table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UploadRecord {
    pub item_type: String,
    pub confidence: f32,
    pub image_url: String,
    pub is_defect: bool,
    /// RFC 3339 local time of the upload.
    pub created_at: String,
}

/// Remote object storage plus table, as seen by the uploader.
pub trait RemoteStore {
    /// Store `bytes` under `name` and return the object's public URL.
    fn put_object(&mut self, name: &str, bytes: &[u8], content_type: &str) -> Result<String>;

    /// Insert one metadata row.
    fn insert_record(&mut self, record: &UploadRecord) -> Result<()>;
}

/// The loop's view of the upload side effect.
pub trait FrameUploader {
    fn store(&mut self, frame: &Frame, top: &TopObjectState) -> Result<UploadRecord>;
}

pub struct Uploader<S> {
    store: S,
    prefix: String,
    last_stamp: Option<String>,
    same_second: u32,
}

impl<S: RemoteStore> Uploader<S> {
    pub fn new(store: S, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
            last_stamp: None,
            same_second: 0,
        }
    }

    pub fn remote(&self) -> &S {
        &self.store
    }

    /// Upload `frame` and record `top`, stamping both with `now`.
    pub fn store_at(
        &mut self,
        frame: &Frame,
        top: &TopObjectState,
        now: DateTime<Local>,
    ) -> Result<UploadRecord> {
        let jpeg = frame.encode_jpeg()?;
        let name = self.next_object_name(now);

        let image_url = self
            .store
            .put_object(&name, &jpeg, JPEG_CONTENT_TYPE)
            .with_context(|| format!("upload image {}", name))?;
        log::info!("stored {} ({} bytes)", name, jpeg.len());

        let record = UploadRecord {
            item_type: top.item_type.clone(),
            confidence: top.confidence,
            image_url,
            is_defect: top.is_defect,
            created_at: now.to_rfc3339(),
        };
        if let Err(err) = self.store.insert_record(&record) {
            log::warn!("image {} is stored without a metadata row", record.image_url);
            return Err(err.context("insert upload record"));
        }
        Ok(record)
    }

    /// Object names have one-second resolution; repeated uploads within the same
    /// second get a `_<n>` suffix so they never collide in the bucket.
    fn next_object_name(&mut self, now: DateTime<Local>) -> String {
        let base = object_name(&self.prefix, now);
        if self.last_stamp.as_deref() == Some(base.as_str()) {
            self.same_second += 1;
            let stem = base.trim_end_matches(".jpg");
            format!("{}_{}.jpg", stem, self.same_second)
        } else {
            self.last_stamp = Some(base.clone());
            self.same_second = 0;
            base
        }
    }
}

impl<S: RemoteStore> FrameUploader for Uploader<S> {
    fn store(&mut self, frame: &Frame, top: &TopObjectState) -> Result<UploadRecord> {
        self.store_at(frame, top, Local::now())
    }
}

/// Timestamp-based object name, e.g. `laundry_20250114_093012.jpg`.
pub fn object_name(prefix: &str, now: DateTime<Local>) -> String {
    format!("{}_{}.jpg", prefix, now.format("%Y%m%d_%H%M%S"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn frame() -> Frame {
        Frame::from_rgb(vec![90u8; 8 * 8 * 3], 8, 8, 1).unwrap()
    }

    fn fixed_time() -> DateTime<Local> {
        Local.with_ymd_and_hms(2025, 1, 14, 9, 30, 12).unwrap()
    }

    #[test]
    fn object_names_are_timestamped() {
        assert_eq!(
            object_name("laundry", fixed_time()),
            "laundry_20250114_093012.jpg"
        );
    }

    #[test]
    fn uploads_within_one_second_get_distinct_names() -> Result<()> {
        let mut uploader = Uploader::new(InMemoryStore::new("https://example.test"), "laundry");
        let top = TopObjectState::default();
        uploader.store_at(&frame(), &top, fixed_time())?;
        uploader.store_at(&frame(), &top, fixed_time())?;

        let names: Vec<&str> = uploader
            .remote()
            .objects()
            .iter()
            .map(|o| o.name.as_str())
            .collect();
        assert_eq!(
            names,
            vec!["laundry_20250114_093012.jpg", "laundry_20250114_093012_1.jpg"]
        );
        Ok(())
    }

    #[test]
    fn upload_writes_image_then_row() -> Result<()> {
        let mut uploader = Uploader::new(InMemoryStore::new("https://example.test"), "laundry");
        let top = TopObjectState {
            item_type: "stain".to_string(),
            confidence: 0.41,
            is_defect: true,
        };
        let record = uploader.store_at(&frame(), &top, fixed_time())?;

        assert_eq!(
            record.image_url,
            "https://example.test/storage/v1/object/public/laundry-images/laundry_20250114_093012.jpg"
        );
        assert_eq!(record.created_at, fixed_time().to_rfc3339());
        assert!(record.is_defect);

        let remote = uploader.remote();
        assert_eq!(remote.objects().len(), 1);
        assert_eq!(remote.objects()[0].content_type, JPEG_CONTENT_TYPE);
        assert_eq!(&remote.objects()[0].bytes[..2], &[0xFF, 0xD8]);
        assert_eq!(remote.records(), &[record]);
        Ok(())
    }

    #[test]
    fn failed_insert_leaves_orphaned_image() {
        let store = InMemoryStore::new("https://example.test").failing_inserts("row level security");
        let mut uploader = Uploader::new(store, "laundry");

        let err = uploader
            .store_at(&frame(), &TopObjectState::default(), fixed_time())
            .unwrap_err();

        assert!(format!("{:#}", err).contains("row level security"));
        assert_eq!(uploader.remote().objects().len(), 1);
        assert!(uploader.remote().records().is_empty());
    }

    #[test]
    fn failed_object_upload_skips_row() {
        let store = InMemoryStore::new("https://example.test").failing_objects("bucket not found");
        let mut uploader = Uploader::new(store, "laundry");

        let err = uploader
            .store_at(&frame(), &TopObjectState::default(), fixed_time())
            .unwrap_err();

        assert!(format!("{:#}", err).contains("bucket not found"));
        assert!(uploader.remote().objects().is_empty());
        assert!(uploader.remote().records().is_empty());
    }
}
