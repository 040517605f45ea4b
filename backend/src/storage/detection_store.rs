use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt};
use log::debug;
use sha2::{Digest, Sha256};
use shared::{DetectionRecord, DetectionResult};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    // Only raised by persistent backends; the in-memory store cannot fail.
    #[allow(dead_code)]
    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// A detection waiting to be persisted. `id` and `created_at` are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewDetection {
    pub user_id: Option<String>,
    pub image_path: String,
    pub result: DetectionResult,
}

/// Append-only history of detections.
pub trait DetectionStore: Send + Sync {
    fn save(&self, detection: NewDetection) -> BoxFuture<'_, Result<DetectionRecord, StoreError>>;

    /// Records owned by `user_id`, newest first.
    fn list_by_user<'a>(
        &'a self,
        user_id: &'a str,
    ) -> BoxFuture<'a, Result<Vec<DetectionRecord>, StoreError>>;
}

#[derive(Default)]
struct MemoryState {
    records: HashMap<Uuid, DetectionRecord>,
    last_created_at: Option<DateTime<Utc>>,
}

/// Process-local store. Built once in `main` and shared behind an `Arc`.
#[derive(Default)]
pub struct MemoryDetectionStore {
    state: RwLock<MemoryState>,
}

impl MemoryDetectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn insert(&self, detection: NewDetection) -> DetectionRecord {
        let mut state = self.state.write().await;

        // createdAt never repeats within one store, so history order is strict.
        let mut created_at = Utc::now();
        if let Some(last) = state.last_created_at {
            if created_at <= last {
                created_at = last + chrono::Duration::microseconds(1);
            }
        }
        state.last_created_at = Some(created_at);

        let mut id = Uuid::new_v4();
        while state.records.contains_key(&id) {
            id = Uuid::new_v4();
        }

        let record = DetectionRecord {
            id,
            user_id: detection.user_id,
            image_path: detection.image_path,
            result: detection.result,
            created_at,
        };
        state.records.insert(id, record.clone());
        debug!("Stored detection {} ({} total)", id, state.records.len());
        record
    }

    async fn by_user(&self, user_id: &str) -> Vec<DetectionRecord> {
        let state = self.state.read().await;
        let mut records: Vec<DetectionRecord> = state
            .records
            .values()
            .filter(|record| record.user_id.as_deref() == Some(user_id))
            .cloned()
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records
    }
}

impl DetectionStore for MemoryDetectionStore {
    fn save(&self, detection: NewDetection) -> BoxFuture<'_, Result<DetectionRecord, StoreError>> {
        async move { Ok(self.insert(detection).await) }.boxed()
    }

    fn list_by_user<'a>(
        &'a self,
        user_id: &'a str,
    ) -> BoxFuture<'a, Result<Vec<DetectionRecord>, StoreError>> {
        async move { Ok(self.by_user(user_id).await) }.boxed()
    }
}

pub fn calculate_image_hash(image_data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(image_data);
    hex::encode(hasher.finalize())
}

pub fn file_extension(media_type: &str) -> &'static str {
    match media_type {
        "image/jpeg" | "image/jpg" | "image/pjpeg" => "jpg",
        "image/png" => "png",
        "image/webp" => "webp",
        "image/gif" => "gif",
        "image/heic" => "heic",
        "image/bmp" => "bmp",
        "image/tiff" => "tiff",
        _ => "img",
    }
}

/// Content-addressed reference for a detection's image. The bytes themselves are
/// not retained, so the path identifies the photo without promising it resolves.
pub fn image_reference(image_data: &[u8], media_type: &str) -> String {
    format!(
        "images/{}.{}",
        calculate_image_hash(image_data),
        file_extension(media_type)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    fn detection(user_id: Option<&str>, disease: &str) -> NewDetection {
        NewDetection {
            user_id: user_id.map(str::to_string),
            image_path: image_reference(disease.as_bytes(), "image/jpeg"),
            result: DetectionResult::sanitize(&json!({ "disease": disease })),
        }
    }

    #[actix_web::test]
    async fn lists_newest_first() {
        let store = MemoryDetectionStore::new();
        for disease in ["Bud Rot", "Leaf Blight", "Quick Wilt", "Mahali"] {
            store.save(detection(Some("farmer-1"), disease)).await.unwrap();
        }

        let records = store.list_by_user("farmer-1").await.unwrap();

        let diseases: Vec<&str> = records.iter().map(|r| r.result.disease.as_str()).collect();
        assert_eq!(diseases, ["Mahali", "Quick Wilt", "Leaf Blight", "Bud Rot"]);
        for pair in records.windows(2) {
            assert!(pair[0].created_at > pair[1].created_at);
        }
    }

    #[actix_web::test]
    async fn only_returns_the_users_records() {
        let store = MemoryDetectionStore::new();
        store.save(detection(Some("farmer-1"), "Bud Rot")).await.unwrap();
        store.save(detection(Some("farmer-2"), "Leaf Blight")).await.unwrap();
        store.save(detection(None, "Quick Wilt")).await.unwrap();

        let records = store.list_by_user("farmer-2").await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].result.disease, "Leaf Blight");
        assert!(store.list_by_user("nobody").await.unwrap().is_empty());
    }

    #[actix_web::test]
    async fn saved_record_carries_assigned_fields() {
        let store = MemoryDetectionStore::new();
        let before = Utc::now();
        let record = store.save(detection(Some("farmer-1"), "Bud Rot")).await.unwrap();

        assert_eq!(record.user_id.as_deref(), Some("farmer-1"));
        assert!(record.created_at >= before);
        assert!(record.image_path.starts_with("images/"));
        assert_eq!(store.list_by_user("farmer-1").await.unwrap(), vec![record]);
    }

    #[actix_web::test]
    async fn concurrent_saves_are_not_lost() {
        let store = Arc::new(MemoryDetectionStore::new());
        let mut handles = Vec::new();
        for i in 0..64 {
            let store = store.clone();
            handles.push(actix_web::rt::spawn(async move {
                store
                    .save(detection(Some("farmer-1"), &format!("case {i}")))
                    .await
                    .unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let records = store.list_by_user("farmer-1").await.unwrap();
        assert_eq!(records.len(), 64);
        for pair in records.windows(2) {
            assert!(pair[0].created_at > pair[1].created_at);
        }
    }

    #[test]
    fn image_reference_is_content_addressed() {
        let a = image_reference(b"leaf", "image/png");
        assert_eq!(a, image_reference(b"leaf", "image/png"));
        assert_ne!(a, image_reference(b"stem", "image/png"));
        assert!(a.ends_with(".png"));
        assert_eq!(a.len(), "images/".len() + 64 + ".png".len());
        assert!(image_reference(b"leaf", "image/x-unknown").ends_with(".img"));
    }
}
