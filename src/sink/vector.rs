//! Vector search sink (Qdrant REST)
//!
//! Points are upserted into a named collection keyed by a UUIDv5 derived
//! from the work item's stable identifier, with a payload of denormalized
//! metadata alongside the vector. The collection is created on first use
//! with the dimensionality discovered at warm-up.

use std::time::Duration;

use reqwest::Client as ReqwestClient;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::config::QdrantConfig;
use crate::error::{Error, Result};
use crate::store::VectorRecord;

/// Default timeout for sink requests in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Serialize)]
struct PointStruct {
    id: String,
    vector: Vec<f32>,
    payload: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct CollectionsResponse {
    result: CollectionsResult,
}

#[derive(Debug, Deserialize)]
struct CollectionsResult {
    #[serde(default)]
    collections: Vec<CollectionDescription>,
}

#[derive(Debug, Deserialize)]
struct CollectionDescription {
    name: String,
}

/// Writer for a Qdrant collection.
#[derive(Clone)]
pub struct QdrantSink {
    client: ReqwestClient,
    base_url: String,
    collection: String,
    distance: String,
}

impl QdrantSink {
    /// Create a sink from configuration.
    pub fn new(config: &QdrantConfig) -> Result<Self> {
        let client = ReqwestClient::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(Error::Http)?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            collection: config.collection.clone(),
            distance: config.distance.clone(),
        })
    }

    /// Name of the target collection.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Verify the endpoint is reachable and the collection exists, creating
    /// it with the discovered dimensionality when absent.
    #[instrument(skip(self))]
    pub async fn ensure_collection(&self, dims: usize) -> Result<()> {
        let url = format!("{}/collections", self.base_url);
        let response = self.client.get(&url).send().await.map_err(Error::Http)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Sink(format!(
                "collection listing failed ({}): {}",
                status, body
            )));
        }

        let listing: CollectionsResponse = response.json().await.map_err(Error::Http)?;
        if listing
            .result
            .collections
            .iter()
            .any(|c| c.name == self.collection)
        {
            info!(collection = %self.collection, "collection exists");
            return Ok(());
        }

        info!(
            collection = %self.collection,
            dims,
            distance = %self.distance,
            "creating collection"
        );
        let create_url = format!("{}/collections/{}", self.base_url, self.collection);
        let body = json!({
            "vectors": { "size": dims, "distance": self.distance }
        });
        let response = self
            .client
            .put(&create_url)
            .json(&body)
            .send()
            .await
            .map_err(Error::Http)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Sink(format!(
                "collection creation failed ({}): {}",
                status, body
            )));
        }

        Ok(())
    }

    /// Upsert one point per vector record. Returns the number of points
    /// written.
    #[instrument(skip(self, records), fields(count = records.len()))]
    pub async fn write_batch(&self, records: &[VectorRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let points: Vec<PointStruct> = records.iter().map(to_point).collect();

        let url = format!(
            "{}/collections/{}/points?wait=true",
            self.base_url, self.collection
        );
        let response = self
            .client
            .put(&url)
            .json(&json!({ "points": points }))
            .send()
            .await
            .map_err(Error::Http)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Sink(format!(
                "point upsert failed ({}): {}",
                status, body
            )));
        }

        Ok(points.len())
    }
}

/// Qdrant point ids must be integers or UUIDs, so the stable record id is
/// mapped through UUIDv5: deterministic, collision-resistant, and
/// re-upsertable.
pub fn point_id(record_id: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, record_id.as_bytes()).to_string()
}

fn to_point(record: &VectorRecord) -> PointStruct {
    PointStruct {
        id: point_id(&record.record_id),
        vector: record.vector.clone(),
        payload: json!({
            "record_id": record.record_id,
            "session_id": record.session_id,
            "created_at": record.created_at,
            "text_preview": record.text_preview,
            "kind": record.kind,
            "model": record.model,
            "dims": record.dims,
            "written_at": record.written_at,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::now_timestamp;
    use mockito::Server;

    fn config(url: &str) -> QdrantConfig {
        QdrantConfig {
            url: url.to_string(),
            collection: "text_vectors".to_string(),
            distance: "Cosine".to_string(),
        }
    }

    fn record(id: &str) -> VectorRecord {
        VectorRecord {
            record_id: id.to_string(),
            session_id: None,
            created_at: "2025-11-05T08:47:00.000Z".to_string(),
            text_preview: "preview".to_string(),
            kind: "note".to_string(),
            vector: vec![0.1, 0.2, 0.3],
            model: "nomic-embed-text".to_string(),
            dims: 3,
            written_at: now_timestamp(),
        }
    }

    #[test]
    fn test_point_id_is_deterministic_uuid() {
        let a = point_id("rec-1");
        let b = point_id("rec-1");
        assert_eq!(a, b);
        assert_ne!(a, point_id("rec-2"));
        assert!(Uuid::parse_str(&a).is_ok());
    }

    #[tokio::test]
    async fn test_ensure_collection_skips_existing() {
        let mut server = Server::new_async().await;
        let listing = server
            .mock("GET", "/collections")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                "{\"result\": {\"collections\": [{\"name\": \"text_vectors\"}]}, \"status\": \"ok\"}",
            )
            .expect(1)
            .create_async()
            .await;

        let sink = QdrantSink::new(&config(&server.url())).unwrap();
        sink.ensure_collection(3).await.unwrap();

        listing.assert_async().await;
    }

    #[tokio::test]
    async fn test_ensure_collection_creates_when_absent() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/collections")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body("{\"result\": {\"collections\": []}, \"status\": \"ok\"}")
            .create_async()
            .await;
        let create = server
            .mock("PUT", "/collections/text_vectors")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "vectors": { "size": 3, "distance": "Cosine" }
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body("{\"result\": true, \"status\": \"ok\"}")
            .expect(1)
            .create_async()
            .await;

        let sink = QdrantSink::new(&config(&server.url())).unwrap();
        sink.ensure_collection(3).await.unwrap();

        create.assert_async().await;
    }

    #[tokio::test]
    async fn test_write_batch_upserts_points() {
        let mut server = Server::new_async().await;
        let upsert = server
            .mock("PUT", "/collections/text_vectors/points?wait=true")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "points": [{
                    "id": point_id("rec-1"),
                    "vector": [0.1, 0.2, 0.3],
                    "payload": { "record_id": "rec-1", "kind": "note" }
                }]
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body("{\"result\": {\"status\": \"acknowledged\"}, \"status\": \"ok\"}")
            .expect(1)
            .create_async()
            .await;

        let sink = QdrantSink::new(&config(&server.url())).unwrap();
        let written = sink.write_batch(&[record("rec-1")]).await.unwrap();
        assert_eq!(written, 1);

        upsert.assert_async().await;
    }

    #[tokio::test]
    async fn test_write_batch_surfaces_endpoint_errors() {
        let mut server = Server::new_async().await;
        server
            .mock("PUT", "/collections/text_vectors/points?wait=true")
            .with_status(500)
            .with_body("storage full")
            .create_async()
            .await;

        let sink = QdrantSink::new(&config(&server.url())).unwrap();
        let result = sink.write_batch(&[record("rec-1")]).await;
        assert!(matches!(result, Err(Error::Sink(_))));
    }

    #[tokio::test]
    async fn test_write_batch_empty_is_noop() {
        let server = Server::new_async().await;
        let sink = QdrantSink::new(&config(&server.url())).unwrap();
        assert_eq!(sink.write_batch(&[]).await.unwrap(), 0);
    }
}
