//! Sink writers
//!
//! Fan-out of a batch of vector records to the configured targets. The two
//! sinks are independent: a failure in one is logged and does not block the
//! other, and neither outcome feeds back into processed-marking; that is
//! governed by embedding success alone.

mod relational;
mod vector;

pub use relational::RelationalSink;
pub use vector::{point_id, QdrantSink};

use tracing::warn;

use crate::store::VectorRecord;

/// Counts of records accepted per target in one write.
#[derive(Debug, Default, Clone, Copy)]
pub struct SinkWriteReport {
    /// Rows submitted to the relational projection
    pub relational: usize,

    /// Points upserted into the vector collection
    pub vector: usize,
}

/// Dispatcher over the configured sink targets.
pub struct SinkWriter {
    relational: Option<RelationalSink>,
    vector: Option<QdrantSink>,
}

impl SinkWriter {
    /// Build a writer from the sinks that survived initialization.
    pub fn new(relational: Option<RelationalSink>, vector: Option<QdrantSink>) -> Self {
        Self { relational, vector }
    }

    /// Write a batch of successes to every configured target. Failures are
    /// logged per sink and swallowed; the report carries what landed.
    pub async fn write_batch(&self, records: &[VectorRecord]) -> SinkWriteReport {
        let mut report = SinkWriteReport::default();
        if records.is_empty() {
            return report;
        }

        if let Some(sink) = &self.relational {
            match sink.write_batch(records).await {
                Ok(written) => report.relational = written,
                Err(e) => warn!(error = %e, "relational sink write failed"),
            }
        }

        if let Some(sink) = &self.vector {
            match sink.write_batch(records).await {
                Ok(written) => report.vector = written,
                Err(e) => warn!(error = %e, "vector sink write failed"),
            }
        }

        report
    }
}
