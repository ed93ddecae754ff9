//! One collection pass over all active domains
//!
//! Domains are processed sequentially. A domain that cannot be resolved or
//! whose core info is unreadable is skipped; a failed sink write is logged.
//! Neither stops the rest of the pass.
//!
//! Hypervisor calls run on the blocking pool; only sink writes run on the
//! async executor.

use super::extractor::MetricExtractor;
use crate::error::{ExtractionError, HypervisorError};
use crate::hypervisor::Hypervisor;
use crate::models::MetricRecord;
use crate::sink::{MetricSink, SeriesKey};
use std::sync::Arc;
use thiserror::Error;
use tokio::task::{self, JoinError};
use tracing::{info, warn};

/// Outcome of one collection pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CollectionResults {
    /// Active domain IDs reported by the hypervisor
    pub domains_seen: usize,
    /// Records built and handed to the sink
    pub collected: usize,
    /// Domains dropped by lookup or extraction failure
    pub skipped: usize,
    /// Sink writes that failed
    pub push_failures: usize,
}

impl CollectionResults {
    pub fn is_clean(&self) -> bool {
        self.skipped == 0 && self.push_failures == 0
    }
}

#[derive(Debug, Error)]
enum DomainFailure {
    #[error(transparent)]
    Lookup(HypervisorError),
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    #[error("extraction task failed: {0}")]
    Aborted(#[from] JoinError),
}

/// Enumerates active domains and forwards one record per domain to a sink
#[derive(Debug, Clone, Default)]
pub struct BatchCollector {
    extractor: MetricExtractor,
}

impl BatchCollector {
    pub fn new(extractor: MetricExtractor) -> Self {
        Self { extractor }
    }

    /// Run one pass.
    ///
    /// Returns `Err` only when the active domains cannot be listed. Nothing
    /// is retried here; the next scheduled pass tries again.
    ///
    /// After a pass that skipped no domain, the sink is told which series
    /// are still live so it can drop the rest.
    pub async fn collect(
        &self,
        hypervisor: Arc<dyn Hypervisor>,
        sink: &dyn MetricSink,
    ) -> Result<CollectionResults, HypervisorError> {
        let ids = {
            let hypervisor = Arc::clone(&hypervisor);
            task::spawn_blocking(move || hypervisor.list_active_domain_ids())
                .await
                .map_err(|e| HypervisorError::Enumeration(e.to_string()))??
        };
        let mut results = CollectionResults {
            domains_seen: ids.len(),
            ..Default::default()
        };

        if ids.is_empty() {
            warn!("No active domains");
            return Ok(results);
        }

        let mut live: Vec<SeriesKey> = Vec::with_capacity(ids.len());

        for id in ids {
            let record = match self.extract(&hypervisor, id).await {
                Ok(record) => record,
                Err(e) => {
                    results.skipped += 1;
                    warn!(domain_id = id, error = %e, "Skipping domain");
                    continue;
                }
            };

            results.collected += 1;
            live.push((record.vm_name.clone(), record.vm_uuid.clone()));

            if let Err(e) = sink.write(&record).await {
                results.push_failures += 1;
                warn!(
                    domain_id = id,
                    vm_name = %record.vm_name,
                    error = %e,
                    "Failed to write metrics to sink"
                );
            }
        }

        if results.skipped == 0 {
            if let Err(e) = sink.retain(&live).await {
                results.push_failures += 1;
                warn!(error = %e, "Failed to drop series for inactive domains");
            }
        }

        info!(
            domains = results.domains_seen,
            collected = results.collected,
            skipped = results.skipped,
            push_failures = results.push_failures,
            "Collection pass complete"
        );

        Ok(results)
    }

    /// Resolve and extract a single domain on the blocking pool. The handle
    /// is released before the record reaches the sink.
    async fn extract(
        &self,
        hypervisor: &Arc<dyn Hypervisor>,
        id: u32,
    ) -> Result<MetricRecord, DomainFailure> {
        let extractor = self.extractor.clone();
        let hypervisor = Arc::clone(hypervisor);

        task::spawn_blocking(move || -> Result<MetricRecord, DomainFailure> {
            let domain = hypervisor.lookup_domain(id).map_err(DomainFailure::Lookup)?;
            Ok(extractor.build(domain.as_ref())?)
        })
        .await?
    }
}
