mod threshold;

use std::sync::Arc;

use anyhow::Result;
use time::OffsetDateTime;
use tracing::{debug, instrument};

use crate::content::{ContentItem, EVALUATED_KINDS};
use crate::error::StaleError;
use crate::storage::Storage;

pub use self::threshold::*;

/// Finds published posts and pages older than a threshold.
///
/// Every call queries the repository afresh; results are never cached.
#[derive(Clone)]
pub struct StalenessEvaluator {
    storage: Arc<Storage>,
}

impl StalenessEvaluator {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    pub async fn evaluate(&self, threshold: Threshold) -> Result<Vec<ContentItem>, StaleError> {
        self.evaluate_at(threshold, OffsetDateTime::now_utc()).await
    }

    #[instrument(level = "DEBUG", skip(self, threshold), fields(%threshold))]
    pub async fn evaluate_at(
        &self,
        threshold: Threshold,
        now: OffsetDateTime,
    ) -> Result<Vec<ContentItem>, StaleError> {
        let cutoff = threshold.cutoff(now)?;

        let items = async {
            let mut tx = self.storage.begin().await?;
            let items = tx.get_published_before(EVALUATED_KINDS, cutoff).await?;
            tx.commit().await?;

            Result::<_>::Ok(items)
        }
        .await
        .map_err(StaleError::RepositoryUnavailable)?;

        debug!(%cutoff, count = items.len(), "Evaluated stale content");

        Ok(items)
    }
}
