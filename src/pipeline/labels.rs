//! Stage 5: per-ingredient label excerpts, fanned out with a bound.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt};
use futures_util::stream::{self, StreamExt};

use super::error::PipelineError;
use super::traits::LabelSearch;
use crate::models::{FailurePolicy, IngredientName, LabelExcerpt};

/// Labels for one mention plus any failures absorbed under `Degrade`.
#[derive(Debug, Default)]
pub struct LabelFetch {
    pub labels: BTreeMap<IngredientName, Vec<LabelExcerpt>>,
    pub failures: Vec<PipelineError>,
}

pub struct LabelEnricher {
    search: Arc<dyn LabelSearch>,
    max_concurrent: usize,
}

impl LabelEnricher {
    pub fn new(search: Arc<dyn LabelSearch>, max_concurrent: usize) -> Self {
        Self {
            search,
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// At most `cap` excerpts. "Not found" is an empty success.
    pub async fn fetch(
        &self,
        ingredient: &IngredientName,
        cap: usize,
    ) -> Result<Vec<LabelExcerpt>, PipelineError> {
        match self.search.search(ingredient.as_str(), cap).await {
            Ok(mut excerpts) => {
                excerpts.truncate(cap);
                Ok(excerpts)
            }
            Err(err) if err.is_not_found() => {
                tracing::debug!(%ingredient, "No label entry");
                Ok(Vec::new())
            }
            Err(source) => Err(PipelineError::LabelLookupFailed {
                ingredient: ingredient.clone(),
                source,
            }),
        }
    }

    /// Fetch every ingredient concurrently.
    ///
    /// Under `Abort` the first failure to complete is returned and the
    /// remaining lookups are dropped. Under `Degrade` a failed ingredient
    /// maps to `[]` and the error is collected.
    pub async fn fetch_all(
        &self,
        ingredients: &[IngredientName],
        cap: usize,
        policy: FailurePolicy,
    ) -> Result<LabelFetch, PipelineError> {
        let tasks: Vec<BoxFuture<'_, (&IngredientName, Result<Vec<LabelExcerpt>, PipelineError>)>> =
            ingredients
                .iter()
                .map(|ingredient| async move { (ingredient, self.fetch(ingredient, cap).await) }.boxed())
                .collect();
        let mut pending = stream::iter(tasks).buffer_unordered(self.max_concurrent);

        let mut out = LabelFetch::default();
        while let Some((ingredient, result)) = pending.next().await {
            match result {
                Ok(excerpts) => {
                    out.labels.insert(ingredient.clone(), excerpts);
                }
                Err(err) => match policy {
                    FailurePolicy::Abort => return Err(err),
                    FailurePolicy::Degrade => {
                        out.labels.insert(ingredient.clone(), Vec::new());
                        out.failures.push(err);
                    }
                },
            }
        }
        Ok(out)
    }
}
