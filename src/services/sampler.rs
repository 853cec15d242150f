use rand::seq::SliceRandom;
use rand::Rng;
use std::sync::Arc;

use crate::database::QuestionCatalog;
use crate::error::{Error, Result};
use crate::models::question::PoolEntry;
use crate::models::session_question::SampledQuestion;

#[derive(Clone)]
pub struct QuestionSampler {
    catalog: Arc<dyn QuestionCatalog>,
}

impl QuestionSampler {
    pub fn new(catalog: Arc<dyn QuestionCatalog>) -> Self {
        Self { catalog }
    }

    pub async fn sample(
        &self,
        subject_id: i64,
        level_id: i64,
        topic_id: Option<i64>,
        count: usize,
    ) -> Result<Vec<SampledQuestion>> {
        let pool = self.catalog.pool_for(subject_id, level_id, topic_id).await?;
        tracing::debug!(subject_id, level_id, pool_size = pool.len(), count, "sampling questions");
        let mut rng = rand::thread_rng();
        draw(pool, count, &mut rng)
    }
}

/// Draws `count` distinct entries uniformly without replacement and numbers
/// them 1..=count in draw order.
pub fn draw<R: Rng + ?Sized>(
    mut pool: Vec<PoolEntry>,
    count: usize,
    rng: &mut R,
) -> Result<Vec<SampledQuestion>> {
    if count == 0 {
        return Err(Error::InvalidInput("Question count must be at least 1".to_string()));
    }
    pool.sort_by_key(|e| e.question_id);
    pool.dedup_by_key(|e| e.question_id);
    if pool.len() < count {
        return Err(Error::InsufficientPool {
            requested: count,
            available: pool.len(),
        });
    }

    let (chosen, _) = pool.partial_shuffle(rng, count);
    Ok(chosen
        .iter()
        .enumerate()
        .map(|(idx, entry)| SampledQuestion {
            sequence: idx as i32 + 1,
            question_id: entry.question_id,
            kind: entry.kind,
        })
        .collect())
}
