//! Where an authenticated user's plan tier comes from.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tonegate_core::identity::PlanTier;

#[derive(Debug, thiserror::Error)]
pub enum PlanStoreError {
    #[error("plan store unavailable: {0}")]
    Unavailable(String),
}

/// Per-user plan records, written by the billing webhook and read on every
/// authenticated request.
#[async_trait]
pub trait PlanStore: Send + Sync {
    /// `Ok(None)` when the store has no record for the user.
    async fn plan_for(&self, user_id: &str) -> Result<Option<PlanTier>, PlanStoreError>;

    async fn set_plan(&self, user_id: &str, plan: PlanTier) -> Result<(), PlanStoreError>;
}

/// Process-local plan records. Lost on restart; a deployment that needs
/// durable upgrades plugs a persistent [`PlanStore`] in instead.
#[derive(Default)]
pub struct InMemoryPlanStore {
    plans: RwLock<HashMap<String, PlanTier>>,
}

impl InMemoryPlanStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PlanStore for InMemoryPlanStore {
    async fn plan_for(&self, user_id: &str) -> Result<Option<PlanTier>, PlanStoreError> {
        Ok(self.plans.read().await.get(user_id).copied())
    }

    async fn set_plan(&self, user_id: &str, plan: PlanTier) -> Result<(), PlanStoreError> {
        self.plans.write().await.insert(user_id.to_string(), plan);
        Ok(())
    }
}

/// Resolve the effective plan: stored record, then the session's own claim,
/// then free. A store failure degrades to the claim rather than failing the
/// request.
pub async fn resolve_plan(
    store: &dyn PlanStore,
    user_id: &str,
    claimed: Option<PlanTier>,
) -> PlanTier {
    match store.plan_for(user_id).await {
        Ok(Some(plan)) => plan,
        Ok(None) => claimed.unwrap_or(PlanTier::Free),
        Err(err) => {
            tracing::warn!(user_id = %user_id, error = %err, "plan lookup failed; using session claim");
            claimed.unwrap_or(PlanTier::Free)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BrokenStore;

    #[async_trait]
    impl PlanStore for BrokenStore {
        async fn plan_for(&self, _: &str) -> Result<Option<PlanTier>, PlanStoreError> {
            Err(PlanStoreError::Unavailable("down".to_string()))
        }

        async fn set_plan(&self, _: &str, _: PlanTier) -> Result<(), PlanStoreError> {
            Err(PlanStoreError::Unavailable("down".to_string()))
        }
    }

    #[tokio::test]
    async fn stored_plan_wins_over_claim() {
        let store = InMemoryPlanStore::new();
        store
            .set_plan("user_1", PlanTier::Pro)
            .await
            .expect("in-memory write should succeed");

        assert_eq!(
            resolve_plan(&store, "user_1", Some(PlanTier::Free)).await,
            PlanTier::Pro
        );
    }

    #[tokio::test]
    async fn missing_record_falls_back_to_claim_then_free() {
        let store = InMemoryPlanStore::new();
        assert_eq!(
            resolve_plan(&store, "user_2", Some(PlanTier::Pro)).await,
            PlanTier::Pro
        );
        assert_eq!(resolve_plan(&store, "user_2", None).await, PlanTier::Free);
    }

    #[tokio::test]
    async fn store_failure_degrades_to_claim() {
        assert_eq!(
            resolve_plan(&BrokenStore, "user_3", Some(PlanTier::Pro)).await,
            PlanTier::Pro
        );
        assert_eq!(resolve_plan(&BrokenStore, "user_3", None).await, PlanTier::Free);
    }
}
