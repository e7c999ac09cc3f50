use async_trait::async_trait;
use tracing::{debug, instrument};

use super::{MUTATED_REQUEUE_DELAY, ReconcileAction, Reconciler, ResourceBuilder};
use crate::client::ResourceClient;

/// Builds one object and creates or updates it.
pub struct ResourceReconciler<B> {
    client: ResourceClient,
    builder: B,
}

impl<B: ResourceBuilder> ResourceReconciler<B> {
    pub fn new(client: ResourceClient, builder: B) -> Self {
        Self { client, builder }
    }

    pub fn client(&self) -> &ResourceClient {
        &self.client
    }

    pub fn builder(&self) -> &B {
        &self.builder
    }

    /// Writes an already built `resource`, requeueing shortly if anything changed.
    pub async fn apply(&self, resource: B::Resource) -> Result<ReconcileAction, B::Error> {
        let mutated = self.client.create_or_update(resource).await?;
        Ok(mutation_action(mutated))
    }
}

/// `Requeue` after a write, so the next pass sees the stored object.
pub(crate) fn mutation_action(mutated: bool) -> ReconcileAction {
    if mutated {
        ReconcileAction::Requeue(MUTATED_REQUEUE_DELAY)
    } else {
        ReconcileAction::Continue
    }
}

#[async_trait]
impl<B: ResourceBuilder> Reconciler for ResourceReconciler<B> {
    type Error = B::Error;

    fn name(&self) -> String {
        self.builder.name()
    }

    #[instrument(skip(self), fields(name = self.builder.name()))]
    async fn reconcile(&self) -> Result<ReconcileAction, Self::Error> {
        let resource = self.builder.build().await?;
        let action = self.apply(resource).await?;
        debug!(?action, "reconciled resource");
        Ok(action)
    }
}
