//! The reconciler hierarchy.
//!
//! A reconciliation pass walks a tree of [`Reconciler`]s. The leaves are
//! [`ResourceReconciler`]s, which build one object and write it through the
//! [`ResourceClient`](crate::client::ResourceClient). Inner nodes are [`ReconcilerGroup`]s, which
//! run their children in registration order and stop at the first child asking for a requeue.
//!
//! Every call returns a [`ReconcileAction`]. An `Err` means the pass failed and should be retried
//! by the controller, [`ReconcileAction::Requeue`] means the pass made progress but has not
//! settled yet.
use std::time::Duration;

use async_trait::async_trait;

use crate::client::{self, ManagedResource};

pub mod group;
pub mod resource;
pub mod workload;

pub use group::ReconcilerGroup;
pub use resource::ResourceReconciler;
pub use workload::{Workload, WorkloadReconciler};

/// Delay after an object was written, before the next pass observes it.
pub const MUTATED_REQUEUE_DELAY: Duration = Duration::from_secs(1);

/// Delay between readiness checks of a workload that has not converged yet.
pub const NOT_READY_REQUEUE_DELAY: Duration = Duration::from_secs(5);

/// The outcome of one [`Reconciler`] call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReconcileAction {
    /// Nothing left to do, continue with the next reconciler.
    Continue,

    /// Stop the pass and run it again after the given delay.
    Requeue(Duration),
}

impl ReconcileAction {
    pub fn is_requeue(&self) -> bool {
        matches!(self, Self::Requeue(_))
    }
}

/// Something that drives a part of the cluster towards its desired state.
#[async_trait]
pub trait Reconciler: Send + Sync {
    type Error: std::error::Error + From<client::Error> + Send + Sync + 'static;

    /// A human readable identifier used in logs.
    fn name(&self) -> String;

    async fn reconcile(&self) -> Result<ReconcileAction, Self::Error>;

    /// Checks whether the objects written by [`Reconciler::reconcile`] are ready.
    async fn ready(&self) -> Result<ReconcileAction, Self::Error> {
        Ok(ReconcileAction::Continue)
    }
}

/// Assembles the desired state of exactly one object.
///
/// Building must not write anything. Reads needed for templating, like resolving a referenced
/// secret, are allowed and their failures are build errors.
#[async_trait]
pub trait ResourceBuilder: Send + Sync {
    type Resource: ManagedResource;
    type Error: std::error::Error + From<client::Error> + Send + Sync + 'static;

    /// The name of the object this builder produces.
    fn name(&self) -> String;

    async fn build(&self) -> Result<Self::Resource, Self::Error>;
}
