use async_trait::async_trait;
use tracing::{debug, instrument};

use super::{ReconcileAction, Reconciler};

/// Runs child reconcilers in registration order.
///
/// Both [`Reconciler::reconcile`] and [`Reconciler::ready`] stop at the first child returning an
/// error or a requeue, so later children only run once everything they depend on is settled.
pub struct ReconcilerGroup<E> {
    name: String,
    reconcilers: Vec<Box<dyn Reconciler<Error = E>>>,
}

impl<E> ReconcilerGroup<E>
where
    E: std::error::Error + From<crate::client::Error> + Send + Sync + 'static,
{
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reconcilers: Vec::new(),
        }
    }

    pub fn register(&mut self, reconciler: impl Reconciler<Error = E> + 'static) -> &mut Self {
        self.reconcilers.push(Box::new(reconciler));
        self
    }

    /// The names of the registered reconcilers, in order.
    pub fn names(&self) -> Vec<String> {
        self.reconcilers.iter().map(|r| r.name()).collect()
    }
}

#[async_trait]
impl<E> Reconciler for ReconcilerGroup<E>
where
    E: std::error::Error + From<crate::client::Error> + Send + Sync + 'static,
{
    type Error = E;

    fn name(&self) -> String {
        self.name.clone()
    }

    #[instrument(skip(self), fields(name = self.name))]
    async fn reconcile(&self) -> Result<ReconcileAction, E> {
        for reconciler in &self.reconcilers {
            let action = reconciler.reconcile().await?;
            if action.is_requeue() {
                debug!(child = reconciler.name(), ?action, "stopping reconciliation early");
                return Ok(action);
            }
        }
        Ok(ReconcileAction::Continue)
    }

    #[instrument(skip(self), fields(name = self.name))]
    async fn ready(&self) -> Result<ReconcileAction, E> {
        for reconciler in &self.reconcilers {
            let action = reconciler.ready().await?;
            if action.is_requeue() {
                return Ok(action);
            }
        }
        Ok(ReconcileAction::Continue)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{Arc, Mutex},
        time::Duration,
    };

    use snafu::Snafu;

    use super::*;

    #[derive(Debug, Snafu)]
    enum TestError {
        #[snafu(display("boom"))]
        Boom,

        #[snafu(context(false))]
        Client { source: crate::client::Error },
    }

    struct Recording {
        name: &'static str,
        outcome: Option<ReconcileAction>,
        calls: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl Reconciler for Recording {
        type Error = TestError;

        fn name(&self) -> String {
            self.name.to_string()
        }

        async fn reconcile(&self) -> Result<ReconcileAction, TestError> {
            self.calls.lock().expect("lock is not poisoned").push(self.name);
            self.outcome.ok_or(TestError::Boom)
        }

        async fn ready(&self) -> Result<ReconcileAction, TestError> {
            self.reconcile().await
        }
    }

    fn group(
        outcomes: &[(&'static str, Option<ReconcileAction>)],
    ) -> (ReconcilerGroup<TestError>, Arc<Mutex<Vec<&'static str>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut group = ReconcilerGroup::new("cluster");
        for (name, outcome) in outcomes {
            group.register(Recording {
                name: *name,
                outcome: *outcome,
                calls: Arc::clone(&calls),
            });
        }
        (group, calls)
    }

    #[tokio::test]
    async fn runs_all_children_in_order() {
        let (group, calls) = group(&[
            ("env", Some(ReconcileAction::Continue)),
            ("config", Some(ReconcileAction::Continue)),
            ("node", Some(ReconcileAction::Continue)),
        ]);

        let action = group.reconcile().await.expect("no child fails");

        assert_eq!(action, ReconcileAction::Continue);
        assert_eq!(*calls.lock().expect("lock"), vec!["env", "config", "node"]);
        assert_eq!(group.names(), vec!["env", "config", "node"]);
    }

    #[tokio::test]
    async fn stops_at_first_requeue() {
        let requeue = ReconcileAction::Requeue(Duration::from_secs(1));
        let (group, calls) = group(&[
            ("env", Some(ReconcileAction::Continue)),
            ("config", Some(requeue)),
            ("node", Some(ReconcileAction::Continue)),
        ]);

        let action = group.reconcile().await.expect("no child fails");

        assert_eq!(action, requeue);
        assert_eq!(*calls.lock().expect("lock"), vec!["env", "config"]);
    }

    #[tokio::test]
    async fn stops_at_first_error() {
        let (group, calls) = group(&[
            ("env", None),
            ("config", Some(ReconcileAction::Continue)),
        ]);

        assert!(group.ready().await.is_err());
        assert_eq!(*calls.lock().expect("lock"), vec!["env"]);
    }

    #[tokio::test]
    async fn nested_groups_propagate_requeue() {
        let requeue = ReconcileAction::Requeue(Duration::from_secs(5));
        let (inner, calls) = group(&[("node-default", Some(requeue))]);
        let mut outer = ReconcilerGroup::new("superset");
        outer.register(inner);

        assert_eq!(outer.ready().await.expect("no child fails"), requeue);
        assert_eq!(*calls.lock().expect("lock"), vec!["node-default"]);
    }
}
