//! Utilities for publishing Kubernetes events
use std::{error::Error, fmt::Write};

use kube::runtime::{
    controller,
    events::{Event, EventType, Recorder},
};

use super::controller::ReconcilerError;

/// Converts an [`Error`] into a publishable Kubernetes [`Event`]
fn error_to_event<E: ReconcilerError>(err: &E) -> Event {
    // Walk the whole error chain, so that we get all the full reason for the error
    let mut full_msg = err.to_string();
    let mut source = err.source();
    while let Some(err) = source {
        let _ = write!(full_msg, ": {err}");
        source = err.source();
    }

    Event {
        type_: EventType::Warning,
        reason: err.category().to_string(),
        note: Some(full_msg),
        action: "Reconcile".to_string(),
        secondary: err.secondary_object().map(|secondary| secondary.into()),
    }
}

/// Reports an error coming from a controller to Kubernetes
///
/// This is intended to be executed on the log entries returned by `Controller::run`
#[tracing::instrument(skip(recorder))]
pub async fn publish_controller_error_as_k8s_event<ReconcileErr, QueueErr>(
    recorder: &Recorder,
    controller_error: &controller::Error<ReconcileErr, QueueErr>,
) where
    ReconcileErr: ReconcilerError + 'static,
    QueueErr: Error + 'static,
{
    let (error, obj) = match controller_error {
        controller::Error::ReconcilerFailed(err, obj) => (err, obj),
        // Other error types are intended for the operator administrator, and aren't linked to a specific object
        _ => return,
    };

    let event = error_to_event(error);
    if let Err(err) = recorder.publish(&event, &obj.clone().into()).await {
        tracing::error!(
            error = &err as &dyn Error,
            "Failed to report error as K8s event"
        );
    }
}

#[cfg(test)]
mod tests {
    use k8s_openapi::api::core::v1::Secret;
    use kube::{core::DynamicObject, runtime::reflector::ObjectRef};
    use snafu::Snafu;
    use strum::{EnumDiscriminants, IntoStaticStr};

    use super::*;

    #[derive(Debug, Snafu, EnumDiscriminants)]
    #[strum_discriminants(derive(IntoStaticStr))]
    enum ClusterError {
        #[snafu(display("failed to build env secret"))]
        BuildEnvSecret { source: SecretError },
    }

    #[derive(Debug, Snafu)]
    enum SecretError {
        #[snafu(display("secret has no key \"password\""))]
        MissingKey { secret: ObjectRef<Secret> },
    }

    impl ClusterError {
        fn missing_password() -> Self {
            Self::BuildEnvSecret {
                source: SecretError::MissingKey {
                    secret: ObjectRef::new("redis").within("default"),
                },
            }
        }
    }

    impl ReconcilerError for ClusterError {
        fn category(&self) -> &'static str {
            ClusterErrorDiscriminants::from(self).into()
        }

        fn secondary_object(&self) -> Option<ObjectRef<DynamicObject>> {
            match self {
                Self::BuildEnvSecret {
                    source: SecretError::MissingKey { secret },
                } => Some(secret.clone().erase()),
            }
        }
    }

    #[test]
    fn event_reports_full_nested_message() {
        let event = error_to_event(&ClusterError::missing_password());
        assert_eq!(
            event.note.as_deref(),
            Some(r#"failed to build env secret: secret has no key "password""#)
        );
    }

    #[test]
    fn event_includes_secondary_object() {
        let event = error_to_event(&ClusterError::missing_password());
        let secondary = event.secondary.expect("secondary object is set");
        assert_eq!(secondary.name.as_deref(), Some("redis"));
        assert_eq!(secondary.namespace.as_deref(), Some("default"));
        assert_eq!(secondary.kind.as_deref(), Some("Secret"));
    }

    #[test]
    fn event_includes_reason_code() {
        let event = error_to_event(&ClusterError::missing_password());
        assert_eq!(event.reason, "BuildEnvSecret");
    }
}
