use kube::runtime::events::{Event, EventType};
use kube::Resource;
use kube_runtime::events::{Recorder, Reporter};
use tracing::warn;

use crate::error::Error;

/// What a convergence step did to the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    NoOp,
    Created,
    Updated,
    Deleted,
}

impl Outcome {
    pub fn changed(self) -> bool {
        self != Outcome::NoOp
    }
}

pub fn make_reporter(instance: Option<String>) -> Reporter {
    Reporter {
        controller: "ibm-common-service-operator".into(),
        instance,
    }
}

pub async fn emit_event<K>(
    recorder: &Recorder,
    obj: &K,
    reason: &str,
    note: &str,
    event_type: EventType,
) -> Result<(), Error>
where
    K: Resource<DynamicType = ()> + std::fmt::Debug,
{
    recorder
        .publish(
            &Event {
                type_: event_type,
                reason: reason.into(),
                note: Some(note.into()),
                action: reason.into(),
                secondary: None,
            },
            &obj.object_ref(&()),
        )
        .await?;

    Ok(())
}

/// Runs `op` and records a Normal event when it changed something, or a
/// Warning event with the error text when it failed.
pub async fn with_event<E, K>(
    recorder: &Recorder,
    obj: &K,
    success_msg: &str,
    success_reason: &str,
    fail_reason: &str,
    op: impl std::future::Future<Output = Result<Outcome, E>>,
) -> Result<Outcome, E>
where
    E: std::fmt::Display,
    K: Resource<DynamicType = ()> + std::fmt::Debug,
{
    match op.await {
        Ok(outcome) => {
            if outcome.changed() {
                if let Err(e) =
                    emit_event(recorder, obj, success_reason, success_msg, EventType::Normal).await
                {
                    warn!(error = %e, reason = success_reason, "failed to publish event");
                }
            }
            Ok(outcome)
        }
        Err(e) => {
            if let Err(publish_err) =
                emit_event(recorder, obj, fail_reason, &e.to_string(), EventType::Warning).await
            {
                warn!(error = %publish_err, reason = fail_reason, "failed to publish event");
            }
            Err(e)
        }
    }
}
