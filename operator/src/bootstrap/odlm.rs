//! ODLM lifecycle: an outdated install in the legacy namespace is removed so
//! the regular sequence can reinstall it next to the common services.

use tracing::{debug, info};

use crate::{
    cluster::{self, ClusterClient},
    config::LEGACY_OPERATORS_NAMESPACE,
    crd::{ClusterServiceVersion, Subscription},
    error::Result,
    event::Outcome,
    version::{Version, upgrade_reason},
};

pub const ODLM_SUBSCRIPTION_NAME: &str = "operand-deployment-lifecycle-manager-app";
pub const ODLM_MINIMUM_VERSION: Version = Version::new(1, 5, 0);

/// Deletes the legacy ODLM Subscription and its CSV when it needs upgrading.
pub async fn remove_outdated_odlm(client: &dyn ClusterClient) -> Result<Outcome> {
    remove_outdated(
        client,
        LEGACY_OPERATORS_NAMESPACE,
        ODLM_SUBSCRIPTION_NAME,
        ODLM_MINIMUM_VERSION,
    )
    .await
}

async fn remove_outdated(
    client: &dyn ClusterClient,
    namespace: &str,
    name: &str,
    minimum: Version,
) -> Result<Outcome> {
    let Some(sub) = cluster::get::<Subscription>(client, Some(namespace), name).await? else {
        debug!(namespace, name, "no legacy subscription");
        return Ok(Outcome::NoOp);
    };

    let Some(reason) = upgrade_reason(&sub, minimum) else {
        debug!(namespace, name, "legacy subscription is current");
        return Ok(Outcome::NoOp);
    };
    info!(namespace, name, %reason, "removing outdated operator for reinstall");

    let csv = sub.installed_csv().or(sub.current_csv());
    if let Some(csv) = csv {
        cluster::delete::<ClusterServiceVersion>(client, Some(namespace), csv).await?;
    }
    cluster::delete::<Subscription>(client, Some(namespace), name).await?;
    Ok(Outcome::Deleted)
}
