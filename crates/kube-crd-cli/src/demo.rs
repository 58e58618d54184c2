//! One create, list, get and status update pass over a resource kind.

use kube::ResourceExt;
use kube_crd_client::{ClientResult, ListOptions, ResourceClient, ResourceKind};
use kube_crd_resources::kind_name;
use tracing::info;

/// Create `sample` (an existing object of that name is reused), list the
/// namespace, fetch the object back, apply `touch` to its status and write
/// the status. Returns the stored result of the update.
pub async fn exercise<K, F>(client: &ResourceClient<K>, sample: K, touch: F) -> ClientResult<K>
where
    K: ResourceKind,
    F: FnOnce(&mut K),
{
    let kind = kind_name::<K>();
    let name = sample.name_any();

    match client.create(&sample).await {
        Ok(created) => info!("Created {}: {}", kind, created.summary()),
        Err(e) if e.is_already_exists() => info!("{} {} already exists", kind, name),
        Err(e) => return Err(e),
    }

    let listed = client.list(&ListOptions::default()).await?;
    info!(
        "Listed {} {} object(s) in {}: {:?}",
        listed.len(),
        kind,
        client.namespace(),
        listed.names()
    );

    let mut current = client.get(&name).await?;
    info!("Fetched {}: {}", kind, current.summary());

    touch(&mut current);
    let updated = client.update_status(&current).await?;
    info!("Updated status of {}: {}", kind, updated.summary());

    Ok(updated)
}
