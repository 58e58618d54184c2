//! # CRD registration
//!
//! Installs the CustomResourceDefinition for a resource kind and waits for
//! the API server to start serving it.

use crate::error::{ClientError, ClientResult};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Api, PostParams};
use kube::runtime::wait::{await_condition, conditions};
use kube::Client;
use kube_crd_resources::{crd_name, ResourceKind};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::info;

/// Default time allowed for a new CRD to become established
pub const DEFAULT_ESTABLISH_TIMEOUT: Duration = Duration::from_secs(30);

pub struct CrdRegistrar {
    client: Client,
}

impl CrdRegistrar {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Install the CRD for `K` unless present, then wait until it is
    /// established or `timeout` elapses.
    pub async fn ensure<K: ResourceKind>(&self, timeout: Duration) -> ClientResult<()> {
        let name = crd_name::<K>();
        let crds: Api<CustomResourceDefinition> = Api::all(self.client.clone());

        let created = crds.create(&PostParams::default(), &K::crd()).await;
        accept_existing(created, &name)?;

        let established = await_condition(crds, &name, conditions::is_crd_established());
        await_established(established, name.clone(), timeout).await
    }
}

/// A CRD that already exists counts as installed
fn accept_existing<T>(created: kube::Result<T>, name: &str) -> ClientResult<()> {
    match created {
        Ok(_) => info!("Installing CRD {}", name),
        Err(e) => {
            let err = ClientError::from_kube(e, "CustomResourceDefinition", name);
            if !err.is_already_exists() {
                return Err(err);
            }
            info!("CRD {} already exists", name);
        }
    }
    Ok(())
}

async fn await_established<F, T, E>(
    established: F,
    name: String,
    timeout: Duration,
) -> ClientResult<()>
where
    F: Future<Output = Result<T, E>>,
    E: Display,
{
    match tokio::time::timeout(timeout, established).await {
        Ok(Ok(_)) => {
            info!("CRD {} established", name);
            Ok(())
        }
        Ok(Err(e)) => Err(ClientError::Registration(format!("{name}: {e}"))),
        Err(_) => Err(ClientError::RegistrationTimeout { name, timeout }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::ErrorResponse;

    fn api_error(code: u16, reason: &str) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: format!("{reason} happened"),
            reason: reason.to_string(),
            code,
        })
    }

    #[test]
    fn test_existing_crd_is_accepted() {
        assert!(accept_existing(Ok(()), "examples.myorg.io").is_ok());
        assert!(accept_existing::<()>(Err(api_error(409, "AlreadyExists")), "examples.myorg.io")
            .is_ok());

        let denied = accept_existing::<()>(Err(api_error(403, "Forbidden")), "examples.myorg.io");
        assert!(matches!(denied, Err(ClientError::Kube(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_establish_times_out() {
        let never = std::future::pending::<Result<(), String>>();
        let err = await_established(never, "examples.myorg.io".to_string(), Duration::from_secs(5))
            .await
            .unwrap_err();

        match err {
            ClientError::RegistrationTimeout { name, timeout } => {
                assert_eq!(name, "examples.myorg.io");
                assert_eq!(timeout, Duration::from_secs(5));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_establish_outcomes() {
        let name = "examples.myorg.io".to_string();
        let ok = async { Ok::<_, String>(()) };
        assert!(await_established(ok, name.clone(), DEFAULT_ESTABLISH_TIMEOUT).await.is_ok());

        let failed = async { Err::<(), _>("watch closed".to_string()) };
        let err = await_established(failed, name, DEFAULT_ESTABLISH_TIMEOUT)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "CRD registration failed: examples.myorg.io: watch closed");
    }
}
