//! Pod status probe.
//!
//! A stateless read-only query against the Kubernetes API, used as an
//! optional pre-flight check: a pod that is clearly not running fails fast
//! with [`ProbeError::PodNotReady`] instead of wasting a tunnel attempt.
//!
//! # Prerequisites
//!
//! - Valid kubeconfig (uses the default context)
//! - RBAC permission to read pods in the target namespace

use k8s_openapi::api::core::v1::Pod;
use kube::{
    Client, Config,
    api::Api,
};
use serde::{Deserialize, Serialize};

/// Error type for pod status queries.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("failed to create Kubernetes client: {0}")]
    ClientCreation(kube::Error),

    #[error("failed to infer Kubernetes config: {0}")]
    ConfigError(#[from] kube::config::InferConfigError),

    #[error("pod {namespace}/{pod} not found: {message}")]
    PodNotFound {
        namespace: String,
        pod: String,
        message: String,
    },

    #[error("failed to query pod {namespace}/{pod}: {source}")]
    Query {
        namespace: String,
        pod: String,
        #[source]
        source: kube::Error,
    },

    #[error("pod {namespace}/{pod} is not ready (phase: {phase})")]
    PodNotReady {
        namespace: String,
        pod: String,
        phase: String,
    },
}

/// Distinguish a pod that does not exist from auth, RBAC, and transport
/// failures: only an API-level 404 means not-found.
fn classify_get_error(namespace: &str, pod: &str, err: kube::Error) -> ProbeError {
    match err {
        kube::Error::Api(response) if response.code == 404 => ProbeError::PodNotFound {
            namespace: namespace.to_string(),
            pod: pod.to_string(),
            message: response.message,
        },
        other => ProbeError::Query {
            namespace: namespace.to_string(),
            pod: pod.to_string(),
            source: other,
        },
    }
}

/// One pod condition, mirrored from the API object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodConditionStatus {
    pub kind: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Snapshot of a pod's readiness.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodStatus {
    pub namespace: String,
    pub pod_name: String,
    pub phase: String,
    pub ready: bool,
    pub restart_count: i32,
    pub conditions: Vec<PodConditionStatus>,
}

impl PodStatus {
    pub fn is_running(&self) -> bool {
        self.phase == "Running" && self.ready
    }
}

/// Read-only Kubernetes client for pod status.
pub struct PodStatusProbe {
    client: Client,
}

impl PodStatusProbe {
    /// Create a probe using the default kubeconfig.
    pub async fn new() -> Result<Self, ProbeError> {
        let config = Config::infer().await?;
        let client = Client::try_from(config).map_err(ProbeError::ClientCreation)?;
        Ok(Self { client })
    }

    /// Fetch the pod's phase, readiness, restart count, and conditions.
    pub async fn status(&self, namespace: &str, pod_name: &str) -> Result<PodStatus, ProbeError> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let pod = pods
            .get(pod_name)
            .await
            .map_err(|e| classify_get_error(namespace, pod_name, e))?;

        let status = pod.status.unwrap_or_default();
        let phase = status.phase.unwrap_or_else(|| "Unknown".to_string());

        let conditions: Vec<PodConditionStatus> = status
            .conditions
            .unwrap_or_default()
            .into_iter()
            .map(|c| PodConditionStatus {
                kind: c.type_,
                status: c.status,
                reason: c.reason,
                message: c.message,
            })
            .collect();

        let ready = conditions
            .iter()
            .any(|c| c.kind == "Ready" && c.status == "True");

        let restart_count = status
            .container_statuses
            .unwrap_or_default()
            .iter()
            .map(|c| c.restart_count)
            .sum();

        Ok(PodStatus {
            namespace: namespace.to_string(),
            pod_name: pod_name.to_string(),
            phase,
            ready,
            restart_count,
            conditions,
        })
    }

    /// Pre-flight check: error unless the pod is Running and Ready.
    pub async fn ensure_running(
        &self,
        namespace: &str,
        pod_name: &str,
    ) -> Result<PodStatus, ProbeError> {
        let status = self.status(namespace, pod_name).await?;
        if !status.is_running() {
            return Err(ProbeError::PodNotReady {
                namespace: namespace.to_string(),
                pod: pod_name.to_string(),
                phase: status.phase,
            });
        }
        Ok(status)
    }
}
