//! Read-only listings of GPU types and pod templates.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::providers::runpod::models::{GpuTypesData, MyselfData, PodTemplatesField};
use crate::providers::runpod::operations::{GPU_TYPES, POD_TEMPLATES};
use crate::providers::runpod::execute;
use crate::providers::traits::{PodError, Transport};

/// A GPU type with its hourly prices.
///
/// Prices the provider omits stay `None`; they are never coerced to zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpuType {
    /// GPU type ID (e.g., "NVIDIA A40"), used when creating pods.
    pub id: String,
    pub display_name: String,
    pub memory_gb: u32,
    pub secure_price_per_hr: Option<f64>,
    pub community_price_per_hr: Option<f64>,
    pub secure_spot_price_per_hr: Option<f64>,
    pub community_spot_price_per_hr: Option<f64>,
}

/// A pod template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub id: String,
    pub name: String,
    pub image_name: String,
    pub is_public: bool,
}

/// GPU type and template listings.
#[derive(Clone)]
pub struct Catalog {
    transport: Arc<dyn Transport>,
}

impl Catalog {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// List every GPU type with its prices.
    ///
    /// # Errors
    /// [`PodError::ProviderRejected`] on a malformed response,
    /// [`PodError::TransportFailure`] when the call fails.
    pub async fn list_gpu_types(&self) -> Result<Vec<GpuType>, PodError> {
        let data: GpuTypesData = execute(self.transport.as_ref(), &GPU_TYPES, json!({})).await?;
        debug!(count = data.gpu_types.len(), "Listed GPU types");
        Ok(data.gpu_types.into_iter().map(GpuType::from).collect())
    }

    /// IDs of every GPU type.
    ///
    /// # Errors
    /// Same as [`Catalog::list_gpu_types`].
    pub async fn gpu_type_ids(&self) -> Result<Vec<String>, PodError> {
        Ok(self
            .list_gpu_types()
            .await?
            .into_iter()
            .map(|gpu| gpu.id)
            .collect())
    }

    /// List the caller's pod templates.
    ///
    /// # Errors
    /// Same as [`Catalog::list_gpu_types`].
    pub async fn list_templates(&self) -> Result<Vec<Template>, PodError> {
        let data: MyselfData<PodTemplatesField> =
            execute(self.transport.as_ref(), &POD_TEMPLATES, json!({})).await?;
        debug!(count = data.myself.pod_templates.len(), "Listed pod templates");
        Ok(data
            .myself
            .pod_templates
            .into_iter()
            .map(Template::from)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::traits::{MockTransport, TransportError};

    fn catalog_returning(body: serde_json::Value) -> Catalog {
        let mut transport = MockTransport::new();
        transport
            .expect_send()
            .times(1)
            .returning(move |_, _, _| Ok(body.clone()));
        Catalog::new(Arc::new(transport))
    }

    #[tokio::test]
    async fn test_null_price_stays_none() {
        let catalog = catalog_returning(json!({
            "data": {
                "gpuTypes": [{
                    "id": "NVIDIA A40",
                    "displayName": "A40",
                    "memoryInGb": 48,
                    "securePrice": null,
                    "communityPrice": 0.35,
                    "secureSpotPrice": null,
                    "communitySpotPrice": null
                }]
            }
        }));

        let gpus = catalog.list_gpu_types().await.unwrap();
        assert_eq!(gpus.len(), 1);
        assert_eq!(gpus[0].id, "NVIDIA A40");
        assert_eq!(gpus[0].memory_gb, 48);
        assert_eq!(gpus[0].secure_price_per_hr, None);
        assert_eq!(gpus[0].community_price_per_hr, Some(0.35));
    }

    #[tokio::test]
    async fn test_omitted_price_stays_none() {
        let catalog = catalog_returning(json!({
            "data": { "gpuTypes": [{ "id": "NVIDIA A40", "displayName": "A40", "memoryInGb": 48 }] }
        }));

        let gpus = catalog.list_gpu_types().await.unwrap();
        assert_eq!(gpus[0].secure_price_per_hr, None);
        assert_eq!(gpus[0].community_spot_price_per_hr, None);
    }

    #[tokio::test]
    async fn test_gpu_type_ids() {
        let catalog = catalog_returning(json!({
            "data": { "gpuTypes": [
                { "id": "NVIDIA A40", "displayName": "A40", "memoryInGb": 48 },
                { "id": "NVIDIA H100 80GB HBM3", "displayName": "H100 SXM", "memoryInGb": 80 }
            ] }
        }));

        assert_eq!(
            catalog.gpu_type_ids().await.unwrap(),
            vec!["NVIDIA A40", "NVIDIA H100 80GB HBM3"]
        );
    }

    #[tokio::test]
    async fn test_malformed_gpu_types_rejected() {
        let catalog = catalog_returning(json!({ "data": { "gpuTypes": "nope" } }));
        let err = catalog.list_gpu_types().await.unwrap_err();
        assert!(matches!(err, PodError::ProviderRejected { .. }));
    }

    #[tokio::test]
    async fn test_list_templates() {
        let catalog = catalog_returning(json!({
            "data": { "myself": { "podTemplates": [{
                "id": "w0vokfjnj6",
                "name": "vital-llm-reasoner-server",
                "imageName": "vitalai/reasoner:latest",
                "isPublic": false
            }] } }
        }));

        let templates = catalog.list_templates().await.unwrap();
        assert_eq!(
            templates,
            vec![Template {
                id: "w0vokfjnj6".to_string(),
                name: "vital-llm-reasoner-server".to_string(),
                image_name: "vitalai/reasoner:latest".to_string(),
                is_public: false,
            }]
        );
    }

    #[tokio::test]
    async fn test_transport_failure_propagates() {
        let mut transport = MockTransport::new();
        transport.expect_send().times(1).returning(|_, _, _| {
            Err(TransportError::Status {
                status: 401,
                body: "Unauthorized".to_string(),
            })
        });
        let catalog = Catalog::new(Arc::new(transport));

        let err = catalog.list_templates().await.unwrap_err();
        match err {
            PodError::TransportFailure { operation, source } => {
                assert_eq!(operation, "PodTemplates");
                assert!(source.to_string().contains("401"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
