//! HTTP transport tests against a local GraphQL stand-in.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockBuilder, MockServer, ResponseTemplate};

use cluster_mgr::runpod::RunPod;
use cluster_mgr::{
    Catalog, LifecycleController, PodError, PodSpec, PodState, Transport, TransportError,
};

const API_KEY: &str = "rpa_TEST";

fn transport(server: &MockServer) -> RunPod {
    RunPod::with_endpoint(
        API_KEY,
        format!("{}/graphql", server.uri()),
        Duration::from_secs(5),
    )
    .unwrap()
}

fn graphql(operation: &str) -> MockBuilder {
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(header("Authorization", "Bearer rpa_TEST"))
        .and(body_partial_json(json!({ "operationName": operation })))
}

#[tokio::test]
async fn test_request_carries_bearer_and_operation() {
    let server = MockServer::start().await;
    graphql("GpuTypes")
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "gpuTypes": [{
                "id": "NVIDIA A40",
                "displayName": "A40",
                "memoryInGb": 48,
                "securePrice": 0.79,
                "communityPrice": null
            }] }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let catalog = Catalog::new(Arc::new(transport(&server)));
    let gpus = catalog.list_gpu_types().await.unwrap();

    assert_eq!(gpus[0].secure_price_per_hr, Some(0.79));
    assert_eq!(gpus[0].community_price_per_hr, None);
}

#[tokio::test]
async fn test_variables_are_wrapped_in_input() {
    let server = MockServer::start().await;
    graphql("StopPod")
        .and(body_partial_json(json!({ "variables": { "input": { "podId": "pod-1" } } })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "podStop": { "id": "pod-1", "desiredStatus": "EXITED" } }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let controller = LifecycleController::new(Arc::new(transport(&server)));
    controller.stop(&"pod-1".into()).await.unwrap();
}

#[tokio::test]
async fn test_non_success_status_keeps_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
        .mount(&server)
        .await;

    let err = transport(&server)
        .send("Pods", "query Pods { myself { pods { id } } }", json!({}))
        .await
        .unwrap_err();

    match err {
        TransportError::Status { status, body } => {
            assert_eq!(status, 401);
            assert_eq!(body, "Unauthorized");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_non_json_body_is_invalid() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let err = transport(&server)
        .send("Pods", "query Pods { myself { pods { id } } }", json!({}))
        .await
        .unwrap_err();

    assert!(matches!(err, TransportError::InvalidBody { ref body, .. } if body.contains("maintenance")));
}

#[tokio::test]
async fn test_graphql_errors_without_data_are_rejected() {
    let server = MockServer::start().await;
    graphql("PodTemplates")
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "errors": [{ "message": "Unauthorized" }],
            "data": null
        })))
        .mount(&server)
        .await;

    let err = Catalog::new(Arc::new(transport(&server)))
        .list_templates()
        .await
        .unwrap_err();

    assert!(matches!(err, PodError::ProviderRejected { ref detail, .. } if detail == "Unauthorized"));
}

#[tokio::test]
async fn test_lifecycle_over_http() {
    let server = MockServer::start().await;
    graphql("DeployOnDemand")
        .and(body_partial_json(json!({
            "variables": { "input": {
                "templateId": "w0vokfjnj6",
                "gpuTypeId": "NVIDIA A40",
                "cloudType": "ALL",
                "gpuCount": 1,
                "volumeInGb": 40,
                "containerDiskInGb": 200
            } }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "podFindAndDeployOnDemand": {
                "id": "abc123",
                "imageName": "vitalai/reasoner:latest",
                "env": [],
                "machineId": "m-1",
                "machine": { "podHostId": "abc123-host" }
            } }
        })))
        .expect(1)
        .mount(&server)
        .await;
    // Two polls before the runtime comes up.
    graphql("Pod")
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "pod": { "id": "abc123", "name": "w0vokfjnj6", "desiredStatus": "RUNNING", "runtime": null } }
        })))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    graphql("Pod")
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "pod": {
                "id": "abc123",
                "name": "w0vokfjnj6",
                "desiredStatus": "RUNNING",
                "runtime": {
                    "uptimeInSeconds": 3,
                    "ports": [{ "ip": "194.26.196.6", "isIpPublic": true, "privatePort": 8888, "publicPort": 41234, "type": "http" }],
                    "gpus": [],
                    "container": null
                }
            } }
        })))
        .expect(1)
        .mount(&server)
        .await;
    graphql("TerminatePod")
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "data": { "podTerminate": null } })),
        )
        .expect(1)
        .mount(&server)
        .await;
    graphql("Pods")
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "data": { "myself": { "pods": [] } } })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let transport: Arc<dyn Transport> = Arc::new(transport(&server));
    let controller = LifecycleController::new(transport);
    let spec = PodSpec::builder("w0vokfjnj6", "NVIDIA A40").build().unwrap();

    let handle = controller.create(&spec).await.unwrap();
    assert_eq!(handle.as_str(), "abc123");

    let snapshot = controller
        .await_running(&handle, Duration::from_secs(5), Duration::from_millis(10))
        .await
        .unwrap();
    assert_eq!(snapshot.public_endpoints(), vec!["194.26.196.6:41234"]);
    assert_eq!(controller.state(&handle), Some(PodState::Running));

    controller.terminate(&handle).await.unwrap();
    assert_eq!(controller.state(&handle), Some(PodState::Terminating));

    let gone = controller
        .await_terminated(&handle, Duration::from_secs(5), Duration::from_millis(10), 10)
        .await
        .unwrap();
    assert!(gone);
    assert_eq!(controller.state(&handle), Some(PodState::Terminated));
}
