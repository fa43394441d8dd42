//! HTTP-level tests for the storage backend client
//!
//! These run against a local wiremock server and need no backend instance.

use volume_client::{CreateVolumeRequest, VolumeClient, VolumeClientTrait, VolumeError};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_create_volume_posts_json_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/volumes"))
        .and(body_json(serde_json::json!({"name": "vol-a", "sizeGb": 10, "fsType": "ext4"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "name": "vol-a",
            "sizeGb": 10,
            "fsType": "ext4"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = VolumeClient::new(server.uri(), None).unwrap();
    let volume = client
        .create_volume(&CreateVolumeRequest {
            name: "vol-a".to_string(),
            size_gb: 10,
            fs_type: Some("ext4".to_string()),
        })
        .await
        .unwrap();

    assert_eq!(volume.name, "vol-a");
    assert_eq!(volume.attached_node, None);
}

#[tokio::test]
async fn test_attach_returns_device_and_sends_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/volumes/vol-a/attach"))
        .and(header("Authorization", "Bearer secret"))
        .and(body_json(serde_json::json!({"node": "worker-1"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"device": "/dev/vdb"})))
        .mount(&server)
        .await;

    let client = VolumeClient::new(format!("{}/", server.uri()), Some("secret".to_string())).unwrap();
    let attachment = client.attach_volume("vol-a", "worker-1").await.unwrap();
    assert_eq!(attachment.device, "/dev/vdb");
}

#[tokio::test]
async fn test_get_volume_maps_404_to_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/volumes/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({"message": "no such volume"})))
        .mount(&server)
        .await;

    let client = VolumeClient::new(server.uri(), None).unwrap();
    let err = client.get_volume("missing").await.unwrap_err();
    assert!(err.is_not_found(), "Expected NotFound, got {err:?}");
}

#[tokio::test]
async fn test_unauthorized_maps_to_authentication() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/volumes"))
        .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({"message": "bad token"})))
        .mount(&server)
        .await;

    let client = VolumeClient::new(server.uri(), Some("wrong".to_string())).unwrap();
    let err = client.list_volumes().await.unwrap_err();
    match err {
        VolumeError::Authentication(message) => assert!(message.contains("bad token")),
        other => panic!("Expected Authentication error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_list_volumes_reports_attachment() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/volumes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {"name": "vol-a", "sizeGb": 1, "attachedNode": "worker-1", "device": "/dev/vdb"},
            {"name": "vol-b", "sizeGb": 2}
        ])))
        .mount(&server)
        .await;

    let client = VolumeClient::new(server.uri(), None).unwrap();
    let volumes = client.list_volumes().await.unwrap();
    assert_eq!(volumes.len(), 2);
    assert!(volumes[0].is_attached_to("worker-1"));
    assert!(!volumes[1].is_attached_to("worker-1"));
}

#[tokio::test]
async fn test_empty_name_is_rejected_locally() {
    let client = VolumeClient::new("http://127.0.0.1:9".to_string(), None).unwrap();
    let err = client.remove_volume("").await.unwrap_err();
    assert!(matches!(err, VolumeError::InvalidRequest(_)));
}
