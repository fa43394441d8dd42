//! Integration tests for the storage backend client
//!
//! These tests require a running storage backend.
//! Set FLEX_BACKEND_URL (and FLEX_BACKEND_TOKEN if needed) to run.

use volume_client::{CreateVolumeRequest, VolumeClient, VolumeClientTrait};

fn client() -> VolumeClient {
    let url = std::env::var("FLEX_BACKEND_URL")
        .unwrap_or_else(|_| "http://localhost:9500".to_string());
    let token = std::env::var("FLEX_BACKEND_TOKEN").ok();
    VolumeClient::new(url, token).expect("Failed to create client")
}

#[tokio::test]
#[ignore] // Requires running storage backend
async fn test_list_volumes() {
    let volumes = client().list_volumes().await
        .expect("Failed to list volumes");

    println!("Found {} volumes", volumes.len());
}

#[tokio::test]
#[ignore]
async fn test_volume_lifecycle() {
    let client = client();
    let name = format!("it-{}", std::process::id());

    let volume = client.create_volume(&CreateVolumeRequest {
        name: name.clone(),
        size_gb: 1,
        fs_type: Some("ext4".to_string()),
    }).await.expect("Failed to create volume");
    assert_eq!(volume.name, name);

    let attachment = client.attach_volume(&name, "it-node").await
        .expect("Failed to attach volume");
    println!("Attached {} at {}", name, attachment.device);

    client.detach_volume(&name, "it-node").await
        .expect("Failed to detach volume");
    client.remove_volume(&name).await
        .expect("Failed to remove volume");
}
