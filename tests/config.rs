use std::io::Write;
use std::time::Duration;

use tempfile::NamedTempFile;

use cluster_ipc::config::IpcConfig;
use cluster_ipc::error::IpcError;

fn write_config(body: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(body.as_bytes()).unwrap();
    file
}

#[test]
fn partial_file_falls_back_to_defaults() {
    let file = write_config(r#"{"cluster_id": 2, "cluster_count": 4, "ack_timeout_ms": 2500}"#);
    let config = IpcConfig::from_file(file.path()).unwrap();

    assert_eq!(config.scope, "splashtail");
    assert_eq!(config.channel, "mewld");
    assert_eq!(config.cluster_id, Some(2));
    assert_eq!(config.ack_timeout(), Duration::from_millis(2500));
    assert_eq!(config.request_timeout(), Duration::from_secs(5));
    assert_eq!(config.inbox_channel().as_deref(), Some("mewld/ipc@2"));
    assert_eq!(config.jobs_channel(), "mewld/ipc@jobserver");
}

#[test]
fn explicit_inbox_overrides_member_suffix() {
    let file = write_config(r#"{"channel": "bus", "inbox": "ipc@jobserver"}"#);
    let config = IpcConfig::from_file(file.path()).unwrap();
    assert_eq!(config.cluster_id, None);
    assert_eq!(config.inbox_channel().as_deref(), Some("bus/ipc@jobserver"));
}

#[test]
fn out_of_range_cluster_id_is_rejected() {
    let file = write_config(r#"{"cluster_id": 4, "cluster_count": 4}"#);
    assert!(matches!(
        IpcConfig::from_file(file.path()),
        Err(IpcError::Config(message)) if message.contains("cluster_id 4")
    ));
}

#[test]
fn malformed_file_is_a_config_error() {
    let file = write_config("{ not json");
    assert!(matches!(
        IpcConfig::from_file(file.path()),
        Err(IpcError::Config(_))
    ));
    assert!(matches!(
        IpcConfig::from_file("/nonexistent/cluster-ipc.json"),
        Err(IpcError::Config(_))
    ));
}

#[test]
fn member_file_can_drive_a_client_node() {
    let file = write_config(
        r#"{"cluster_id": 1, "cluster_count": 3, "inbox": "ipc@one", "broker": "10.0.0.5:6380"}"#,
    );
    let config = IpcConfig::from_file(file.path()).unwrap().into_client();

    assert_eq!(config.cluster_id, None);
    assert!(config.inbox_channel().is_none());
    assert_eq!(config.cluster_count, 3);
    assert_eq!(config.broker, "10.0.0.5:6380");
    config.validate().unwrap();
}
