mod support;

use boxkeep_common::{BoxkeepError, ContainerEngine, HelperTask};
use boxkeep_engine::archive::image_repo_tag;
use boxkeep_lib::{Settings, SnapshotWriter};
use chrono::{DateTime, Local, TimeZone};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use support::{files, read_tar_gz, web_document, EngineCall, FakeEngine};
use tempfile::tempdir;

const HELPER: &str = "alpine:latest";

fn snapshot_time() -> DateTime<Local> {
    Local.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap()
}

fn writer(engine: &FakeEngine, output_dir: &Path) -> SnapshotWriter {
    let engine: Arc<dyn ContainerEngine> = Arc::new(engine.clone());
    let settings = Settings::default().with_output_dir(Some(output_dir.to_path_buf()));
    SnapshotWriter::new(engine, settings)
}

#[tokio::test]
async fn test_backup_web_workload_produces_full_snapshot() {
    let host = tempdir().unwrap();
    let out = tempdir().unwrap();
    let document = web_document(host.path());

    let engine = FakeEngine::new();
    engine.add_workload(document.clone()).await;
    engine
        .add_volume("web_data", files(&[("a.txt", "hello from web")]))
        .await;

    let layout = writer(&engine, out.path())
        .write_at("web", snapshot_time())
        .await
        .unwrap();

    assert_eq!(layout.root(), out.path().join("backup_web_20260102_030405"));
    assert!(layout.image_archive().is_file());
    assert!(layout.config_document().is_file());
    assert!(layout.volume_archive("web_data").is_file());

    let volume = read_tar_gz(&layout.volume_archive("web_data")).unwrap();
    assert_eq!(volume, files(&[("a.txt", "hello from web")]));

    let persisted: serde_json::Value =
        serde_json::from_slice(&std::fs::read(layout.config_document()).unwrap()).unwrap();
    assert_eq!(persisted, json!([document]));

    let image_ref = "web_backup:20260102_030405";
    assert_eq!(image_repo_tag(&layout.image_archive()).unwrap(), image_ref);
    assert!(!engine.has_image(image_ref).await, "temporary image left behind");

    let calls = engine.calls().await;
    assert_eq!(calls[0], EngineCall::Ping);
    assert_eq!(calls[1], EngineCall::Inspect("web".to_string()));
    assert_eq!(calls[2], EngineCall::EnsureImage(HELPER.to_string()));
    assert!(matches!(
        &calls[3],
        EngineCall::Helper(HelperTask::ArchiveVolume { volume, .. }) if volume == "web_data"
    ));
    assert_eq!(
        &calls[4..],
        &[
            EngineCall::Commit {
                id: "web".to_string(),
                image: image_ref.to_string()
            },
            EngineCall::Save(image_ref.to_string()),
            EngineCall::RemoveImage(image_ref.to_string()),
        ]
    );
}

#[tokio::test]
async fn test_backup_without_volumes_skips_helpers() {
    let out = tempdir().unwrap();
    let engine = FakeEngine::new();
    engine
        .add_workload(json!({
            "Name": "/cache",
            "Config": { "Env": null },
            "HostConfig": { "RestartPolicy": { "Name": "no" }, "PortBindings": {} },
            "Mounts": [],
        }))
        .await;

    let layout = writer(&engine, out.path())
        .write_at("cache", snapshot_time())
        .await
        .unwrap();

    assert!(layout.volume_snapshots().unwrap().is_empty());
    assert!(layout.volumes_dir().is_dir());
    assert!(layout.image_archive().is_file());
    let calls = engine.calls().await;
    assert!(!calls
        .iter()
        .any(|c| matches!(c, EngineCall::Helper(_) | EngineCall::EnsureImage(_))));
}

#[tokio::test]
async fn test_backup_of_unknown_workload_creates_nothing() {
    let out = tempdir().unwrap();
    let engine = FakeEngine::new();

    let err = writer(&engine, out.path())
        .write_at("ghost", snapshot_time())
        .await
        .unwrap_err();

    match err {
        BoxkeepError::NotFound(what) => assert!(what.contains("ghost")),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(std::fs::read_dir(out.path()).unwrap().count(), 0);
    assert!(engine.mutations().await.is_empty());
}

#[tokio::test]
async fn test_backup_requires_reachable_engine() {
    let out = tempdir().unwrap();
    let engine = FakeEngine::new();
    engine.set_unreachable(true).await;

    let err = writer(&engine, out.path())
        .write_at("web", snapshot_time())
        .await
        .unwrap_err();

    assert!(matches!(err, BoxkeepError::MissingDependency(_)));
    assert_eq!(engine.calls().await, vec![EngineCall::Ping]);
}

#[tokio::test]
async fn test_failed_save_still_removes_temporary_image() {
    let host = tempdir().unwrap();
    let out = tempdir().unwrap();
    let engine = FakeEngine::new();
    engine.add_workload(web_document(host.path())).await;
    engine.add_volume("web_data", files(&[("a.txt", "x")])).await;
    engine.set_fail_save(true).await;

    let err = writer(&engine, out.path())
        .write_at("web", snapshot_time())
        .await
        .unwrap_err();

    assert!(matches!(err, BoxkeepError::ArchiveFailure(_)));
    let image_ref = "web_backup:20260102_030405";
    assert!(engine
        .calls()
        .await
        .contains(&EngineCall::RemoveImage(image_ref.to_string())));
    assert!(!engine.has_image(image_ref).await);
    // the config document is the last thing written
    let layout = boxkeep_common::SnapshotLayout::for_backup(out.path(), "web", "20260102_030405");
    assert!(!layout.config_document().exists());
}

#[tokio::test]
async fn test_existing_snapshot_directory_is_never_reused() {
    let host = tempdir().unwrap();
    let out = tempdir().unwrap();
    std::fs::create_dir(out.path().join("backup_web_20260102_030405")).unwrap();

    let engine = FakeEngine::new();
    engine.add_workload(web_document(host.path())).await;

    let err = writer(&engine, out.path())
        .write_at("web", snapshot_time())
        .await
        .unwrap_err();

    assert!(matches!(err, BoxkeepError::NameCollision(_)));
    assert!(engine.mutations().await.is_empty());
}

#[tokio::test]
async fn test_backup_rejects_unusable_identifiers() {
    let out = tempdir().unwrap();
    let engine = FakeEngine::new();

    for id in ["", "../web"] {
        let err = writer(&engine, out.path())
            .write_at(id, snapshot_time())
            .await
            .unwrap_err();
        assert!(matches!(err, BoxkeepError::InvalidInput(_)), "{id:?}");
    }
    assert!(engine.calls().await.is_empty());
}
