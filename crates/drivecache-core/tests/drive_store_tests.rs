//! Wire-level tests for the Drive HTTP backend against a local mock server.

use drivecache::{
    DriveCacheError, DriveConfig, DriveGateway, DriveStore, Query, RemoteStore, StaticToken,
};
use mockito::{Matcher, Server};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const FOLDER: &str = "folder-1";
const TOKEN: &str = "test-token";

fn config_for(base: &str, temp: &TempDir) -> DriveConfig {
    let creds = temp.path().join("credentials.json");
    std::fs::write(&creds, "{}").unwrap();
    DriveConfig::resolve_with(Some(creds), None, None, |_: &str| None)
        .unwrap()
        .with_endpoint(base)
}

fn store_for(base: &str, temp: &TempDir) -> DriveStore {
    DriveStore::with_token_source(&config_for(base, temp), Arc::new(StaticToken::new(TOKEN)))
        .unwrap()
}

fn gateway_for(base: &str, temp: &TempDir) -> DriveGateway {
    DriveGateway::new(Arc::new(store_for(base, temp))).with_page_size(2)
}

#[tokio::test]
async fn test_list_all_follows_page_tokens() {
    let mut server = Server::new_async().await;
    let temp = TempDir::new().unwrap();

    let first = server
        .mock("GET", "/drive/v3/files")
        .match_query(Matcher::Regex("pageSize=2$".into()))
        .match_header("authorization", format!("Bearer {}", TOKEN).as_str())
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"nextPageToken": "tok-1", "files": [
                {"id": "a", "name": "a.csv", "mimeType": "text/csv", "parents": ["folder-1"]},
                {"id": "b", "name": "b.csv", "mimeType": "text/csv", "parents": ["folder-1"]}
            ]}"#,
        )
        .expect(1)
        .create_async()
        .await;

    let second = server
        .mock("GET", "/drive/v3/files")
        .match_query(Matcher::UrlEncoded("pageToken".into(), "tok-1".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"files": [{"id": "c", "name": "c.csv"}]}"#)
        .expect(1)
        .create_async()
        .await;

    let files = gateway_for(&server.url(), &temp)
        .list_all(&Query::children_of(FOLDER))
        .await
        .unwrap();

    first.assert_async().await;
    second.assert_async().await;
    let ids: Vec<&str> = files.iter().map(|f| f.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
}

#[tokio::test]
async fn test_search_sends_rendered_query() {
    let mut server = Server::new_async().await;
    let temp = TempDir::new().unwrap();

    let mock = server
        .mock("GET", "/drive/v3/files")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded(
                "q".into(),
                "name = 'it\\'s.csv' and 'folder-1' in parents and trashed = false".into(),
            ),
            Matcher::UrlEncoded("spaces".into(), "drive".into()),
            Matcher::UrlEncoded("pageSize".into(), "1".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"files": [{"id": "x", "name": "it's.csv"}]}"#)
        .create_async()
        .await;

    let exists = gateway_for(&server.url(), &temp)
        .exists_by_name("it's.csv", FOLDER)
        .await
        .unwrap();

    mock.assert_async().await;
    assert!(exists);
}

#[tokio::test]
async fn test_remote_error_body_is_preserved() {
    let mut server = Server::new_async().await;
    let temp = TempDir::new().unwrap();

    server
        .mock("GET", "/drive/v3/files/missing")
        .match_query(Matcher::Any)
        .with_status(404)
        .with_body(r#"{"error": {"code": 404, "message": "File not found: missing."}}"#)
        .create_async()
        .await;

    let err = store_for(&server.url(), &temp)
        .metadata("missing")
        .await
        .unwrap_err();

    match err {
        DriveCacheError::RemoteApi {
            operation,
            status,
            body,
        } => {
            assert_eq!(operation, "files.get");
            assert_eq!(status, 404);
            assert!(body.contains("File not found: missing."));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_download_exports_spreadsheet() {
    let mut server = Server::new_async().await;
    let temp = TempDir::new().unwrap();

    let metadata = server
        .mock("GET", "/drive/v3/files/sheet-1")
        .match_query(Matcher::UrlEncoded("fields".into(), "id, name, mimeType, parents".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"id": "sheet-1", "name": "Budget", "mimeType": "application/vnd.google-apps.spreadsheet"}"#,
        )
        .create_async()
        .await;

    let export = server
        .mock("GET", "/drive/v3/files/sheet-1/export")
        .match_query(Matcher::UrlEncoded(
            "mimeType".into(),
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet".into(),
        ))
        .with_status(200)
        .with_body(vec![42u8; 1500])
        .create_async()
        .await;

    let dest = temp.path().join("budget.xlsx");
    let written = gateway_for(&server.url(), &temp)
        .download("sheet-1", &dest, None)
        .await
        .unwrap();

    metadata.assert_async().await;
    export.assert_async().await;
    assert_eq!(written, 1500);
    assert_eq!(std::fs::read(&dest).unwrap(), vec![42u8; 1500]);
}

#[tokio::test]
async fn test_download_binary_uses_media() {
    let mut server = Server::new_async().await;
    let temp = TempDir::new().unwrap();

    server
        .mock("GET", "/drive/v3/files/bin-1")
        .match_query(Matcher::UrlEncoded("fields".into(), "id, name, mimeType, parents".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"id": "bin-1", "name": "raw.csv", "mimeType": "text/csv"}"#)
        .create_async()
        .await;

    let media = server
        .mock("GET", "/drive/v3/files/bin-1")
        .match_query(Matcher::UrlEncoded("alt".into(), "media".into()))
        .with_status(200)
        .with_body("a,b\n1,2\n")
        .expect(1)
        .create_async()
        .await;

    let dest = temp.path().join("raw.csv");
    gateway_for(&server.url(), &temp)
        .download("bin-1", &dest, None)
        .await
        .unwrap();

    media.assert_async().await;
    assert_eq!(std::fs::read_to_string(&dest).unwrap(), "a,b\n1,2\n");
}

#[tokio::test]
async fn test_stalled_download_times_out() {
    let mut server = Server::new_async().await;
    let temp = TempDir::new().unwrap();

    server
        .mock("GET", "/drive/v3/files/slow-1")
        .match_query(Matcher::UrlEncoded("fields".into(), "id, name, mimeType, parents".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"id": "slow-1", "name": "slow.bin", "mimeType": "application/octet-stream"}"#)
        .create_async()
        .await;

    server
        .mock("GET", "/drive/v3/files/slow-1")
        .match_query(Matcher::UrlEncoded("alt".into(), "media".into()))
        .with_status(200)
        .with_chunked_body(|w| {
            w.write_all(b"first chunk")?;
            w.flush()?;
            std::thread::sleep(Duration::from_secs(2));
            w.write_all(b"never read")
        })
        .create_async()
        .await;

    let mut config = config_for(&server.url(), &temp);
    config.read_timeout = Duration::from_millis(200);
    let store = DriveStore::with_token_source(&config, Arc::new(StaticToken::new(TOKEN))).unwrap();
    let gateway = DriveGateway::new(Arc::new(store));

    let err = gateway
        .download("slow-1", &temp.path().join("slow.bin"), None)
        .await
        .unwrap_err();

    assert!(err.is_transport(), "unexpected error: {err:?}");
}

#[tokio::test]
async fn test_upload_updates_existing_file_in_place() {
    let mut server = Server::new_async().await;
    let temp = TempDir::new().unwrap();
    let local = temp.path().join("report.csv");
    std::fs::write(&local, "x,y\n").unwrap();

    server
        .mock("GET", "/drive/v3/files")
        .match_query(Matcher::UrlEncoded(
            "q".into(),
            "name = 'report.csv' and 'folder-1' in parents and trashed = false".into(),
        ))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"files": [{"id": "existing-1", "name": "report.csv"}]}"#)
        .create_async()
        .await;

    let update = server
        .mock("PATCH", "/upload/drive/v3/files/existing-1")
        .match_query(Matcher::UrlEncoded("uploadType".into(), "media".into()))
        .match_body("x,y\n")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"id": "existing-1"}"#)
        .expect(1)
        .create_async()
        .await;

    let create = server
        .mock("POST", "/upload/drive/v3/files")
        .match_query(Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let id = gateway_for(&server.url(), &temp)
        .upload_overwrite_or_create(&local, FOLDER)
        .await
        .unwrap();

    update.assert_async().await;
    create.assert_async().await;
    assert_eq!(id, "existing-1");
}

#[tokio::test]
async fn test_upload_creates_when_absent() {
    let mut server = Server::new_async().await;
    let temp = TempDir::new().unwrap();
    let local = temp.path().join("fresh.txt");
    std::fs::write(&local, "hello").unwrap();

    server
        .mock("GET", "/drive/v3/files")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"files": []}"#)
        .create_async()
        .await;

    let create = server
        .mock("POST", "/upload/drive/v3/files")
        .match_query(Matcher::UrlEncoded("uploadType".into(), "multipart".into()))
        .match_header(
            "content-type",
            Matcher::Regex("^multipart/related; boundary=".into()),
        )
        .match_body(Matcher::Regex(r#""name":"fresh.txt""#.into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"id": "new-1"}"#)
        .expect(1)
        .create_async()
        .await;

    let id = gateway_for(&server.url(), &temp)
        .upload_overwrite_or_create(&local, FOLDER)
        .await
        .unwrap();

    create.assert_async().await;
    assert_eq!(id, "new-1");
}

#[tokio::test]
async fn test_clear_container_survives_failed_delete() {
    let mut server = Server::new_async().await;
    let temp = TempDir::new().unwrap();

    server
        .mock("GET", "/drive/v3/files")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"files": [{"id": "d1", "name": "one"}, {"id": "d2", "name": "two"}, {"id": "d3", "name": "three"}]}"#,
        )
        .create_async()
        .await;

    let ok_1 = server
        .mock("DELETE", "/drive/v3/files/d1")
        .with_status(204)
        .expect(1)
        .create_async()
        .await;
    let failing = server
        .mock("DELETE", "/drive/v3/files/d2")
        .with_status(500)
        .with_body("backendError")
        .expect(1)
        .create_async()
        .await;
    let ok_3 = server
        .mock("DELETE", "/drive/v3/files/d3")
        .with_status(204)
        .expect(1)
        .create_async()
        .await;

    let deleted = gateway_for(&server.url(), &temp)
        .clear_container(FOLDER)
        .await
        .unwrap();

    ok_1.assert_async().await;
    failing.assert_async().await;
    ok_3.assert_async().await;
    assert_eq!(deleted, vec!["d1".to_string(), "d3".to_string()]);
}

#[tokio::test]
async fn test_connection_failure_is_transport_error() {
    let temp = TempDir::new().unwrap();
    // Nothing listens on port 1.
    let store = store_for("http://127.0.0.1:1", &temp);

    let err = store
        .search(&Query::children_of(FOLDER), None, None)
        .await
        .unwrap_err();

    assert!(err.is_transport(), "unexpected error: {err:?}");
}

#[test]
fn test_invalid_endpoint_is_config_error() {
    let temp = TempDir::new().unwrap();
    let config = config_for("http://127.0.0.1:9", &temp);
    let mut broken = config.clone();
    broken.api_base = "not a url".into();

    let err = DriveStore::with_token_source(&broken, Arc::new(StaticToken::new(TOKEN))).unwrap_err();
    assert!(matches!(err, DriveCacheError::Config { .. }));
}
