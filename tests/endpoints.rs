mod common;

use common::{blocking, client, config_for};
use hsclient::{Error, ResourceFilter, UploadFile};
use serde_json::{Value, json};
use wiremock::matchers::{body_json, body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PID: &str = "511debf8858a4ea081f78d66870da76c";

fn ok_json(body: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(body)
}

#[tokio::test(flavor = "multi_thread")]
async fn upload_sends_file_part_and_folder() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/hsapi/resource/{PID}/files/")))
        .and(body_string_contains(r#"name="file""#))
        .and(body_string_contains(r#"filename="notes.csv""#))
        .and(body_string_contains("text/csv"))
        .and(body_string_contains("x,y\n1,2\n"))
        .and(body_string_contains(r#"name="folder""#))
        .and(body_string_contains("model/input"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "resource_id": PID,
            "file_name": "notes.csv",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let local = dir.path().join("notes.csv");
    std::fs::write(&local, "x,y\n1,2\n").unwrap();

    let cfg = config_for(&server);
    let reply = blocking(move || {
        let file = UploadFile::from_path(&local).unwrap().with_folder("model/input");
        client(cfg).add_resource_file(PID, &file)
    })
    .await
    .unwrap();

    assert_eq!(reply["file_name"], "notes.csv");
}

#[tokio::test(flavor = "multi_thread")]
async fn upload_from_memory_without_folder() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/hsapi/resource/{PID}/files/")))
        .and(body_string_contains(r#"filename="blob.bin""#))
        .and(body_string_contains("application/octet-stream"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"resource_id": PID})))
        .expect(1)
        .mount(&server)
        .await;

    let cfg = config_for(&server);
    blocking(move || {
        let file = UploadFile::from_bytes("blob.bin", vec![1, 2, 3]);
        client(cfg).add_resource_file(PID, &file)
    })
    .await
    .unwrap();

    let requests = server.received_requests().await.unwrap();
    let body = String::from_utf8_lossy(&requests[0].body);
    assert!(!body.contains(r#"name="folder""#));
}

#[tokio::test(flavor = "multi_thread")]
async fn science_metadata_is_put_as_json() {
    let server = MockServer::start().await;
    let metadata = json!({
        "title": "Great Salt Lake level",
        "subjects": [{"value": "lake"}],
    });
    Mock::given(method("PUT"))
        .and(path(format!("/hsapi/resource/{PID}/scimeta/elements/")))
        .and(body_json(&metadata))
        .respond_with(ok_json(metadata.clone()))
        .expect(1)
        .mount(&server)
        .await;

    let cfg = config_for(&server);
    let sent = metadata.clone();
    let reply = blocking(move || client(cfg).update_science_metadata(PID, &sent))
        .await
        .unwrap();
    assert_eq!(reply, metadata);
}

#[tokio::test(flavor = "multi_thread")]
async fn zip_and_file_type_functions() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/hsapi/resource/{PID}/functions/zip/")))
        .and(body_string_contains("input_coll_path=data%2Fcontents%2Fmodel"))
        .and(body_string_contains("output_zip_file_name=model.zip"))
        .and(body_string_contains("remove_original_after_zip=true"))
        .respond_with(ok_json(json!({"name": "model.zip"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!(
            "/hsapi/resource/{PID}/functions/set-file-type/model/dem.tif/GeoRaster/"
        )))
        .respond_with(ok_json(json!({"file_type": "GeoRaster"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!(
            "/hsapi/resource/{PID}/functions/rep-res-bag-to-irods-user-zone/"
        )))
        .respond_with(ok_json(json!({"destination_resource_path": "/zone/home/me/bag.zip"})))
        .expect(1)
        .mount(&server)
        .await;

    let cfg = config_for(&server);
    let (zipped, typed, replicated) = blocking(move || {
        let hs = client(cfg);
        (
            hs.zip_folder(PID, "data/contents/model", "model.zip", true).unwrap(),
            hs.set_file_type(PID, "model/dem.tif", "GeoRaster").unwrap(),
            hs.replicate_bag_to_irods_user_zone(PID).unwrap(),
        )
    })
    .await;

    assert_eq!(zipped["name"], "model.zip");
    assert_eq!(typed["file_type"], "GeoRaster");
    assert_eq!(replicated["destination_resource_path"], "/zone/home/me/bag.zip");
}

#[tokio::test(flavor = "multi_thread")]
async fn access_rules_round_trip() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/hsapi/resource/{PID}/access/")))
        .respond_with(ok_json(json!({"users": [], "groups": []})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(format!("/hsapi/resource/accessRules/{PID}/")))
        .and(body_string_contains("public=true"))
        .respond_with(ok_json(json!({"resource_id": PID})))
        .expect(1)
        .mount(&server)
        .await;

    let cfg = config_for(&server);
    let (rules, changed) = blocking(move || {
        let hs = client(cfg);
        (
            hs.get_access_rules(PID).unwrap(),
            hs.set_access_rules(PID, true).unwrap(),
        )
    })
    .await;

    assert_eq!(rules["users"], json!([]));
    assert_eq!(changed, PID);
}

#[tokio::test(flavor = "multi_thread")]
async fn file_metadata_round_trip() {
    let server = MockServer::start().await;
    let update = json!({"title": "Digital elevation model", "keywords": ["dem"]});
    Mock::given(method("GET"))
        .and(path(format!("/hsapi/resource/{PID}/files/42/metadata/")))
        .respond_with(ok_json(json!({"title": "dem", "keywords": []})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(format!("/hsapi/resource/{PID}/files/42/metadata/")))
        .and(body_json(&update))
        .respond_with(ok_json(update.clone()))
        .expect(1)
        .mount(&server)
        .await;

    let cfg = config_for(&server);
    let sent = update.clone();
    let (before, after) = blocking(move || {
        let hs = client(cfg);
        (
            hs.get_file_metadata(PID, "42").unwrap(),
            hs.update_file_metadata(PID, "42", &sent).unwrap(),
        )
    })
    .await;

    assert_eq!(before["title"], "dem");
    assert_eq!(after, update);
}

#[tokio::test(flavor = "multi_thread")]
async fn copy_and_new_version() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/hsapi/resource/{PID}/copy/")))
        .respond_with(ResponseTemplate::new(202).set_body_json(json!("copy-task")))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("/hsapi/resource/{PID}/version/")))
        .respond_with(ResponseTemplate::new(202).set_body_json(json!("version-task")))
        .expect(1)
        .mount(&server)
        .await;

    let cfg = config_for(&server);
    let (copy, version) = blocking(move || {
        let hs = client(cfg);
        (hs.copy_resource(PID).unwrap(), hs.create_new_version(PID).unwrap())
    })
    .await;

    assert_eq!(copy, json!("copy-task"));
    assert_eq!(version, json!("version-task"));
}

#[tokio::test(flavor = "multi_thread")]
async fn user_info_and_resource_map() {
    let server = MockServer::start().await;
    let map = r#"<?xml version="1.0"?><rdf:RDF xmlns:ore="http://www.openarchives.org/ore/terms/"/>"#;
    Mock::given(method("GET"))
        .and(path("/hsapi/userInfo/"))
        .respond_with(ok_json(json!({"username": "me", "id": 7})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/hsapi/resource/{PID}/map/")))
        .respond_with(ResponseTemplate::new(200).set_body_raw(map, "application/xml"))
        .expect(1)
        .mount(&server)
        .await;

    let cfg = config_for(&server);
    let (user, text) = blocking(move || {
        let hs = client(cfg);
        (hs.get_user_info().unwrap(), hs.get_resource_map(PID).unwrap())
    })
    .await;

    assert_eq!(user["username"], "me");
    assert_eq!(text, map);
}

#[tokio::test(flavor = "multi_thread")]
async fn delete_folder_and_missing_folder() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path(format!("/hsapi/resource/{PID}/folders/model/input/")))
        .respond_with(ok_json(json!({"resource_id": PID, "path": "model/input"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path(format!("/hsapi/resource/{PID}/folders/gone/")))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let cfg = config_for(&server);
    let (deleted, missing) = blocking(move || {
        let hs = client(cfg);
        (
            hs.delete_folder(PID, "model/input").unwrap(),
            hs.delete_folder(PID, "gone").unwrap_err(),
        )
    })
    .await;

    assert_eq!(deleted["path"], "model/input");
    assert!(matches!(missing, Error::NotFound { filename: Some(f), .. } if f == "gone"));
}

#[tokio::test(flavor = "multi_thread")]
async fn dot_segments_never_reach_the_server() {
    let server = MockServer::start().await;

    let cfg = config_for(&server);
    let errs = blocking(move || {
        let hs = client(cfg);
        [
            hs.delete_resource_file(PID, "a/../../../x").unwrap_err(),
            hs.get_system_metadata("../../userInfo").unwrap_err(),
        ]
    })
    .await;

    assert!(errs.iter().all(|e| matches!(e, Error::Argument(_))));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn next_link_to_another_host_stops_the_listing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/hsapi/resource/"))
        .respond_with(ok_json(json!({
            "next": "http://collector.example/hsapi/resource/?page=2",
            "results": [{"resource_id": "r0"}],
        })))
        .expect(1)
        .mount(&server)
        .await;

    let cfg = config_for(&server);
    let items = blocking(move || {
        let hs = client(cfg);
        hs.get_resource_list(&ResourceFilter::new())
            .unwrap()
            .collect::<Vec<_>>()
    })
    .await;

    assert_eq!(items.len(), 2);
    assert_eq!(items[0].as_ref().unwrap()["resource_id"], "r0");
    assert!(matches!(items[1], Err(Error::Protocol { .. })));
}
