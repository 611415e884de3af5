#![cfg(feature = "inmem-store")]

use std::sync::Arc;

use actix_web::{test, web, App};
use feedback_service::repo::inmem::InMemFeedbackStore;
use feedback_service::{config, AppState};
use serde_json::{json, Value};

fn state() -> web::Data<AppState> {
    web::Data::new(AppState::new(Arc::new(InMemFeedbackStore::new())))
}

fn create_body(receiver_id: i64, kind: &str) -> Value {
    json!({
        "sender_id": 1,
        "receiver_id": receiver_id,
        "trade_id": 1,
        "message": "text message",
        "type": kind
    })
}

#[actix_web::test]
async fn test_create_delete_scenario() {
    let app = test::init_service(App::new().app_data(state()).configure(config)).await;

    let req = test::TestRequest::post().uri("/feedback").set_json(create_body(2, "positive")).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let created: Value = test::read_body_json(resp).await;
    let id = created["id"].as_i64().unwrap();
    assert_eq!(created["type"], "positive");
    assert_eq!(created["receiver_id"], 2);
    assert!(created["deleted_at"].is_null());

    let req = test::TestRequest::get().uri("/stats/2").to_request();
    let stats: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(stats["positive"], 1);
    assert_eq!(stats["negative"], 0);

    let req = test::TestRequest::delete().uri(&format!("/feedback/{id}")).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 204);

    let req = test::TestRequest::get().uri("/stats/2").to_request();
    let stats: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(stats["positive"], 0);

    let req = test::TestRequest::get().uri("/feedbacks").to_request();
    let page: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(page["items"].as_array().unwrap().len(), 0);
    assert_eq!(page["total"], 0);

    let req = test::TestRequest::get().uri("/feedbacks?with_trashed=1").to_request();
    let page: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(page["total"], 1);

    let req = test::TestRequest::get().uri(&format!("/feedback/{id}")).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
    assert!(test::read_body(resp).await.is_empty());
}

#[actix_web::test]
async fn test_validation_error_body() {
    let app = test::init_service(App::new().app_data(state()).configure(config)).await;

    let body = json!({"sender_id": 1, "receiver_id": 2, "trade_id": 0, "message": "four", "type": "meh"});
    let req = test::TestRequest::post().uri("/feedback").set_json(body).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    let v: Value = test::read_body_json(resp).await;
    let errs = &v["validationError"];
    assert_eq!(errs["message"][0], "The message field must be longer than 5 chars!");
    assert_eq!(errs["type"][0], "The type field must be either 'positive' or 'negative'!");
    assert_eq!(errs["trade_id"][0], "The trade_id field is required and must be more then 0!");
    assert!(errs.get("sender_id").is_none());
}

#[actix_web::test]
async fn test_malformed_input_is_bad_request() {
    let app = test::init_service(App::new().app_data(state()).configure(config)).await;

    let req = test::TestRequest::post()
        .uri("/feedback")
        .insert_header(("Content-Type", "application/json"))
        .set_payload("{not json")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    let v: Value = test::read_body_json(resp).await;
    assert!(v["error"].as_str().unwrap().starts_with("bad request"));

    let req = test::TestRequest::get().uri("/feedback/abc").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 400);

    let req = test::TestRequest::get().uri("/feedbacks?limit=lots").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 400);
}

#[actix_web::test]
async fn test_patch_and_restore() {
    let app = test::init_service(App::new().app_data(state()).configure(config)).await;

    let req = test::TestRequest::post().uri("/feedback").set_json(create_body(5, "positive")).to_request();
    let created: Value = test::call_and_read_body_json(&app, req).await;
    let id = created["id"].as_i64().unwrap();

    let req = test::TestRequest::patch()
        .uri(&format!("/feedback/{id}"))
        .set_json(json!({"type": "negative", "message": "changed my mind"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 204);

    let req = test::TestRequest::get().uri(&format!("/feedback/{id}")).to_request();
    let f: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(f["type"], "negative");
    assert_eq!(f["message"], "changed my mind");

    let req = test::TestRequest::get().uri("/stats/5").to_request();
    let stats: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!((stats["positive"].as_i64(), stats["negative"].as_i64()), (Some(0), Some(1)));

    let req = test::TestRequest::patch().uri(&format!("/feedback/{id}")).set_json(json!({"type": "meh"})).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 400);

    let req = test::TestRequest::patch().uri("/feedback/9999").set_json(json!({"message": "long enough"})).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);

    let req = test::TestRequest::post().uri(&format!("/feedback/{id}/restore")).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);

    let req = test::TestRequest::delete().uri(&format!("/feedback/{id}")).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 204);
    let req = test::TestRequest::delete().uri(&format!("/feedback/{id}")).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);

    let req = test::TestRequest::post().uri(&format!("/feedback/{id}/restore")).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 204);
    let req = test::TestRequest::get().uri("/stats/5").to_request();
    let stats: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(stats["negative"], 1);
}

#[actix_web::test]
async fn test_list_filters_and_limit() {
    let app = test::init_service(App::new().app_data(state()).configure(config)).await;

    for receiver in [2, 2, 3] {
        let req = test::TestRequest::post().uri("/feedback").set_json(create_body(receiver, "positive")).to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 201);
    }

    let req = test::TestRequest::get().uri("/feedbacks?receiver_id=2&limit=1").to_request();
    let page: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(page["total"], 2);
    assert_eq!(page["limit"], 1);
    assert_eq!(page["items"].as_array().unwrap().len(), 1);

    let req = test::TestRequest::get().uri("/feedbacks?limit=5000").to_request();
    let page: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(page["limit"], 1000);
    assert_eq!(page["items"].as_array().unwrap().len(), 3);

    let req = test::TestRequest::get().uri("/stats/77").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);
}

#[actix_web::test]
async fn test_health_and_metrics() {
    let app = test::init_service(App::new().app_data(state()).configure(config)).await;

    let req = test::TestRequest::get().uri("/health").to_request();
    let v: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(v["status"], "ok");

    // no recorder installed: empty exposition
    let req = test::TestRequest::get().uri("/metrics").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    assert!(test::read_body(resp).await.is_empty());
}

#[actix_web::test]
async fn test_blank_query_values_use_defaults() {
    let app = test::init_service(App::new().app_data(state()).configure(config)).await;

    for receiver in [2, 2, 3] {
        let req = test::TestRequest::post().uri("/feedback").set_json(create_body(receiver, "positive")).to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 201);
    }

    let req = test::TestRequest::get()
        .uri("/feedbacks?sender_id=&receiver_id=2&trade_id=&with_trashed=&offset=&limit=")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let page: Value = test::read_body_json(resp).await;
    assert_eq!(page["total"], 2);
    assert_eq!(page["limit"], 10);

    // zero ids are "no filter"
    let req = test::TestRequest::get().uri("/feedbacks?sender_id=0&trade_id=0").to_request();
    let page: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(page["total"], 3);
}

#[actix_web::test]
async fn test_null_required_fields_are_validation_errors() {
    let app = test::init_service(App::new().app_data(state()).configure(config)).await;

    let body = json!({"sender_id": 1, "receiver_id": 2, "trade_id": null, "message": null, "type": "positive"});
    let req = test::TestRequest::post().uri("/feedback").set_json(body).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    let v: Value = test::read_body_json(resp).await;
    assert_eq!(v["validationError"]["message"][0], "The message field must be longer than 5 chars!");
    assert_eq!(v["validationError"]["trade_id"][0], "The trade_id field is required and must be more then 0!");
}
