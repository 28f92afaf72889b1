use std::sync::Arc;

use actix_web::http::{Method, StatusCode};
use actix_web::{test, web, App};
use arrow::array::{ArrayRef, Float64Array, StringArray};
use arrow::record_batch::RecordBatch;
use readmit::api::middleware::cors;
use readmit::api::{configure, AppState};
use readmit::config::TrainConfig;
use readmit::ml::Pipeline;
use readmit::models::PredictResponse;
use serde_json::{json, Value as Json};

fn fitted_pipeline() -> Pipeline {
    let rows = 0..80_i32;
    let number = |f: fn(f64) -> Option<f64>| -> ArrayRef {
        Arc::new(
            rows.clone()
                .map(|i| f(f64::from(i)))
                .collect::<Float64Array>(),
        )
    };
    let sex: StringArray = rows
        .clone()
        .map(|i| Some(if i % 2 == 0 { "F" } else { "M" }))
        .collect();
    let batch = RecordBatch::try_from_iter([
        ("sex", Arc::new(sex) as ArrayRef),
        ("age", number(|x| Some(20.0 + x * 0.8))),
        ("length_of_stay_days", number(|x| Some(x % 7.0 + 0.5))),
        ("avg_hemo", number(|x| Some(11.0 + x % 5.0))),
        (
            "avg_glucose",
            number(|x| (x % 6.0 != 0.0).then_some(80.0 + (x % 13.0) * 7.0)),
        ),
        ("avg_creatinine", number(|x| Some(0.5 + (x % 4.0) * 0.3))),
        ("avg_wbc", number(|x| Some(4.0 + x % 8.0))),
        ("avg_platelets", number(|x| Some(150.0 + (x % 10.0) * 30.0))),
    ])
    .unwrap();
    let labels: Vec<u8> = rows.map(|i| u8::from(i > 50 || i % 11 == 0)).collect();

    let numericals: Vec<String> = readmit::models::frame::column_names(&batch)[1..].to_vec();
    Pipeline::fit(
        &batch,
        &labels,
        "readmit_30d",
        &numericals,
        &["sex".to_string()],
        &TrainConfig::default(),
    )
    .unwrap()
}

macro_rules! app {
    () => {
        test::init_service(
            App::new()
                .app_data(web::Data::new(AppState::new(fitted_pipeline())))
                .wrap(cors())
                .configure(configure),
        )
        .await
    };
}

#[actix_web::test]
async fn health_reports_ok() {
    let app = app!();
    let req = test::TestRequest::get().uri("/health").to_request();
    let body: Json = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body, json!({ "status": "ok" }));
}

#[actix_web::test]
async fn full_request_is_scored() {
    let app = app!();
    let req = test::TestRequest::post()
        .uri("/predict")
        .set_json(json!({
            "sex": "M",
            "age": 80,
            "length_of_stay_days": 6.5,
            "avg_hemo": 12.5,
            "avg_glucose": 140.0,
            "avg_creatinine": 1.0,
            "avg_wbc": 8.0,
            "avg_platelets": 230.0
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: PredictResponse = test::read_body_json(resp).await;
    assert!((0.0..=1.0).contains(&body.probability));
    assert_eq!(body.label == 1, body.probability >= 0.5);
}

#[actix_web::test]
async fn optional_labs_may_be_omitted() {
    let app = app!();
    let req = test::TestRequest::post()
        .uri("/predict")
        .set_json(json!({
            "sex": "F",
            "age": 65,
            "length_of_stay_days": 3.2,
            "avg_glucose": 140
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: PredictResponse = test::read_body_json(resp).await;
    assert!((0.0..=1.0).contains(&body.probability));
    assert_eq!(body.label == 1, body.probability >= 0.5);
}

#[actix_web::test]
async fn invalid_requests_are_unprocessable() {
    let app = app!();
    let bodies = [
        json!({ "sex": "X", "age": 65, "length_of_stay_days": 3.2 }),
        json!({ "sex": "F", "age": 121, "length_of_stay_days": 3.2 }),
        json!({ "sex": "F", "age": -1, "length_of_stay_days": 3.2 }),
        json!({ "sex": "F", "age": 65, "length_of_stay_days": -1.0 }),
        json!({ "sex": "F", "length_of_stay_days": 3.2 }),
        json!({ "sex": "F", "age": "old", "length_of_stay_days": 3.2 }),
        json!({ "sex": "F", "age": 65.5, "length_of_stay_days": 3.2 }),
    ];
    for payload in bodies {
        let req = test::TestRequest::post()
            .uri("/predict")
            .set_json(&payload)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(
            resp.status(),
            StatusCode::UNPROCESSABLE_ENTITY,
            "payload {payload}"
        );
        let body: Json = test::read_body_json(resp).await;
        assert!(body["detail"].is_string(), "payload {payload}");
    }
}

#[actix_web::test]
async fn malformed_json_is_unprocessable() {
    let app = app!();
    let req = test::TestRequest::post()
        .uri("/predict")
        .insert_header(("content-type", "application/json"))
        .set_payload("{\"sex\": \"F\", ")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[actix_web::test]
async fn integral_float_age_is_scored() {
    let app = app!();
    let req = test::TestRequest::post()
        .uri("/predict")
        .set_json(json!({ "sex": "F", "age": 65.0, "length_of_stay_days": 3.2 }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let same = test::TestRequest::post()
        .uri("/predict")
        .set_json(json!({ "sex": "F", "age": 65, "length_of_stay_days": 3.2 }))
        .to_request();
    let as_float: PredictResponse = test::read_body_json(resp).await;
    let as_int: PredictResponse = test::call_and_read_body_json(&app, same).await;
    assert_eq!(as_float, as_int);
}

#[actix_web::test]
async fn cors_preflight_allows_any_origin() {
    let app = app!();
    let origin = "http://localhost:8501";
    let req = test::TestRequest::default()
        .method(Method::OPTIONS)
        .uri("/predict")
        .insert_header(("Origin", origin))
        .insert_header(("Access-Control-Request-Method", "POST"))
        .insert_header(("Access-Control-Request-Headers", "content-type"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let header = |name: &str| {
        resp.headers()
            .get(name)
            .map(|v| v.to_str().unwrap().to_string())
    };
    assert_eq!(header("access-control-allow-origin").as_deref(), Some(origin));
    assert_eq!(header("access-control-allow-credentials").as_deref(), Some("true"));
    assert!(header("access-control-allow-methods").is_some_and(|m| m.contains("POST")));
}

#[actix_web::test]
async fn cross_origin_posts_carry_cors_headers() {
    let app = app!();
    let req = test::TestRequest::post()
        .uri("/predict")
        .insert_header(("Origin", "http://example.org"))
        .set_json(json!({ "sex": "M", "age": 70, "length_of_stay_days": 2.0 }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("http://example.org")
    );
}
