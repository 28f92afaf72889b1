use std::time::Duration;

use readmit::models::PredictResponse;
use readmit::ui::{ApiClient, PredictForm, Submission};
use serde_json::json;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer, timeout: Duration) -> ApiClient {
    ApiClient::new(&server.uri(), timeout).unwrap()
}

#[tokio::test]
async fn form_defaults_are_posted_and_rendered() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/predict"))
        .and(body_json(json!({
            "sex": "F",
            "age": 65,
            "length_of_stay_days": 3.2,
            "avg_hemo": 12.5,
            "avg_glucose": 140.0,
            "avg_creatinine": 1.0,
            "avg_wbc": 8.0,
            "avg_platelets": 230.0
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "probability": 0.1834, "label": 0 })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, Duration::from_secs(10));
    let submission = PredictForm::default().submit(&client).await;

    match &submission {
        Submission::Scored { response, .. } => assert_eq!(
            *response,
            PredictResponse {
                probability: 0.1834,
                label: 0
            }
        ),
        other => panic!("expected a score, got {other:?}"),
    }
    let rendered = submission.to_string();
    assert!(rendered.contains("Readmission probability: 18.34%"));
    assert!(rendered.contains("Prediction: LOW RISK"));
}

#[tokio::test]
async fn blank_lab_fields_are_sent_as_null() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/predict"))
        .and(body_json(json!({
            "sex": "M",
            "age": 70,
            "length_of_stay_days": 3.2,
            "avg_hemo": null,
            "avg_glucose": 140.0,
            "avg_creatinine": 1.0,
            "avg_wbc": 8.0,
            "avg_platelets": 230.0
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "probability": 0.61, "label": 1 })),
        )
        .mount(&server)
        .await;

    let form = PredictForm {
        sex: readmit::models::Sex::Male,
        age: "70".into(),
        avg_hemo: String::new(),
        ..PredictForm::default()
    };
    let submission = form.submit(&client_for(&server, Duration::from_secs(10))).await;
    assert!(submission.is_high_risk());
    assert!(submission.to_string().contains("Prediction: HIGH RISK"));
}

#[tokio::test]
async fn server_errors_render_the_hint() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/predict"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let client = client_for(&server, Duration::from_secs(10));
    let submission = PredictForm::default().submit(&client).await;

    assert!(matches!(submission, Submission::Failed { .. }));
    let uri = server.uri();
    assert_eq!(
        submission.headline(),
        format!(
            "Request failed: HTTP status server error (500 Internal Server Error) for url ({uri}/predict)"
        )
    );
    assert_eq!(
        submission.detail(),
        format!("Is the API running at {uri}? Try: curl {uri}/health")
    );
}

#[tokio::test]
async fn slow_service_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/predict"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "probability": 0.2, "label": 0 }))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let client = client_for(&server, Duration::from_millis(200));
    let submission = PredictForm::default().submit(&client).await;
    assert!(matches!(submission, Submission::Failed { .. }));
}

#[tokio::test]
async fn malformed_body_is_a_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/predict"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let client = client_for(&server, Duration::from_secs(10));
    let submission = PredictForm::default().submit(&client).await;
    assert!(matches!(submission, Submission::Failed { .. }));
    assert_eq!(submission.headline().matches("Request failed:").count(), 1);
}

#[tokio::test]
async fn health_is_fetched() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "ok" })))
        .mount(&server)
        .await;

    let client = client_for(&server, Duration::from_secs(10));
    assert_eq!(client.health().await.unwrap(), json!({ "status": "ok" }));
}

#[tokio::test]
async fn invalid_form_is_not_sent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let form = PredictForm {
        length_of_stay_days: "three".into(),
        ..PredictForm::default()
    };
    let submission = form.submit(&client_for(&server, Duration::from_secs(10))).await;
    assert!(matches!(submission, Submission::Invalid(_)));
}
