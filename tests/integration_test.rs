use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use cortex_plan::engine::{MemStore, Persistence};
use cortex_plan::model::{Exam, Subject, SubjectFields};
use cortex_plan::insights::{CalendarDay, SubjectProgress};
use cortex_plan::planner::ListFilter;
use cortex_plan::sdk::Client;
use cortex_plan::server::Router;
use cortex_plan::{Error, Kind, Planner, StudyPlanner};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tower::ServiceExt;

fn app() -> axum::Router {
    Router::new(Arc::new(Planner::in_memory())).app()
}

async fn call(app: &axum::Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let req = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_subject_exam_lifecycle_over_http() {
    let app = app();

    let (status, subject) = call(
        &app,
        Method::POST,
        "/api/subjects",
        Some(json!({"name": "Math", "color": "#ff0000"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(subject["success"], json!(true));
    let subject_id = subject["data"]["id"].as_str().unwrap().to_string();

    let (status, exam) = call(
        &app,
        Method::POST,
        "/api/exams",
        Some(json!({"subjectId": &subject_id, "title": "Midterm", "date": "2024-05-01"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let exam_id = exam["data"]["id"].as_str().unwrap().to_string();

    let (_, list) = call(&app, Method::GET, "/api/exams", None).await;
    let items = list["data"]["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["title"], json!("Midterm"));
    assert_eq!(items[0]["subjectId"], json!(&subject_id));

    let (status, deleted) = call(&app, Method::DELETE, &format!("/api/subjects/{}", subject_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(deleted["data"], json!({"id": &subject_id, "deleted": true}));

    let (_, list) = call(&app, Method::GET, "/api/exams", None).await;
    assert_eq!(list["data"]["items"].as_array().unwrap().len(), 1);

    call(&app, Method::DELETE, &format!("/api/exams/{}", exam_id), None).await;
    let (_, list) = call(&app, Method::GET, "/api/exams", None).await;
    assert_eq!(list["data"]["items"], json!([]));
}

#[tokio::test]
async fn test_error_envelopes() {
    let app = app();

    let (status, body) = call(&app, Method::POST, "/api/subjects", Some(json!({"name": "Math"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"success": false, "error": "name and color are required"}));

    let (status, body) = call(&app, Method::PUT, "/api/exams/ghost", Some(json!({"title": "x"}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], json!(false));

    let (status, _) = call(&app, Method::DELETE, "/api/lessons/ghost", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = call(&app, Method::GET, "/api/users", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let req = Request::builder()
        .method(Method::POST)
        .uri("/api/subjects")
        .header("content-type", "application/json")
        .body(Body::from("{ broken"))
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_wrong_method_is_wrapped() {
    let app = app();

    let (status, body) = call(&app, Method::GET, "/api/subjects/abc", None).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(body, json!({"success": false, "error": "method not allowed"}));

    let (status, body) = call(&app, Method::PATCH, "/api/exams", Some(json!({}))).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(body["success"], json!(false));
}

/// Planner whose `progress` parks until released.
struct Parked {
    inner: Planner,
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

#[async_trait]
impl StudyPlanner for Parked {
    async fn list(&self, kind: Kind, filter: &ListFilter) -> cortex_plan::Result<Vec<Value>> {
        self.inner.list(kind, filter).await
    }
    async fn create(&self, kind: Kind, fields: Value) -> cortex_plan::Result<Value> {
        self.inner.create(kind, fields).await
    }
    async fn update(&self, kind: Kind, id: &str, fields: Value) -> cortex_plan::Result<Value> {
        self.inner.update(kind, id, fields).await
    }
    async fn delete(&self, kind: Kind, id: &str) -> cortex_plan::Result<bool> {
        self.inner.delete(kind, id).await
    }
    async fn progress(&self) -> cortex_plan::Result<Vec<SubjectProgress>> {
        self.entered.notify_one();
        self.release.notified().await;
        self.inner.progress().await
    }
    async fn calendar(&self) -> cortex_plan::Result<Vec<CalendarDay>> {
        self.inner.calendar().await
    }
}

#[tokio::test]
async fn test_busy_server_rejects_with_503() {
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let planner = Parked { inner: Planner::in_memory(), entered: entered.clone(), release: release.clone() };
    let app = Router::new(Arc::new(planner)).with_max_in_flight(1).app();

    let held = app.clone();
    let first = tokio::spawn(async move { call(&held, Method::GET, "/api/progress", None).await });
    entered.notified().await;

    let (status, body) = call(&app, Method::GET, "/api/health", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body, json!({"success": false, "error": "server busy"}));

    release.notify_one();
    let (status, body) = first.await.unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!([]));

    let (status, _) = call(&app, Method::GET, "/api/health", None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_storage_failure_is_500() {
    let dir = tempfile::tempdir().unwrap();
    let data_dir = dir.path().join("data");
    let store = MemStore::open(Persistence::new(&data_dir).unwrap()).unwrap();
    let app = Router::new(Arc::new(Planner::new(Arc::new(store)))).app();

    let (status, _) = call(&app, Method::POST, "/api/subjects", Some(json!({"name": "Math", "color": "#f00"}))).await;
    assert_eq!(status, StatusCode::OK);

    std::fs::remove_dir_all(&data_dir).unwrap();

    let (status, body) = call(&app, Method::POST, "/api/subjects", Some(json!({"name": "Art", "color": "#0f0"}))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["success"], json!(false));
    assert!(body["error"].as_str().unwrap().starts_with("storage unavailable"));

    let (_, list) = call(&app, Method::GET, "/api/subjects", None).await;
    assert_eq!(list["data"]["items"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_lessons_query_filter_and_patch() {
    let app = app();
    for subject in ["s1", "s2"] {
        call(
            &app,
            Method::POST,
            "/api/lessons",
            Some(json!({"title": "Read", "subjectId": subject, "dueDate": "2024-05-02"})),
        )
        .await;
    }

    let (_, list) = call(&app, Method::GET, "/api/lessons?subjectId=s2", None).await;
    let items = list["data"]["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    let id = items[0]["id"].as_str().unwrap().to_string();
    assert_eq!(items[0]["isComplete"], json!(false));

    let (status, updated) = call(
        &app,
        Method::PUT,
        &format!("/api/lessons/{}", id),
        Some(json!({"isComplete": true})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["data"]["isComplete"], json!(true));
    assert_eq!(updated["data"]["title"], json!("Read"));
    assert_eq!(updated["data"]["subjectId"], json!("s2"));
}

#[tokio::test]
async fn test_health_progress_calendar() {
    let app = app();
    let (status, body) = call(&app, Method::GET, "/api/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], json!("ok"));

    let (_, body) = call(&app, Method::GET, "/api/progress", None).await;
    assert_eq!(body["data"], json!([]));

    let (_, body) = call(&app, Method::GET, "/api/calendar", None).await;
    assert_eq!(body["data"], json!([]));
}

#[tokio::test]
async fn test_data_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let subject_id = {
        let store = MemStore::open(Persistence::new(dir.path()).unwrap()).unwrap();
        let planner = Planner::new(Arc::new(store));
        let subject = planner
            .create(Kind::Subjects, json!({"name": "Math", "color": "#ff0000"}))
            .await
            .unwrap();
        subject["id"].as_str().unwrap().to_string()
    };

    let store = MemStore::open(Persistence::new(dir.path()).unwrap()).unwrap();
    let planner = Planner::new(Arc::new(store));
    let subjects = planner.subjects().list().await.unwrap();
    assert_eq!(subjects.len(), 1);
    assert_eq!(subjects[0].id, subject_id);
}

#[tokio::test]
async fn test_sdk_client_over_socket() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = Router::new(Arc::new(Planner::in_memory()));
    tokio::spawn(async move {
        let _ = router.listen(listener).await;
    });

    let client = Client::connect(&addr.to_string()).await.unwrap();

    let subject: Subject = client
        .create_as(
            Kind::Subjects,
            &SubjectFields { name: Some("Biology".into()), color: Some("#00ff00".into()) },
        )
        .await
        .unwrap();
    assert_eq!(subject.name, "Biology");

    let exam = client
        .create(Kind::Exams, json!({"subjectId": &subject.id, "title": "Final", "date": "2024-06-01"}))
        .await
        .unwrap();
    let exam_id = exam["id"].as_str().unwrap().to_string();

    let exams: Vec<Exam> = client.list_as(Kind::Exams, &ListFilter::default()).await.unwrap();
    assert_eq!(exams.len(), 1);
    assert_eq!(exams[0].subject_id, subject.id);

    let renamed = client.update(Kind::Exams, &exam_id, json!({"title": "Finals"})).await.unwrap();
    assert_eq!(renamed["title"], json!("Finals"));
    assert_eq!(renamed["date"], json!("2024-06-01"));

    let res = client.create(Kind::Subjects, json!({"name": "NoColor"})).await;
    assert!(matches!(res, Err(Error::Validation(_))));
    let res = client.update(Kind::Subjects, "ghost", json!({"name": "x"})).await;
    assert!(matches!(res, Err(Error::NotFound(_))));

    assert!(client.delete(Kind::Exams, &exam_id).await.unwrap());
    assert!(!client.delete(Kind::Exams, &exam_id).await.unwrap());

    let calendar = client.calendar().await.unwrap();
    assert!(calendar.is_empty());
}
