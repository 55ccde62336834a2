// tests/api_client.rs
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use rust_decimal::Decimal;
use serde_json::json;

use expense_budget_tracker::api::{Client, DecisionReq, UpdateNodeReq};
use expense_budget_tracker::budget::{Category, Department, NodeKind, Subcategory};
use expense_budget_tracker::cli::state::App;
use expense_budget_tracker::config::ApiConfig;
use expense_budget_tracker::errors::ApiError;

#[derive(Default)]
struct Mock {
    departments: Vec<Department>,
    structure_hits: usize,
    last_year: Option<String>,
    last_auth: Option<String>,
}

type Shared = Arc<Mutex<Mock>>;

fn d(v: i64) -> Decimal {
    Decimal::from(v)
}

fn seed() -> Vec<Department> {
    vec![Department {
        id: 1,
        name: "Engineering".into(),
        budget: d(10000),
        spent: d(8800),
        currency: "CAD".into(),
        categories: vec![Category {
            id: 10,
            name: "Team events".into(),
            budget: d(4000),
            spent: d(3600),
            currency: "CAD".into(),
            is_welfare: true,
            subcategories: vec![Subcategory {
                id: 100,
                name: "Offsite".into(),
                budget: d(1000),
                spent: d(900),
                currency: "CAD".into(),
            }],
        }],
    }]
}

async fn structure(
    State(state): State<Shared>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Json<serde_json::Value> {
    let mut mock = state.lock().unwrap();
    mock.structure_hits += 1;
    mock.last_year = query.get("year_id").cloned();
    mock.last_auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    Json(json!({ "structure": mock.departments, "view_only": false }))
}

async fn update_node(
    State(state): State<Shared>,
    Path((kind, id)): Path<(String, i64)>,
    Json(req): Json<UpdateNodeReq>,
) -> Response {
    let Some(budget) = req.budget else {
        return StatusCode::OK.into_response();
    };
    if budget < Decimal::ZERO {
        let body = json!({ "message": "Budget must be non-negative" });
        return (StatusCode::UNPROCESSABLE_ENTITY, Json(body)).into_response();
    }
    let mut mock = state.lock().unwrap();
    for dept in &mut mock.departments {
        if kind == "departments" && dept.id == id {
            dept.budget = budget;
        }
        for cat in &mut dept.categories {
            if kind == "categories" && cat.id == id {
                cat.budget = budget;
            }
        }
    }
    Json(json!({ "ok": true })).into_response()
}

async fn delete_node(State(state): State<Shared>, Path((kind, id)): Path<(String, i64)>) -> Response {
    let mut mock = state.lock().unwrap();
    let before = mock.departments.len();
    if kind == "departments" {
        mock.departments.retain(|d| d.id != id);
    }
    if mock.departments.len() == before {
        return (StatusCode::NOT_FOUND, Json(json!({ "error": "Department not found" }))).into_response();
    }
    StatusCode::NO_CONTENT.into_response()
}

async fn subcategories(State(state): State<Shared>, Path(id): Path<i64>) -> Json<Vec<Subcategory>> {
    let mock = state.lock().unwrap();
    let subs = mock
        .departments
        .iter()
        .flat_map(|d| &d.categories)
        .filter(|c| c.id == id)
        .flat_map(|c| c.subcategories.clone())
        .collect();
    Json(subs)
}

async fn expense(Path(id): Path<i64>) -> Response {
    if id != 7 {
        return (StatusCode::INTERNAL_SERVER_ERROR, "upstream exploded").into_response();
    }
    Json(json!({
        "id": 7,
        "title": "Team offsite",
        "amount": "500.00",
        "currency": "CAD",
        "status": "pending",
        "expense_date": "2024-05-02",
        "budget_impact": {
            "department": { "name": "Engineering", "budget": 10000, "spent": "8800" },
            "category": { "name": "Team events", "budget": 4000, "used": 3600, "will_exceed": true }
        }
    }))
    .into_response()
}

async fn approve(Path(id): Path<i64>, Json(_req): Json<DecisionReq>) -> Response {
    if id == 8 {
        return (StatusCode::CONFLICT, Json(json!({ "detail": "Expense already decided" }))).into_response();
    }
    Json(json!({ "status": "approved" })).into_response()
}

async fn spawn_server() -> (String, Shared) {
    let state: Shared = Arc::new(Mutex::new(Mock { departments: seed(), ..Mock::default() }));
    let app = Router::new()
        .route("/api/organization/structure", get(structure))
        .route("/api/organization/categories/:id/subcategories", get(subcategories))
        .route("/api/organization/:kind/:id", put(update_node).delete(delete_node))
        .route("/api/expenses/:id", get(expense))
        .route("/api/expenses/:id/approve", post(approve))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}/api"), state)
}

fn client(base_url: &str, token: Option<&str>) -> Client {
    Client::new(&ApiConfig { base_url: base_url.to_string(), token: token.map(str::to_string) }).unwrap()
}

#[tokio::test]
async fn structure_sends_token_and_year() {
    let (url, state) = spawn_server().await;
    let org = client(&url, Some("secret")).organization_structure(Some(2025)).await.unwrap();

    assert_eq!(org.structure.len(), 1);
    assert_eq!(org.structure[0].categories[0].subcategories[0].name, "Offsite");
    assert!(!org.view_only);

    let mock = state.lock().unwrap();
    assert_eq!(mock.last_year.as_deref(), Some("2025"));
    assert_eq!(mock.last_auth.as_deref(), Some("Bearer secret"));
}

#[tokio::test]
async fn trailing_slash_in_base_url_is_ignored() {
    let (url, _state) = spawn_server().await;
    let org = client(&format!("{url}/"), None).organization_structure(None).await.unwrap();
    assert_eq!(org.structure[0].id, 1);
}

#[tokio::test]
async fn rejected_update_surfaces_server_message() {
    let (url, _state) = spawn_server().await;
    let req = UpdateNodeReq { name: None, budget: Some(d(-5)) };
    let err = client(&url, None).update_node(NodeKind::Department, 1, &req).await.unwrap_err();

    assert_eq!(err.status_code(), Some(422));
    match err {
        ApiError::Status { message, .. } => assert_eq!(message, "Budget must be non-negative"),
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn delete_of_missing_node_uses_error_field() {
    let (url, state) = spawn_server().await;
    let api = client(&url, None);

    let err = api.delete_node(NodeKind::Department, 999).await.unwrap_err();
    assert_eq!(err.to_string(), "Department not found (HTTP 404)");

    api.delete_node(NodeKind::Department, 1).await.unwrap();
    assert!(state.lock().unwrap().departments.is_empty());
}

#[tokio::test]
async fn plain_text_error_body_becomes_message() {
    let (url, _state) = spawn_server().await;
    let err = client(&url, None).expense(99).await.unwrap_err();
    assert_eq!(err.to_string(), "upstream exploded (HTTP 500)");
}

#[tokio::test]
async fn expense_impact_fills_in_missing_figures() {
    let (url, _state) = spawn_server().await;
    let expense = client(&url, None).expense(7).await.unwrap();
    assert!(expense.is_pending());
    assert_eq!(expense.amount, d(500));

    let impact = expense.budget_impact.as_ref().unwrap().resolve(expense.amount);
    let dept = impact.department.as_ref().unwrap();
    assert_eq!(dept.used, d(8800));
    assert_eq!(dept.remaining_after, d(700));
    assert_eq!(dept.usage_percent_after, d(93));
    assert!(!dept.will_exceed);

    let cat = impact.category.as_ref().unwrap();
    assert_eq!(cat.remaining_after, d(-100));
    assert!(cat.will_exceed);
    assert!(impact.subcategory.is_none());
    assert!(impact.any_will_exceed());
}

#[tokio::test]
async fn approve_conflict_reports_detail() {
    let (url, _state) = spawn_server().await;
    let api = client(&url, None);

    api.approve_expense(7, &DecisionReq::default()).await.unwrap();
    let err = api.approve_expense(8, &DecisionReq { comment: Some("ok".into()) }).await.unwrap_err();
    assert_eq!(err.status_code(), Some(409));
    assert!(err.to_string().starts_with("Expense already decided"));
}

#[tokio::test]
async fn welfare_subcategories_are_fetched_per_category() {
    let (url, _state) = spawn_server().await;
    let api = client(&url, None);
    let subs = api.welfare_subcategories(10).await.unwrap();
    assert_eq!(subs.len(), 1);
    assert_eq!(subs[0].id, 100);
    assert!(api.welfare_subcategories(11).await.unwrap().is_empty());
}

// ============= TUI state against the server =============

async fn settle(app: &mut App, done: impl Fn(&App) -> bool) {
    for _ in 0..100 {
        app.drain_loaded();
        if done(app) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("app state did not settle");
}

fn key(code: KeyCode) -> KeyEvent {
    KeyEvent::new(code, KeyModifiers::NONE)
}

#[tokio::test]
async fn budget_edit_commits_then_refetches() {
    let (url, state) = spawn_server().await;
    let mut app = App::new(client(&url, None), Some(2024), false);

    app.request_structure();
    settle(&mut app, |a| a.tree.loaded).await;
    assert_eq!(app.tree.departments[0].budget, d(10000));

    app.tree.sel.select(Some(0));
    app.handle_key(key(KeyCode::Char('e'))).await.unwrap();
    for _ in 0..8 {
        app.handle_key(key(KeyCode::Backspace)).await.unwrap();
    }
    for ch in "12500".chars() {
        app.handle_key(key(KeyCode::Char(ch))).await.unwrap();
    }
    app.handle_key(key(KeyCode::Enter)).await.unwrap();
    assert!(app.tree.ui.editing_budget.is_none());

    settle(&mut app, |a| a.tree.departments.first().map(|d| d.budget) == Some(d(12500))).await;
    assert_eq!(state.lock().unwrap().structure_hits, 2);
}

#[tokio::test]
async fn cancelled_edit_never_reaches_the_server() {
    let (url, state) = spawn_server().await;
    let mut app = App::new(client(&url, None), None, false);

    app.request_structure();
    settle(&mut app, |a| a.tree.loaded).await;

    app.tree.sel.select(Some(0));
    app.handle_key(key(KeyCode::Char('e'))).await.unwrap();
    app.handle_key(key(KeyCode::Char('9'))).await.unwrap();
    app.handle_key(key(KeyCode::Esc)).await.unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    app.drain_loaded();
    assert_eq!(app.tree.departments[0].budget, d(10000));
    let mock = state.lock().unwrap();
    assert_eq!(mock.structure_hits, 1);
    assert_eq!(mock.departments[0].budget, d(10000));
}

#[tokio::test]
async fn confirmed_delete_refetches_structure() {
    let (url, _state) = spawn_server().await;
    let mut app = App::new(client(&url, None), None, false);

    app.request_structure();
    settle(&mut app, |a| a.tree.loaded).await;

    app.tree.sel.select(Some(0));
    app.handle_key(key(KeyCode::Char('x'))).await.unwrap();
    assert!(app.tree.ui.pending_delete.is_some());
    app.handle_key(key(KeyCode::Char('y'))).await.unwrap();

    settle(&mut app, |a| a.tree.departments.is_empty()).await;
    assert!(app.tree.rows().is_empty());
}
