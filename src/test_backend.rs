use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::extract::{Multipart, Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub(crate) struct StubBackend {
    addr: SocketAddr,
    pub state: Arc<StubState>,
    handle: JoinHandle<()>,
}

impl StubBackend {
    pub(crate) async fn spawn() -> Self {
        let state = Arc::new(StubState::new());
        let router = build_router(state.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind stub backend");
        let addr = listener.local_addr().expect("stub backend addr");
        let handle = tokio::spawn(async move {
            axum::serve(listener, router).await.expect("serve stub backend");
        });
        Self { addr, state, handle }
    }

    pub(crate) fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }
}

impl Drop for StubBackend {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[derive(Default)]
pub(crate) struct CallCounters {
    pub me: AtomicUsize,
    pub notifications: AtomicUsize,
    pub mark_read: AtomicUsize,
    pub mark_all: AtomicUsize,
    pub files_search: AtomicUsize,
    pub requests: AtomicUsize,
    pub users: AtomicUsize,
    pub user_create: AtomicUsize,
}

#[derive(Default)]
pub(crate) struct UploadCapture {
    pub fields: HashMap<String, String>,
    pub file_name: String,
    pub content_type: String,
    pub bytes_len: usize,
}

pub(crate) struct StubState {
    pub token: String,
    pub password: String,
    pub user: Mutex<Value>,
    pub notifications: Mutex<Vec<Value>>,
    pub files: Mutex<Vec<Value>>,
    pub requests: Mutex<Vec<Value>>,
    pub users: Mutex<Vec<Value>>,
    pub download_name: Mutex<Option<String>>,
    pub download_bytes: Vec<u8>,
    pub calls: CallCounters,
    pub fail_files_search: AtomicBool,
    pub fail_mark_read: AtomicBool,
    pub me_raw_body: Mutex<Option<String>>,
    pub delay_searches: Mutex<HashMap<String, u64>>,
    pub last_login_body: Mutex<Option<Value>>,
    pub last_search_query: Mutex<Option<String>>,
    pub uploads: Mutex<Vec<UploadCapture>>,
    pub category_events: Mutex<Vec<String>>,
    pub file_updates: Mutex<Vec<(String, Value)>>,
    pub created_requests: Mutex<Vec<Value>>,
    pub reviewed_requests: Mutex<Vec<String>>,
    pub created_users: Mutex<Vec<Value>>,
    pub user_updates: Mutex<Vec<(String, Value)>>,
    pub removed_users: Mutex<Vec<String>>,
}

impl StubState {
    fn new() -> Self {
        Self {
            token: "tok-valid".to_string(),
            password: "campus-pass".to_string(),
            user: Mutex::new(json!({
                "id": "u-admin",
                "name": "Alma Admin",
                "email": "alma@dept.edu",
                "role": "Admin",
                "avatar": "/img/admin.png",
                "department": "Library"
            })),
            notifications: Mutex::new(vec![
                json!({
                    "id": "n-100",
                    "title": "Request approved",
                    "message": "Your borrow request was approved",
                    "createdAt": "2025-03-01T09:00:00Z",
                    "read": true
                }),
                json!({
                    "id": "n-101",
                    "message": "Return the acoustics handbook",
                    "createdAt": "2025-03-01T10:00:00Z",
                    "isRead": false
                }),
                json!({
                    "id": "n-102",
                    "message": "New file in Architecture",
                    "createdAt": "2025-03-01T11:00:00Z"
                }),
            ]),
            files: Mutex::new(vec![
                json!({
                    "id": "f-doc1",
                    "title": "Acoustics Handbook",
                    "category": "Reference",
                    "fileName": "acoustics.pdf",
                    "size": 123_456,
                    "uploadedBy": "u-admin",
                    "createdAt": "2025-01-10T08:00:00Z"
                }),
                json!({
                    "id": "f-doc2",
                    "title": "abc guide",
                    "description": "orientation abc",
                    "filename": "abc-guide.pdf"
                }),
            ]),
            requests: Mutex::new(vec![
                json!({
                    "id": "r-1",
                    "fileId": "f-doc1",
                    "title": "ABC binder request",
                    "status": "pending",
                    "requestedBy": "u-staff",
                    "createdAt": "2025-02-01T12:00:00Z"
                }),
                json!({
                    "id": "r-2",
                    "title": "Spare projector key",
                    "status": "APPROVED"
                }),
            ]),
            users: Mutex::new(vec![
                json!({
                    "id": "u-admin",
                    "name": "Alma Admin",
                    "email": "alma@dept.edu",
                    "role": "Admin",
                    "avatar": "/img/admin.png"
                }),
                json!({
                    "id": "u-staff",
                    "name": "Sam Staff",
                    "email": "sam@dept.edu",
                    "role": "staff",
                    "avatarUrl": "/img/staff.png"
                }),
            ]),
            download_name: Mutex::new(None),
            download_bytes: b"%PDF-1.4 stub body".to_vec(),
            calls: CallCounters::default(),
            fail_files_search: AtomicBool::new(false),
            fail_mark_read: AtomicBool::new(false),
            me_raw_body: Mutex::new(None),
            delay_searches: Mutex::new(HashMap::new()),
            last_login_body: Mutex::new(None),
            last_search_query: Mutex::new(None),
            uploads: Mutex::new(Vec::new()),
            category_events: Mutex::new(Vec::new()),
            file_updates: Mutex::new(Vec::new()),
            created_requests: Mutex::new(Vec::new()),
            reviewed_requests: Mutex::new(Vec::new()),
            created_users: Mutex::new(Vec::new()),
            user_updates: Mutex::new(Vec::new()),
            removed_users: Mutex::new(Vec::new()),
        }
    }
}

/// Poll `condition` until it holds or a generous deadline passes. Keeps the
/// timing-sensitive tests honest without mocked clocks.
pub(crate) async fn wait_for<F>(what: &str, condition: F)
where
    F: Fn() -> bool,
{
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if condition() {
            return;
        }
        if Instant::now() > deadline {
            panic!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(15)).await;
    }
}

type Failure = (StatusCode, Json<Value>);

fn build_router(state: Arc<StubState>) -> Router {
    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/me", get(me))
        .route("/notifications", get(list_notifications))
        .route("/notifications/read-all", patch(mark_all_read))
        .route("/notifications/:id/read", patch(mark_read))
        .route("/files", get(list_files).post(upload_file))
        .route("/files/search", get(search_files))
        .route("/files/:id", patch(update_file).delete(delete_file))
        .route("/files/:id/download", get(download_file))
        .route("/categories", get(list_categories).post(create_category))
        .route("/categories/:id", patch(update_category).delete(delete_category))
        .route("/requests", get(list_requests).post(create_request))
        .route("/requests/:id/approve", patch(approve_request))
        .route("/requests/:id/decline", patch(decline_request))
        .route("/users", get(list_users).post(create_user))
        .route("/users/:id", patch(update_user).delete(delete_user))
        .with_state(state)
}

fn authorize(state: &StubState, headers: &HeaderMap) -> Result<(), Failure> {
    let expected = format!("Bearer {}", state.token);
    let provided = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());
    if provided == Some(expected.as_str()) {
        Ok(())
    } else {
        Err((
            StatusCode::UNAUTHORIZED,
            Json(json!({"message": "Token expired"})),
        ))
    }
}

async fn login(
    State(state): State<Arc<StubState>>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, Failure> {
    *state.last_login_body.lock().unwrap() = Some(body.clone());
    let password = body.get("password").and_then(Value::as_str).unwrap_or_default();
    if password != state.password {
        return Err((
            StatusCode::UNAUTHORIZED,
            Json(json!({"message": "Invalid user ID or password."})),
        ));
    }
    let user = state.user.lock().unwrap().clone();
    Ok(Json(json!({"token": state.token, "user": user})))
}

async fn me(
    State(state): State<Arc<StubState>>,
    headers: HeaderMap,
) -> Result<Response, Failure> {
    state.calls.me.fetch_add(1, Ordering::SeqCst);
    authorize(&state, &headers)?;
    if let Some(raw) = state.me_raw_body.lock().unwrap().clone() {
        let response = Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "application/json")
            .body(axum::body::Body::from(raw))
            .expect("raw me response");
        return Ok(response);
    }
    let user = state.user.lock().unwrap().clone();
    Ok(Json(json!({"user": user})).into_response())
}

async fn list_notifications(
    State(state): State<Arc<StubState>>,
    headers: HeaderMap,
) -> Result<Json<Value>, Failure> {
    state.calls.notifications.fetch_add(1, Ordering::SeqCst);
    authorize(&state, &headers)?;
    let rows = state.notifications.lock().unwrap().clone();
    Ok(Json(json!({"notifications": rows})))
}

async fn mark_read(
    State(state): State<Arc<StubState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Value>, Failure> {
    state.calls.mark_read.fetch_add(1, Ordering::SeqCst);
    authorize(&state, &headers)?;
    if state.fail_mark_read.load(Ordering::SeqCst) {
        return Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"message": "ack failed"})),
        ));
    }
    let mut rows = state.notifications.lock().unwrap();
    for row in rows.iter_mut() {
        if row.get("id").and_then(Value::as_str) == Some(id.as_str()) {
            row["read"] = json!(true);
        }
    }
    Ok(Json(json!({"message": "ok"})))
}

async fn mark_all_read(
    State(state): State<Arc<StubState>>,
    headers: HeaderMap,
) -> Result<Json<Value>, Failure> {
    state.calls.mark_all.fetch_add(1, Ordering::SeqCst);
    authorize(&state, &headers)?;
    let mut rows = state.notifications.lock().unwrap();
    for row in rows.iter_mut() {
        row["read"] = json!(true);
    }
    Ok(Json(json!({"message": "ok"})))
}

async fn list_files(
    State(state): State<Arc<StubState>>,
    headers: HeaderMap,
) -> Result<Json<Value>, Failure> {
    authorize(&state, &headers)?;
    let rows = state.files.lock().unwrap().clone();
    Ok(Json(json!({"files": rows})))
}

async fn search_files(
    State(state): State<Arc<StubState>>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Result<Json<Value>, Failure> {
    state.calls.files_search.fetch_add(1, Ordering::SeqCst);
    authorize(&state, &headers)?;
    let query = params.get("q").cloned().unwrap_or_default();
    *state.last_search_query.lock().unwrap() = Some(query.clone());

    let delay = state.delay_searches.lock().unwrap().get(&query).copied();
    if let Some(ms) = delay {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
    if state.fail_files_search.load(Ordering::SeqCst) {
        return Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"message": "files search exploded"})),
        ));
    }

    let needle = query.to_lowercase();
    let rows: Vec<Value> = state
        .files
        .lock()
        .unwrap()
        .iter()
        .filter(|row| {
            ["title", "description"].iter().any(|key| {
                row.get(key)
                    .and_then(Value::as_str)
                    .map(|text| text.to_lowercase().contains(&needle))
                    .unwrap_or(false)
            })
        })
        .cloned()
        .collect();
    Ok(Json(json!({"files": rows})))
}

async fn upload_file(
    State(state): State<Arc<StubState>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<Value>, Failure> {
    authorize(&state, &headers)?;
    let mut capture = UploadCapture::default();
    while let Some(field) = multipart.next_field().await.expect("multipart field") {
        let name = field.name().unwrap_or_default().to_string();
        if name == "file" {
            capture.file_name = field.file_name().unwrap_or_default().to_string();
            capture.content_type = field.content_type().unwrap_or_default().to_string();
            capture.bytes_len = field.bytes().await.expect("file bytes").len();
        } else {
            let value = field.text().await.expect("field text");
            capture.fields.insert(name, value);
        }
    }
    let title = capture.fields.get("title").cloned().unwrap_or_default();
    state.uploads.lock().unwrap().push(capture);
    Ok(Json(json!({"id": "f-new", "title": title})))
}

async fn update_file(
    State(state): State<Arc<StubState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>, Failure> {
    authorize(&state, &headers)?;
    state.file_updates.lock().unwrap().push((id.clone(), body.clone()));
    let mut record = json!({"id": id, "title": "Acoustics Handbook"});
    if let (Some(target), Some(patch)) = (record.as_object_mut(), body.as_object()) {
        target.extend(patch.clone());
    }
    Ok(Json(record))
}

async fn delete_file(
    State(state): State<Arc<StubState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Value>, Failure> {
    authorize(&state, &headers)?;
    state.files.lock().unwrap().retain(|row| {
        row.get("id").and_then(Value::as_str) != Some(id.as_str())
    });
    Ok(Json(json!({"message": "deleted"})))
}

async fn download_file(
    State(state): State<Arc<StubState>>,
    Path(_id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, Failure> {
    authorize(&state, &headers)?;
    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/pdf");
    if let Some(name) = state.download_name.lock().unwrap().clone() {
        builder = builder.header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{name}\""),
        );
    }
    Ok(builder
        .body(axum::body::Body::from(state.download_bytes.clone()))
        .expect("download response"))
}

async fn list_categories(
    State(state): State<Arc<StubState>>,
    headers: HeaderMap,
) -> Result<Json<Value>, Failure> {
    authorize(&state, &headers)?;
    Ok(Json(json!({"categories": [
        {"id": "c-1", "name": "Reference"},
        {"id": "c-2", "name": "Manuals", "description": "equipment manuals"}
    ]})))
}

async fn create_category(
    State(state): State<Arc<StubState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>, Failure> {
    authorize(&state, &headers)?;
    let name = body.get("name").and_then(Value::as_str).unwrap_or_default().to_string();
    state.category_events.lock().unwrap().push(format!("create:{name}"));
    Ok(Json(json!({"id": "c-new", "name": name, "description": body.get("description")})))
}

async fn update_category(
    State(state): State<Arc<StubState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>, Failure> {
    authorize(&state, &headers)?;
    state.category_events.lock().unwrap().push(format!("update:{id}"));
    let name = body.get("name").and_then(Value::as_str).unwrap_or_default();
    Ok(Json(json!({"id": id, "name": name})))
}

async fn delete_category(
    State(state): State<Arc<StubState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Value>, Failure> {
    authorize(&state, &headers)?;
    state.category_events.lock().unwrap().push(format!("delete:{id}"));
    Ok(Json(json!({"message": "deleted"})))
}

async fn list_requests(
    State(state): State<Arc<StubState>>,
    headers: HeaderMap,
) -> Result<Json<Value>, Failure> {
    state.calls.requests.fetch_add(1, Ordering::SeqCst);
    authorize(&state, &headers)?;
    let rows = state.requests.lock().unwrap().clone();
    Ok(Json(json!({"requests": rows})))
}

async fn create_request(
    State(state): State<Arc<StubState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>, Failure> {
    authorize(&state, &headers)?;
    state.created_requests.lock().unwrap().push(body.clone());
    Ok(Json(json!({
        "id": "r-new",
        "fileId": body.get("fileId"),
        "status": "pending"
    })))
}

async fn approve_request(
    State(state): State<Arc<StubState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Value>, Failure> {
    authorize(&state, &headers)?;
    state.reviewed_requests.lock().unwrap().push(format!("approve:{id}"));
    Ok(Json(json!({"message": "ok"})))
}

async fn decline_request(
    State(state): State<Arc<StubState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Value>, Failure> {
    authorize(&state, &headers)?;
    state.reviewed_requests.lock().unwrap().push(format!("decline:{id}"));
    Ok(Json(json!({"message": "ok"})))
}

async fn list_users(
    State(state): State<Arc<StubState>>,
    headers: HeaderMap,
) -> Result<Json<Value>, Failure> {
    state.calls.users.fetch_add(1, Ordering::SeqCst);
    authorize(&state, &headers)?;
    let rows = state.users.lock().unwrap().clone();
    Ok(Json(json!({"users": rows})))
}

async fn create_user(
    State(state): State<Arc<StubState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>, Failure> {
    state.calls.user_create.fetch_add(1, Ordering::SeqCst);
    authorize(&state, &headers)?;
    state.created_users.lock().unwrap().push(body.clone());
    let id = body
        .get("userId")
        .and_then(Value::as_str)
        .unwrap_or("u-new")
        .to_string();
    Ok(Json(json!({
        "id": id,
        "name": body.get("name"),
        "email": body.get("email"),
        "role": body.get("role"),
        "avatar": "/img/new.png"
    })))
}

async fn update_user(
    State(state): State<Arc<StubState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>, Failure> {
    authorize(&state, &headers)?;
    state.user_updates.lock().unwrap().push((id.clone(), body.clone()));
    Ok(Json(json!({
        "id": id,
        "role": body.get("role").cloned().unwrap_or_else(|| json!("staff")),
        "avatar": "/img/staff.png"
    })))
}

async fn delete_user(
    State(state): State<Arc<StubState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Value>, Failure> {
    authorize(&state, &headers)?;
    state.removed_users.lock().unwrap().push(id);
    Ok(Json(json!({"message": "deleted"})))
}
