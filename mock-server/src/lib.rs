use std::{collections::HashMap, sync::Arc, time::Duration};

use axum::{
    body::Bytes,
    extract::{OriginalUri, Path, Query, State},
    http::{header, HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, get, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};

const DOCS: &str = "https://docs.github.com/rest";

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Issue {
    pub number: u64,
    pub title: String,
    pub body: Option<String>,
    pub state: String,
    pub locked: bool,
}

#[derive(Deserialize)]
pub struct CreateIssue {
    #[serde(default)]
    pub title: String,
    pub body: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdateIssue {
    pub title: Option<String>,
    pub state: Option<String>,
}

#[derive(Deserialize)]
pub struct IssueFilter {
    pub state: Option<String>,
}

/// Issues keyed by `owner/repo`.
pub type Db = Arc<RwLock<HashMap<String, Vec<Issue>>>>;

pub fn app() -> Router {
    let db: Db = Arc::new(RwLock::new(HashMap::new()));
    Router::new()
        .route("/repos/{owner}/{repo}", get(get_repo))
        .route("/repos/{owner}/{repo}/issues", get(list_issues).post(create_issue))
        .route(
            "/repos/{owner}/{repo}/issues/{number}",
            get(get_issue).patch(update_issue),
        )
        .route(
            "/repos/{owner}/{repo}/issues/{number}/lock",
            put(lock_issue).delete(unlock_issue),
        )
        .route("/repos/{owner}/{repo}/readme", get(readme))
        .route("/repos/{owner}/{repo}/tarball", get(tarball))
        .route("/redirect/{owner}/{repo}", get(redirect))
        .route("/reset", any(reset_content))
        .route("/slow", get(slow))
        .route("/echo", any(echo))
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "message": "Not Found", "documentation_url": DOCS })),
    )
        .into_response()
}

fn key(owner: &str, repo: &str) -> String {
    format!("{owner}/{repo}")
}

async fn get_repo(Path((owner, repo)): Path<(String, String)>, headers: HeaderMap) -> Response {
    let etag = format!("\"{owner}-{repo}\"");
    let cached = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == etag);
    if cached {
        return (StatusCode::NOT_MODIFIED, [(header::ETAG, etag)]).into_response();
    }
    if owner == "ghost" {
        return not_found();
    }
    let body = json!({
        "name": repo,
        "full_name": key(&owner, &repo),
        "owner": { "login": owner },
        "private": false,
    });
    ([(header::ETAG, etag)], Json(body)).into_response()
}

async fn list_issues(
    State(db): State<Db>,
    Path((owner, repo)): Path<(String, String)>,
    Query(filter): Query<IssueFilter>,
) -> Json<Vec<Issue>> {
    let state = filter.state.unwrap_or_else(|| "open".to_string());
    let issues = db.read().await;
    let matching = issues
        .get(&key(&owner, &repo))
        .map(|list| {
            list.iter()
                .filter(|i| state == "all" || i.state == state)
                .cloned()
                .collect()
        })
        .unwrap_or_default();
    Json(matching)
}

async fn create_issue(
    State(db): State<Db>,
    Path((owner, repo)): Path<(String, String)>,
    Json(input): Json<CreateIssue>,
) -> Response {
    if input.title.trim().is_empty() {
        let body = json!({
            "message": "Validation Failed",
            "errors": [{ "resource": "Issue", "code": "missing_field", "field": "title" }],
            "documentation_url": DOCS,
        });
        return (StatusCode::UNPROCESSABLE_ENTITY, Json(body)).into_response();
    }
    let mut issues = db.write().await;
    let list = issues.entry(key(&owner, &repo)).or_default();
    let issue = Issue {
        number: list.len() as u64 + 1,
        title: input.title,
        body: input.body,
        state: "open".to_string(),
        locked: false,
    };
    list.push(issue.clone());
    (StatusCode::CREATED, Json(issue)).into_response()
}

async fn get_issue(
    State(db): State<Db>,
    Path((owner, repo, number)): Path<(String, String, u64)>,
) -> Response {
    let issues = db.read().await;
    issues
        .get(&key(&owner, &repo))
        .and_then(|list| list.iter().find(|i| i.number == number))
        .map(|issue| Json(issue.clone()).into_response())
        .unwrap_or_else(not_found)
}

async fn update_issue(
    State(db): State<Db>,
    Path((owner, repo, number)): Path<(String, String, u64)>,
    Json(input): Json<UpdateIssue>,
) -> Response {
    let mut issues = db.write().await;
    let Some(issue) = issues
        .get_mut(&key(&owner, &repo))
        .and_then(|list| list.iter_mut().find(|i| i.number == number))
    else {
        return not_found();
    };
    if let Some(title) = input.title {
        issue.title = title;
    }
    if let Some(state) = input.state {
        issue.state = state;
    }
    Json(issue.clone()).into_response()
}

async fn set_locked(db: Db, owner: &str, repo: &str, number: u64, locked: bool) -> Response {
    let mut issues = db.write().await;
    match issues
        .get_mut(&key(owner, repo))
        .and_then(|list| list.iter_mut().find(|i| i.number == number))
    {
        Some(issue) => {
            issue.locked = locked;
            StatusCode::NO_CONTENT.into_response()
        }
        None => not_found(),
    }
}

async fn lock_issue(
    State(db): State<Db>,
    Path((owner, repo, number)): Path<(String, String, u64)>,
) -> Response {
    set_locked(db, &owner, &repo, number, true).await
}

async fn unlock_issue(
    State(db): State<Db>,
    Path((owner, repo, number)): Path<(String, String, u64)>,
) -> Response {
    set_locked(db, &owner, &repo, number, false).await
}

async fn readme(Path((_owner, repo)): Path<(String, String)>) -> Response {
    (
        [(header::CONTENT_TYPE, "text/plain")],
        format!("# {repo}\n"),
    )
        .into_response()
}

async fn tarball(Path((owner, repo)): Path<(String, String)>) -> Response {
    let mut bytes = vec![0x1f, 0x8b];
    bytes.extend_from_slice(key(&owner, &repo).as_bytes());
    (
        [(header::CONTENT_TYPE, "application/x-gzip")],
        Bytes::from(bytes),
    )
        .into_response()
}

async fn redirect(Path((owner, repo)): Path<(String, String)>) -> Response {
    (
        StatusCode::FOUND,
        [(header::LOCATION, format!("/repos/{owner}/{repo}"))],
    )
        .into_response()
}

async fn reset_content() -> Response {
    (
        StatusCode::RESET_CONTENT,
        [(header::CONTENT_TYPE, "application/json")],
    )
        .into_response()
}

async fn slow() -> &'static str {
    tokio::time::sleep(Duration::from_secs(2)).await;
    "done"
}

/// Reflects the request back as JSON.
async fn echo(
    method: Method,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    body: String,
) -> Json<Value> {
    let headers: serde_json::Map<String, Value> = headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                Value::from(String::from_utf8_lossy(value.as_bytes()).into_owned()),
            )
        })
        .collect();
    Json(json!({
        "method": method.as_str(),
        "path": uri.path(),
        "query": uri.query(),
        "headers": headers,
        "body": body,
    }))
}
