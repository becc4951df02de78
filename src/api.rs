use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Json, Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{delete, get, post},
    Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, warn};
use url::Url;
use uuid::Uuid;

use crate::{
    app_state::{AppState, Status},
    auth::{AdminSession, Session},
    error::TreeError,
    export, filter,
    models::{
        Comment, CommentMap, Company, CompanyGroup, CompanyStats, CustomTag, CustomTagType,
        FilterOptions, GroupSummary, ParentCompany, TagMap,
    },
    stats, tree,
};

/// Los JSON scrapeados de grupos grandes superan el límite por defecto de axum.
const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

type ApiError = (StatusCode, Json<serde_json::Value>);

// --- Payloads y Respuestas de la API ---

#[derive(Deserialize)]
pub struct LoginPayload {
    username: String,
    password: String,
}

#[derive(Deserialize)]
pub struct NewGroupPayload {
    name: String,
    #[serde(default)]
    description: Option<String>,
    data: serde_json::Value,
}

#[derive(Deserialize)]
pub struct UpdateGroupPayload {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Deserialize)]
pub struct AddTagPayload {
    #[serde(rename = "type")]
    tag_type: CustomTagType,
    #[serde(default)]
    modules: Option<Vec<String>>,
}

#[derive(Deserialize)]
pub struct AddCommentPayload {
    #[serde(alias = "comment")]
    text: String,
    #[serde(default)]
    author: Option<String>,
}

/// Fila de la vista de listado: el nodo sin hijos, enriquecido con la
/// clasificación y las etiquetas personalizadas.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyRow {
    account_id: String,
    name: String,
    depth: u32,
    all_tags: Vec<String>,
    sector: Option<String>,
    size: Option<String>,
    international: bool,
    website: Option<String>,
    website_host: Option<String>,
    profile_url: Option<String>,
    parent_company: Option<ParentCompany>,
    subsidiary_count: usize,
    custom_tags: Vec<CustomTag>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Breadcrumb {
    account_id: String,
    name: String,
    depth: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyDetail {
    company: Company,
    path: Vec<Breadcrumb>,
    sector: Option<String>,
    size: Option<String>,
    international: bool,
    tags: Vec<CustomTag>,
    comments: Vec<Comment>,
}

// --- Router ---

pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/api/status", get(status_handler))
        .route("/api/auth/login", post(login_handler))
        .route("/api/auth/logout", post(logout_handler))
        .route("/api/auth/session", get(session_handler))
        .route("/api/groups", get(list_groups_handler).post(create_group_handler))
        .route(
            "/api/groups/:id",
            get(get_group_handler)
                .put(update_group_handler)
                .delete(delete_group_handler),
        )
        .route("/api/groups/:id/stats", get(stats_handler))
        .route("/api/groups/:id/tree", get(tree_handler))
        .route("/api/groups/:id/companies", get(companies_handler))
        .route("/api/groups/:id/companies/:account_id", get(company_detail_handler))
        .route("/api/groups/:id/export.csv", get(export_csv_handler))
        .route("/api/groups/:id/tags", get(group_tags_handler))
        .route("/api/groups/:id/comments", get(group_comments_handler))
        .route("/api/groups/:id/companies/:account_id/tags", post(add_tag_handler))
        .route(
            "/api/groups/:id/companies/:account_id/tags/:tag_type",
            delete(remove_tag_handler),
        )
        .route("/api/groups/:id/companies/:account_id/comments", post(add_comment_handler))
        .route(
            "/api/groups/:id/companies/:account_id/comments/:comment_id",
            delete(delete_comment_handler),
        )
        .route("/api/shutdown", post(shutdown_handler))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(app_state)
}

// --- Utilidades ---

fn api_error(err: TreeError) -> ApiError {
    let status = match &err {
        TreeError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        TreeError::NotFound(_) => StatusCode::NOT_FOUND,
        TreeError::Storage(_) => {
            error!("Error de almacenamiento: {}", err);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, Json(json!({ "error": err.to_string() })))
}

async fn load_group(state: &AppState, id: &str) -> Result<CompanyGroup, ApiError> {
    state
        .store
        .get_group(id)
        .await
        .map_err(api_error)?
        .ok_or_else(|| api_error(TreeError::NotFound(format!("Grupo {id}"))))
}

fn company_in<'a>(group: &'a CompanyGroup, account_id: &str) -> Result<&'a Company, ApiError> {
    tree::find_by_id(&group.data, account_id).ok_or_else(|| {
        api_error(TreeError::NotFound(format!(
            "Empresa {account_id} en el grupo {}",
            group.id
        )))
    })
}

fn website_host(website: &str) -> Option<String> {
    let website = website.trim();
    Url::parse(website)
        .or_else(|_| Url::parse(&format!("https://{website}")))
        .ok()
        .and_then(|url| url.host_str().map(str::to_string))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn company_row(state: &AppState, company: &Company, tags: &TagMap) -> CompanyRow {
    let classifier = &state.classifier;
    CompanyRow {
        account_id: company.account_id.clone(),
        name: company.name.clone(),
        depth: company.depth,
        all_tags: company.all_tags.clone(),
        sector: classifier.sector_of(company).map(str::to_string),
        size: classifier.size_of(company).map(str::to_string),
        international: classifier.is_international(company),
        website: company.website.clone().filter(|_| company.has_website()),
        website_host: company.website.as_deref().filter(|_| company.has_website()).and_then(website_host),
        profile_url: company.profile_url.clone(),
        parent_company: company.parent_company.clone(),
        subsidiary_count: company.subsidiary_count(),
        custom_tags: tags.get(&company.account_id).cloned().unwrap_or_default(),
    }
}

// --- Handlers públicos ---

#[axum::debug_handler]
async fn status_handler(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let status: Status = state
        .status
        .lock()
        .map(|s| s.clone())
        .unwrap_or_else(|poisoned| poisoned.into_inner().clone());
    let groups = state.store.list_groups().await.map_err(api_error)?;
    Ok(Json(json!({ "status": status, "groups": groups.len() })))
}

#[axum::debug_handler]
async fn list_groups_handler(
    State(state): State<AppState>,
) -> Result<Json<Vec<GroupSummary>>, ApiError> {
    state.store.list_groups().await.map(Json).map_err(api_error)
}

#[axum::debug_handler]
async fn get_group_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CompanyGroup>, ApiError> {
    load_group(&state, &id).await.map(Json)
}

#[axum::debug_handler]
async fn stats_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CompanyStats>, ApiError> {
    let group = load_group(&state, &id).await?;
    Ok(Json(stats::compute_stats(&group.data, &state.classifier)))
}

#[axum::debug_handler]
async fn tree_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(filters): Query<FilterOptions>,
) -> Result<Json<Option<Company>>, ApiError> {
    let group = load_group(&state, &id).await?;
    if filters.is_empty() {
        return Ok(Json(Some(group.data)));
    }
    Ok(Json(filter::filter_tree(&group.data, &filters, &state.classifier)))
}

#[axum::debug_handler]
async fn companies_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(filters): Query<FilterOptions>,
) -> Result<Json<Vec<CompanyRow>>, ApiError> {
    let group = load_group(&state, &id).await?;
    let tags = state.store.get_tags(&id).await.map_err(api_error)?;

    let rows = match filter::filter_tree(&group.data, &filters, &state.classifier) {
        Some(filtered) => tree::flatten(&filtered)
            .map(|company| company_row(&state, company, &tags))
            .collect(),
        None => Vec::new(),
    };
    Ok(Json(rows))
}

#[axum::debug_handler]
async fn company_detail_handler(
    State(state): State<AppState>,
    Path((id, account_id)): Path<(String, String)>,
) -> Result<Json<CompanyDetail>, ApiError> {
    let group = load_group(&state, &id).await?;
    let company = company_in(&group, &account_id)?;

    let mut tags = state.store.get_tags(&id).await.map_err(api_error)?;
    let mut comments = state.store.get_comments(&id).await.map_err(api_error)?;
    let classifier = &state.classifier;

    let path = tree::get_path(&group.data, &account_id)
        .into_iter()
        .map(|node| Breadcrumb {
            account_id: node.account_id.clone(),
            name: node.name.clone(),
            depth: node.depth,
        })
        .collect();

    // El detalle no incluye el subárbol completo, sólo los hijos directos.
    let mut shallow = company.clone();
    for child in &mut shallow.subsidiaries {
        child.subsidiaries.clear();
    }

    Ok(Json(CompanyDetail {
        sector: classifier.sector_of(company).map(str::to_string),
        size: classifier.size_of(company).map(str::to_string),
        international: classifier.is_international(company),
        tags: tags.remove(&account_id).unwrap_or_default(),
        comments: comments.remove(&account_id).unwrap_or_default(),
        path,
        company: shallow,
    }))
}

#[axum::debug_handler]
async fn export_csv_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(filters): Query<FilterOptions>,
) -> Result<impl IntoResponse, ApiError> {
    let group = load_group(&state, &id).await?;
    let tags = state.store.get_tags(&id).await.map_err(api_error)?;

    let filtered = filter::filter_tree(&group.data, &filters, &state.classifier);
    let csv = match &filtered {
        Some(root) => export::export_to_csv(tree::flatten(root), &state.classifier, &tags),
        None => export::export_to_csv(std::iter::empty(), &state.classifier, &tags),
    };

    let filename: String = group
        .name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    info!("Exportado CSV del grupo {} ({} bytes)", id, csv.len());

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}.csv\""),
            ),
        ],
        csv,
    ))
}

#[axum::debug_handler]
async fn group_tags_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TagMap>, ApiError> {
    load_group(&state, &id).await?;
    state.store.get_tags(&id).await.map(Json).map_err(api_error)
}

#[axum::debug_handler]
async fn group_comments_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CommentMap>, ApiError> {
    load_group(&state, &id).await?;
    state.store.get_comments(&id).await.map(Json).map_err(api_error)
}

// --- Sesión de administrador ---

#[axum::debug_handler]
async fn login_handler(
    State(state): State<AppState>,
    Json(payload): Json<LoginPayload>,
) -> Result<Json<Session>, ApiError> {
    let cfg = &state.config;
    match state.sessions.login(
        &cfg.admin_username,
        &cfg.admin_password,
        &payload.username,
        &payload.password,
    ) {
        Some(session) => {
            info!("Sesión de administrador abierta para {}", session.username);
            Ok(Json(session))
        }
        None => {
            warn!("Intento de login fallido para {}", payload.username);
            Err((
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "Credenciales incorrectas." })),
            ))
        }
    }
}

#[axum::debug_handler]
async fn logout_handler(
    State(state): State<AppState>,
    AdminSession(session): AdminSession,
) -> StatusCode {
    state.sessions.revoke(&session.token);
    info!("Sesión cerrada para {}", session.username);
    StatusCode::NO_CONTENT
}

#[axum::debug_handler(state = AppState)]
async fn session_handler(AdminSession(session): AdminSession) -> Json<Session> {
    Json(session)
}

// --- Handlers de administración ---

#[axum::debug_handler]
async fn create_group_handler(
    State(state): State<AppState>,
    AdminSession(session): AdminSession,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    // Se decodifica aquí para que un árbol demasiado profundo (límite de
    // anidamiento de serde_json) responda como el resto de entradas inválidas.
    let payload: NewGroupPayload = serde_json::from_slice(&body).map_err(|e| {
        api_error(TreeError::InvalidInput(format!(
            "El cuerpo no es un grupo válido (máximo {} niveles): {e}",
            tree::MAX_TREE_DEPTH
        )))
    })?;
    let name = non_blank(Some(payload.name)).ok_or_else(|| {
        api_error(TreeError::InvalidInput("El grupo necesita un nombre.".to_string()))
    })?;
    let data = tree::parse_tree(payload.data).map_err(api_error)?;

    let now = Utc::now();
    let group = CompanyGroup {
        id: Uuid::new_v4().to_string(),
        name,
        description: non_blank(payload.description),
        created_at: now,
        updated_at: now,
        data,
    };
    state.store.save_group(&group).await.map_err(api_error)?;

    let summary = GroupSummary::from(&group);
    info!(
        "Grupo '{}' creado por {} ({} empresas)",
        summary.name, session.username, summary.total_companies
    );
    Ok((StatusCode::CREATED, Json(summary)))
}

#[axum::debug_handler]
async fn update_group_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    AdminSession(_session): AdminSession,
    Json(payload): Json<UpdateGroupPayload>,
) -> Result<Json<GroupSummary>, ApiError> {
    let mut group = load_group(&state, &id).await?;

    if let Some(name) = payload.name {
        group.name = non_blank(Some(name)).ok_or_else(|| {
            api_error(TreeError::InvalidInput("El nombre no puede estar vacío.".to_string()))
        })?;
    }
    if payload.description.is_some() {
        group.description = non_blank(payload.description);
    }
    group.updated_at = Utc::now();

    state.store.save_group(&group).await.map_err(api_error)?;
    info!("Grupo {} actualizado", id);
    Ok(Json(GroupSummary::from(&group)))
}

#[axum::debug_handler]
async fn delete_group_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    AdminSession(session): AdminSession,
) -> Result<StatusCode, ApiError> {
    if !state.store.delete_group(&id).await.map_err(api_error)? {
        return Err(api_error(TreeError::NotFound(format!("Grupo {id}"))));
    }
    info!("Grupo {} eliminado por {}", id, session.username);
    Ok(StatusCode::NO_CONTENT)
}

#[axum::debug_handler]
async fn add_tag_handler(
    State(state): State<AppState>,
    Path((id, account_id)): Path<(String, String)>,
    AdminSession(_session): AdminSession,
    Json(payload): Json<AddTagPayload>,
) -> Result<Json<Vec<CustomTag>>, ApiError> {
    let group = load_group(&state, &id).await?;
    company_in(&group, &account_id)?;

    let tag = CustomTag::new(payload.tag_type, payload.modules);
    let tags = state
        .store
        .add_tag(&id, &account_id, tag)
        .await
        .map_err(api_error)?;
    info!("Etiqueta {} asignada a {} en {}", payload.tag_type, account_id, id);
    Ok(Json(tags))
}

#[axum::debug_handler]
async fn remove_tag_handler(
    State(state): State<AppState>,
    Path((id, account_id, tag_type)): Path<(String, String, String)>,
    AdminSession(_session): AdminSession,
) -> Result<StatusCode, ApiError> {
    let tag_type: CustomTagType = tag_type.parse().map_err(api_error)?;
    let removed = state
        .store
        .remove_tag(&id, &account_id, tag_type)
        .await
        .map_err(api_error)?;
    if !removed {
        return Err(api_error(TreeError::NotFound(format!(
            "Etiqueta {tag_type} en {account_id}"
        ))));
    }
    info!("Etiqueta {} retirada de {} en {}", tag_type, account_id, id);
    Ok(StatusCode::NO_CONTENT)
}

#[axum::debug_handler]
async fn add_comment_handler(
    State(state): State<AppState>,
    Path((id, account_id)): Path<(String, String)>,
    AdminSession(session): AdminSession,
    Json(payload): Json<AddCommentPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let text = non_blank(Some(payload.text)).ok_or_else(|| {
        api_error(TreeError::InvalidInput("El comentario está vacío.".to_string()))
    })?;
    let group = load_group(&state, &id).await?;
    company_in(&group, &account_id)?;

    let author = non_blank(payload.author).or(Some(session.username));
    let comment = state
        .store
        .add_comment(&id, &account_id, Comment::new(text, author))
        .await
        .map_err(api_error)?;
    info!("Comentario {} añadido a {} en {}", comment.id, account_id, id);
    Ok((StatusCode::CREATED, Json(comment)))
}

#[axum::debug_handler]
async fn delete_comment_handler(
    State(state): State<AppState>,
    Path((id, account_id, comment_id)): Path<(String, String, String)>,
    AdminSession(_session): AdminSession,
) -> Result<StatusCode, ApiError> {
    state
        .store
        .delete_comment(&id, &account_id, &comment_id)
        .await
        .map_err(api_error)?;
    info!("Comentario {} eliminado de {} en {}", comment_id, account_id, id);
    Ok(StatusCode::NO_CONTENT)
}

// --- Handler de Apagado ---

#[axum::debug_handler]
async fn shutdown_handler(
    State(state): State<AppState>,
    AdminSession(session): AdminSession,
) -> impl IntoResponse {
    info!("Petición de apagado recibida de {}.", session.username);
    let sender = state
        .shutdown_sender
        .lock()
        .map(|mut s| s.take())
        .unwrap_or(None);
    if let Some(sender) = sender {
        let _ = sender.send(());
    }
    StatusCode::OK
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        auth::SessionStore,
        classify::{ClassificationTable, Classifier},
        config::{AppConfig, StorageBackend},
        store::MemoryStore,
        tree::tests::sample_tree,
    };
    use axum::{body::Body, http::Request};
    use http_body_util::BodyExt;
    use std::{
        path::PathBuf,
        sync::{Arc, Mutex},
    };
    use tower::ServiceExt;

    fn test_app() -> Router {
        let config = AppConfig {
            server_addr: "127.0.0.1:0".into(),
            frontend_dir: PathBuf::from("frontend"),
            open_browser: false,
            storage_backend: StorageBackend::Memory,
            data_dir: PathBuf::from("data"),
            classifier_path: None,
            admin_username: "admin".into(),
            admin_password: "secret".into(),
            session_ttl_hours: 1,
        };
        let state = AppState {
            sessions: SessionStore::new(config.session_ttl_hours),
            config,
            store: Arc::new(MemoryStore::default()),
            classifier: Arc::new(Classifier::from_table(ClassificationTable::default()).unwrap()),
            status: Arc::new(Mutex::new(Status::default())),
            shutdown_sender: Arc::new(Mutex::new(None)),
        };
        create_router(state)
    }

    async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, Vec<u8>) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, bytes.to_vec())
    }

    fn json_of(bytes: &[u8]) -> serde_json::Value {
        serde_json::from_slice(bytes).unwrap()
    }

    async fn login(app: &Router) -> String {
        let (status, body) = send(
            app,
            "POST",
            "/api/auth/login",
            None,
            Some(json!({ "username": "admin", "password": "secret" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        json_of(&body)["token"].as_str().unwrap().to_string()
    }

    async fn create_group(app: &Router, token: &str) -> String {
        let (status, body) = send(
            app,
            "POST",
            "/api/groups",
            Some(token),
            Some(json!({ "name": "Grupo Energía", "data": serde_json::to_value(sample_tree()).unwrap() })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let summary = json_of(&body);
        assert_eq!(summary["totalCompanies"], 4);
        summary["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn admin_routes_require_a_session() {
        let app = test_app();
        let payload = json!({ "name": "x", "data": serde_json::to_value(sample_tree()).unwrap() });

        let (status, _) = send(&app, "POST", "/api/groups", None, Some(payload.clone())).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = send(&app, "POST", "/api/groups", Some("bogus"), Some(payload)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = send(
            &app,
            "POST",
            "/api/auth/login",
            None,
            Some(json!({ "username": "admin", "password": "nope" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn logout_revokes_the_token() {
        let app = test_app();
        let token = login(&app).await;
        let (status, _) = send(&app, "GET", "/api/auth/session", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = send(&app, "POST", "/api/auth/logout", Some(&token), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&app, "GET", "/api/auth/session", Some(&token), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn viewer_endpoints_over_an_uploaded_group() {
        let app = test_app();
        let token = login(&app).await;
        let id = create_group(&app, &token).await;

        let (status, body) = send(&app, "GET", "/api/groups", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_of(&body).as_array().unwrap().len(), 1);

        let (_, body) = send(&app, "GET", &format!("/api/groups/{id}/stats"), None, None).await;
        let stats = json_of(&body);
        assert_eq!(stats["totalCompanies"], 4);
        assert_eq!(stats["maxDepth"], 2);
        assert_eq!(stats["companiesByDepth"]["1"], 2);

        let (_, body) = send(&app, "GET", &format!("/api/groups/{id}/companies?searchTerm=C&sector="), None, None).await;
        let names: Vec<String> = json_of(&body)
            .as_array()
            .unwrap()
            .iter()
            .map(|row| row["name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["A", "B", "C"]);

        let (status, body) = send(&app, "GET", &format!("/api/groups/{id}/tree?searchTerm=zzz"), None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(json_of(&body).is_null());

        let (_, body) = send(&app, "GET", &format!("/api/groups/{id}/companies/c"), None, None).await;
        let detail = json_of(&body);
        let crumbs: Vec<&str> = detail["path"]
            .as_array()
            .unwrap()
            .iter()
            .map(|b| b["accountId"].as_str().unwrap())
            .collect();
        assert_eq!(crumbs, vec!["a", "b", "c"]);
        assert_eq!(detail["sector"], "Energy");

        let (status, _) = send(&app, "GET", &format!("/api/groups/{id}/companies/zzz"), None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = send(&app, "GET", &format!("/api/groups/{id}/export.csv?depth=1"), None, None).await;
        assert_eq!(status, StatusCode::OK);
        let csv = String::from_utf8(body).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("name,accountId,depth"));
    }

    #[tokio::test]
    async fn annotations_are_joined_to_companies() {
        let app = test_app();
        let token = login(&app).await;
        let id = create_group(&app, &token).await;

        let tag_uri = format!("/api/groups/{id}/companies/b/tags");
        let (status, _) = send(&app, "POST", &tag_uri, Some(&token), Some(json!({ "type": "TOP20" }))).await;
        assert_eq!(status, StatusCode::OK);
        let (_, body) = send(&app, "POST", &tag_uri, Some(&token), Some(json!({ "type": "TOP20" }))).await;
        assert_eq!(json_of(&body).as_array().unwrap().len(), 1);

        let (status, _) = send(
            &app,
            "POST",
            &format!("/api/groups/{id}/companies/zzz/tags"),
            Some(&token),
            Some(json!({ "type": "TOP50" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = send(
            &app,
            "POST",
            &format!("/api/groups/{id}/companies/b/comments"),
            Some(&token),
            Some(json!({ "text": "Reunión en marzo" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let comment = json_of(&body);
        assert_eq!(comment["author"], "admin");

        let (_, body) = send(&app, "GET", &format!("/api/groups/{id}/companies?depth=1"), None, None).await;
        let rows = json_of(&body);
        assert_eq!(rows[1]["accountId"], "b");
        assert_eq!(rows[1]["customTags"][0]["type"], "TOP20");

        let (_, body) = send(&app, "GET", &format!("/api/groups/{id}/companies/b"), None, None).await;
        assert_eq!(json_of(&body)["comments"][0]["text"], "Reunión en marzo");

        let comment_uri = format!("/api/groups/{id}/companies/b/comments/{}", comment["id"].as_str().unwrap());
        let (status, _) = send(&app, "DELETE", &comment_uri, Some(&token), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&app, "DELETE", &comment_uri, Some(&token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(&app, "DELETE", &format!("{tag_uri}/TOP20"), Some(&token), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&app, "DELETE", &format!("{tag_uri}/VIP"), Some(&token), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn invalid_uploads_are_rejected() {
        let app = test_app();
        let token = login(&app).await;

        let (status, _) = send(&app, "POST", "/api/groups", Some(&token), Some(json!({ "name": "x", "data": null }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let bad_depth = json!({ "accountId": "a", "name": "A", "depth": 2 });
        let (status, _) = send(&app, "POST", "/api/groups", Some(&token), Some(json!({ "name": "x", "data": bad_depth }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &app,
            "POST",
            "/api/groups",
            Some(&token),
            Some(json!({ "name": "  ", "data": serde_json::to_value(sample_tree()).unwrap() })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn group_update_and_delete() {
        let app = test_app();
        let token = login(&app).await;
        let id = create_group(&app, &token).await;
        let uri = format!("/api/groups/{id}");

        let (status, body) = send(&app, "PUT", &uri, Some(&token), Some(json!({ "name": "Renombrado", "description": "Q3" }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_of(&body)["name"], "Renombrado");
        assert_eq!(json_of(&body)["description"], "Q3");

        let (status, _) = send(&app, "DELETE", &uri, Some(&token), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&app, "GET", &uri, None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(&app, "DELETE", &uri, Some(&token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    fn chain_upload(depth: u32) -> serde_json::Value {
        json!({
            "name": format!("Cadena {depth}"),
            "data": serde_json::to_value(crate::tree::tests::chain(depth)).unwrap(),
        })
    }

    #[tokio::test]
    async fn upload_depth_limit_is_reachable_and_enforced() {
        let app = test_app();
        let token = login(&app).await;
        let max = crate::tree::MAX_TREE_DEPTH;

        let (status, body) = send(&app, "POST", "/api/groups", Some(&token), Some(chain_upload(max))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(json_of(&body)["totalCompanies"], max + 1);

        for depth in [max + 1, 100, 200] {
            let (status, body) = send(&app, "POST", "/api/groups", Some(&token), Some(chain_upload(depth))).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "profundidad {depth}");
            assert!(json_of(&body)["error"].is_string(), "profundidad {depth}");
        }
    }

    #[tokio::test]
    async fn malformed_upload_body_gets_json_error() {
        let app = test_app();
        let token = login(&app).await;
        let request = Request::builder()
            .method("POST")
            .uri("/api/groups")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{ no es json"))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert!(json_of(&bytes)["error"].is_string());
    }

    #[test]
    fn website_host_accepts_bare_domains() {
        assert_eq!(website_host("https://www.acme.example/about").as_deref(), Some("www.acme.example"));
        assert_eq!(website_host("acme.example").as_deref(), Some("acme.example"));
    }
}
