//! Acceso al panel de administración mediante sesiones en servidor.
//!
//! El login entrega un token aleatorio; cada petición admin lo presenta en
//! `Authorization: Bearer <token>` y el extractor [`AdminSession`] lo
//! resuelve contra la tabla de sesiones.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap, StatusCode},
    Json,
};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::warn;
use uuid::Uuid;

use crate::app_state::AppState;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub token: String,
    pub username: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct SessionStore {
    ttl: Duration,
    sessions: Arc<Mutex<HashMap<String, Session>>>,
}

/// Comparación sin salida temprana.
fn same_secret(a: &str, b: &str) -> bool {
    a.len() == b.len() && a.bytes().zip(b.bytes()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

impl SessionStore {
    pub fn new(ttl_hours: i64) -> Self {
        Self {
            ttl: Duration::hours(ttl_hours),
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn table(&self) -> MutexGuard<'_, HashMap<String, Session>> {
        self.sessions.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Abre una sesión si las credenciales coinciden con las configuradas.
    pub fn login(&self, expected_user: &str, expected_password: &str, username: &str, password: &str) -> Option<Session> {
        let user_ok = same_secret(expected_user, username);
        let password_ok = same_secret(expected_password, password);
        if !(user_ok && password_ok) {
            return None;
        }

        let now = Utc::now();
        let session = Session {
            token: Uuid::new_v4().simple().to_string(),
            username: username.to_string(),
            created_at: now,
            expires_at: now + self.ttl,
        };
        let mut table = self.table();
        // Los tokens caducados que nadie vuelve a presentar se limpian aquí.
        table.retain(|_, s| s.expires_at > now);
        table.insert(session.token.clone(), session.clone());
        Some(session)
    }

    /// Sesión vigente para el token; las caducadas se eliminan al consultarlas.
    pub fn validate(&self, token: &str) -> Option<Session> {
        let mut table = self.table();
        let session = table.get(token)?.clone();
        if session.expires_at <= Utc::now() {
            table.remove(token);
            return None;
        }
        Some(session)
    }

    pub fn revoke(&self, token: &str) -> bool {
        self.table().remove(token).is_some()
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Sesión de administrador ya validada, disponible para el handler.
pub struct AdminSession(pub Session);

#[async_trait]
impl FromRequestParts<AppState> for AdminSession {
    type Rejection = (StatusCode, Json<serde_json::Value>);

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let unauthorized = |msg: &str| (StatusCode::UNAUTHORIZED, Json(json!({ "error": msg })));

        let token = bearer_token(&parts.headers)
            .ok_or_else(|| unauthorized("Se requiere una sesión de administrador."))?;

        match state.sessions.validate(token) {
            Some(session) => Ok(AdminSession(session)),
            None => {
                warn!("Token de sesión rechazado en {}", parts.uri.path());
                Err(unauthorized("Sesión inválida o caducada."))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_requires_exact_credentials() {
        let sessions = SessionStore::new(1);
        assert!(sessions.login("admin", "secret", "admin", "wrong").is_none());
        assert!(sessions.login("admin", "secret", "Admin", "secret").is_none());
        assert!(sessions.login("admin", "secret", "admin", "secretx").is_none());

        let session = sessions.login("admin", "secret", "admin", "secret").unwrap();
        assert_eq!(sessions.validate(&session.token), Some(session.clone()));
        assert!(session.expires_at > session.created_at);
    }

    #[test]
    fn revoked_or_unknown_tokens_are_rejected() {
        let sessions = SessionStore::new(1);
        let session = sessions.login("admin", "secret", "admin", "secret").unwrap();
        assert!(sessions.revoke(&session.token));
        assert!(sessions.validate(&session.token).is_none());
        assert!(!sessions.revoke(&session.token));
        assert!(sessions.validate("made-up").is_none());
    }

    #[test]
    fn expired_sessions_are_dropped() {
        let sessions = SessionStore::new(0);
        let session = sessions.login("admin", "secret", "admin", "secret").unwrap();
        assert!(sessions.validate(&session.token).is_none());
        assert!(!sessions.revoke(&session.token));
    }

    #[test]
    fn login_purges_sessions_that_were_never_reused() {
        let sessions = SessionStore::new(0);
        for _ in 0..5 {
            sessions.login("admin", "secret", "admin", "secret").unwrap();
        }
        // Sólo queda la última, recién creada (y ya caducada con TTL 0).
        assert_eq!(sessions.table().len(), 1);

        let live = SessionStore::new(1);
        let first = live.login("admin", "secret", "admin", "secret").unwrap();
        live.login("admin", "secret", "admin", "secret").unwrap();
        assert_eq!(live.table().len(), 2);
        assert!(live.validate(&first.token).is_some());
    }

    #[test]
    fn bearer_header_parsing() {
        let mut headers = HeaderMap::new();
        assert!(bearer_token(&headers).is_none());
        headers.insert(header::AUTHORIZATION, "Basic abc".parse().unwrap());
        assert!(bearer_token(&headers).is_none());
        headers.insert(header::AUTHORIZATION, "Bearer tok123".parse().unwrap());
        assert_eq!(bearer_token(&headers), Some("tok123"));
    }
}
