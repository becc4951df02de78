//! Carga y gestión de configuración de la aplicación (servidor, almacenamiento y acceso admin).

use std::{env, path::PathBuf};
use anyhow::{anyhow, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageBackend {
    File,
    Memory,
}

impl StorageBackend {
    pub fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "file" | "json" => Ok(Self::File),
            "memory" => Ok(Self::Memory),
            other => Err(anyhow!("Backend de almacenamiento no soportado: {other}")),
        }
    }
}

/// Configuración completa de la aplicación.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server_addr: String,
    pub frontend_dir: PathBuf,
    pub open_browser: bool,

    pub storage_backend: StorageBackend,
    pub data_dir: PathBuf,
    pub classifier_path: Option<PathBuf>,

    pub admin_username: String,
    pub admin_password: String,
    pub session_ttl_hours: i64,
}

impl AppConfig {
    /// Carga la configuración desde variables de entorno (usando .env si existe).
    pub fn from_env() -> Result<Self> {
        let admin_username = env::var("ADMIN_USERNAME")
            .map_err(|_| anyhow!("Falta ADMIN_USERNAME en el entorno"))?;
        let admin_password = env::var("ADMIN_PASSWORD")
            .map_err(|_| anyhow!("Falta ADMIN_PASSWORD en el entorno"))?;
        if admin_password.is_empty() {
            return Err(anyhow!("ADMIN_PASSWORD no puede estar vacío"));
        }

        let server_addr =
            env::var("SERVER_ADDR").unwrap_or_else(|_| "127.0.0.1:3322".to_string());
        let frontend_dir =
            PathBuf::from(env::var("FRONTEND_DIR").unwrap_or_else(|_| "frontend".to_string()));
        let open_browser = env::var("OPEN_BROWSER")
            .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        let storage_backend_str =
            env::var("STORAGE_BACKEND").unwrap_or_else(|_| "file".to_string());
        let storage_backend = StorageBackend::from_str(&storage_backend_str)?;
        let data_dir = PathBuf::from(env::var("DATA_DIR").unwrap_or_else(|_| "data".to_string()));
        let classifier_path = env::var("CLASSIFIER_PATH").ok().map(PathBuf::from);

        let session_ttl_hours = match env::var("SESSION_TTL_HOURS") {
            Ok(raw) => raw
                .parse::<i64>()
                .ok()
                .filter(|h| *h > 0)
                .ok_or_else(|| anyhow!("SESSION_TTL_HOURS debe ser un entero positivo: {raw}"))?,
            Err(_) => 12,
        };

        Ok(Self {
            server_addr,
            frontend_dir,
            open_browser,
            storage_backend,
            data_dir,
            classifier_path,
            admin_username,
            admin_password,
            session_ttl_hours,
        })
    }
}
