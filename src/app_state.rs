use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use crate::{auth::SessionStore, classify::Classifier, config::AppConfig, store::GroupStore};

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<dyn GroupStore>,
    pub classifier: Arc<Classifier>,
    pub sessions: SessionStore,
    pub status: Arc<Mutex<Status>>,
    pub shutdown_sender: Arc<Mutex<Option<oneshot::Sender<()>>>>,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    pub message: String,
    pub started_at: String,
    pub classifier_version: String,
}
