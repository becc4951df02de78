//! Persistencia de grupos y anotaciones.
//!
//! El resto de la aplicación sólo ve el trait [`GroupStore`]; hay un backend
//! de ficheros JSON (un fichero por grupo, sobrescrito entero en cada
//! escritura) y uno en memoria.

use std::{
    collections::HashMap,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::{
    config::{AppConfig, StorageBackend},
    error::{TreeError, TreeResult},
    models::{Comment, CommentMap, CompanyGroup, CustomTag, CustomTagType, GroupSummary, TagMap},
};

#[async_trait]
pub trait GroupStore: Send + Sync {
    /// Resúmenes ordenados del más reciente al más antiguo.
    async fn list_groups(&self) -> TreeResult<Vec<GroupSummary>>;
    async fn get_group(&self, id: &str) -> TreeResult<Option<CompanyGroup>>;
    async fn save_group(&self, group: &CompanyGroup) -> TreeResult<()>;
    /// Borra el grupo junto con sus etiquetas y comentarios. `false` si no existía.
    async fn delete_group(&self, id: &str) -> TreeResult<bool>;

    async fn get_tags(&self, group_id: &str) -> TreeResult<TagMap>;
    /// Como mucho una etiqueta por tipo: si ya existe se sustituye.
    async fn add_tag(&self, group_id: &str, company_id: &str, tag: CustomTag) -> TreeResult<Vec<CustomTag>>;
    async fn remove_tag(&self, group_id: &str, company_id: &str, tag_type: CustomTagType) -> TreeResult<bool>;

    async fn get_comments(&self, group_id: &str) -> TreeResult<CommentMap>;
    async fn add_comment(&self, group_id: &str, company_id: &str, comment: Comment) -> TreeResult<Comment>;
    async fn delete_comment(&self, group_id: &str, company_id: &str, comment_id: &str) -> TreeResult<()>;
}

/// Crea el backend indicado en la configuración.
pub async fn open_store(cfg: &AppConfig) -> anyhow::Result<Arc<dyn GroupStore>> {
    let store: Arc<dyn GroupStore> = match cfg.storage_backend {
        StorageBackend::File => Arc::new(JsonFileStore::open(&cfg.data_dir).await?),
        StorageBackend::Memory => Arc::new(MemoryStore::default()),
    };
    info!("Almacenamiento inicializado ({:?}).", cfg.storage_backend);
    Ok(store)
}

// --- Reglas comunes a ambos backends ---

fn upsert_tag(tags: &mut TagMap, company_id: &str, tag: CustomTag) -> Vec<CustomTag> {
    let list = tags.entry(company_id.to_string()).or_default();
    match list.iter().position(|t| t.tag_type == tag.tag_type) {
        Some(i) => list[i] = tag,
        None => list.push(tag),
    }
    list.clone()
}

fn drop_tag(tags: &mut TagMap, company_id: &str, tag_type: CustomTagType) -> bool {
    let Some(list) = tags.get_mut(company_id) else {
        return false;
    };
    let before = list.len();
    list.retain(|t| t.tag_type != tag_type);
    let removed = list.len() != before;
    if list.is_empty() {
        tags.remove(company_id);
    }
    removed
}

fn drop_comment(comments: &mut CommentMap, company_id: &str, comment_id: &str) -> TreeResult<()> {
    let not_found = || TreeError::NotFound(format!("Comentario {comment_id}"));
    let list = comments.get_mut(company_id).ok_or_else(not_found)?;
    let position = list.iter().position(|c| c.id == comment_id).ok_or_else(not_found)?;
    list.remove(position);
    if list.is_empty() {
        comments.remove(company_id);
    }
    Ok(())
}

fn sort_newest_first(summaries: &mut [GroupSummary]) {
    summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
}

fn missing_group(id: &str) -> TreeError {
    TreeError::NotFound(format!("Grupo {id}"))
}

// --- Backend de ficheros JSON ---

pub struct JsonFileStore {
    root: PathBuf,
    // Serializa las escrituras read-modify-write dentro del proceso.
    write_lock: Mutex<()>,
}

const GROUPS_DIR: &str = "groups";
const TAGS_DIR: &str = "tags";
const COMMENTS_DIR: &str = "comments";

impl JsonFileStore {
    pub async fn open(root: impl AsRef<Path>) -> TreeResult<Self> {
        let root = root.as_ref().to_path_buf();
        for dir in [GROUPS_DIR, TAGS_DIR, COMMENTS_DIR] {
            tokio::fs::create_dir_all(root.join(dir)).await?;
        }
        info!("Almacén JSON en {}", root.display());
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    /// Los ids acaban en nombres de fichero; nada de separadores ni `..`.
    fn file(&self, dir: &str, id: &str) -> TreeResult<PathBuf> {
        let valid = !id.is_empty()
            && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(TreeError::InvalidInput(format!("Identificador de grupo inválido: {id}")));
        }
        Ok(self.root.join(dir).join(format!("{id}.json")))
    }

    /// En lecturas un id que no puede ser nombre de fichero equivale a
    /// un grupo inexistente, igual que en el backend en memoria.
    fn readable_file(&self, dir: &str, id: &str) -> Option<PathBuf> {
        self.file(dir, id).ok()
    }

    async fn require_group(&self, id: &str) -> TreeResult<()> {
        if tokio::fs::try_exists(self.file(GROUPS_DIR, id)?).await? {
            Ok(())
        } else {
            Err(missing_group(id))
        }
    }
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> TreeResult<Option<T>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Escribe en un temporal y renombra, para no dejar ficheros a medias.
async fn write_json<T: Serialize>(path: &Path, value: &T) -> TreeResult<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await?;
    debug!("Escrito {}", path.display());
    Ok(())
}

async fn remove_if_exists(path: &Path) -> TreeResult<bool> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl GroupStore for JsonFileStore {
    async fn list_groups(&self) -> TreeResult<Vec<GroupSummary>> {
        let mut paths = Vec::new();
        let mut entries = tokio::fs::read_dir(self.root.join(GROUPS_DIR)).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                paths.push(path);
            }
        }

        let groups = futures::future::try_join_all(
            paths.iter().map(|p| read_json::<CompanyGroup>(p)),
        )
        .await?;

        let mut summaries: Vec<GroupSummary> = groups.iter().flatten().map(GroupSummary::from).collect();
        sort_newest_first(&mut summaries);
        Ok(summaries)
    }

    async fn get_group(&self, id: &str) -> TreeResult<Option<CompanyGroup>> {
        match self.readable_file(GROUPS_DIR, id) {
            Some(path) => read_json(&path).await,
            None => Ok(None),
        }
    }

    async fn save_group(&self, group: &CompanyGroup) -> TreeResult<()> {
        let path = self.file(GROUPS_DIR, &group.id)?;
        let _guard = self.write_lock.lock().await;
        write_json(&path, group).await
    }

    async fn delete_group(&self, id: &str) -> TreeResult<bool> {
        let group = self.file(GROUPS_DIR, id)?;
        let tags = self.file(TAGS_DIR, id)?;
        let comments = self.file(COMMENTS_DIR, id)?;

        let _guard = self.write_lock.lock().await;
        let existed = remove_if_exists(&group).await?;
        remove_if_exists(&tags).await?;
        remove_if_exists(&comments).await?;
        Ok(existed)
    }

    async fn get_tags(&self, group_id: &str) -> TreeResult<TagMap> {
        match self.readable_file(TAGS_DIR, group_id) {
            Some(path) => Ok(read_json(&path).await?.unwrap_or_default()),
            None => Ok(TagMap::new()),
        }
    }

    async fn add_tag(&self, group_id: &str, company_id: &str, tag: CustomTag) -> TreeResult<Vec<CustomTag>> {
        let path = self.file(TAGS_DIR, group_id)?;
        let _guard = self.write_lock.lock().await;
        self.require_group(group_id).await?;

        let mut tags: TagMap = read_json(&path).await?.unwrap_or_default();
        let updated = upsert_tag(&mut tags, company_id, tag);
        write_json(&path, &tags).await?;
        Ok(updated)
    }

    async fn remove_tag(&self, group_id: &str, company_id: &str, tag_type: CustomTagType) -> TreeResult<bool> {
        let path = self.file(TAGS_DIR, group_id)?;
        let _guard = self.write_lock.lock().await;
        self.require_group(group_id).await?;

        let mut tags: TagMap = read_json(&path).await?.unwrap_or_default();
        let removed = drop_tag(&mut tags, company_id, tag_type);
        if removed {
            write_json(&path, &tags).await?;
        }
        Ok(removed)
    }

    async fn get_comments(&self, group_id: &str) -> TreeResult<CommentMap> {
        match self.readable_file(COMMENTS_DIR, group_id) {
            Some(path) => Ok(read_json(&path).await?.unwrap_or_default()),
            None => Ok(CommentMap::new()),
        }
    }

    async fn add_comment(&self, group_id: &str, company_id: &str, comment: Comment) -> TreeResult<Comment> {
        let path = self.file(COMMENTS_DIR, group_id)?;
        let _guard = self.write_lock.lock().await;
        self.require_group(group_id).await?;

        let mut comments: CommentMap = read_json(&path).await?.unwrap_or_default();
        comments.entry(company_id.to_string()).or_default().push(comment.clone());
        write_json(&path, &comments).await?;
        Ok(comment)
    }

    async fn delete_comment(&self, group_id: &str, company_id: &str, comment_id: &str) -> TreeResult<()> {
        let path = self.file(COMMENTS_DIR, group_id)?;
        let _guard = self.write_lock.lock().await;
        self.require_group(group_id).await?;

        let mut comments: CommentMap = read_json(&path).await?.unwrap_or_default();
        drop_comment(&mut comments, company_id, comment_id)?;
        write_json(&path, &comments).await
    }
}

// --- Backend en memoria ---

#[derive(Default)]
struct MemoryData {
    groups: HashMap<String, CompanyGroup>,
    tags: HashMap<String, TagMap>,
    comments: HashMap<String, CommentMap>,
}

#[derive(Default)]
pub struct MemoryStore {
    data: RwLock<MemoryData>,
}

impl MemoryData {
    fn require_group(&self, id: &str) -> TreeResult<()> {
        if self.groups.contains_key(id) {
            Ok(())
        } else {
            Err(missing_group(id))
        }
    }
}

#[async_trait]
impl GroupStore for MemoryStore {
    async fn list_groups(&self) -> TreeResult<Vec<GroupSummary>> {
        let data = self.data.read().await;
        let mut summaries: Vec<GroupSummary> = data.groups.values().map(GroupSummary::from).collect();
        sort_newest_first(&mut summaries);
        Ok(summaries)
    }

    async fn get_group(&self, id: &str) -> TreeResult<Option<CompanyGroup>> {
        Ok(self.data.read().await.groups.get(id).cloned())
    }

    async fn save_group(&self, group: &CompanyGroup) -> TreeResult<()> {
        self.data.write().await.groups.insert(group.id.clone(), group.clone());
        Ok(())
    }

    async fn delete_group(&self, id: &str) -> TreeResult<bool> {
        let mut data = self.data.write().await;
        data.tags.remove(id);
        data.comments.remove(id);
        Ok(data.groups.remove(id).is_some())
    }

    async fn get_tags(&self, group_id: &str) -> TreeResult<TagMap> {
        Ok(self.data.read().await.tags.get(group_id).cloned().unwrap_or_default())
    }

    async fn add_tag(&self, group_id: &str, company_id: &str, tag: CustomTag) -> TreeResult<Vec<CustomTag>> {
        let mut data = self.data.write().await;
        data.require_group(group_id)?;
        let tags = data.tags.entry(group_id.to_string()).or_default();
        Ok(upsert_tag(tags, company_id, tag))
    }

    async fn remove_tag(&self, group_id: &str, company_id: &str, tag_type: CustomTagType) -> TreeResult<bool> {
        let mut data = self.data.write().await;
        data.require_group(group_id)?;
        Ok(data
            .tags
            .get_mut(group_id)
            .map(|tags| drop_tag(tags, company_id, tag_type))
            .unwrap_or(false))
    }

    async fn get_comments(&self, group_id: &str) -> TreeResult<CommentMap> {
        Ok(self.data.read().await.comments.get(group_id).cloned().unwrap_or_default())
    }

    async fn add_comment(&self, group_id: &str, company_id: &str, comment: Comment) -> TreeResult<Comment> {
        let mut data = self.data.write().await;
        data.require_group(group_id)?;
        data.comments
            .entry(group_id.to_string())
            .or_default()
            .entry(company_id.to_string())
            .or_default()
            .push(comment.clone());
        Ok(comment)
    }

    async fn delete_comment(&self, group_id: &str, company_id: &str, comment_id: &str) -> TreeResult<()> {
        let mut data = self.data.write().await;
        data.require_group(group_id)?;
        let comments = data
            .comments
            .get_mut(group_id)
            .ok_or_else(|| TreeError::NotFound(format!("Comentario {comment_id}")))?;
        drop_comment(comments, company_id, comment_id)
    }
}
