//! Modelos de dominio: árbol de empresas, grupos subidos y anotaciones
//! (etiquetas y comentarios) que se cruzan con el árbol por `accountId`.

use std::{collections::BTreeMap, fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{de, Deserialize, Deserializer, Serialize};

use crate::error::TreeError;

/// Nodo del árbol societario tal y como llega en el JSON scrapeado.
/// Una vez cargado no se modifica: filtros, listados y estadísticas
/// producen valores derivados nuevos.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Company {
    pub account_id: String,
    pub name: String,
    #[serde(default)]
    pub all_tags: Vec<String>,
    pub depth: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_company: Option<ParentCompany>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(default)]
    pub subsidiaries: Vec<Company>,
}

impl Company {
    /// Una web vacía o con sólo espacios cuenta como ausente.
    pub fn has_website(&self) -> bool {
        self.website
            .as_deref()
            .map(|w| !w.trim().is_empty())
            .unwrap_or(false)
    }

    pub fn subsidiary_count(&self) -> usize {
        self.subsidiaries.len()
    }
}

/// Referencia descriptiva a la matriz. No se usa para recorrer el árbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParentCompany {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_url: Option<String>,
}

/// Un grupo es una subida completa de datos scrapeados.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyGroup {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub data: Company,
}

/// Resumen ligero para el listado de grupos.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupSummary {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub root_name: String,
    pub total_companies: usize,
}

impl From<&CompanyGroup> for GroupSummary {
    fn from(group: &CompanyGroup) -> Self {
        Self {
            id: group.id.clone(),
            name: group.name.clone(),
            description: group.description.clone(),
            created_at: group.created_at,
            updated_at: group.updated_at,
            root_name: group.data.name.clone(),
            total_companies: crate::tree::flatten(&group.data).count(),
        }
    }
}

// --- Anotaciones ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CustomTagType {
    Top20,
    Top50,
    ClientDilitrust,
}

impl CustomTagType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Top20 => "TOP20",
            Self::Top50 => "TOP50",
            Self::ClientDilitrust => "CLIENT_DILITRUST",
        }
    }

    /// Sólo los clientes llevan módulos contratados.
    pub fn supports_modules(&self) -> bool {
        matches!(self, Self::ClientDilitrust)
    }
}

impl fmt::Display for CustomTagType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CustomTagType {
    type Err = TreeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "TOP20" => Ok(Self::Top20),
            "TOP50" => Ok(Self::Top50),
            "CLIENT_DILITRUST" => Ok(Self::ClientDilitrust),
            other => Err(TreeError::InvalidInput(format!(
                "Tipo de etiqueta no soportado: {other}"
            ))),
        }
    }
}

/// Etiqueta asignada por un administrador, distinta de `allTags`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomTag {
    #[serde(rename = "type")]
    pub tag_type: CustomTagType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modules: Option<Vec<String>>,
    pub added_at: DateTime<Utc>,
}

impl CustomTag {
    pub fn new(tag_type: CustomTagType, modules: Option<Vec<String>>) -> Self {
        let modules = if tag_type.supports_modules() {
            modules.filter(|m| !m.is_empty())
        } else {
            None
        };
        Self {
            tag_type,
            modules,
            added_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    #[serde(alias = "comment")]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Comment {
    pub fn new(text: String, author: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            text,
            author: author.filter(|a| !a.trim().is_empty()),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Etiquetas de un grupo indexadas por `accountId`.
pub type TagMap = BTreeMap<String, Vec<CustomTag>>;
/// Comentarios de un grupo indexados por `accountId`, en orden de inserción.
pub type CommentMap = BTreeMap<String, Vec<Comment>>;

// --- Consultas y estadísticas ---

/// Descriptor de filtro. Un campo a `None` no restringe nada.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterOptions {
    #[serde(default, deserialize_with = "empty_as_none")]
    pub search_term: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub sector: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub size: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub depth: Option<u32>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub has_website: Option<bool>,
}

impl FilterOptions {
    pub fn is_empty(&self) -> bool {
        self.search_term.is_none()
            && self.sector.is_none()
            && self.size.is_none()
            && self.depth.is_none()
            && self.has_website.is_none()
    }
}

/// Los formularios envían `campo=` cuando no hay selección.
fn empty_as_none<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: fmt::Display,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => s.parse::<T>().map(Some).map_err(de::Error::custom),
    }
}

/// Métricas derivadas del árbol, recalculadas bajo demanda.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyStats {
    pub total_companies: usize,
    pub max_depth: u32,
    pub companies_by_depth: BTreeMap<u32, usize>,
    pub companies_by_sector: BTreeMap<String, usize>,
    pub companies_by_size: BTreeMap<String, usize>,
    pub companies_with_website: usize,
    pub international_companies: usize,
}
