//! Clasificación heurística de empresas a partir de sus `allTags`.
//!
//! Las reglas viven en una tabla versionada (`ClassificationTable`) que se
//! puede cargar desde JSON, de modo que la política de sector/tamaño/
//! internacional evoluciona sin tocar los recorridos del árbol.

use std::{collections::HashMap, fs, path::Path};

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    error::{TreeError, TreeResult},
    models::Company,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectorRule {
    pub label: String,
    pub keywords: Vec<String>,
}

/// Tabla de clasificación tal y como se guarda en disco.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationTable {
    pub version: String,
    #[serde(default)]
    pub sectors: Vec<SectorRule>,
    #[serde(default)]
    pub size_patterns: Vec<String>,
    #[serde(default)]
    pub international_patterns: Vec<String>,
}

fn sector(label: &str, keywords: &[&str]) -> SectorRule {
    SectorRule {
        label: label.to_string(),
        keywords: keywords.iter().map(|k| k.to_string()).collect(),
    }
}

impl Default for ClassificationTable {
    fn default() -> Self {
        Self {
            version: "2024.1".to_string(),
            sectors: vec![
                sector("Energy", &["energy", "énergie", "oil & gas", "utilities", "renewables"]),
                sector("Finance", &["finance", "banking", "bank", "insurance", "assurance", "financial services"]),
                sector("Technology", &["technology", "software", "it services", "telecommunications"]),
                sector("Industry", &["industry", "industrie", "manufacturing", "automotive", "aerospace"]),
                sector("Healthcare", &["healthcare", "santé", "pharmaceuticals", "biotechnology"]),
                sector("Retail", &["retail", "consumer goods", "distribution"]),
                sector("Real Estate", &["real estate", "immobilier", "construction"]),
                sector("Transport", &["transport", "transportation", "logistics"]),
                sector("Media", &["media", "médias", "entertainment"]),
                sector("Agriculture", &["agriculture", "agroalimentaire", "food & beverages"]),
            ],
            size_patterns: vec![
                r"(?i)^\d[\d\s.,]*\s*(-|–|to|à)\s*\d[\d\s.,]*\s*(employees|employés|salariés)$".to_string(),
                r"(?i)^\d[\d\s.,]*\+?\s*(employees|employés|salariés)$".to_string(),
                r"(?i)^[$€£]\s?\d[\d.,]*\s?[kmb]?\s*(-|–|to)\s*[$€£]?\s?\d[\d.,]*\s?[kmb]?$".to_string(),
                r"(?i)^(revenue|chiffre d'affaires)\b.*\d".to_string(),
            ],
            international_patterns: vec![
                r"(?i)\b(international|global|worldwide|multinational)\b".to_string(),
                r"[\x{1F1E6}-\x{1F1FF}]{2}".to_string(),
                r"[\x{1F30D}-\x{1F30F}]".to_string(),
            ],
        }
    }
}

/// Tabla compilada, lista para consultar nodo a nodo.
#[derive(Debug, Clone)]
pub struct Classifier {
    version: String,
    sector_keywords: HashMap<String, String>,
    size_patterns: Vec<Regex>,
    international_patterns: Vec<Regex>,
}

fn compile(patterns: &[String]) -> TreeResult<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| {
            Regex::new(p).map_err(|e| {
                TreeError::InvalidInput(format!("Patrón de clasificación inválido '{p}': {e}"))
            })
        })
        .collect()
}

impl Classifier {
    pub fn from_table(table: ClassificationTable) -> TreeResult<Self> {
        let mut sector_keywords = HashMap::new();
        for rule in &table.sectors {
            for keyword in &rule.keywords {
                // Ante palabras clave repetidas gana la primera regla.
                sector_keywords
                    .entry(keyword.trim().to_lowercase())
                    .or_insert_with(|| rule.label.clone());
            }
        }

        Ok(Self {
            version: table.version,
            sector_keywords,
            size_patterns: compile(&table.size_patterns)?,
            international_patterns: compile(&table.international_patterns)?,
        })
    }

    /// Carga la tabla desde `path` si se indica; si no, usa la integrada.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let table = match path {
            Some(path) => {
                let raw = fs::read_to_string(path).with_context(|| {
                    format!("No se pudo leer la tabla de clasificación {}", path.display())
                })?;
                serde_json::from_str(&raw).with_context(|| {
                    format!("Tabla de clasificación mal formada en {}", path.display())
                })?
            }
            None => ClassificationTable::default(),
        };
        let classifier = Self::from_table(table)?;
        info!("Tabla de clasificación cargada (versión {}).", classifier.version);
        Ok(classifier)
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Sector de la primera etiqueta que coincide con una palabra clave.
    pub fn sector_of(&self, company: &Company) -> Option<&str> {
        company.all_tags.iter().find_map(|tag| {
            self.sector_keywords
                .get(&tag.trim().to_lowercase())
                .map(String::as_str)
        })
    }

    /// Tramo de tamaño: la primera etiqueta con forma de rango de empleados
    /// o de facturación, tal cual viene.
    pub fn size_of<'a>(&self, company: &'a Company) -> Option<&'a str> {
        company
            .all_tags
            .iter()
            .map(|tag| tag.trim())
            .find(|tag| self.size_patterns.iter().any(|re| re.is_match(tag)))
    }

    pub fn is_international(&self, company: &Company) -> bool {
        self.international_patterns.iter().any(|re| {
            re.is_match(&company.name) || company.all_tags.iter().any(|tag| re.is_match(tag))
        })
    }
}
