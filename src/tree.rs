//! Carga, validación y recorridos básicos del árbol de empresas:
//! aplanado en preorden, búsqueda por `accountId` y ruta de ancestros.

use std::collections::HashSet;

use tracing::warn;

use crate::{
    error::{TreeError, TreeResult},
    models::Company,
};

/// Profundidad máxima aceptada al cargar un árbol.
///
/// serde_json corta a 128 niveles de anidamiento y cada nivel del árbol
/// gasta dos (el objeto y su array `subsidiaries`), además del sobre del
/// grupo. 60 deja margen para `parentCompany` y `allTags` en la hoja.
pub const MAX_TREE_DEPTH: u32 = 60;

/// Convierte el JSON subido en un árbol validado.
pub fn parse_tree(value: serde_json::Value) -> TreeResult<Company> {
    if value.is_null() {
        return Err(TreeError::InvalidInput(
            "El árbol de empresas está vacío (null).".to_string(),
        ));
    }
    let root: Company = serde_json::from_value(value).map_err(|e| {
        TreeError::InvalidInput(format!("El JSON no tiene la forma de un árbol de empresas: {e}"))
    })?;
    validate(&root)?;
    Ok(root)
}

/// Comprueba los invariantes estructurales: raíz a profundidad 0, cada hijo
/// a la de su padre + 1, `accountId` no vacío y profundidad acotada.
pub fn validate(root: &Company) -> TreeResult<()> {
    let mut seen = HashSet::new();
    let mut stack = vec![(root, 0u32)];

    while let Some((node, expected)) = stack.pop() {
        if node.account_id.trim().is_empty() {
            return Err(TreeError::InvalidInput(format!(
                "La empresa '{}' no tiene accountId.",
                node.name
            )));
        }
        if node.depth != expected {
            return Err(TreeError::InvalidInput(format!(
                "La empresa '{}' declara profundidad {} pero está en el nivel {}.",
                node.account_id, node.depth, expected
            )));
        }
        if expected > MAX_TREE_DEPTH {
            return Err(TreeError::InvalidInput(format!(
                "El árbol supera la profundidad máxima de {MAX_TREE_DEPTH} niveles."
            )));
        }
        if !seen.insert(node.account_id.as_str()) {
            warn!("accountId duplicado en el árbol: {}", node.account_id);
        }
        stack.extend(node.subsidiaries.iter().map(|child| (child, expected + 1)));
    }

    Ok(())
}

/// Iterador en preorden sobre un subárbol. Cada llamada a [`flatten`]
/// empieza de cero, así que se puede recorrer el mismo árbol cuantas veces
/// haga falta.
pub struct Flatten<'a> {
    stack: Vec<&'a Company>,
}

impl<'a> Iterator for Flatten<'a> {
    type Item = &'a Company;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.subsidiaries.iter().rev());
        Some(node)
    }
}

pub fn flatten(root: &Company) -> Flatten<'_> {
    Flatten { stack: vec![root] }
}

/// Primer nodo (en preorden) con ese `accountId`.
pub fn find_by_id<'a>(root: &'a Company, id: &str) -> Option<&'a Company> {
    flatten(root).find(|node| node.account_id == id)
}

/// Cadena desde la raíz hasta el nodo `id`, ambos incluidos. Vacía si no
/// existe. Es lo que pinta el breadcrumb.
pub fn get_path<'a>(root: &'a Company, id: &str) -> Vec<&'a Company> {
    let mut path: Vec<&Company> = Vec::new();
    let mut stack = vec![(root, 0usize)];

    while let Some((node, level)) = stack.pop() {
        path.truncate(level);
        path.push(node);
        if node.account_id == id {
            return path;
        }
        stack.extend(node.subsidiaries.iter().rev().map(|child| (child, level + 1)));
    }

    Vec::new()
}
