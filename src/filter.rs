//! Motor de filtrado: devuelve una copia podada del árbol que conserva la
//! jerarquía hasta cada coincidencia.

use crate::{
    classify::Classifier,
    models::{Company, FilterOptions},
};

/// ¿Cumple el nodo, por sí mismo, todos los criterios activos?
pub fn matches(node: &Company, filters: &FilterOptions, classifier: &Classifier) -> bool {
    let sector = classifier.sector_of(node);

    if let Some(term) = filters.search_term.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        let term = term.to_lowercase();
        let hit = node.name.to_lowercase().contains(&term)
            || sector.is_some_and(|s| s.to_lowercase().contains(&term))
            || node.all_tags.iter().any(|tag| tag.to_lowercase().contains(&term));
        if !hit {
            return false;
        }
    }
    if let Some(wanted) = filters.sector.as_deref() {
        if sector != Some(wanted) {
            return false;
        }
    }
    if let Some(wanted) = filters.size.as_deref() {
        if classifier.size_of(node) != Some(wanted) {
            return false;
        }
    }
    if let Some(depth) = filters.depth {
        if node.depth != depth {
            return false;
        }
    }
    if let Some(has_website) = filters.has_website {
        if node.has_website() != has_website {
            return false;
        }
    }
    true
}

/// Poda de hojas hacia arriba: un nodo sobrevive si coincide o si le queda
/// algún descendiente. `None` cuando nada coincide.
///
/// La recursión está acotada por `tree::MAX_TREE_DEPTH`, que se comprueba al
/// cargar el árbol.
pub fn filter_tree(root: &Company, filters: &FilterOptions, classifier: &Classifier) -> Option<Company> {
    let subsidiaries: Vec<Company> = root
        .subsidiaries
        .iter()
        .filter_map(|child| filter_tree(child, filters, classifier))
        .collect();

    if subsidiaries.is_empty() && !matches(root, filters, classifier) {
        return None;
    }

    Some(Company {
        account_id: root.account_id.clone(),
        name: root.name.clone(),
        all_tags: root.all_tags.clone(),
        depth: root.depth,
        parent_company: root.parent_company.clone(),
        profile_url: root.profile_url.clone(),
        website: root.website.clone(),
        subsidiaries,
    })
}
