//! Agregación de métricas del dashboard en una sola pasada sobre el árbol.

use crate::{classify::Classifier, models::{Company, CompanyStats}, tree};

pub fn compute_stats(root: &Company, classifier: &Classifier) -> CompanyStats {
    let mut stats = CompanyStats::default();

    for node in tree::flatten(root) {
        stats.total_companies += 1;
        stats.max_depth = stats.max_depth.max(node.depth);
        *stats.companies_by_depth.entry(node.depth).or_insert(0) += 1;

        if let Some(sector) = classifier.sector_of(node) {
            *stats.companies_by_sector.entry(sector.to_string()).or_insert(0) += 1;
        }
        if let Some(size) = classifier.size_of(node) {
            *stats.companies_by_size.entry(size.to_string()).or_insert(0) += 1;
        }
        if node.has_website() {
            stats.companies_with_website += 1;
        }
        if classifier.is_international(node) {
            stats.international_companies += 1;
        }
    }

    stats
}
