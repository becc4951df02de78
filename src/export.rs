//! Exportación CSV de un árbol (normalmente ya filtrado y aplanado).

use std::borrow::Cow;

use crate::{
    classify::Classifier,
    models::{Company, TagMap},
};

pub const CSV_HEADER: [&str; 11] = [
    "name",
    "accountId",
    "depth",
    "sector",
    "size",
    "tags",
    "customTags",
    "website",
    "profileUrl",
    "parentCompany",
    "subsidiaries",
];

/// Escapado RFC 4180: comillas dobles alrededor y comillas internas duplicadas.
fn escape_field(value: &str) -> Cow<'_, str> {
    if value.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", value.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(value)
    }
}

fn push_row<'a>(out: &mut String, fields: impl IntoIterator<Item = Cow<'a, str>>) {
    for (i, field) in fields.into_iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&escape_field(&field));
    }
    out.push('\n');
}

/// Una fila por nodo, en el orden recibido, con cabecera. Las etiquetas
/// personalizadas se cruzan por `accountId`.
pub fn export_to_csv<'a, I>(rows: I, classifier: &Classifier, tags: &TagMap) -> String
where
    I: IntoIterator<Item = &'a Company>,
{
    let mut out = String::new();
    push_row(&mut out, CSV_HEADER.iter().map(|h| Cow::Borrowed(*h)));

    for company in rows {
        let custom_tags = tags
            .get(&company.account_id)
            .map(|list| {
                list.iter()
                    .map(|t| t.tag_type.as_str())
                    .collect::<Vec<_>>()
                    .join("; ")
            })
            .unwrap_or_default();

        push_row(
            &mut out,
            [
                Cow::Borrowed(company.name.as_str()),
                Cow::Borrowed(company.account_id.as_str()),
                Cow::Owned(company.depth.to_string()),
                Cow::Borrowed(classifier.sector_of(company).unwrap_or("")),
                Cow::Borrowed(classifier.size_of(company).unwrap_or("")),
                Cow::Owned(company.all_tags.join("; ")),
                Cow::Owned(custom_tags),
                Cow::Borrowed(company.website.as_deref().unwrap_or("")),
                Cow::Borrowed(company.profile_url.as_deref().unwrap_or("")),
                Cow::Borrowed(
                    company
                        .parent_company
                        .as_ref()
                        .map(|p| p.name.as_str())
                        .unwrap_or(""),
                ),
                Cow::Owned(company.subsidiary_count().to_string()),
            ],
        );
    }

    out
}
