//! CSV export
//!
//! Fixed columns, every field quoted, embedded quotes doubled. Rows are
//! limited by the same visibility predicate as listing.

use bson::oid::ObjectId;
use serde::Deserialize;

use crate::auth::Actor;
use crate::db::schemas::DocumentDoc;
use crate::services::documents::{DocumentService, FilterParams};
use crate::services::views::{rfc3339, UserIndex};
use crate::types::{DoctrackError, Result};
use crate::workflow::{DocumentQuery, Visibility};

pub const CSV_HEADERS: [&str; 10] = [
    "docRefShort",
    "docRef",
    "title",
    "owner",
    "assignedTo",
    "status",
    "createdAt",
    "updatedAt",
    "tags",
    "metadata",
];

/// Either an explicit id list or filters
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExportRequest {
    #[serde(default)]
    pub ids: Vec<String>,
    #[serde(default)]
    pub filters: FilterParams,
}

fn quote(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}

fn username_of(users: &UserIndex, id: Option<&ObjectId>) -> String {
    id.and_then(|id| users.get(id))
        .map(|u| u.username.clone())
        .unwrap_or_default()
}

/// Render documents as CSV text
pub fn render_csv(docs: &[DocumentDoc], users: &UserIndex) -> Result<String> {
    let mut lines = Vec::with_capacity(docs.len() + 1);
    lines.push(CSV_HEADERS.join(","));

    for doc in docs {
        let metadata = serde_json::to_string(&doc.metadata)?;
        let row = [
            doc.doc_ref_short.clone(),
            doc.doc_ref.clone(),
            doc.title.clone(),
            username_of(users, Some(&doc.owner)),
            username_of(users, doc.assigned_to.as_ref()),
            doc.status.to_string(),
            rfc3339(doc.created_at),
            rfc3339(doc.updated_at),
            doc.tags.join(";"),
            metadata,
        ];
        lines.push(row.iter().map(|f| quote(f)).collect::<Vec<_>>().join(","));
    }

    Ok(lines.join("\n"))
}

impl DocumentService {
    pub async fn export(&self, actor: &Actor, request: ExportRequest) -> Result<String> {
        let visibility = Visibility::resolve(actor, self.stores.users.as_ref()).await?;

        let query = if request.ids.is_empty() {
            DocumentQuery::new(visibility, request.filters.into_filter()?)
        } else {
            let ids = request
                .ids
                .iter()
                .map(|raw| ObjectId::parse_str(raw.trim()))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|_| DoctrackError::Validation("Invalid document id".into()))?;
            DocumentQuery::new(visibility, Default::default()).with_ids(ids)
        };

        let docs = self.stores.documents.find(&query, None).await?;
        let users = UserIndex::load(self.stores.users.as_ref(), &docs).await?;
        render_csv(&docs, &users)
    }
}
