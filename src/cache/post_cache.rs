//! Field codec between a post row and its cached hash.
//!
//! The hash stores every scalar column as a string field; timestamps
//! are RFC 3339. Relations (author, tags, comments) are never cached,
//! so a cache hit serves the bare post only.

use std::collections::HashMap;

use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use uuid::Uuid;

use crate::domain::entities::PostRecord;
use crate::domain::types::PostStatus;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("cached post is missing field `{0}`")]
    MissingField(&'static str),
    #[error("cached post field `{0}` is malformed")]
    Malformed(&'static str),
}

/// The scalar post fields held in the `post:{id}` hash.
#[derive(Debug, Clone, PartialEq)]
pub struct PostSnapshot {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub summary: Option<String>,
    pub cover: Option<String>,
    pub status: PostStatus,
    pub author_id: Uuid,
    pub view_count: i64,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl PostSnapshot {
    pub fn from_record(record: &PostRecord) -> Self {
        Self {
            id: record.id,
            title: record.title.clone(),
            content: record.content.clone(),
            summary: record.summary.clone(),
            cover: record.cover.clone(),
            status: record.status,
            author_id: record.author_id,
            view_count: record.view_count,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }

    pub fn into_record(self) -> PostRecord {
        PostRecord {
            id: self.id,
            title: self.title,
            content: self.content,
            summary: self.summary,
            cover: self.cover,
            status: self.status,
            author_id: self.author_id,
            view_count: self.view_count,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    pub fn to_fields(&self) -> Result<Vec<(String, String)>, SnapshotError> {
        let created_at = self
            .created_at
            .format(&Rfc3339)
            .map_err(|_| SnapshotError::Malformed("created_at"))?;
        let updated_at = self
            .updated_at
            .format(&Rfc3339)
            .map_err(|_| SnapshotError::Malformed("updated_at"))?;

        Ok(vec![
            ("id".to_string(), self.id.to_string()),
            ("title".to_string(), self.title.clone()),
            ("content".to_string(), self.content.clone()),
            (
                "summary".to_string(),
                self.summary.clone().unwrap_or_default(),
            ),
            ("cover".to_string(), self.cover.clone().unwrap_or_default()),
            ("status".to_string(), self.status.as_str().to_string()),
            ("user_id".to_string(), self.author_id.to_string()),
            ("view_count".to_string(), self.view_count.to_string()),
            ("created_at".to_string(), created_at),
            ("updated_at".to_string(), updated_at),
        ])
    }

    pub fn parse(fields: &HashMap<String, String>) -> Result<Self, SnapshotError> {
        fn required<'a>(
            fields: &'a HashMap<String, String>,
            name: &'static str,
        ) -> Result<&'a str, SnapshotError> {
            fields
                .get(name)
                .map(String::as_str)
                .ok_or(SnapshotError::MissingField(name))
        }

        let id = required(fields, "id")?
            .parse::<Uuid>()
            .map_err(|_| SnapshotError::Malformed("id"))?;
        let author_id = required(fields, "user_id")?
            .parse::<Uuid>()
            .map_err(|_| SnapshotError::Malformed("user_id"))?;
        let status = PostStatus::try_from(required(fields, "status")?)
            .map_err(|_| SnapshotError::Malformed("status"))?;
        let view_count = required(fields, "view_count")?
            .parse::<i64>()
            .map_err(|_| SnapshotError::Malformed("view_count"))?;
        let created_at = OffsetDateTime::parse(required(fields, "created_at")?, &Rfc3339)
            .map_err(|_| SnapshotError::Malformed("created_at"))?;
        let updated_at = OffsetDateTime::parse(required(fields, "updated_at")?, &Rfc3339)
            .map_err(|_| SnapshotError::Malformed("updated_at"))?;

        let optional = |name: &'static str| -> Option<String> {
            fields
                .get(name)
                .filter(|value| !value.is_empty())
                .cloned()
        };

        Ok(Self {
            id,
            title: required(fields, "title")?.to_string(),
            content: required(fields, "content")?.to_string(),
            summary: optional("summary"),
            cover: optional("cover"),
            status,
            author_id,
            view_count,
            created_at,
            updated_at,
        })
    }
}
