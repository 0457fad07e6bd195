//! Directory, message log and typing flags in the document database.

use anyhow::{Context, Result};
use futures::future::BoxFuture;
use serde::Deserialize;
use serde_json::json;

use super::document::{self, Document, Fields};
use super::{check_response, Firebase, Inner};
use crate::models::{Message, MessagePatch, NewMessage, Profile, TypingFlag};
use crate::platform::{DirectoryStore, MessageLog, Subscription, TypingStore};

const FIRESTORE: &str = "https://firestore.googleapis.com/v1";
const USERS: &str = "users";
const MESSAGES: &str = "messages";
const TYPING: &str = "typing";
const PAGE_SIZE: usize = 300;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    documents: Vec<Document>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QueryRow {
    document: Option<Document>,
}

/// Outcome of a commit guarded by a precondition.
enum CommitOutcome {
    Applied,
    PreconditionFailed,
}

impl Inner {
    /// `projects/{p}/databases/(default)/documents`
    fn database_path(&self) -> String {
        format!(
            "projects/{}/databases/(default)/documents",
            self.config.project_id
        )
    }

    fn documents_url(&self) -> String {
        format!("{}/{}", FIRESTORE, self.database_path())
    }

    fn document_name(&self, collection: &str, id: &str) -> String {
        format!("{}/{}/{}", self.database_path(), collection, id)
    }

    async fn get_document(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        let token = self.id_token().await?;
        let url = format!("{}/{}/{}", self.documents_url(), collection, id);
        tracing::debug!("Firestore GET {}", url);

        let resp = self
            .http
            .get(&url)
            .bearer_auth(&token)
            .send()
            .await
            .with_context(|| format!("Firestore GET {} failed", url))?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let resp = check_response(resp, &url).await?;
        let doc = resp
            .json()
            .await
            .context("Failed to parse document response")?;
        Ok(Some(doc))
    }

    async fn list_documents(&self, collection: &str) -> Result<Vec<Document>> {
        let token = self.id_token().await?;
        let url = format!("{}/{}", self.documents_url(), collection);
        let mut documents = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut req = self
                .http
                .get(&url)
                .bearer_auth(&token)
                .query(&[("pageSize", PAGE_SIZE.to_string())]);
            if let Some(ref page) = page_token {
                req = req.query(&[("pageToken", page)]);
            }

            tracing::debug!("Firestore LIST {}", url);
            let resp = req
                .send()
                .await
                .with_context(|| format!("Firestore LIST {} failed", url))?;
            let resp = check_response(resp, &url).await?;
            let page: ListResponse = resp
                .json()
                .await
                .context("Failed to parse list response")?;

            documents.extend(page.documents);
            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        Ok(documents)
    }

    /// Create a document with a server-stamped `createdAt`, failing the
    /// precondition if it already exists.
    async fn create_stamped(
        &self,
        collection: &str,
        id: &str,
        fields: Fields,
    ) -> Result<CommitOutcome> {
        let token = self.id_token().await?;
        let url = format!("{}:commit", self.documents_url());
        let body = json!({
            "writes": [{
                "update": {
                    "name": self.document_name(collection, id),
                    "fields": fields,
                },
                "updateTransforms": [{
                    "fieldPath": "createdAt",
                    "setToServerValue": "REQUEST_TIME",
                }],
                "currentDocument": { "exists": false },
            }]
        });

        tracing::debug!("Firestore COMMIT {}/{}", collection, id);
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Firestore COMMIT {} failed", url))?;

        let status = resp.status();
        if status == reqwest::StatusCode::CONFLICT {
            return Ok(CommitOutcome::PreconditionFailed);
        }
        if status == reqwest::StatusCode::BAD_REQUEST {
            let text = resp.text().await.unwrap_or_default();
            if text.contains("FAILED_PRECONDITION") || text.contains("ALREADY_EXISTS") {
                return Ok(CommitOutcome::PreconditionFailed);
            }
            anyhow::bail!("HTTP 400 for {}: {}", url, text);
        }

        check_response(resp, &url).await?;
        Ok(CommitOutcome::Applied)
    }

    /// Patch the named fields. With `must_exist`, a missing document is an
    /// error instead of being created.
    async fn patch_fields(
        &self,
        collection: &str,
        id: &str,
        fields: Fields,
        must_exist: bool,
    ) -> Result<()> {
        let token = self.id_token().await?;
        let url = format!("{}/{}/{}", self.documents_url(), collection, id);
        let mut query: Vec<(&str, String)> = fields
            .keys()
            .map(|k| ("updateMask.fieldPaths", k.clone()))
            .collect();
        if must_exist {
            query.push(("currentDocument.exists", "true".to_string()));
        }

        tracing::debug!("Firestore PATCH {}", url);
        let resp = self
            .http
            .patch(&url)
            .bearer_auth(&token)
            .query(&query)
            .json(&json!({ "fields": fields }))
            .send()
            .await
            .with_context(|| format!("Firestore PATCH {} failed", url))?;
        check_response(resp, &url).await?;
        Ok(())
    }

    /// Whole message log ordered by server timestamp.
    async fn ordered_messages(&self) -> Result<Vec<Message>> {
        let token = self.id_token().await?;
        let url = format!("{}:runQuery", self.documents_url());
        let body = json!({
            "structuredQuery": {
                "from": [{ "collectionId": MESSAGES }],
                "orderBy": [{
                    "field": { "fieldPath": "createdAt" },
                    "direction": "ASCENDING",
                }],
            }
        });

        let resp = self
            .http
            .post(&url)
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Firestore QUERY {} failed", url))?;
        let resp = check_response(resp, &url).await?;
        let rows: Vec<QueryRow> = resp
            .json()
            .await
            .context("Failed to parse runQuery response")?;

        let mut messages: Vec<Message> = rows
            .iter()
            .filter_map(|row| row.document.as_ref())
            .filter_map(document::message_from)
            .collect();
        messages.sort_by(|a, b| a.order_key().cmp(&b.order_key()));
        Ok(messages)
    }

    async fn typing_flag(&self, owner_id: &str) -> Result<TypingFlag> {
        let doc = self.get_document(TYPING, owner_id).await?;
        Ok(TypingFlag {
            owner_id: owner_id.to_string(),
            is_typing: doc.and_then(|d| d.boolean("isTyping")).unwrap_or(false),
        })
    }
}

impl DirectoryStore for Firebase {
    fn get<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<Option<Profile>>> {
        Box::pin(async move {
            let doc = self.inner.get_document(USERS, id).await?;
            Ok(doc.as_ref().map(document::profile_from))
        })
    }

    fn create_if_absent<'a>(&'a self, profile: &'a Profile) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            let outcome = self
                .inner
                .create_stamped(USERS, &profile.id, document::profile_fields(profile))
                .await?;
            Ok(matches!(outcome, CommitOutcome::Applied))
        })
    }

    fn list_all(&self) -> BoxFuture<'_, Result<Vec<Profile>>> {
        Box::pin(async move {
            let docs = self.inner.list_documents(USERS).await?;
            Ok(docs.iter().map(document::profile_from).collect())
        })
    }
}

impl MessageLog for Firebase {
    fn append<'a>(&'a self, message: &'a NewMessage) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            let id = uuid::Uuid::new_v4().simple().to_string();
            match self
                .inner
                .create_stamped(MESSAGES, &id, document::message_fields(message))
                .await?
            {
                CommitOutcome::Applied => Ok(id),
                CommitOutcome::PreconditionFailed => {
                    anyhow::bail!("message id {} already taken", id)
                }
            }
        })
    }

    fn subscribe_ordered(&self) -> Subscription<Vec<Message>> {
        self.poll("messages", |inner| async move {
            inner.ordered_messages().await
        })
    }

    fn patch<'a>(&'a self, id: &'a str, patch: MessagePatch) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut fields = Fields::new();
            match patch {
                MessagePatch::MarkRead => {
                    fields.insert("read".into(), document::bool_value(true));
                }
            }
            self.inner.patch_fields(MESSAGES, id, fields, true).await
        })
    }
}

impl TypingStore for Firebase {
    fn upsert<'a>(&'a self, owner_id: &'a str, is_typing: bool) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut fields = Fields::new();
            fields.insert("isTyping".into(), document::bool_value(is_typing));
            self.inner.patch_fields(TYPING, owner_id, fields, false).await
        })
    }

    fn watch(&self, owner_id: &str) -> Subscription<TypingFlag> {
        let owner_id = owner_id.to_string();
        self.poll("typing", move |inner| {
            let owner_id = owner_id.clone();
            async move { inner.typing_flag(&owner_id).await }
        })
    }
}
