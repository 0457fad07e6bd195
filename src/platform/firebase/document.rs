//! Document database value encoding.
//!
//! Every field is a one-key object naming its type, e.g.
//! `{"stringValue": "hi"}`. Only the handful of types the chat collections
//! use are read or written.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::models::{Message, MessageBody, MessageKind, NewMessage, Profile};

pub type Fields = BTreeMap<String, Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub name: String,
    #[serde(default)]
    pub fields: Fields,
}

impl Document {
    /// Last path segment of the resource name.
    pub fn id(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or("")
    }

    pub fn string(&self, key: &str) -> Option<&str> {
        self.fields.get(key)?.get("stringValue")?.as_str()
    }

    pub fn boolean(&self, key: &str) -> Option<bool> {
        self.fields.get(key)?.get("booleanValue")?.as_bool()
    }

    pub fn timestamp(&self, key: &str) -> Option<DateTime<Utc>> {
        let raw = self.fields.get(key)?.get("timestampValue")?.as_str()?;
        DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }
}

pub fn string_value(s: &str) -> Value {
    json!({ "stringValue": s })
}

pub fn bool_value(b: bool) -> Value {
    json!({ "booleanValue": b })
}

pub fn null_value() -> Value {
    json!({ "nullValue": null })
}

/// Directory record fields. `createdAt` is left to a server transform.
pub fn profile_fields(profile: &Profile) -> Fields {
    let mut fields = Fields::new();
    fields.insert("uid".into(), string_value(&profile.id));
    fields.insert("name".into(), string_value(&profile.display_name));
    fields.insert("phoneNumber".into(), string_value(&profile.phone_number));
    fields
}

pub fn profile_from(doc: &Document) -> Profile {
    Profile {
        id: doc.id().to_string(),
        display_name: doc.string("name").unwrap_or_default().to_string(),
        phone_number: doc.string("phoneNumber").unwrap_or_default().to_string(),
        created_at: doc.timestamp("createdAt"),
    }
}

/// Message fields for a fresh append. `createdAt` is left to a server
/// transform.
pub fn message_fields(message: &NewMessage) -> Fields {
    let mut fields = Fields::new();
    match &message.body {
        MessageBody::Text(text) => {
            fields.insert("text".into(), string_value(text));
        }
        MessageBody::Image { url } => {
            fields.insert("fileURL".into(), string_value(url));
        }
    }
    fields.insert("sender".into(), string_value(&message.sender_label));
    fields.insert("uid".into(), string_value(&message.sender_id));
    fields.insert("read".into(), bool_value(false));
    fields.insert("type".into(), string_value(message.body.kind().as_str()));
    let reply = match &message.reply_to_text {
        Some(text) => string_value(text),
        None => null_value(),
    };
    fields.insert("replyTo".into(), reply);
    fields
}

/// Decode a logged message. Documents without a server timestamp have no
/// place in the order and are skipped.
pub fn message_from(doc: &Document) -> Option<Message> {
    let created_at = doc.timestamp("createdAt")?;
    let kind = match doc.string("type") {
        Some("image") => MessageKind::Image,
        _ => MessageKind::Text,
    };
    let body = match kind {
        MessageKind::Image => MessageBody::Image {
            url: doc.string("fileURL").unwrap_or_default().to_string(),
        },
        MessageKind::Text => MessageBody::Text(doc.string("text").unwrap_or_default().to_string()),
    };

    Some(Message {
        id: doc.id().to_string(),
        body,
        sender_id: doc.string("uid").unwrap_or_default().to_string(),
        sender_label: doc.string("sender").unwrap_or_default().to_string(),
        created_at,
        read: doc.boolean("read").unwrap_or(false),
        reply_to_text: doc.string("replyTo").map(String::from),
    })
}
