//! Wire representation of change events on the notification channel.
//!
//! One event per line: a JSON array `[namespace, category, verb, payload]`,
//! where the payload is `{type, filePath, isPathDir, bodyText?, timestamp}`.

use serde::{Deserialize, Serialize};

use crate::config::{DEFAULT_CATEGORY, DEFAULT_NAMESPACE};
use crate::event::{ChangeEvent, ChangeKind, TargetKind};

#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("malformed envelope: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown verb `{0}`")]
    UnknownVerb(String),
}

/// Event body as subscribers see it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payload {
    #[serde(rename = "type")]
    pub kind: String,
    pub file_path: String,
    pub is_path_dir: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_text: Option<String>,
    pub timestamp: u64,
}

impl From<&ChangeEvent> for Payload {
    fn from(event: &ChangeEvent) -> Self {
        Self {
            kind: event.kind().verb().to_string(),
            file_path: event.path().to_string(),
            is_path_dir: event.target().is_dir(),
            body_text: event.content().map(str::to_string),
            timestamp: event.timestamp(),
        }
    }
}

/// A decoded line: the labels plus the payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope(pub String, pub String, pub String, pub Payload);

impl Envelope {
    pub fn namespace(&self) -> &str {
        &self.0
    }

    pub fn category(&self) -> &str {
        &self.1
    }

    pub fn verb(&self) -> &str {
        &self.2
    }

    pub fn payload(&self) -> &Payload {
        &self.3
    }

    pub fn decode(line: &str) -> Result<Self, WireError> {
        Ok(serde_json::from_str(line.trim_end())?)
    }

    /// Rebuild the canonical event carried by this envelope.
    pub fn to_event(&self) -> Result<ChangeEvent, WireError> {
        let kind = ChangeKind::from_verb(self.verb())
            .ok_or_else(|| WireError::UnknownVerb(self.verb().to_string()))?;
        let payload = self.payload();
        let target = if payload.is_path_dir {
            TargetKind::Directory
        } else {
            TargetKind::File
        };
        Ok(ChangeEvent::with_timestamp(
            kind,
            target,
            payload.file_path.clone(),
            payload.body_text.clone(),
            payload.timestamp,
        ))
    }
}

/// Labels stamped on every outgoing envelope.
#[derive(Debug, Clone)]
pub struct WireFormat {
    pub namespace: String,
    pub category: String,
}

impl Default for WireFormat {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            category: DEFAULT_CATEGORY.to_string(),
        }
    }
}

impl WireFormat {
    /// Serialize `event` as one newline-terminated line.
    pub fn encode(&self, event: &ChangeEvent) -> Result<String, WireError> {
        let envelope = (
            &self.namespace,
            &self.category,
            event.kind().verb(),
            Payload::from(event),
        );
        let mut line = serde_json::to_string(&envelope)?;
        line.push('\n');
        Ok(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_matches_wire_shape() {
        let event = ChangeEvent::with_timestamp(
            ChangeKind::Created,
            TargetKind::File,
            "/docs/a.txt".to_string(),
            Some("hello".to_string()),
            1_700_000_000_000,
        );
        let line = WireFormat::default().encode(&event).unwrap();
        assert!(line.ends_with('\n'));

        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(
            value,
            serde_json::json!([
                "box-clone",
                "clients",
                "put",
                {
                    "type": "put",
                    "filePath": "/docs/a.txt",
                    "isPathDir": false,
                    "bodyText": "hello",
                    "timestamp": 1_700_000_000_000u64
                }
            ])
        );
    }

    #[test]
    fn test_body_text_omitted_without_content() {
        let event = ChangeEvent::with_timestamp(
            ChangeKind::Deleted,
            TargetKind::Directory,
            "/d".to_string(),
            None,
            5,
        );
        let line = WireFormat::default().encode(&event).unwrap();
        assert!(!line.contains("bodyText"));
        assert!(line.contains(r#""isPathDir":true"#));
        assert!(line.contains(r#""delete""#));
    }

    #[test]
    fn test_decode_back_to_event() {
        let event = ChangeEvent::with_timestamp(
            ChangeKind::Updated,
            TargetKind::File,
            "/x.md".to_string(),
            Some("# x".to_string()),
            42,
        );
        let wire = WireFormat {
            namespace: "vault".to_string(),
            category: "peers".to_string(),
        };
        let envelope = Envelope::decode(&wire.encode(&event).unwrap()).unwrap();
        assert_eq!(envelope.namespace(), "vault");
        assert_eq!(envelope.category(), "peers");
        assert_eq!(envelope.verb(), "post");
        assert_eq!(envelope.to_event().unwrap(), event);
    }

    #[test]
    fn test_decode_rejects_unknown_verb() {
        let line = r#"["box-clone","clients","patch",{"type":"patch","filePath":"/a","isPathDir":false,"timestamp":1}]"#;
        let envelope = Envelope::decode(line).unwrap();
        assert!(matches!(envelope.to_event(), Err(WireError::UnknownVerb(_))));
        assert!(Envelope::decode("not json").is_err());
    }
}
