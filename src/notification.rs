//! data structures for deserializing incoming alert notifications
use std::collections::HashMap;

use chrono::{DateTime, Local, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// the only alertmanager webhook payload version we understand
pub const SUPPORTED_WEBHOOK_VERSION: &str = "4";

/// Error occuring while decoding the body of a `POST /webhook` request
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("got empty request body")]
    EmptyBody,
    #[error("request body is not a valid notification: {0}")]
    MalformedJson(#[from] serde_json::Error),
    #[error("do not understand webhook version {0:?}, only version {SUPPORTED_WEBHOOK_VERSION:?} is supported")]
    UnsupportedVersion(String),
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
/// alert group sent by the alertmanager webhook, plus the receipt timestamp
/// we stamp onto it before templating
#[allow(clippy::missing_docs_in_private_items)]
pub struct Notification {
    #[serde(default)]
    version: String,
    #[serde(default)]
    group_key: String,

    #[serde(default)]
    receiver: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    alerts: Vec<Alert>,
    #[serde(default)]
    group_labels: HashMap<String, String>,
    #[serde(default)]
    common_labels: HashMap<String, String>,
    #[serde(default)]
    common_annotations: HashMap<String, String>,
    #[serde(rename = "externalURL", default)]
    external_url: String,

    /// when we received the notification, ISO-8601 with offset. always
    /// assigned by [Notification::decode], never trusted from the client
    #[serde(rename = "@timestamp", default)]
    timestamp: String,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
#[allow(clippy::missing_docs_in_private_items)]
struct Alert {
    #[serde(default)]
    status: String,
    #[serde(default)]
    labels: HashMap<String, String>,
    #[serde(default)]
    annotations: HashMap<String, String>,
    starts_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
    #[serde(rename = "generatorURL", default)]
    generator_url: String,
}

impl Notification {
    /// Parses and validates a raw request body.
    ///
    /// Rejects empty or malformed bodies and payloads with an unsupported
    /// version field. On success the receipt timestamp is stamped from the
    /// server clock, overwriting whatever the client may have sent.
    pub fn decode(raw: &[u8]) -> Result<Self, DecodeError> {
        if raw.is_empty() {
            return Err(DecodeError::EmptyBody);
        }

        let mut notification: Notification = serde_json::from_slice(raw)?;

        if notification.version != SUPPORTED_WEBHOOK_VERSION {
            return Err(DecodeError::UnsupportedVersion(notification.version));
        }

        notification.timestamp = Local::now().to_rfc3339_opts(SecondsFormat::Secs, true);

        Ok(notification)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(version: &str) -> String {
        format!(
            r#"{{
                "version": "{version}",
                "groupKey": "{{}}/{{}}:{{alertname=\"Foo_Bar\"}}",
                "receiver": "chat",
                "status": "firing",
                "alerts": [
                    {{
                        "status": "firing",
                        "labels": {{ "alertname": "Foo_Bar", "instance": "foo1" }},
                        "annotations": {{ "summary": "Alert summary" }},
                        "startsAt": "2017-02-02T16:51:13.507955756Z",
                        "endsAt": "0001-01-01T00:00:00Z",
                        "generatorURL": "https://example.com"
                    }}
                ],
                "groupLabels": {{ "alertname": "Foo_Bar" }},
                "commonLabels": {{ "alertname": "Foo_Bar" }},
                "commonAnnotations": {{ "summary": "Alert summary" }},
                "externalURL": "https://alertmanager.example.com"
            }}"#
        )
    }

    #[test]
    fn decodes_supported_version() {
        let notification = Notification::decode(payload("4").as_bytes()).unwrap();

        assert_eq!(notification.version, "4");
        assert_eq!(notification.receiver, "chat");
        assert_eq!(notification.alerts.len(), 1);
        assert_eq!(notification.alerts[0].labels["instance"], "foo1");
    }

    #[test]
    fn stamps_receipt_timestamp() {
        let notification = Notification::decode(payload("4").as_bytes()).unwrap();

        assert!(!notification.timestamp.is_empty());
        DateTime::parse_from_rfc3339(&notification.timestamp).unwrap();
    }

    #[test]
    fn overwrites_client_supplied_timestamp() {
        let body = r#"{ "version": "4", "@timestamp": "1970-01-01T00:00:00Z" }"#;
        let notification = Notification::decode(body.as_bytes()).unwrap();

        assert_ne!(notification.timestamp, "1970-01-01T00:00:00Z");
    }

    #[test]
    fn rejects_empty_body() {
        assert!(matches!(
            Notification::decode(b""),
            Err(DecodeError::EmptyBody)
        ));
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(matches!(
            Notification::decode(b"{ not json"),
            Err(DecodeError::MalformedJson(_))
        ));
    }

    #[test]
    fn rejects_unsupported_version() {
        assert!(matches!(
            Notification::decode(payload("3").as_bytes()),
            Err(DecodeError::UnsupportedVersion(version)) if version == "3"
        ));
    }

    #[test]
    fn missing_version_field_is_unsupported() {
        assert!(matches!(
            Notification::decode(br#"{ "receiver": "chat" }"#),
            Err(DecodeError::UnsupportedVersion(version)) if version.is_empty()
        ));
    }
}
