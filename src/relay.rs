//! The relay pipeline: decode, render, forward to the configured target.
//!
//! [`Relay::forward`] walks a notification through the pipeline in strict
//! sequence, one terminal outcome per request. Admission is a fixed-capacity
//! semaphore acquired before any work happens; a saturated gate blocks the
//! caller instead of shedding load, so a slow target slows the upstream
//! alertmanager down with it.

use http::{
    header::{CONTENT_TYPE, USER_AGENT},
    StatusCode,
};
use thiserror::Error;
use tokio::sync::{Semaphore, SemaphorePermit};
use url::Url;

use crate::{
    notification::{DecodeError, Notification},
    renderer::Renderer,
    settings::{version_string, Settings},
};

/// cap on how much of a downstream error body makes it into logs and caller
/// responses
const REJECTION_BODY_LIMIT: usize = 512;

/// Everything that can terminate a relay attempt early.
#[derive(Error, Debug)]
pub enum RelayError {
    #[error(transparent)]
    Invalid(#[from] DecodeError),
    #[error("could not render notification: {0}")]
    Render(#[from] tera::Error),
    #[error("POST to target {url} failed: {source}")]
    Transport { url: Url, source: reqwest::Error },
    #[error("POST to target {url} returned HTTP {status}: {body}")]
    Rejected {
        url: Url,
        status: StatusCode,
        body: String,
    },
}

/// How a failed relay is counted and reported to the caller.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RelayOutcome {
    /// the notification never made it past decoding
    Invalid,
    /// rendering or forwarding failed, worth retrying upstream
    Errored,
}

impl RelayError {
    pub fn outcome(&self) -> RelayOutcome {
        match self {
            RelayError::Invalid(_) => RelayOutcome::Invalid,
            RelayError::Render(_) | RelayError::Transport { .. } | RelayError::Rejected { .. } => {
                RelayOutcome::Errored
            }
        }
    }

    /// status returned to the original caller. errored outcomes map to 500
    /// so the alertmanager retries the notification
    pub fn status_code(&self) -> StatusCode {
        match self.outcome() {
            RelayOutcome::Invalid => StatusCode::BAD_REQUEST,
            RelayOutcome::Errored => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Forwards decoded notifications to the target, at most
/// `max_concurrent_relays` at a time.
pub struct Relay {
    client: reqwest::Client,
    target_url: Url,
    renderer: Renderer,
    admission: Semaphore,
    chunked: bool,
}

impl Relay {
    pub fn new(renderer: Renderer, settings: &Settings) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .build()?;

        Ok(Self {
            client,
            target_url: settings.target_url.clone(),
            renderer,
            admission: Semaphore::new(settings.max_concurrent_relays),
            chunked: !settings.disable_chunked,
        })
    }

    /// Waits for a free relay slot.
    ///
    /// The returned permit is the slot. Dropping it frees the slot again,
    /// whichever way the relay attempt ends.
    pub async fn admit(&self) -> SemaphorePermit<'_> {
        #[allow(clippy::expect_used)]
        self.admission
            .acquire()
            .await
            .expect("admission gate is never closed")
    }

    /// Relays one raw request body to the target.
    pub async fn forward(&self, raw: &[u8]) -> Result<(), RelayError> {
        let notification = Notification::decode(raw)?;

        let request = self
            .client
            .post(self.target_url.clone())
            .header(USER_AGENT, version_string())
            .header(CONTENT_TYPE, "application/json");

        // in chunked mode transmission starts while the template is still
        // rendering; a render failure then aborts the in-flight request and
        // surfaces as a transport error, keeping the same classification as
        // the buffered path
        let request = if self.chunked {
            request.body(self.renderer.render_stream(notification))
        } else {
            request.body(self.renderer.render(&notification)?)
        };

        let response = request
            .send()
            .await
            .map_err(|source| RelayError::Transport {
                url: self.target_url.clone(),
                source,
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|source| RelayError::Transport {
                url: self.target_url.clone(),
                source,
            })?;

        if !status.is_success() {
            return Err(RelayError::Rejected {
                url: self.target_url.clone(),
                status,
                body: truncated(body),
            });
        }

        Ok(())
    }
}

fn truncated(mut body: String) -> String {
    if body.len() > REJECTION_BODY_LIMIT {
        let mut end = REJECTION_BODY_LIMIT;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        body.truncate(end);
        body.push_str(" [truncated]");
    }

    body
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::timeout;

    use super::*;
    use crate::log::LogSettings;

    fn relay(max_concurrent_relays: usize) -> Relay {
        let settings = Settings {
            listen_address: "127.0.0.1:0".parse().unwrap(),
            target_url: "http://127.0.0.1:9/webhook".parse().unwrap(),
            template_path: "templates/rocketchat.tmpl".into(),
            max_concurrent_relays,
            disable_chunked: false,
            request_timeout: Duration::from_secs(10),
            log: LogSettings {
                level: "info".into(),
            },
        };

        let renderer = Renderer::from_file(&settings.template_path).unwrap();

        Relay::new(renderer, &settings).unwrap()
    }

    #[tokio::test]
    async fn admission_blocks_when_saturated() {
        let relay = relay(2);

        let first = relay.admit().await;
        let _second = relay.admit().await;

        assert!(timeout(Duration::from_millis(50), relay.admit())
            .await
            .is_err());

        drop(first);
        timeout(Duration::from_millis(50), relay.admit())
            .await
            .expect("slot freed by the dropped permit");
    }

    #[test]
    fn classification_matches_caller_status() {
        let invalid = RelayError::Invalid(DecodeError::EmptyBody);
        assert_eq!(invalid.outcome(), RelayOutcome::Invalid);
        assert_eq!(invalid.status_code(), StatusCode::BAD_REQUEST);

        let rejected = RelayError::Rejected {
            url: "http://chat.example.com/hook".parse().unwrap(),
            status: StatusCode::NOT_FOUND,
            body: "no such hook".into(),
        };
        assert_eq!(rejected.outcome(), RelayOutcome::Errored);
        assert_eq!(rejected.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn rejection_bodies_are_truncated() {
        let body = truncated("x".repeat(4 * REJECTION_BODY_LIMIT));

        assert!(body.len() <= REJECTION_BODY_LIMIT + " [truncated]".len());
        assert!(body.ends_with(" [truncated]"));

        assert_eq!(truncated("all fine".into()), "all fine");
    }
}
