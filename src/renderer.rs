//! Renders notifications into the outbound payload via a tera template.
//!
//! The template is loaded and parsed once at startup; a broken template file
//! must keep the process from starting at all. The parsed [`Tera`] instance
//! is immutable afterwards and shared across all concurrent requests.
//!
//! Rendering supports two delivery modes against the same parsed template:
//!
//! * buffered - [`Renderer::render`] produces the complete payload in memory
//! * streamed - [`Renderer::render_stream`] runs the template on a blocking
//!   task that writes into a bounded pipe, returning a [`reqwest::Body`]
//!   which yields chunks while rendering is still in progress
//!
//! Both modes produce byte-identical output for the same notification.

use std::{io, sync::Arc};

use bytes::Bytes;
use tera::Tera;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::notification::Notification;

/// name the template file is registered under
const TEMPLATE_NAME: &str = "post";

/// chunk capacity of the render pipe. a full pipe blocks the render task
/// until the http client has transmitted the backlog
const PIPE_DEPTH: usize = 16;

/// Load-once wrapper around the post template.
#[derive(Clone)]
pub struct Renderer {
    tera: Arc<Tera>,
}

impl Renderer {
    /// Loads and parses the template file. An unparsable template is
    /// reported here, before any traffic is accepted.
    pub fn from_file(path: &str) -> Result<Self, tera::Error> {
        let mut tera = Tera::default();
        tera.add_template_file(path, Some(TEMPLATE_NAME))?;

        Ok(Self {
            tera: Arc::new(tera),
        })
    }

    /// Renders the notification fully into memory.
    pub fn render(&self, notification: &Notification) -> Result<String, tera::Error> {
        self.tera
            .render(TEMPLATE_NAME, &tera::Context::from_serialize(notification)?)
    }

    /// Renders the notification into a streaming request body.
    ///
    /// The template runs on a blocking task and writes into a bounded pipe;
    /// the returned body yields chunks as they are produced. Dropping the
    /// write end signals end-of-body. A render failure is forwarded through
    /// the pipe as an error item, failing the request the body is attached
    /// to. If the body is dropped mid-transfer the next pipe write fails and
    /// the render task winds down on its own.
    pub fn render_stream(&self, notification: Notification) -> reqwest::Body {
        reqwest::Body::wrap_stream(self.render_chunks(notification))
    }

    /// spawns the render task and returns the read end of the pipe
    fn render_chunks(&self, notification: Notification) -> ReceiverStream<io::Result<Bytes>> {
        let (tx, rx) = mpsc::channel(PIPE_DEPTH);
        let tera = Arc::clone(&self.tera);

        tokio::task::spawn_blocking(move || {
            let context = match tera::Context::from_serialize(&notification) {
                Ok(context) => context,
                Err(err) => {
                    let _ = tx.blocking_send(Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        err.to_string(),
                    )));
                    return;
                }
            };

            let pipe = PipeWriter { tx: tx.clone() };
            if let Err(err) = tera.render_to(TEMPLATE_NAME, &context, pipe) {
                let _ = tx.blocking_send(Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    err.to_string(),
                )));
            }
            // tx drops here, closing the pipe and signalling end-of-body
        });

        ReceiverStream::new(rx)
    }
}

/// write end of the render pipe handed to tera
struct PipeWriter {
    tx: mpsc::Sender<io::Result<Bytes>>,
}

impl io::Write for PipeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.tx
            .blocking_send(Ok(Bytes::copy_from_slice(buf)))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "body consumer went away"))?;

        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
