//! bounded-concurrency relay forwarding alertmanager notifications to a
//! chat webhook
//!
//! Features:
//! - renders alert groups through a tera template loaded once at startup
//! - streams the rendered payload to the target while rendering is still
//!   running, or buffers it first when chunked transfer is disabled
//! - bounds concurrent relays with a fixed-capacity admission gate

pub mod log;
pub mod metrics;
pub mod notification;
pub mod relay;
pub mod renderer;
pub mod server;
pub mod settings;
