use std::{net::SocketAddr, time::Duration};

use anyhow::{bail, Context, Result};
use clap::{crate_description, crate_name, Arg, Command};
use config::{Config, File};
use once_cell::sync::{Lazy, OnceCell};
use serde::Deserialize;
use serde_with::{serde_as, DurationSeconds};
use url::Url;

use crate::log::LogSettings;

/// application name, used as the metrics namespace and in the version string
pub const APPLICATION: &str = "foghorn";

/// the `<version> (<arch>-<os>)` part of the version string, also printed
/// by `--version`
static VERSION_SUFFIX: Lazy<String> = Lazy::new(|| {
    format!(
        "{} ({}-{})",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::ARCH,
        std::env::consts::OS
    )
});

static VERSION_STRING: Lazy<String> =
    Lazy::new(|| format!("{APPLICATION} {}", VERSION_SUFFIX.as_str()));

/// `<app> <version> (<arch>-<os>)`, sent as the outbound user agent and
/// served by `GET /version`
pub fn version_string() -> &'static str {
    &VERSION_STRING
}

static SETTINGS: OnceCell<Settings> = OnceCell::new();

#[serde_as]
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// host:port the webhook receiver listens on
    pub listen_address: SocketAddr,
    /// where rendered notifications are posted to
    pub target_url: Url,
    /// path of the post template, parsed once at startup
    pub template_path: String,
    /// capacity of the admission gate for `POST /webhook`
    pub max_concurrent_relays: usize,
    /// render the complete payload before posting instead of streaming it
    pub disable_chunked: bool,
    #[serde_as(as = "DurationSeconds<f64>")]
    pub request_timeout: Duration,
    pub log: LogSettings,
}

impl Settings {
    pub fn global() -> &'static Self {
        SETTINGS.get_or_init(|| {
            match Self::load().context("failed to load config and command line arguments") {
                Ok(settings) => settings,
                Err(err) => {
                    // tracing wasn't setup yet
                    panic!("{:#?}", err);
                }
            }
        })
    }

    fn load() -> Result<Self> {
        let opts = Command::new(crate_name!())
            .version(VERSION_SUFFIX.as_str())
            .about(crate_description!())
            .args([
                Arg::new("config")
                    .help("path of config file")
                    .takes_value(true)
                    .short('c')
                    .long("config"),
                Arg::new("addr")
                    .help("host:port to listen on")
                    .takes_value(true)
                    .long("addr"),
                Arg::new("target-url")
                    .help("HTTP URL to post rendered notifications to")
                    .takes_value(true)
                    .long("target-url"),
                Arg::new("template")
                    .help("template for the post content")
                    .takes_value(true)
                    .long("template"),
                Arg::new("max-clients")
                    .help("maximum concurrent relays for /webhook")
                    .takes_value(true)
                    .long("max-clients"),
                Arg::new("disable-chunked")
                    .help("disable chunked transfer encoding")
                    .long("disable-chunked"),
                Arg::new("level")
                    .help("log level")
                    .possible_values(["error", "warn", "info", "debug", "trace"])
                    .ignore_case(true)
                    .takes_value(true)
                    .long("log"),
            ])
            .get_matches();

        let mut builder = Config::builder()
            .set_default("listen_address", "127.0.0.1:9097")?
            .set_default("template_path", "templates/rocketchat.tmpl")?
            .set_default("max_concurrent_relays", 30_i64)?
            .set_default("disable_chunked", false)?
            .set_default("request_timeout", 10.0)?
            .set_default("log.level", "info")?;

        if let Some(path) = opts.value_of("config") {
            builder = builder.add_source(File::with_name(path));
        }

        builder = builder
            .set_override_option("listen_address", opts.value_of("addr"))?
            .set_override_option("target_url", opts.value_of("target-url"))?
            .set_override_option("template_path", opts.value_of("template"))?
            .set_override_option("max_concurrent_relays", opts.value_of("max-clients"))?
            .set_override_option("log.level", opts.value_of("level"))?;

        if opts.is_present("disable-chunked") {
            builder = builder.set_override("disable_chunked", true)?;
        }

        let conf = builder.build().context("can't load config")?;

        if conf.get_string("target_url").is_err() {
            bail!("must specify a target URL to post to, via --target-url or the config file");
        }

        conf.try_deserialize().context("can't load config")
    }
}
