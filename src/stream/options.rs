//! Stream configuration.

use reqwest::Url;

/// Which concrete transport carries the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMode {
    /// Paired HTTP GET read/write request cycles.
    #[cfg(feature = "polling")]
    #[cfg_attr(docsrs, doc(cfg(feature = "polling")))]
    Polling,

    /// Single persistent WebSocket with inline ack framing.
    #[cfg(feature = "socket")]
    #[cfg_attr(docsrs, doc(cfg(feature = "socket")))]
    WebSocket,
}

impl Default for TransportMode {
    fn default() -> Self {
        #[cfg(feature = "socket")]
        {
            Self::WebSocket
        }
        #[cfg(all(feature = "polling", not(feature = "socket")))]
        {
            Self::Polling
        }
    }
}

/// Configuration for opening a relay stream.
#[derive(Debug, Clone)]
pub struct RelayOptions {
    /// Base URL of the relay service (HTTP or HTTPS).
    pub relay_server: Url,

    /// Destination host the relay should connect to.
    pub host: String,

    /// Destination port the relay should connect to.
    pub port: u16,

    /// Transport carrying the stream.
    pub mode: TransportMode,

    /// Whether a dropped socket connection may be resumed through the
    /// backoff/reconnect path. When false, a socket close ends the stream.
    pub resume: bool,

    /// Whether the socket transport reports its rolling average ack
    /// round-trip time to the relay.
    pub report_ack_latency: bool,
}

impl RelayOptions {
    /// Create options for the given relay and destination with defaults.
    pub fn new(relay_server: Url, host: impl Into<String>, port: u16) -> Self {
        Self {
            relay_server: with_trailing_slash(relay_server),
            host: host.into(),
            port,
            mode: TransportMode::default(),
            resume: true,
            report_ack_latency: false,
        }
    }

    /// Start building options for the given relay and destination.
    pub fn builder(relay_server: Url, host: impl Into<String>, port: u16) -> RelayOptionsBuilder {
        RelayOptionsBuilder {
            options: Self::new(relay_server, host, port),
        }
    }
}

/// Builder for [`RelayOptions`].
#[derive(Debug)]
pub struct RelayOptionsBuilder {
    options: RelayOptions,
}

impl RelayOptionsBuilder {
    /// Set the transport mode.
    pub fn mode(mut self, mode: TransportMode) -> Self {
        self.options.mode = mode;
        self
    }

    /// Enable or disable socket resumption.
    pub fn resume(mut self, resume: bool) -> Self {
        self.options.resume = resume;
        self
    }

    /// Enable or disable ack latency reporting.
    pub fn report_ack_latency(mut self, report: bool) -> Self {
        self.options.report_ack_latency = report;
        self
    }

    /// Build the options.
    pub fn build(self) -> RelayOptions {
        self.options
    }
}

/// Relative endpoint joins require the base path to end with a slash.
fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}
