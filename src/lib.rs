//! Periodic export of metric samples to Graphite
//!
//! An endpoint URI picks the transport: `net.tcp://` and `net.udp://` speak
//! the plaintext line protocol, `net.pickled://` sends length-prefixed pickle
//! frames. A [`report::ReportBinding`] ties a sender to a sample source and
//! runs it on a [`report::ReportHost`] schedule.

pub mod bootstrap;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod graphite;
pub mod handler;
pub mod pickle;
pub mod report;
pub mod sample;
pub mod sender;
pub mod util;

/// Re-export of commonly used types for convenience
pub mod prelude {
    pub use crate::bootstrap::{BootstrapOutcome, bootstrap, with_graphite_from_config};
    pub use crate::config::{ConfigSettings, ConfigSource, SenderOptions, SettingsLookup};
    pub use crate::endpoint::{EndpointDescriptor, Scheme, Target};
    pub use crate::error::{DeliveryError, DeliveryErrorKind, ExportError, Result};
    pub use crate::graphite::GraphiteReports;
    pub use crate::handler::{ErrorHandler, LogErrorHandler};
    pub use crate::report::{BindingState, MetricsReports, ReportBinding, ReportHost};
    pub use crate::sample::{MetricSample, SampleSource, sample_channel};
    pub use crate::sender::{
        PickledBatchSender, Sender, TcpLineSender, TransportResolver, UdpLineSender,
    };
}

/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
