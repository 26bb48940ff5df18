//! Wiring a Graphite report from application settings

use log::{debug, warn};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::config::{INTERVAL_KEY, SenderOptions, SettingsLookup, URI_KEY};
use crate::endpoint::{EndpointDescriptor, Scheme};
use crate::error::{ExportError, Result};
use crate::handler::ErrorHandler;
use crate::report::{ReportBinding, ReportHost};
use crate::sample::SampleSource;
use crate::sender::TransportResolver;

/// Logged when the settings are missing or unusable
pub const INVALID_CONFIGURATION: &str = "Invalid Metrics Configuration: Metrics.Graphite.Uri must be a valid absolute URI and Metrics.Graphite.Interval.Seconds must be an integer > 0";

/// Context passed to the error handler for unexpected failures
pub const BOOTSTRAP_FAILURE_CONTEXT: &str = "Error while configuring graphite from config";

/// What a bootstrap attempt ended in
pub enum BootstrapOutcome {
    /// A report was scheduled
    Bound(ReportBinding),
    /// Settings were missing or invalid; a warning was logged
    Skipped,
    /// Something unexpected went wrong; the error handler was told
    Failed,
}

impl BootstrapOutcome {
    pub fn into_binding(self) -> Option<ReportBinding> {
        match self {
            BootstrapOutcome::Bound(binding) => Some(binding),
            _ => None,
        }
    }
}

/// Schedule a Graphite report from settings, never failing the caller
///
/// Returns the binding when one was created.
pub fn with_graphite_from_config(
    host: &dyn ReportHost,
    settings: &dyn SettingsLookup,
    source: Arc<dyn SampleSource>,
    handler: &dyn ErrorHandler,
) -> Option<ReportBinding> {
    bootstrap(host, settings, source, handler).into_binding()
}

/// Schedule a Graphite report from settings and report how it went
pub fn bootstrap(
    host: &dyn ReportHost,
    settings: &dyn SettingsLookup,
    source: Arc<dyn SampleSource>,
    handler: &dyn ErrorHandler,
) -> BootstrapOutcome {
    let attempt = panic::catch_unwind(AssertUnwindSafe(|| try_bootstrap(host, settings, source)));

    match attempt {
        Ok(Ok(binding)) => BootstrapOutcome::Bound(binding),
        Ok(Err(ExportError::ConfigurationInvalid(reason))) => {
            warn!("{}", INVALID_CONFIGURATION);
            debug!("Graphite configuration rejected: {}", reason);
            BootstrapOutcome::Skipped
        }
        Ok(Err(e)) => {
            handler.handle(&anyhow::Error::new(e), BOOTSTRAP_FAILURE_CONTEXT);
            BootstrapOutcome::Failed
        }
        Err(payload) => {
            let err = anyhow::anyhow!("panic: {}", panic_message(payload.as_ref()));
            handler.handle(&err, BOOTSTRAP_FAILURE_CONTEXT);
            BootstrapOutcome::Failed
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn try_bootstrap(
    host: &dyn ReportHost,
    settings: &dyn SettingsLookup,
    source: Arc<dyn SampleSource>,
) -> Result<ReportBinding> {
    let endpoint = read_endpoint(settings)?;
    let resolver = TransportResolver::new(SenderOptions::from_settings(settings));

    let mut binding = ReportBinding::new(resolver.resolve(&endpoint), endpoint.interval(), source);
    binding.bind(host)?;

    debug!(
        "Metrics: Sending Graphite reports to {} every {} seconds.",
        endpoint,
        endpoint.interval().as_secs()
    );
    Ok(binding)
}

/// Read and validate the endpoint settings
///
/// Absent, empty and malformed values all come back as `ConfigurationInvalid`.
/// A well-formed URI whose scheme is not a Graphite transport is an
/// `InvalidEndpoint`.
fn read_endpoint(settings: &dyn SettingsLookup) -> Result<EndpointDescriptor> {
    let non_empty = |key: &str| settings.get(key).filter(|v| !v.trim().is_empty());

    let (Some(uri), Some(seconds)) = (non_empty(URI_KEY), non_empty(INTERVAL_KEY)) else {
        return Err(ExportError::ConfigurationInvalid(format!(
            "{} and {} are both required",
            URI_KEY, INTERVAL_KEY
        )));
    };

    let seconds = match seconds.trim().parse::<i32>() {
        Ok(s) if s > 0 => s as u64,
        _ => {
            return Err(ExportError::ConfigurationInvalid(format!(
                "{} = '{}' is not an integer > 0",
                INTERVAL_KEY, seconds
            )));
        }
    };

    let url = Url::parse(uri.trim()).map_err(|e| {
        ExportError::ConfigurationInvalid(format!("{} = '{}': {}", URI_KEY, uri, e))
    })?;
    url.scheme().parse::<Scheme>()?;

    EndpointDescriptor::parse(&uri, Duration::from_secs(seconds)).map_err(|e| {
        ExportError::ConfigurationInvalid(format!("{} = '{}': {}", URI_KEY, uri, e))
    })
}
