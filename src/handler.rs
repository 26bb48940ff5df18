use log::error;

/// Receives failures that happen outside the export loop
pub trait ErrorHandler: Send + Sync {
    /// Handle an error raised while doing `context`
    fn handle(&self, error: &anyhow::Error, context: &str);
}

/// Reports errors through the logger
#[derive(Debug, Default, Clone, Copy)]
pub struct LogErrorHandler;

impl ErrorHandler for LogErrorHandler {
    fn handle(&self, error: &anyhow::Error, context: &str) {
        error!("{}: {:#}", context, error);
    }
}

impl<F> ErrorHandler for F
where
    F: Fn(&anyhow::Error, &str) + Send + Sync,
{
    fn handle(&self, error: &anyhow::Error, context: &str) {
        (self)(error, context)
    }
}
