use std::fmt;
use std::sync::Arc;

/// A destination for human-readable log lines
pub type Sink = Arc<dyn Fn(&str) + Send + Sync>;

/// Log and error destinations for a repository handle
///
/// Without custom sinks, messages go to `tracing` (`info` for log lines,
/// `error` for errors). `silent` suppresses both.
#[derive(Clone, Default)]
pub struct LogSinks {
    log: Option<Sink>,
    error: Option<Sink>,
    silent: bool,
}

impl LogSinks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sinks that discard everything
    pub fn silent() -> Self {
        Self {
            silent: true,
            ..Self::default()
        }
    }

    pub fn with_log<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.log = Some(Arc::new(f));
        self
    }

    pub fn with_error<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.error = Some(Arc::new(f));
        self
    }

    pub fn set_silent(&mut self, silent: bool) {
        self.silent = silent;
    }

    pub fn is_silent(&self) -> bool {
        self.silent
    }

    pub fn log(&self, message: &str) {
        if self.silent {
            return;
        }
        match &self.log {
            Some(sink) => sink(message),
            None => tracing::info!("{}", message),
        }
    }

    pub fn error(&self, message: &str) {
        if self.silent {
            return;
        }
        match &self.error {
            Some(sink) => sink(message),
            None => tracing::error!("{}", message),
        }
    }
}

impl fmt::Debug for LogSinks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogSinks")
            .field("custom_log", &self.log.is_some())
            .field("custom_error", &self.error.is_some())
            .field("silent", &self.silent)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) + Send + Sync + 'static) {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink_lines = Arc::clone(&lines);
        (lines, move |msg: &str| sink_lines.lock().unwrap().push(msg.to_string()))
    }

    #[test]
    fn test_custom_sinks_receive_messages() {
        let (logs, log_fn) = recorder();
        let (errors, error_fn) = recorder();
        let sinks = LogSinks::new().with_log(log_fn).with_error(error_fn);

        sinks.log("hello");
        sinks.error("boom");

        assert_eq!(*logs.lock().unwrap(), vec!["hello"]);
        assert_eq!(*errors.lock().unwrap(), vec!["boom"]);
    }

    #[test]
    fn test_silent_suppresses_custom_sinks() {
        let (logs, log_fn) = recorder();
        let mut sinks = LogSinks::new().with_log(log_fn);
        sinks.set_silent(true);

        sinks.log("hidden");
        sinks.error("hidden too");

        assert!(sinks.is_silent());
        assert!(logs.lock().unwrap().is_empty());
    }

    #[test]
    fn test_debug_does_not_expose_closures() {
        let sinks = LogSinks::silent();
        assert_eq!(
            format!("{:?}", sinks),
            "LogSinks { custom_log: false, custom_error: false, silent: true }"
        );
    }
}
