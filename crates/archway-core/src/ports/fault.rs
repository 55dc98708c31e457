//! Fault report port (driven/secondary port)
//!
//! Batch-scoped failures are logged where they happen; in addition they are
//! forwarded to a `FaultReporter` so deployments can wire an external
//! error-tracking service without the core knowing about it. The default
//! implementation only logs.

use tracing::error;

/// Sink for unexpected and batch-aborting errors.
pub trait FaultReporter: Send + Sync {
    /// Reports one error together with the component context it arose in.
    fn report(&self, context: &str, error: &(dyn std::error::Error + 'static));
}

/// Default reporter: emits the error through `tracing` and nothing else.
pub struct LogFaultReporter;

impl FaultReporter for LogFaultReporter {
    fn report(&self, context: &str, error: &(dyn std::error::Error + 'static)) {
        error!(context, error = %error, "fault reported");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Reporter that records everything it sees, for assertions in tests.
    pub(crate) struct RecordingReporter {
        pub(crate) seen: Mutex<Vec<(String, String)>>,
    }

    impl FaultReporter for RecordingReporter {
        fn report(&self, context: &str, error: &(dyn std::error::Error + 'static)) {
            self.seen
                .lock()
                .unwrap()
                .push((context.to_string(), error.to_string()));
        }
    }

    #[test]
    fn test_recording_reporter_captures_context_and_message() {
        let reporter = RecordingReporter {
            seen: Mutex::new(Vec::new()),
        };
        let err = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        reporter.report("sync", &err);

        let seen = reporter.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, "sync");
        assert_eq!(seen[0].1, "boom");
    }
}
