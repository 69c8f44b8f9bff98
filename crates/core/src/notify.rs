//! Reporting of reconciliation outcomes.
//!
//! Optional steps never fail a login, so their failures would go unnoticed
//! without an explicit channel. Every reconciliation report is handed to an
//! [`OutcomeSink`]; the [`Notifier`] facade fans out to several sinks and
//! logs sink failures without aborting.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::db::Database;
use crate::models::{ReconcileReport, Step, StepOutcome};

/// Receives the outcome of every reconciliation.
pub trait OutcomeSink: Send + Sync {
    fn record(&self, login: &str, report: &ReconcileReport);
}

/// Logs every step outcome with `tracing`. Failed steps log at `warn`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingOutcomeSink;

impl OutcomeSink for TracingOutcomeSink {
    fn record(&self, login: &str, report: &ReconcileReport) {
        for step in [Step::Groups, Step::Identity, Step::Avatar] {
            match report.outcome(step) {
                StepOutcome::Failed(err) => {
                    warn!(login, trigger = %report.trigger, step = %step, error = %err, "reconciliation step failed")
                }
                StepOutcome::Applied => {
                    info!(login, trigger = %report.trigger, step = %step, "reconciliation step applied")
                }
                StepOutcome::Skipped(reason) => {
                    debug!(login, trigger = %report.trigger, step = %step, reason = %reason, "reconciliation step skipped")
                }
            }
        }
    }
}

/// Appends every report to the `reconcile_log` table.
pub struct AuditLogSink {
    db: Arc<Database>,
}

impl AuditLogSink {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

impl OutcomeSink for AuditLogSink {
    fn record(&self, login: &str, report: &ReconcileReport) {
        if let Err(e) = self.db.insert_reconcile_log(login, report) {
            warn!(login, error = %e, "failed to write reconcile audit log");
        }
    }
}

/// Unified sink that dispatches to all configured sinks.
#[derive(Default)]
pub struct Notifier {
    sinks: Vec<Arc<dyn OutcomeSink>>,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(mut self, sink: Arc<dyn OutcomeSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl OutcomeSink for Notifier {
    fn record(&self, login: &str, report: &ReconcileReport) {
        for sink in &self.sinks {
            sink.record(login, report);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SkipReason, Trigger};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Collecting(Mutex<Vec<String>>);

    impl OutcomeSink for Collecting {
        fn record(&self, login: &str, _report: &ReconcileReport) {
            self.0.lock().unwrap().push(login.to_string());
        }
    }

    fn report() -> ReconcileReport {
        ReconcileReport {
            trigger: Trigger::Provisioning,
            groups: StepOutcome::Applied,
            identity: StepOutcome::Applied,
            avatar: StepOutcome::Skipped(SkipReason::NoAccessToken),
            proceed: true,
        }
    }

    #[test]
    fn test_notifier_fans_out() {
        let a = Arc::new(Collecting::default());
        let b = Arc::new(Collecting::default());
        let notifier = Notifier::new()
            .with_sink(a.clone())
            .with_sink(b.clone())
            .with_sink(Arc::new(TracingOutcomeSink));
        assert_eq!(notifier.len(), 3);

        notifier.record("jane", &report());
        assert_eq!(*a.0.lock().unwrap(), vec!["jane"]);
        assert_eq!(*b.0.lock().unwrap(), vec!["jane"]);
    }

    #[test]
    fn test_audit_log_sink_writes_rows() {
        let db = Arc::new(Database::in_memory().unwrap());
        db.initialize().unwrap();
        let sink = AuditLogSink::new(db.clone());

        sink.record("jane", &report());
        let entries = db.list_reconcile_log("jane", 5).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].trigger, "provisioning");
        assert!(entries[0].success);
    }

    #[test]
    fn test_audit_log_sink_swallows_errors() {
        // Schema never initialized: the insert fails but must not panic.
        let db = Arc::new(Database::in_memory().unwrap());
        AuditLogSink::new(db).record("jane", &report());
    }
}
