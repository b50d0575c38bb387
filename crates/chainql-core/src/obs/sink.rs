//! Metrics sink boundary.
//!
//! Core logic MUST NOT depend on obs::metrics directly.
//! All instrumentation flows through MetricsEvent and MetricsSink.
//!
//! This module is the only allowed bridge between execution logic
//! and the thread-local metrics state.
use crate::obs::metrics;
use std::{cell::RefCell, rc::Rc};

thread_local! {
    static SINK_OVERRIDE: RefCell<Option<Rc<dyn MetricsSink>>> = const { RefCell::new(None) };
}

///
/// MetricsEvent
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MetricsEvent<'a> {
    AtCompiled {
        aliases: u64,
        joins: u64,
    },
    AtExecStart {
        entity: &'a str,
    },
    AtExecFinish {
        entity: &'a str,
        rows: u64,
    },
    LimitShortCircuit {
        entity: &'a str,
    },
    SqlStatement {
        params: u64,
    },
    CardinalityViolation {
        entity: &'a str,
        count: u64,
    },
}

///
/// MetricsSink
///

pub trait MetricsSink {
    fn record(&self, event: MetricsEvent<'_>);
}

/// GlobalMetricsSink
/// Default sink that writes into the thread-local metrics state.
/// Acts as the concrete sink when no scoped override is installed.

pub(crate) struct GlobalMetricsSink;

impl MetricsSink for GlobalMetricsSink {
    fn record(&self, event: MetricsEvent<'_>) {
        match event {
            MetricsEvent::AtCompiled { aliases, joins } => {
                metrics::with_state_mut(|m| {
                    m.ops.compiles = m.ops.compiles.saturating_add(1);
                    m.ops.aliases_allocated = m.ops.aliases_allocated.saturating_add(aliases);
                    m.ops.joins_allocated = m.ops.joins_allocated.saturating_add(joins);
                });
            }

            MetricsEvent::AtExecStart { entity } => {
                metrics::with_state_mut(|m| {
                    m.ops.at_calls = m.ops.at_calls.saturating_add(1);
                    let entry = m.entities.entry(entity.to_string()).or_default();
                    entry.at_calls = entry.at_calls.saturating_add(1);
                });
            }

            MetricsEvent::AtExecFinish { entity, rows } => {
                metrics::with_state_mut(|m| {
                    m.ops.rows_loaded = m.ops.rows_loaded.saturating_add(rows);
                    let entry = m.entities.entry(entity.to_string()).or_default();
                    entry.rows_loaded = entry.rows_loaded.saturating_add(rows);
                });
            }

            MetricsEvent::LimitShortCircuit { .. } => {
                metrics::with_state_mut(|m| {
                    m.ops.limit_short_circuits = m.ops.limit_short_circuits.saturating_add(1);
                });
            }

            MetricsEvent::SqlStatement { params } => {
                metrics::with_state_mut(|m| {
                    m.ops.statements = m.ops.statements.saturating_add(1);
                    m.ops.params_bound = m.ops.params_bound.saturating_add(params);
                });
            }

            MetricsEvent::CardinalityViolation { entity, .. } => {
                metrics::with_state_mut(|m| {
                    m.ops.cardinality_violations = m.ops.cardinality_violations.saturating_add(1);
                    let entry = m.entities.entry(entity.to_string()).or_default();
                    entry.cardinality_violations = entry.cardinality_violations.saturating_add(1);
                });
            }
        }
    }
}

pub(crate) const GLOBAL_METRICS_SINK: GlobalMetricsSink = GlobalMetricsSink;

pub(crate) fn record(event: MetricsEvent<'_>) {
    let sink = SINK_OVERRIDE.with(|cell| cell.borrow().clone());
    match sink {
        Some(sink) => sink.record(event),
        None => GLOBAL_METRICS_SINK.record(event),
    }
}

/// Snapshot the current metrics state.
#[must_use]
pub fn metrics_report() -> metrics::EventReport {
    metrics::report()
}

/// Reset all metrics state.
pub fn metrics_reset_all() {
    metrics::reset_all();
}

/// Run a closure with a temporary metrics sink override.
///
/// The previous sink is restored on every exit, including unwinding.
pub fn with_metrics_sink<T>(sink: Rc<dyn MetricsSink>, f: impl FnOnce() -> T) -> T {
    struct Guard(Option<Rc<dyn MetricsSink>>);

    impl Drop for Guard {
        fn drop(&mut self) {
            let prev = self.0.take();
            SINK_OVERRIDE.with(|cell| {
                *cell.borrow_mut() = prev;
            });
        }
    }

    let prev = SINK_OVERRIDE.with(|cell| cell.borrow_mut().replace(sink));
    let _guard = Guard(prev);

    f()
}

/// Span
/// RAII guard that emits start/finish events for one at-expression call.
/// Ensures finish accounting happens even on early return.

pub(crate) struct Span<'a> {
    entity: &'a str,
    rows: u64,
    finished: bool,
}

impl<'a> Span<'a> {
    #[must_use]
    pub(crate) fn new(entity: &'a str) -> Self {
        record(MetricsEvent::AtExecStart { entity });

        Self {
            entity,
            rows: 0,
            finished: false,
        }
    }

    pub(crate) const fn set_rows(&mut self, rows: u64) {
        self.rows = rows;
    }
}

impl Drop for Span<'_> {
    fn drop(&mut self) {
        if !self.finished {
            record(MetricsEvent::AtExecFinish {
                entity: self.entity,
                rows: self.rows,
            });
            self.finished = true;
        }
    }
}
