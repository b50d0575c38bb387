use serde::{Deserialize, Serialize};
use std::{cell::RefCell, cmp::Ordering, collections::BTreeMap};

///
/// EventState
/// Ephemeral, in-memory counters for compilations and executions.
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct EventState {
    pub ops: EventOps,
    pub entities: BTreeMap<String, EntityCounters>,
}

///
/// EventOps
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct EventOps {
    // Compilation
    pub compiles: u64,
    pub aliases_allocated: u64,
    pub joins_allocated: u64,

    // Executor entrypoints
    pub at_calls: u64,
    pub limit_short_circuits: u64,

    // Statements
    pub statements: u64,
    pub params_bound: u64,

    // Results
    pub rows_loaded: u64,
    pub cardinality_violations: u64,
}

///
/// EntityCounters
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct EntityCounters {
    pub at_calls: u64,
    pub rows_loaded: u64,
    pub cardinality_violations: u64,
}

thread_local! {
    static EVENT_STATE: RefCell<EventState> = RefCell::new(EventState::default());
}

/// Borrow metrics immutably.
pub(crate) fn with_state<R>(f: impl FnOnce(&EventState) -> R) -> R {
    EVENT_STATE.with(|m| f(&m.borrow()))
}

/// Borrow metrics mutably.
pub(crate) fn with_state_mut<R>(f: impl FnOnce(&mut EventState) -> R) -> R {
    EVENT_STATE.with(|m| f(&mut m.borrow_mut()))
}

/// Reset all counters.
pub fn reset_all() {
    with_state_mut(|m| *m = EventState::default());
}

///
/// EventReport
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct EventReport {
    pub counters: Option<EventState>,
    /// Per-entity counters and averages.
    pub entity_counters: Vec<EntitySummary>,
}

///
/// EntitySummary
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct EntitySummary {
    pub entity: String,
    pub at_calls: u64,
    pub rows_loaded: u64,
    pub avg_rows_per_call: f64,
    pub cardinality_violations: u64,
}

/// Build a metrics report from the in-memory counters.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn report() -> EventReport {
    let snap = with_state(Clone::clone);

    let mut entity_counters: Vec<EntitySummary> = snap
        .entities
        .iter()
        .map(|(entity, ops)| EntitySummary {
            entity: entity.clone(),
            at_calls: ops.at_calls,
            rows_loaded: ops.rows_loaded,
            avg_rows_per_call: if ops.at_calls > 0 {
                ops.rows_loaded as f64 / ops.at_calls as f64
            } else {
                0.0
            },
            cardinality_violations: ops.cardinality_violations,
        })
        .collect();

    entity_counters.sort_by(|a, b| {
        match b
            .avg_rows_per_call
            .partial_cmp(&a.avg_rows_per_call)
            .unwrap_or(Ordering::Equal)
        {
            Ordering::Equal => match b.rows_loaded.cmp(&a.rows_loaded) {
                Ordering::Equal => a.entity.cmp(&b.entity),
                other => other,
            },
            other => other,
        }
    });

    EventReport {
        counters: Some(snap),
        entity_counters,
    }
}

///
/// TESTS
///

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn reset_all_clears_state() {
        with_state_mut(|m| {
            m.ops.at_calls = 3;
            m.ops.params_bound = 2;
            m.entities.insert(
                "user".to_string(),
                EntityCounters {
                    at_calls: 1,
                    ..Default::default()
                },
            );
        });

        reset_all();

        with_state(|m| {
            assert_eq!(m.ops.at_calls, 0);
            assert_eq!(m.ops.params_bound, 0);
            assert!(m.entities.is_empty());
        });
    }

    #[test]
    fn report_sorts_entities_by_average_rows() {
        reset_all();
        with_state_mut(|m| {
            for (name, calls, rows) in [("company", 2, 6), ("user", 1, 5), ("zone", 2, 6)] {
                m.entities.insert(
                    name.to_string(),
                    EntityCounters {
                        at_calls: calls,
                        rows_loaded: rows,
                        ..Default::default()
                    },
                );
            }
        });

        let report = report();
        let names: Vec<_> = report
            .entity_counters
            .iter()
            .map(|e| e.entity.as_str())
            .collect();

        assert_eq!(names, ["user", "company", "zone"]);
        assert_eq!(report.entity_counters[0].avg_rows_per_call, 5.0);
        assert_eq!(report.entity_counters[1].avg_rows_per_call, 3.0);
    }
}
