use crate::review::ItemStatus;
use tracing::trace;

// Counters are emitted as trace events; the prometheus handle renders whatever
// recorder is installed.

pub fn inc_requests(route: &'static str) {
    trace!(
        target = "hermes.metrics",
        route = route,
        "requests_total_inc"
    );
}

pub fn stage_elapsed(stage: &'static str, elapsed_ms: u128) {
    trace!(
        target = "hermes.metrics",
        stage = stage,
        elapsed_ms = elapsed_ms as u64,
        "stage_elapsed"
    );
}

pub fn item_transition(status: ItemStatus) {
    trace!(
        target = "hermes.metrics",
        status = status.as_str(),
        "item_transition_inc"
    );
}

pub fn search_request(outcome: &'static str) {
    trace!(
        target = "hermes.metrics",
        outcome = outcome,
        "search_requests_total_inc"
    );
}
