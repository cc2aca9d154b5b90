//! Job variants.

mod event_trigger;
mod exploration;
mod taint_trace;

pub use event_trigger::EventTrigger;
pub use exploration::{DomExploration, PageAnalysis, ResourceExploration};
pub use taint_trace::TaintTrace;

use std::collections::HashSet;

use serde_json::Value;

use specter_core_types::{Page, Resource, ScanError};

use crate::job::JobContext;

/// What an exploration run emits.
pub(crate) enum Capture {
    /// Every newly observed page state.
    EveryNewPage,
    /// Only states where the taint tracer reported a sink observation.
    SinkObservations,
}

/// Load `resource`, then exhaustively fire every discoverable event.
///
/// Page states are deduplicated by DOM digest; a state that renders the same
/// as one already seen is not re-explored. After every DOM change the
/// original resource is reloaded so each event fires from the initial state.
pub(crate) async fn explore(
    ctx: &mut JobContext<'_>,
    resource: &Resource,
    capture: Capture,
) -> Result<(), ScanError> {
    ctx.worker().load(resource).await?;
    let initial = ctx.worker().current_page().await?;

    let mut seen = HashSet::new();
    seen.insert(initial.digest());
    capture_state(ctx, initial, &capture).await?;

    let events = ctx.worker().explorable().await?;
    for (element, event) in events {
        let changed = ctx
            .worker()
            .trigger_event(&element, &event, &Value::Null)
            .await?;
        if let Some(page) = changed {
            if seen.insert(page.digest()) {
                capture_state(ctx, page, &capture).await?;
            }
            ctx.worker().load(resource).await?;
            if matches!(capture, Capture::SinkObservations) {
                // The reload re-runs the page's scripts; drop observations
                // belonging to an already captured state.
                ctx.worker().flush_data_flow_sinks().await?;
                ctx.worker().flush_execution_flow_sinks().await?;
            }
        }
    }
    Ok(())
}

async fn capture_state(
    ctx: &mut JobContext<'_>,
    page: Page,
    capture: &Capture,
) -> Result<(), ScanError> {
    match capture {
        Capture::EveryNewPage => {
            ctx.emit_page(page);
        }
        Capture::SinkObservations => {
            let data_flow = ctx.worker().flush_data_flow_sinks().await?;
            let execution_flow = ctx.worker().flush_execution_flow_sinks().await?;
            if !data_flow.is_empty() || !execution_flow.is_empty() {
                ctx.emit(page, data_flow, execution_flow);
            }
        }
    }
    Ok(())
}
