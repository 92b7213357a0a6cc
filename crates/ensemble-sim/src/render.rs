//! Renders a recorded [`Event`] history as Mermaid `sequenceDiagram` text
//! (spec.md §6, "Rendering"). This is text generation only — participant
//! placement, styling, and any other visual layout concern is left to
//! whatever renders the Mermaid source, as spec.md keeps that out of scope.

use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;

use ensemble_types::{SpanId, TraceId};

use crate::history::Event;

struct PendingCall {
    caller: String,
    component: String,
}

struct OpenCall {
    caller: String,
    component: String,
    replica: usize,
}

fn op_participant(trace_id: TraceId) -> String {
    format!("op{trace_id}")
}

fn replica_participant(component: &str, replica: usize) -> String {
    format!("{component}{replica}")
}

/// Renders `history` as a complete Mermaid sequence diagram.
///
/// Participants are declared up front, before any message or note line, in
/// two sorted groups (spec.md §6): one participant per op `traceID`
/// ascending, then one participant per distinct `(component, replica)` pair
/// observed in a `DeliverCall`, sorted lexicographically by component name
/// and then replica index. A call that errors before a replica is ever
/// chosen (`DeliverError` while its span is still pending, never reaching
/// `DeliverCall`) is attributed to a generic per-component participant
/// instead, since no specific replica index exists to name.
pub fn render_mermaid(history: &[Event]) -> String {
    let mut trace_ids: Vec<TraceId> = Vec::new();
    let mut replica_pairs: HashSet<(String, usize)> = HashSet::new();
    let mut generic_components: HashSet<String> = HashSet::new();
    let mut scan_pending: HashMap<SpanId, String> = HashMap::new();

    for event in history {
        match event {
            Event::OpStart { trace_id, .. } => trace_ids.push(*trace_id),
            Event::Call {
                span_id, component, ..
            } => {
                scan_pending.insert(*span_id, component.clone());
            }
            Event::DeliverCall {
                span_id,
                component,
                replica,
                ..
            } => {
                scan_pending.remove(span_id);
                replica_pairs.insert((component.clone(), *replica));
            }
            Event::DeliverError { span_id, .. } => {
                if let Some(component) = scan_pending.remove(span_id) {
                    generic_components.insert(component);
                }
            }
            _ => {}
        }
    }
    trace_ids.sort_unstable();
    let mut replica_pairs: Vec<(String, usize)> = replica_pairs.into_iter().collect();
    replica_pairs.sort_unstable();
    let mut generic_components: Vec<String> = generic_components.into_iter().collect();
    generic_components.sort_unstable();

    let mut out = String::from("sequenceDiagram\n");
    for trace_id in &trace_ids {
        let _ = writeln!(out, "    participant {}", op_participant(*trace_id));
    }
    for component in &generic_components {
        let _ = writeln!(out, "    participant {component}");
    }
    for (component, replica) in &replica_pairs {
        let _ = writeln!(
            out,
            "    participant {}",
            replica_participant(component, *replica)
        );
    }

    let mut pending: HashMap<SpanId, PendingCall> = HashMap::new();
    let mut open: HashMap<SpanId, OpenCall> = HashMap::new();

    for event in history {
        match event {
            Event::OpStart {
                trace_id,
                name,
                args,
                ..
            } => {
                let participant = op_participant(*trace_id);
                let _ = writeln!(out, "    Note over {participant}: {name}{args}");
            }
            Event::OpFinish {
                trace_id, error, ..
            } => {
                let participant = op_participant(*trace_id);
                if error == "<nil>" {
                    let _ = writeln!(out, "    Note over {participant}: finished");
                } else {
                    let _ = writeln!(out, "    Note over {participant}: failed: {error}");
                }
            }
            Event::Call {
                trace_id,
                span_id,
                component,
                method,
                args,
                ..
            } => {
                let caller_participant = op_participant(*trace_id);
                let rendered_args = args.join(", ");
                // The target replica is only known once `DeliverCall` (or
                // never, if the call errors first) resolves it — the
                // message arrow names the component generically and
                // `Return` corrects it to the chosen replica.
                let _ = writeln!(
                    out,
                    "    {caller_participant}->>+{component}: {method}({rendered_args})"
                );
                pending.insert(
                    *span_id,
                    PendingCall {
                        caller: caller_participant,
                        component: component.clone(),
                    },
                );
            }
            Event::DeliverCall {
                span_id,
                component,
                replica,
                ..
            } => {
                if let Some(call) = pending.remove(span_id) {
                    open.insert(
                        *span_id,
                        OpenCall {
                            caller: call.caller,
                            component: component.clone(),
                            replica: *replica,
                        },
                    );
                }
            }
            Event::Return {
                span_id, returns, ..
            } => {
                if let Some(call) = open.get(span_id) {
                    let participant = replica_participant(&call.component, call.replica);
                    let rendered = returns.join(", ");
                    let _ = writeln!(out, "    {participant}-->>-{}: {rendered}", call.caller);
                }
            }
            Event::DeliverReturn { span_id, .. } => {
                open.remove(span_id);
            }
            Event::DeliverError { span_id, .. } => {
                if let Some(call) = open.remove(span_id) {
                    let participant = replica_participant(&call.component, call.replica);
                    let _ = writeln!(out, "    {participant}--x{}: RemoteCallError", call.caller);
                } else if let Some(call) = pending.remove(span_id) {
                    let _ = writeln!(
                        out,
                        "    {}--x{}: RemoteCallError",
                        call.component, call.caller
                    );
                }
            }
        }
    }

    out
}
