//! Request gates. Each gate either passes the request on, rejects it with an
//! error response, or (admin gate only) defers to the next route entry.

use tracing::debug;

use crate::error::AppError;

use super::lifecycle::SessionLifecycle;
use super::principal::Identity;
use super::provider::{CredentialEvidence, FederationEvidence};
use super::request_context::{RequestContext, RequestShape};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Gate {
    /// Authenticated user or verified federated peer.
    Authenticated,
    /// Session principal must be the administrator.
    Admin,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    Pass,
    Reject(AppError),
    /// Not an error: try the next entry registered for the same route.
    Defer,
}

impl Gate {
    pub async fn evaluate(self, lifecycle: &SessionLifecycle, ctx: &mut RequestContext) -> GateOutcome {
        match self {
            Gate::Authenticated => authentication_gate(lifecycle, ctx).await,
            Gate::Admin => admin_gate(ctx),
        }
    }
}

/// Run gates in order; the first non-`Pass` outcome ends the chain.
pub async fn run_gates(gates: &[Gate], lifecycle: &SessionLifecycle, ctx: &mut RequestContext) -> GateOutcome {
    for gate in gates {
        match gate.evaluate(lifecycle, ctx).await {
            GateOutcome::Pass => continue,
            other => {
                debug!(target: "forte::gate", request_id = %ctx.request_id, ?gate, outcome = ?other, "gate stopped chain");
                return other;
            }
        }
    }
    GateOutcome::Pass
}

async fn authentication_gate(lifecycle: &SessionLifecycle, ctx: &mut RequestContext) -> GateOutcome {
    match &ctx.shape {
        RequestShape::Federated { query } => {
            if lifecycle.is_federated(FederationEvidence { query }).await {
                let domain = query.get("domain").map(|d| d.to_ascii_lowercase()).unwrap_or_default();
                ctx.identity = Identity::Federated { domain };
                GateOutcome::Pass
            } else {
                GateOutcome::Reject(AppError::federation_failed())
            }
        }
        RequestShape::Normal { session_id, query } => {
            let evidence = CredentialEvidence { session_id: session_id.as_deref(), query };
            if lifecycle.is_authenticated(evidence).await {
                GateOutcome::Pass
            } else {
                GateOutcome::Reject(AppError::unauthenticated())
            }
        }
    }
}

fn admin_gate(ctx: &mut RequestContext) -> GateOutcome {
    match ctx.session.as_ref().and_then(|s| s.principal.as_ref()) {
        Some(p) if p.is_admin() => {
            ctx.identity = Identity::Admin(p.clone());
            GateOutcome::Pass
        }
        _ => GateOutcome::Defer,
    }
}
