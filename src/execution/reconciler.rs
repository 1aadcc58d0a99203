use crate::api::ExchangeGateway;
use crate::execution::{InstrumentState, OrderPolicy};
use crate::models::{OrderHandle, OrderKind, Position, Side, Signal, Stance};
use crate::Result;

#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileAction {
    Skip,
    Open { target: Stance },
}

#[derive(Debug, Clone)]
pub struct ReconcileDecision {
    pub action: ReconcileAction,
    pub reason: String,
}

/// What actually happened at the gateway
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    Unchanged,
    Transitioned {
        from: Stance,
        to: Stance,
        order: OrderHandle,
    },
    /// The gateway already held the requested stance; only the cache moved
    Adopted { from: Stance, to: Stance },
    Flattened { from: Stance },
}

/// Drives the Flat/Long/Short state machine of one instrument at a time
///
/// Close-before-open: resting orders are cancelled and an opposite position
/// is closed before the new entry is submitted. The stance only moves to the
/// new direction once the entry order is accepted.
pub struct Reconciler {
    policy: OrderPolicy,
}

impl Reconciler {
    pub fn new(policy: OrderPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &OrderPolicy {
        &self.policy
    }

    /// Decide what to do with a signal, without touching the gateway
    pub fn decide(&self, signal: &Signal, state: &InstrumentState) -> ReconcileDecision {
        match signal.kind.target_stance() {
            None => ReconcileDecision {
                action: ReconcileAction::Skip,
                reason: "No signal".to_string(),
            },
            Some(target) if target == state.stance() => ReconcileDecision {
                action: ReconcileAction::Skip,
                reason: format!("Already {}", target),
            },
            Some(target) => ReconcileDecision {
                action: ReconcileAction::Open { target },
                reason: format!("{:?} signal while {}", signal.kind, state.stance()),
            },
        }
    }

    /// Apply `signal` to `state`, issuing gateway calls as needed
    ///
    /// On any gateway error the stance is left untouched and the error is
    /// returned; handles already cancelled or closed stay cleared.
    pub async fn reconcile(
        &self,
        gateway: &dyn ExchangeGateway,
        state: &mut InstrumentState,
        signal: &Signal,
        last_price: f64,
    ) -> Result<ReconcileOutcome> {
        let decision = self.decide(signal, state);
        let target = match decision.action {
            ReconcileAction::Skip => {
                tracing::debug!(instrument = %state.instrument(), "Skip: {}", decision.reason);
                return Ok(ReconcileOutcome::Unchanged);
            }
            ReconcileAction::Open { target } => target,
        };
        tracing::info!(instrument = %state.instrument(), "Reconciling: {}", decision.reason);

        let from = state.stance();
        let position = self.sync_with_gateway(gateway, state).await?;

        if let Some(ref held) = position {
            if held.stance() == target {
                tracing::warn!(
                    instrument = %state.instrument(),
                    "Gateway already holds {} ({} @ {:.4}), adopting without a new order",
                    target,
                    held.size,
                    held.entry_price
                );
                self.cancel_pending(gateway, state).await?;
                state.set_stance(target);
                return Ok(ReconcileOutcome::Adopted { from, to: target });
            }
        }

        self.cancel_pending(gateway, state).await?;
        if let Some(ref held) = position {
            self.close_position(gateway, held).await?;
        }

        let side = match Side::opening(target) {
            Some(side) => side,
            None => return Ok(ReconcileOutcome::Unchanged),
        };
        let request = self.policy.entry_request(state.instrument(), side, last_price)?;

        tracing::info!(
            instrument = %state.instrument(),
            "→ {} {:.6} {:?}{} (leverage {:?})",
            side,
            request.quantity,
            request.kind,
            request
                .price
                .map(|p| format!(" @ {:.6}", p))
                .unwrap_or_default(),
            request.leverage
        );

        let order = gateway.submit_order(&request).await?;
        let resting = (request.kind == OrderKind::Limit).then(|| order.clone());
        state.record_entry(target, resting, signal.bar_time);

        tracing::info!(
            instrument = %state.instrument(),
            "✓ {} -> {} (order {})",
            from,
            target,
            order.id
        );

        Ok(ReconcileOutcome::Transitioned {
            from,
            to: target,
            order,
        })
    }

    /// Close any position and cancel any resting order, regardless of signal
    pub async fn flatten(
        &self,
        gateway: &dyn ExchangeGateway,
        state: &mut InstrumentState,
    ) -> Result<ReconcileOutcome> {
        let from = state.stance();
        let position = gateway.fetch_position(state.instrument()).await?;

        if position.is_none() && state.pending_order().is_none() && from == Stance::Flat {
            return Ok(ReconcileOutcome::Unchanged);
        }

        self.cancel_pending(gateway, state).await?;
        if let Some(ref held) = position {
            self.close_position(gateway, held).await?;
        }
        state.set_stance(Stance::Flat);

        tracing::info!(instrument = %state.instrument(), "✓ Flattened (was {})", from);
        Ok(ReconcileOutcome::Flattened { from })
    }

    /// Treat the gateway position as ground truth and correct the cached stance
    async fn sync_with_gateway(
        &self,
        gateway: &dyn ExchangeGateway,
        state: &mut InstrumentState,
    ) -> Result<Option<Position>> {
        let position = gateway.fetch_position(state.instrument()).await?;

        let actual = match (&position, state.pending_order()) {
            (Some(held), _) => held.stance(),
            // A resting limit entry explains a missing position
            (None, Some(_)) => state.stance(),
            (None, None) => Stance::Flat,
        };

        if actual != state.stance() {
            tracing::warn!(
                instrument = %state.instrument(),
                "Stance cache {} disagrees with gateway {}, correcting",
                state.stance(),
                actual
            );
            state.set_stance(actual);
        }

        Ok(position)
    }

    async fn cancel_pending(
        &self,
        gateway: &dyn ExchangeGateway,
        state: &mut InstrumentState,
    ) -> Result<()> {
        if let Some(handle) = state.pending_order().cloned() {
            gateway.cancel_order(&handle).await?;
            state.clear_pending_order();
            tracing::info!(instrument = %state.instrument(), "  ✓ Cancelled order {}", handle.id);
        }
        Ok(())
    }

    async fn close_position(&self, gateway: &dyn ExchangeGateway, position: &Position) -> Result<()> {
        let request = self.policy.close_request(position);
        let order = gateway.submit_order(&request).await?;
        tracing::info!(
            instrument = %position.instrument,
            "  ✓ Closed {} {:.6} (order {})",
            position.stance(),
            position.size,
            order.id
        );
        Ok(())
    }
}
