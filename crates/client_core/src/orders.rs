//! Order lifecycle from the fulfilling provider's seat.
//!
//! The controller wraps one order and exposes exactly the transitions the
//! server would accept. The cached payload only changes when a server
//! response says so; nothing advances optimistically. Cancellation is kept
//! behind a two-step request/confirm flow because it is irreversible.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use shared::{
    domain::{OrderStatus, UserId},
    protocol::OrderPayload,
};
use thiserror::Error;
use tokio::sync::watch;
use tracing::info;

use crate::{ClientEvent, MarketClient};

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("a transition request is already in flight")]
    Busy,
    #[error("transition {current:?} -> {target:?} is not offered")]
    NotOffered {
        current: OrderStatus,
        target: OrderStatus,
    },
    #[error("cancellation requires an explicit confirmation")]
    CancellationNeedsConfirmation,
    #[error(transparent)]
    Request(#[from] anyhow::Error),
}

type StatusObserver = Box<dyn Fn(&OrderPayload) + Send + Sync>;

pub struct OrderStatusController {
    client: Arc<MarketClient>,
    viewer: UserId,
    order: watch::Sender<OrderPayload>,
    busy: AtomicBool,
    observer: Option<StatusObserver>,
}

impl OrderStatusController {
    pub(crate) fn new(client: Arc<MarketClient>, viewer: UserId, order: OrderPayload) -> Self {
        let (order, _) = watch::channel(order);
        Self {
            client,
            viewer,
            order,
            busy: AtomicBool::new(false),
            observer: None,
        }
    }

    /// Registers a callback invoked after every server-confirmed change.
    pub fn on_status_changed(
        mut self,
        observer: impl Fn(&OrderPayload) + Send + Sync + 'static,
    ) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    /// Latest server-confirmed payload.
    pub fn order(&self) -> OrderPayload {
        self.order.borrow().clone()
    }

    /// Transitions the viewer may request right now. Empty unless the
    /// viewer is the fulfilling provider, and always empty once the order
    /// reaches a terminal status.
    pub fn offered_transitions(&self) -> &'static [OrderStatus] {
        let order = self.order.borrow();
        if self.viewer != order.provider_id {
            return &[];
        }
        order.status.allowed_targets()
    }

    /// Requests one forward transition and returns the French confirmation
    /// line for the new status. Cancellation is refused here; it only
    /// happens through [`request_cancellation`](Self::request_cancellation).
    pub async fn advance(&self, target: OrderStatus) -> Result<String, ControllerError> {
        if target == OrderStatus::Cancelled {
            return Err(ControllerError::CancellationNeedsConfirmation);
        }
        self.push_transition(target).await
    }

    /// First half of the cancellation flow. Nothing is sent until the
    /// returned request is confirmed; dropping it abandons the attempt.
    pub fn request_cancellation(&self) -> CancellationRequest<'_> {
        CancellationRequest { controller: self }
    }

    async fn push_transition(&self, target: OrderStatus) -> Result<String, ControllerError> {
        if !self.offered_transitions().contains(&target) {
            return Err(ControllerError::NotOffered {
                current: self.order.borrow().status,
                target,
            });
        }
        if self
            .busy
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Acquire)
            .is_err()
        {
            return Err(ControllerError::Busy);
        }
        let order_id = self.order.borrow().order_id;
        let outcome = self.client.advance_order(order_id, target).await;
        self.busy.store(false, Ordering::Release);

        let updated = outcome?;
        info!(order_id = updated.order_id.0, status = ?updated.status, "order status advanced");
        let line = format!(
            "Commande n°{} : {}",
            updated.order_id.0,
            updated.status.label_fr()
        );
        self.order.send_replace(updated.clone());
        if let Some(observer) = &self.observer {
            observer(&updated);
        }
        self.client.emit(ClientEvent::OrderUpdated { order: updated });
        Ok(line)
    }
}

/// Pending cancellation. Confirming performs the transition under the
/// controller's busy flag; dropping the value abandons it with no remote
/// effect.
pub struct CancellationRequest<'a> {
    controller: &'a OrderStatusController,
}

impl CancellationRequest<'_> {
    pub async fn confirm(self) -> Result<String, ControllerError> {
        self.controller.push_transition(OrderStatus::Cancelled).await
    }
}

#[cfg(test)]
#[path = "tests/orders_tests.rs"]
mod tests;
