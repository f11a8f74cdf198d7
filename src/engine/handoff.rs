use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::models::confirmation::DeliveryConfirmation;
use crate::state::AppState;

pub async fn run_confirmation_handoff(
    state: Arc<AppState>,
    mut confirmation_rx: mpsc::Receiver<DeliveryConfirmation>,
) {
    info!("confirmation handoff started");

    while let Some(confirmation) = confirmation_rx.recv().await {
        accept_confirmation(&state, confirmation);
    }

    warn!("confirmation handoff stopped: channel closed");
}

pub fn accept_confirmation(state: &AppState, confirmation: DeliveryConfirmation) {
    let tracked = state.tracker.delivery_id();
    if tracked.as_deref() == Some(confirmation.delivery_id.as_str()) {
        state.tracker.stop();
    } else {
        warn!(
            delivery_id = %confirmation.delivery_id,
            tracked = tracked.as_deref().unwrap_or("-"),
            "confirmation for a delivery that is not being tracked"
        );
    }

    state.metrics.confirmations_total.inc();
    info!(
        delivery_id = %confirmation.delivery_id,
        receiver = %confirmation.receiver_name,
        "delivery confirmed"
    );
    state
        .confirmations
        .insert(confirmation.delivery_id.clone(), confirmation);
}
