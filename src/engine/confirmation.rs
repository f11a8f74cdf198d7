use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::engine::signature::SignaturePad;
use crate::error::FlowError;
use crate::models::confirmation::{DeliveryConfirmation, OrderSummary, PaymentMethod};
use crate::platform::{Camera, FacingMode, ImageReader, VideoStream};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WizardStep {
    Signature,
    Photo,
    ReceiverInfo,
}

impl WizardStep {
    pub fn number(self) -> u8 {
        match self {
            WizardStep::Signature => 1,
            WizardStep::Photo => 2,
            WizardStep::ReceiverInfo => 3,
        }
    }
}

pub struct CameraSession {
    stream: Box<dyn VideoStream>,
}

impl CameraSession {
    fn new(stream: Box<dyn VideoStream>) -> Self {
        Self { stream }
    }

    fn snapshot(&mut self) -> Result<Vec<u8>, FlowError> {
        Ok(self.stream.snapshot()?)
    }
}

impl Drop for CameraSession {
    fn drop(&mut self) {
        self.stream.stop_tracks();
    }
}

struct WizardState {
    epoch: u64,
    step: WizardStep,
    signature: Option<Vec<u8>>,
    photo: Option<Vec<u8>>,
    camera: Option<CameraSession>,
    receiver_name: String,
    receiver_document: String,
    payment_method: PaymentMethod,
    payment_amount: Decimal,
    processing: bool,
}

impl WizardState {
    fn initial(order: &OrderSummary, epoch: u64) -> Self {
        Self {
            epoch,
            step: WizardStep::Signature,
            signature: None,
            photo: None,
            camera: None,
            receiver_name: String::new(),
            receiver_document: String::new(),
            payment_method: PaymentMethod::Cash,
            payment_amount: order.total_value,
            processing: false,
        }
    }

    fn expect_step(&self, step: WizardStep) -> Result<(), FlowError> {
        if self.step == step {
            Ok(())
        } else {
            Err(FlowError::WrongStep(self.step.number()))
        }
    }

    fn go_to(&mut self, step: WizardStep) {
        // leaving the photo step always releases the camera
        self.camera = None;
        self.step = step;
        self.epoch += 1;
    }

    fn has_receiver(&self) -> bool {
        !self.receiver_name.trim().is_empty() && !self.receiver_document.trim().is_empty()
    }
}

/// Clears `processing` if `confirm` exits or is dropped before handing off.
struct ProcessingGuard<'a> {
    state: &'a Mutex<WizardState>,
    epoch: u64,
    armed: bool,
}

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = self.state.lock();
        if state.epoch == self.epoch {
            state.processing = false;
        }
    }
}

pub struct ConfirmationFlow {
    order: OrderSummary,
    camera: Arc<dyn Camera>,
    images: Arc<dyn ImageReader>,
    handoff: mpsc::Sender<DeliveryConfirmation>,
    state: Mutex<WizardState>,
}

impl ConfirmationFlow {
    pub fn new(
        order: OrderSummary,
        camera: Arc<dyn Camera>,
        images: Arc<dyn ImageReader>,
        handoff: mpsc::Sender<DeliveryConfirmation>,
    ) -> Self {
        let state = WizardState::initial(&order, 0);
        Self {
            order,
            camera,
            images,
            handoff,
            state: Mutex::new(state),
        }
    }

    pub fn order(&self) -> &OrderSummary {
        &self.order
    }

    pub fn step(&self) -> WizardStep {
        self.state.lock().step
    }

    pub fn camera_active(&self) -> bool {
        self.state.lock().camera.is_some()
    }

    pub fn has_signature(&self) -> bool {
        self.state.lock().signature.is_some()
    }

    pub fn has_photo(&self) -> bool {
        self.state.lock().photo.is_some()
    }

    pub fn submit_signature(&self, pad: &SignaturePad) -> Result<(), FlowError> {
        let mut state = self.state.lock();
        state.expect_step(WizardStep::Signature)?;
        if pad.is_empty() {
            return Err(FlowError::EmptySignature);
        }

        state.signature = Some(pad.to_svg());
        state.go_to(WizardStep::Photo);
        Ok(())
    }

    pub fn back(&self) -> Result<(), FlowError> {
        let mut state = self.state.lock();
        state.expect_step(WizardStep::Photo)?;
        state.go_to(WizardStep::Signature);
        Ok(())
    }

    pub fn skip(&self) -> Result<(), FlowError> {
        let mut state = self.state.lock();
        state.expect_step(WizardStep::Photo)?;
        state.go_to(WizardStep::ReceiverInfo);
        Ok(())
    }

    pub async fn activate_camera(&self) -> Result<(), FlowError> {
        let epoch = {
            let state = self.state.lock();
            state.expect_step(WizardStep::Photo)?;
            if state.camera.is_some() {
                return Ok(());
            }
            state.epoch
        };

        let stream = match self.camera.open(FacingMode::Environment).await {
            Ok(stream) => stream,
            Err(err) => {
                warn!(delivery_id = %self.order.delivery_id, error = %err, "camera unavailable");
                return Err(err.into());
            }
        };
        let session = CameraSession::new(stream);

        let mut state = self.state.lock();
        if state.epoch != epoch {
            drop(session);
            return Err(FlowError::Cancelled);
        }
        if state.camera.is_none() {
            state.camera = Some(session);
        }
        Ok(())
    }

    pub fn capture_photo(&self) -> Result<(), FlowError> {
        let mut state = self.state.lock();
        state.expect_step(WizardStep::Photo)?;
        let mut session = state.camera.take().ok_or(FlowError::NoActiveCamera)?;

        let photo = session.snapshot();
        drop(session);

        state.photo = Some(photo?);
        state.go_to(WizardStep::ReceiverInfo);
        Ok(())
    }

    pub async fn upload_photo(&self, path: &Path) -> Result<(), FlowError> {
        let epoch = {
            let state = self.state.lock();
            state.expect_step(WizardStep::Photo)?;
            state.epoch
        };

        let image = self.images.read_image(path).await?;

        let mut state = self.state.lock();
        if state.epoch != epoch {
            return Err(FlowError::Cancelled);
        }
        state.photo = Some(image);
        state.go_to(WizardStep::ReceiverInfo);
        Ok(())
    }

    pub fn set_receiver_name(&self, name: impl Into<String>) -> Result<(), FlowError> {
        let mut state = self.state.lock();
        state.expect_step(WizardStep::ReceiverInfo)?;
        state.receiver_name = name.into();
        Ok(())
    }

    pub fn set_receiver_document(&self, document: impl Into<String>) -> Result<(), FlowError> {
        let mut state = self.state.lock();
        state.expect_step(WizardStep::ReceiverInfo)?;
        state.receiver_document = document.into();
        Ok(())
    }

    pub fn set_payment_method(&self, method: PaymentMethod) -> Result<(), FlowError> {
        let mut state = self.state.lock();
        state.expect_step(WizardStep::ReceiverInfo)?;
        state.payment_method = method;
        Ok(())
    }

    pub fn set_payment_amount(&self, amount: Decimal) -> Result<(), FlowError> {
        if amount < Decimal::ZERO {
            return Err(FlowError::NegativeAmount);
        }
        let mut state = self.state.lock();
        state.expect_step(WizardStep::ReceiverInfo)?;
        state.payment_amount = amount;
        Ok(())
    }

    pub fn can_confirm(&self) -> bool {
        let state = self.state.lock();
        state.step == WizardStep::ReceiverInfo && state.has_receiver() && !state.processing
    }

    pub async fn confirm(&self) -> Result<DeliveryConfirmation, FlowError> {
        let (confirmation, epoch) = {
            let mut state = self.state.lock();
            state.expect_step(WizardStep::ReceiverInfo)?;
            if !state.has_receiver() {
                return Err(FlowError::MissingReceiverInfo);
            }
            if state.processing {
                return Err(FlowError::Processing);
            }
            state.processing = true;

            let (payment_method, payment_amount) = if self.order.is_paid {
                (None, None)
            } else {
                (Some(state.payment_method), Some(state.payment_amount))
            };

            let confirmation = DeliveryConfirmation {
                delivery_id: self.order.delivery_id.clone(),
                signature_image: state.signature.clone(),
                photo_image: state.photo.clone(),
                receiver_name: state.receiver_name.trim().to_string(),
                receiver_document: state.receiver_document.trim().to_string(),
                payment_method,
                payment_amount,
                confirmed_at: Utc::now(),
            };
            (confirmation, state.epoch)
        };

        let mut processing = ProcessingGuard {
            state: &self.state,
            epoch,
            armed: true,
        };

        let permit = self
            .handoff
            .reserve()
            .await
            .map_err(|_| FlowError::HandoffClosed)?;

        let mut state = self.state.lock();
        if state.epoch != epoch {
            return Err(FlowError::Cancelled);
        }
        permit.send(confirmation.clone());
        let next_epoch = state.epoch + 1;
        *state = WizardState::initial(&self.order, next_epoch);
        processing.armed = false;
        drop(state);

        info!(
            delivery_id = %confirmation.delivery_id,
            has_signature = confirmation.signature_image.is_some(),
            has_photo = confirmation.photo_image.is_some(),
            "delivery confirmation completed"
        );
        Ok(confirmation)
    }

    pub fn cancel(&self) {
        let mut state = self.state.lock();
        let next_epoch = state.epoch + 1;
        let step = state.step;
        *state = WizardState::initial(&self.order, next_epoch);
        drop(state);

        info!(delivery_id = %self.order.delivery_id, step = step.number(), "confirmation cancelled");
    }
}
