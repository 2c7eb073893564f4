//! The upload and classification state machine.
//!
//! Every change to [`InteractionState`] goes through [`Controller::handle`]. Submitting
//! does not perform I/O itself: it returns an [`Effect::Dispatch`] and the caller feeds the
//! network outcome back as [`Event::Settled`]. Each submission carries the generation it
//! was issued in, and a reset or a new selection moves the generation forward, so late
//! replies for an image that is no longer on screen are dropped.

use crate::{
    api::{interpret_reply, ClassificationResult, HttpReply},
    error::{ClassifyError, TransportError},
    guard::{admit, CandidateImage, Origin},
    interpreter::{interpret, DisplayRecord},
    preview::{MemoryPreviews, PreviewHandle, PreviewStore},
    transport::Transport,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Ready,
    Pending,
    Succeeded,
    Failed,
}

/// A settled classification together with its display form.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub result: ClassificationResult,
    pub display: DisplayRecord,
}

#[derive(Debug, Default)]
pub struct InteractionState {
    selected: Option<CandidateImage>,
    preview: Option<PreviewHandle>,
    pending: bool,
    result: Option<Classification>,
    error: Option<ClassifyError>,
}

impl InteractionState {
    pub fn selected(&self) -> Option<&CandidateImage> {
        self.selected.as_ref()
    }

    pub fn preview(&self) -> Option<&PreviewHandle> {
        self.preview.as_ref()
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    pub fn result(&self) -> Option<&Classification> {
        self.result.as_ref()
    }

    pub fn error(&self) -> Option<&ClassifyError> {
        self.error.as_ref()
    }

    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(|e| e.to_string())
    }

    pub fn phase(&self) -> Phase {
        if self.pending {
            Phase::Pending
        } else if self.result.is_some() {
            Phase::Succeeded
        } else if self.selected.is_none() {
            Phase::Idle
        } else if matches!(&self.error, Some(e) if !matches!(e, ClassifyError::ValidationRejected(_)))
        {
            Phase::Failed
        } else {
            Phase::Ready
        }
    }
}

/// Identifies the submission a network outcome belongs to.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Ticket {
    generation: u64,
}

#[derive(Debug, Clone)]
pub struct Submission {
    pub ticket: Ticket,
    pub image: CandidateImage,
}

#[derive(Debug)]
pub enum Event {
    Select {
        image: CandidateImage,
        origin: Origin,
    },
    Submit,
    Reset,
    Settled {
        ticket: Ticket,
        outcome: Result<HttpReply, TransportError>,
    },
}

#[derive(Debug)]
pub enum Effect {
    /// Send the image to the classification endpoint and report back with `Settled`.
    Dispatch(Submission),
}

pub struct Controller {
    state: InteractionState,
    generation: u64,
    previews: Arc<dyn PreviewStore>,
}

impl Default for Controller {
    fn default() -> Self {
        Self::new(Arc::new(MemoryPreviews::default()))
    }
}

impl Controller {
    pub fn new(previews: Arc<dyn PreviewStore>) -> Self {
        Self {
            state: InteractionState::default(),
            generation: 0,
            previews,
        }
    }

    pub fn state(&self) -> &InteractionState {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        self.state.phase()
    }

    pub fn handle(&mut self, event: Event) -> Option<Effect> {
        match event {
            Event::Select { image, origin } => {
                self.select(image, origin);
                None
            }
            Event::Submit => self.begin_submit().map(Effect::Dispatch),
            Event::Reset => {
                self.reset();
                None
            }
            Event::Settled { ticket, outcome } => {
                self.settle(ticket, outcome);
                None
            }
        }
    }

    fn select(&mut self, image: CandidateImage, origin: Origin) {
        if let Err(rejection) = admit(&image, origin) {
            info!("Rejected {} ({:?}): {}", image.name, origin, rejection);
            self.state.error = Some(rejection.into());
            return;
        }

        debug!(
            "Selected {} ({}, {} bytes) via {:?}",
            image.name, image.media_type, image.size, origin
        );
        self.generation += 1;
        // Release the old preview before acquiring the new one.
        self.state.preview = None;
        self.state.preview = Some(PreviewHandle::acquire(self.previews.clone(), &image));
        self.state.selected = Some(image);
        self.state.pending = false;
        self.state.result = None;
        self.state.error = None;
    }

    fn begin_submit(&mut self) -> Option<Submission> {
        if self.state.pending {
            debug!("Submission already in flight, ignoring submit");
            return None;
        }
        let image = self.state.selected.clone()?;

        self.state.pending = true;
        self.state.result = None;
        self.state.error = None;

        info!("Submitting {}", image.name);
        Some(Submission {
            ticket: Ticket {
                generation: self.generation,
            },
            image,
        })
    }

    fn settle(&mut self, ticket: Ticket, outcome: Result<HttpReply, TransportError>) {
        if ticket.generation != self.generation || !self.state.pending {
            warn!(
                "Discarding stale response for generation {}, current generation is {}",
                ticket.generation, self.generation
            );
            return;
        }

        self.state.pending = false;
        match classify_outcome(outcome) {
            Ok(classification) => {
                info!(
                    "Classified as {} with confidence {}",
                    classification.display.label, classification.display.confidence_text
                );
                self.state.result = Some(classification);
                self.state.error = None;
            }
            Err(e) => {
                info!("Classification failed ({}): {}", e.kind(), e);
                self.state.error = Some(e);
            }
        }
    }

    pub fn reset(&mut self) {
        debug!("Reset");
        self.generation += 1;
        self.state = InteractionState::default();
    }

    /// Runs one submission to completion on the given transport.
    pub async fn submit<T: Transport>(&mut self, transport: &T) {
        if let Some(Effect::Dispatch(submission)) = self.handle(Event::Submit) {
            let outcome = transport.classify(&submission.image).await;
            self.handle(Event::Settled {
                ticket: submission.ticket,
                outcome,
            });
        }
    }
}

fn classify_outcome(
    outcome: Result<HttpReply, TransportError>,
) -> Result<Classification, ClassifyError> {
    let reply = outcome?;
    let result = interpret_reply(&reply)?;
    let display = interpret(&result)?;
    Ok(Classification { result, display })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::GENERIC_DISPLAY_FAILURE,
        guard::{Rejection, MAX_IMAGE_BYTES},
    };
    use axum::body::Bytes;

    const NO_DR: &str = r#"{"success":true,"predicted_class":0,"confidence":0.97,
        "probabilities":[0.97,0.01,0.01,0.005,0.005],"uncertainty":0.0123,
        "uncertainty_level":"Low","reliable_prediction":true}"#;
    const SEVERE: &str = r#"{"success":true,"predicted_class":3,"confidence":0.72,
        "probabilities":[0.02,0.06,0.12,0.72,0.08]}"#;

    fn png(name: &str) -> CandidateImage {
        CandidateImage::new(name.to_string(), Bytes::from_static(b"\x89PNG"), "image/png")
    }

    fn ok(body: &'static str) -> Result<HttpReply, TransportError> {
        Ok(HttpReply {
            status: 200,
            body: Bytes::from_static(body.as_bytes()),
        })
    }

    fn unreachable() -> Result<HttpReply, TransportError> {
        Err(TransportError {
            endpoint: "http://localhost:5500".into(),
            reason: "connection refused".into(),
            status: None,
        })
    }

    fn setup() -> (Controller, Arc<MemoryPreviews>) {
        let previews = Arc::new(MemoryPreviews::default());
        (Controller::new(previews.clone()), previews)
    }

    fn select(controller: &mut Controller, name: &str) {
        controller.handle(Event::Select {
            image: png(name),
            origin: Origin::Picker,
        });
    }

    fn submit(controller: &mut Controller) -> Submission {
        match controller.handle(Event::Submit) {
            Some(Effect::Dispatch(submission)) => submission,
            None => panic!("expected a dispatch"),
        }
    }

    fn settle(controller: &mut Controller, submission: &Submission, outcome: Result<HttpReply, TransportError>) {
        controller.handle(Event::Settled {
            ticket: submission.ticket,
            outcome,
        });
    }

    #[test]
    fn starts_idle() {
        let (controller, previews) = setup();
        assert_eq!(controller.phase(), Phase::Idle);
        assert_eq!(previews.live(), 0);
    }

    #[test]
    fn submit_without_image_is_a_noop() {
        let (mut controller, _) = setup();
        assert!(controller.handle(Event::Submit).is_none());
        assert_eq!(controller.phase(), Phase::Idle);
        assert!(!controller.state().is_pending());
        assert!(controller.state().error().is_none());
    }

    #[test]
    fn oversized_selection_keeps_current_image() {
        let (mut controller, previews) = setup();
        select(&mut controller, "first.png");
        let mut big = png("big.png");
        big.size = MAX_IMAGE_BYTES + 1;
        controller.handle(Event::Select {
            image: big,
            origin: Origin::Picker,
        });

        assert_eq!(controller.state().selected().unwrap().name, "first.png");
        assert!(matches!(
            controller.state().error(),
            Some(ClassifyError::ValidationRejected(Rejection::TooLarge { .. }))
        ));
        assert_eq!(previews.live(), 1);
    }

    #[test]
    fn picker_and_drop_validate_differently() {
        let (mut controller, _) = setup();
        let tiff = CandidateImage::new("eye.tiff", Bytes::from_static(b"II*"), "image/tiff");

        controller.handle(Event::Select {
            image: tiff.clone(),
            origin: Origin::Picker,
        });
        assert!(controller.state().selected().is_none());
        assert_eq!(
            controller.state().error_message().unwrap(),
            "Unsupported file format. Use PNG, JPG, or BMP."
        );

        controller.handle(Event::Select {
            image: tiff,
            origin: Origin::Drop,
        });
        assert_eq!(controller.state().selected().unwrap().name, "eye.tiff");
        assert!(controller.state().error().is_none());
    }

    #[test]
    fn successful_classification() {
        let (mut controller, _) = setup();
        select(&mut controller, "eye.png");
        assert_eq!(controller.phase(), Phase::Ready);

        let submission = submit(&mut controller);
        assert_eq!(controller.phase(), Phase::Pending);
        assert_eq!(submission.image.name, "eye.png");

        settle(&mut controller, &submission, ok(NO_DR));
        assert_eq!(controller.phase(), Phase::Succeeded);
        let classification = controller.state().result().unwrap();
        assert_eq!(classification.display.label, "No DR");
        assert_eq!(classification.display.confidence_text, "97.0%");
        assert!(controller.state().error().is_none());
    }

    #[test]
    fn submit_while_pending_is_ignored() {
        let (mut controller, _) = setup();
        select(&mut controller, "eye.png");
        submit(&mut controller);
        assert!(controller.handle(Event::Submit).is_none());
        assert!(controller.state().is_pending());
    }

    #[test]
    fn transport_failure_names_endpoint() {
        let (mut controller, _) = setup();
        select(&mut controller, "eye.png");
        let submission = submit(&mut controller);
        settle(&mut controller, &submission, unreachable());

        assert_eq!(controller.phase(), Phase::Failed);
        assert!(!controller.state().is_pending());
        assert!(controller.state().result().is_none());
        let message = controller.state().error_message().unwrap();
        assert!(message.contains("http://localhost:5500"), "{}", message);
    }

    #[test]
    fn failure_then_explicit_resubmit() {
        let (mut controller, _) = setup();
        select(&mut controller, "eye.png");
        let first = submit(&mut controller);
        settle(&mut controller, &first, unreachable());
        assert_eq!(controller.phase(), Phase::Failed);

        let second = submit(&mut controller);
        assert_eq!(controller.phase(), Phase::Pending);
        assert!(controller.state().error().is_none());
        settle(&mut controller, &second, ok(SEVERE));
        assert_eq!(controller.state().result().unwrap().display.label, "Severe");
    }

    #[test]
    fn out_of_range_class_is_shown_as_generic_error() {
        let (mut controller, _) = setup();
        select(&mut controller, "eye.png");
        let submission = submit(&mut controller);
        settle(
            &mut controller,
            &submission,
            ok(r#"{"success":true,"predicted_class":9,"confidence":0.5,"probabilities":[0.5,0.5,0,0,0]}"#),
        );
        assert!(controller.state().result().is_none());
        assert_eq!(
            controller.state().error_message().as_deref(),
            Some(GENERIC_DISPLAY_FAILURE)
        );
    }

    #[test]
    fn reset_returns_to_idle_and_releases_preview_once() {
        let (mut controller, previews) = setup();
        select(&mut controller, "eye.png");
        let submission = submit(&mut controller);
        settle(&mut controller, &submission, ok(NO_DR));
        assert_eq!(previews.live(), 1);

        controller.handle(Event::Reset);
        assert_eq!(controller.phase(), Phase::Idle);
        assert!(controller.state().selected().is_none());
        assert!(controller.state().preview().is_none());
        assert!(controller.state().result().is_none());
        assert!(controller.state().error().is_none());
        assert!(!controller.state().is_pending());
        assert_eq!(previews.live(), 0);

        controller.handle(Event::Reset);
        assert_eq!(previews.live(), 0);
    }

    #[test]
    fn reselecting_releases_previous_preview() {
        let (mut controller, previews) = setup();
        for i in 0..20 {
            select(&mut controller, &format!("eye-{i}.png"));
        }
        assert_eq!(previews.live(), 1);
        assert_eq!(controller.phase(), Phase::Ready);
    }

    #[test]
    fn response_after_reset_is_discarded() {
        let (mut controller, _) = setup();
        select(&mut controller, "eye.png");
        let submission = submit(&mut controller);
        controller.handle(Event::Reset);

        settle(&mut controller, &submission, ok(NO_DR));
        assert_eq!(controller.phase(), Phase::Idle);
        assert!(controller.state().result().is_none());

        let (mut controller, _) = setup();
        select(&mut controller, "eye.png");
        let submission = submit(&mut controller);
        controller.handle(Event::Reset);
        settle(&mut controller, &submission, unreachable());
        assert!(controller.state().error().is_none());
    }

    #[test]
    fn response_after_reselect_is_discarded() {
        let (mut controller, _) = setup();
        select(&mut controller, "first.png");
        let stale = submit(&mut controller);
        select(&mut controller, "second.png");
        assert_eq!(controller.phase(), Phase::Ready);

        let fresh = submit(&mut controller);
        settle(&mut controller, &stale, ok(NO_DR));
        assert!(controller.state().is_pending());
        assert!(controller.state().result().is_none());

        settle(&mut controller, &fresh, ok(SEVERE));
        assert_eq!(controller.state().result().unwrap().display.label, "Severe");
    }

    #[test]
    fn result_never_survives_into_a_new_selection() {
        let (mut controller, _) = setup();
        select(&mut controller, "first.png");
        let submission = submit(&mut controller);
        settle(&mut controller, &submission, ok(NO_DR));
        controller.handle(Event::Reset);
        select(&mut controller, "second.png");

        assert_eq!(controller.phase(), Phase::Ready);
        assert!(controller.state().result().is_none());
        assert_eq!(controller.state().selected().unwrap().name, "second.png");
    }

    #[test]
    fn new_selection_after_success_clears_result() {
        let (mut controller, _) = setup();
        select(&mut controller, "first.png");
        let submission = submit(&mut controller);
        settle(&mut controller, &submission, ok(NO_DR));
        select(&mut controller, "second.png");
        assert_eq!(controller.phase(), Phase::Ready);
        assert!(controller.state().result().is_none());
    }

    #[test]
    fn duplicate_settlement_is_ignored() {
        let (mut controller, _) = setup();
        select(&mut controller, "eye.png");
        let submission = submit(&mut controller);
        settle(&mut controller, &submission, ok(NO_DR));
        settle(&mut controller, &submission, unreachable());
        assert_eq!(controller.phase(), Phase::Succeeded);
        assert!(controller.state().error().is_none());
    }
}
