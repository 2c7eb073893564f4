use crate::{
    controller::{Controller, Effect, Event, InteractionState, Submission},
    error::TransportError,
    transport::Transport,
};
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, error};

/// Drives a [`Controller`] against a transport.
///
/// Each dispatch runs on its own tokio task and reports back through the session's
/// channel, so user events keep flowing while a request is in flight.
pub struct Session<T: Transport> {
    controller: Controller,
    transport: Arc<T>,
    sender: UnboundedSender<Event>,
    receiver: UnboundedReceiver<Event>,
    in_flight: usize,
}

impl<T: Transport> Session<T> {
    pub fn new(controller: Controller, transport: Arc<T>) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            controller,
            transport,
            sender,
            receiver,
            in_flight: 0,
        }
    }

    pub fn state(&self) -> &InteractionState {
        self.controller.state()
    }

    pub fn controller(&self) -> &Controller {
        &self.controller
    }

    /// Number of spawned requests whose completion has not been received yet,
    /// including ones the controller will discard.
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn dispatch(&mut self, event: Event) -> &InteractionState {
        if let Some(effect) = self.controller.handle(event) {
            self.run_effect(effect);
        }
        self.controller.state()
    }

    fn run_effect(&mut self, effect: Effect) {
        match effect {
            Effect::Dispatch(Submission { ticket, image }) => {
                let transport = self.transport.clone();
                let sender = self.sender.clone();
                self.in_flight += 1;
                tokio::spawn(async move {
                    let endpoint = transport.endpoint();
                    // The request runs in its own task so a panic still settles the ticket.
                    let request = tokio::spawn(async move { transport.classify(&image).await });
                    let outcome = match request.await {
                        Ok(outcome) => outcome,
                        Err(e) => {
                            error!("Classification request task failed: {}", e);
                            Err(TransportError {
                                endpoint,
                                reason: e.to_string(),
                                status: None,
                            })
                        }
                    };
                    if sender.send(Event::Settled { ticket, outcome }).is_err() {
                        debug!("Session closed before the response arrived");
                    }
                });
            }
        }
    }

    /// Waits for the next network completion and applies it. Returns false when
    /// nothing is in flight.
    pub async fn next_settled(&mut self) -> bool {
        if self.in_flight == 0 {
            return false;
        }
        match self.receiver.recv().await {
            Some(event) => {
                self.in_flight -= 1;
                self.dispatch(event);
                true
            }
            None => false,
        }
    }

    /// Applies completions until nothing is in flight.
    pub async fn run_to_idle(&mut self) -> &InteractionState {
        while self.next_settled().await {}
        self.controller.state()
    }
}
