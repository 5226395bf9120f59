use streaming::{Bridge, HostMessage, SurfaceMessage};

use crate::backend::Backend;
use crate::dispatcher::{ApplyReport, Dispatcher};

/// Bridge to a surface living in the same process.
///
/// Messages go straight to a [`Dispatcher`]; its reports, acknowledgements
/// and the backend's events come back on the next `receive`.
#[derive(Debug)]
pub struct LocalBridge<B> {
    dispatcher: Dispatcher<B>,
    outbox: Vec<SurfaceMessage>,
}

impl<B: Backend> LocalBridge<B> {
    pub fn new(backend: B) -> Self {
        Self {
            dispatcher: Dispatcher::new(backend),
            outbox: Vec::new(),
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher<B> {
        &self.dispatcher
    }

    pub fn dispatcher_mut(&mut self) -> &mut Dispatcher<B> {
        &mut self.dispatcher
    }

    pub fn backend(&self) -> &B {
        self.dispatcher.backend()
    }

    pub fn backend_mut(&mut self) -> &mut B {
        self.dispatcher.backend_mut()
    }

    /// Forwards the backend's ready signal.
    pub fn signal_ready(&mut self) {
        let was_ready = self.dispatcher.is_ready();
        let report = self.dispatcher.notify_ready();
        self.report(report);
        if !was_ready && self.dispatcher.is_ready() {
            self.outbox.push(SurfaceMessage::Ready);
        }
    }

    fn report(&mut self, report: ApplyReport) {
        for failure in report.failures {
            self.outbox.push(SurfaceMessage::ApplyFailed {
                id: failure.id,
                target: failure.target,
                message: failure.error.to_string(),
            });
        }
    }
}

impl<B: Backend> Bridge for LocalBridge<B> {
    fn send(&mut self, message: HostMessage) {
        match message {
            HostMessage::Calls { calls } => {
                let report = self.dispatcher.apply_batch(&calls);
                self.report(report);
                if let Some(last) = calls.last() {
                    self.outbox.push(SurfaceMessage::Delivered { through: last.id });
                }
            }
            HostMessage::Snapshot {
                snapshot,
                replay,
                through,
            } => {
                let report = self.dispatcher.replay_all(&snapshot, &replay);
                if let Some(through) = through {
                    self.dispatcher.resume_after(through);
                }
                self.report(report);
                if self.dispatcher.is_ready() {
                    self.outbox.push(SurfaceMessage::Ready);
                }
            }
        }
    }

    fn receive(&mut self) -> Vec<SurfaceMessage> {
        let events = self.dispatcher.take_events();
        if !events.is_empty() {
            self.outbox.push(SurfaceMessage::Events { events });
        }
        std::mem::take(&mut self.outbox)
    }
}
