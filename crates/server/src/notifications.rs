use portaflow_core::ports::{Notifier, WorkflowEvent};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Hands workflow events to a background dispatcher without blocking the
/// caller. Dropped events are logged, never surfaced to the workflow.
#[derive(Clone, Debug)]
pub struct ChannelNotifier {
    sender: mpsc::UnboundedSender<WorkflowEvent>,
}

impl ChannelNotifier {
    pub fn spawn() -> (Self, JoinHandle<usize>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let handle = tokio::spawn(dispatch(receiver));
        (Self { sender }, handle)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, event: WorkflowEvent) {
        if let Err(error) = self.sender.send(event) {
            warn!(
                event_name = "workflow.notify.dropped",
                request_id = %error.0.request_id(),
                recipient = %error.0.recipient(),
                "notification dispatcher is gone; event dropped"
            );
        }
    }
}

/// Drains the channel until every sender is dropped; returns the number of
/// events dispatched.
async fn dispatch(mut receiver: mpsc::UnboundedReceiver<WorkflowEvent>) -> usize {
    let mut dispatched = 0;
    while let Some(event) = receiver.recv().await {
        info!(
            event_name = event.event_name(),
            request_id = %event.request_id(),
            recipient = %event.recipient(),
            "notification dispatched"
        );
        dispatched += 1;
    }
    dispatched
}
