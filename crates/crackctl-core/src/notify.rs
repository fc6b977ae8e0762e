//! Notification interface between the supervisor and its presentation
//! layer.
//!
//! The supervisor never renders anything; it reports through a
//! [`Notifier`]. [`ChannelNotifier`] forwards everything into an mpsc
//! channel so the consumer handles notifications on its own task.

use std::fmt;

use serde::Serialize;
use tokio::sync::mpsc;

use crate::outcome::Outcome;

/// Which worker output channel a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Primary channel; the only one parsed for result markers.
    Stdout,
    Stderr,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        })
    }
}

/// Something the worker said.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    LogLine { channel: Channel, text: String },
    ResultFound { password: String },
}

/// Everything a [`Notifier`] can receive, as a single value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum Notification {
    Event(Event),
    Outcome(Outcome),
    /// The supervisor has released its run and accepts a new launch.
    Idle,
}

/// Receiver of supervisor notifications.
///
/// Calls for one run never overlap: events are delivered by a single
/// dispatcher task, and `on_outcome` / `on_idle` only after it has
/// drained.
pub trait Notifier: Send + Sync {
    fn on_event(&self, event: Event);

    fn on_outcome(&self, outcome: Outcome);

    fn on_idle(&self) {}
}

/// Forwards notifications into an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn forward(&self, notification: Notification) {
        // A closed receiver means nobody is listening any more; the run
        // itself must carry on regardless.
        if self.tx.send(notification).is_err() {
            tracing::debug!("notification receiver dropped");
        }
    }
}

impl Notifier for ChannelNotifier {
    fn on_event(&self, event: Event) {
        self.forward(Notification::Event(event));
    }

    fn on_outcome(&self, outcome: Outcome) {
        self.forward(Notification::Outcome(outcome));
    }

    fn on_idle(&self) {
        self.forward(Notification::Idle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn channel_notifier_forwards_in_order() {
        let (notifier, mut rx) = ChannelNotifier::new();
        notifier.on_event(Event::LogLine {
            channel: Channel::Stderr,
            text: "warming up".to_string(),
        });
        notifier.on_outcome(Outcome::NotFound);
        notifier.on_idle();

        assert!(matches!(
            rx.recv().await,
            Some(Notification::Event(Event::LogLine { channel: Channel::Stderr, .. }))
        ));
        assert_eq!(rx.recv().await, Some(Notification::Outcome(Outcome::NotFound)));
        assert_eq!(rx.recv().await, Some(Notification::Idle));
    }

    #[test]
    fn channel_notifier_survives_dropped_receiver() {
        let (notifier, rx) = ChannelNotifier::new();
        drop(rx);
        notifier.on_idle();
    }

    #[test]
    fn event_json_shape() {
        let json = serde_json::to_value(Event::ResultFound {
            password: "hunter2".to_string(),
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"type": "result_found", "password": "hunter2"}));

        let json = serde_json::to_value(Event::LogLine {
            channel: Channel::Stdout,
            text: "INFO: hi".to_string(),
        })
        .unwrap();
        assert_eq!(json["channel"], "stdout");
    }
}
