// Lazarus Event Bus
//
// Fan-out of recovery events to whoever is watching. Publishing never blocks
// and never fails: with no subscribers the event is simply dropped.

use log::debug;
use tokio::sync::broadcast;

use lazarus_utils::event::RecoveryEvent;

const DEFAULT_CAPACITY: usize = 256;

/// Broadcast hub for [`RecoveryEvent`]s
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<RecoveryEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Slow subscribers lag (and skip) once `capacity` events are buffered.
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn publish(&self, event: RecoveryEvent) {
        let kind = event.kind();
        match self.sender.send(event) {
            Ok(receivers) => debug!("Lazarus: published {} to {} subscriber(s)", kind, receivers),
            Err(_) => debug!("Lazarus: no subscribers for {}", kind),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RecoveryEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::new();
        bus.publish(RecoveryEvent::overview("idle"));
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_every_subscriber_receives() {
        let bus = EventBus::new();
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        bus.publish(RecoveryEvent::overview("collect"));

        assert_eq!(first.recv().await.unwrap().kind(), "recovery-overview-changed");
        assert_eq!(second.recv().await.unwrap().kind(), "recovery-overview-changed");
    }

    #[tokio::test]
    async fn test_events_arrive_in_order() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.publish(RecoveryEvent::overview("first"));
        bus.publish(RecoveryEvent::overview("second"));

        let reasons: Vec<String> = [rx.recv().await.unwrap(), rx.recv().await.unwrap()]
            .into_iter()
            .map(|event| match event {
                RecoveryEvent::RecoveryOverviewChanged { reason, .. } => reason,
                other => panic!("unexpected event {:?}", other),
            })
            .collect();
        assert_eq!(reasons, vec!["first", "second"]);
    }
}
