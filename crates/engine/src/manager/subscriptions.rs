use std::collections::HashMap;

use strata_types::{Notification, Topic};
use tokio::sync::broadcast;
use tracing::trace;

/// Topic-keyed broadcast channels. A channel is created on first subscription; notifications for
/// topics nobody subscribed to are dropped.
#[derive(Debug)]
pub(crate) struct Notifier {
    channels: HashMap<Topic, broadcast::Sender<Notification>>,
    capacity: usize,
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: HashMap::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn subscribe(&mut self, topic: Topic) -> broadcast::Receiver<Notification> {
        let capacity = self.capacity;
        self.channels
            .entry(topic)
            .or_insert_with(|| broadcast::channel(capacity).0)
            .subscribe()
    }

    pub fn send(&self, notification: Notification) {
        let topic = notification.topic();
        let Some(sender) = self.channels.get(&topic) else {
            return;
        };
        // a send error only means every receiver was dropped
        if sender.send(notification).is_err() {
            trace!(?topic, "notification dropped, no active receivers");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notifications_reach_only_their_topic() {
        let mut notifier = Notifier::new(8);
        let mut shape = notifier.subscribe(Topic::TreeShape);
        let mut aggregate = notifier.subscribe(Topic::AggregateResult);

        notifier.send(Notification::TreeShapeChanged { revision: 3 });
        notifier.send(Notification::NodeStatusChanged {
            node_id: "p1".into(),
            previous: None,
            current: None,
        });

        assert_eq!(shape.try_recv().expect("shape notification"), Notification::TreeShapeChanged { revision: 3 });
        assert!(aggregate.try_recv().is_err());
    }
}
