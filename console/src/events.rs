use config::EventsConfig;
use rc_core::{ConfigEvent, MutationKind, OrganizationId, ProjectId};
use tokio::sync::broadcast;
use tracing::debug;

/// Fans committed configuration writes out to subscribers such as a routing
/// engine that must drop its resolved config.
///
/// Sending never blocks; a subscriber that falls more than
/// `channel_capacity` events behind sees `RecvError::Lagged`.
#[derive(Clone)]
pub struct ConfigEventBroadcaster {
    event_tx: broadcast::Sender<ConfigEvent>,
}

impl ConfigEventBroadcaster {
    pub fn new(config: &EventsConfig) -> Self {
        let (event_tx, _) = broadcast::channel(config.channel_capacity.max(1));
        Self { event_tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConfigEvent> {
        self.event_tx.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.event_tx.receiver_count()
    }

    pub fn organization_changed(
        &self,
        organization_id: &OrganizationId,
        operation: MutationKind,
    ) -> usize {
        self.send(ConfigEvent::OrganizationConfigChanged {
            organization_id: organization_id.clone(),
            operation,
            timestamp: utils::now_millis(),
        })
    }

    pub fn project_changed(
        &self,
        organization_id: &OrganizationId,
        project_id: &ProjectId,
        operation: MutationKind,
    ) -> usize {
        self.send(ConfigEvent::ProjectConfigChanged {
            organization_id: organization_id.clone(),
            project_id: project_id.clone(),
            operation,
            timestamp: utils::now_millis(),
        })
    }

    /// Returns how many subscribers received the event.
    fn send(&self, event: ConfigEvent) -> usize {
        match self.event_tx.send(event) {
            Ok(receivers) => receivers,
            Err(broadcast::error::SendError(event)) => {
                debug!("No subscribers for {:?}", event);
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use testing::{org_id, project_id};

    #[tokio::test]
    async fn test_subscribers_receive_events_in_order() {
        let events = ConfigEventBroadcaster::new(&EventsConfig::default());
        let mut rx = events.subscribe();
        let org = org_id("org-x");

        assert_eq!(events.organization_changed(&org, MutationKind::Update), 1);
        events.project_changed(&org, &project_id("p"), MutationKind::Create);

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.operation(), MutationKind::Update);
        assert!(second.affects_project(&project_id("p")));
        assert!(!second.affects_project(&project_id("q")));
    }

    #[test]
    fn test_send_without_subscribers_is_not_an_error() {
        let events = ConfigEventBroadcaster::new(&EventsConfig::default());
        assert_eq!(
            events.organization_changed(&org_id("org-x"), MutationKind::Delete),
            0
        );
    }

    #[tokio::test]
    async fn test_slow_subscriber_lags_past_capacity() {
        let events = ConfigEventBroadcaster::new(&EventsConfig {
            channel_capacity: 2,
        });
        let mut rx = events.subscribe();
        let org = org_id("org-x");
        for _ in 0..3 {
            events.organization_changed(&org, MutationKind::Toggle);
        }

        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(1))
        ));
    }
}
