//! Breakpoint hit notifications

use tokio::sync::broadcast;
use tracing::trace;

/// Events raised by the proxy
///
/// `BreakpointHit` carries no payload: receivers re-read the owned set with
/// `DebugProxy::breakpoints(HitState::Hit)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProxyEvent {
    /// At least one owned breakpoint reached its final state
    BreakpointHit,
}

impl ProxyEvent {
    /// Event name as exposed to the IDE layer
    pub fn name(&self) -> &'static str {
        match self {
            ProxyEvent::BreakpointHit => "breakpointHit",
        }
    }
}

/// Bounded broadcast of [`ProxyEvent`]s
///
/// A subscriber that falls more than `capacity` events behind sees
/// `RecvError::Lagged`; since every event means "recompute state", skipping
/// is harmless.
pub struct Notifier {
    tx: broadcast::Sender<ProxyEvent>,
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProxyEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Returns how many subscribers received the event
    pub fn breakpoint_hit(&self) -> usize {
        self.emit(ProxyEvent::BreakpointHit)
    }

    fn emit(&self, event: ProxyEvent) -> usize {
        match self.tx.send(event) {
            Ok(receivers) => receivers,
            Err(_) => {
                trace!("No subscribers for {}", event.name());
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::TryRecvError;

    #[test]
    fn test_emit_without_subscribers() {
        let notifier = Notifier::new(4);
        assert_eq!(notifier.subscriber_count(), 0);
        assert_eq!(notifier.breakpoint_hit(), 0);
    }

    #[test]
    fn test_every_subscriber_sees_event() {
        let notifier = Notifier::new(4);
        let mut a = notifier.subscribe();
        let mut b = notifier.subscribe();

        assert_eq!(notifier.breakpoint_hit(), 2);
        assert_eq!(a.try_recv(), Ok(ProxyEvent::BreakpointHit));
        assert_eq!(b.try_recv(), Ok(ProxyEvent::BreakpointHit));
        assert_eq!(a.try_recv(), Err(TryRecvError::Empty));
    }

    #[test]
    fn test_slow_subscriber_lags() {
        let notifier = Notifier::new(1);
        let mut rx = notifier.subscribe();
        notifier.breakpoint_hit();
        notifier.breakpoint_hit();

        assert!(matches!(rx.try_recv(), Err(TryRecvError::Lagged(1))));
        assert_eq!(rx.try_recv(), Ok(ProxyEvent::BreakpointHit));
        assert_eq!(ProxyEvent::BreakpointHit.name(), "breakpointHit");
    }
}
