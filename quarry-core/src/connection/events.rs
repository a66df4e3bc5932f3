//! Notifications emitted by a connection

use crate::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    QueryExecuted {
        sql: String,
        bindings: Vec<Value>,
        time: Duration,
        connection: String,
    },
    TransactionBeginning {
        connection: String,
    },
    TransactionCommitted {
        connection: String,
    },
    TransactionRolledBack {
        connection: String,
    },
}

impl Event {
    pub fn connection(&self) -> &str {
        match self {
            Event::QueryExecuted { connection, .. }
            | Event::TransactionBeginning { connection }
            | Event::TransactionCommitted { connection }
            | Event::TransactionRolledBack { connection } => connection,
        }
    }
}

/// Receives every event a connection emits
pub type EventSink = Arc<dyn Fn(&Event) + Send + Sync>;

/// A sink forwarding events into an unbounded channel
pub fn channel() -> (EventSink, mpsc::UnboundedReceiver<Event>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    let sink: EventSink = Arc::new(move |event: &Event| {
        // a dropped receiver just means nobody is listening any more
        let _ = sender.send(event.clone());
    });
    (sink, receiver)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_forwards_events() {
        let (sink, mut receiver) = channel();
        sink(&Event::TransactionBeginning {
            connection: "default".to_string(),
        });
        let event = receiver.try_recv().unwrap();
        assert_eq!(event.connection(), "default");
        assert!(matches!(event, Event::TransactionBeginning { .. }));
    }
}
