//! Inbound event sources.
//!
//! A messaging adapter hands events to the runtime through an
//! [`EventSource`]. The simplest adapter is a task holding the sending half of
//! a tokio channel:
//!
//! ```rust,ignore
//! let (tx, rx) = tokio::sync::mpsc::channel(256);
//! tokio::spawn(poll_platform(tx));
//! runtime.run(rx).await?;
//! ```

use async_trait::async_trait;
use tokio::sync::mpsc;

use brass_core::Event;

/// A stream of inbound events.
#[async_trait]
pub trait EventSource: Send {
    /// Waits for the next event. `None` means the source is exhausted.
    async fn next_event(&mut self) -> Option<Event>;
}

#[async_trait]
impl EventSource for mpsc::Receiver<Event> {
    async fn next_event(&mut self) -> Option<Event> {
        self.recv().await
    }
}

#[async_trait]
impl EventSource for mpsc::UnboundedReceiver<Event> {
    async fn next_event(&mut self) -> Option<Event> {
        self.recv().await
    }
}

#[async_trait]
impl<S: EventSource + ?Sized> EventSource for Box<S> {
    async fn next_event(&mut self) -> Option<Event> {
        (**self).next_event().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_sources() {
        let (tx, mut rx) = mpsc::channel(4);
        tx.send(Event::command(1, "/start")).await.unwrap();
        drop(tx);
        assert_eq!(rx.next_event().await.map(|e| e.user_id.get()), Some(1));
        assert!(rx.next_event().await.is_none());

        let (tx, rx) = mpsc::unbounded_channel();
        let mut boxed: Box<dyn EventSource> = Box::new(rx);
        tx.send(Event::message(2, "hello")).unwrap();
        assert_eq!(
            boxed.next_event().await.map(|e| e.raw().to_string()),
            Some("hello".to_string())
        );
    }
}
