//! Broadcast messages and the bounded per-session queue.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

use crate::session::sanitize::{plain_to_html, sanitize_html};

/// How the content of a message is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentMode {
    #[default]
    Plain,
    Html,
}

/// A message pushed to one or more sessions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastMessage {
    /// Sending user; `None` for system messages.
    pub sender: Option<String>,
    pub content: String,
    pub mode: ContentMode,
    pub send_time: DateTime<Utc>,
    pub last_display: Option<DateTime<Utc>>,
    /// Repeating messages are shown again on every poll until they expire.
    pub repeat: bool,
}

impl BroadcastMessage {
    pub fn new(sender: Option<String>, content: impl Into<String>, mode: ContentMode) -> Self {
        Self {
            sender,
            content: content.into(),
            mode,
            send_time: Utc::now(),
            last_display: None,
            repeat: false,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(None, content, ContentMode::Plain)
    }

    pub fn repeating(mut self) -> Self {
        self.repeat = true;
        self
    }

    /// Content as safe HTML.
    pub fn html(&self) -> String {
        match self.mode {
            ContentMode::Plain => plain_to_html(&self.content),
            ContentMode::Html => sanitize_html(&self.content),
        }
    }

    pub fn view(&self) -> BroadcastView {
        BroadcastView {
            sender: self.sender.clone(),
            html: self.html(),
            send_time: self.send_time,
            repeat: self.repeat,
        }
    }
}

/// What a client receives when polling for broadcasts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastView {
    pub sender: Option<String>,
    pub html: String,
    pub send_time: DateTime<Utc>,
    pub repeat: bool,
}

/// Bounded FIFO of pending messages for one session.
///
/// Adding to a full queue evicts the oldest message.
#[derive(Debug)]
pub struct BroadcastQueue {
    capacity: usize,
    messages: Mutex<VecDeque<BroadcastMessage>>,
}

impl BroadcastQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            messages: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn add(&self, message: BroadcastMessage) {
        let mut messages = self.messages.lock();
        while messages.len() >= self.capacity {
            messages.pop_front();
        }
        messages.push_back(message);
    }

    /// Remove and return all pending messages, oldest first.
    pub fn drain(&self) -> Vec<BroadcastMessage> {
        self.messages.lock().drain(..).collect()
    }

    pub fn has_pending(&self) -> bool {
        !self.messages.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drain for display; repeating messages younger than `repeat_ttl` are
    /// queued again with `last_display` set to `now`.
    pub fn take_for_display(&self, now: DateTime<Utc>, repeat_ttl: Duration) -> Vec<BroadcastMessage> {
        let ttl = chrono::Duration::from_std(repeat_ttl).unwrap_or(chrono::Duration::MAX);
        let mut messages = self.messages.lock();
        let taken: Vec<BroadcastMessage> = messages.drain(..).collect();

        for message in &taken {
            if message.repeat && now - message.send_time < ttl {
                let mut again = message.clone();
                again.last_display = Some(now);
                messages.push_back(again);
            }
        }
        taken
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_queue_drops_oldest() {
        let queue = BroadcastQueue::new(3);
        for i in 0..4 {
            queue.add(BroadcastMessage::system(format!("m{i}")));
        }
        let drained: Vec<String> = queue.drain().into_iter().map(|m| m.content).collect();
        assert_eq!(drained, vec!["m1", "m2", "m3"]);
        assert!(!queue.has_pending());
    }

    #[test]
    fn test_plain_and_html_rendering() {
        let plain = BroadcastMessage::system("<b>x</b>\nY");
        assert_eq!(plain.html(), "&lt;b&gt;x&lt;/b&gt;<br/>Y");

        let html = BroadcastMessage::new(
            Some("Admin".into()),
            "<p>Maintenance <b>tonight</b></p><script>steal()</script>",
            ContentMode::Html,
        );
        assert_eq!(html.html(), "<p>Maintenance <b>tonight</b></p>");
    }

    #[test]
    fn test_repeating_messages_survive_display() {
        let queue = BroadcastQueue::new(5);
        queue.add(BroadcastMessage::system("once"));
        queue.add(BroadcastMessage::system("again").repeating());

        let now = Utc::now();
        let shown = queue.take_for_display(now, Duration::from_secs(60));
        assert_eq!(shown.len(), 2);

        let pending = queue.drain();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].content, "again");
        assert_eq!(pending[0].last_display, Some(now));
    }

    #[test]
    fn test_expired_repeat_is_not_requeued() {
        let queue = BroadcastQueue::new(5);
        let mut old = BroadcastMessage::system("stale").repeating();
        old.send_time = Utc::now() - chrono::Duration::hours(2);
        queue.add(old);

        let shown = queue.take_for_display(Utc::now(), Duration::from_secs(3600));
        assert_eq!(shown.len(), 1);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_concurrent_add_and_drain() {
        let queue = BroadcastQueue::new(1000);
        let drained = std::thread::scope(|scope| {
            for t in 0..4 {
                let queue = &queue;
                scope.spawn(move || {
                    for i in 0..100 {
                        queue.add(BroadcastMessage::system(format!("{t}-{i}")));
                    }
                });
            }
            let reader = scope.spawn(|| {
                let mut total = 0;
                for _ in 0..50 {
                    total += queue.drain().len();
                }
                total
            });
            reader.join().unwrap()
        });
        assert_eq!(drained + queue.drain().len(), 400);
    }
}
