use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex as AsyncMutex;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::broker::message::Message;

/// Shared receiving end of a consumer group. Every subscription in the group
/// holds a clone and takes turns receiving from it.
pub type GroupReceiver = Arc<AsyncMutex<UnboundedReceiver<Message>>>;

/// A named queue of messages shared by competing consumers.
#[derive(Debug)]
pub struct ConsumerGroup {
    pub name: String,
    sender: UnboundedSender<Message>,
    receiver: GroupReceiver,
}

impl ConsumerGroup {
    pub fn new(name: &str) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            name: name.to_string(),
            sender,
            receiver: Arc::new(AsyncMutex::new(receiver)),
        }
    }

    pub fn receiver(&self) -> GroupReceiver {
        self.receiver.clone()
    }

    /// Queues a message for the group. Returns false if every receiver is gone.
    pub fn enqueue(&self, message: Message) -> bool {
        self.sender.send(message).is_ok()
    }
}

/// Represents a topic in the broker
///
/// Each consumer group gets its own copy of every message published to the
/// topic. Messages published before any group exists are retained in
/// `backlog` and handed to the first group that subscribes.
#[derive(Debug, Default)]
pub struct Topic {
    pub name: String,
    pub groups: HashMap<String, ConsumerGroup>,
    pub backlog: Vec<Message>,
}

impl Topic {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            groups: HashMap::new(),
            backlog: Vec::new(),
        }
    }

    /// Returns the group's receiver, creating the group on first use.
    pub fn join(&mut self, group: &str) -> GroupReceiver {
        if let Some(existing) = self.groups.get(group) {
            return existing.receiver();
        }

        let created = ConsumerGroup::new(group);
        for message in self.backlog.drain(..) {
            created.enqueue(message);
        }
        let receiver = created.receiver();
        self.groups.insert(group.to_string(), created);
        receiver
    }

    /// Routes a message to every group, or to the backlog if there is none.
    pub fn route(&mut self, message: Message) {
        if self.groups.is_empty() {
            self.backlog.push(message);
            return;
        }
        for group in self.groups.values() {
            group.enqueue(message.clone());
        }
    }
}
