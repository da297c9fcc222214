//! Live fan-out of order and payment events to connected staff and tables.
//!
//! The hub owns a single broadcast channel. Publishing never waits on
//! subscribers; a subscriber that falls behind by more than the channel
//! capacity loses the oldest messages and keeps going.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::{debug, warn};
use uuid::Uuid;

/// Event type carried on the wire as `type`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BroadcastKind {
    NewOrder,
    OrderStatusUpdated,
    OrderReady,
    PaymentReceived,
    PaymentStatusUpdated,
    AssistanceRequest,
}

/// Who a message is addressed to: `all`, `staff` or `table:{id}`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Target {
    All,
    Staff,
    Table(Uuid),
}

impl Target {
    pub fn reaches(&self, audience: &Audience) -> bool {
        match (self, audience) {
            (Target::All, _) => true,
            (Target::Staff, Audience::Staff) => true,
            (Target::Table(target), Audience::Table(table)) => target == table,
            _ => false,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::All => f.write_str("all"),
            Target::Staff => f.write_str("staff"),
            Target::Table(id) => write!(f, "table:{}", id),
        }
    }
}

impl FromStr for Target {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(Target::All),
            "staff" => Ok(Target::Staff),
            other => other
                .strip_prefix("table:")
                .and_then(|id| Uuid::parse_str(id).ok())
                .map(Target::Table)
                .ok_or_else(|| format!("unknown broadcast target: {}", other)),
        }
    }
}

impl Serialize for Target {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Target {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// What a live subscriber listens for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Audience {
    Staff,
    Table(Uuid),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Broadcast {
    #[serde(rename = "type")]
    pub kind: BroadcastKind,
    pub target: Target,
    pub message: String,
    pub data: serde_json::Value,
}

#[derive(Clone, Debug)]
pub struct NotificationHub {
    sender: broadcast::Sender<Broadcast>,
}

impl NotificationHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Fire-and-forget. Returns how many subscribers were handed the message.
    pub fn publish(&self, message: Broadcast) -> usize {
        match self.sender.send(message) {
            Ok(receivers) => receivers,
            Err(broadcast::error::SendError(message)) => {
                debug!(kind = %message.kind, target = %message.target, "No live subscribers");
                0
            }
        }
    }

    pub fn subscribe(&self, audience: Audience) -> Subscription {
        Subscription {
            audience,
            receiver: self.sender.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// A connected listener; filters the shared stream down to its audience.
pub struct Subscription {
    audience: Audience,
    receiver: broadcast::Receiver<Broadcast>,
}

impl Subscription {
    pub fn audience(&self) -> Audience {
        self.audience
    }

    /// Next message for this audience, or `None` once the hub is gone.
    pub async fn recv(&mut self) -> Option<Broadcast> {
        loop {
            match self.receiver.recv().await {
                Ok(message) if message.target.reaches(&self.audience) => return Some(message),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, audience = ?self.audience, "Live subscriber lagged; messages dropped");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant of [`Subscription::recv`].
    pub fn try_recv(&mut self) -> Option<Broadcast> {
        loop {
            match self.receiver.try_recv() {
                Ok(message) if message.target.reaches(&self.audience) => return Some(message),
                Ok(_) => continue,
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, audience = ?self.audience, "Live subscriber lagged; messages dropped");
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }
}
