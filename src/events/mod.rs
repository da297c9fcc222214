use metrics::counter;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::{OrderItemStatus, OrderStatus, PaymentStatus};
use crate::notifications::{Broadcast, BroadcastKind, NotificationHub, Target};

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Queues an event without waiting. Events are only sent after the
    /// transaction that produced them has committed.
    pub fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .try_send(event)
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

/// Post-commit facts published to live subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    NewOrder {
        order_id: Uuid,
        order_number: String,
        table_id: Uuid,
        table_number: String,
        grand_total: Decimal,
    },
    OrderStatusUpdated {
        order_id: Uuid,
        order_number: String,
        table_id: Uuid,
        previous: OrderStatus,
        status: OrderStatus,
    },
    OrderItemStatusUpdated {
        order_id: Uuid,
        item_id: Uuid,
        table_id: Uuid,
        status: OrderItemStatus,
    },
    PaymentReceived {
        order_id: Uuid,
        order_number: String,
        table_id: Uuid,
        amount: Decimal,
        payment_type: Option<String>,
    },
    PaymentStatusUpdated {
        order_id: Uuid,
        order_number: String,
        table_id: Uuid,
        payment_status: PaymentStatus,
    },
    AssistanceRequested {
        session_id: Uuid,
        table_id: Uuid,
        table_number: String,
    },
}

pub fn new_order_message(order_number: &str, table_number: &str) -> String {
    format!("New order #{} from table {}", order_number, table_number)
}

pub fn payment_received_message(order_number: &str) -> String {
    format!("Payment received for order #{}", order_number)
}

pub fn order_ready_message(order_number: &str) -> String {
    format!("Order #{} is ready to serve", order_number)
}

pub fn assistance_message(table_number: &str) -> String {
    format!("Table {} needs assistance", table_number)
}

impl Event {
    /// Expands an event into the broadcasts it produces, one per target.
    pub fn broadcasts(&self) -> Vec<Broadcast> {
        match self {
            Event::NewOrder {
                order_id,
                order_number,
                table_id,
                table_number,
                grand_total,
            } => vec![Broadcast {
                kind: BroadcastKind::NewOrder,
                target: Target::Staff,
                message: new_order_message(order_number, table_number),
                data: json!({
                    "order_id": order_id,
                    "order_number": order_number,
                    "table_id": table_id,
                    "table_number": table_number,
                    "grand_total": grand_total,
                }),
            }],
            Event::OrderStatusUpdated {
                order_id,
                order_number,
                table_id,
                previous,
                status,
            } => {
                let data = json!({
                    "order_id": order_id,
                    "order_number": order_number,
                    "previous_status": previous,
                    "status": status,
                });
                let message = format!("Order #{} is now {}", order_number, status);
                let mut out = to_staff_and_table(
                    BroadcastKind::OrderStatusUpdated,
                    *table_id,
                    message,
                    data.clone(),
                );
                if *status == OrderStatus::Ready {
                    out.extend(to_staff_and_table(
                        BroadcastKind::OrderReady,
                        *table_id,
                        order_ready_message(order_number),
                        data,
                    ));
                }
                out
            }
            Event::OrderItemStatusUpdated {
                order_id,
                item_id,
                table_id,
                status,
            } => to_staff_and_table(
                BroadcastKind::OrderStatusUpdated,
                *table_id,
                format!("Item is now {}", status),
                json!({ "order_id": order_id, "item_id": item_id, "item_status": status }),
            ),
            Event::PaymentReceived {
                order_id,
                order_number,
                table_id,
                amount,
                payment_type,
            } => to_staff_and_table(
                BroadcastKind::PaymentReceived,
                *table_id,
                payment_received_message(order_number),
                json!({
                    "order_id": order_id,
                    "order_number": order_number,
                    "amount": amount,
                    "payment_type": payment_type,
                }),
            ),
            Event::PaymentStatusUpdated {
                order_id,
                order_number,
                table_id,
                payment_status,
            } => vec![Broadcast {
                kind: BroadcastKind::PaymentStatusUpdated,
                target: Target::Table(*table_id),
                message: format!("Payment for order #{} is {}", order_number, payment_status),
                data: json!({
                    "order_id": order_id,
                    "order_number": order_number,
                    "payment_status": payment_status,
                }),
            }],
            Event::AssistanceRequested {
                session_id,
                table_id,
                table_number,
            } => vec![Broadcast {
                kind: BroadcastKind::AssistanceRequest,
                target: Target::Staff,
                message: assistance_message(table_number),
                data: json!({
                    "session_id": session_id,
                    "table_id": table_id,
                    "table_number": table_number,
                }),
            }],
        }
    }
}

fn to_staff_and_table(
    kind: BroadcastKind,
    table_id: Uuid,
    message: String,
    data: serde_json::Value,
) -> Vec<Broadcast> {
    vec![
        Broadcast {
            kind,
            target: Target::Staff,
            message: message.clone(),
            data: data.clone(),
        },
        Broadcast {
            kind,
            target: Target::Table(table_id),
            message,
            data,
        },
    ]
}

/// Drains the event queue into the live hub until every sender is dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>, hub: NotificationHub) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        debug!(?event, "Received event");
        for broadcast in event.broadcasts() {
            let kind = broadcast.kind.to_string();
            let delivered = hub.publish(broadcast);
            counter!("table_order.broadcasts", 1, "type" => kind);
            debug!(delivered, "Broadcast published");
        }
    }

    warn!("Event channel closed; stopping event processing");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::Audience;
    use rust_decimal_macros::dec;

    #[test]
    fn payment_received_reaches_staff_and_table() {
        let table_id = Uuid::new_v4();
        let event = Event::PaymentReceived {
            order_id: Uuid::new_v4(),
            order_number: "ORD-20240101-00001".into(),
            table_id,
            amount: dec!(115000),
            payment_type: Some("qris".into()),
        };

        let out = event.broadcasts();
        let targets: Vec<Target> = out.iter().map(|b| b.target).collect();
        assert_eq!(targets, vec![Target::Staff, Target::Table(table_id)]);
        assert!(out.iter().all(|b| b.kind == BroadcastKind::PaymentReceived));
        assert_eq!(out[0].message, "Payment received for order #ORD-20240101-00001");
    }

    #[test]
    fn ready_status_also_announces_order_ready() {
        let event = Event::OrderStatusUpdated {
            order_id: Uuid::new_v4(),
            order_number: "ORD-20240101-00002".into(),
            table_id: Uuid::new_v4(),
            previous: OrderStatus::Preparing,
            status: OrderStatus::Ready,
        };

        let kinds: Vec<BroadcastKind> = event.broadcasts().iter().map(|b| b.kind).collect();
        assert_eq!(
            kinds,
            vec![
                BroadcastKind::OrderStatusUpdated,
                BroadcastKind::OrderStatusUpdated,
                BroadcastKind::OrderReady,
                BroadcastKind::OrderReady,
            ]
        );
    }

    #[test]
    fn send_does_not_block_when_queue_is_full() {
        let (tx, _rx) = mpsc::channel(1);
        let sender = EventSender::new(tx);
        let event = Event::AssistanceRequested {
            session_id: Uuid::new_v4(),
            table_id: Uuid::new_v4(),
            table_number: "T1".into(),
        };
        assert!(sender.send(event.clone()).is_ok());
        assert!(sender.send(event).is_err());
    }

    #[tokio::test]
    async fn processed_events_reach_subscribers() {
        let hub = NotificationHub::new(8);
        let mut staff = hub.subscribe(Audience::Staff);
        let (tx, rx) = mpsc::channel(8);
        let worker = tokio::spawn(process_events(rx, hub.clone()));

        EventSender::new(tx)
            .send(Event::NewOrder {
                order_id: Uuid::new_v4(),
                order_number: "ORD-20240101-00003".into(),
                table_id: Uuid::new_v4(),
                table_number: "T7".into(),
                grand_total: dec!(115000),
            })
            .unwrap();

        let received = staff.recv().await.unwrap();
        assert_eq!(received.kind, BroadcastKind::NewOrder);
        assert_eq!(received.message, "New order #ORD-20240101-00003 from table T7");
        worker.await.unwrap();
    }
}
