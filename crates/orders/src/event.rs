use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use dualmart_core::{AccountId, Money, OrderId};
use dualmart_events::Event;

use crate::number::OrderNumber;
use crate::order::{FulfillmentStatus, Order, PaymentType};

/// Event: OrderPlaced. Carries the committed order as a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPlaced {
    pub order: Order,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderAwaitingApproval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderAwaitingApproval {
    pub order_id: OrderId,
    pub order_number: OrderNumber,
    pub account_id: Option<AccountId>,
    pub total: Money,
    pub payment_type: PaymentType,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderEvent {
    OrderPlaced(OrderPlaced),
    OrderAwaitingApproval(OrderAwaitingApproval),
}

impl OrderEvent {
    /// Events announcing a freshly committed order.
    pub fn for_new_order(order: &Order) -> Vec<OrderEvent> {
        let occurred_at = order.placed_at();
        let mut events = vec![OrderEvent::OrderPlaced(OrderPlaced {
            order: order.clone(),
            occurred_at,
        })];
        if order.fulfillment_status() == FulfillmentStatus::AwaitingApproval {
            events.push(OrderEvent::OrderAwaitingApproval(OrderAwaitingApproval {
                order_id: order.id_typed(),
                order_number: order.order_number().clone(),
                account_id: order.account_id(),
                total: order.total(),
                payment_type: order.payment_type(),
                occurred_at,
            }));
        }
        events
    }

    pub fn order_id(&self) -> OrderId {
        match self {
            OrderEvent::OrderPlaced(e) => e.order.id_typed(),
            OrderEvent::OrderAwaitingApproval(e) => e.order_id,
        }
    }
}

impl Event for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderPlaced(_) => "orders.order.placed",
            OrderEvent::OrderAwaitingApproval(_) => "orders.order.awaiting_approval",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            OrderEvent::OrderPlaced(e) => e.occurred_at,
            OrderEvent::OrderAwaitingApproval(e) => e.occurred_at,
        }
    }
}
