//! Domain events published to the live update channel.

use serde::Serialize;
use uuid::Uuid;

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderEvent {
    Created {
        order_id: Uuid,
        order_number: String,
        user_id: Uuid,
        total_amount: i64,
    },
    StatusUpdated {
        order_id: Uuid,
        order_number: String,
        status: String,
    },
}

impl OrderEvent {
    pub fn subject(&self) -> &'static str {
        match self {
            Self::Created { .. } => "orders.created",
            Self::StatusUpdated { .. } => "orders.status_updated",
        }
    }
}
