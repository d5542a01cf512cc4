pub mod event;
pub mod payment;
pub mod webhook;

pub use event::PaymentEvent;
pub use payment::{
    Corridor, FeeBreakdown, FeeHandling, Payment, PaymentMethod, PaymentStatus,
};
pub use webhook::{DeliveryStatus, WebhookDelivery, WebhookPayload};
