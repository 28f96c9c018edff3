pub mod email_queue;
pub mod gdpr_consent;
pub mod order;
pub mod order_item;
pub mod payment_event;
pub mod pickup_secret;
pub mod pickup_token;

pub use email_queue::Entity as EmailQueue;
pub use gdpr_consent::Entity as GdprConsent;
pub use order::Entity as Order;
pub use order_item::Entity as OrderItem;
pub use payment_event::Entity as PaymentEvent;
pub use pickup_secret::Entity as PickupSecret;
pub use pickup_token::Entity as PickupToken;
