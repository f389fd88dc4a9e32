//! Payments: order creation and proof verification.

pub mod gateway;
pub mod verify;

pub use gateway::{Order, PaymentGateway, RazorpayGateway};
pub use verify::{PaymentProof, PaymentVerifier};
