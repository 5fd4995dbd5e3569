//! Gateway implementations, one per enabled feature

#[cfg(feature = "razorpay")]
mod razorpay;
#[cfg(feature = "stripe")]
mod stripe;
#[cfg(feature = "upi")]
mod upi;

#[cfg(feature = "razorpay")]
pub use razorpay::{RAZORPAY_API_BASE, RazorpayProvider};
#[cfg(feature = "stripe")]
pub use stripe::{STRIPE_API_BASE, StripeProvider};
#[cfg(feature = "upi")]
pub use upi::UpiProvider;
