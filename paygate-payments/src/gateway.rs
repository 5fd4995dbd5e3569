//! Gateway identity and id-prefix routing

use crate::{PaymentError, PaymentResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The closed set of supported payment gateways.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentGateway {
    Razorpay,
    Stripe,
    Upi,
}

// `sub_` is issued by both Stripe and Razorpay, so it appears in neither
// table and subscription calls name their gateway explicitly.
const RAZORPAY_PREFIXES: &[&str] = &["pay_", "order_", "rfnd_", "cust_"];
const STRIPE_PREFIXES: &[&str] = &["pi_", "ch_", "re_", "cus_"];
const UPI_PREFIXES: &[&str] = &["upi_", "upir_", "upic_", "upim_"];

impl PaymentGateway {
    pub const ALL: [PaymentGateway; 3] = [Self::Razorpay, Self::Stripe, Self::Upi];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Razorpay => "razorpay",
            Self::Stripe => "stripe",
            Self::Upi => "upi",
        }
    }

    /// Id prefixes this gateway issues.
    pub fn id_prefixes(&self) -> &'static [&'static str] {
        match self {
            Self::Razorpay => RAZORPAY_PREFIXES,
            Self::Stripe => STRIPE_PREFIXES,
            Self::Upi => UPI_PREFIXES,
        }
    }

    pub fn owns_id(&self, id: &str) -> bool {
        self.id_prefixes().iter().any(|prefix| id.starts_with(prefix))
    }

    /// Route an id to the gateway that issued it.
    pub fn from_payment_id(id: &str) -> PaymentResult<Self> {
        Self::ALL
            .into_iter()
            .find(|gateway| gateway.owns_id(id))
            .ok_or_else(|| PaymentError::UnknownGateway(id.to_string()))
    }

    /// Name of the breaker guarding calls to this gateway.
    pub fn breaker_name(&self) -> String {
        format!("{}-payments", self.as_str())
    }

    /// Header carrying inbound webhook signatures.
    pub fn signature_header(&self) -> &'static str {
        match self {
            Self::Razorpay => "X-Razorpay-Signature",
            Self::Stripe => "Stripe-Signature",
            Self::Upi => "X-UPI-Signature",
        }
    }
}

impl fmt::Display for PaymentGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentGateway {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "razorpay" => Ok(Self::Razorpay),
            "stripe" => Ok(Self::Stripe),
            "upi" => Ok(Self::Upi),
            other => Err(PaymentError::Validation(format!(
                "unsupported gateway: {}",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        for gateway in PaymentGateway::ALL {
            assert_eq!(gateway.to_string().parse::<PaymentGateway>().unwrap(), gateway);
        }
        assert_eq!("STRIPE".parse::<PaymentGateway>().unwrap(), PaymentGateway::Stripe);
        assert_eq!(" Upi ".parse::<PaymentGateway>().unwrap(), PaymentGateway::Upi);
        assert!("paypal".parse::<PaymentGateway>().is_err());
    }

    #[test]
    fn test_from_payment_id() {
        let cases = [
            ("pay_29QQoUBi66xm2f", PaymentGateway::Razorpay),
            ("order_DBJOWzybf0sJbb", PaymentGateway::Razorpay),
            ("rfnd_FP8QHiV938haTz", PaymentGateway::Razorpay),
            ("cust_Aa000000000001", PaymentGateway::Razorpay),
            ("pi_3MtwBwLkdIwHu7ix28a3tqPa", PaymentGateway::Stripe),
            ("ch_3MmlLrLkdIwHu7ix0snN0B15", PaymentGateway::Stripe),
            ("re_1Nispe2eZvKYlo2Cd31jOCgZ", PaymentGateway::Stripe),
            ("cus_NffrFeUfNV2Hib", PaymentGateway::Stripe),
            ("upi_8f14e45fceea167a", PaymentGateway::Upi),
            ("upir_c9f0f895fb98ab91", PaymentGateway::Upi),
            ("upic_45c48cce2e2d7fbd", PaymentGateway::Upi),
            ("upim_d3d9446802a44259", PaymentGateway::Upi),
        ];
        for (id, expected) in cases {
            assert_eq!(PaymentGateway::from_payment_id(id).unwrap(), expected, "{}", id);
        }
    }

    #[test]
    fn test_unknown_and_shared_ids() {
        for id in ["sub_00000000000001", "txn_1", "", "PI_upper"] {
            assert!(matches!(
                PaymentGateway::from_payment_id(id),
                Err(PaymentError::UnknownGateway(_))
            ));
        }
    }

    #[test]
    fn test_prefix_tables_are_disjoint() {
        for a in PaymentGateway::ALL {
            for b in PaymentGateway::ALL.into_iter().filter(|b| *b != a) {
                for pa in a.id_prefixes() {
                    for pb in b.id_prefixes() {
                        assert!(
                            !pa.starts_with(pb) && !pb.starts_with(pa),
                            "{} ({}) overlaps {} ({})",
                            pa,
                            a,
                            pb,
                            b
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn test_breaker_names() {
        assert_eq!(PaymentGateway::Stripe.breaker_name(), "stripe-payments");
        assert_eq!(PaymentGateway::Razorpay.breaker_name(), "razorpay-payments");
        assert_eq!(PaymentGateway::Upi.breaker_name(), "upi-payments");
    }
}
