use serde::Serialize;

use super::PaymentStatus;

/// What applying one gateway fact did to a payment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, strum::Display)]
#[serde(tag = "outcome", rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ReconcileOutcome {
    /// Payment status moved forward; side effects fire.
    Advanced {
        from: PaymentStatus,
        to: PaymentStatus,
    },
    /// Same mapped status under a new gateway string (capture then settlement).
    Refreshed,
    /// Same gateway string as already stored.
    Duplicate,
    /// Would lower the finality rank; only metadata is kept.
    Stale {
        current: PaymentStatus,
        incoming: PaymentStatus,
    },
    /// Gateway string we do not map. It replaces the stored status only while
    /// the attempt is in flight; otherwise `raw_payload` is its only record.
    Unmapped,
}

impl ReconcileOutcome {
    /// Whether the incoming gateway string replaces the stored one.
    pub fn stores_transaction_status(&self, payment_in_flight: bool) -> bool {
        match self {
            Self::Advanced { .. } | Self::Refreshed => true,
            Self::Unmapped => payment_in_flight,
            Self::Duplicate | Self::Stale { .. } => false,
        }
    }

    pub fn advanced_to(&self) -> Option<PaymentStatus> {
        match self {
            Self::Advanced { to, .. } => Some(*to),
            _ => None,
        }
    }
}

/// Orders gateway strings that share a payment status: `settlement` follows
/// `capture`, a full `refund` follows `partial_refund`.
fn gateway_finality(transaction_status: &str) -> u8 {
    match transaction_status.trim().to_ascii_lowercase().as_str() {
        "settlement" | "refund" => 1,
        _ => 0,
    }
}

/// Decides how an incoming gateway status relates to what is recorded.
///
/// `current` is the payment-axis status the fact is judged against, and
/// `stored` the raw gateway string last written for this attempt.
pub fn classify(current: PaymentStatus, stored: &str, incoming: &str) -> ReconcileOutcome {
    if stored.trim().eq_ignore_ascii_case(incoming.trim()) {
        return ReconcileOutcome::Duplicate;
    }

    match PaymentStatus::from_gateway(incoming) {
        None => ReconcileOutcome::Unmapped,
        Some(next) if next == current => {
            if gateway_finality(incoming) < gateway_finality(stored) {
                ReconcileOutcome::Duplicate
            } else {
                ReconcileOutcome::Refreshed
            }
        }
        Some(next) if current.can_advance_to(next) => ReconcileOutcome::Advanced {
            from: current,
            to: next,
        },
        Some(next) => ReconcileOutcome::Stale {
            current,
            incoming: next,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(PaymentStatus::Unpaid, "pending", "capture", ReconcileOutcome::Advanced { from: PaymentStatus::Unpaid, to: PaymentStatus::Paid })]
    #[case(PaymentStatus::Pending, "pending", "settlement", ReconcileOutcome::Advanced { from: PaymentStatus::Pending, to: PaymentStatus::Paid })]
    #[case(PaymentStatus::Pending, "pending", "expire", ReconcileOutcome::Advanced { from: PaymentStatus::Pending, to: PaymentStatus::Failed })]
    #[case(PaymentStatus::Paid, "settlement", "refund", ReconcileOutcome::Advanced { from: PaymentStatus::Paid, to: PaymentStatus::Refunded })]
    #[case(PaymentStatus::Paid, "capture", "settlement", ReconcileOutcome::Refreshed)]
    #[case(PaymentStatus::Paid, "settlement", "settlement", ReconcileOutcome::Duplicate)]
    #[case(PaymentStatus::Paid, "settlement", "capture", ReconcileOutcome::Duplicate)]
    #[case(PaymentStatus::Refunded, "refund", "partial_refund", ReconcileOutcome::Duplicate)]
    #[case(PaymentStatus::Refunded, "partial_refund", "refund", ReconcileOutcome::Refreshed)]
    #[case(PaymentStatus::Paid, "settlement", "pending", ReconcileOutcome::Stale { current: PaymentStatus::Paid, incoming: PaymentStatus::Pending })]
    #[case(PaymentStatus::Failed, "expire", "settlement", ReconcileOutcome::Stale { current: PaymentStatus::Failed, incoming: PaymentStatus::Paid })]
    #[case(PaymentStatus::Pending, "pending", "authorize", ReconcileOutcome::Unmapped)]
    fn classifies_gateway_facts(
        #[case] current: PaymentStatus,
        #[case] stored: &str,
        #[case] incoming: &str,
        #[case] expected: ReconcileOutcome,
    ) {
        assert_eq!(classify(current, stored, incoming), expected);
    }

    #[test]
    fn unmapped_status_is_kept_only_while_in_flight() {
        assert!(ReconcileOutcome::Unmapped.stores_transaction_status(true));
        assert!(!ReconcileOutcome::Unmapped.stores_transaction_status(false));
        assert!(!ReconcileOutcome::Duplicate.stores_transaction_status(true));
    }
}
