use model::order::{FillabilityStatus, OrderKind};

/// How a single order kind reacts to a balance or approval observation.
/// Generalizing this into a trait (rather than branching on `OrderKind`
/// inside the maker-update worker) is what lets a marketplace-specific
/// quirk live in its own small implementation instead of a growing
/// `if`/`else` chain in the worker itself.
pub trait OrderKindPolicy: Send + Sync {
    /// Given the order's current fillability and a freshly observed
    /// "has enough balance" boolean, returns the fillability that should
    /// be written back. Cancelled/filled/expired orders are left to the
    /// caller — this only resolves the fillable/no-balance axis.
    fn resolve_balance_status(
        &self,
        current: FillabilityStatus,
        has_sufficient_balance: bool,
    ) -> FillabilityStatus;
}

/// The default rule every Wyvern order kind follows: a balance shortfall
/// always wins, and balance being restored only revives an order that
/// wasn't separately cancelled, filled, or expired.
pub struct StandardPolicy;

impl OrderKindPolicy for StandardPolicy {
    fn resolve_balance_status(
        &self,
        current: FillabilityStatus,
        has_sufficient_balance: bool,
    ) -> FillabilityStatus {
        match (current, has_sufficient_balance) {
            (FillabilityStatus::Cancelled, _)
            | (FillabilityStatus::Filled, _)
            | (FillabilityStatus::Expired, _) => current,
            (_, true) => FillabilityStatus::Fillable,
            (_, false) => FillabilityStatus::NoBalance,
        }
    }
}

/// X2Y2 invalidates an order off-chain the moment its balance or approval
/// drops out, instead of waiting for a separate on-chain cancellation.
pub struct X2Y2Policy;

impl OrderKindPolicy for X2Y2Policy {
    fn resolve_balance_status(
        &self,
        current: FillabilityStatus,
        has_sufficient_balance: bool,
    ) -> FillabilityStatus {
        match (current, has_sufficient_balance) {
            (FillabilityStatus::Cancelled, _)
            | (FillabilityStatus::Filled, _)
            | (FillabilityStatus::Expired, _) => current,
            (_, true) => FillabilityStatus::Fillable,
            (_, false) => FillabilityStatus::Cancelled,
        }
    }
}

pub fn policy_for(kind: OrderKind) -> &'static dyn OrderKindPolicy {
    // Every order kind this system accepts follows the standard rule
    // except for marketplace-specific quirks, which get their own
    // `OrderKindPolicy` impl and an arm here instead of a branch inside
    // the worker.
    match kind {
        OrderKind::WyvernV2 | OrderKind::WyvernV23 => &StandardPolicy,
        OrderKind::X2Y2 => &X2Y2Policy,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balance_shortfall_overrides_fillable() {
        let status = StandardPolicy.resolve_balance_status(FillabilityStatus::Fillable, false);
        assert_eq!(status, FillabilityStatus::NoBalance);
    }

    #[test]
    fn terminal_statuses_are_sticky() {
        for terminal in [
            FillabilityStatus::Cancelled,
            FillabilityStatus::Filled,
            FillabilityStatus::Expired,
        ] {
            assert_eq!(
                StandardPolicy.resolve_balance_status(terminal, true),
                terminal
            );
        }
    }

    #[test]
    fn restored_balance_revives_a_non_terminal_order() {
        let status = StandardPolicy.resolve_balance_status(FillabilityStatus::NoBalance, true);
        assert_eq!(status, FillabilityStatus::Fillable);
    }

    #[test]
    fn x2y2_promotes_a_balance_shortfall_straight_to_cancelled() {
        let status = X2Y2Policy.resolve_balance_status(FillabilityStatus::Fillable, false);
        assert_eq!(status, FillabilityStatus::Cancelled);
    }

    #[test]
    fn x2y2_terminal_statuses_are_still_sticky() {
        for terminal in [
            FillabilityStatus::Cancelled,
            FillabilityStatus::Filled,
            FillabilityStatus::Expired,
        ] {
            assert_eq!(
                X2Y2Policy.resolve_balance_status(terminal, true),
                terminal
            );
        }
    }

    #[test]
    fn policy_for_dispatches_on_order_kind() {
        assert!(matches!(
            policy_for(OrderKind::WyvernV23).resolve_balance_status(FillabilityStatus::Fillable, false),
            FillabilityStatus::NoBalance
        ));
        assert!(matches!(
            policy_for(OrderKind::X2Y2).resolve_balance_status(FillabilityStatus::Fillable, false),
            FillabilityStatus::Cancelled
        ));
    }
}
