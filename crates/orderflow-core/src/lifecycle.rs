//! Order state machines.
//!
//! Each order type carries one immutable adjacency table (status → statuses
//! reachable in one step). A status never appears in its own reachable set,
//! so no-op transitions are rejected like any other illegal pair.

use std::fmt;

use crate::error::OrderFlowError;
use crate::status::{PurchaseOrderStatus, SalesOrderStatus};

pub trait Lifecycle: Copy + Eq + fmt::Display + Sized + 'static {
    /// Entity name used in `InvalidTransition` errors.
    const ENTITY: &'static str;

    const TRANSITIONS: &'static [(Self, &'static [Self])];

    /// Statuses in which notes/items may still be edited.
    const EDITABLE: &'static [Self];

    fn allowed_next(self) -> &'static [Self] {
        Self::TRANSITIONS
            .iter()
            .find(|(from, _)| *from == self)
            .map(|(_, next)| *next)
            .unwrap_or(&[])
    }

    fn can_transition_to(self, target: Self) -> bool {
        self.allowed_next().contains(&target)
    }

    fn is_terminal(self) -> bool {
        self.allowed_next().is_empty()
    }

    fn is_editable(self) -> bool {
        Self::EDITABLE.contains(&self)
    }

    fn check_transition(self, target: Self) -> Result<(), OrderFlowError> {
        if self.can_transition_to(target) {
            Ok(())
        } else {
            Err(OrderFlowError::InvalidTransition {
                entity: Self::ENTITY,
                from: self.to_string(),
                to: target.to_string(),
            })
        }
    }
}

impl Lifecycle for PurchaseOrderStatus {
    const ENTITY: &'static str = "purchase_order";

    const TRANSITIONS: &'static [(Self, &'static [Self])] = &[
        (Self::Received, &[Self::Processing, Self::Voided]),
        (
            Self::Processing,
            &[Self::PendingAdjustments, Self::Processed, Self::Voided],
        ),
        (Self::PendingAdjustments, &[Self::Processing, Self::Voided]),
        (Self::Processed, &[]),
        (Self::Voided, &[]),
    ];

    const EDITABLE: &'static [Self] = &[
        Self::Received,
        Self::Processing,
        Self::PendingAdjustments,
    ];
}

impl Lifecycle for SalesOrderStatus {
    const ENTITY: &'static str = "sales_order";

    const TRANSITIONS: &'static [(Self, &'static [Self])] = &[
        (Self::Received, &[Self::Processing]),
        (Self::Processing, &[Self::Dispatching]),
        (Self::Dispatching, &[Self::Processed]),
        (Self::Processed, &[]),
    ];

    // en_despacho is locked: the order content is what is being shipped.
    const EDITABLE: &'static [Self] = &[Self::Received, Self::Processing];
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expected_po(from: PurchaseOrderStatus) -> Vec<PurchaseOrderStatus> {
        use PurchaseOrderStatus::*;
        match from {
            Received => vec![Processing, Voided],
            Processing => vec![PendingAdjustments, Processed, Voided],
            PendingAdjustments => vec![Processing, Voided],
            Processed | Voided => vec![],
        }
    }

    #[test]
    fn purchase_order_transition_matrix_is_exact() {
        for from in PurchaseOrderStatus::ALL {
            for to in PurchaseOrderStatus::ALL {
                let allowed = expected_po(from).contains(&to);
                assert_eq!(
                    from.check_transition(to).is_ok(),
                    allowed,
                    "{from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn sales_order_is_a_straight_line() {
        use SalesOrderStatus::*;
        assert!(Received.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Dispatching));
        assert!(Dispatching.can_transition_to(Processed));
        assert!(!Received.can_transition_to(Dispatching));
        assert!(!Dispatching.can_transition_to(Processing));
        assert!(Processed.is_terminal());
    }

    #[test]
    fn self_transitions_are_rejected() {
        for s in PurchaseOrderStatus::ALL {
            assert!(s.check_transition(s).is_err());
        }
        for s in SalesOrderStatus::ALL {
            assert!(s.check_transition(s).is_err());
        }
    }

    #[test]
    fn terminal_statuses_reject_everything() {
        for s in [PurchaseOrderStatus::Processed, PurchaseOrderStatus::Voided] {
            assert!(s.is_terminal());
            assert!(PurchaseOrderStatus::ALL
                .iter()
                .all(|t| s.check_transition(*t).is_err()));
        }
    }

    #[test]
    fn invalid_transition_error_names_pair() {
        let err = PurchaseOrderStatus::Processed
            .check_transition(PurchaseOrderStatus::Received)
            .unwrap_err();
        match err {
            OrderFlowError::InvalidTransition { entity, from, to } => {
                assert_eq!(entity, "purchase_order");
                assert_eq!(from, "procesada");
                assert_eq!(to, "recibida");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn editable_sets() {
        assert!(PurchaseOrderStatus::PendingAdjustments.is_editable());
        assert!(!PurchaseOrderStatus::Voided.is_editable());
        assert!(SalesOrderStatus::Processing.is_editable());
        assert!(!SalesOrderStatus::Dispatching.is_editable());
    }
}
