//! Per-event inventory ledger.
//!
//! The ledger is the ordered set of ticket classes embedded in an event. Classes are
//! addressed by their stable [`TicketClassId`]; the list order is display order only.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use horizon_core::{DomainError, DomainResult, TicketClassId};

use crate::ticket::{NewTicketClass, Release, TicketClass, TicketType};

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InventoryLedger {
    classes: Vec<TicketClass>,
}

impl InventoryLedger {
    /// Open a ledger for a new event: at least one class, one class per type.
    pub fn open(requested: &[NewTicketClass]) -> DomainResult<Self> {
        ensure_distinct_types(requested.iter().map(|s| s.ticket_type))?;
        let classes = requested
            .iter()
            .map(TicketClass::open)
            .collect::<DomainResult<Vec<_>>>()?;
        Ok(Self { classes })
    }

    /// Rebuild from persisted classes.
    pub fn from_classes(classes: Vec<TicketClass>) -> DomainResult<Self> {
        ensure_distinct_types(classes.iter().map(TicketClass::ticket_type))
            .map_err(|e| DomainError::invariant(e.to_string()))?;
        let ledger = Self { classes };
        ledger.check_invariants()?;
        Ok(ledger)
    }

    pub fn classes(&self) -> &[TicketClass] {
        &self.classes
    }

    pub fn by_type(&self, ticket_type: TicketType) -> DomainResult<&TicketClass> {
        self.classes
            .iter()
            .find(|c| c.ticket_type() == ticket_type)
            .ok_or_else(DomainError::ticket_type_not_found)
    }

    pub fn by_id(&self, id: TicketClassId) -> Option<&TicketClass> {
        self.classes.iter().find(|c| c.id() == id)
    }

    /// Decrement the addressed class, or fail without touching anything.
    pub fn reserve(&mut self, id: TicketClassId, quantity: u32) -> DomainResult<()> {
        self.classes
            .iter_mut()
            .find(|c| c.id() == id)
            .ok_or_else(DomainError::ticket_type_not_found)?
            .reserve(quantity)
    }

    /// Return seats to the class with `id`, or the class of `fallback` type when the id
    /// is gone (the class was re-created by a revision). `None` when neither exists.
    pub fn release(
        &mut self,
        id: TicketClassId,
        fallback: TicketType,
        quantity: u32,
    ) -> Option<Release> {
        let idx = self
            .classes
            .iter()
            .position(|c| c.id() == id)
            .or_else(|| self.classes.iter().position(|c| c.ticket_type() == fallback))?;
        Some(self.classes[idx].release(quantity))
    }

    /// Produce the ledger that results from replacing the class list with `requested`.
    ///
    /// Classes are matched by type: matched classes keep their id and sold count,
    /// new types open fresh classes, and a class with sales cannot be dropped.
    pub fn revise(&self, requested: &[NewTicketClass]) -> DomainResult<Self> {
        ensure_distinct_types(requested.iter().map(|s| s.ticket_type))?;

        for existing in &self.classes {
            let kept = requested.iter().any(|s| s.ticket_type == existing.ticket_type());
            if !kept && existing.sold() > 0 {
                return Err(DomainError::conflict(format!(
                    "cannot remove {} tickets: {} already sold",
                    existing.ticket_type(),
                    existing.sold()
                )));
            }
        }

        let mut classes = Vec::with_capacity(requested.len());
        for wanted in requested {
            match self.classes.iter().find(|c| c.ticket_type() == wanted.ticket_type) {
                Some(existing) => {
                    let mut class = existing.clone();
                    class.resize(wanted)?;
                    classes.push(class);
                }
                None => classes.push(TicketClass::open(wanted)?),
            }
        }
        Ok(Self { classes })
    }

    pub fn check_invariants(&self) -> DomainResult<()> {
        self.classes.iter().try_for_each(TicketClass::validate)
    }
}

fn ensure_distinct_types(types: impl Iterator<Item = TicketType>) -> DomainResult<()> {
    let mut seen = HashSet::new();
    let mut any = false;
    for t in types {
        any = true;
        if !seen.insert(t) {
            return Err(DomainError::validation(format!(
                "ticket type {t} is listed more than once"
            )));
        }
    }
    if !any {
        return Err(DomainError::validation("at least one ticket class is required"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn three_classes() -> Vec<NewTicketClass> {
        vec![
            NewTicketClass::new(TicketType::Vip, 100, 10),
            NewTicketClass::new(TicketType::Regular, 40, 50),
        ]
    }

    #[test]
    fn open_rejects_duplicate_types() {
        let dup = vec![
            NewTicketClass::new(TicketType::Vip, 100, 10),
            NewTicketClass::new(TicketType::Vip, 80, 5),
        ];
        assert!(matches!(InventoryLedger::open(&dup), Err(DomainError::Validation(_))));
    }

    #[test]
    fn open_rejects_empty_class_list() {
        assert!(matches!(InventoryLedger::open(&[]), Err(DomainError::Validation(_))));
    }

    #[test]
    fn unknown_type_is_ticket_type_not_found() {
        let ledger = InventoryLedger::open(&three_classes()).unwrap();
        assert_eq!(
            ledger.by_type(TicketType::Student).unwrap_err(),
            DomainError::ticket_type_not_found()
        );
    }

    #[test]
    fn release_falls_back_to_type_when_id_is_gone() {
        let mut ledger = InventoryLedger::open(&three_classes()).unwrap();
        let vip = ledger.by_type(TicketType::Vip).unwrap().id();
        ledger.reserve(vip, 4).unwrap();

        let release = ledger.release(TicketClassId::new(), TicketType::Vip, 4).unwrap();
        assert_eq!(release.available, 10);
        assert!(!release.clamped);
        assert!(ledger.release(TicketClassId::new(), TicketType::Student, 1).is_none());
    }

    #[test]
    fn revise_keeps_ids_and_sold_counts() {
        let mut ledger = InventoryLedger::open(&three_classes()).unwrap();
        let vip = ledger.by_type(TicketType::Vip).unwrap().id();
        ledger.reserve(vip, 3).unwrap();

        let revised = ledger
            .revise(&[
                NewTicketClass::new(TicketType::Vip, 150, 12),
                NewTicketClass::new(TicketType::Student, 10, 30),
            ])
            .unwrap();

        let vip_class = revised.by_type(TicketType::Vip).unwrap();
        assert_eq!(vip_class.id(), vip);
        assert_eq!(vip_class.available_quantity(), 9);
        assert!(revised.by_type(TicketType::Regular).is_err());
        assert_eq!(revised.by_type(TicketType::Student).unwrap().available_quantity(), 30);
    }

    #[test]
    fn revise_refuses_to_drop_sold_class() {
        let mut ledger = InventoryLedger::open(&three_classes()).unwrap();
        let regular = ledger.by_type(TicketType::Regular).unwrap().id();
        ledger.reserve(regular, 1).unwrap();

        let err = ledger
            .revise(&[NewTicketClass::new(TicketType::Vip, 100, 10)])
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[derive(Debug, Clone)]
    enum Op {
        Book(u32),
        Cancel(usize),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (1u32..8).prop_map(Op::Book),
            (0usize..16).prop_map(Op::Cancel),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: any interleaving of bookings and cancellations keeps
        /// `0 <= available <= total`, and granted seats never exceed capacity.
        #[test]
        fn bookings_and_cancellations_preserve_ledger_bounds(
            total in 1u32..40,
            ops in prop::collection::vec(op(), 1..60)
        ) {
            let mut ledger = InventoryLedger::open(&[NewTicketClass::new(TicketType::Vip, 25, total)]).unwrap();
            let id = ledger.by_type(TicketType::Vip).unwrap().id();
            let mut held: Vec<u32> = Vec::new();

            for op in ops {
                match op {
                    Op::Book(q) => {
                        if ledger.reserve(id, q).is_ok() {
                            held.push(q);
                        }
                    }
                    Op::Cancel(i) => {
                        if !held.is_empty() {
                            let q = held.remove(i % held.len());
                            let release = ledger.release(id, TicketType::Vip, q).unwrap();
                            prop_assert!(!release.clamped);
                        }
                    }
                }

                let class = ledger.by_id(id).unwrap();
                prop_assert!(class.available_quantity() <= class.total_quantity());
                prop_assert_eq!(class.sold(), held.iter().sum::<u32>());
                prop_assert!(ledger.check_invariants().is_ok());
            }
        }
    }
}
