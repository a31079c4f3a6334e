use core::str::FromStr;

use serde::{Deserialize, Serialize};

use horizon_core::{DomainError, DomainResult, TicketClassId};

/// Admission tier label. Unique within one event.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TicketType {
    #[serde(rename = "VIP")]
    Vip,
    Regular,
    Student,
}

impl TicketType {
    pub const ALL: [TicketType; 3] = [TicketType::Vip, TicketType::Regular, TicketType::Student];

    pub fn as_str(&self) -> &'static str {
        match self {
            TicketType::Vip => "VIP",
            TicketType::Regular => "Regular",
            TicketType::Student => "Student",
        }
    }
}

impl core::fmt::Display for TicketType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TicketType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        TicketType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                DomainError::validation(format!(
                    "ticket type '{s}' must be one of: VIP, Regular, Student"
                ))
            })
    }
}

/// Requested shape of a ticket class when opening or revising an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTicketClass {
    #[serde(rename = "type")]
    pub ticket_type: TicketType,
    pub price: u64,
    pub total_quantity: u32,
}

impl NewTicketClass {
    pub fn new(ticket_type: TicketType, price: u64, total_quantity: u32) -> Self {
        Self {
            ticket_type,
            price,
            total_quantity,
        }
    }

    fn validate(&self) -> DomainResult<()> {
        if self.price == 0 {
            return Err(DomainError::validation(format!(
                "{} price must be greater than zero",
                self.ticket_type
            )));
        }
        if self.total_quantity == 0 {
            return Err(DomainError::validation(format!(
                "{} total quantity must be greater than zero",
                self.ticket_type
            )));
        }
        Ok(())
    }
}

/// Outcome of returning tickets to a class.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Release {
    /// Available count after the release.
    pub available: u32,
    /// True when the release would have pushed `available` above `total`.
    pub clamped: bool,
}

/// A priced admission tier tracking total and currently available seats.
///
/// Invariant: `0 <= available_quantity <= total_quantity`, `price > 0`,
/// `total_quantity > 0`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketClass {
    id: TicketClassId,
    #[serde(rename = "type")]
    ticket_type: TicketType,
    price: u64,
    total_quantity: u32,
    available_quantity: u32,
}

impl TicketClass {
    /// Open a fresh class with every seat available.
    pub fn open(wanted: &NewTicketClass) -> DomainResult<Self> {
        wanted.validate()?;
        Ok(Self {
            id: TicketClassId::new(),
            ticket_type: wanted.ticket_type,
            price: wanted.price,
            total_quantity: wanted.total_quantity,
            available_quantity: wanted.total_quantity,
        })
    }

    /// Rebuild a class from persisted state, rejecting rows that break the invariant.
    pub fn restore(
        id: TicketClassId,
        ticket_type: TicketType,
        price: u64,
        total_quantity: u32,
        available_quantity: u32,
    ) -> DomainResult<Self> {
        NewTicketClass::new(ticket_type, price, total_quantity).validate()?;
        if available_quantity > total_quantity {
            return Err(DomainError::invariant(format!(
                "ticket class {id}: available {available_quantity} exceeds total {total_quantity}"
            )));
        }
        Ok(Self {
            id,
            ticket_type,
            price,
            total_quantity,
            available_quantity,
        })
    }

    pub fn id(&self) -> TicketClassId {
        self.id
    }

    pub fn ticket_type(&self) -> TicketType {
        self.ticket_type
    }

    pub fn price(&self) -> u64 {
        self.price
    }

    pub fn total_quantity(&self) -> u32 {
        self.total_quantity
    }

    pub fn available_quantity(&self) -> u32 {
        self.available_quantity
    }

    pub fn sold(&self) -> u32 {
        self.total_quantity - self.available_quantity
    }

    /// Flat `price * quantity`, in minor units.
    pub fn price_for(&self, quantity: u32) -> DomainResult<u64> {
        self.price
            .checked_mul(u64::from(quantity))
            .ok_or_else(|| DomainError::validation("total price overflows"))
    }

    /// Check that `quantity` seats could be taken right now.
    pub fn ensure_available(&self, quantity: u32) -> DomainResult<()> {
        if quantity == 0 {
            return Err(DomainError::validation("quantity must be greater than zero"));
        }
        if self.available_quantity < quantity {
            return Err(DomainError::InsufficientInventory {
                requested: quantity,
                available: self.available_quantity,
            });
        }
        Ok(())
    }

    /// Decrement-by-N; never goes below zero.
    pub fn reserve(&mut self, quantity: u32) -> DomainResult<()> {
        self.ensure_available(quantity)?;
        self.available_quantity -= quantity;
        Ok(())
    }

    /// Increment-by-N, clamped at `total_quantity`.
    pub fn release(&mut self, quantity: u32) -> Release {
        let wanted = u64::from(self.available_quantity) + u64::from(quantity);
        let clamped = wanted > u64::from(self.total_quantity);
        self.available_quantity = if clamped {
            self.total_quantity
        } else {
            self.available_quantity + quantity
        };
        Release {
            available: self.available_quantity,
            clamped,
        }
    }

    /// Apply a new price/capacity while keeping already-sold seats sold.
    pub(crate) fn resize(&mut self, wanted: &NewTicketClass) -> DomainResult<()> {
        wanted.validate()?;
        let sold = self.sold();
        if wanted.total_quantity < sold {
            return Err(DomainError::conflict(format!(
                "{} total quantity {} is below the {} ticket(s) already sold",
                self.ticket_type, wanted.total_quantity, sold
            )));
        }
        self.price = wanted.price;
        self.total_quantity = wanted.total_quantity;
        self.available_quantity = wanted.total_quantity - sold;
        Ok(())
    }

    pub(crate) fn validate(&self) -> DomainResult<()> {
        if self.available_quantity > self.total_quantity {
            return Err(DomainError::invariant(format!(
                "ticket class {}: available {} exceeds total {}",
                self.id, self.available_quantity, self.total_quantity
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vip(total: u32) -> TicketClass {
        TicketClass::open(&NewTicketClass::new(TicketType::Vip, 100, total)).unwrap()
    }

    #[test]
    fn ticket_type_parses_case_insensitively() {
        assert_eq!("vip".parse::<TicketType>().unwrap(), TicketType::Vip);
        assert_eq!(" Student ".parse::<TicketType>().unwrap(), TicketType::Student);
        assert!(matches!(
            "Balcony".parse::<TicketType>(),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn ticket_type_serializes_with_display_label() {
        let json = serde_json::to_string(&TicketType::Vip).unwrap();
        assert_eq!(json, "\"VIP\"");
    }

    #[test]
    fn open_rejects_zero_price_and_zero_total() {
        let zero_price = NewTicketClass::new(TicketType::Regular, 0, 10);
        let zero_total = NewTicketClass::new(TicketType::Regular, 10, 0);
        assert!(matches!(TicketClass::open(&zero_price), Err(DomainError::Validation(_))));
        assert!(matches!(TicketClass::open(&zero_total), Err(DomainError::Validation(_))));
    }

    #[test]
    fn reserve_refuses_more_than_available() {
        let mut class = vip(5);
        class.reserve(3).unwrap();
        let err = class.reserve(3).unwrap_err();
        assert_eq!(
            err,
            DomainError::InsufficientInventory {
                requested: 3,
                available: 2
            }
        );
        assert_eq!(class.available_quantity(), 2);
    }

    #[test]
    fn reserve_zero_is_a_validation_error() {
        let mut class = vip(5);
        assert!(matches!(class.reserve(0), Err(DomainError::Validation(_))));
    }

    #[test]
    fn release_clamps_at_total() {
        let mut class = vip(10);
        class.reserve(2).unwrap();
        let release = class.release(5);
        assert_eq!(release, Release { available: 10, clamped: true });
        assert_eq!(class.available_quantity(), 10);
    }

    #[test]
    fn restore_rejects_available_above_total() {
        let err = TicketClass::restore(TicketClassId::new(), TicketType::Vip, 100, 5, 6).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn resize_keeps_sold_seats() {
        let mut class = vip(10);
        class.reserve(4).unwrap();
        class.resize(&NewTicketClass::new(TicketType::Vip, 120, 20)).unwrap();
        assert_eq!(class.available_quantity(), 16);
        assert_eq!(class.price(), 120);

        let err = class
            .resize(&NewTicketClass::new(TicketType::Vip, 120, 3))
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn price_for_detects_overflow() {
        let class = TicketClass::open(&NewTicketClass::new(TicketType::Vip, u64::MAX, 2)).unwrap();
        assert!(class.price_for(2).is_err());
        assert_eq!(class.price_for(1).unwrap(), u64::MAX);
    }
}
