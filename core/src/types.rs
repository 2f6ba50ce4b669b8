//! Domain types for the sale engine.
//!
//! Identifiers are `i64` newtypes because the backing store keys every table
//! with a signed 64-bit integer. Records that leave the critical section
//! ([`Order`], [`SaleSummary`]) own their strings: they are snapshots taken at
//! sale time and never follow later catalog reloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            #[doc = concat!("Creates a `", stringify!($name), "` from its backing store key")]
            #[must_use]
            pub const fn new(value: i64) -> Self {
                Self(value)
            }

            /// Returns the raw backing store key
            #[must_use]
            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

define_id!(
    /// Unique identifier for an artist
    ArtistId
);
define_id!(
    /// Unique identifier for a ticket (an event of an artist)
    TicketId
);
define_id!(
    /// Unique identifier for a variation (a sellable tier of a ticket)
    VariationId
);
define_id!(
    /// Backing store row id of a stock record (one physical seat)
    StockId
);
define_id!(
    /// Order identifier, strictly increasing for the life of the process
    OrderId
);

impl OrderId {
    /// Id reported for a sale that did not happen.
    ///
    /// The allocator never issues it: ids start at `MAX(existing) + 1 >= 1`.
    pub const SOLD_OUT: Self = Self(0);

    /// Returns the id following this one, `None` past `i64::MAX`.
    #[must_use]
    pub const fn checked_next(self) -> Option<Self> {
        match self.0.checked_add(1) {
            Some(next) => Some(Self(next)),
            None => None,
        }
    }
}

// ============================================================================
// Catalog entities
// ============================================================================

/// A performer. Owns its tickets, ordered by id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Artist {
    /// Artist identifier
    pub id: ArtistId,
    /// Display name
    pub name: String,
    /// Tickets of this artist, ordered by id
    pub tickets: Vec<Ticket>,
}

/// An event of an artist. Owns its variations, ordered by id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Ticket {
    /// Ticket identifier
    pub id: TicketId,
    /// Display name
    pub name: String,
    /// Owning artist
    pub artist_id: ArtistId,
    /// Variations of this ticket, ordered by id
    pub variations: Vec<Variation>,
}

/// A sellable tier of a ticket, with its own seat pool.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Variation {
    /// Variation identifier
    pub id: VariationId,
    /// Display name
    pub name: String,
    /// Owning ticket
    pub ticket_id: TicketId,
}

// ============================================================================
// Stock and sales
// ============================================================================

/// One unsold seat.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Seat {
    /// Backing store row of this seat
    pub stock_id: StockId,
    /// Human-facing label, e.g. `"05-17"` (row-column)
    pub label: String,
}

impl Seat {
    /// Creates a new `Seat`
    #[must_use]
    pub fn new(stock_id: StockId, label: impl Into<String>) -> Self {
        Self {
            stock_id,
            label: label.into(),
        }
    }
}

/// An immutable record of one completed sale.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Order {
    /// Order identifier
    pub id: OrderId,
    /// Buyer-supplied member id
    pub member_id: String,
    /// The seat that was sold
    pub seat: Seat,
    /// Variation the seat was sold from
    pub variation_id: VariationId,
    /// Ticket of that variation
    pub ticket_id: TicketId,
    /// Artist of that ticket
    pub artist_id: ArtistId,
}

/// Denormalised line of the recent-sales feed.
///
/// Names are copied at sale time so a later catalog reload never rewrites
/// history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleSummary {
    /// Order that produced this line
    pub order_id: OrderId,
    /// Artist display name at sale time
    pub artist_name: String,
    /// Ticket display name at sale time
    pub ticket_name: String,
    /// Variation display name at sale time
    pub variation_name: String,
    /// Seat label
    pub seat_label: String,
}

// ============================================================================
// Backing store rows
// ============================================================================

/// `artist` row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArtistRow {
    /// Artist id
    pub id: ArtistId,
    /// Display name
    pub name: String,
}

/// `ticket` row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TicketRow {
    /// Ticket id
    pub id: TicketId,
    /// Display name
    pub name: String,
    /// Owning artist
    pub artist_id: ArtistId,
}

/// `variation` row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VariationRow {
    /// Variation id
    pub id: VariationId,
    /// Display name
    pub name: String,
    /// Owning ticket
    pub ticket_id: TicketId,
}

/// Unsold `stock` row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StockRow {
    /// Row id
    pub id: StockId,
    /// Variation whose pool this seat belongs to
    pub variation_id: VariationId,
    /// Seat label
    pub seat_label: String,
}

/// All catalog rows, as read in one pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CatalogRows {
    /// Artist rows
    pub artists: Vec<ArtistRow>,
    /// Ticket rows
    pub tickets: Vec<TicketRow>,
    /// Variation rows
    pub variations: Vec<VariationRow>,
}

/// One line of the admin order export.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ExportedOrder {
    /// Order id
    pub order_id: OrderId,
    /// Buyer-supplied member id
    pub member_id: String,
    /// Seat label
    pub seat_label: String,
    /// Variation the seat belongs to
    pub variation_id: VariationId,
    /// When the stock row was marked sold
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_id_next() {
        assert_eq!(OrderId::new(41).checked_next(), Some(OrderId::new(42)));
        assert_eq!(OrderId::new(i64::MAX).checked_next(), None);
        assert_eq!(OrderId::SOLD_OUT.get(), 0);
    }

    #[test]
    fn test_id_display_and_from() {
        let id = VariationId::new(7);
        assert_eq!(id.to_string(), "7");
        assert_eq!(VariationId::from(7), id);
    }

    #[test]
    fn test_ids_order_numerically() {
        assert!(OrderId::new(2) < OrderId::new(10));
    }
}
