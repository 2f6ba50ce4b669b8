//! Catalog and stock datasets.
//!
//! Ids are assigned sequentially from 1 in artist, ticket, variation order.
//! Seat labels follow the `RR-CC` layout of a 64 column hall.

use crate::Dataset;
use boxoffice_core::{
    ArtistId, ArtistRow, CatalogRows, StockId, StockRow, TicketId, TicketRow, VariationId,
    VariationRow,
};

/// Columns per seat row.
pub const HALL_COLUMNS: i64 = 64;

/// Label of the `index`-th seat of a variation (0-based).
#[must_use]
pub fn seat_label(index: i64) -> String {
    format!("{:02}-{:02}", index / HALL_COLUMNS, index % HALL_COLUMNS)
}

/// `artists` artists with `tickets` tickets each, `variations` variations per
/// ticket and `seats` seats per variation.
#[must_use]
pub fn festival(artists: i64, tickets: i64, variations: i64, seats: i64) -> Dataset {
    let mut catalog = CatalogRows::default();
    let mut stock = Vec::new();
    let mut ticket_id = 0;
    let mut variation_id = 0;
    let mut stock_id = 0;

    for a in 1..=artists {
        catalog.artists.push(ArtistRow {
            id: ArtistId::new(a),
            name: format!("Artist {a}"),
        });

        for t in 1..=tickets {
            ticket_id += 1;
            catalog.tickets.push(TicketRow {
                id: TicketId::new(ticket_id),
                name: format!("Artist {a} Live {t}"),
                artist_id: ArtistId::new(a),
            });

            for v in 1..=variations {
                variation_id += 1;
                catalog.variations.push(VariationRow {
                    id: VariationId::new(variation_id),
                    name: if v == 1 { "Arena".to_string() } else { format!("Stand {}", v - 1) },
                    ticket_id: TicketId::new(ticket_id),
                });

                for index in 0..seats {
                    stock_id += 1;
                    stock.push(StockRow {
                        id: StockId::new(stock_id),
                        variation_id: VariationId::new(variation_id),
                        seat_label: seat_label(index),
                    });
                }
            }
        }
    }

    Dataset { catalog, stock }
}

/// One artist, one ticket, one variation (id 1) with `seats` seats whose
/// stock ids are `1..=seats`.
#[must_use]
pub fn single_variation(seats: i64) -> Dataset {
    festival(1, 1, 1, seats)
}

/// The default demo hall: 2 artists, 2 tickets each, 2 variations per ticket,
/// 4096 seats per variation.
#[must_use]
pub fn demo() -> Dataset {
    festival(2, 2, 2, HALL_COLUMNS * HALL_COLUMNS)
}
