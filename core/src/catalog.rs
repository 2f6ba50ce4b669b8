//! The Artist → Ticket → Variation hierarchy.
//!
//! A [`Catalog`] is built once per load from flat backing store rows and is
//! immutable afterwards. Lookups by id go through indices built at load time,
//! so the engine can resolve a variation's ticket and artist without scanning.

use crate::types::{
    Artist, ArtistId, CatalogRows, StockId, Ticket, TicketId, Variation, VariationId,
};
use std::collections::HashMap;
use thiserror::Error;

/// Errors raised while building a catalog or validating stock against it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    /// Two artist rows share an id.
    #[error("Duplicate artist id: {0}")]
    DuplicateArtist(ArtistId),

    /// Two ticket rows share an id.
    #[error("Duplicate ticket id: {0}")]
    DuplicateTicket(TicketId),

    /// Two variation rows share an id.
    #[error("Duplicate variation id: {0}")]
    DuplicateVariation(VariationId),

    /// A ticket references an artist that does not exist.
    #[error("Ticket {ticket} references unknown artist {artist}")]
    OrphanTicket {
        /// The offending ticket.
        ticket: TicketId,
        /// The missing artist.
        artist: ArtistId,
    },

    /// A variation references a ticket that does not exist.
    #[error("Variation {variation} references unknown ticket {ticket}")]
    OrphanVariation {
        /// The offending variation.
        variation: VariationId,
        /// The missing ticket.
        ticket: TicketId,
    },

    /// A stock row references a variation outside the catalog.
    #[error("Stock row {stock} references unknown variation {variation}")]
    UnknownVariation {
        /// Stock row id.
        stock: StockId,
        /// The missing variation.
        variation: VariationId,
    },

    /// A stock row id appears more than once.
    #[error("Duplicate stock row id: {0}")]
    DuplicateSeat(StockId),
}

/// A variation together with its owning ticket and artist.
#[derive(Clone, Copy, Debug)]
pub struct VariationPath<'a> {
    /// Owning artist
    pub artist: &'a Artist,
    /// Owning ticket
    pub ticket: &'a Ticket,
    /// The variation itself
    pub variation: &'a Variation,
}

/// Immutable catalog with id indices.
#[derive(Clone, Debug, Default)]
pub struct Catalog {
    artists: Vec<Artist>,
    artist_index: HashMap<ArtistId, usize>,
    ticket_index: HashMap<TicketId, (usize, usize)>,
    variation_index: HashMap<VariationId, (usize, usize, usize)>,
}

impl Catalog {
    /// Build a catalog from flat rows.
    ///
    /// Artists, tickets and variations are ordered by id regardless of row
    /// order.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] on duplicate ids or rows whose parent is
    /// missing.
    pub fn from_rows(rows: CatalogRows) -> Result<Self, CatalogError> {
        let CatalogRows {
            mut artists,
            mut tickets,
            mut variations,
        } = rows;
        artists.sort_by_key(|a| a.id);
        tickets.sort_by_key(|t| t.id);
        variations.sort_by_key(|v| v.id);

        let mut catalog = Self::default();

        for row in artists {
            if catalog.artist_index.contains_key(&row.id) {
                return Err(CatalogError::DuplicateArtist(row.id));
            }
            catalog.artist_index.insert(row.id, catalog.artists.len());
            catalog.artists.push(Artist {
                id: row.id,
                name: row.name,
                tickets: Vec::new(),
            });
        }

        for row in tickets {
            if catalog.ticket_index.contains_key(&row.id) {
                return Err(CatalogError::DuplicateTicket(row.id));
            }
            let Some(&a) = catalog.artist_index.get(&row.artist_id) else {
                return Err(CatalogError::OrphanTicket {
                    ticket: row.id,
                    artist: row.artist_id,
                });
            };
            let owner = &mut catalog.artists[a];
            catalog.ticket_index.insert(row.id, (a, owner.tickets.len()));
            owner.tickets.push(Ticket {
                id: row.id,
                name: row.name,
                artist_id: row.artist_id,
                variations: Vec::new(),
            });
        }

        for row in variations {
            if catalog.variation_index.contains_key(&row.id) {
                return Err(CatalogError::DuplicateVariation(row.id));
            }
            let Some(&(a, t)) = catalog.ticket_index.get(&row.ticket_id) else {
                return Err(CatalogError::OrphanVariation {
                    variation: row.id,
                    ticket: row.ticket_id,
                });
            };
            let owner = &mut catalog.artists[a].tickets[t];
            catalog
                .variation_index
                .insert(row.id, (a, t, owner.variations.len()));
            owner.variations.push(Variation {
                id: row.id,
                name: row.name,
                ticket_id: row.ticket_id,
            });
        }

        Ok(catalog)
    }

    /// All artists, ordered by id.
    #[must_use]
    pub fn artists(&self) -> &[Artist] {
        &self.artists
    }

    /// Look up an artist.
    #[must_use]
    pub fn artist(&self, id: ArtistId) -> Option<&Artist> {
        self.artist_index.get(&id).map(|&a| &self.artists[a])
    }

    /// Look up a ticket.
    #[must_use]
    pub fn ticket(&self, id: TicketId) -> Option<&Ticket> {
        self.ticket_index
            .get(&id)
            .map(|&(a, t)| &self.artists[a].tickets[t])
    }

    /// Look up a variation with its owners.
    #[must_use]
    pub fn variation(&self, id: VariationId) -> Option<VariationPath<'_>> {
        self.variation_index.get(&id).map(|&(a, t, v)| {
            let artist = &self.artists[a];
            let ticket = &artist.tickets[t];
            VariationPath {
                artist,
                ticket,
                variation: &ticket.variations[v],
            }
        })
    }

    /// Whether the variation exists.
    #[must_use]
    pub fn contains_variation(&self, id: VariationId) -> bool {
        self.variation_index.contains_key(&id)
    }

    /// Every ticket, in artist then ticket order.
    pub fn tickets(&self) -> impl Iterator<Item = &Ticket> {
        self.artists.iter().flat_map(|a| a.tickets.iter())
    }

    /// Number of variations in the catalog.
    #[must_use]
    pub fn variation_count(&self) -> usize {
        self.variation_index.len()
    }
}
