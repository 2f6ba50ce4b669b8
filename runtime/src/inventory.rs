//! Per-variation pools of unsold seats.
//!
//! Pools are built from the backing store's unsold stock rows and shuffled
//! independently with [`SliceRandom::shuffle`] (Fisher-Yates), so the order in
//! which seats leave a pool carries no information about their row ids.
//!
//! Only the sale engine may remove seats: [`InventoryStore::take_seat`] is
//! crate-private, and every other consumer sees counts and labels through
//! shared references.

use boxoffice_core::{Catalog, CatalogError, Seat, StockId, StockRow, VariationId};
use rand::Rng;
use rand::seq::SliceRandom;
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// The variation's pool is empty (or the variation is unknown).
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Variation {0} has no seats left")]
pub struct Exhausted(pub VariationId);

/// Unsold seats, keyed by variation.
#[derive(Debug, Default, Clone)]
pub struct InventoryStore {
    pools: HashMap<VariationId, Vec<Seat>>,
}

impl InventoryStore {
    /// Creates an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build pools for every catalog variation from unsold stock rows and
    /// shuffle each pool.
    ///
    /// Variations without stock get an empty pool.
    ///
    /// # Errors
    ///
    /// - [`CatalogError::UnknownVariation`] if a row points outside the catalog
    /// - [`CatalogError::DuplicateSeat`] if a row id repeats
    pub fn load<R: Rng + ?Sized>(
        catalog: &Catalog,
        rows: Vec<StockRow>,
        rng: &mut R,
    ) -> Result<Self, CatalogError> {
        let mut pools: HashMap<VariationId, Vec<Seat>> = catalog
            .tickets()
            .flat_map(|t| t.variations.iter())
            .map(|v| (v.id, Vec::new()))
            .collect();
        let mut seen: HashSet<StockId> = HashSet::with_capacity(rows.len());

        for row in rows {
            if !seen.insert(row.id) {
                return Err(CatalogError::DuplicateSeat(row.id));
            }
            let Some(pool) = pools.get_mut(&row.variation_id) else {
                return Err(CatalogError::UnknownVariation {
                    stock: row.id,
                    variation: row.variation_id,
                });
            };
            pool.push(Seat::new(row.id, row.seat_label));
        }

        for pool in pools.values_mut() {
            pool.shuffle(rng);
        }

        Ok(Self { pools })
    }

    /// Remove one seat from the variation's pool.
    pub(crate) fn take_seat(&mut self, variation: VariationId) -> Result<Seat, Exhausted> {
        self.pools
            .get_mut(&variation)
            .and_then(Vec::pop)
            .ok_or(Exhausted(variation))
    }

    /// Put a seat taken by [`InventoryStore::take_seat`] back on its pool.
    pub(crate) fn return_seat(&mut self, variation: VariationId, seat: Seat) {
        self.pools.entry(variation).or_default().push(seat);
    }

    /// Seats left for a variation (0 when unknown).
    #[must_use]
    pub fn remaining(&self, variation: VariationId) -> usize {
        self.pools.get(&variation).map_or(0, Vec::len)
    }

    /// Seats left across all variations.
    #[must_use]
    pub fn total_remaining(&self) -> usize {
        self.pools.values().map(Vec::len).sum()
    }

    /// The unsold seats of a variation, in pool order.
    #[must_use]
    pub fn seats(&self, variation: VariationId) -> &[Seat] {
        self.pools.get(&variation).map_or(&[], Vec::as_slice)
    }
}
