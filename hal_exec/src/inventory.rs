//! # Inventory
//!
//! The stored contents of every deck slot. Operations only read and update locations through the
//! [`InventoryStore`] trait, persistence of the inventory belongs to the host application.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

// Internal
use crate::decks::DeckGeometry;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Identifier of a slot known to be empty.
pub const EMPTY_ID: &str = "EMPTY";

/// Identifier of a slot whose contents cannot be trusted.
pub const UNKNOWN_ID: &str = "UNKNOWN";

/// Identifiers which name a state rather than a disk.
pub const KNOWN_TOKENS: [&str; 2] = [EMPTY_ID, UNKNOWN_ID];

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// Access to the stored inventory.
pub trait InventoryStore: Send + Sync {
    /// The location at (deck, slot), `None` if it does not exist.
    fn get(&self, deck: i32, slot: i32) -> Option<Location>;

    /// Store the location. Returns `false` if the location does not exist.
    fn save(&self, location: &Location) -> bool;

    /// Find a location already holding `id`. Known tokens are never duplicates.
    fn is_barcode_duplicate(&self, id: &str) -> Option<Location>;

    /// Mark the location as empty and store it.
    fn reset(&self, location: &mut Location) -> bool {
        location.id = EMPTY_ID.to_string();
        location.flags = 0;
        location.return_date = None;
        location.stuck_count = 0;
        self.save(location)
    }
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A deck slot and what is stored in it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub deck: i32,
    pub slot: i32,

    /// Identifier of the stored disk, or one of the [`KNOWN_TOKENS`].
    pub id: String,

    /// Merchandising flags of the stored disk.
    pub flags: u32,

    pub return_date: Option<DateTime<Utc>>,
    pub excluded: bool,
    pub stuck_count: u32,

    /// A wide slot holds its disk loosely and needs it settled before a pull or push.
    pub is_wide: bool,
}

/// Inventory held in memory, one location per slot of the deck geometry.
pub struct MemoryInventory {
    locations: RwLock<BTreeMap<(i32, i32), Location>>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Location {
    /// An empty location.
    pub fn new(deck: i32, slot: i32) -> Self {
        Self {
            deck,
            slot,
            id: EMPTY_ID.to_string(),
            flags: 0,
            return_date: None,
            excluded: false,
            stuck_count: 0,
            is_wide: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.id == EMPTY_ID
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Deck = {} Slot = {}", self.deck, self.slot)
    }
}

impl MemoryInventory {
    /// Create an empty inventory covering every slot of `geometry`.
    pub fn new(geometry: &dyn DeckGeometry) -> Self {
        let mut locations = BTreeMap::new();

        for deck in geometry.decks() {
            for slot in 1..=deck.number_of_slots {
                let mut loc = Location::new(deck.number, slot);
                loc.is_wide = deck.is_sell_thru(slot);
                loc.excluded = deck.is_excluded(slot);
                locations.insert((deck.number, slot), loc);
            }
        }

        Self {
            locations: RwLock::new(locations),
        }
    }

    fn read(&self) -> RwLockReadGuard<BTreeMap<(i32, i32), Location>> {
        match self.locations.read() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<BTreeMap<(i32, i32), Location>> {
        match self.locations.write() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl InventoryStore for MemoryInventory {
    fn get(&self, deck: i32, slot: i32) -> Option<Location> {
        self.read().get(&(deck, slot)).cloned()
    }

    fn save(&self, location: &Location) -> bool {
        match self.write().get_mut(&(location.deck, location.slot)) {
            Some(l) => {
                *l = location.clone();
                true
            }
            None => false,
        }
    }

    fn is_barcode_duplicate(&self, id: &str) -> Option<Location> {
        if KNOWN_TOKENS.iter().any(|t| t.eq_ignore_ascii_case(id)) {
            return None;
        }

        self.read().values().find(|l| l.id == id).cloned()
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::decks::DeckTable;
    use crate::params::DeckParams;

    fn inventory() -> MemoryInventory {
        let table = DeckTable::new(&[DeckParams {
            number: 1,
            number_of_slots: 12,
            sell_thru_slots: Some(6),
            ..Default::default()
        }])
        .unwrap();
        MemoryInventory::new(&table)
    }

    #[test]
    fn test_get_save_reset() {
        let inv = inventory();
        assert!(inv.get(1, 13).is_none());

        let mut loc = inv.get(1, 4).unwrap();
        assert!(loc.is_empty());
        assert_eq!(loc.to_string(), "Deck = 1 Slot = 4");

        loc.id = "ABC123".into();
        loc.flags = 3;
        assert!(inv.save(&loc));
        assert_eq!(inv.get(1, 4).unwrap().id, "ABC123");

        assert!(inv.reset(&mut loc));
        let stored = inv.get(1, 4).unwrap();
        assert!(stored.is_empty());
        assert_eq!(stored.flags, 0);

        assert!(!inv.save(&Location::new(9, 1)));
    }

    #[test]
    fn test_duplicates_skip_tokens() {
        let inv = inventory();
        let mut loc = inv.get(1, 2).unwrap();
        loc.id = "ABC123".into();
        inv.save(&loc);

        assert_eq!(inv.is_barcode_duplicate("ABC123").map(|l| l.slot), Some(2));
        assert!(inv.is_barcode_duplicate("XYZ").is_none());
        assert!(inv.is_barcode_duplicate("EMPTY").is_none());
        assert!(inv.is_barcode_duplicate("unknown").is_none());
    }

    #[test]
    fn test_wide_slots() {
        let inv = inventory();
        assert!(inv.get(1, 6).unwrap().is_wide);
        assert!(!inv.get(1, 5).unwrap().is_wide);
    }
}
