//! # Deck geometry
//!
//! Converts a (deck, slot) address into motion controller coordinates. Each deck sits at a fixed
//! Y offset. Along X a deck is split into quadrants, each with its own starting offset, and slots
//! follow one another at a fixed width from the quadrant start. Sell-thru slots ignore the slot
//! width and use a fixed offset within their quadrant instead.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use std::ops::RangeInclusive;

// Internal
use crate::params::DeckParams;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Quadrant offset used when a deck lists no quadrants.
///
/// Units: steps
const DEFAULT_QUADRANT_OFFSET: i32 = 780;

/// Offset of a sell-thru slot when the deck does not give one.
///
/// Units: steps
const DEFAULT_SELL_THRU_OFFSET: i32 = 915;

const DENSE_DECK_SLOTS: i32 = 90;
const SLOTS_PER_QUADRANT_DENSE: i32 = 15;
const SLOTS_PER_QUADRANT_SPARSE: i32 = 6;

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// Lookup of deck geometry by deck number.
pub trait DeckGeometry: Send + Sync {
    /// All decks, ordered by number.
    fn decks(&self) -> &[Deck];

    fn get_by_number(&self, number: i32) -> Option<&Deck> {
        self.decks().iter().find(|d| d.number == number)
    }

    /// The deck carrying the QLM, if there is one.
    fn qlm_deck(&self) -> Option<&Deck> {
        self.decks().iter().find(|d| d.is_qlm)
    }

    /// Whether (deck, slot) addresses a real slot.
    fn is_valid_location(&self, deck: i32, slot: i32) -> bool {
        self.get_by_number(deck)
            .map(|d| d.is_slot_valid(slot))
            .unwrap_or(false)
    }
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Quadrant {
    /// Units: steps
    pub offset: i32,

    /// Slots belonging to this quadrant, if configured.
    pub slots: Option<RangeInclusive<i32>>,

    pub excluded: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Deck {
    pub number: i32,

    /// Units: steps
    pub y_offset: i32,

    pub is_qlm: bool,
    pub number_of_slots: i32,

    /// Units: steps
    pub slot_width: f64,

    pub sell_thru_slots: Option<i32>,
    pub sell_thru_offset: Option<i32>,
    pub quadrants: Vec<Quadrant>,
    pub slots_per_quadrant: i32,
}

/// Deck geometry built from the parameter file.
#[derive(Debug, Clone)]
pub struct DeckTable {
    decks: Vec<Deck>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum DeckError {
    #[error("The slot parameter must be between 1 and {1}, got {0}")]
    SlotOutOfRange(i32, i32),

    #[error(
        "The computed quadrant {0} is outside the range of defined quadrants, the deck is \
        incorrectly configured"
    )]
    QuadrantOutOfRange(i32),

    #[error("Only one QLM deck is allowed per configuration")]
    MultipleQlmDecks,

    #[error("Deck {0} has no slots")]
    NoSlots(i32),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Deck {
    /// Build a deck from its parameters. Quadrants without an explicit slot range take
    /// consecutive runs of 15 slots on a 90 slot deck, or 6 otherwise.
    pub fn from_params(params: &DeckParams) -> Result<Self, DeckError> {
        if params.number_of_slots <= 0 {
            return Err(DeckError::NoSlots(params.number));
        }

        let run = if params.number_of_slots == DENSE_DECK_SLOTS {
            SLOTS_PER_QUADRANT_DENSE
        } else {
            SLOTS_PER_QUADRANT_SPARSE
        };

        let mut quadrants: Vec<Quadrant> = params
            .quadrants
            .iter()
            .enumerate()
            .map(|(i, q)| {
                let slots = match (q.start_slot, q.end_slot) {
                    (Some(s), Some(e)) => s..=e,
                    _ => {
                        let start = i as i32 * run + 1;
                        start..=(start + run - 1)
                    }
                };
                Quadrant {
                    offset: q.offset,
                    slots: Some(slots),
                    excluded: q.excluded,
                }
            })
            .collect();

        if quadrants.is_empty() {
            quadrants.push(Quadrant {
                offset: DEFAULT_QUADRANT_OFFSET,
                slots: None,
                excluded: false,
            });
        }

        let slots_per_quadrant = (params.number_of_slots / quadrants.len() as i32).max(1);

        Ok(Self {
            number: params.number,
            y_offset: params.y_offset,
            is_qlm: params.is_qlm,
            number_of_slots: params.number_of_slots,
            slot_width: params.slot_width,
            sell_thru_slots: params.sell_thru_slots,
            sell_thru_offset: params.sell_thru_offset,
            quadrants,
            slots_per_quadrant,
        })
    }

    pub fn is_slot_valid(&self, slot: i32) -> bool {
        slot >= 1 && slot <= self.number_of_slots
    }

    pub fn is_sell_thru(&self, slot: i32) -> bool {
        match self.sell_thru_slots {
            Some(n) if n > 0 => slot % n == 0,
            _ => false,
        }
    }

    /// Whether the slot lies in an excluded quadrant.
    pub fn is_excluded(&self, slot: i32) -> bool {
        self.quadrant_index(slot)
            .ok()
            .and_then(|i| self.quadrants.get(i))
            .map(|q| q.excluded)
            .unwrap_or(false)
    }

    /// X coordinate of a slot.
    ///
    /// Units: steps
    pub fn get_slot_offset(&self, slot: i32) -> Result<i32, DeckError> {
        let index = self.quadrant_index(slot)?;
        let mut offset = self.quadrants[index].offset;
        let mut position = (slot - 1) % self.slots_per_quadrant;

        if let Some(q) = self.quadrant_containing(slot) {
            if let Some(range) = &q.slots {
                position = slot - range.start();
            }
            offset = q.offset;
        }

        let width = if self.is_sell_thru(slot) {
            self.sell_thru_offset.unwrap_or(DEFAULT_SELL_THRU_OFFSET) as f64
        } else {
            position as f64 * self.slot_width
        };

        Ok((offset as f64 + width) as i32)
    }

    fn quadrant_index(&self, slot: i32) -> Result<usize, DeckError> {
        if !self.is_slot_valid(slot) {
            return Err(DeckError::SlotOutOfRange(slot, self.number_of_slots));
        }

        let index = (slot - 1) / self.slots_per_quadrant;
        if index as usize >= self.quadrants.len() {
            return Err(DeckError::QuadrantOutOfRange(index));
        }

        Ok(index as usize)
    }

    /// The first quadrant whose configured range holds `slot`. The search stops at the first
    /// quadrant without a range.
    fn quadrant_containing(&self, slot: i32) -> Option<&Quadrant> {
        for q in &self.quadrants {
            match &q.slots {
                Some(r) if r.contains(&slot) => return Some(q),
                Some(_) => continue,
                None => return None,
            }
        }
        None
    }
}

impl DeckTable {
    /// Build the table, sorted by deck number.
    pub fn new(params: &[DeckParams]) -> Result<Self, DeckError> {
        let mut decks = Vec::with_capacity(params.len());
        for p in params {
            let deck = Deck::from_params(p)?;
            if deck.is_qlm && decks.iter().any(|d: &Deck| d.is_qlm) {
                return Err(DeckError::MultipleQlmDecks);
            }
            decks.push(deck);
        }

        decks.sort_by_key(|d| d.number);
        Ok(Self { decks })
    }
}

impl DeckGeometry for DeckTable {
    fn decks(&self) -> &[Deck] {
        &self.decks
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::params::QuadrantParams;

    fn quadrants(offsets: &[i32]) -> Vec<QuadrantParams> {
        offsets
            .iter()
            .map(|o| QuadrantParams {
                offset: *o,
                ..Default::default()
            })
            .collect()
    }

    #[test]
    fn test_single_default_quadrant() {
        let deck = Deck::from_params(&DeckParams::default()).unwrap();
        assert_eq!(deck.slots_per_quadrant, 90);
        assert_eq!(deck.get_slot_offset(1), Ok(780));
        assert_eq!(deck.get_slot_offset(2), Ok(946));
        assert_eq!(deck.get_slot_offset(91), Err(DeckError::SlotOutOfRange(91, 90)));
        assert_eq!(deck.get_slot_offset(0), Err(DeckError::SlotOutOfRange(0, 90)));
    }

    #[test]
    fn test_quadrant_runs() {
        let deck = Deck::from_params(&DeckParams {
            quadrants: quadrants(&[780, 4000, 7200, 10400, 13600, 16800]),
            ..Default::default()
        })
        .unwrap();

        assert_eq!(deck.slots_per_quadrant, 15);
        assert_eq!(deck.get_slot_offset(15), Ok(780 + 2333));
        assert_eq!(deck.get_slot_offset(16), Ok(4000));
        assert_eq!(deck.get_slot_offset(90), Ok(16800 + 2333));
    }

    #[test]
    fn test_sell_thru_and_excluded() {
        let mut q = quadrants(&[780, 2000]);
        q[1].excluded = true;
        let deck = Deck::from_params(&DeckParams {
            number_of_slots: 12,
            sell_thru_slots: Some(6),
            quadrants: q,
            ..Default::default()
        })
        .unwrap();

        assert_eq!(deck.get_slot_offset(6), Ok(780 + 915));
        assert_eq!(deck.get_slot_offset(7), Ok(2000));
        assert!(deck.is_sell_thru(12));
        assert!(!deck.is_excluded(3));
        assert!(deck.is_excluded(8));
    }

    #[test]
    fn test_table() {
        let table = DeckTable::new(&[
            DeckParams {
                number: 2,
                ..Default::default()
            },
            DeckParams {
                number: 1,
                is_qlm: true,
                ..Default::default()
            },
        ])
        .unwrap();

        assert_eq!(table.decks()[0].number, 1);
        assert_eq!(table.qlm_deck().map(|d| d.number), Some(1));
        assert!(table.is_valid_location(2, 90));
        assert!(!table.is_valid_location(3, 1));

        let two_qlm = DeckTable::new(&[
            DeckParams {
                is_qlm: true,
                ..Default::default()
            },
            DeckParams {
                number: 2,
                is_qlm: true,
                ..Default::default()
            },
        ]);
        assert_eq!(two_qlm.err(), Some(DeckError::MultipleQlmDecks));
    }
}
