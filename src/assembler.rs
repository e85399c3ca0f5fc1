//! Cycle assembly.
//!
//! Pairs the ordered half-cycle records of one scan unit into cycle
//! aggregates keyed by cycle index, in first-seen order. A second
//! half-cycle of the same polarity for an index invalidates that cycle.

use crate::error::{CyclerError, Result};
use crate::models::{Cycle, HalfCycle, PolarityConflict};
use std::collections::HashMap;
use tracing::{debug, warn};

#[derive(Debug)]
struct Slot {
    cycle: Cycle,
    conflict: Option<PolarityConflict>,
}

/// Result of assembling one scan unit
#[derive(Debug, Default)]
pub struct Assembled {
    /// Valid aggregates in first-seen order, partial ones included
    pub cycles: Vec<Cycle>,
    /// Cycles excluded because of a polarity collision
    pub conflicts: Vec<PolarityConflict>,
    /// Indices of returned aggregates that lack one side
    pub incomplete: Vec<u32>,
}

/// Keyed pairing of half-cycles into cycles
#[derive(Debug)]
pub struct CycleAssembler {
    origin: String,
    slots: Vec<Slot>,
    positions: HashMap<u32, usize>,
}

impl CycleAssembler {
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            slots: Vec::new(),
            positions: HashMap::new(),
        }
    }

    /// Place a half-cycle in its cycle's slot
    ///
    /// Fails with `PolarityConflict` when the slot for that polarity is already
    /// taken; the cycle is then excluded from the assembled output.
    pub fn push(&mut self, half: HalfCycle) -> Result<()> {
        let index = half.cycle_index();
        let polarity = half.polarity();

        let position = match self.positions.get(&index) {
            Some(&position) => position,
            None => {
                self.slots.push(Slot {
                    cycle: Cycle::new(index, self.origin.clone()),
                    conflict: None,
                });
                let position = self.slots.len() - 1;
                self.positions.insert(index, position);
                position
            }
        };

        let slot = &mut self.slots[position];
        let target = slot.cycle.slot_mut(polarity);

        if let Some(existing) = target.as_ref() {
            let first_path = existing.path().to_path_buf();
            let conflict = slot.conflict.get_or_insert_with(|| PolarityConflict {
                origin: self.origin.clone(),
                cycle_index: index,
                polarity,
                paths: vec![first_path],
            });
            conflict.paths.push(half.path().to_path_buf());

            return Err(CyclerError::PolarityConflict {
                origin: self.origin.clone(),
                cycle_index: index,
                polarity,
            });
        }

        debug!(
            "{}: cycle {} {} half-cycle with {} samples",
            self.origin,
            index,
            polarity,
            half.len()
        );
        *target = Some(half);
        Ok(())
    }

    /// Close the assembler, separating invalid and partial cycles
    pub fn finish(self) -> Assembled {
        let mut assembled = Assembled::default();

        for slot in self.slots {
            if let Some(conflict) = slot.conflict {
                assembled.conflicts.push(conflict);
                continue;
            }

            if let Some(missing) = slot.cycle.missing() {
                warn!(
                    "{}: cycle {} is incomplete, no {} half-cycle",
                    slot.cycle.origin, slot.cycle.index, missing
                );
                assembled.incomplete.push(slot.cycle.index);
            }
            assembled.cycles.push(slot.cycle);
        }

        assembled
    }
}

/// Assemble a whole sequence, logging every polarity conflict
pub fn assemble(origin: &str, halves: impl IntoIterator<Item = HalfCycle>) -> Assembled {
    let mut assembler = CycleAssembler::new(origin);
    for half in halves {
        let path = half.path().display().to_string();
        if let Err(e) = assembler.push(half) {
            warn!("{} (from {})", e, path);
        }
    }
    assembler.finish()
}
