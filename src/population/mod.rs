//! Resampling population container.
//!
//! A [`ResamplingPopulation`] holds many replicas with per-citizen copy
//! counts and family ids. Marking counts and calling
//! [`ResamplingPopulation::resample`] performs one birth/death round;
//! vacated slots are recycled rather than freed.
//!
//! [`WeightedSelector`] draws ids proportionally to weight without
//! replacement and is used to round a fractional resampling plan to an
//! exact population size.
//!
//! # References
//!
//! - Hukushima & Iba (2003), "Population Annealing and Its Application to a Spin Glass"
//! - Wang, Machta & Katzgraber (2015), "Population annealing: Theory and application in spin glasses"

mod citizen;
mod resampling;
mod selector;

pub use citizen::{Citizen, FamilyId};
pub use resampling::ResamplingPopulation;
pub use selector::WeightedSelector;
