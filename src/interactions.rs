//! Per-type force coefficients and the channel for editing them at runtime.
//!
//! Each entry scales the inverse-square pull between one ordered pair of
//! types: positive values attract, negative values repel, zero disables the
//! pair.
//!
//! The matrix is deliberately **not symmetric**: entry `(a, b)` is the
//! coefficient a particle of type `a` receives from a neighbour of type `b`,
//! and `(b, a)` is configured independently.
//!
//! # Example
//!
//! ```ignore
//! #[derive(ParticleType, Clone, Copy)]
//! enum Species { Red, Green, Blue }
//!
//! let mut m = InteractionMatrix::new(Species::COUNT);
//! // Red chases Green, Green runs from Red
//! m.set(Species::Red, Species::Green, 1.0);
//! m.set(Species::Green, Species::Red, -0.5);
//!
//! // Green clumps with itself
//! m.set(Species::Green, Species::Green, 0.8);
//! ```

use serde::{Deserialize, Serialize};
use std::sync::mpsc::{Receiver, Sender};

/// One matrix entry as supplied by rule data.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct InteractionRule {
    /// Type that receives the force.
    pub source: usize,
    /// Type that exerts it.
    pub target: usize,
    /// Positive attracts, negative repels.
    pub strength: f32,
}

impl InteractionRule {
    pub fn new<T: Into<u32>, U: Into<u32>>(source: T, target: U, strength: f32) -> Self {
        Self {
            source: source.into() as usize,
            target: target.into() as usize,
            strength,
        }
    }
}

/// Interaction matrix storing force coefficients between particle types.
///
/// Each cell `[self_type][other_type]` holds a coefficient:
/// positive = attract, negative = repel, zero = ignore.
#[derive(Clone, Debug, PartialEq)]
pub struct InteractionMatrix {
    /// Flattened matrix: [self_type * num_types + other_type] = coefficient
    coefficients: Vec<f32>,
    /// Number of particle types.
    num_types: usize,
    /// Bumped on every successful edit.
    version: u64,
}

impl InteractionMatrix {
    /// Create a new interaction matrix for `num_types` particle types.
    ///
    /// All interactions start as ignore (coefficient 0).
    pub fn new(num_types: usize) -> Self {
        Self {
            coefficients: vec![0.0; num_types * num_types],
            num_types,
            version: 0,
        }
    }

    /// Build a matrix from rule data.
    ///
    /// Rules naming a type outside `0..num_types`, or carrying a non-finite
    /// strength, are logged and skipped; the rest of the matrix is still built.
    pub fn from_rules(num_types: usize, rules: &[InteractionRule]) -> Self {
        let mut matrix = Self::new(num_types);
        let mut rejected = 0usize;
        for rule in rules {
            if !matrix.try_set(rule.source, rule.target, rule.strength) {
                log::warn!(
                    "Ignoring interaction rule {} -> {} (strength {}): {} types configured",
                    rule.source,
                    rule.target,
                    rule.strength,
                    num_types
                );
                rejected += 1;
            }
        }
        log::debug!(
            "Built {}x{} interaction matrix from {} rules ({} rejected)",
            num_types,
            num_types,
            rules.len(),
            rejected
        );
        matrix
    }

    /// Set the coefficient `self_type` receives from `other_type`.
    ///
    /// - `strength > 0`: attraction (pulls toward)
    /// - `strength < 0`: repulsion (pushes away)
    /// - `strength = 0`: ignore
    ///
    /// Out-of-range indices are ignored.
    ///
    /// # Example
    ///
    /// ```ignore
    /// m.set(Predator, Prey, 2.0);   // Predator attracted to Prey
    /// m.set(Prey, Predator, -3.0);  // Prey repelled by Predator
    /// ```
    pub fn set<T: Into<u32>, U: Into<u32>>(&mut self, self_type: T, other_type: U, strength: f32) {
        self.try_set(self_type.into() as usize, other_type.into() as usize, strength);
    }

    /// Set an entry by raw index. Returns `false` if the entry was rejected.
    pub fn try_set(&mut self, self_type: usize, other_type: usize, strength: f32) -> bool {
        if self_type < self.num_types && other_type < self.num_types && strength.is_finite() {
            self.coefficients[self_type * self.num_types + other_type] = strength;
            self.version += 1;
            true
        } else {
            false
        }
    }

    /// Convenience: set attraction between types.
    ///
    /// Equivalent to `set(self_type, other_type, strength.abs())`.
    pub fn attract<T: Into<u32>, U: Into<u32>>(&mut self, self_type: T, other_type: U, strength: f32) {
        self.set(self_type, other_type, strength.abs());
    }

    /// Convenience: set repulsion between types.
    ///
    /// Equivalent to `set(self_type, other_type, -strength.abs())`.
    pub fn repel<T: Into<u32>, U: Into<u32>>(&mut self, self_type: T, other_type: U, strength: f32) {
        self.set(self_type, other_type, -strength.abs());
    }

    /// Set symmetric interaction (both types affect each other the same way).
    ///
    /// Useful for mutual attraction/repulsion.
    pub fn set_symmetric<T: Into<u32> + Copy, U: Into<u32> + Copy>(
        &mut self,
        type_a: T,
        type_b: U,
        strength: f32,
    ) {
        self.set(type_a, type_b, strength);
        self.set(type_b, type_a, strength);
    }

    /// Coefficient `self_type` receives from `other_type`; 0 when out of range.
    #[inline]
    pub fn get(&self, self_type: usize, other_type: usize) -> f32 {
        if self_type < self.num_types && other_type < self.num_types {
            self.coefficients[self_type * self.num_types + other_type]
        } else {
            0.0
        }
    }

    /// Get number of types in this matrix.
    pub fn num_types(&self) -> usize {
        self.num_types
    }

    /// Edit counter, incremented on every accepted change.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Get raw row-major coefficients.
    pub fn data(&self) -> &[f32] {
        &self.coefficients
    }
}

/// Handle for queueing matrix edits from another thread.
///
/// Edits are applied by the simulation at the start of its next step, before
/// any phase reads the matrix, so a step always sees one consistent matrix.
/// Edits still queued when the simulation is (re)initialized are dropped.
#[derive(Clone, Debug)]
pub struct MatrixEditor {
    sender: Sender<InteractionRule>,
}

impl MatrixEditor {
    pub(crate) fn new(sender: Sender<InteractionRule>) -> Self {
        Self { sender }
    }

    /// Queue a change to entry `(self_type, other_type)`.
    ///
    /// Returns `false` if the simulation has been dropped.
    pub fn set<T: Into<u32>, U: Into<u32>>(&self, self_type: T, other_type: U, strength: f32) -> bool {
        self.sender
            .send(InteractionRule::new(self_type, other_type, strength))
            .is_ok()
    }
}

/// Apply every queued edit. Returns the number applied.
pub(crate) fn drain_edits(matrix: &mut InteractionMatrix, edits: &Receiver<InteractionRule>) -> usize {
    let mut applied = 0;
    for edit in edits.try_iter() {
        if matrix.try_set(edit.source, edit.target, edit.strength) {
            applied += 1;
        } else {
            log::warn!(
                "Dropping queued interaction edit {} -> {}: {} types configured",
                edit.source,
                edit.target,
                matrix.num_types()
            );
        }
    }
    applied
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn test_matrix_is_asymmetric() {
        let mut m = InteractionMatrix::new(2);
        m.set(0u32, 1u32, 1.0);
        m.set(1u32, 0u32, -0.25);
        assert_eq!(m.get(0, 1), 1.0);
        assert_eq!(m.get(1, 0), -0.25);
        assert_eq!(m.get(0, 0), 0.0);
    }

    #[test]
    fn test_from_rules_skips_out_of_range() {
        let rules = [
            InteractionRule::new(0u32, 1u32, 0.5),
            InteractionRule::new(0u32, 9u32, 3.0),
            InteractionRule::new(1u32, 1u32, f32::NAN),
        ];
        let m = InteractionMatrix::from_rules(2, &rules);
        assert_eq!(m.get(0, 1), 0.5);
        assert_eq!(m.get(1, 1), 0.0);
        assert_eq!(m.version(), 1);
    }

    #[test]
    fn test_attract_repel_signs() {
        let mut m = InteractionMatrix::new(2);
        m.attract(0u32, 1u32, -2.0);
        m.repel(1u32, 0u32, 2.0);
        assert_eq!(m.get(0, 1), 2.0);
        assert_eq!(m.get(1, 0), -2.0);
    }

    #[test]
    fn test_editor_edits_apply_on_drain() {
        let (tx, rx) = mpsc::channel();
        let editor = MatrixEditor::new(tx);
        let mut m = InteractionMatrix::new(2);

        assert!(editor.set(1u32, 0u32, 0.75));
        assert!(editor.set(5u32, 0u32, 1.0));
        assert_eq!(m.get(1, 0), 0.0);

        assert_eq!(drain_edits(&mut m, &rx), 1);
        assert_eq!(m.get(1, 0), 0.75);
    }
}
