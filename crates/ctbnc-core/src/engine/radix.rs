//! Mixed-radix parent-configuration codec.
//!
//! A parent configuration is encoded as `Σ s_i · m_i` where `s_i` is the
//! state of the i-th attached parent and `m_i` is the product of the
//! cardinalities of the parents attached before it (`m_0 = 1`). The codec is
//! rebuilt from scratch whenever the parent list changes.

use smallvec::SmallVec;

use crate::engine::errors::CtbnError;

pub type Digits = SmallVec<[usize; 4]>;

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ParentRadix {
    cardinalities: Digits,
    multipliers: Digits,
    entries: usize,
}

impl Default for ParentRadix {
    fn default() -> Self {
        Self::new(&[])
    }
}

impl ParentRadix {
    /// Builds the codec for parents with the given cardinalities, in
    /// attachment order.
    pub fn new(cardinalities: &[usize]) -> Self {
        let mut multipliers = Digits::with_capacity(cardinalities.len());
        let mut entries = 1usize;
        for &card in cardinalities {
            multipliers.push(entries);
            entries = entries.saturating_mul(card);
        }
        Self {
            cardinalities: cardinalities.iter().copied().collect(),
            multipliers,
            entries,
        }
    }

    /// Number of distinct parent configurations (1 with no parents).
    pub fn entries(&self) -> usize {
        self.entries
    }

    pub fn arity(&self) -> usize {
        self.cardinalities.len()
    }

    pub fn cardinalities(&self) -> &[usize] {
        &self.cardinalities
    }

    pub fn multipliers(&self) -> &[usize] {
        &self.multipliers
    }

    pub fn encode(&self, states: &[usize]) -> Result<usize, CtbnError> {
        if states.len() != self.arity() {
            return Err(CtbnError::Invariant(format!(
                "parent configuration has {} states, expected {}",
                states.len(),
                self.arity()
            )));
        }
        let mut entry = 0usize;
        for (i, (&state, &card)) in states.iter().zip(&self.cardinalities).enumerate() {
            if state >= card {
                return Err(CtbnError::Invariant(format!(
                    "parent #{} state {} out of range for cardinality {}",
                    i, state, card
                )));
            }
            entry += state * self.multipliers[i];
        }
        Ok(entry)
    }

    /// Inverse of [`encode`](Self::encode): peels digits from the
    /// last-attached parent down to the first.
    pub fn decode(&self, entry: usize) -> Result<Digits, CtbnError> {
        if entry >= self.entries {
            return Err(CtbnError::Invariant(format!(
                "parent entry {} out of range [0, {})",
                entry, self.entries
            )));
        }
        let mut digits: Digits = SmallVec::from_elem(0, self.arity());
        let mut rem = entry;
        for i in (0..self.arity()).rev() {
            digits[i] = rem / self.multipliers[i];
            rem %= self.multipliers[i];
        }
        Ok(digits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_parent_has_unit_multiplier() {
        let radix = ParentRadix::new(&[3, 2, 4]);
        assert_eq!(radix.multipliers(), &[1, 3, 6]);
        assert_eq!(radix.entries(), 24);
        assert_eq!(radix.encode(&[2, 1, 3]).expect("encode"), 2 + 3 + 18);
    }

    #[test]
    fn no_parents_has_single_entry() {
        let radix = ParentRadix::default();
        assert_eq!(radix.entries(), 1);
        assert_eq!(radix.encode(&[]).expect("encode"), 0);
        assert!(radix.decode(0).expect("decode").is_empty());
    }

    #[test]
    fn decode_inverts_encode_for_every_entry() {
        let radix = ParentRadix::new(&[2, 3, 2]);
        for entry in 0..radix.entries() {
            let digits = radix.decode(entry).expect("decode");
            assert_eq!(radix.encode(&digits).expect("encode"), entry);
        }
    }

    #[test]
    fn out_of_range_inputs_are_rejected() {
        let radix = ParentRadix::new(&[2, 2]);
        assert!(radix.encode(&[2, 0]).is_err());
        assert!(radix.encode(&[0]).is_err());
        assert!(radix.decode(4).is_err());
    }
}
