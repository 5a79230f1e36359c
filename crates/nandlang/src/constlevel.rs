//! The lattice the optimizer uses to decide how aggressively a function
//! call can be folded at its call site.
//!
//! `original_source/src/function.h` defines three levels
//! (`CONST_GLOBAL, CONST_LOCAL, CONST_FUNCTION`, here renamed `Global`,
//! `Local`, `Constant`); this port adds a fourth, `Literal`, for the
//! specific case of a call whose result is not just foldable but already a
//! bare literal value once folded.

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConstantLevel {
    /// May vary from call to call; never foldable.
    Global,
    /// Fixed for the lifetime of one activation, but not statically known.
    Local,
    /// Statically known once its arguments are statically known.
    Constant,
    /// Already reduced to a bare literal value.
    Literal,
}

impl ConstantLevel {
    /// The level of a value built from several sub-values: the weakest
    /// (most "Global") of its inputs, since one non-constant input taints
    /// the whole.
    pub fn meet(self, other: ConstantLevel) -> ConstantLevel {
        self.min(other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_matches_foldability() {
        assert!(ConstantLevel::Global < ConstantLevel::Local);
        assert!(ConstantLevel::Local < ConstantLevel::Constant);
        assert!(ConstantLevel::Constant < ConstantLevel::Literal);
    }

    #[test]
    fn meet_takes_the_weaker_level() {
        assert_eq!(ConstantLevel::Constant.meet(ConstantLevel::Global), ConstantLevel::Global);
        assert_eq!(ConstantLevel::Literal.meet(ConstantLevel::Constant), ConstantLevel::Constant);
    }
}
