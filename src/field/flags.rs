use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Per-point type bitset.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct PointFlags(u8);

impl PointFlags {
    pub const NONE: PointFlags = PointFlags(0);
    /// Simulated: takes part in diffusion and counts as open space for cells.
    pub const FREE: PointFlags = PointFlags(1);
    /// Reservoir: concentration is held constant by the field update.
    pub const FIXED: PointFlags = PointFlags(1 << 1);
    /// Blocks cell movement, not diffusion.
    pub const BLOCK: PointFlags = PointFlags(1 << 2);
    /// Seed marker.
    pub const STAGE: PointFlags = PointFlags(1 << 3);

    #[inline(always)]
    pub fn bits(self) -> u8 {
        self.0
    }

    #[inline(always)]
    pub fn contains(self, other: PointFlags) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline(always)]
    pub fn intersects(self, other: PointFlags) -> bool {
        self.0 & other.0 != 0
    }

    pub fn insert(&mut self, other: PointFlags) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: PointFlags) {
        self.0 &= !other.0;
    }

    /// Free and not held fixed: the field update may write this point.
    #[inline(always)]
    pub fn is_simulated(self) -> bool {
        self.contains(PointFlags::FREE) && !self.intersects(PointFlags::FIXED)
    }
}

impl BitOr for PointFlags {
    type Output = PointFlags;
    fn bitor(self, rhs: PointFlags) -> PointFlags {
        PointFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for PointFlags {
    fn bitor_assign(&mut self, rhs: PointFlags) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for PointFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = [
            (PointFlags::FREE, "FREE"),
            (PointFlags::FIXED, "FIXED"),
            (PointFlags::BLOCK, "BLOCK"),
            (PointFlags::STAGE, "STAGE"),
        ]
        .iter()
        .filter(|(flag, _)| self.contains(*flag))
        .map(|(_, name)| *name)
        .collect();
        if names.is_empty() {
            write!(f, "NONE")
        } else {
            write!(f, "{}", names.join("|"))
        }
    }
}
