/// Completion flags of a tile baking request.
///
/// Flags are independent: the texture pipeline and the displacement pipeline
/// advance concurrently and set their own bits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct BakingSteps(pub u8);

impl BakingSteps {
    pub const NONE: Self = Self(0);
    pub const NORMAL_MAP_READY: Self = Self(1 << 1);
    pub const ALBEDO_MAP_READY: Self = Self(1 << 2);
    /// The displacement surface is baked; its readback is pending.
    pub const DISPLACEMENT_READY: Self = Self(1 << 3);
    /// Displacement min/max were reduced from the CPU readback.
    pub const DISPLACEMENT_READBACK: Self = Self(1 << 4);
    pub const ALL_STEPS: Self = Self(
        Self::NORMAL_MAP_READY.0
            | Self::ALBEDO_MAP_READY.0
            | Self::DISPLACEMENT_READY.0
            | Self::DISPLACEMENT_READBACK.0,
    );

    /// Returns true if `self` contains all bits in `other`.
    #[must_use]
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns true once every step has completed.
    #[must_use]
    pub fn is_complete(self) -> bool {
        self == Self::ALL_STEPS
    }
}

impl std::ops::BitOr for BakingSteps {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for BakingSteps {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}
