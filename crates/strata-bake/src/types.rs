use std::fmt;

/// Monotonic frame counter driving all multi-frame work.
pub type FrameIndex = u64;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }
    };
}

id_type!(
    /// A lifetime domain for device resources. Disposing an owner frees every
    /// texture and snapshot it holds, and all of its child owners.
    OwnerId,
    "owner"
);
id_type!(
    /// An off-screen render target with one surface per output format.
    RenderTargetId,
    "target"
);
id_type!(
    /// A texture copied out of a render target surface.
    TextureHandle,
    "texture"
);
id_type!(
    /// An in-flight bake pass.
    BakeTicket,
    "bake"
);
id_type!(
    /// A GPU to CPU copy of one render target surface.
    SnapshotId,
    "snapshot"
);
id_type!(
    /// A pooled baker.
    BakerId,
    "baker"
);

/// Pixel format of a render target surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SurfaceFormat {
    /// 8-bit normalized RGBA.
    Rgba8,
    /// Single 32-bit float channel.
    R32Float,
}

impl SurfaceFormat {
    pub fn bytes_per_texel(self) -> usize {
        match self {
            SurfaceFormat::Rgba8 => 4,
            SurfaceFormat::R32Float => 4,
        }
    }

    pub fn channels(self) -> usize {
        match self {
            SurfaceFormat::R32Float => 1,
            SurfaceFormat::Rgba8 => 4,
        }
    }
}

/// Progress of a dispatched bake pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BakeStatus {
    Pending,
    /// Outputs were written to the render target. Reported once; the ticket is
    /// retired afterwards.
    Completed,
    /// The pass failed. Reported once; the ticket is retired afterwards.
    Failed(String),
}
