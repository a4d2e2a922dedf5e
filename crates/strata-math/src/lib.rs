//! Tiled large-world coordinates, tile rectangles and bounding boxes for the Strata terrain pipeline.

mod aabb;
mod tiled;
mod tiled_rect;

pub use aabb::{Aabb, TiledAabb};
pub use tiled::{TILE_SIZE, TiledFloat, TiledFloat3};
pub use tiled_rect::TiledRect3;
