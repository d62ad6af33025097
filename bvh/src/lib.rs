pub mod aabb;
pub mod bvh;
pub mod bvh_node;
pub mod curve;
pub mod error;
pub mod pack;
pub mod params;
pub mod primitive;
pub mod refit;
pub mod transform;
pub mod unaligned;
pub mod wide;

pub use crate::bvh::*;
pub use aabb::*;
pub use bvh_node::*;
pub use curve::*;
pub use error::*;
pub use pack::*;
pub use params::*;
pub use primitive::*;
pub use refit::*;
pub use transform::*;
pub use unaligned::*;
pub use wide::*;
