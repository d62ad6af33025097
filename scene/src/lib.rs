pub mod objects;
pub mod scene;

pub use objects::*;
pub use scene::*;
