pub mod mesh;
pub mod object;

pub use mesh::*;
pub use object::*;
