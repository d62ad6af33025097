use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use crate::aabb::Bounds;
use crate::wide::{pack_nodes_with_instances, PackInstances};
use crate::{
    pack_nodes, refit_nodes, Aabb, BvhParams, BvhTree, PackedBvh, PrimitiveArrays,
    PrimitiveSource, Result,
};

/// A packed BVH ready for the traversal kernel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bvh {
    pub params: BvhParams,
    pub pack: PackedBvh,
    bounds: Aabb,
}

impl Bvh {
    pub fn build(params: BvhParams, tree: &BvhTree, prims: PrimitiveArrays) -> Self {
        let pack = pack_nodes(tree, prims, &params);
        Self {
            params,
            pack,
            bounds: Self::tree_bounds(tree),
        }
    }

    /// Builds a top level BVH over object instances, `instances` provides
    /// the packed BVHs of the objects.
    pub fn build_top_level<I: PackInstances>(
        params: BvhParams,
        tree: &BvhTree,
        prims: PrimitiveArrays,
        instances: &mut I,
    ) -> Self {
        let params = params.with_top_level(true);
        let pack = pack_nodes_with_instances(tree, prims, &params, instances);
        Self {
            params,
            pack,
            bounds: Self::tree_bounds(tree),
        }
    }

    fn tree_bounds(tree: &BvhTree) -> Aabb {
        if tree.is_empty() {
            Aabb::empty()
        } else {
            tree.root().world_bounds()
        }
    }

    /// Updates bounds and visibility after the geometry moved, the
    /// primitives and the topology must be unchanged since the build.
    pub fn refit<S: PrimitiveSource>(&mut self, source: &S) {
        self.bounds = refit_nodes(&mut self.pack, source);
    }

    /// `-1` when the BVH is a single leaf, `0` otherwise.
    pub fn root_index(&self) -> i32 {
        self.pack.root_index
    }

    pub fn prim_count(&self) -> usize {
        self.pack.prims.len()
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        bincode::serialize_into(BufWriter::new(file), self)?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let bvh = bincode::deserialize_from(BufReader::new(file))?;
        Ok(bvh)
    }
}

impl Bounds for Bvh {
    fn bounds(&self) -> Aabb {
        self.bounds
    }
}
