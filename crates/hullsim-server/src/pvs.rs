// pvs.rs — fat potentially-visible sets
//
// The network layer culls entity updates against a PVS taken at the
// client's view origin. The set is "fattened": wherever the origin sits
// within 8 units of a split plane, both subtrees contribute, so head-bob
// and other small view jitter can't make entities pop in and out.

use crate::entity::Edict;
use hullsim_common::level::{LevelModel, CONTENTS_SOLID, HULL_POINT};
use hullsim_common::math::{dot_product, Vec3};

/// Reusable fat-PVS build buffer. One per client works; the row scratch
/// space is part of it so building never allocates.
pub struct FatPvs {
    buf: Vec<u8>,
    leafrow: Vec<u8>,
    fatbytes: usize,
}

impl FatPvs {
    pub fn new(level: &LevelModel) -> FatPvs {
        let fatbytes = (level.num_leafs() + 31) >> 3;
        FatPvs {
            buf: vec![0u8; fatbytes],
            leafrow: vec![0u8; fatbytes],
            fatbytes,
        }
    }

    /// Unions the visibility rows of every non-solid leaf within 8 units
    /// of the origin and returns the combined bitset.
    pub fn build<'a>(&'a mut self, level: &LevelModel, org: &Vec3) -> &'a [u8] {
        self.buf[..self.fatbytes].fill(0);
        self.add_node(level, org, level.submodels[0].headnode[HULL_POINT]);
        &self.buf[..self.fatbytes]
    }

    fn add_node(&mut self, level: &LevelModel, org: &Vec3, mut node_idx: i32) {
        loop {
            // if this is a leaf, accumulate the pvs bits
            if node_idx < 0 {
                let leaf = (-1 - node_idx) as usize;
                if level.leafs[leaf].contents != CONTENTS_SOLID {
                    level.leaf_pvs(leaf, &mut self.leafrow);
                    for i in 0..self.fatbytes {
                        self.buf[i] |= self.leafrow[i];
                    }
                }
                return;
            }

            let node = &level.nodes[node_idx as usize];
            let plane = &level.planes[node.plane_idx];
            let d = dot_product(org, &plane.normal) - plane.dist;
            if d > 8.0 {
                node_idx = node.children[0];
            } else if d < -8.0 {
                node_idx = node.children[1];
            } else {
                // go down both
                self.add_node(level, org, node.children[0]);
                node_idx = node.children[1];
            }
        }
    }
}

/// True if any of the entity's occupied leafs is marked in the bitset.
pub fn entity_in_pvs(ent: &Edict, pvs: &[u8]) -> bool {
    if ent.num_leafs < 0 {
        return true; // leaf list overflowed at link time, assume visible
    }
    for i in 0..ent.num_leafs as usize {
        let l = ent.leafnums[i] as usize;
        if pvs[l >> 3] & (1 << (l & 7)) != 0 {
            return true;
        }
    }
    false
}

// ============================================================
// Tests
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use hullsim_common::level::{
        ClipNode, LevelInput, RenderLeaf, RenderNode, SubModel, CONTENTS_EMPTY,
        STANDARD_HULL_SIZES,
    };

    // Two stacked empty leafs divided at z = 0, solid below z = -64.
    // Leaf 1 (upper) sees only itself; leaf 2 (lower) sees only itself.
    // Bit n corresponds to leaf n.
    fn two_room_level() -> LevelModel {
        // leaf 1 row: 0b0000_0010, leaf 2 row: 0b0000_0100, both literal
        let visdata = vec![0x02, 0x04];
        LevelModel::build(LevelInput {
            planes: vec![([0.0, 0.0, 1.0], 0.0), ([0.0, 0.0, 1.0], -64.0)],
            nodes: vec![
                RenderNode {
                    plane_idx: 0,
                    children: [-2, 1],
                },
                RenderNode {
                    plane_idx: 1,
                    children: [-3, -1],
                },
            ],
            leafs: vec![
                RenderLeaf {
                    contents: CONTENTS_SOLID,
                    visofs: -1,
                },
                RenderLeaf {
                    contents: CONTENTS_EMPTY,
                    visofs: 0,
                },
                RenderLeaf {
                    contents: CONTENTS_EMPTY,
                    visofs: 1,
                },
            ],
            clipnodes: vec![ClipNode {
                plane_idx: 0,
                children: [CONTENTS_EMPTY, CONTENTS_SOLID],
            }],
            hull_bounds: STANDARD_HULL_SIZES,
            visdata,
            submodels: vec![SubModel {
                mins: [-4096.0; 3],
                maxs: [4096.0; 3],
                origin: [0.0; 3],
                headnode: [0, 0, 0, 0],
            }],
            entity_estimate: 16,
        })
    }

    #[test]
    fn far_from_plane_takes_one_side() {
        let level = two_room_level();
        let mut fat = FatPvs::new(&level);

        let pvs = fat.build(&level, &[0.0, 0.0, 100.0]);
        assert_eq!(pvs[0] & 0x02, 0x02, "upper leaf visible");
        assert_eq!(pvs[0] & 0x04, 0, "lower leaf's row not unioned in");

        let pvs = fat.build(&level, &[0.0, 0.0, -32.0]);
        assert_eq!(pvs[0] & 0x04, 0x04);
        assert_eq!(pvs[0] & 0x02, 0);
    }

    #[test]
    fn near_plane_unions_both_sides() {
        let level = two_room_level();
        let mut fat = FatPvs::new(&level);
        // within 8 units of the z = 0 split
        let pvs = fat.build(&level, &[0.0, 0.0, 4.0]);
        assert_eq!(pvs[0] & 0x06, 0x06, "both rows unioned");
    }

    #[test]
    fn fat_set_is_superset_of_exact_leaf_row() {
        let level = two_room_level();
        let mut fat = FatPvs::new(&level);
        for org in [[0.0, 0.0, 6.0], [0.0, 0.0, 100.0], [0.0, 0.0, -7.9]] {
            let leaf = level.leaf_for_point(&org);
            let mut exact = vec![0u8; (level.num_leafs() + 31) >> 3];
            level.leaf_pvs(leaf, &mut exact);
            let pvs = fat.build(&level, &org).to_vec();
            for (i, &b) in exact.iter().enumerate() {
                assert_eq!(pvs[i] & b, b, "fat pvs must contain the exact row");
            }
        }
    }

    #[test]
    fn solid_leafs_contribute_nothing() {
        let level = two_room_level();
        let mut fat = FatPvs::new(&level);
        // deep in the solid, nothing within 8 units of a plane
        let pvs = fat.build(&level, &[0.0, 0.0, -100.0]);
        assert_eq!(pvs[0], 0);
    }

    #[test]
    fn entity_pvs_membership() {
        let mut ent = Edict::default();
        ent.num_leafs = 2;
        ent.leafnums[0] = 1;
        ent.leafnums[1] = 2;

        assert!(entity_in_pvs(&ent, &[0x02]));
        assert!(entity_in_pvs(&ent, &[0x04]));
        assert!(!entity_in_pvs(&ent, &[0x08]));
    }

    #[test]
    fn overflowed_leaf_list_is_always_visible() {
        let mut ent = Edict::default();
        ent.num_leafs = -1;
        assert!(entity_in_pvs(&ent, &[0x00]));
    }
}
