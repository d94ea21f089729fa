// level.rs — the immutable level model
//
// Holds everything the loader hands over at level spawn: the plane array,
// the render BSP (nodes + leafs, used for PVS membership and the derived
// point hull), the pre-expanded clip-node trees for the box hull classes,
// the compressed visibility data, and the inline submodels. Built once,
// read-only afterwards; every query during the tick walks these arrays
// without mutating them.

use crate::math::{dot_product, Plane, Vec3};
use rayon::prelude::*;

// ============================================================
// Content codes
// ============================================================

// negative terminals in clip trees and leaf contents
pub const CONTENTS_EMPTY: i32 = -1;
pub const CONTENTS_SOLID: i32 = -2;
pub const CONTENTS_WATER: i32 = -3;
pub const CONTENTS_SLIME: i32 = -4;
pub const CONTENTS_LAVA: i32 = -5;
pub const CONTENTS_SKY: i32 = -6;
pub const CONTENTS_ORIGIN: i32 = -7; // removed at level-build time
pub const CONTENTS_CLIP: i32 = -8; // changed to CONTENTS_SOLID at level-build time

pub const CONTENTS_CURRENT_0: i32 = -9;
pub const CONTENTS_CURRENT_90: i32 = -10;
pub const CONTENTS_CURRENT_180: i32 = -11;
pub const CONTENTS_CURRENT_270: i32 = -12;
pub const CONTENTS_CURRENT_UP: i32 = -13;
pub const CONTENTS_CURRENT_DOWN: i32 = -14;

/// True for any content code a clip-tree terminal may legally carry.
pub fn is_content_code(code: i32) -> bool {
    (CONTENTS_CURRENT_DOWN..=CONTENTS_EMPTY).contains(&code)
}

// ============================================================
// Design limits
// ============================================================

pub const MAX_MAP_PLANES: usize = 32767;
pub const MAX_MAP_NODES: usize = 32767;
pub const MAX_MAP_LEAFS: usize = 8192;
pub const MAX_MAP_CLIPNODES: usize = 32767;
pub const MAX_MAP_MODELS: usize = 256;
pub const MAX_MAP_VISIBILITY: usize = 0x100000;

/// Parallel threshold for load-time array derivation. Below this count the
/// sequential path is faster.
const PARALLEL_LUMP_THRESHOLD: usize = 64;

// ============================================================
// Hull classes
// ============================================================

pub const HULL_POINT: usize = 0;
pub const HULL_STAND: usize = 1;
pub const HULL_LARGE: usize = 2;
pub const HULL_CROUCH: usize = 3;
pub const MAX_HULLS: usize = 4;

/// Half-extent pairs the standard hull classes were expanded by at
/// level-build time. Levels carry their own copy; this is the default set.
pub const STANDARD_HULL_SIZES: [[Vec3; 2]; MAX_HULLS] = [
    [[0.0, 0.0, 0.0], [0.0, 0.0, 0.0]],
    [[-16.0, -16.0, -24.0], [16.0, 16.0, 32.0]],
    [[-32.0, -32.0, -24.0], [32.0, 32.0, 64.0]],
    [[-16.0, -16.0, -12.0], [16.0, 16.0, 16.0]],
];

// ============================================================
// Tree structures
// ============================================================

/// Collision tree node. A negative child is a terminal content code.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClipNode {
    pub plane_idx: usize,
    pub children: [i32; 2],
}

/// Render tree node. A negative child c refers to leaf (-1 - c).
#[derive(Debug, Clone, Copy, Default)]
pub struct RenderNode {
    pub plane_idx: usize,
    pub children: [i32; 2],
}

#[derive(Debug, Clone, Copy)]
pub struct RenderLeaf {
    pub contents: i32,
    /// byte offset into the visibility data, -1 = no data (all visible)
    pub visofs: i32,
}

impl Default for RenderLeaf {
    fn default() -> Self {
        Self {
            contents: CONTENTS_SOLID,
            visofs: -1,
        }
    }
}

/// An inline brush model: the world itself (submodel 0) plus doors, plats
/// and other level geometry that moves as a unit.
#[derive(Debug, Clone, Copy)]
pub struct SubModel {
    pub mins: Vec3,
    pub maxs: Vec3,
    pub origin: Vec3,
    /// root node per hull class; index 0 is into the derived point hull
    pub headnode: [i32; MAX_HULLS],
}

impl Default for SubModel {
    fn default() -> Self {
        Self {
            mins: [0.0; 3],
            maxs: [0.0; 3],
            origin: [0.0; 3],
            headnode: [0; MAX_HULLS],
        }
    }
}

// ============================================================
// Loader handoff
// ============================================================

/// Everything the external loader decodes out of the level file. Plane
/// type and sign bits are derived here, not by the loader.
pub struct LevelInput {
    pub planes: Vec<(Vec3, f32)>,
    pub nodes: Vec<RenderNode>,
    pub leafs: Vec<RenderLeaf>,
    pub clipnodes: Vec<ClipNode>,
    pub hull_bounds: [[Vec3; 2]; MAX_HULLS],
    pub visdata: Vec<u8>,
    pub submodels: Vec<SubModel>,
    /// authored entity count, used to size the edict pool
    pub entity_estimate: usize,
}

// ============================================================
// Level model
// ============================================================

pub struct LevelModel {
    pub planes: Vec<Plane>,
    pub nodes: Vec<RenderNode>,
    pub leafs: Vec<RenderLeaf>,
    /// shared clip-node array for the expanded hull classes
    pub clipnodes: Vec<ClipNode>,
    /// point hull, cloned 1:1 from the render tree topology
    pub point_clipnodes: Vec<ClipNode>,
    pub hull_bounds: [[Vec3; 2]; MAX_HULLS],
    pub visdata: Vec<u8>,
    pub submodels: Vec<SubModel>,
    pub entity_estimate: usize,
    /// CRC over plane and clip-node data, recorded for playback identity
    pub checksum: u16,
}

impl LevelModel {
    /// Builds the runtime level model from loader output. Malformed data is
    /// fatal here; nothing after level spawn re-validates.
    pub fn build(input: LevelInput) -> LevelModel {
        let LevelInput {
            planes: raw_planes,
            nodes,
            leafs,
            clipnodes,
            hull_bounds,
            visdata,
            submodels,
            entity_estimate,
        } = input;

        if raw_planes.is_empty() {
            panic!("LevelModel: level with no planes");
        }
        if raw_planes.len() > MAX_MAP_PLANES {
            panic!("LevelModel: level has too many planes");
        }
        if nodes.is_empty() {
            panic!("LevelModel: level with no nodes");
        }
        if nodes.len() > MAX_MAP_NODES {
            panic!("LevelModel: level has too many nodes");
        }
        if leafs.is_empty() {
            panic!("LevelModel: level with no leafs");
        }
        if leafs.len() > MAX_MAP_LEAFS {
            panic!("LevelModel: level has too many leafs");
        }
        if clipnodes.len() > MAX_MAP_CLIPNODES {
            panic!("LevelModel: level has too many clipnodes");
        }
        if submodels.is_empty() {
            panic!("LevelModel: level with no models");
        }
        if submodels.len() > MAX_MAP_MODELS {
            panic!("LevelModel: level has too many models");
        }
        if visdata.len() > MAX_MAP_VISIBILITY {
            panic!("LevelModel: level has too large a visibility lump");
        }
        if leafs[0].contents != CONTENTS_SOLID {
            panic!("LevelModel: leaf 0 is not CONTENTS_SOLID");
        }

        // derive plane type and sign bits
        let planes: Vec<Plane> = if raw_planes.len() >= PARALLEL_LUMP_THRESHOLD {
            raw_planes
                .into_par_iter()
                .map(|(normal, dist)| Plane::new(normal, dist))
                .collect()
        } else {
            raw_planes
                .into_iter()
                .map(|(normal, dist)| Plane::new(normal, dist))
                .collect()
        };

        // validate the render tree
        for (i, node) in nodes.iter().enumerate() {
            if node.plane_idx >= planes.len() {
                panic!("LevelModel: render node {} has a bad plane index", i);
            }
            for &c in &node.children {
                if c >= 0 {
                    if c as usize >= nodes.len() {
                        panic!("LevelModel: render node {} has a bad child", i);
                    }
                } else if (-1 - c) as usize >= leafs.len() {
                    panic!("LevelModel: render node {} has a bad leaf child", i);
                }
            }
        }

        // validate the clip trees
        for (i, cn) in clipnodes.iter().enumerate() {
            if cn.plane_idx >= planes.len() {
                panic!("LevelModel: clipnode {} has a bad plane index", i);
            }
            for &c in &cn.children {
                if c >= 0 {
                    if c as usize >= clipnodes.len() {
                        panic!("LevelModel: clipnode {} has a bad child", i);
                    }
                } else if !is_content_code(c) {
                    panic!("LevelModel: clipnode {} has a bad content code {}", i, c);
                }
            }
        }

        for (m, sub) in submodels.iter().enumerate() {
            if sub.headnode[HULL_POINT] >= 0 && sub.headnode[HULL_POINT] as usize >= nodes.len() {
                panic!("LevelModel: model {} has a bad render headnode", m);
            }
            for h in 1..MAX_HULLS {
                if sub.headnode[h] >= 0 && sub.headnode[h] as usize >= clipnodes.len() {
                    panic!("LevelModel: model {} has a bad hull {} headnode", m, h);
                }
            }
            check_acyclic(&clipnodes, sub.headnode[1..].iter().copied(), m);
        }

        // clone the render topology into clip-node form for the point hull
        let point_clipnodes = make_point_hull(&nodes, &leafs);

        let checksum = level_checksum(&planes, &clipnodes);

        LevelModel {
            planes,
            nodes,
            leafs,
            clipnodes,
            point_clipnodes,
            hull_bounds,
            visdata,
            submodels,
            entity_estimate,
            checksum,
        }
    }

    pub fn num_leafs(&self) -> usize {
        self.leafs.len()
    }

    pub fn submodel(&self, idx: usize) -> &SubModel {
        if idx >= self.submodels.len() {
            panic!("LevelModel: bad submodel number {}", idx);
        }
        &self.submodels[idx]
    }

    /// Walks the render tree of submodel 0 down to the leaf containing the
    /// point. Used for PVS membership, never for collision.
    pub fn leaf_for_point(&self, p: &Vec3) -> usize {
        let mut num = self.submodels[0].headnode[HULL_POINT];
        loop {
            let node = &self.nodes[num as usize];
            let plane = &self.planes[node.plane_idx];
            let d = if (plane.plane_type as usize) < 3 {
                p[plane.plane_type as usize] - plane.dist
            } else {
                dot_product(p, &plane.normal) - plane.dist
            };
            num = if d > 0.0 {
                node.children[0]
            } else {
                node.children[1]
            };
            if num < 0 {
                return (-1 - num) as usize;
            }
        }
    }
}

// ============================================================
// Point hull derivation
// ============================================================

// The point hull is the render tree cloned 1:1 into clip-node form, with
// leaf children replaced by their content codes.
fn make_point_hull(nodes: &[RenderNode], leafs: &[RenderLeaf]) -> Vec<ClipNode> {
    let clone_node = |node: &RenderNode| -> ClipNode {
        let mut out = ClipNode {
            plane_idx: node.plane_idx,
            children: [0; 2],
        };
        for j in 0..2 {
            let c = node.children[j];
            out.children[j] = if c >= 0 {
                c
            } else {
                leafs[(-1 - c) as usize].contents
            };
        }
        out
    };

    if nodes.len() >= PARALLEL_LUMP_THRESHOLD {
        nodes.par_iter().map(clone_node).collect()
    } else {
        nodes.iter().map(clone_node).collect()
    }
}

// ============================================================
// Cycle check
// ============================================================

// Clip trees must never lead back toward their root. Queries rely on this
// and do not re-check it, so a cycle here is fatal at load.
fn check_acyclic(clipnodes: &[ClipNode], roots: impl Iterator<Item = i32>, model: usize) {
    const UNSEEN: u8 = 0;
    const OPEN: u8 = 1;
    const DONE: u8 = 2;

    for root in roots {
        if root < 0 {
            continue;
        }
        let mut state = vec![UNSEEN; clipnodes.len()];
        // (node, next child to visit)
        let mut stack: Vec<(usize, usize)> = vec![(root as usize, 0)];
        state[root as usize] = OPEN;

        while let Some(top) = stack.last_mut() {
            let (num, child) = (top.0, top.1);
            if child == 2 {
                state[num] = DONE;
                stack.pop();
                continue;
            }
            top.1 += 1;
            let c = clipnodes[num].children[child];
            if c < 0 {
                continue;
            }
            match state[c as usize] {
                OPEN => panic!(
                    "LevelModel: model {} clip tree has a cycle at node {}",
                    model, c
                ),
                UNSEEN => {
                    state[c as usize] = OPEN;
                    stack.push((c as usize, 0));
                }
                _ => {}
            }
        }
    }
}

// ============================================================
// Checksum
// ============================================================

const LEVEL_CRC: crc::Crc<u16> = crc::Crc::<u16>::new(&crc::CRC_16_XMODEM);

fn level_checksum(planes: &[Plane], clipnodes: &[ClipNode]) -> u16 {
    let mut digest = LEVEL_CRC.digest();
    for p in planes {
        for &n in &p.normal {
            digest.update(&n.to_le_bytes());
        }
        digest.update(&p.dist.to_le_bytes());
    }
    for cn in clipnodes {
        digest.update(&(cn.plane_idx as u32).to_le_bytes());
        digest.update(&cn.children[0].to_le_bytes());
        digest.update(&cn.children[1].to_le_bytes());
    }
    digest.finalize()
}

// ============================================================
// Tests
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;

    // single horizontal split: everything above z=0 empty, below solid
    fn one_plane_input() -> LevelInput {
        LevelInput {
            planes: vec![([0.0, 0.0, 1.0], 0.0)],
            nodes: vec![RenderNode {
                plane_idx: 0,
                children: [-2, -1], // front: leaf 1 (empty), back: leaf 0 (solid)
            }],
            leafs: vec![
                RenderLeaf {
                    contents: CONTENTS_SOLID,
                    visofs: -1,
                },
                RenderLeaf {
                    contents: CONTENTS_EMPTY,
                    visofs: -1,
                },
            ],
            clipnodes: vec![ClipNode {
                plane_idx: 0,
                children: [CONTENTS_EMPTY, CONTENTS_SOLID],
            }],
            hull_bounds: STANDARD_HULL_SIZES,
            visdata: Vec::new(),
            submodels: vec![SubModel {
                mins: [-4096.0; 3],
                maxs: [4096.0; 3],
                origin: [0.0; 3],
                headnode: [0, 0, 0, 0],
            }],
            entity_estimate: 16,
        }
    }

    #[test]
    fn build_one_plane_level() {
        let level = LevelModel::build(one_plane_input());
        assert_eq!(level.planes.len(), 1);
        assert_eq!(level.point_clipnodes.len(), 1);
        assert_eq!(level.num_leafs(), 2);
    }

    #[test]
    fn point_hull_clones_topology() {
        let level = LevelModel::build(one_plane_input());
        let cn = &level.point_clipnodes[0];
        assert_eq!(cn.plane_idx, 0);
        // render children were leafs, clip children are their contents
        assert_eq!(cn.children[0], CONTENTS_EMPTY);
        assert_eq!(cn.children[1], CONTENTS_SOLID);
    }

    #[test]
    fn leaf_for_point_classifies_sides() {
        let level = LevelModel::build(one_plane_input());
        assert_eq!(level.leaf_for_point(&[0.0, 0.0, 10.0]), 1);
        assert_eq!(level.leaf_for_point(&[0.0, 0.0, -10.0]), 0);
    }

    #[test]
    fn checksum_is_stable_and_content_sensitive() {
        let a = LevelModel::build(one_plane_input());
        let b = LevelModel::build(one_plane_input());
        assert_eq!(a.checksum, b.checksum);

        let mut input = one_plane_input();
        input.planes[0].1 = 64.0;
        let c = LevelModel::build(input);
        assert_ne!(a.checksum, c.checksum);
    }

    #[test]
    #[should_panic(expected = "leaf 0 is not CONTENTS_SOLID")]
    fn build_rejects_nonsolid_leaf_zero() {
        let mut input = one_plane_input();
        input.leafs[0].contents = CONTENTS_EMPTY;
        LevelModel::build(input);
    }

    #[test]
    #[should_panic(expected = "bad content code")]
    fn build_rejects_bad_content_code() {
        let mut input = one_plane_input();
        input.clipnodes[0].children[0] = -99;
        LevelModel::build(input);
    }

    #[test]
    #[should_panic(expected = "bad plane index")]
    fn build_rejects_bad_plane_index() {
        let mut input = one_plane_input();
        input.clipnodes[0].plane_idx = 7;
        LevelModel::build(input);
    }

    #[test]
    #[should_panic(expected = "has a cycle")]
    fn build_rejects_cyclic_clip_tree() {
        let mut input = one_plane_input();
        input.planes.push(([1.0, 0.0, 0.0], 0.0));
        input.clipnodes = vec![
            ClipNode {
                plane_idx: 0,
                children: [1, CONTENTS_SOLID],
            },
            ClipNode {
                plane_idx: 1,
                children: [0, CONTENTS_EMPTY], // back edge to the root
            },
        ];
        LevelModel::build(input);
    }

    #[test]
    #[should_panic(expected = "level with no models")]
    fn build_rejects_empty_submodels() {
        let mut input = one_plane_input();
        input.submodels.clear();
        LevelModel::build(input);
    }

    #[test]
    fn is_content_code_range() {
        assert!(is_content_code(CONTENTS_EMPTY));
        assert!(is_content_code(CONTENTS_SKY));
        assert!(is_content_code(CONTENTS_CURRENT_DOWN));
        assert!(!is_content_code(0));
        assert!(!is_content_code(-15));
    }
}
