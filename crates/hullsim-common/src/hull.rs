// hull.rs — hull views over clip-node trees
//
// A hull is one bounding-box class of one submodel: a clip-node array, the
// root node to start from, and the half-extents the tree was expanded by.
// Hulls borrow the level model and are handed around by value; nothing
// here owns or mutates tree data.

use crate::level::{ClipNode, LevelModel, HULL_POINT, MAX_HULLS};
use crate::math::{dot_product, Plane, Vec3};
use crate::level::{CONTENTS_EMPTY, CONTENTS_SOLID};

#[derive(Clone, Copy)]
pub struct Hull<'a> {
    pub clipnodes: &'a [ClipNode],
    pub planes: &'a [Plane],
    pub firstclipnode: i32,
    pub lastclipnode: i32,
    pub clip_mins: Vec3,
    pub clip_maxs: Vec3,
}

/// Walks the hull from the given node down to a terminal and returns its
/// content code.
pub fn hull_point_contents(hull: &Hull, mut num: i32, p: &Vec3) -> i32 {
    while num >= 0 {
        if num < hull.firstclipnode || num > hull.lastclipnode {
            panic!("hull_point_contents: bad node number {}", num);
        }
        let node = &hull.clipnodes[num as usize];
        let plane = &hull.planes[node.plane_idx];
        let d = if (plane.plane_type as usize) < 3 {
            p[plane.plane_type as usize] - plane.dist
        } else {
            dot_product(&plane.normal, p) - plane.dist
        };
        num = if d < 0.0 {
            node.children[1]
        } else {
            node.children[0]
        };
    }
    num
}

impl LevelModel {
    /// Returns the hull view for one hull class of one submodel. Class 0 is
    /// the derived point hull; the others use the pre-expanded clip trees.
    pub fn hull(&self, model: usize, hull_idx: usize) -> Hull<'_> {
        if hull_idx >= MAX_HULLS {
            panic!("LevelModel: bad hull number {}", hull_idx);
        }
        let sub = self.submodel(model);
        if hull_idx == HULL_POINT {
            Hull {
                clipnodes: &self.point_clipnodes,
                planes: &self.planes,
                firstclipnode: sub.headnode[HULL_POINT],
                lastclipnode: self.point_clipnodes.len() as i32 - 1,
                clip_mins: self.hull_bounds[HULL_POINT][0],
                clip_maxs: self.hull_bounds[HULL_POINT][1],
            }
        } else {
            Hull {
                clipnodes: &self.clipnodes,
                planes: &self.planes,
                firstclipnode: sub.headnode[hull_idx],
                lastclipnode: self.clipnodes.len() as i32 - 1,
                clip_mins: self.hull_bounds[hull_idx][0],
                clip_maxs: self.hull_bounds[hull_idx][1],
            }
        }
    }
}

// ============================================================
// Box hull
// ============================================================

/// A throwaway six-plane hull enclosing a single axis-aligned box, used to
/// clip sweeps against non-BSP entities. Built on the stack per query.
pub struct BoxHull {
    clipnodes: [ClipNode; 6],
    planes: [Plane; 6],
}

impl BoxHull {
    pub fn new(mins: &Vec3, maxs: &Vec3) -> BoxHull {
        let mut clipnodes = [ClipNode::default(); 6];
        let mut planes = [Plane::default(); 6];

        for i in 0..6 {
            let side = i & 1;

            clipnodes[i].plane_idx = i;
            clipnodes[i].children[side] = CONTENTS_EMPTY;
            clipnodes[i].children[side ^ 1] = if i != 5 {
                (i + 1) as i32
            } else {
                CONTENTS_SOLID
            };

            planes[i].plane_type = (i >> 1) as u8;
            planes[i].normal = [0.0; 3];
            planes[i].normal[i >> 1] = 1.0;
            planes[i].dist = if side != 0 { mins[i >> 1] } else { maxs[i >> 1] };
        }

        BoxHull { clipnodes, planes }
    }

    pub fn hull(&self) -> Hull<'_> {
        Hull {
            clipnodes: &self.clipnodes,
            planes: &self.planes,
            firstclipnode: 0,
            lastclipnode: 5,
            clip_mins: [0.0; 3],
            clip_maxs: [0.0; 3],
        }
    }
}

// ============================================================
// Tests
// ============================================================
