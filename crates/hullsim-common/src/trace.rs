// trace.rs — sweeping a hull along a line segment

use crate::console::com_dprintf;
use crate::hull::{hull_point_contents, Hull};
use crate::level::{CONTENTS_EMPTY, CONTENTS_SOLID};
use crate::math::{vector_negate, Plane, Vec3};

/// 1/32 unit, keeps crossing points off the splitting planes
pub const DIST_EPSILON: f32 = 0.03125;

/// step used to back an impact point out of solid
pub const ON_EPSILON: f32 = 0.1;

// ============================================================
// Trace
// ============================================================

#[derive(Debug, Clone)]
pub struct Trace {
    /// the entire sweep stayed inside solid; the plane is not valid
    pub allsolid: bool,
    /// the sweep started inside solid but got out
    pub startsolid: bool,
    pub inopen: bool,
    pub inwater: bool,
    /// time completed, 1.0 = didn't hit anything
    pub fraction: f32,
    pub endpos: Vec3,
    /// surface normal at impact, valid only when fraction < 1
    pub plane: Plane,
    /// entity slot the struck surface belongs to, -1 = none
    pub ent: i32,
}

impl Default for Trace {
    fn default() -> Self {
        Self {
            allsolid: false,
            startsolid: false,
            inopen: false,
            inwater: false,
            fraction: 1.0,
            endpos: [0.0; 3],
            plane: Plane::default(),
            ent: -1,
        }
    }
}

// ============================================================
// Segment clipping
// ============================================================

/// Sweeps from start to end through the hull. The result is a pure
/// function of its inputs; nothing is allocated and the hull is never
/// touched beyond reads.
pub fn hull_trace(hull: &Hull, start: &Vec3, end: &Vec3) -> Trace {
    let mut trace = Trace {
        allsolid: true,
        endpos: *end,
        ..Trace::default()
    };
    recursive_hull_check(hull, hull.firstclipnode, 0.0, 1.0, start, end, &mut trace);
    trace
}

/// Clips the segment p1..p2 against the subtree at num. Returns false once
/// an impact has been recorded; callers above stop descending.
pub fn recursive_hull_check(
    hull: &Hull,
    num: i32,
    p1f: f32,
    p2f: f32,
    p1: &Vec3,
    p2: &Vec3,
    trace: &mut Trace,
) -> bool {
    // check for empty
    if num < 0 {
        if num != CONTENTS_SOLID {
            trace.allsolid = false;
            if num == CONTENTS_EMPTY {
                trace.inopen = true;
            } else {
                trace.inwater = true;
            }
        } else {
            trace.startsolid = true;
        }
        return true; // empty
    }

    if num < hull.firstclipnode || num > hull.lastclipnode {
        panic!("recursive_hull_check: bad node number {}", num);
    }

    // find the point distances
    let node = &hull.clipnodes[num as usize];
    let plane = &hull.planes[node.plane_idx];

    let (t1, t2) = if (plane.plane_type as usize) < 3 {
        let pt = plane.plane_type as usize;
        (p1[pt] - plane.dist, p2[pt] - plane.dist)
    } else {
        (
            crate::math::dot_product(&plane.normal, p1) - plane.dist,
            crate::math::dot_product(&plane.normal, p2) - plane.dist,
        )
    };

    if t1 >= 0.0 && t2 >= 0.0 {
        return recursive_hull_check(hull, node.children[0], p1f, p2f, p1, p2, trace);
    }
    if t1 < 0.0 && t2 < 0.0 {
        return recursive_hull_check(hull, node.children[1], p1f, p2f, p1, p2, trace);
    }

    // put the crosspoint DIST_EPSILON units on the near side
    let mut frac = if t1 < 0.0 {
        (t1 + DIST_EPSILON) / (t1 - t2)
    } else {
        (t1 - DIST_EPSILON) / (t1 - t2)
    };
    frac = frac.clamp(0.0, 1.0);

    let mut midf = p1f + (p2f - p1f) * frac;
    let mut mid = [
        p1[0] + frac * (p2[0] - p1[0]),
        p1[1] + frac * (p2[1] - p1[1]),
        p1[2] + frac * (p2[2] - p1[2]),
    ];

    let side = usize::from(t1 < 0.0);

    // move up to the node
    if !recursive_hull_check(hull, node.children[side], p1f, midf, p1, &mid, trace) {
        return false;
    }

    if hull_point_contents(hull, node.children[side ^ 1], &mid) != CONTENTS_SOLID {
        // go past the node
        return recursive_hull_check(hull, node.children[side ^ 1], midf, p2f, &mid, p2, trace);
    }

    if trace.allsolid {
        return false; // never got out of the solid area
    }

    // the other side of the node is solid, this is the impact point
    if side == 0 {
        trace.plane.normal = plane.normal;
        trace.plane.dist = plane.dist;
    } else {
        trace.plane.normal = vector_negate(&plane.normal);
        trace.plane.dist = -plane.dist;
    }

    // back the impact point up until it is out of the solid; float precision
    // occasionally leaves the interpolated point inside
    while hull_point_contents(hull, hull.firstclipnode, &mid) == CONTENTS_SOLID {
        frac -= ON_EPSILON;
        if frac < 0.0 {
            trace.fraction = midf;
            trace.endpos = mid;
            com_dprintf("backup past 0\n");
            return false;
        }
        midf = p1f + (p2f - p1f) * frac;
        mid = [
            p1[0] + frac * (p2[0] - p1[0]),
            p1[1] + frac * (p2[1] - p1[1]),
            p1[2] + frac * (p2[2] - p1[2]),
        ];
    }

    trace.fraction = midf;
    trace.endpos = mid;

    false
}

// ============================================================
// Tests
// ============================================================
