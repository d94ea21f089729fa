// testutil.rs — synthetic levels and instrumented progs for tests
//
// The scenario tests build tiny hand-authored levels straight from
// clip-node arrays: a flat floor, a floor with a step, a floor plus a
// sliding door submodel. Expansion is baked in here the same way the
// level compiler would bake it, per hull class.

use crate::entity::{MoveType, Solid};
use crate::progs::Progs;
use crate::world::World;
use hullsim_common::level::{
    ClipNode, LevelInput, LevelModel, RenderLeaf, RenderNode, SubModel, CONTENTS_EMPTY,
    CONTENTS_SOLID, MAX_HULLS, STANDARD_HULL_SIZES,
};
use hullsim_common::math::{Plane, Vec3};

/// Appends a six-plane chain that is solid inside the given box. Returns
/// the head clipnode index.
fn push_box_region(
    planes: &mut Vec<(Vec3, f32)>,
    clipnodes: &mut Vec<ClipNode>,
    mins: &Vec3,
    maxs: &Vec3,
) -> i32 {
    let head = clipnodes.len() as i32;
    for i in 0..6 {
        let side = i & 1;
        let axis = i >> 1;
        let mut normal = [0.0f32; 3];
        normal[axis] = 1.0;
        let dist = if side != 0 { mins[axis] } else { maxs[axis] };

        let plane_idx = planes.len();
        planes.push((normal, dist));

        let mut children = [0i32; 2];
        children[side] = CONTENTS_EMPTY;
        children[side ^ 1] = if i != 5 {
            head + i as i32 + 1
        } else {
            CONTENTS_SOLID
        };
        clipnodes.push(ClipNode {
            plane_idx,
            children,
        });
    }
    head
}

/// The box a hull-class entity is blocked by, i.e. the box grown by the
/// hull's extents the way the level compiler pre-expands geometry.
fn expand_box(mins: &Vec3, maxs: &Vec3, hull: usize) -> (Vec3, Vec3) {
    let clip_mins = STANDARD_HULL_SIZES[hull][0];
    let clip_maxs = STANDARD_HULL_SIZES[hull][1];
    let mut rmins = [0.0f32; 3];
    let mut rmaxs = [0.0f32; 3];
    for a in 0..3 {
        rmins[a] = mins[a] - clip_maxs[a];
        rmaxs[a] = maxs[a] - clip_mins[a];
    }
    (rmins, rmaxs)
}

fn floor_render() -> (Vec<RenderNode>, Vec<RenderLeaf>) {
    let nodes = vec![RenderNode {
        plane_idx: 0,
        children: [-2, -1], // above: leaf 1 (empty), below: leaf 0 (solid)
    }];
    let leafs = vec![
        RenderLeaf {
            contents: CONTENTS_SOLID,
            visofs: -1,
        },
        RenderLeaf {
            contents: CONTENTS_EMPTY,
            visofs: -1,
        },
    ];
    (nodes, leafs)
}

/// Open space above z = 0, solid below, per-hull expansion baked in.
pub(crate) fn flat_floor_world(max_clients: usize) -> World {
    let mut planes: Vec<(Vec3, f32)> = vec![([0.0, 0.0, 1.0], 0.0)];
    let mut clipnodes = Vec::new();
    let mut headnode = [0i32; MAX_HULLS];
    for h in 1..MAX_HULLS {
        let dist = -STANDARD_HULL_SIZES[h][0][2]; // floor raised by the hull's depth
        headnode[h] = clipnodes.len() as i32;
        planes.push(([0.0, 0.0, 1.0], dist));
        clipnodes.push(ClipNode {
            plane_idx: h,
            children: [CONTENTS_EMPTY, CONTENTS_SOLID],
        });
    }

    let (nodes, leafs) = floor_render();
    let level = LevelModel::build(LevelInput {
        planes,
        nodes,
        leafs,
        clipnodes,
        hull_bounds: STANDARD_HULL_SIZES,
        visdata: Vec::new(),
        submodels: vec![SubModel {
            mins: [-4096.0; 3],
            maxs: [4096.0; 3],
            origin: [0.0; 3],
            headnode,
        }],
        entity_estimate: 64,
    });
    World::new(level, max_clients, vec!["gravity".into()])
}

/// Low floor at z = 0 for x < 0, raised floor at z = 16 for x >= 0.
/// Only the stand hull is authored; the other classes reuse its tree.
pub(crate) fn step_world() -> World {
    let ext = STANDARD_HULL_SIZES[1];
    let face = -ext[1][0]; // step face pushed out by the hull's width
    let high = 16.0 - ext[0][2];
    let low = -ext[0][2];

    let planes: Vec<(Vec3, f32)> = vec![
        ([1.0, 0.0, 0.0], 0.0),  // render step face
        ([0.0, 0.0, 1.0], 16.0), // render high floor
        ([0.0, 0.0, 1.0], 0.0),  // render low floor
        ([1.0, 0.0, 0.0], face),
        ([0.0, 0.0, 1.0], high),
        ([0.0, 0.0, 1.0], low),
    ];
    let nodes = vec![
        RenderNode {
            plane_idx: 0,
            children: [1, 2],
        },
        RenderNode {
            plane_idx: 1,
            children: [-2, -1],
        },
        RenderNode {
            plane_idx: 2,
            children: [-2, -1],
        },
    ];
    let leafs = vec![
        RenderLeaf {
            contents: CONTENTS_SOLID,
            visofs: -1,
        },
        RenderLeaf {
            contents: CONTENTS_EMPTY,
            visofs: -1,
        },
    ];
    let clipnodes = vec![
        ClipNode {
            plane_idx: 3,
            children: [1, 2],
        },
        ClipNode {
            plane_idx: 4,
            children: [CONTENTS_EMPTY, CONTENTS_SOLID],
        },
        ClipNode {
            plane_idx: 5,
            children: [CONTENTS_EMPTY, CONTENTS_SOLID],
        },
    ];

    let level = LevelModel::build(LevelInput {
        planes,
        nodes,
        leafs,
        clipnodes,
        hull_bounds: STANDARD_HULL_SIZES,
        visdata: Vec::new(),
        submodels: vec![SubModel {
            mins: [-4096.0; 3],
            maxs: [4096.0; 3],
            origin: [0.0; 3],
            headnode: [0, 0, 0, 0],
        }],
        entity_estimate: 64,
    });
    World::new(level, 1, vec!["gravity".into()])
}

/// Air above z = 0, water from -64 to 0, solid below. The clip hulls only
/// see the solid floor; water never blocks.
pub(crate) fn water_world() -> World {
    use hullsim_common::level::CONTENTS_WATER;

    let mut planes: Vec<(Vec3, f32)> = vec![
        ([0.0, 0.0, 1.0], 0.0),   // render water surface
        ([0.0, 0.0, 1.0], -64.0), // render water floor
    ];
    let mut clipnodes = Vec::new();
    let mut headnode = [0i32; MAX_HULLS];
    for h in 1..MAX_HULLS {
        let dist = -64.0 - STANDARD_HULL_SIZES[h][0][2];
        headnode[h] = clipnodes.len() as i32;
        planes.push(([0.0, 0.0, 1.0], dist));
        clipnodes.push(ClipNode {
            plane_idx: 1 + h,
            children: [CONTENTS_EMPTY, CONTENTS_SOLID],
        });
    }

    let nodes = vec![
        RenderNode {
            plane_idx: 0,
            children: [-2, 1],
        },
        RenderNode {
            plane_idx: 1,
            children: [-3, -1],
        },
    ];
    let leafs = vec![
        RenderLeaf {
            contents: CONTENTS_SOLID,
            visofs: -1,
        },
        RenderLeaf {
            contents: CONTENTS_EMPTY,
            visofs: -1,
        },
        RenderLeaf {
            contents: CONTENTS_WATER,
            visofs: -1,
        },
    ];

    let level = LevelModel::build(LevelInput {
        planes,
        nodes,
        leafs,
        clipnodes,
        hull_bounds: STANDARD_HULL_SIZES,
        visdata: Vec::new(),
        submodels: vec![SubModel {
            mins: [-4096.0; 3],
            maxs: [4096.0; 3],
            origin: [0.0; 3],
            headnode,
        }],
        entity_estimate: 64,
    });
    World::new(level, 1, vec!["gravity".into()])
}

pub(crate) const DOOR_MINS: Vec3 = [0.0, -64.0, 0.0];
pub(crate) const DOOR_MAXS: Vec3 = [16.0, 64.0, 128.0];

/// Flat floor plus a door submodel (submodel 1), with the door entity
/// spawned, linked and scheduled so a pusher tick moves it.
pub(crate) fn door_world() -> (World, usize) {
    let mut planes: Vec<(Vec3, f32)> = vec![([0.0, 0.0, 1.0], 0.0)];
    let mut clipnodes = Vec::new();

    let mut floor_head = [0i32; MAX_HULLS];
    for h in 1..MAX_HULLS {
        let dist = -STANDARD_HULL_SIZES[h][0][2];
        floor_head[h] = clipnodes.len() as i32;
        planes.push(([0.0, 0.0, 1.0], dist));
        clipnodes.push(ClipNode {
            plane_idx: h,
            children: [CONTENTS_EMPTY, CONTENTS_SOLID],
        });
    }

    let mut door_head = [0i32; MAX_HULLS];
    for h in 1..MAX_HULLS {
        let (rmins, rmaxs) = expand_box(&DOOR_MINS, &DOOR_MAXS, h);
        door_head[h] = push_box_region(&mut planes, &mut clipnodes, &rmins, &rmaxs);
    }

    let (nodes, leafs) = floor_render();
    let level = LevelModel::build(LevelInput {
        planes,
        nodes,
        leafs,
        clipnodes,
        hull_bounds: STANDARD_HULL_SIZES,
        visdata: Vec::new(),
        submodels: vec![
            SubModel {
                mins: [-4096.0; 3],
                maxs: [4096.0; 3],
                origin: [0.0; 3],
                headnode: floor_head,
            },
            SubModel {
                mins: DOOR_MINS,
                maxs: DOOR_MAXS,
                origin: [0.0; 3],
                headnode: door_head,
            },
        ],
        entity_estimate: 64,
    });

    let mut w = World::new(level, 0, vec!["gravity".into()]);
    let mut progs = crate::progs::NoopProgs;

    let door = w.spawn_entity();
    {
        let e = &mut w.pool.edicts[door];
        e.classname = "func_door".into();
        e.movetype = MoveType::Push;
        e.solid = Solid::Bsp;
        e.s.modelindex = 1;
        e.mins = DOOR_MINS;
        e.maxs = DOOR_MAXS;
        e.nextthink = 100.0; // keeps the pusher moving a full frame per tick
    }
    w.link_edict(door, false, &mut progs);
    (w, door)
}

/// Allocates a bbox entity without linking it. Tests adjust fields and
/// link themselves.
pub(crate) fn spawn_box(w: &mut World, origin: Vec3, mins: Vec3, maxs: Vec3) -> usize {
    let slot = w.spawn_entity();
    let e = &mut w.pool.edicts[slot];
    e.s.origin = origin;
    e.mins = mins;
    e.maxs = maxs;
    e.movetype = MoveType::Toss;
    e.solid = Solid::Bbox;
    slot
}

// ============================================================
// Instrumented progs
// ============================================================

#[derive(Default)]
pub(crate) struct CountingProgs {
    pub thinks: Vec<usize>,
    pub touches: Vec<(usize, usize)>,
    pub blocked: Vec<(usize, usize)>,
    pub sounds: Vec<(usize, String)>,
}

impl Progs for CountingProgs {
    fn think(&mut self, _world: &mut World, ent: usize) {
        self.thinks.push(ent);
    }

    fn touch(&mut self, _world: &mut World, ent: usize, other: usize, _plane: Option<&Plane>) {
        self.touches.push((ent, other));
    }

    fn blocked(&mut self, _world: &mut World, ent: usize, other: usize) {
        self.blocked.push((ent, other));
    }

    fn sound(&mut self, _world: &mut World, ent: usize, sample: &str) {
        self.sounds.push((ent, sample.to_string()));
    }
}
