// world.rs — world queries and entity area checking
//
// The World context owns the level model, the edict pool, and the area-node
// index that accelerates "which entities overlap this box" queries. One
// instance per level: built at spawn, dropped at level change. All queries
// run on the single tick thread; candidate lists are snapshotted before any
// callback so hooks can relink entities mid-iteration.

use crate::entity::{Edict, EdictPool, EntityFlags, FieldTable, MoveType, Solid, MAX_ENT_LEAFS};
use crate::progs::Progs;
use hullsim_common::hull::{hull_point_contents, BoxHull};
use hullsim_common::level::{
    LevelModel, CONTENTS_CURRENT_0, CONTENTS_CURRENT_DOWN, CONTENTS_SOLID, CONTENTS_WATER,
    HULL_CROUCH, HULL_LARGE, HULL_POINT, HULL_STAND,
};
use hullsim_common::math::{box_on_plane_side, vector_add, vector_subtract, Vec3};
use hullsim_common::trace::{hull_trace, Trace};

pub const FRAMETIME: f32 = 0.1;

const AREA_DEPTH: i32 = 4;
const AREA_NODES: usize = 32;

// ============================================================
// Tunable simulation parameters
// ============================================================

/// Host-configurable knobs, owned by the World rather than process-wide
/// state so two levels never share them.
#[derive(Debug, Clone, Copy)]
pub struct PhysParams {
    pub gravity: f32,
    pub max_velocity: f32,
    pub step_size: f32,
    pub no_step: bool,
}

impl Default for PhysParams {
    fn default() -> Self {
        Self {
            gravity: 800.0,
            max_velocity: 2000.0,
            step_size: 18.0,
            no_step: false,
        }
    }
}

// ============================================================
// Area nodes
// ============================================================

#[derive(Debug, Clone)]
pub struct AreaNode {
    pub axis: i32, // -1 = leaf node
    pub dist: f32,
    pub children: [usize; 2],
    pub trigger_edicts: Vec<usize>,
    pub solid_edicts: Vec<usize>,
}

impl Default for AreaNode {
    fn default() -> Self {
        Self {
            axis: -1,
            dist: 0.0,
            children: [usize::MAX; 2],
            trigger_edicts: Vec::new(),
            solid_edicts: Vec::new(),
        }
    }
}

// ============================================================
// Move kinds
// ============================================================

/// Entity filter applied by sv_move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveKind {
    Normal,
    /// line of sight / edge testing, only level geometry blocks
    NoMonsters,
    /// missiles clip a widened box against monsters
    Missile,
}

// ============================================================
// MoveClip — internal sweep state
// ============================================================

struct MoveClip {
    boxmins: Vec3,
    boxmaxs: Vec3,
    mins: Vec3,
    maxs: Vec3,
    mins2: Vec3,
    maxs2: Vec3,
    start: Vec3,
    end: Vec3,
    trace: Trace,
    kind: MoveKind,
    passedict: i32, // edict slot, -1 = none
}

// ============================================================
// World
// ============================================================

pub struct World {
    pub level: LevelModel,
    pub pool: EdictPool,
    pub fields: FieldTable,
    pub params: PhysParams,
    pub time: f32,
    pub frametime: f32,
    /// while nonzero, every entity relinks (and retouches triggers) each tick
    pub force_retouch: f32,

    areanodes: Vec<AreaNode>,
    numareanodes: usize,
    /// resolved once at spawn for the integrator's gravity scale lookup
    pub(crate) gravity_field: Option<usize>,
}

impl World {
    pub fn new(level: LevelModel, max_clients: usize, field_names: Vec<String>) -> World {
        let fields = FieldTable::new(field_names);
        let pool = EdictPool::new(level.entity_estimate, max_clients, fields.len());
        let gravity_field = fields.offset("gravity");

        let mut world = World {
            level,
            pool,
            fields,
            params: PhysParams::default(),
            time: 1.0,
            frametime: FRAMETIME,
            force_retouch: 0.0,
            areanodes: Vec::new(),
            numareanodes: 0,
            gravity_field,
        };

        // the world entity clips through its own submodel hulls
        let w = &mut world.pool.edicts[0];
        w.solid = Solid::Bsp;
        w.movetype = MoveType::Push;
        w.s.modelindex = 0;

        let mins = world.level.submodels[0].mins;
        let maxs = world.level.submodels[0].maxs;
        world.clear_world(&mins, &maxs);
        world
    }

    // ================================================================
    // Area node construction
    // ================================================================

    // builds a uniformly subdivided tree for the given world size
    fn create_area_node(&mut self, depth: i32, mins: &Vec3, maxs: &Vec3) -> usize {
        let anode_idx = self.numareanodes;
        self.numareanodes += 1;

        if anode_idx >= self.areanodes.len() {
            self.areanodes.push(AreaNode::default());
        } else {
            self.areanodes[anode_idx] = AreaNode::default();
        }

        if depth == AREA_DEPTH {
            self.areanodes[anode_idx].axis = -1;
            self.areanodes[anode_idx].children = [usize::MAX; 2];
            return anode_idx;
        }

        let size = vector_subtract(maxs, mins);
        let axis = if size[0] > size[1] { 0 } else { 1 };
        self.areanodes[anode_idx].axis = axis as i32;

        let dist = 0.5 * (maxs[axis] + mins[axis]);
        self.areanodes[anode_idx].dist = dist;

        let mins1 = *mins;
        let mut mins2 = *mins;
        let mut maxs1 = *maxs;
        let maxs2 = *maxs;

        maxs1[axis] = dist;
        mins2[axis] = dist;

        let child0 = self.create_area_node(depth + 1, &mins2, &maxs2);
        let child1 = self.create_area_node(depth + 1, &mins1, &maxs1);

        self.areanodes[anode_idx].children[0] = child0;
        self.areanodes[anode_idx].children[1] = child1;

        anode_idx
    }

    fn clear_world(&mut self, world_mins: &Vec3, world_maxs: &Vec3) {
        self.areanodes.clear();
        self.areanodes.resize(AREA_NODES, AreaNode::default());
        self.numareanodes = 0;
        self.create_area_node(0, world_mins, world_maxs);
    }

    // ================================================================
    // Linking
    // ================================================================

    /// Call before removing an entity or moving it outside of link_edict,
    /// so it stops showing up as a collision candidate.
    pub fn unlink_edict(&mut self, slot: usize) {
        if !self.pool.edicts[slot].area_linked {
            return; // not linked in anywhere
        }

        let node_idx = self.pool.edicts[slot].area_node as usize;
        if node_idx < self.areanodes.len() {
            let node = &mut self.areanodes[node_idx];
            node.trigger_edicts.retain(|&e| e != slot);
            node.solid_edicts.retain(|&e| e != slot);
        }

        self.pool.edicts[slot].area_linked = false;
        self.pool.edicts[slot].area_node = -1;
    }

    /// Needs to be called any time an entity changes origin, mins, maxs or
    /// solid. Sets absmin/absmax and refreshes the occupied-leaf set; if
    /// touch_triggers is set, fires touch callbacks for overlapped triggers.
    pub fn link_edict(&mut self, slot: usize, touch_triggers: bool, progs: &mut dyn Progs) {
        if self.pool.edicts[slot].area_linked {
            self.unlink_edict(slot); // unlink from old position
        }
        if slot == 0 {
            return; // don't add the world
        }
        if !self.pool.edicts[slot].inuse {
            return;
        }

        {
            let ent = &mut self.pool.edicts[slot];
            ent.size = vector_subtract(&ent.maxs, &ent.mins);
            ent.absmin = vector_add(&ent.s.origin, &ent.mins);
            ent.absmax = vector_add(&ent.s.origin, &ent.maxs);

            if ent.flags.contains(EntityFlags::ITEM) {
                // expanded so pickups can be grabbed off shelf edges
                ent.absmin[0] -= 15.0;
                ent.absmin[1] -= 15.0;
                ent.absmax[0] += 15.0;
                ent.absmax[1] += 15.0;
            } else {
                // movement is clipped an epsilon away from an actual edge,
                // so the abs box must catch even near misses
                for i in 0..3 {
                    ent.absmin[i] -= 1.0;
                    ent.absmax[i] += 1.0;
                }
            }

            // link to PVS leafs
            ent.num_leafs = 0;
        }
        let headnode = self.level.submodels[0].headnode[HULL_POINT];
        find_touched_leafs(&self.level, &mut self.pool.edicts[slot], headnode);

        if self.pool.edicts[slot].solid == Solid::Not {
            return;
        }

        // find the first node that the ent's box crosses
        let absmin = self.pool.edicts[slot].absmin;
        let absmax = self.pool.edicts[slot].absmax;
        let solid = self.pool.edicts[slot].solid;

        let mut node_idx: usize = 0;
        loop {
            let node = &self.areanodes[node_idx];
            if node.axis == -1 {
                break;
            }
            if absmin[node.axis as usize] > node.dist {
                node_idx = node.children[0];
            } else if absmax[node.axis as usize] < node.dist {
                node_idx = node.children[1];
            } else {
                break; // crosses the node
            }
        }

        if solid == Solid::Trigger {
            self.areanodes[node_idx].trigger_edicts.push(slot);
        } else {
            self.areanodes[node_idx].solid_edicts.push(slot);
        }
        self.pool.edicts[slot].area_linked = true;
        self.pool.edicts[slot].area_node = node_idx as i32;

        if touch_triggers {
            self.touch_links(slot, progs);
        }
    }

    // ================================================================
    // Trigger touching
    // ================================================================

    fn touch_links(&mut self, slot: usize, progs: &mut dyn Progs) {
        // snapshot the candidates first: a touch callback may relink
        // entities and mutate the area lists under us
        let absmin = self.pool.edicts[slot].absmin;
        let absmax = self.pool.edicts[slot].absmax;
        let mut candidates = Vec::new();
        self.gather_triggers(0, &absmin, &absmax, &mut candidates);

        for t in candidates {
            if t == slot {
                continue;
            }
            if !self.pool.edicts[slot].inuse {
                return; // freed by an earlier touch
            }
            let trig = &self.pool.edicts[t];
            if !trig.inuse || trig.solid != Solid::Trigger || trig.touch_fn.is_none() {
                continue;
            }
            // re-check the overlap against current positions
            let ent = &self.pool.edicts[slot];
            if ent.absmin[0] > trig.absmax[0]
                || ent.absmin[1] > trig.absmax[1]
                || ent.absmin[2] > trig.absmax[2]
                || ent.absmax[0] < trig.absmin[0]
                || ent.absmax[1] < trig.absmin[1]
                || ent.absmax[2] < trig.absmin[2]
            {
                continue;
            }
            progs.touch(self, t, slot, None);
        }
    }

    fn gather_triggers(&self, node_idx: usize, mins: &Vec3, maxs: &Vec3, out: &mut Vec<usize>) {
        if self.numareanodes == 0 {
            return;
        }
        let node = &self.areanodes[node_idx];
        for &t in &node.trigger_edicts {
            let trig = &self.pool.edicts[t];
            if trig.absmin[0] > maxs[0]
                || trig.absmin[1] > maxs[1]
                || trig.absmin[2] > maxs[2]
                || trig.absmax[0] < mins[0]
                || trig.absmax[1] < mins[1]
                || trig.absmax[2] < mins[2]
            {
                continue;
            }
            out.push(t);
        }

        if node.axis == -1 {
            return;
        }
        let axis = node.axis as usize;
        if maxs[axis] > node.dist {
            self.gather_triggers(node.children[0], mins, maxs, out);
        }
        if mins[axis] < node.dist {
            self.gather_triggers(node.children[1], mins, maxs, out);
        }
    }

    // ================================================================
    // Point queries
    // ================================================================

    /// Raw world contents at a point, including current variants. Checks
    /// level geometry only, never entities.
    pub fn true_point_contents(&self, p: &Vec3) -> i32 {
        let hull = self.level.hull(0, HULL_POINT);
        hull_point_contents(&hull, hull.firstclipnode, p)
    }

    /// World contents at a point with flow currents folded into water.
    pub fn point_contents(&self, p: &Vec3) -> i32 {
        let cont = self.true_point_contents(p);
        if (CONTENTS_CURRENT_DOWN..=CONTENTS_CURRENT_0).contains(&cont) {
            CONTENTS_WATER
        } else {
            cont
        }
    }

    // ================================================================
    // Entity clipping
    // ================================================================

    /// Sweeps mins/maxs from start to end against one entity. BSP entities
    /// pick the pre-built hull class matching the swept box; everything
    /// else gets a throwaway box hull expanded by the swept box.
    pub fn clip_move_to_entity(
        &self,
        slot: usize,
        start: &Vec3,
        mins: &Vec3,
        maxs: &Vec3,
        end: &Vec3,
    ) -> Trace {
        let ent = &self.pool.edicts[slot];

        let mut trace;
        let offset;
        if ent.solid == Solid::Bsp {
            // explicit hulls in the level data
            if ent.movetype != MoveType::Push {
                panic!("SOLID_BSP without MOVETYPE_PUSH");
            }
            let size = vector_subtract(maxs, mins);
            let hull_idx = if size[0] < 3.0 {
                HULL_POINT
            } else if size[0] <= 32.0 {
                if size[2] < 54.0 {
                    HULL_CROUCH
                } else {
                    HULL_STAND
                }
            } else {
                HULL_LARGE
            };
            let hull = self.level.hull(ent.s.modelindex as usize, hull_idx);
            offset = vector_add(&vector_subtract(&hull.clip_mins, mins), &ent.s.origin);

            let start_l = vector_subtract(start, &offset);
            let end_l = vector_subtract(end, &offset);
            trace = hull_trace(&hull, &start_l, &end_l);
        } else {
            // create a temporary hull from the entity's bounding box,
            // expanded by the swept box
            let hullmins = vector_subtract(&ent.mins, maxs);
            let hullmaxs = vector_subtract(&ent.maxs, mins);
            let box_hull = BoxHull::new(&hullmins, &hullmaxs);
            offset = ent.s.origin;

            let start_l = vector_subtract(start, &offset);
            let end_l = vector_subtract(end, &offset);
            trace = hull_trace(&box_hull.hull(), &start_l, &end_l);
        }

        // fix the trace up by the offset
        if trace.fraction != 1.0 {
            trace.endpos = vector_add(&trace.endpos, &offset);
        } else {
            trace.endpos = *end;
        }

        // did we clip the move?
        if trace.fraction < 1.0 || trace.startsolid {
            trace.ent = slot as i32;
        }

        trace
    }

    // create the bounding box of the entire move
    fn trace_bounds(
        start: &Vec3,
        mins: &Vec3,
        maxs: &Vec3,
        end: &Vec3,
        boxmins: &mut Vec3,
        boxmaxs: &mut Vec3,
    ) {
        for i in 0..3 {
            if end[i] > start[i] {
                boxmins[i] = start[i] + mins[i] - 1.0;
                boxmaxs[i] = end[i] + maxs[i] + 1.0;
            } else {
                boxmins[i] = end[i] + mins[i] - 1.0;
                boxmaxs[i] = start[i] + maxs[i] + 1.0;
            }
        }
    }

    // clips the sweep against every linked entity whose box overlaps it
    fn clip_to_links(&self, node_idx: usize, clip: &mut MoveClip) {
        let node = &self.areanodes[node_idx];

        for &touch_idx in &node.solid_edicts {
            let touch = &self.pool.edicts[touch_idx];
            if touch.solid == Solid::Not {
                continue;
            }
            if touch_idx as i32 == clip.passedict {
                continue;
            }
            if touch.solid == Solid::Trigger {
                panic!("clip_to_links: trigger in clipping list");
            }
            if clip.kind == MoveKind::NoMonsters && touch.solid != Solid::Bsp {
                continue;
            }

            if clip.boxmins[0] > touch.absmax[0]
                || clip.boxmins[1] > touch.absmax[1]
                || clip.boxmins[2] > touch.absmax[2]
                || clip.boxmaxs[0] < touch.absmin[0]
                || clip.boxmaxs[1] < touch.absmin[1]
                || clip.boxmaxs[2] < touch.absmin[2]
            {
                continue;
            }

            if clip.passedict >= 0 {
                let pass = &self.pool.edicts[clip.passedict as usize];
                if pass.size[0] != 0.0 && touch.size[0] == 0.0 {
                    continue; // points never interact
                }
                let touch_owner = touch.owner.and_then(|id| self.pool.check(id));
                if touch_owner == Some(clip.passedict as usize) {
                    continue; // don't clip against own missiles
                }
                let pass_owner = pass.owner.and_then(|id| self.pool.check(id));
                if pass_owner == Some(touch_idx) {
                    continue; // don't clip against owner
                }
            }

            if clip.trace.allsolid {
                return;
            }

            // might intersect, so do an exact clip
            let trace = if touch.flags.contains(EntityFlags::MONSTER) {
                self.clip_move_to_entity(touch_idx, &clip.start, &clip.mins2, &clip.maxs2, &clip.end)
            } else {
                self.clip_move_to_entity(touch_idx, &clip.start, &clip.mins, &clip.maxs, &clip.end)
            };

            if trace.allsolid || trace.startsolid || trace.fraction < clip.trace.fraction {
                let mut trace = trace;
                trace.ent = touch_idx as i32;
                if clip.trace.startsolid {
                    clip.trace = trace;
                    clip.trace.startsolid = true;
                } else {
                    clip.trace = trace;
                }
            } else if trace.startsolid {
                clip.trace.startsolid = true;
            }
        }

        // recurse down both sides
        if node.axis == -1 {
            return;
        }
        let axis = node.axis as usize;
        if clip.boxmaxs[axis] > node.dist {
            self.clip_to_links(node.children[0], clip);
        }
        if clip.boxmins[axis] < node.dist {
            self.clip_to_links(node.children[1], clip);
        }
    }

    /// Moves the given mins/maxs volume through the world from start to
    /// end, clipping against level geometry and every eligible entity.
    /// `passedict` (and anything it owns) is never clipped against.
    pub fn sv_move(
        &self,
        start: &Vec3,
        mins: &Vec3,
        maxs: &Vec3,
        end: &Vec3,
        kind: MoveKind,
        passedict: i32,
    ) -> Trace {
        // clip to world
        let world_trace = self.clip_move_to_entity(0, start, mins, maxs, end);

        let mut clip = MoveClip {
            trace: world_trace,
            start: *start,
            end: *end,
            mins: *mins,
            maxs: *maxs,
            kind,
            passedict,
            boxmins: [0.0; 3],
            boxmaxs: [0.0; 3],
            mins2: [0.0; 3],
            maxs2: [0.0; 3],
        };

        if kind == MoveKind::Missile {
            for i in 0..3 {
                clip.mins2[i] = -15.0;
                clip.maxs2[i] = 15.0;
            }
        } else {
            clip.mins2 = *mins;
            clip.maxs2 = *maxs;
        }

        Self::trace_bounds(
            start,
            &clip.mins2,
            &clip.maxs2,
            end,
            &mut clip.boxmins,
            &mut clip.boxmaxs,
        );

        // clip to entities
        self.clip_to_links(0, &mut clip);

        clip.trace
    }

    /// True if the entity's box currently intersects anything solid.
    pub fn test_entity_position(&self, slot: usize) -> bool {
        let ent = &self.pool.edicts[slot];
        let trace = self.sv_move(
            &ent.s.origin,
            &ent.mins,
            &ent.maxs,
            &ent.s.origin,
            MoveKind::Normal,
            slot as i32,
        );
        trace.startsolid
    }

    // ================================================================
    // Entity lifetime
    // ================================================================

    pub fn spawn_entity(&mut self) -> usize {
        let time = self.time;
        self.pool.alloc(time)
    }

    /// Resolves a VM field name to the offset the VM then uses directly
    /// against edict field blocks. Meant to be called once per name.
    pub fn field_offset(&self, name: &str) -> Option<usize> {
        self.fields.offset(name)
    }

    /// Unlinks and returns the slot to the pool.
    pub fn free_entity(&mut self, slot: usize) {
        self.unlink_edict(slot);
        let time = self.time;
        self.pool.free(slot, time);
    }
}

// recursively classifies the entity's abs box into render-tree leafs for
// PVS membership tests
fn find_touched_leafs(level: &LevelModel, ent: &mut Edict, node_idx: i32) {
    if ent.num_leafs < 0 {
        return; // already overflowed
    }

    if node_idx < 0 {
        let leaf = (-1 - node_idx) as usize;
        if level.leafs[leaf].contents == CONTENTS_SOLID {
            return;
        }
        if ent.num_leafs as usize == MAX_ENT_LEAFS {
            ent.num_leafs = -1; // overflowed, treat as potentially everywhere
            return;
        }
        ent.leafnums[ent.num_leafs as usize] = leaf as i32;
        ent.num_leafs += 1;
        return;
    }

    let node = &level.nodes[node_idx as usize];
    let plane = &level.planes[node.plane_idx];
    let sides = box_on_plane_side(&ent.absmin, &ent.absmax, plane);

    if sides & 1 != 0 {
        find_touched_leafs(level, ent, node.children[0]);
    }
    if sides & 2 != 0 {
        find_touched_leafs(level, ent, node.children[1]);
    }
}

// ============================================================
// Tests
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progs::NoopProgs;
    use crate::testutil::{flat_floor_world, spawn_box, CountingProgs};

    #[test]
    fn link_sets_abs_bounds() {
        let mut w = flat_floor_world(0);
        let mut progs = NoopProgs;
        let e = spawn_box(&mut w, [100.0, 200.0, 50.0], [-16.0, -16.0, -24.0], [16.0, 16.0, 32.0]);
        w.link_edict(e, false, &mut progs);

        let ent = &w.pool.edicts[e];
        assert_eq!(ent.size, [32.0, 32.0, 56.0]);
        assert_eq!(ent.absmin, [100.0 - 17.0, 200.0 - 17.0, 50.0 - 25.0]);
        assert_eq!(ent.absmax, [100.0 + 17.0, 200.0 + 17.0, 50.0 + 33.0]);
        assert!(ent.area_linked);
    }

    #[test]
    fn item_flag_widens_abs_bounds() {
        let mut w = flat_floor_world(0);
        let mut progs = NoopProgs;
        let e = spawn_box(&mut w, [0.0, 0.0, 50.0], [-8.0; 3], [8.0; 3]);
        w.pool.edicts[e].flags |= EntityFlags::ITEM;
        w.link_edict(e, false, &mut progs);

        let ent = &w.pool.edicts[e];
        assert_eq!(ent.absmin[0], -23.0);
        assert_eq!(ent.absmax[1], 23.0);
        // z is not expanded for items
        assert_eq!(ent.absmin[2], 42.0);
    }

    #[test]
    fn relink_is_idempotent() {
        let mut w = flat_floor_world(0);
        let mut progs = NoopProgs;
        let e = spawn_box(&mut w, [10.0, 20.0, 60.0], [-16.0, -16.0, -24.0], [16.0, 16.0, 32.0]);
        w.link_edict(e, false, &mut progs);

        let absmin = w.pool.edicts[e].absmin;
        let absmax = w.pool.edicts[e].absmax;
        let num_leafs = w.pool.edicts[e].num_leafs;
        let leafnums = w.pool.edicts[e].leafnums;

        w.link_edict(e, false, &mut progs);
        let ent = &w.pool.edicts[e];
        assert_eq!(ent.absmin, absmin);
        assert_eq!(ent.absmax, absmax);
        assert_eq!(ent.num_leafs, num_leafs);
        assert_eq!(ent.leafnums, leafnums);
    }

    #[test]
    fn unlink_removes_from_area_lists() {
        let mut w = flat_floor_world(0);
        let mut progs = NoopProgs;
        let e = spawn_box(&mut w, [0.0, 0.0, 50.0], [-16.0; 3], [16.0; 3]);
        w.link_edict(e, false, &mut progs);
        assert!(w.pool.edicts[e].area_linked);

        w.unlink_edict(e);
        assert!(!w.pool.edicts[e].area_linked);
        assert_eq!(w.pool.edicts[e].area_node, -1);
        for node in &w.areanodes {
            assert!(!node.solid_edicts.contains(&e));
        }
    }

    #[test]
    fn nonsolid_entities_track_leafs_but_not_area_lists() {
        let mut w = flat_floor_world(0);
        let mut progs = NoopProgs;
        let e = spawn_box(&mut w, [0.0, 0.0, 50.0], [-16.0; 3], [16.0; 3]);
        w.pool.edicts[e].solid = Solid::Not;
        w.link_edict(e, false, &mut progs);

        let ent = &w.pool.edicts[e];
        assert!(!ent.area_linked);
        assert!(ent.num_leafs > 0, "leaf membership is still refreshed");
    }

    #[test]
    fn sweep_hits_world_floor() {
        let w = flat_floor_world(0);
        let trace = w.sv_move(
            &[0.0, 0.0, 100.0],
            &[-16.0, -16.0, -24.0],
            &[16.0, 16.0, 32.0],
            &[0.0, 0.0, -100.0],
            MoveKind::Normal,
            -1,
        );
        assert!(trace.fraction < 1.0);
        assert_eq!(trace.ent, 0, "world geometry reports the world entity");
        assert_eq!(trace.plane.normal, [0.0, 0.0, 1.0]);
        // the stand hull floor is pre-expanded to z = 24
        assert!((trace.endpos[2] - 24.0).abs() < 0.1);
    }

    #[test]
    fn sweep_hits_linked_entity() {
        let mut w = flat_floor_world(0);
        let mut progs = NoopProgs;
        let blocker = spawn_box(&mut w, [64.0, 0.0, 50.0], [-16.0; 3], [16.0; 3]);
        w.link_edict(blocker, false, &mut progs);

        let trace = w.sv_move(
            &[0.0, 0.0, 50.0],
            &[-8.0; 3],
            &[8.0; 3],
            &[128.0, 0.0, 50.0],
            MoveKind::Normal,
            -1,
        );
        assert!(trace.fraction < 1.0);
        assert_eq!(trace.ent, blocker as i32);
        // blocked at the expanded face: 64 - 16 - 8 = 40
        assert!((trace.endpos[0] - 40.0).abs() < 0.1);
    }

    #[test]
    fn passedict_not_clipped_against() {
        let mut w = flat_floor_world(0);
        let mut progs = NoopProgs;
        let e = spawn_box(&mut w, [32.0, 0.0, 50.0], [-16.0; 3], [16.0; 3]);
        w.link_edict(e, false, &mut progs);

        let trace = w.sv_move(
            &[32.0, 0.0, 50.0],
            &[-16.0; 3],
            &[16.0; 3],
            &[32.0, 0.0, 60.0],
            MoveKind::Normal,
            e as i32,
        );
        assert_eq!(trace.fraction, 1.0, "an entity never clips against itself");
    }

    #[test]
    fn owner_chain_not_clipped_against() {
        let mut w = flat_floor_world(0);
        let mut progs = NoopProgs;
        let shooter = spawn_box(&mut w, [0.0, 0.0, 50.0], [-16.0; 3], [16.0; 3]);
        w.link_edict(shooter, false, &mut progs);
        let missile = spawn_box(&mut w, [20.0, 0.0, 50.0], [-2.0; 3], [2.0; 3]);
        w.pool.edicts[missile].owner = Some(w.pool.id_for(shooter));
        w.link_edict(missile, false, &mut progs);

        // the missile sweeps back through its owner without hitting it
        let trace = w.sv_move(
            &[20.0, 0.0, 50.0],
            &[-2.0; 3],
            &[2.0; 3],
            &[-40.0, 0.0, 50.0],
            MoveKind::Normal,
            missile as i32,
        );
        assert_eq!(trace.fraction, 1.0);
    }

    #[test]
    fn nomonsters_ignores_box_entities() {
        let mut w = flat_floor_world(0);
        let mut progs = NoopProgs;
        let blocker = spawn_box(&mut w, [64.0, 0.0, 50.0], [-16.0; 3], [16.0; 3]);
        w.link_edict(blocker, false, &mut progs);

        let trace = w.sv_move(
            &[0.0, 0.0, 50.0],
            &[0.0; 3],
            &[0.0; 3],
            &[128.0, 0.0, 50.0],
            MoveKind::NoMonsters,
            -1,
        );
        assert_eq!(trace.fraction, 1.0, "NoMonsters only clips level geometry");
    }

    #[test]
    fn point_contents_classifies_floor() {
        let w = flat_floor_world(0);
        assert_eq!(w.point_contents(&[0.0, 0.0, 10.0]), hullsim_common::level::CONTENTS_EMPTY);
        assert_eq!(w.point_contents(&[0.0, 0.0, -10.0]), CONTENTS_SOLID);
    }

    #[test]
    fn test_entity_position_detects_embedding() {
        let mut w = flat_floor_world(0);
        let mut progs = NoopProgs;
        let e = spawn_box(&mut w, [0.0, 0.0, 50.0], [-16.0, -16.0, -24.0], [16.0, 16.0, 32.0]);
        w.link_edict(e, false, &mut progs);
        assert!(!w.test_entity_position(e));

        w.pool.edicts[e].s.origin[2] = 0.0; // bottom half below the floor
        assert!(w.test_entity_position(e));
    }

    #[test]
    fn touch_triggers_fire_on_overlap() {
        let mut w = flat_floor_world(0);
        let mut progs = CountingProgs::default();

        let trig = spawn_box(&mut w, [0.0, 0.0, 50.0], [-32.0; 3], [32.0; 3]);
        w.pool.edicts[trig].solid = Solid::Trigger;
        w.pool.edicts[trig].touch_fn = Some(7);
        w.link_edict(trig, false, &mut progs);

        let e = spawn_box(&mut w, [0.0, 0.0, 50.0], [-8.0; 3], [8.0; 3]);
        w.link_edict(e, true, &mut progs);

        assert_eq!(progs.touches, vec![(trig, e)]);
    }

    #[test]
    fn touch_triggers_skip_nonoverlapping() {
        let mut w = flat_floor_world(0);
        let mut progs = CountingProgs::default();

        let trig = spawn_box(&mut w, [500.0, 500.0, 50.0], [-32.0; 3], [32.0; 3]);
        w.pool.edicts[trig].solid = Solid::Trigger;
        w.pool.edicts[trig].touch_fn = Some(7);
        w.link_edict(trig, false, &mut progs);

        let e = spawn_box(&mut w, [0.0, 0.0, 50.0], [-8.0; 3], [8.0; 3]);
        w.link_edict(e, true, &mut progs);

        assert!(progs.touches.is_empty());
    }

    #[test]
    fn free_entity_unlinks_and_recycles() {
        let mut w = flat_floor_world(0);
        let mut progs = NoopProgs;
        let e = spawn_box(&mut w, [0.0, 0.0, 50.0], [-16.0; 3], [16.0; 3]);
        w.link_edict(e, false, &mut progs);
        let id = w.pool.id_for(e);

        w.free_entity(e);
        assert!(!w.pool.edicts[e].area_linked);
        assert_eq!(w.pool.check(id), None);

        // a sweep through its old position sails through
        let trace = w.sv_move(
            &[-64.0, 0.0, 50.0],
            &[-8.0; 3],
            &[8.0; 3],
            &[64.0, 0.0, 50.0],
            MoveKind::Normal,
            -1,
        );
        assert_eq!(trace.fraction, 1.0);
    }
}
