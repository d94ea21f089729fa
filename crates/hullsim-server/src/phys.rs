// phys.rs — the per-tick motion integrator
//
// pushmove objects do not obey gravity, and do not interact with each
// other or trigger fields, but block normal movement and push normal
// objects when they move.
//
// onground is set for toss objects when they come to a complete rest. it
// is set for stepping or walking objects.
//
// doors and plats are SOLID_BSP and MOVETYPE_PUSH
// bonus items are SOLID_TRIGGER touch and MOVETYPE_TOSS
// corpses are SOLID_NOT and MOVETYPE_TOSS
// crates are SOLID_BBOX and MOVETYPE_TOSS
// walking monsters are SOLID_SLIDEBOX and MOVETYPE_STEP
// flying/floating monsters are SOLID_SLIDEBOX and MOVETYPE_FLY

use crate::entity::{EntityFlags, MoveType, Solid};
use crate::progs::Progs;
use crate::world::{MoveKind, World};
use hullsim_common::console::{com_dprintf, com_printf};
use hullsim_common::level::{
    CONTENTS_CURRENT_0, CONTENTS_CURRENT_DOWN, CONTENTS_EMPTY, CONTENTS_WATER,
};
use hullsim_common::math::{
    angle_vectors, cross_product, dot_product, vector_add, vector_compare, vector_ma,
    vector_scale, vector_subtract, Vec3, VEC3_ORIGIN,
};
use hullsim_common::trace::Trace;

const STOP_EPSILON: f32 = 0.1;
const MAX_CLIP_PLANES: usize = 5;

// ============================================================
// Velocity sanity
// ============================================================

/// Zeroes NaN components (with a diagnostic, a bad entity must not take
/// the tick down) and clamps the rest to the configured maximum.
pub fn check_velocity(w: &mut World, slot: usize) {
    let max_velocity = w.params.max_velocity;
    for i in 0..3 {
        if w.pool.edicts[slot].velocity[i].is_nan() {
            com_printf(&format!(
                "Got a NaN velocity on {}\n",
                w.pool.edicts[slot].classname
            ));
            w.pool.edicts[slot].velocity[i] = 0.0;
        }
        if w.pool.edicts[slot].s.origin[i].is_nan() {
            com_printf(&format!(
                "Got a NaN origin on {}\n",
                w.pool.edicts[slot].classname
            ));
            w.pool.edicts[slot].s.origin[i] = 0.0;
        }
        let v = w.pool.edicts[slot].velocity[i];
        w.pool.edicts[slot].velocity[i] = v.clamp(-max_velocity, max_velocity);
    }
}

// ============================================================
// Thinking
// ============================================================

/// Runs the entity's think callback if its time came due this frame.
/// Returns false if the entity removed itself.
pub fn run_think(w: &mut World, progs: &mut dyn Progs, slot: usize) -> bool {
    let thinktime = w.pool.edicts[slot].nextthink;
    if thinktime <= 0.0 || thinktime > w.time + w.frametime {
        return true;
    }

    w.pool.edicts[slot].nextthink = 0.0;
    if w.pool.edicts[slot].think_fn.is_none() {
        panic!(
            "run_think: NULL think function on {}",
            w.pool.edicts[slot].classname
        );
    }
    progs.think(w, slot);

    w.pool.edicts[slot].inuse
}

// ============================================================
// Contact
// ============================================================

/// Two entities have touched, so run their touch functions.
pub fn impact(w: &mut World, progs: &mut dyn Progs, e1: usize, trace: &Trace) {
    let e2 = trace.ent as usize;

    if w.pool.edicts[e1].touch_fn.is_some() && w.pool.edicts[e1].solid != Solid::Not {
        progs.touch(w, e1, e2, Some(&trace.plane));
    }
    if w.pool.edicts[e2].touch_fn.is_some() && w.pool.edicts[e2].solid != Solid::Not {
        progs.touch(w, e2, e1, None);
    }
}

/// Slide off of the impacting object.
/// Returns the blocked flags (1 = floor, 2 = step / wall).
pub fn clip_velocity(input: &Vec3, normal: &Vec3, out: &mut Vec3, overbounce: f32) -> i32 {
    let mut blocked = 0;
    if normal[2] > 0.0 {
        blocked |= 1; // floor
    }
    if normal[2] == 0.0 {
        blocked |= 2; // step
    }

    let backoff = dot_product(input, normal) * overbounce;

    for i in 0..3 {
        let change = normal[i] * backoff;
        out[i] = input[i] - change;
        if out[i] > -STOP_EPSILON && out[i] < STOP_EPSILON {
            out[i] = 0.0;
        }
    }

    blocked
}

// ============================================================
// Sliding-contact solver
// ============================================================

/// The basic solid body movement clip that slides along multiple planes.
/// Returns the clip flags if the velocity was modified:
///   1 = floor, 2 = wall / step, 4 = dead stop.
/// If steptrace is given, the trace of any vertical wall hit is stored
/// there for the caller's step logic.
pub fn fly_move(
    w: &mut World,
    progs: &mut dyn Progs,
    slot: usize,
    time: f32,
    mut steptrace: Option<&mut Trace>,
) -> i32 {
    let numbumps = 4;
    let mut blocked = 0;

    let mut original_velocity = w.pool.edicts[slot].velocity;
    let primal_velocity = w.pool.edicts[slot].velocity;
    let mut planes: [Vec3; MAX_CLIP_PLANES] = [[0.0; 3]; MAX_CLIP_PLANES];
    let mut numplanes = 0;

    let mut time_left = time;

    for _bumpcount in 0..numbumps {
        let velocity = w.pool.edicts[slot].velocity;
        if velocity == VEC3_ORIGIN {
            break;
        }

        let origin = w.pool.edicts[slot].s.origin;
        let mins = w.pool.edicts[slot].mins;
        let maxs = w.pool.edicts[slot].maxs;
        let end = vector_ma(&origin, time_left, &velocity);

        let trace = w.sv_move(&origin, &mins, &maxs, &end, MoveKind::Normal, slot as i32);

        if trace.allsolid {
            // entity is trapped in another solid
            w.pool.edicts[slot].velocity = VEC3_ORIGIN;
            return 3;
        }

        if trace.fraction > 0.0 {
            // actually covered some distance
            w.pool.edicts[slot].s.origin = trace.endpos;
            original_velocity = w.pool.edicts[slot].velocity;
            numplanes = 0;
        }

        if trace.fraction == 1.0 {
            break; // moved the entire distance
        }

        if trace.ent < 0 {
            panic!("fly_move: trace with no entity");
        }

        if trace.plane.normal[2] > 0.7 {
            blocked |= 1; // floor
            if w.pool.edicts[trace.ent as usize].solid == Solid::Bsp {
                let ground = w.pool.id_for(trace.ent as usize);
                let ent = &mut w.pool.edicts[slot];
                ent.flags |= EntityFlags::ONGROUND;
                ent.ground_entity = Some(ground);
            }
        }
        if trace.plane.normal[2] == 0.0 {
            blocked |= 2; // step
            if let Some(st) = steptrace.as_deref_mut() {
                *st = trace.clone(); // save for player extrafriction
            }
        }

        // run the impact function
        impact(w, progs, slot, &trace);
        if !w.pool.edicts[slot].inuse {
            break; // removed by the impact function
        }

        time_left -= time_left * trace.fraction;

        // clipped to another plane
        if numplanes >= MAX_CLIP_PLANES {
            // this shouldn't really happen
            w.pool.edicts[slot].velocity = VEC3_ORIGIN;
            return 3;
        }

        planes[numplanes] = trace.plane.normal;
        numplanes += 1;

        // modify original_velocity so it parallels all of the clip planes
        let mut new_velocity = [0.0f32; 3];
        let mut i = 0;
        while i < numplanes {
            clip_velocity(&original_velocity, &planes[i], &mut new_velocity, 1.0);
            let mut j = 0;
            while j < numplanes {
                if j != i && dot_product(&new_velocity, &planes[j]) < 0.0 {
                    break; // not ok
                }
                j += 1;
            }
            if j == numplanes {
                break;
            }
            i += 1;
        }

        if i != numplanes {
            // go along this plane
            w.pool.edicts[slot].velocity = new_velocity;
        } else {
            // go along the crease
            if numplanes != 2 {
                w.pool.edicts[slot].velocity = VEC3_ORIGIN;
                return 7;
            }
            let dir = cross_product(&planes[0], &planes[1]);
            let d = dot_product(&dir, &w.pool.edicts[slot].velocity);
            w.pool.edicts[slot].velocity = vector_scale(&dir, d);
        }

        // if the new velocity is against the original velocity, stop dead
        // to avoid tiny oscillations in sloping corners
        if dot_product(&w.pool.edicts[slot].velocity, &primal_velocity) <= 0.0 {
            w.pool.edicts[slot].velocity = VEC3_ORIGIN;
            return blocked;
        }
    }

    blocked
}

// ============================================================
// Gravity
// ============================================================

pub fn add_gravity(w: &mut World, slot: usize) {
    // per-entity gravity scale lives in a VM-owned field
    let ent_gravity = match w.gravity_field {
        Some(off) => {
            let v = w.pool.edicts[slot].fields[off];
            if v != 0.0 {
                v
            } else {
                1.0
            }
        }
        None => 1.0,
    };
    w.pool.edicts[slot].velocity[2] -= ent_gravity * w.params.gravity * w.frametime;
}

// ============================================================
// PUSHMOVE
// ============================================================

/// Slides the entity along `push`, stopping at the first obstruction.
/// Does not change the entity's velocity at all.
pub fn push_entity(w: &mut World, progs: &mut dyn Progs, slot: usize, push: &Vec3) -> Trace {
    let ent = &w.pool.edicts[slot];
    let start = ent.s.origin;
    let end = vector_add(&start, push);

    let kind = if ent.movetype == MoveType::FlyMissile {
        MoveKind::Missile
    } else if ent.solid == Solid::Trigger || ent.solid == Solid::Not {
        // only clip against bsp models
        MoveKind::NoMonsters
    } else {
        MoveKind::Normal
    };

    let trace = w.sv_move(&start, &ent.mins, &ent.maxs, &end, kind, slot as i32);

    w.pool.edicts[slot].s.origin = trace.endpos;
    w.link_edict(slot, true, progs);

    if trace.ent >= 0 {
        impact(w, progs, slot, &trace);
    }

    trace
}

/// Moves the pusher and carries every entity in its way. If anything ends
/// up embedded, the whole move is undone: the pusher and every carried
/// entity return to their pre-move positions and only the pusher gets a
/// blocked callback.
pub fn push_move(w: &mut World, progs: &mut dyn Progs, pusher: usize, movetime: f32) {
    if w.pool.edicts[pusher].velocity == VEC3_ORIGIN {
        w.pool.edicts[pusher].ltime += movetime;
        return;
    }

    let move_vec = vector_scale(&w.pool.edicts[pusher].velocity, movetime);
    let mins = vector_add(&w.pool.edicts[pusher].absmin, &move_vec);
    let maxs = vector_add(&w.pool.edicts[pusher].absmax, &move_vec);
    let pushorig = w.pool.edicts[pusher].s.origin;

    // move the pusher to its final position
    w.pool.edicts[pusher].s.origin = vector_add(&pushorig, &move_vec);
    w.pool.edicts[pusher].ltime += movetime;
    w.link_edict(pusher, false, progs);

    // see if any solid entities are inside the final position
    let mut moved: Vec<(usize, Vec3)> = Vec::with_capacity(w.pool.num_edicts());
    for e in 1..w.pool.num_edicts() {
        let check = &w.pool.edicts[e];
        if !check.inuse {
            continue;
        }
        if matches!(
            check.movetype,
            MoveType::Push | MoveType::None | MoveType::Follow | MoveType::Noclip
        ) {
            continue;
        }

        // if the entity is standing on the pusher, it will definitely be moved
        let riding = check.flags.contains(EntityFlags::ONGROUND)
            && check
                .ground_entity
                .and_then(|id| w.pool.check(id))
                .is_some_and(|g| g == pusher);
        if !riding {
            if check.absmin[0] >= maxs[0]
                || check.absmin[1] >= maxs[1]
                || check.absmin[2] >= maxs[2]
                || check.absmax[0] <= mins[0]
                || check.absmax[1] <= mins[1]
                || check.absmax[2] <= mins[2]
            {
                continue;
            }
            // see if the ent's bbox is inside the pusher's final position
            if !w.test_entity_position(e) {
                continue;
            }
        }

        // remove the onground flag for non-players
        if w.pool.edicts[e].movetype != MoveType::Walk {
            w.pool.edicts[e].flags.remove(EntityFlags::ONGROUND);
        }

        let entorig = w.pool.edicts[e].s.origin;
        moved.push((e, entorig));

        // try moving the contacted entity
        w.pool.edicts[pusher].solid = Solid::Not;
        push_entity(w, progs, e, &move_vec);
        w.pool.edicts[pusher].solid = Solid::Bsp;

        if !w.pool.edicts[e].inuse {
            continue; // freed by a touch callback
        }

        // if it is still inside the pusher, block
        if w.test_entity_position(e) {
            if w.pool.edicts[e].mins[0] == w.pool.edicts[e].maxs[0] {
                continue;
            }
            if w.pool.edicts[e].solid == Solid::Not || w.pool.edicts[e].solid == Solid::Trigger {
                // corpse: collapse the box instead of blocking the move
                let ent = &mut w.pool.edicts[e];
                ent.mins[0] = 0.0;
                ent.mins[1] = 0.0;
                ent.maxs = ent.mins;
                continue;
            }

            w.pool.edicts[e].s.origin = entorig;
            w.link_edict(e, true, progs);

            w.pool.edicts[pusher].s.origin = pushorig;
            w.link_edict(pusher, false, progs);
            w.pool.edicts[pusher].ltime -= movetime;

            // if the pusher has a blocked function, call it; otherwise it
            // just stays in place until the obstacle is gone
            if w.pool.edicts[pusher].blocked_fn.is_some() {
                progs.blocked(w, pusher, e);
            }

            // move back any entities we already moved
            for &(m, ref from) in &moved {
                if !w.pool.edicts[m].inuse {
                    continue;
                }
                w.pool.edicts[m].s.origin = *from;
                w.link_edict(m, false, progs);
            }
            return;
        }
    }
}

/// Rotating variant: entities in the way are swung along with the pusher's
/// angular step and rolled back the same way on obstruction.
pub fn push_rotate(w: &mut World, progs: &mut dyn Progs, pusher: usize, movetime: f32) {
    if w.pool.edicts[pusher].avelocity == VEC3_ORIGIN {
        w.pool.edicts[pusher].ltime += movetime;
        return;
    }

    let amove = vector_scale(&w.pool.edicts[pusher].avelocity, movetime);
    let a = vector_subtract(&VEC3_ORIGIN, &amove);
    let mut forward = [0.0f32; 3];
    let mut right = [0.0f32; 3];
    let mut up = [0.0f32; 3];
    angle_vectors(&a, Some(&mut forward), Some(&mut right), Some(&mut up));

    let pushorig = w.pool.edicts[pusher].s.angles;

    // move the pusher to its final position
    w.pool.edicts[pusher].s.angles = vector_add(&pushorig, &amove);
    w.pool.edicts[pusher].ltime += movetime;
    w.link_edict(pusher, false, progs);

    let pusher_absmin = w.pool.edicts[pusher].absmin;
    let pusher_absmax = w.pool.edicts[pusher].absmax;

    let mut moved: Vec<(usize, Vec3)> = Vec::with_capacity(w.pool.num_edicts());
    for e in 1..w.pool.num_edicts() {
        let check = &w.pool.edicts[e];
        if !check.inuse {
            continue;
        }
        if matches!(
            check.movetype,
            MoveType::Push | MoveType::None | MoveType::Follow | MoveType::Noclip
        ) {
            continue;
        }

        let riding = check.flags.contains(EntityFlags::ONGROUND)
            && check
                .ground_entity
                .and_then(|id| w.pool.check(id))
                .is_some_and(|g| g == pusher);
        if !riding {
            if check.absmin[0] >= pusher_absmax[0]
                || check.absmin[1] >= pusher_absmax[1]
                || check.absmin[2] >= pusher_absmax[2]
                || check.absmax[0] <= pusher_absmin[0]
                || check.absmax[1] <= pusher_absmin[1]
                || check.absmax[2] <= pusher_absmin[2]
            {
                continue;
            }
            if !w.test_entity_position(e) {
                continue;
            }
        }

        if w.pool.edicts[e].movetype != MoveType::Walk {
            w.pool.edicts[e].flags.remove(EntityFlags::ONGROUND);
        }

        let entorig = w.pool.edicts[e].s.origin;
        moved.push((e, entorig));

        // calculate destination position
        let org = vector_subtract(&entorig, &w.pool.edicts[pusher].s.origin);
        let org2 = [
            dot_product(&org, &forward),
            -dot_product(&org, &right),
            dot_product(&org, &up),
        ];
        let move_vec = vector_subtract(&org2, &org);

        // try moving the contacted entity
        w.pool.edicts[pusher].solid = Solid::Not;
        push_entity(w, progs, e, &move_vec);
        w.pool.edicts[pusher].solid = Solid::Bsp;

        if !w.pool.edicts[e].inuse {
            continue;
        }

        if w.test_entity_position(e) {
            if w.pool.edicts[e].mins[0] == w.pool.edicts[e].maxs[0] {
                continue;
            }
            if w.pool.edicts[e].solid == Solid::Not || w.pool.edicts[e].solid == Solid::Trigger {
                let ent = &mut w.pool.edicts[e];
                ent.mins[0] = 0.0;
                ent.mins[1] = 0.0;
                ent.maxs = ent.mins;
                continue;
            }

            w.pool.edicts[e].s.origin = entorig;
            w.link_edict(e, true, progs);

            w.pool.edicts[pusher].s.angles = pushorig;
            w.link_edict(pusher, false, progs);
            w.pool.edicts[pusher].ltime -= movetime;

            if w.pool.edicts[pusher].blocked_fn.is_some() {
                progs.blocked(w, pusher, e);
            }

            // move back any entities we already moved
            for &(m, ref from) in &moved {
                if !w.pool.edicts[m].inuse {
                    continue;
                }
                w.pool.edicts[m].s.origin = *from;
                let angles = w.pool.edicts[m].s.angles;
                w.pool.edicts[m].s.angles = vector_subtract(&angles, &amove);
                w.link_edict(m, false, progs);
            }
            return;
        } else {
            let angles = w.pool.edicts[e].s.angles;
            w.pool.edicts[e].s.angles = vector_add(&angles, &amove);
        }
    }
}

/// Pushers move in local time: a scheduled think caps how far this tick's
/// motion may advance, so doors arrive exactly when their think fires.
pub fn physics_pusher(w: &mut World, progs: &mut dyn Progs, slot: usize) {
    let oldltime = w.pool.edicts[slot].ltime;
    let thinktime = w.pool.edicts[slot].nextthink;

    let movetime = if thinktime < oldltime + w.frametime {
        (thinktime - oldltime).max(0.0)
    } else {
        w.frametime
    };

    if movetime > 0.0 {
        if w.pool.edicts[slot].avelocity != VEC3_ORIGIN {
            push_rotate(w, progs, slot, movetime);
        } else {
            push_move(w, progs, slot, movetime); // advances ltime if not blocked
        }
    }

    let ltime = w.pool.edicts[slot].ltime;
    if thinktime > oldltime && thinktime <= ltime {
        w.pool.edicts[slot].nextthink = 0.0;
        progs.think(w, slot);
    }
}

// ============================================================
// Simple movers
// ============================================================

/// Non-moving objects can only think.
pub fn physics_none(w: &mut World, progs: &mut dyn Progs, slot: usize) {
    run_think(w, progs, slot);
}

/// Entities that are rigidly stuck to another entity.
pub fn physics_follow(w: &mut World, progs: &mut dyn Progs, slot: usize) {
    if !run_think(w, progs, slot) {
        return;
    }
    let aim = w.pool.edicts[slot].aiment.and_then(|id| w.pool.check(id));
    match aim {
        Some(a) => {
            let offset = w.pool.edicts[slot].v_angle;
            w.pool.edicts[slot].s.origin = vector_add(&w.pool.edicts[a].s.origin, &offset);
            w.link_edict(slot, true, progs);
        }
        None => com_dprintf("follow entity lost its aiment\n"),
    }
}

/// A moving object that doesn't obey physics.
pub fn physics_noclip(w: &mut World, progs: &mut dyn Progs, slot: usize) {
    if !run_think(w, progs, slot) {
        return;
    }
    let ft = w.frametime;
    let ent = &mut w.pool.edicts[slot];
    ent.s.angles = vector_ma(&ent.s.angles, ft, &ent.avelocity);
    ent.s.origin = vector_ma(&ent.s.origin, ft, &ent.velocity);
    w.link_edict(slot, false, progs);
}

// ============================================================
// Water
// ============================================================

/// Refreshes waterlevel/watertype for a walking entity and picks up flow
/// currents into basevelocity. Returns true when more than waist deep.
pub fn check_water(w: &mut World, slot: usize) -> bool {
    let origin = w.pool.edicts[slot].s.origin;
    let mins = w.pool.edicts[slot].mins;
    let maxs = w.pool.edicts[slot].maxs;
    let view_ofs = w.pool.edicts[slot].view_ofs;

    let mut point = [origin[0], origin[1], origin[2] + mins[2] + 1.0];

    w.pool.edicts[slot].waterlevel = 0;
    w.pool.edicts[slot].watertype = CONTENTS_EMPTY;
    let cont = w.point_contents(&point);
    if cont <= CONTENTS_WATER {
        let truecont = w.true_point_contents(&point);
        w.pool.edicts[slot].watertype = cont;
        w.pool.edicts[slot].waterlevel = 1;
        point[2] = origin[2] + (mins[2] + maxs[2]) * 0.5;
        if w.point_contents(&point) <= CONTENTS_WATER {
            w.pool.edicts[slot].waterlevel = 2;
            point[2] = origin[2] + view_ofs[2];
            if w.point_contents(&point) <= CONTENTS_WATER {
                w.pool.edicts[slot].waterlevel = 3;
            }
        }

        if (CONTENTS_CURRENT_DOWN..=CONTENTS_CURRENT_0).contains(&truecont) {
            const CURRENT_TABLE: [Vec3; 6] = [
                [1.0, 0.0, 0.0],
                [0.0, 1.0, 0.0],
                [-1.0, 0.0, 0.0],
                [0.0, -1.0, 0.0],
                [0.0, 0.0, 1.0],
                [0.0, 0.0, -1.0],
            ];
            let idx = (CONTENTS_CURRENT_0 - truecont) as usize;
            let speed = 150.0 * w.pool.edicts[slot].waterlevel as f32 / 3.0;
            let base = w.pool.edicts[slot].basevelocity;
            w.pool.edicts[slot].basevelocity = vector_ma(&base, speed, &CURRENT_TABLE[idx]);
        }
    }

    w.pool.edicts[slot].waterlevel > 1
}

pub fn check_water_transition(w: &mut World, progs: &mut dyn Progs, slot: usize) {
    let origin = w.pool.edicts[slot].s.origin;
    let mins_z = w.pool.edicts[slot].mins[2];
    let point = [origin[0], origin[1], origin[2] + mins_z + 1.0];
    let cont = w.point_contents(&point);

    if w.pool.edicts[slot].watertype == 0 {
        // just spawned here
        w.pool.edicts[slot].watertype = cont;
        w.pool.edicts[slot].waterlevel = 1;
        return;
    }

    if cont <= CONTENTS_WATER {
        if w.pool.edicts[slot].watertype == CONTENTS_EMPTY {
            // just crossed into water
            progs.sound(w, slot, "misc/h2ohit1.wav");
        }
        w.pool.edicts[slot].watertype = cont;
        w.pool.edicts[slot].waterlevel = 1;
    } else {
        if w.pool.edicts[slot].watertype != CONTENTS_EMPTY {
            // just crossed out of water
            progs.sound(w, slot, "misc/h2ohit1.wav");
        }
        w.pool.edicts[slot].watertype = CONTENTS_EMPTY;
        w.pool.edicts[slot].waterlevel = cont;
    }
}

// ============================================================
// Client movement
// ============================================================

/// Tries to recover a client stuck in the world hull, first from its last
/// known good position, then by scanning small offsets around it.
pub fn check_stuck(w: &mut World, progs: &mut dyn Progs, slot: usize) {
    if !w.test_entity_position(slot) {
        let org = w.pool.edicts[slot].s.origin;
        w.pool.edicts[slot].oldorigin = org;
        return;
    }

    let org = w.pool.edicts[slot].s.origin;
    w.pool.edicts[slot].s.origin = w.pool.edicts[slot].oldorigin;
    if !w.test_entity_position(slot) {
        com_dprintf("Unstuck.\n");
        w.link_edict(slot, true, progs);
        return;
    }

    for z in 0..18 {
        for i in -1i32..=1 {
            for j in -1i32..=1 {
                w.pool.edicts[slot].s.origin = [
                    org[0] + i as f32,
                    org[1] + j as f32,
                    org[2] + z as f32,
                ];
                if !w.test_entity_position(slot) {
                    com_dprintf("Unstuck.\n");
                    w.link_edict(slot, true, progs);
                    return;
                }
            }
        }
    }

    w.pool.edicts[slot].s.origin = org;
    com_dprintf("player is stuck.\n");
}

// Cuts the tangential velocity when running face-first along a wall, so
// players don't glide along geometry they are looking into.
fn wall_friction(w: &mut World, slot: usize, trace: &Trace) {
    let v_angle = w.pool.edicts[slot].v_angle;
    let mut forward = [0.0f32; 3];
    angle_vectors(&v_angle, Some(&mut forward), None, None);
    let mut d = dot_product(&trace.plane.normal, &forward);

    d += 0.5;
    if d >= 0.0 {
        return;
    }

    // cut the tangential velocity
    let velocity = w.pool.edicts[slot].velocity;
    let i = dot_product(&trace.plane.normal, &velocity);
    let into = vector_scale(&trace.plane.normal, i);
    let side = vector_subtract(&velocity, &into);

    w.pool.edicts[slot].velocity[0] = side[0] * (1.0 + d);
    w.pool.edicts[slot].velocity[1] = side[1] * (1.0 + d);
}

/// The player has come to a dead stop, possibly due to limited float
/// precision at angled joins in the clip hull. Nudge two units along each
/// compass direction and retry the flat move.
fn try_unstick(w: &mut World, progs: &mut dyn Progs, slot: usize, oldvel: &Vec3) -> i32 {
    let oldorg = w.pool.edicts[slot].s.origin;

    const DIRS: [[f32; 2]; 8] = [
        [2.0, 0.0],
        [0.0, 2.0],
        [-2.0, 0.0],
        [0.0, -2.0],
        [2.0, 2.0],
        [-2.0, 2.0],
        [2.0, -2.0],
        [-2.0, -2.0],
    ];

    for dir in DIRS {
        // try pushing a little in an axial direction
        push_entity(w, progs, slot, &[dir[0], dir[1], 0.0]);

        // retry the original move
        w.pool.edicts[slot].velocity = [oldvel[0], oldvel[1], 0.0];
        let mut steptrace = Trace::default();
        let clip = fly_move(w, progs, slot, 0.1, Some(&mut steptrace));

        let origin = w.pool.edicts[slot].s.origin;
        if (oldorg[1] - origin[1]).abs() > 4.0 || (oldorg[0] - origin[0]).abs() > 4.0 {
            com_dprintf("unstuck!\n");
            return clip;
        }

        // go back to the original pos and try again
        w.pool.edicts[slot].s.origin = oldorg;
    }

    w.pool.edicts[slot].velocity = VEC3_ORIGIN;
    7 // still not moving
}

/// Slide move with stair stepping: if the flat move blocks on a vertical
/// plane, retry lifted by the step height and accept the result only when
/// it comes back down onto a floor-like surface.
pub fn walk_move(w: &mut World, progs: &mut dyn Progs, slot: usize) {
    // do a regular slide move unless it looks like you ran into a step
    let oldonground = w.pool.edicts[slot].flags.contains(EntityFlags::ONGROUND);
    w.pool.edicts[slot].flags.remove(EntityFlags::ONGROUND);

    let oldorg = w.pool.edicts[slot].s.origin;
    let oldvel = w.pool.edicts[slot].velocity;

    let frametime = w.frametime;
    let mut steptrace = Trace::default();
    let clip = fly_move(w, progs, slot, frametime, Some(&mut steptrace));

    if clip & 2 == 0 {
        return; // move didn't block on a step
    }
    if !oldonground && w.pool.edicts[slot].waterlevel == 0 {
        return; // don't stair up while jumping
    }
    if w.pool.edicts[slot].movetype != MoveType::Walk {
        return; // gibbed by a trigger
    }
    if w.params.no_step {
        return;
    }
    if w.pool.edicts[slot].flags.contains(EntityFlags::WATERJUMP) {
        return;
    }

    let nosteporg = w.pool.edicts[slot].s.origin;
    let nostepvel = w.pool.edicts[slot].velocity;

    // try moving up and forward to go up a step
    w.pool.edicts[slot].s.origin = oldorg; // back to start pos

    let upmove = [0.0, 0.0, w.params.step_size];
    let downmove = [0.0, 0.0, -w.params.step_size + oldvel[2] * frametime];

    // move up
    push_entity(w, progs, slot, &upmove);
    if !w.pool.edicts[slot].inuse {
        return;
    }

    // move forward
    w.pool.edicts[slot].velocity = [oldvel[0], oldvel[1], 0.0];
    let mut steptrace = Trace::default();
    let mut clip = fly_move(w, progs, slot, frametime, Some(&mut steptrace));

    // check for stuckness, possibly due to the limited precision of floats
    // in the clipping hulls
    if clip != 0 {
        let origin = w.pool.edicts[slot].s.origin;
        if (oldorg[1] - origin[1]).abs() < 0.03125 && (oldorg[0] - origin[0]).abs() < 0.03125 {
            // stepping up didn't make any progress
            clip = try_unstick(w, progs, slot, &oldvel);
        }
    }

    // extra friction based on view angle
    if clip & 2 != 0 {
        wall_friction(w, slot, &steptrace);
    }

    // move down
    let downtrace = push_entity(w, progs, slot, &downmove);

    if downtrace.plane.normal[2] > 0.7 {
        if w.pool.edicts[slot].solid == Solid::Bsp {
            let ground = w.pool.id_for(downtrace.ent as usize);
            let ent = &mut w.pool.edicts[slot];
            ent.flags |= EntityFlags::ONGROUND;
            ent.ground_entity = Some(ground);
        }
    } else {
        // if the push down didn't end up on good ground, use the move
        // without the step up. this happens near wall / slope combinations
        // and can boost the player up slopes too steep to climb
        w.pool.edicts[slot].s.origin = nosteporg;
        w.pool.edicts[slot].velocity = nostepvel;
    }
}

/// Player character movement: pre/post think hooks around the dispatch on
/// the client's movetype.
pub fn physics_client(w: &mut World, progs: &mut dyn Progs, slot: usize) {
    progs.player_pre_think(w, slot);
    if !w.pool.edicts[slot].inuse {
        return;
    }

    check_velocity(w, slot);

    // flow currents rebuild this every frame
    w.pool.edicts[slot].basevelocity = VEC3_ORIGIN;

    match w.pool.edicts[slot].movetype {
        MoveType::None => {
            if !run_think(w, progs, slot) {
                return;
            }
        }
        MoveType::Walk => {
            if !run_think(w, progs, slot) {
                return;
            }
            if !check_water(w, slot)
                && !w.pool.edicts[slot].flags.contains(EntityFlags::WATERJUMP)
            {
                add_gravity(w, slot);
            }
            check_stuck(w, progs, slot);

            let base = w.pool.edicts[slot].basevelocity;
            let vel = vector_add(&w.pool.edicts[slot].velocity, &base);
            w.pool.edicts[slot].velocity = vel;
            walk_move(w, progs, slot);
            if !w.pool.edicts[slot].inuse {
                return;
            }
            let vel = vector_subtract(&w.pool.edicts[slot].velocity, &base);
            w.pool.edicts[slot].velocity = vel;
        }
        MoveType::Toss | MoveType::Bounce => {
            physics_toss(w, progs, slot);
            if !w.pool.edicts[slot].inuse {
                return;
            }
        }
        MoveType::Fly => {
            if !run_think(w, progs, slot) {
                return;
            }
            let ft = w.frametime;
            fly_move(w, progs, slot, ft, None);
        }
        MoveType::Noclip => {
            if !run_think(w, progs, slot) {
                return;
            }
            let ft = w.frametime;
            let ent = &mut w.pool.edicts[slot];
            ent.s.origin = vector_ma(&ent.s.origin, ft, &ent.velocity);
        }
        other => panic!("physics_client: bad movetype {:?}", other),
    }

    w.link_edict(slot, true, progs);
    progs.player_post_think(w, slot);
}

// ============================================================
// Stepping movement
// ============================================================

/// Monsters freefall when they don't have a ground entity, otherwise all
/// movement is done in discrete steps by their think code. Also used for
/// objects at rest that fall when the floor is pulled out from under them.
pub fn physics_step(w: &mut World, progs: &mut dyn Progs, slot: usize) {
    // freefall if not onground
    if !w.pool.edicts[slot]
        .flags
        .intersects(EntityFlags::ONGROUND | EntityFlags::FLY | EntityFlags::SWIM)
    {
        let hitsound = w.pool.edicts[slot].velocity[2] < w.params.gravity * -0.1;

        add_gravity(w, slot);
        check_velocity(w, slot);
        let ft = w.frametime;
        fly_move(w, progs, slot, ft, None);
        if !w.pool.edicts[slot].inuse {
            return;
        }
        w.link_edict(slot, true, progs);
        if !w.pool.edicts[slot].inuse {
            return;
        }

        if w.pool.edicts[slot].flags.contains(EntityFlags::ONGROUND) && hitsound {
            // just hit ground
            progs.sound(w, slot, "demon/dland2.wav");
        }
    }

    // regular thinking
    if !run_think(w, progs, slot) {
        return;
    }

    check_water_transition(w, progs, slot);
}

// ============================================================
// Toss / bounce
// ============================================================

/// Toss, bounce, and fly movement. When onground, do nothing, unless a
/// conveyor underneath keeps feeding velocity.
pub fn physics_toss(w: &mut World, progs: &mut dyn Progs, slot: usize) {
    // a conveyor under the entity imparts a constant base velocity
    let ground = w.pool.edicts[slot].ground_entity.and_then(|id| w.pool.check(id));
    let base = match ground {
        Some(g) if w.pool.edicts[g].flags.contains(EntityFlags::CONVEYOR) => {
            vector_scale(&w.pool.edicts[g].movedir, w.pool.edicts[g].speed)
        }
        _ => VEC3_ORIGIN,
    };
    w.pool.edicts[slot].basevelocity = base;
    if w.pool.edicts[slot].ground_entity.is_some() && ground.is_none() {
        // whatever we were standing on is gone
        w.pool.edicts[slot].flags.remove(EntityFlags::ONGROUND);
        w.pool.edicts[slot].ground_entity = None;
    }

    check_water(w, slot);

    // regular thinking
    if !run_think(w, progs, slot) {
        return;
    }

    if w.pool.edicts[slot].velocity[2] > 0.0 {
        w.pool.edicts[slot].flags.remove(EntityFlags::ONGROUND);
    }

    // if onground and not being carried, rest
    if w.pool.edicts[slot].flags.contains(EntityFlags::ONGROUND)
        && vector_compare(&w.pool.edicts[slot].basevelocity, &VEC3_ORIGIN)
    {
        return;
    }

    check_velocity(w, slot);

    // add gravity
    let movetype = w.pool.edicts[slot].movetype;
    if !w.pool.edicts[slot].flags.contains(EntityFlags::ONGROUND)
        && movetype != MoveType::Fly
        && movetype != MoveType::BounceMissile
        && movetype != MoveType::FlyMissile
    {
        add_gravity(w, slot);
    }

    // move angles
    let ft = w.frametime;
    {
        let ent = &mut w.pool.edicts[slot];
        ent.s.angles = vector_ma(&ent.s.angles, ft, &ent.avelocity);
    }

    // move origin
    let vel = vector_add(&w.pool.edicts[slot].velocity, &base);
    w.pool.edicts[slot].velocity = vel;
    let move_vec = vector_scale(&vel, ft);
    let trace = push_entity(w, progs, slot, &move_vec);
    if !w.pool.edicts[slot].inuse {
        return;
    }
    let vel = vector_subtract(&w.pool.edicts[slot].velocity, &base);
    w.pool.edicts[slot].velocity = vel;

    if trace.fraction == 1.0 {
        return;
    }

    let backoff = match movetype {
        MoveType::Bounce => 1.5,
        MoveType::BounceMissile => 2.0,
        _ => 1.0,
    };

    let velocity = w.pool.edicts[slot].velocity;
    let mut new_velocity = [0.0f32; 3];
    clip_velocity(&velocity, &trace.plane.normal, &mut new_velocity, backoff);
    w.pool.edicts[slot].velocity = new_velocity;

    // stop if on ground
    if trace.plane.normal[2] > 0.7 {
        let bouncy = movetype == MoveType::Bounce || movetype == MoveType::BounceMissile;
        if dot_product(&trace.plane.normal, &w.pool.edicts[slot].velocity) < 60.0 || !bouncy {
            let ground = w.pool.id_for(trace.ent as usize);
            let ent = &mut w.pool.edicts[slot];
            ent.flags |= EntityFlags::ONGROUND;
            ent.ground_entity = Some(ground);
            ent.velocity = VEC3_ORIGIN;
            ent.avelocity = VEC3_ORIGIN;
        }
    }

    // check for in water
    check_water_transition(w, progs, slot);
}

// ============================================================
// The tick
// ============================================================

/// One fixed simulation step: every live entity, strictly in slot order.
pub fn physics(w: &mut World, progs: &mut dyn Progs) {
    // let the progs know that a new frame has started
    progs.start_frame(w);

    // treat each object in turn
    for i in 0..w.pool.num_edicts() {
        if !w.pool.edicts[i].inuse {
            continue;
        }

        if w.force_retouch != 0.0 {
            w.link_edict(i, true, progs); // force retouch even for stationary
            if !w.pool.edicts[i].inuse {
                continue;
            }
        }

        if i > 0 && i <= w.pool.max_clients() {
            physics_client(w, progs, i);
            continue;
        }

        match w.pool.edicts[i].movetype {
            MoveType::Push => physics_pusher(w, progs, i),
            MoveType::None => physics_none(w, progs, i),
            MoveType::Follow => physics_follow(w, progs, i),
            MoveType::Noclip => physics_noclip(w, progs, i),
            MoveType::Step => physics_step(w, progs, i),
            MoveType::Toss
            | MoveType::Bounce
            | MoveType::BounceMissile
            | MoveType::Fly
            | MoveType::FlyMissile => physics_toss(w, progs, i),
            other => panic!("physics: bad movetype {:?}", other),
        }
    }

    if w.force_retouch != 0.0 {
        w.force_retouch -= 1.0;
    }

    w.time += w.frametime;
}

// ============================================================
// Tests
// ============================================================
