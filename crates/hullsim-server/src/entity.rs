// entity.rs — edicts and the fixed-capacity entity pool

use hullsim_common::math::Vec3;

pub const MAX_EDICTS: usize = 1024;

/// how many leafs an entity may straddle before falling back to
/// "potentially everywhere"
pub const MAX_ENT_LEAFS: usize = 16;

/// extra slots beyond the authored entity estimate
const EDICT_POOL_SLACK: usize = 128;

// ============================================================
// Movement and solidity kinds
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(i32)]
pub enum MoveType {
    #[default]
    None = 0, // never moves
    Noclip,
    Push, // no clip to world, push and crush
    Walk, // players only
    Step, // discrete, not real time unless fall
    Fly,
    Toss, // gravity
    Bounce,
    BounceMissile,
    FlyMissile, // fly with extra size to monsters
    Follow,     // rigidly tracks another entity
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(i32)]
pub enum Solid {
    #[default]
    Not = 0, // no interaction with other objects
    Trigger,  // touch on edge, but not blocking
    Bbox,     // touch on edge, block
    SlideBox, // touch on edge, but not an onground
    Bsp,      // bsp clip, touch on edge, block
}

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct EntityFlags: i32 {
        const FLY           = 0x0001;
        const SWIM          = 0x0002;
        const CONVEYOR      = 0x0004;
        const CLIENT        = 0x0008;
        const INWATER       = 0x0010;
        const MONSTER       = 0x0020;
        const GODMODE       = 0x0040;
        const NOTARGET      = 0x0080;
        const ITEM          = 0x0100;
        const ONGROUND      = 0x0200;
        const PARTIALGROUND = 0x0400;
        const WATERJUMP     = 0x0800;
        const JUMPRELEASED  = 0x1000;
    }
}

// ============================================================
// Entity state
// ============================================================

/// The part of an entity that gets serialized to clients. The baseline
/// copy on the edict is what deltas are encoded against.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EntityState {
    pub origin: Vec3,
    pub angles: Vec3,
    pub modelindex: i32,
    pub frame: i32,
    pub colormap: i32,
    pub skin: i32,
    pub effects: i32,
}

// ============================================================
// Generation-tagged entity references
// ============================================================

/// Weak reference to a pool slot. Stale ids are caught by the generation
/// counter, which bumps every time a slot is freed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntId {
    pub slot: i32,
    pub gen: u32,
}

// ============================================================
// Edict
// ============================================================

#[derive(Debug, Clone, Default)]
pub struct Edict {
    pub inuse: bool,
    pub gen: u32,
    /// level time when this slot was last freed
    pub freetime: f32,

    pub classname: String,
    pub s: EntityState,
    pub baseline: EntityState,

    pub movetype: MoveType,
    pub solid: Solid,
    pub flags: EntityFlags,

    pub velocity: Vec3,
    pub avelocity: Vec3,
    pub basevelocity: Vec3,

    // local bounds and derived world-space bounds
    pub mins: Vec3,
    pub maxs: Vec3,
    pub size: Vec3,
    pub absmin: Vec3,
    pub absmax: Vec3,

    // world index linkage
    pub area_linked: bool,
    pub area_node: i32,
    /// -1 once the leaf list overflowed; treat as potentially everywhere
    pub num_leafs: i32,
    pub leafnums: [i32; MAX_ENT_LEAFS],

    // weak cross-references, never followed without a pool check
    pub ground_entity: Option<EntId>,
    pub aiment: Option<EntId>,
    pub owner: Option<EntId>,

    pub view_ofs: Vec3,
    pub v_angle: Vec3,
    pub oldorigin: Vec3,

    /// pusher local time; pushers schedule against this, not level time
    pub ltime: f32,
    pub nextthink: f32,

    // callback slots, opaque function indices owned by the game-logic VM
    pub think_fn: Option<usize>,
    pub touch_fn: Option<usize>,
    pub blocked_fn: Option<usize>,

    pub watertype: i32,
    pub waterlevel: i32,

    // pusher / conveyor parameters
    pub speed: f32,
    pub movedir: Vec3,

    /// VM-owned named scalar fields, indexed through the field table
    pub fields: Vec<f32>,
}

impl Edict {
    /// Records the current visible state as the snapshot the network layer
    /// delta-compresses against.
    pub fn create_baseline(&mut self) {
        self.baseline = self.s;
    }
}

// ============================================================
// Named-field table
// ============================================================

/// Resolves VM field names to offsets once at spawn. The VM holds the
/// offsets and indexes edict field blocks directly afterwards.
pub struct FieldTable {
    names: Vec<String>,
}

impl FieldTable {
    pub fn new(names: Vec<String>) -> FieldTable {
        for (i, name) in names.iter().enumerate() {
            if names[..i].iter().any(|n| n == name) {
                panic!("FieldTable: duplicate field name {:?}", name);
            }
        }
        FieldTable { names }
    }

    pub fn offset(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

// ============================================================
// Pool
// ============================================================

pub struct EdictPool {
    pub edicts: Vec<Edict>,
    num_edicts: usize,
    max_clients: usize,
    field_count: usize,
}

impl EdictPool {
    /// Sizes the pool from the level's authored entity estimate. Slot 0 is
    /// the world, slots 1..=max_clients are reserved for clients.
    pub fn new(entity_estimate: usize, max_clients: usize, field_count: usize) -> EdictPool {
        let capacity = entity_estimate + EDICT_POOL_SLACK + max_clients + 1;
        if capacity > MAX_EDICTS {
            panic!(
                "EdictPool: entity estimate {} needs {} slots, MAX_EDICTS is {}",
                entity_estimate, capacity, MAX_EDICTS
            );
        }

        let template = Edict {
            fields: vec![0.0; field_count],
            ..Edict::default()
        };
        let mut pool = EdictPool {
            edicts: vec![template; capacity],
            num_edicts: max_clients + 1,
            max_clients,
            field_count,
        };
        pool.edicts[0].inuse = true;
        pool
    }

    pub fn num_edicts(&self) -> usize {
        self.num_edicts
    }

    pub fn max_clients(&self) -> usize {
        self.max_clients
    }

    pub fn capacity(&self) -> usize {
        self.edicts.len()
    }

    fn clear_slot(&mut self, slot: usize) {
        let gen = self.edicts[slot].gen;
        self.edicts[slot] = Edict {
            gen,
            fields: vec![0.0; self.field_count],
            ..Edict::default()
        };
    }

    /// Either finds a free edict or claims a new one. Slots freed less than
    /// half a second ago are skipped so clients don't see a removed entity
    /// morph into its replacement.
    pub fn alloc(&mut self, time: f32) -> usize {
        for i in self.max_clients + 1..self.num_edicts {
            let e = &self.edicts[i];
            // the first couple seconds of a level involve a lot of freeing
            // and allocating, so relax the replacement policy there
            if !e.inuse && (e.freetime < 2.0 || time - e.freetime > 0.5) {
                self.clear_slot(i);
                self.edicts[i].inuse = true;
                return i;
            }
        }

        if self.num_edicts == self.edicts.len() {
            panic!("EdictPool: no free edicts");
        }
        let i = self.num_edicts;
        self.num_edicts += 1;
        self.clear_slot(i);
        self.edicts[i].inuse = true;
        i
    }

    /// Marks the slot free and bumps its generation so outstanding EntIds
    /// to it stop resolving. The caller unlinks from the world index first.
    pub fn free(&mut self, slot: usize, time: f32) {
        let gen = self.edicts[slot].gen.wrapping_add(1);
        self.clear_slot(slot);
        self.edicts[slot].gen = gen;
        self.edicts[slot].freetime = time;
    }

    pub fn id_for(&self, slot: usize) -> EntId {
        EntId {
            slot: slot as i32,
            gen: self.edicts[slot].gen,
        }
    }

    /// Resolves a weak reference, returning the slot only if the entity is
    /// still the same live one the id was taken from.
    pub fn check(&self, id: EntId) -> Option<usize> {
        if id.slot < 0 {
            return None;
        }
        let slot = id.slot as usize;
        if slot >= self.num_edicts {
            return None;
        }
        let e = &self.edicts[slot];
        (e.inuse && e.gen == id.gen).then_some(slot)
    }
}

// ============================================================
// Tests
// ============================================================
