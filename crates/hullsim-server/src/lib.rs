// hullsim-server — the entity pool, the world index, fat PVS, and the
// per-tick motion integrator. Everything hangs off an explicit World
// context: one instance per level, constructed at spawn, dropped at level
// change. Single-threaded by contract; ticks must be bit-reproducible.

pub mod entity;
pub mod phys;
pub mod progs;
pub mod pvs;
pub mod world;

#[cfg(test)]
pub(crate) mod testutil;
