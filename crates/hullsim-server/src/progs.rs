// progs.rs — the seam to the external game-logic VM
//
// The core never runs game logic itself; it calls out through this trait
// at the hook points and the VM decides what the callback slot on the
// edict means. Callbacks receive the whole World and may free or move any
// entity, so callers re-validate slots after every call.

use crate::world::World;
use hullsim_common::math::Plane;

pub trait Progs {
    /// Called once at the top of every physics pass.
    fn start_frame(&mut self, _world: &mut World) {}

    /// The entity's scheduled think came due. The edict's think_fn slot
    /// identifies which VM function to run.
    fn think(&mut self, world: &mut World, ent: usize);

    /// Two entities touched. `plane` is the impact plane when the contact
    /// came from a sweep, None for overlap-style trigger touches.
    fn touch(&mut self, world: &mut World, ent: usize, other: usize, plane: Option<&Plane>);

    /// A pusher was obstructed by `other` and rolled back.
    fn blocked(&mut self, world: &mut World, ent: usize, other: usize);

    fn player_pre_think(&mut self, _world: &mut World, _ent: usize) {}
    fn player_post_think(&mut self, _world: &mut World, _ent: usize) {}

    /// Sound cue from the integrator (landings, water transitions).
    fn sound(&mut self, _world: &mut World, _ent: usize, _sample: &str) {}
}

/// Does nothing at any hook point. Stands in for the VM in tests and when
/// running headless.
pub struct NoopProgs;

impl Progs for NoopProgs {
    fn think(&mut self, _world: &mut World, _ent: usize) {}
    fn touch(&mut self, _world: &mut World, _ent: usize, _other: usize, _plane: Option<&Plane>) {}
    fn blocked(&mut self, _world: &mut World, _ent: usize, _other: usize) {}
}
