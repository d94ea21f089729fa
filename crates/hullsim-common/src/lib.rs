// hullsim-common — shared math, the immutable level model, hull tracing,
// and visibility decompression. Entity handling lives in hullsim-server.

pub mod console;
pub mod hull;
pub mod level;
pub mod math;
pub mod trace;
pub mod vis;
