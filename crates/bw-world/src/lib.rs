//! World state and player physics for the block-building server.
//!
//! This crate owns the block grid, the per-tick update queue, and the
//! kinematic integration that drives players through it. It has no
//! network or script-host dependency of its own: scripted block
//! behaviour is reached through the [`hooks::ScriptHooks`] trait, which
//! `bw-scripting` implements and `bw-server` wires in.

pub mod block_manager;
pub mod hooks;
pub mod player;
pub mod world;

pub use block_manager::{BlockCallbacks, BlockManager, BlockManagerError, BlockPack, BlockProperties, CallbackRef, DrawType};
pub use hooks::{CollisionType, NullHooks, ScriptHooks, StepEffect};
pub use player::{KinematicSnapshot, Player, Prn, DISTANCE_STEP, MAX_DTIME};
pub use world::{BlockUpdate, KeyTimer, Layer, PositionRange, PositionRangeIter, World, WorldDrawType, WorldError, WorldMeta, MAX_SIZE, MIN_SIZE};
