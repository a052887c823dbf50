// coscribe-engine: collaborative document synchronization core.
//
// The engine keeps one shared document consistent across concurrently
// connected editors (whole-document last-write-wins), tracks per-user
// cursor presence with liveness, and maintains a tracked-changes
// (diff / accept / reject) workflow over a baseline snapshot.

pub mod capability;
pub mod collaborators;
pub mod config;
pub mod debounce;
pub mod error;
pub mod presence;
pub mod session;
pub mod store;
pub mod sync;
pub mod tracker;
