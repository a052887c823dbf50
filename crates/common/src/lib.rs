// coscribe-common: shared types and utilities for the Coscribe workspace

pub mod diff;
pub mod protocol;
pub mod types;
