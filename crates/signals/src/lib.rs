pub mod indicators;
pub mod rules;
