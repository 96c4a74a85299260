//! Builds the mixed-integer linear program of an evacuation planning problem: which origins
//! evacuate to which destinations, where resources are deployed and which arcs are closed over a
//! discretized horizon, optionally under several risk and cost scenarios.

pub mod config;
pub mod models;
pub mod problem;
pub mod report;
pub mod solver;
