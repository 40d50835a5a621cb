//! Serialized formats exchanged with the readback layer

pub mod capture;
