//! Background loops.

pub mod expiry_loop;
