//! OS abstraction: native path buffers, directory enumeration, resource probes.

pub mod fsenum;
pub mod native;
pub mod probes;
