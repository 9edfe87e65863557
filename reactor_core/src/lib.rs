//! Core types shared by the reactor runtime: the `Tag`/`Timestamp` algebra and
//! the key newtypes used to index the statically declared reactor graph.

mod keys;
mod time;

pub use keys::*;
pub use time::*;
