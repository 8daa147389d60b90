//! Declarative sandbox policy model and profile compilation.
//!
//! A [`SandboxPolicy`] describes what a sandboxed process may do: a
//! closed-world default, a set of process capability grants, and an ordered
//! list of file rules layered on top. The model is compiled into the
//! platform's profile language ([`seatbelt::compile_profile`]) and enforced
//! by the OS sandbox engine; nothing here is evaluated at runtime by
//! toolgate itself.

mod policy;
pub mod seatbelt;

pub use policy::{
    DefaultBehavior, FileOperation, FileRule, PathFilter, ProcessRule, SandboxPolicy,
};
