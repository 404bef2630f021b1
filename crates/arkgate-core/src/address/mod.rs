//! Address parsing and hostname.if line rendering
//!
//! - [`Cidr`]: a parsed `address/prefix` descriptor with an explicit family
//! - [`render_line`]: one hostname.if directive for a descriptor
//!
//! Both are pure and safe to call from any task.

pub mod cidr;
pub mod render;

pub use cidr::{AddressFamily, Cidr, parse_cidr};
pub use render::{LineKind, classify, render_line};
