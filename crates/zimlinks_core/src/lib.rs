//! Verification and repair of `[[wiki links]]` across a Zim-style page tree.
//!
//! Pages are plain-text files below a structure root. Content links are
//! checked for resolvability and canonical form ([`forward`]); pages ending
//! in a backlinks section must list exactly the pages that link to them
//! ([`backlinks`]). [`verify`] runs both in order.

pub mod backlinks;
pub mod config;
pub mod filesystem;
pub mod forward;
pub mod graph;
pub mod inspect;
pub mod links;
pub mod relink;
pub mod runtime;
pub mod verify;
