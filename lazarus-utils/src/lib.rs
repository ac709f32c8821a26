// Lazarus shared types
//
// Pure data model and algorithms used by the server and the CLI: snapshot
// model and content hash, the tmux layout grammar, recovery records,
// events, alerts and configuration. Nothing in this crate performs I/O.

pub mod alert;
pub mod config;
pub mod event;
pub mod layout;
pub mod recovery;
pub mod snapshot;
