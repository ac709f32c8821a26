// Lazarus Integration Layer
//
// This module is the only place that talks to tmux. It handles:
//
// - Narrow capability traits (query / control / input) consumed by the core
// - One-shot tmux invocations with timeouts and error mapping
// - Recognising "no server running" as an empty topology, not a fault
// - An in-memory mock server for tests
//
// # Architecture
//
// ```text
// Collector / Restore Orchestrator
//         │
//         ▼
// ┌───────────────────┐
// │    TmuxClient     │  ← TmuxQuery + TmuxControl + TmuxInput
// └───────────────────┘
//         │
//         ▼
// ┌───────────────────┐
// │  TmuxCli          │  ← format parsing, exact-match targets
// │  CommandRunner    │  ← subprocess + timeout
// └───────────────────┘
//         │
//         ▼
// ┌───────────────────┐
// │   tmux binary     │
// └───────────────────┘
// ```
//
// For testing:
// ```ignore
// let mock = MockTmux::new();
// let pane = mock.spawn_session("dev", "/src", "nvim");
// // Hand `Arc::new(mock)` to the collector or orchestrator...
// ```

mod adapter;
mod error;
mod mock;
mod subprocess;
mod tmux;

// Re-export public API
pub use adapter::{
    AdapterConfig, LivePane, LiveSession, LiveWindow, TmuxClient, TmuxControl, TmuxInput,
    TmuxQuery, WindowHandle,
};
pub use error::{TmuxError, TmuxResult};
pub use mock::{MockCall, MockTmux};
pub use subprocess::CommandRunner;
pub use tmux::TmuxCli;
