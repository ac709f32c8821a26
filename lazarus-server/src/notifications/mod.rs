// Lazarus Notifications
//
// Two outbound channels: typed events for live observers and deduplicated
// alerts for operators.

mod alerts;
mod bus;

pub use alerts::{AlertBook, AlertSink};
pub use bus::EventBus;
