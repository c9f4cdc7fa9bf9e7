pub mod event;
pub mod session;

pub use event::{Event, EventType};
pub use session::SessionRecord;
