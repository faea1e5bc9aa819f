pub mod coordinator;
pub mod disseminator;
pub mod fault;
pub mod message;
pub mod outbox;
pub mod peers;
pub mod processor;

pub use coordinator::*;
pub use disseminator::*;
pub use fault::*;
pub use message::*;
pub use outbox::*;
pub use peers::*;
pub use processor::*;
