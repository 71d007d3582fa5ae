//! Host capability surface consumed by the `quilt-addons` runtime.
//!
//! The addon runtime never talks to a real browser. Instead it is written
//! against the small set of capabilities in this crate: a document tree that
//! stands in for the host editor's DOM, durable key-value storage, a
//! cross-context message bus, a manually driven timer queue, and the editor
//! session state. Each capability has an in-process implementation suitable
//! for embedding and for tests; the traits mark the seams where a real host
//! would plug in.
//!
//! Everything here is single-threaded and event-loop-cooperative: callbacks
//! run to completion before the next one starts, and nothing implements
//! `Send` or `Sync`. Delivery of bus messages and timer callbacks is pumped
//! explicitly by the embedder.

pub mod bus;
pub mod dom;
pub mod scheduler;
pub mod session;
pub mod storage;

pub use self::bus::{LoopbackBus, MessageBus};
pub use self::dom::{Document, ElementId, Selector, SelectorError};
pub use self::scheduler::{Scheduler, TimerId};
pub use self::session::{EditorMode, EditorSession, SessionObserverId, WaitGate};
pub use self::storage::{FileStorage, KeyValueStorage, MemoryStorage};
