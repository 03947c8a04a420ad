//! Database models, one file per table.

pub mod dead_letter;
pub mod delivery_attempt;
pub mod event;
pub mod subscriber;
pub mod subscription;

pub use dead_letter::{DeadLetter, NewDeadLetter};
pub use delivery_attempt::{AttemptFilter, DeliveryAttempt, NewDeliveryAttempt};
pub use event::{Event, NewEvent};
pub use subscriber::{MatchCandidate, NewSubscriber, Subscriber, UpdateSubscriber};
pub use subscription::Subscription;
