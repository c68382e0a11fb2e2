//! Record id generation.
//!
//! Stores use [`Uuid4`] unless the caller passes its own [`IdGenerator`].
//! Any `Fn() -> String` closure is also a generator.

use uuid::Uuid;

/// Produces fresh record ids.
pub trait IdGenerator {
    fn generate(&self) -> String;
}

/// Random version-4 UUIDs in hyphenated lowercase form.
#[derive(Debug, Clone, Copy, Default)]
pub struct Uuid4;

impl IdGenerator for Uuid4 {
    fn generate(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

impl<F> IdGenerator for F
where
    F: Fn() -> String,
{
    fn generate(&self) -> String {
        self()
    }
}
