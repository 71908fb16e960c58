//! Background machinery behind the HTTP API: the execution store seam, the
//! job submitter and the reconcile loop.

pub mod reconciler;
pub mod store;
pub mod submitter;

#[cfg(test)]
pub(crate) mod testing;
