pub mod client;
pub mod reconcile;
pub mod types;

#[cfg(test)]
pub(crate) mod mock;
