pub mod config;
pub mod hierarchy;
pub mod mutation;
pub mod pending;
pub mod probe;
pub mod reconcile;
pub mod script;
pub mod selection;
pub mod session;
pub mod state;
pub mod storage;
pub mod submit;

#[cfg(test)]
mod tests;
