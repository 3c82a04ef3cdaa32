pub mod archive;
pub mod config;
pub mod diff;
pub mod dispatcher;
pub mod editor;
pub mod errors;
pub mod gateway;
pub mod queue;
pub mod server;
pub mod task;
pub mod vcs;
pub mod workflow;

#[cfg(test)]
pub(crate) mod testing;
