//! Long-lived services of the control loop.
//!
//! Every service owns its scheduler tasks: `begin` registers and enables
//! them, `end` removes them again. Task callbacks are routed back to the
//! owning service by [`TaskKind`].

pub mod connect;
pub mod display;
pub mod restart;
pub mod web;

/// Discriminates scheduler tasks of the composition roots.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TaskKind {
    ConnectPoll,
    ControlPoll,
    WebServerStart,
    WebsiteMount,
    DisplayInit,
    DisplayReady,
    DisplayDone,
    RestartCleanup,
    RestartReset,
}

/// Retry delay for one-shot start tasks whose backend refused.
pub const RETRY_DELAY_MS: u32 = 1_000;
