#![cfg_attr(not(test), no_std)]

//! Board-independent logic of the inktag e-paper name tag: connectivity
//! lifecycle, cooperative scheduler, panel jobs, bitmap decoding and the
//! small network protocols served from the device.

pub mod app;
pub mod bitmap;
pub mod captive_dns;
pub mod connect;
pub mod control;
pub mod dhcp;
pub mod http;
pub mod image_store;
pub mod job;
pub mod orchestrator;
pub mod ota;
pub mod panel;
pub mod scheduler;
pub mod services;
pub mod settings;
pub mod signal;
pub mod status;

pub use app::{Application, ApplicationPlatform, Board, Platform, Recovery, RecoveryPlatform};
pub use signal::{CompletionSignal, SignalState};
