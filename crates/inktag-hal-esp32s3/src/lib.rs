#![no_std]

//! ESP32-S3 board glue for the inktag firmware images.

pub mod control;
pub mod network;
pub mod platform;
pub mod storage;
