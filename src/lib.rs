//! Active objects for Rust.
//!
//! Callers on any thread submit method invocations through a façade
//! ([`proxy::ActiveProxy`]) and get a [`cell::ResultCell`] back immediately.
//! A [`scheduler::Scheduler`] runs the invocations one at a time on its own
//! worker thread, highest priority first, so the servant behind the façade
//! is never touched concurrently.

pub mod banner;
pub mod cell;
pub mod config;
pub mod consts;
pub mod events;
pub mod invocation;
pub mod proxy;
pub mod scheduler;
