//! Integration tests for dns-sinkhole
//!
//! # Test Organization
//!
//! - `end_to_end`: UDP server, query pipeline and a mock UDP upstream wired
//!   together over loopback sockets
//! - `domain_lists`: loading the blacklist and override fixtures from disk
//!
//! # Test Requirements
//!
//! - Everything runs on 127.0.0.1 with ephemeral ports
//! - Tests marked with `#[ignore]` need network access

mod domain_lists;
mod end_to_end;
