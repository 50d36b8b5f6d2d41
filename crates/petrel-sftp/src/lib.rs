//! # Petrel SFTP
//!
//! Server-side implementation of version 3 of the SSH File Transfer
//! Protocol (draft-ietf-secsh-filexfer-02), designed to be spawned as the
//! "sftp" subsystem by an SSH server: requests arrive on stdin, responses
//! leave on stdout, and the parent owns authentication, encryption, and
//! transport framing.
//!
//! ## Scope
//!
//! - Binary wire codec for the RFC 4251 primitives and the draft-02
//!   composite messages
//! - INIT-gated request dispatch, one response per request, in order
//! - Protocol file operations mapped onto host filesystem primitives,
//!   including attribute translation and errno-to-status mapping
//! - Fixed-capacity handle table naming open files and directory streams
//!
//! There is exactly one session per process and no concurrency: each
//! request is fully processed before the next frame is read.

pub mod error;
pub mod frame;
pub mod handle;
pub mod packet;
pub mod protocol;
pub mod server;
pub mod unix;

pub use error::{Error, Result};
pub use server::{Session, serve};
