//! # Sotdma
//! Sotdma implements the medium access control layer of a self-organizing
//! TDMA (STDMA) network, the reservation scheme standardized in ITU-R M.1371
//! for AIS and VDL Mode 4 and applied here to periodic broadcast between
//! vehicles. Time is divided into frames of equal duration, and frames into
//! slots sized to fit a single maximum-length packet. Every station reserves
//! its own transmission slots, announces each reservation inside its outgoing
//! packets, and revises the reservations as it listens to the channel.
//!
//! The lifetime of a station passes through four phases: initialization
//! (one frame of pure listening), network entry (a randomized access
//! transmission inside the RA-TDMA window), first frame (all remaining
//! reservations are selected), and continuous operation (re-reservations
//! only).
//!
//! The core is passive: all progress is driven by an injected scheduler and
//! radio, so a deterministic event simulator can drive whole scenarios from
//! tests (see [`sim`]).

pub mod phy;
pub mod runtime;
pub mod sim;
pub mod stdma;
