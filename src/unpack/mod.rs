//! # Frame Assemblers
//!
//! Wireless notifications arrive as arbitrary byte runs: a frame may span
//! several runs, a run may carry several frames, and interference can inject
//! garbage between them. Each protocol gets a small byte-by-byte state
//! machine (an *unpacker*) that answers one question per byte: "is a frame
//! complete now?". On `true` the owner reads [`Unpacker::frame`] and calls
//! [`Unpacker::reset`] before feeding further bytes.
//!
//! Unpackers verify whatever integrity the protocol carries at the framing
//! layer (footer fillers, sanity bytes, checksums, CRC-32). A failed check
//! silently discards the candidate frame and resumes header scanning; no
//! error is surfaced. The Ninebot-family unpackers are the exception on
//! checksums: their CRC covers the *plaintext* body, so verification happens
//! in the decoder that owns the gamma key.

pub mod gotway;
pub mod inmotion;
pub mod inmotion_v2;
pub mod kingsong;
pub mod ninebot;
pub mod veteran;

pub use gotway::GotwayUnpacker;
pub use inmotion::InmotionV1Unpacker;
pub use inmotion_v2::InmotionV2Unpacker;
pub use kingsong::KingsongUnpacker;
pub use ninebot::NinebotUnpacker;
pub use veteran::VeteranUnpacker;

/// Byte-by-byte frame reassembly state machine.
pub trait Unpacker {
    /// Consume one byte. Returns `true` when a complete, framing-valid
    /// frame is available via [`Unpacker::frame`].
    fn add_byte(&mut self, byte: u8) -> bool;

    /// The assembled frame. Only meaningful right after `add_byte`
    /// returned `true` and before the next `reset`/`add_byte`.
    fn frame(&self) -> &[u8];

    /// Return to header scanning. Does not forget cross-frame latches
    /// (e.g. the Veteran CRC-32 mode); owners clear those on their own
    /// `reset`.
    fn reset(&mut self);
}
