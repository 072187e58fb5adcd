//! Booking lifecycle: service, reservation codes, expiration sweeper.
//!
//! The status machine itself lives on
//! [`BookingStatus`](crate::models::booking::BookingStatus); this module
//! owns every write that moves a booking through it.

/// Reservation code generation.
pub mod reservation;
/// `BookingService`.
pub mod service;
/// The PENDING auto-expiration sweep.
pub mod sweeper;

pub use service::{BookingService, CreateBookingRequest};
