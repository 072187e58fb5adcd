//! Domain entities.
//!
//! The store owns all entities; services hold ids and load on demand. No
//! in-memory object graph is mutated across services. JSON-bearing columns
//! (`specializations`, `time_preferences`, `provider_response`, tax errors)
//! are schema-less at the store and schema-bearing here; the DTOs below
//! validate on ingress.

/// Addresses owned by users.
pub mod address;
/// Cleaner working-hours slots.
pub mod availability;
/// The central booking entity and its status machine.
pub mod booking;
/// GPS check-in/check-out records.
pub mod checkin;
/// Cleaner profiles.
pub mod cleaner;
/// Client profiles and aggregates.
pub mod client;
/// Disputes over completed bookings.
pub mod dispute;
/// Invoices and tax-authority submission state.
pub mod invoice;
/// Payment-provider interaction rows.
pub mod payment;
/// Monthly cleaner payouts.
pub mod payout;
/// Bidirectional booking reviews.
pub mod review;
/// The singleton platform settings row.
pub mod settings;
/// Platform users and acting parties.
pub mod user;
