// src/models/mod.rs
pub mod profile;
pub mod ride;

pub use profile::{Credentials, DriverProfile, DriverRegistration, UserProfile, UserRegistration};
pub use ride::{
    BookingRequest, DriverSummary, PaymentMethod, PaymentReceipt, PaymentRequest, PaymentStatus,
    RatingRequest, Ride, RideRating, RideStatus, TripQuote, UserSummary,
};
