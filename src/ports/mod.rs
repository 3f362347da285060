pub mod bookings;
pub mod classes;
pub mod memberships;
pub mod users;

/// Concrete adapter errors
///
/// This could represent any errors from a concrete adapter that is not part of the domain
/// model, such as connectivity, configuration, or permission errors.
pub type AdapterError = Box<dyn std::error::Error + Send + Sync>;
