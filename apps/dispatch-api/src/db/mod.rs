pub mod trips;
pub mod users;
