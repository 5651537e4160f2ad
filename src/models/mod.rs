pub mod assignment;
pub mod owner;
pub mod position;
pub mod requester;
pub mod ride;
pub mod ride_status;
pub mod unit;
