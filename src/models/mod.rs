pub mod confirmation;
pub mod location;
pub mod notification;
