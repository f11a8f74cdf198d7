pub mod cadence;
pub mod confirmation;
pub mod handoff;
pub mod listeners;
pub mod notifications;
pub mod signature;
pub mod tracker;
