pub mod box_provider;
pub mod provider;
pub mod scripted;
