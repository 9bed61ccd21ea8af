pub mod account;
pub mod admin;
pub mod scan;
pub mod webhooks;
