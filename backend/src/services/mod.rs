pub mod email;
pub mod encryption;
pub mod pdf;
pub mod push;
pub mod sequence;
pub mod signup_store;
pub mod sms;
