pub mod conversation;
pub mod document;
pub mod payment;
pub mod policy;
pub mod quote;
pub mod trip;
