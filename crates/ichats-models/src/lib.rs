pub mod call;
pub mod gateway;
pub mod message;
