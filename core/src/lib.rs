pub mod catalog;
pub mod error;
pub mod extract;
pub mod gateway;
pub mod identity;
pub mod outputs;
pub mod quota;
