pub mod accounts;
pub mod cart;
pub mod catalog;
