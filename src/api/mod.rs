pub mod extract;
pub mod guard;
pub mod rest;
