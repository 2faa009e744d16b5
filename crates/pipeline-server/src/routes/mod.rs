pub mod invoke;
pub mod items;
