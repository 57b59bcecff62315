pub mod business;
pub mod promotion;
pub mod sales;
