pub mod calculator;
pub mod result;
