pub mod guinier;
pub mod powerlaw;
