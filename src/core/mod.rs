pub mod alias;
pub mod value;
