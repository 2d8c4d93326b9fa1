pub mod enums;
pub mod medication;
pub mod patient;
pub mod prescription;

pub use enums::*;
pub use medication::*;
pub use patient::*;
pub use prescription::*;
