pub mod allergy;
pub mod enums;
pub mod input;
pub mod medication;

pub use allergy::*;
pub use enums::*;
pub use input::*;
pub use medication::*;
