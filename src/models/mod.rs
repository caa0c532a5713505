pub mod assignment;
pub mod communication;
pub mod enums;
pub mod provider;
pub mod user;

pub use assignment::*;
pub use communication::*;
pub use enums::*;
pub use provider::*;
pub use user::*;
