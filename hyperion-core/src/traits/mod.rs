pub use bridge::*;
pub use home::*;
pub use price::*;
pub use signing::*;

mod bridge;
mod home;
mod price;
mod signing;
