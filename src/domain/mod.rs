pub mod account;
pub mod api_key;
pub mod registration;

pub use account::*;
pub use api_key::*;
pub use registration::*;
