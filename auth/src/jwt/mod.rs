pub mod claims;
pub mod codec;
pub mod denylist;
pub mod errors;
pub mod keys;

pub use claims::Claims;
pub use codec::IssuedToken;
pub use codec::TokenCodec;
pub use denylist::Denylist;
pub use errors::TokenError;
pub use keys::KeyRing;
