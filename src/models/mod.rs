mod device;
mod pairing;
mod payment;
mod redemption;
mod subscription;
mod user;

pub use device::*;
pub use pairing::*;
pub use payment::*;
pub use redemption::*;
pub use subscription::*;
pub use user::*;
