mod autorenew;
mod coupon;
mod order_metadata;
mod player;
mod subscription;
mod transaction;

pub use autorenew::*;
pub use coupon::*;
pub use order_metadata::*;
pub use player::*;
pub use subscription::*;
pub use transaction::*;
