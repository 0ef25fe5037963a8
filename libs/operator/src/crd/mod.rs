pub mod whisk;
pub mod whisk_user;

pub use whisk::{Whisk, WhiskSpec, WhiskStatus};
pub use whisk_user::{WhiskUser, WhiskUserSpec, WhiskUserStatus};
