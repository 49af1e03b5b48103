pub mod bus;
pub mod channel;
pub mod events;
pub mod handle;

pub use bus::CallBus;
pub use channel::{Callback, Liveness, VoidCallback};
pub use events::InstanceCreated;
pub use handle::FollowHandle;
