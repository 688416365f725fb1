pub mod clock;
pub mod device;
pub mod error;
pub mod identity;
pub mod ids;
pub mod parameter;
pub mod report;

pub use clock::{Clock, SystemClock, Timestamp};
pub use device::{Device, DeviceAttributes};
pub use error::CoreError;
pub use identity::{IdGenerator, RandomIdGenerator};
pub use ids::DeviceId;
pub use parameter::{Parameter, ParameterFlags, ParameterValue, ValueType};
pub use report::{Report, ReportedParameter};
