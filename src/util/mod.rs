mod constants;
mod named_progress;
mod util;

pub use self::constants::*;
pub use self::named_progress::NamedProgress;
pub use self::util::init_logging_with_progress;
