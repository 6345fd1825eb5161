mod court;
mod feedback;
mod reservation;
mod schedule;
mod weather;

pub use self::court::*;
pub use self::feedback::*;
pub use self::reservation::*;
pub use self::schedule::*;
pub use self::weather::*;
